//! Per-lane link engines.
//!
//! The TX engine sequences CGS, the lane-alignment preamble and the scrambled
//! datapath onto one lane; the RX engine mirrors it, gating entry into each
//! phase on the shared multiframe clock and the incoming stream. Each lane
//! runs independently; aggregation across lanes happens in [`crate::core`].

use tracing::{debug, warn};

use crate::align::{AlignInserter, AlignReplacer, Aligner};
use crate::cgs;
use crate::framer::{Deframer, Framer};
use crate::ilas::{self, IlasChecker, IlasGenerator, IlasTable};
use crate::scrambler::{Descrambler, Scrambler};
use crate::settings::{Field, LinkSettings, SettingsError};
use crate::types::LinkWord;

/// Cycles `jsync` must stay deasserted before TX treats it as a
/// resynchronization request rather than an error report.
const JSYNC_TIMEOUT: u32 = 4;

/// Counts consecutive cycles a condition holds; `done` after `timeout` cycles.
#[derive(Debug)]
struct WaitTimer {
    timeout: u32,
    count: u32,
}

impl WaitTimer {
    fn new(timeout: u32) -> Self { Self { timeout, count: 0 } }

    fn reset(&mut self) { self.count = 0; }

    fn step(&mut self, wait: bool) -> bool {
        if wait {
            if self.count < self.timeout {
                self.count += 1;
            }
        } else {
            self.count = 0;
        }
        self.count == self.timeout
    }
}

/// Transmit phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    /// Emitting the synchronization pattern.
    SendCgs,
    /// Emitting the lane-alignment preamble.
    SendIlas,
    /// Emitting scrambled, framed converter data.
    SendData,
}

/// The TX datapath: scrambler, framer and alignment-character inserter.
/// Total latency one cycle (the scrambler's pipeline register).
#[derive(Debug)]
struct LinkTxDatapath {
    scrambler: Scrambler,
    framer: Framer,
    inserter: AlignInserter,
}

impl LinkTxDatapath {
    const LATENCY: usize = Scrambler::LATENCY;

    fn new(settings: &LinkSettings) -> Result<Self, SettingsError> {
        Ok(Self { scrambler: Scrambler::new(), framer: Framer::new(settings)?, inserter: AlignInserter })
    }

    fn reset(&mut self) {
        self.scrambler.reset();
        self.framer.reset();
    }

    /// Runs the scrambler only; the framer stays parked while the preamble
    /// bypasses framing.
    fn idle(&mut self, data: u32) {
        let _ = self.scrambler.step(data);
        self.framer.reset();
    }

    fn step(&mut self, data: u32) -> LinkWord {
        let (valid, scrambled) = self.scrambler.step(data);
        let framed = self.framer.step(scrambled);
        // Hold the frame counter until the scrambler pipeline is primed.
        if !valid {
            self.framer.reset();
        }
        self.inserter.step(framed).word
    }
}

/// Per-cycle inputs of [`LinkTx`].
#[derive(Debug, Clone, Copy)]
pub struct LinkTxInput {
    /// This lane's transport-layer octet word.
    pub data: u32,
    /// Synchronization request from the receiver.
    pub jsync: bool,
    /// Multiframe-start pulse from the shared LMFC.
    pub lmfc_zero: bool,
}

/// One lane's transmit engine.
#[derive(Debug)]
pub struct LinkTx {
    state: TxState,
    lane: u32,
    ilas: IlasGenerator,
    datapath: LinkTxDatapath,
    jsync_timer: WaitTimer,
}

impl LinkTx {
    /// Datapath latency from transport word to lane word, in cycles.
    pub const LATENCY: usize = LinkTxDatapath::LATENCY;

    /// Creates the engine for `lane`, embedding the lane ID into the
    /// alignment preamble.
    pub fn new(settings: &LinkSettings, lane: u32) -> Result<Self, SettingsError> {
        let mut lane_settings = settings.clone();
        lane_settings.set(Field::Lid, lane)?;
        lane_settings.recompute_checksum()?;
        Ok(Self {
            state: TxState::SendCgs,
            lane,
            ilas: IlasGenerator::new(IlasTable::new(&lane_settings, true)?),
            datapath: LinkTxDatapath::new(&lane_settings)?,
            jsync_timer: WaitTimer::new(JSYNC_TIMEOUT),
        })
    }

    /// Current phase.
    pub fn state(&self) -> TxState { self.state }

    /// True while converter data is on the wire.
    pub fn ready(&self) -> bool { self.state == TxState::SendData }

    /// Forces the engine back to synchronization.
    pub fn reset(&mut self) {
        self.state = TxState::SendCgs;
        self.ilas.reset();
        self.datapath.reset();
        self.jsync_timer.reset();
    }

    /// Advances one cycle, returning the lane word to transmit.
    pub fn step(&mut self, input: &LinkTxInput) -> LinkWord {
        let desync = self.jsync_timer.step(!input.jsync);
        match self.state {
            TxState::SendCgs => {
                self.ilas.reset();
                self.datapath.reset();
                // Start the preamble on the first multiframe boundary after
                // the receiver requests synchronization.
                if input.lmfc_zero && input.jsync {
                    debug!(lane = self.lane, "SEND-CGS -> SEND-ILAS");
                    self.state = TxState::SendIlas;
                }
                cgs::word()
            }
            TxState::SendIlas => {
                // The scrambler free-runs so the data phase starts mid-sequence.
                self.datapath.idle(input.data);
                let out = self.ilas.step();
                if out.last {
                    debug!(lane = self.lane, "SEND-ILAS -> SEND-DATA");
                    self.state = TxState::SendData;
                }
                out.word
            }
            TxState::SendData => {
                let word = self.datapath.step(input.data);
                if desync {
                    warn!(lane = self.lane, "jsync lost, SEND-DATA -> SEND-CGS");
                    self.state = TxState::SendCgs;
                }
                word
            }
        }
    }
}

/// Receive phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxState {
    /// Waiting for the synchronization pattern, lane realignment requested.
    ReceiveCgs,
    /// Synchronization seen; requesting the preamble from the peer.
    AssertSync,
    /// Verifying the lane-alignment preamble.
    ReceiveIlas,
    /// Receiving scrambled, framed converter data.
    ReceiveData,
}

/// The RX datapath: control-flag removal, deframing and descrambling.
/// Total latency one cycle (the descrambler's pipeline register).
#[derive(Debug)]
struct LinkRxDatapath {
    replacer: AlignReplacer,
    deframer: Deframer,
    descrambler: Descrambler,
}

impl LinkRxDatapath {
    fn new(settings: &LinkSettings) -> Result<Self, SettingsError> {
        Ok(Self { replacer: AlignReplacer, deframer: Deframer::new(settings)?, descrambler: Descrambler::new() })
    }

    fn reset(&mut self) { self.descrambler.reset(); }

    fn step(&mut self, input: LinkWord) -> u32 {
        let stripped = self.replacer.step(input);
        let deframed = self.deframer.step(stripped);
        self.descrambler.step(deframed).1
    }
}

/// Per-cycle inputs of [`LinkRx`].
#[derive(Debug, Clone, Copy)]
pub struct LinkRxInput {
    /// The lane word delivered by the transceiver.
    pub word: LinkWord,
    /// Multiframe-start pulse from the shared LMFC.
    pub lmfc_zero: bool,
}

/// Per-cycle outputs of [`LinkRx`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkRxOutput {
    /// Descrambled octet word, meaningful while `ready`.
    pub data: u32,
    /// Synchronization indication towards the transmitter.
    pub jsync: bool,
    /// True while converter data is being received.
    pub ready: bool,
    /// Lane-realignment request towards the transceiver.
    pub align: bool,
}

/// One lane's receive engine.
#[derive(Debug)]
pub struct LinkRx {
    state: RxState,
    lane: u32,
    strict_ilas: bool,
    aligner: Aligner,
    ilas: IlasChecker,
    datapath: LinkRxDatapath,
    ilas_errors: u32,
}

impl LinkRx {
    /// Creates the engine for `lane`.
    ///
    /// With `strict_ilas`, any preamble mismatch forces resynchronization;
    /// otherwise mismatches are only monitored.
    pub fn new(settings: &LinkSettings, lane: u32, strict_ilas: bool) -> Result<Self, SettingsError> {
        let mut lane_settings = settings.clone();
        lane_settings.set(Field::Lid, lane)?;
        lane_settings.recompute_checksum()?;
        Ok(Self {
            state: RxState::ReceiveCgs,
            lane,
            strict_ilas,
            aligner: Aligner::new(),
            ilas: IlasChecker::new(IlasTable::new(&lane_settings, true)?),
            datapath: LinkRxDatapath::new(&lane_settings)?,
            ilas_errors: 0,
        })
    }

    /// Current phase.
    pub fn state(&self) -> RxState { self.state }

    /// True while converter data is being received.
    pub fn ready(&self) -> bool { self.state == RxState::ReceiveData }

    /// Preamble mismatches that forced resynchronization.
    pub fn ilas_errors(&self) -> u32 { self.ilas_errors }

    /// Forces the engine back to synchronization.
    pub fn reset(&mut self) {
        self.state = RxState::ReceiveCgs;
        self.ilas.reset();
        self.datapath.reset();
    }

    /// Advances one cycle.
    pub fn step(&mut self, input: &LinkRxInput) -> LinkRxOutput {
        let aligned = self.aligner.step(input.word);
        let cgs_valid = cgs::valid(&aligned);
        let mut output = LinkRxOutput::default();

        match self.state {
            RxState::ReceiveCgs => {
                output.align = true;
                self.ilas.reset();
                self.datapath.reset();
                // Assert jsync on the first multiframe boundary after CGS.
                if input.lmfc_zero && cgs_valid {
                    debug!(lane = self.lane, "RECEIVE-CGS -> ASSERT-SYNC");
                    self.state = RxState::AssertSync;
                }
            }
            RxState::AssertSync => {
                output.jsync = true;
                self.datapath.reset();
                if ilas::start_valid(&aligned) {
                    debug!(lane = self.lane, "ASSERT-SYNC -> RECEIVE-ILAS");
                    self.ilas.reset();
                    let _ = self.ilas.step(aligned);
                    self.state = RxState::ReceiveIlas;
                } else {
                    self.ilas.reset();
                }
            }
            RxState::ReceiveIlas => {
                output.jsync = true;
                self.datapath.reset();
                if self.ilas.done() {
                    debug!(lane = self.lane, "RECEIVE-ILAS -> RECEIVE-DATA");
                    self.state = RxState::ReceiveData;
                } else if !self.ilas.step(aligned) && self.strict_ilas {
                    warn!(lane = self.lane, "lane alignment mismatch, RECEIVE-ILAS -> RECEIVE-CGS");
                    self.ilas_errors = self.ilas_errors.wrapping_add(1);
                    self.state = RxState::ReceiveCgs;
                }
            }
            RxState::ReceiveData => {
                output.jsync = true;
                output.ready = true;
                output.data = self.datapath.step(aligned);
                // The peer restarting CGS is a resynchronization request.
                if cgs_valid {
                    warn!(lane = self.lane, "CGS re-detected, RECEIVE-DATA -> RECEIVE-CGS");
                    self.state = RxState::ReceiveCgs;
                }
            }
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::demo_settings;

    fn tx_input(jsync: bool, lmfc_zero: bool) -> LinkTxInput { LinkTxInput { data: 0, jsync, lmfc_zero } }

    #[test]
    fn tx_sends_cgs_until_jsync_and_lmfc() {
        let settings = demo_settings();
        let mut tx = LinkTx::new(&settings, 0).unwrap();

        // No jsync: CGS forever, even across multiframe boundaries.
        for cycle in 0..20 {
            let word = tx.step(&tx_input(false, cycle % 8 == 0));
            assert_eq!(word, cgs::word());
            assert_eq!(tx.state(), TxState::SendCgs);
        }

        // jsync asserted mid-multiframe: still CGS until the boundary.
        assert_eq!(tx.step(&tx_input(true, false)), cgs::word());
        assert_eq!(tx.state(), TxState::SendCgs);
        tx.step(&tx_input(true, true));
        assert_eq!(tx.state(), TxState::SendIlas);
    }

    #[test]
    fn tx_reaches_data_after_one_ilas_duration() {
        let settings = demo_settings();
        let mut tx = LinkTx::new(&settings, 0).unwrap();
        let ilas_words = (settings.f() * settings.k()) as usize;

        tx.step(&tx_input(true, true));
        let mut words = Vec::new();
        for _ in 0..ilas_words {
            assert_eq!(tx.state(), TxState::SendIlas);
            words.push(tx.step(&tx_input(true, false)));
        }
        assert_eq!(tx.state(), TxState::SendData);
        assert_eq!(words[0].octet(0), crate::constants::control_char::R);
        assert_eq!(words[ilas_words - 1].octet(3), crate::constants::control_char::A);
    }

    #[test]
    fn tx_desync_is_debounced() {
        let settings = demo_settings();
        let mut tx = LinkTx::new(&settings, 0).unwrap();
        tx.step(&tx_input(true, true));
        for _ in 0..32 {
            tx.step(&tx_input(true, false));
        }
        assert_eq!(tx.state(), TxState::SendData);

        // A short glitch does not resynchronize.
        for _ in 0..JSYNC_TIMEOUT - 1 {
            tx.step(&tx_input(false, false));
        }
        for _ in 0..8 {
            tx.step(&tx_input(true, false));
        }
        assert_eq!(tx.state(), TxState::SendData);

        // A sustained drop does.
        for _ in 0..JSYNC_TIMEOUT {
            tx.step(&tx_input(false, false));
        }
        assert_eq!(tx.state(), TxState::SendCgs);
    }

    /// Drives an RX engine from a TX engine with jsync looped back.
    fn run_loopback(strict: bool, corrupt_cycle: Option<usize>) -> (LinkTx, LinkRx, usize) {
        let settings = demo_settings();
        let mut tx = LinkTx::new(&settings, 0).unwrap();
        let mut rx = LinkRx::new(&settings, 0, strict).unwrap();
        let lmfc_cycles = settings.lmfc_cycles() as usize;

        let mut jsync = false;
        let mut reached_data_at = usize::MAX;
        for cycle in 0..20 * lmfc_cycles {
            let lmfc_zero = cycle % lmfc_cycles == 0;
            let mut word = tx.step(&LinkTxInput { data: 0x0102_0304, jsync, lmfc_zero });
            if corrupt_cycle == Some(cycle) {
                word.data ^= 0xff;
            }
            let out = rx.step(&LinkRxInput { word, lmfc_zero });
            jsync = out.jsync;
            if out.ready && reached_data_at == usize::MAX {
                reached_data_at = cycle;
            }
        }
        (tx, rx, reached_data_at)
    }

    #[test]
    fn rx_reaches_data_within_one_ilas_duration_of_cgs() {
        let (tx, rx, reached_data_at) = run_loopback(true, None);
        assert_eq!(tx.state(), TxState::SendData);
        assert_eq!(rx.state(), RxState::ReceiveData);
        assert_eq!(rx.ilas_errors(), 0);
        // CGS detection happens within the first two multiframes; the
        // preamble is four more.
        assert!(reached_data_at <= 7 * 8, "reached data at cycle {reached_data_at}");
    }

    #[test]
    fn corrupt_preamble_resynchronizes_when_strict() {
        let settings = demo_settings();
        let lmfc_cycles = settings.lmfc_cycles() as usize;
        // Pick a cycle inside the preamble: it starts at the first LMFC zero
        // after jsync comes up, which the loopback reaches within two
        // multiframes.
        let corrupt = 3 * lmfc_cycles + 2;

        let (_, rx, _) = run_loopback(true, Some(corrupt));
        assert!(rx.ilas_errors() >= 1);
        // The link recovers on its own afterwards.
        assert_eq!(rx.state(), RxState::ReceiveData);
    }

    #[test]
    fn corrupt_preamble_is_ignored_when_not_strict() {
        let settings = demo_settings();
        let lmfc_cycles = settings.lmfc_cycles() as usize;
        let corrupt = 3 * lmfc_cycles + 2;

        let (_, rx, reached) = run_loopback(false, Some(corrupt));
        assert_eq!(rx.ilas_errors(), 0);
        assert_eq!(rx.state(), RxState::ReceiveData);
        assert!(reached <= 7 * 8);
    }
}
