//! End-to-end loopback: a transmit core wired to a receive core through
//! elastic buffers, with `jsync` looped back.

use jesd204b::fifo::ElasticBuffer;
use jesd204b::settings::{ChecksumMode, LinkSettings, SettingsValues};
use jesd204b::{CoreRx, CoreRxInput, CoreTx, CoreTxInput, LinkWord, RxState};

fn settings() -> LinkSettings {
    LinkSettings::from_values(&SettingsValues {
        did: 0x5a,
        bid: 0x5,
        lid: 0,
        l: 2,
        scr: 1,
        f: 2,
        k: 16,
        m: 2,
        n: 16,
        cs: 0,
        np: 16,
        subclassv: 1,
        s: 1,
        jesdv: 1,
        cf: 0,
        hd: 0,
        checksum_mode: ChecksumMode::FieldSum,
    })
    .expect("consistent loopback settings")
}

struct Harness {
    tx: CoreTx,
    rx: CoreRx,
    ebufs: Vec<ElasticBuffer>,
    jsync: bool,
    cycle: usize,
}

impl Harness {
    fn new(strict_ilas: bool) -> Self {
        let settings = settings();
        let mut tx = CoreTx::new(&settings).unwrap();
        let mut rx = CoreRx::new(&settings, strict_ilas).unwrap();
        tx.set_enable(true);
        rx.set_enable(true);
        let lanes = tx.lane_count();
        Self { tx, rx, ebufs: (0..lanes).map(|_| ElasticBuffer::new()).collect(), jsync: false, cycle: 0 }
    }

    /// Sample pattern encoding the cycle it was produced on.
    fn samples_for(cycle: usize) -> Vec<Vec<u32>> {
        (0..2).map(|m| (0..2).map(|j| ((cycle as u32) + 7 * m + 3 * j) & 0xffff).collect()).collect()
    }

    /// Advances one cycle; `corrupt` XORs the delayed word on lane 0.
    fn step_with(&mut self, corrupt: bool) {
        let samples = Self::samples_for(self.cycle);
        let words = self.tx.step(&CoreTxInput { samples: &samples, jsync: self.jsync, jref: false }).to_vec();
        let mut delayed: Vec<LinkWord> =
            words.into_iter().zip(&mut self.ebufs).map(|(w, e)| e.step(w)).collect();
        if corrupt {
            delayed[0].data ^= 0x00ff_0000;
        }
        self.rx.step(&CoreRxInput { words: &delayed, jref: false });
        self.jsync = self.rx.jsync();
        self.cycle += 1;
    }

    fn step(&mut self) { self.step_with(false); }
}

#[test]
fn link_comes_up_within_bounds() {
    let settings = settings();
    let lmfc_cycles = settings.lmfc_cycles() as usize;
    let ilas_cycles = (settings.f() * settings.k()) as usize;
    let mut harness = Harness::new(true);

    let mut jsync_up_at = None;
    let mut tx_ready_at = None;
    let mut rx_ready_at = None;
    for _ in 0..40 * lmfc_cycles {
        harness.step();
        if harness.jsync && jsync_up_at.is_none() {
            jsync_up_at = Some(harness.cycle);
        }
        if harness.tx.ready() && tx_ready_at.is_none() {
            tx_ready_at = Some(harness.cycle);
        }
        if harness.rx.ready() && rx_ready_at.is_none() {
            rx_ready_at = Some(harness.cycle);
        }
    }

    let jsync_up_at = jsync_up_at.expect("receiver requested synchronization");
    let tx_ready_at = tx_ready_at.expect("transmitter reached the data phase");
    let rx_ready_at = rx_ready_at.expect("receiver reached the data phase");

    // TX starts the preamble on the first multiframe boundary after jsync and
    // streams it for one ILAS duration.
    assert!(tx_ready_at - jsync_up_at <= lmfc_cycles + ilas_cycles + 2);
    // RX follows within the transceiver-path and deskew latency, quantized to
    // a multiframe boundary.
    assert!(rx_ready_at - tx_ready_at <= 2 * lmfc_cycles);
    assert_eq!(harness.rx.jsync_errors(), 0);
}

#[test]
fn samples_are_delivered_with_a_fixed_offset() {
    let settings = settings();
    let lmfc_cycles = settings.lmfc_cycles() as usize;
    let mut harness = Harness::new(true);

    // Bring the link up and let the pipeline settle.
    for _ in 0..50 * lmfc_cycles {
        harness.step();
    }
    assert!(harness.rx.ready());

    // The first received sample encodes the cycle it was transmitted on.
    let received = harness.rx.samples()[0][0];
    let offset = (harness.cycle as u32 - 1).wrapping_sub(received) & 0xffff;
    assert!(offset > 0 && (offset as usize) < 4 * lmfc_cycles, "offset {offset}");

    // Every converter and slot follows with the same constant offset.
    for _ in 0..16 * lmfc_cycles {
        harness.step();
        let produced_at = (harness.cycle as u32 - 1).wrapping_sub(offset) as usize;
        let expected = Harness::samples_for(produced_at & 0xffff);
        assert_eq!(harness.rx.samples(), expected.as_slice(), "cycle {}", harness.cycle);
    }
}

#[test]
fn corrupt_preamble_word_resynchronizes_the_link() {
    let settings = settings();
    let lmfc_cycles = settings.lmfc_cycles() as usize;
    let mut harness = Harness::new(true);

    // Run until lane 0 is receiving the preamble, then corrupt one word.
    let mut corrupted_at = None;
    for _ in 0..40 * lmfc_cycles {
        let in_ilas = harness.rx.links()[0].state() == RxState::ReceiveIlas;
        if in_ilas && corrupted_at.is_none() {
            harness.step_with(true);
            corrupted_at = Some(harness.cycle);
        } else {
            harness.step();
        }
        if let Some(at) = corrupted_at {
            // The corrupted word reaches the checker one aligner cycle after
            // delivery and drops the lane immediately.
            if harness.cycle == at + 2 {
                assert_eq!(harness.rx.links()[0].state(), RxState::ReceiveCgs);
            }
        }
    }
    assert!(corrupted_at.is_some(), "the preamble phase was observed");

    // One recorded failure on the corrupted lane, and full self-healing.
    assert_eq!(harness.rx.links()[0].ilas_errors(), 1);
    assert_eq!(harness.rx.links()[1].ilas_errors(), 0);
    assert!(harness.rx.ready());
    assert!(harness.tx.ready());
}

#[test]
fn corrupt_preamble_word_is_ignored_without_strict_checking() {
    let settings = settings();
    let lmfc_cycles = settings.lmfc_cycles() as usize;
    let mut harness = Harness::new(false);

    let mut corrupted = false;
    for _ in 0..40 * lmfc_cycles {
        let in_ilas = harness.rx.links()[0].state() == RxState::ReceiveIlas;
        if in_ilas && !corrupted {
            harness.step_with(true);
            corrupted = true;
        } else {
            harness.step();
        }
    }
    assert!(corrupted);
    assert_eq!(harness.rx.links()[0].ilas_errors(), 0);
    assert_eq!(harness.rx.jsync_errors(), 0);
    assert!(harness.rx.ready());
}
