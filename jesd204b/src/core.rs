//! Multi-lane link cores.
//!
//! Orchestrates the transport layer, the shared multiframe clock and one
//! link engine per lane into a complete transmit or receive core. Per-lane
//! `ready`/`jsync` are reduced into aggregate status: combinationally on TX,
//! registered and multiframe-sampled on RX so per-lane glitches cannot
//! flicker the link status. The RX core also deskews lanes through per-lane
//! buffers sized to one multiframe.

use crate::fifo::{ElasticBuffer, SyncFifo};
use crate::link::{LinkRx, LinkRxInput, LinkTx, LinkTxInput};
use crate::lmfc::Lmfc;
use crate::settings::{LinkSettings, SettingsError};
use crate::transport::{StplChecker, StplGenerator, TransportRx, TransportTx};
use crate::types::LinkWord;

/// `jref` edge-detection latency, compensated by the LMFC load offset.
const JREF_LATENCY: i32 = 1;
/// Elastic-buffer latency on the transceiver path, likewise compensated.
const EBUF_LATENCY: i32 = ElasticBuffer::LATENCY as i32;

/// Per-cycle inputs of [`CoreTx`].
#[derive(Debug, Clone, Copy)]
pub struct CoreTxInput<'a> {
    /// One cycle of sample data per converter (`samples[converter][sample]`).
    pub samples: &'a [Vec<u32>],
    /// Synchronization request from the remote receiver.
    pub jsync: bool,
    /// External multiframe reference pulse.
    pub jref: bool,
}

/// Multi-lane transmit core.
#[derive(Debug)]
pub struct CoreTx {
    transport: TransportTx,
    stpl: StplGenerator,
    lmfc: Lmfc,
    links: Vec<LinkTx>,
    enable: bool,
    stpl_enable: bool,
    jref_q: bool,
    lanes: Vec<u32>,
    stpl_samples: Vec<Vec<u32>>,
    outputs: Vec<LinkWord>,
    ready: bool,
}

impl CoreTx {
    /// Creates the core; lane `n` embeds lane ID `n` in its preamble.
    pub fn new(settings: &LinkSettings) -> Result<Self, SettingsError> {
        let transport = TransportTx::new(settings)?;
        let stpl = StplGenerator::new(settings, true)?;
        let lmfc = Lmfc::with_load(settings, JREF_LATENCY + EBUF_LATENCY)?;
        let lanes = settings.l() as usize;
        let links = (0..settings.l()).map(|n| LinkTx::new(settings, n)).collect::<Result<Vec<_>, _>>()?;
        let samples_per_clock = transport.samples_per_clock();
        Ok(Self {
            transport,
            stpl,
            lmfc,
            links,
            enable: false,
            stpl_enable: false,
            jref_q: false,
            lanes: vec![0; lanes],
            stpl_samples: vec![vec![0; samples_per_clock]; settings.m() as usize],
            outputs: vec![LinkWord::default(); lanes],
            ready: false,
        })
    }

    /// Enables or disables the core; disabling holds every lane in reset.
    pub fn set_enable(&mut self, enable: bool) { self.enable = enable; }

    /// Substitutes the test pattern for application data.
    pub fn set_stpl_enable(&mut self, enable: bool) { self.stpl_enable = enable; }

    /// Adjusts the LMFC reload phase.
    pub fn set_lmfc_load(&mut self, load: i32) { self.lmfc.set_load(load); }

    /// True while every lane is transmitting data.
    pub fn ready(&self) -> bool { self.ready }

    /// Number of configured lanes.
    pub fn lane_count(&self) -> usize { self.links.len() }

    /// Per-lane link engines, for status inspection.
    pub fn links(&self) -> &[LinkTx] { &self.links }

    /// Advances one cycle, returning the word to transmit on each lane.
    pub fn step(&mut self, input: &CoreTxInput<'_>) -> &[LinkWord] {
        let lmfc_zero = self.lmfc.step(self.jref_q);
        self.jref_q = input.jref;

        if !self.enable {
            for link in &mut self.links {
                link.reset();
            }
        }

        if self.stpl_enable {
            self.stpl.fill(&mut self.stpl_samples);
            self.transport.map(&self.stpl_samples, &mut self.lanes);
        } else {
            self.transport.map(input.samples, &mut self.lanes);
        }

        for (n, link) in self.links.iter_mut().enumerate() {
            self.outputs[n] = link.step(&LinkTxInput { data: self.lanes[n], jsync: input.jsync, lmfc_zero });
        }
        self.ready = self.links.iter().all(LinkTx::ready);
        &self.outputs
    }
}

/// Per-cycle inputs of [`CoreRx`].
#[derive(Debug, Clone, Copy)]
pub struct CoreRxInput<'a> {
    /// The word delivered by the transceiver on each lane.
    pub words: &'a [LinkWord],
    /// External multiframe reference pulse.
    pub jref: bool,
}

/// Multi-lane receive core.
#[derive(Debug)]
pub struct CoreRx {
    transport: TransportRx,
    stpl: StplChecker,
    lmfc: Lmfc,
    links: Vec<LinkRx>,
    skew: Vec<SyncFifo<u32>>,
    enable: bool,
    stpl_enable: bool,
    jref_q: bool,
    align: Vec<bool>,
    lane_data: Vec<u32>,
    samples: Vec<Vec<u32>>,
    jsync: bool,
    jsync_errors: u32,
    ready: bool,
}

impl CoreRx {
    /// Creates the core. With `strict_ilas`, a preamble mismatch on any lane
    /// forces that lane back to synchronization.
    pub fn new(settings: &LinkSettings, strict_ilas: bool) -> Result<Self, SettingsError> {
        let transport = TransportRx::new(settings)?;
        let stpl = StplChecker::new(settings, true)?;
        let lmfc = Lmfc::with_load(settings, -(JREF_LATENCY + EBUF_LATENCY))?;
        let lanes = settings.l() as usize;
        let links =
            (0..settings.l()).map(|n| LinkRx::new(settings, n, strict_ilas)).collect::<Result<Vec<_>, _>>()?;
        let depth = settings.lmfc_cycles() as usize;
        let samples_per_clock = transport.samples_per_clock();
        Ok(Self {
            transport,
            stpl,
            lmfc,
            links,
            skew: (0..lanes).map(|_| SyncFifo::new(depth)).collect(),
            enable: false,
            stpl_enable: false,
            jref_q: false,
            align: vec![false; lanes],
            lane_data: vec![0; lanes],
            samples: vec![vec![0; samples_per_clock]; settings.m() as usize],
            jsync: false,
            jsync_errors: 0,
            ready: false,
        })
    }

    /// Enables or disables the core; disabling holds every lane in reset.
    pub fn set_enable(&mut self, enable: bool) { self.enable = enable; }

    /// Checks the received stream against the test pattern instead of
    /// delivering it.
    pub fn set_stpl_enable(&mut self, enable: bool) { self.stpl_enable = enable; }

    /// Adjusts the LMFC reload phase.
    pub fn set_lmfc_load(&mut self, load: i32) { self.lmfc.set_load(load); }

    /// Aggregate readiness, sampled on multiframe boundaries.
    pub fn ready(&self) -> bool { self.ready }

    /// Aggregate synchronization indication towards the transmitter.
    pub fn jsync(&self) -> bool { self.jsync }

    /// Falling edges of the aggregate synchronization signal (link errors).
    pub fn jsync_errors(&self) -> u32 { self.jsync_errors }

    /// Test-pattern mismatch count.
    pub fn stpl_errors(&self) -> u32 { self.stpl.errors() }

    /// Clears the test-pattern mismatch count.
    pub fn reset_stpl_errors(&mut self) { self.stpl.reset_errors(); }

    /// The last delivered cycle of samples, meaningful while `ready`.
    pub fn samples(&self) -> &[Vec<u32>] { &self.samples }

    /// Per-lane realignment requests towards the transceiver.
    pub fn align_requests(&self) -> &[bool] { &self.align }

    /// Deskew-buffer fill level of `lane`.
    pub fn skew_level(&self, lane: usize) -> usize { self.skew[lane].level() }

    /// Per-lane link engines, for status inspection.
    pub fn links(&self) -> &[LinkRx] { &self.links }

    /// Advances one cycle.
    pub fn step(&mut self, input: &CoreRxInput<'_>) {
        let lmfc_zero = self.lmfc.step(self.jref_q);
        self.jref_q = input.jref;

        if !self.enable {
            for link in &mut self.links {
                link.reset();
            }
        }

        let mut jsync_all = true;
        for (n, link) in self.links.iter_mut().enumerate() {
            let out = link.step(&LinkRxInput { word: input.words[n], lmfc_zero });
            jsync_all &= out.jsync;
            self.align[n] = out.align;
            // Deskew buffers fill from lane readiness and drain once the
            // whole link is up, absorbing per-lane arrival skew.
            if link.ready() {
                self.skew[n].push(out.data);
            } else {
                self.skew[n].reset();
            }
        }

        // Aggregate ready is sampled on multiframe boundaries only.
        if lmfc_zero {
            self.ready = self.links.iter().all(LinkRx::ready);
        }

        if self.ready {
            for (n, fifo) in self.skew.iter_mut().enumerate() {
                self.lane_data[n] = fifo.pop().unwrap_or(0);
            }
            self.transport.map(&self.lane_data, &mut self.samples);
            if self.stpl_enable {
                self.stpl.step(&self.samples);
            }
        }

        // Registered aggregate; a falling edge is a link error.
        if self.jsync && !jsync_all {
            self.jsync_errors = self.jsync_errors.wrapping_add(1);
        }
        self.jsync = jsync_all;
    }
}
