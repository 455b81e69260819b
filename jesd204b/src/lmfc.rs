//! Local multiframe clock divider.

use crate::settings::{ConfigError, LinkSettings};

/// Divides the protocol clock down to the local multiframe clock.
///
/// A free-running modulo-`lmfc_cycles` counter whose `zero` output pulses on
/// the first cycle of every multiframe. A rising edge on the external `jref`
/// reference reloads the counter to the configured `load` offset instead of
/// incrementing, resynchronizing local framing to the peripheral without
/// phase-locked clocks; edge detection costs one cycle of latency, which
/// `load` compensates together with downstream buffering.
#[derive(Debug)]
pub struct Lmfc {
    cycles: u32,
    load: u32,
    count: u32,
    jref_q: bool,
    jref_qq: bool,
}

impl Lmfc {
    /// Creates the divider for `settings`, with a zero load offset.
    pub fn new(settings: &LinkSettings) -> Result<Self, ConfigError> {
        let frames_per_clock = settings.frames_per_clock();
        let k = settings.k();
        if k % frames_per_clock != 0 {
            return Err(ConfigError::MultiframeAlignment { k, frames_per_clock });
        }
        Ok(Self { cycles: k / frames_per_clock, load: 0, count: 0, jref_q: false, jref_qq: false })
    }

    /// Creates the divider with a signed load offset, reduced modulo the
    /// multiframe period (negative offsets advance the local phase).
    pub fn with_load(settings: &LinkSettings, load: i32) -> Result<Self, ConfigError> {
        let mut lmfc = Self::new(settings)?;
        lmfc.set_load(load);
        Ok(lmfc)
    }

    /// Reload offset applied on the next `jref` rising edge.
    pub fn set_load(&mut self, load: i32) { self.load = load.rem_euclid(self.cycles as i32) as u32; }

    /// Cycles per multiframe.
    pub fn cycles(&self) -> u32 { self.cycles }

    /// Current counter value.
    pub fn count(&self) -> u32 { self.count }

    /// Advances one cycle; true exactly on multiframe-start cycles.
    pub fn step(&mut self, jref: bool) -> bool {
        let zero = self.count == 0;
        let is_load = self.jref_q && !self.jref_qq;
        self.count = if is_load { self.load } else { (self.count + 1) % self.cycles };
        self.jref_qq = self.jref_q;
        self.jref_q = jref;
        zero
    }
}
