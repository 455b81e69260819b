//! Framing modules.
//!
//! The framer annotates the scrambled octet stream with frame and multiframe
//! boundaries so the alignment-character inserter knows where substitution is
//! allowed. A frame may not span a partial clock cycle, so F is restricted to
//! divisors of the link word.

use crate::constants::{DATA_WIDTH, OCTETS_PER_WORD};
use crate::settings::{ConfigError, LinkSettings};
use crate::types::{FramedWord, LinkWord};

/// Marks frame and multiframe boundaries in the octet stream. Zero latency.
#[derive(Debug)]
pub struct Framer {
    frame_last: u8,
    clocks_per_multiframe: u32,
    counter: u32,
}

impl Framer {
    /// Creates a framer, checking that whole frames and multiframes fit the
    /// clock grid.
    pub fn new(settings: &LinkSettings) -> Result<Self, ConfigError> {
        let f = settings.f();
        let k = settings.k();
        if f == 0 || f > OCTETS_PER_WORD as u32 || OCTETS_PER_WORD as u32 % f != 0 {
            return Err(ConfigError::PartialFrame { f, width: DATA_WIDTH as u32 });
        }
        let frames_per_clock = OCTETS_PER_WORD as u32 / f;
        if k % frames_per_clock != 0 {
            return Err(ConfigError::MultiframeAlignment { k, frames_per_clock });
        }

        // Static mask: which octet of a word closes a frame.
        let mut frame_last = 0u8;
        for i in 0..OCTETS_PER_WORD {
            if (i as u32 + 1) % f == 0 {
                frame_last |= 1 << i;
            }
        }

        Ok(Self { frame_last, clocks_per_multiframe: k / frames_per_clock, counter: 0 })
    }

    /// Restarts the multiframe cycle counter.
    pub fn reset(&mut self) { self.counter = 0; }

    /// Advances one cycle, annotating `data` with boundary masks.
    pub fn step(&mut self, data: u32) -> FramedWord {
        // The last octet of a multiframe is always the last octet of the word.
        let multiframe_last =
            if self.counter == self.clocks_per_multiframe - 1 { 1 << (OCTETS_PER_WORD - 1) } else { 0 };
        self.counter = if multiframe_last != 0 { 0 } else { self.counter + 1 };
        FramedWord { word: LinkWord { data, ctrl: 0 }, frame_last: self.frame_last, multiframe_last }
    }
}

/// Octet-stream side of frame removal.
///
/// Framing bookkeeping only exists on the insert side, so this is an identity
/// pass-through that validates the clock-grid invariants at construction.
#[derive(Debug)]
pub struct Deframer;

impl Deframer {
    /// Creates a deframer, checking the same grid invariants as [`Framer`].
    pub fn new(settings: &LinkSettings) -> Result<Self, ConfigError> {
        let f = settings.f();
        let k = settings.k();
        if f == 0 || f > OCTETS_PER_WORD as u32 || OCTETS_PER_WORD as u32 % f != 0 {
            return Err(ConfigError::PartialFrame { f, width: DATA_WIDTH as u32 });
        }
        let frames_per_clock = OCTETS_PER_WORD as u32 / f;
        if k % frames_per_clock != 0 {
            return Err(ConfigError::MultiframeAlignment { k, frames_per_clock });
        }
        Ok(Self)
    }

    /// Passes one word of octet data through.
    pub fn step(&self, word: LinkWord) -> u32 { word.data }
}
