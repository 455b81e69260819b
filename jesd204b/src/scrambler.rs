//! Scrambling modules (JESD204B section 5.2.3).
//!
//! The self-synchronizing 1 + x^14 + x^15 scrambler applied to the whole link
//! word each cycle. The 15-bit running state is concatenated above the
//! data word and two taps of the concatenation are XORed to produce the
//! output; the descrambler applies the algebraic inverse on the incoming
//! still-scrambled data, so it locks onto the transmitter's sequence within
//! one word regardless of reset phase. Both directions carry one cycle of
//! registered latency.

use crate::constants::DATA_WIDTH;

/// Scrambler seed loaded on reset.
pub const SEED: u16 = 0x7f80;

/// Reorders the word so wire octet 0 is the most-significant octet of the
/// shift-register arithmetic.
fn swizzle(word: u32) -> u32 { word.swap_bytes() }

/// Link-word scrambler. One cycle of latency; `valid` rises the cycle after
/// reset release.
#[derive(Debug)]
pub struct Scrambler {
    state: u16,
    out: u32,
    valid: bool,
}

impl Default for Scrambler {
    fn default() -> Self { Self::new() }
}

impl Scrambler {
    /// Pipeline latency in cycles.
    pub const LATENCY: usize = 1;

    /// Creates a scrambler in the reset state.
    pub fn new() -> Self { Self { state: SEED, out: 0, valid: false } }

    /// Synchronous reset: reloads the seed; takes effect on the following
    /// cycle's output.
    pub fn reset(&mut self) { *self = Self::new(); }

    /// True once the pipeline register holds scrambled data.
    pub fn valid(&self) -> bool { self.valid }

    /// Advances one cycle, returning the previous cycle's scrambled word and
    /// its validity.
    pub fn step(&mut self, data: u32) -> (bool, u32) {
        let out = (self.valid, self.out);
        let swizzled = swizzle(data);
        // The feedback word loops back into the low bits of the concatenation,
        // so it is resolved from the top tap downwards.
        let mut full = u64::from(self.state) << DATA_WIDTH;
        let mut feedback: u32 = 0;
        for i in (0..DATA_WIDTH).rev() {
            let bit = ((full >> (15 + i)) ^ (full >> (14 + i)) ^ u64::from(swizzled >> i)) & 1;
            feedback |= (bit as u32) << i;
            full |= bit << i;
        }
        self.out = swizzle(feedback);
        self.state = (feedback & 0x7fff) as u16;
        self.valid = true;
        out
    }
}

/// Link-word descrambler. Same tap structure applied to the incoming data;
/// one cycle of latency.
#[derive(Debug)]
pub struct Descrambler {
    state: u16,
    out: u32,
    valid: bool,
}

impl Default for Descrambler {
    fn default() -> Self { Self::new() }
}

impl Descrambler {
    /// Pipeline latency in cycles.
    pub const LATENCY: usize = 1;

    /// Creates a descrambler in the reset state.
    pub fn new() -> Self { Self { state: SEED, out: 0, valid: false } }

    /// Synchronous reset: reloads the seed; takes effect on the following
    /// cycle's output.
    pub fn reset(&mut self) { *self = Self::new(); }

    /// True once the pipeline register holds descrambled data.
    pub fn valid(&self) -> bool { self.valid }

    /// Advances one cycle, returning the previous cycle's descrambled word
    /// and its validity.
    pub fn step(&mut self, data: u32) -> (bool, u32) {
        let out = (self.valid, self.out);
        let swizzled = swizzle(data);
        let full = (u64::from(self.state) << DATA_WIDTH) | u64::from(swizzled);
        let mut feedback: u32 = 0;
        for i in 0..DATA_WIDTH {
            let bit = ((full >> (15 + i)) ^ (full >> (14 + i)) ^ (full >> i)) & 1;
            feedback |= (bit as u32) << i;
        }
        self.out = swizzle(feedback);
        self.state = (full & 0x7fff) as u16;
        self.valid = true;
        out
    }
}
