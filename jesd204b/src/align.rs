//! Alignment-character handling (JESD204B section 5.3.3.4.3).
//!
//! On TX, octets whose scrambled value happens to equal an alignment
//! character are flagged as control characters when they sit on the matching
//! boundary; the boundary masks, not the byte values, are authoritative. On
//! RX, control flags are stripped before descrambling, and the lane stream is
//! re-sliced to the octet-0 boundary found via the multiframe-start marker.

use crate::constants::{control_char, OCTETS_PER_WORD};
use crate::types::{FramedWord, LinkWord};

/// Flags boundary octets matching `/A/` or `/F/` as control characters.
/// Zero latency.
#[derive(Debug, Default)]
pub struct AlignInserter;

impl AlignInserter {
    /// Annotates one framed word.
    pub fn step(&self, input: FramedWord) -> FramedWord {
        let mut output = input;
        for i in 0..OCTETS_PER_WORD {
            let bit = 1u8 << i;
            let octet = input.word.octet(i);
            // Last scrambled octet of a multiframe that equals "A", or last
            // scrambled octet of a frame (but not of a multiframe) that
            // equals "F", is transmitted as a control character.
            if octet == control_char::A {
                if input.multiframe_last & bit != 0 {
                    output.word.ctrl |= bit;
                }
            } else if octet == control_char::F
                && input.frame_last & bit != 0
                && input.multiframe_last & bit == 0
            {
                output.word.ctrl |= bit;
            }
        }
        output
    }
}

/// Strips control flags ahead of the descrambler: alignment characters carry
/// valid scrambled data and must not reach it as "control". Zero latency.
#[derive(Debug, Default)]
pub struct AlignReplacer;

impl AlignReplacer {
    /// Clears the control flags of one word.
    pub fn step(&self, input: LinkWord) -> LinkWord { LinkWord { data: input.data, ctrl: 0 } }
}

/// Re-aligns the incoming lane stream to the octet-0 boundary.
///
/// A `/R/` control character marks the start of a multiframe; its octet slot
/// is latched as the byte-alignment offset, and the previous and current
/// words are concatenated and re-sliced from that offset. Corrects sub-word
/// lane skew from the transceiver. One cycle of latency.
#[derive(Debug, Default)]
pub struct Aligner {
    alignment: usize,
    last: LinkWord,
}

impl Aligner {
    /// Pipeline latency in cycles.
    pub const LATENCY: usize = 1;

    /// Creates an aligner with a zero offset.
    pub fn new() -> Self { Self::default() }

    /// Advances one cycle, returning the re-sliced word.
    pub fn step(&mut self, input: LinkWord) -> LinkWord {
        let data = (u64::from(input.data) << 32) | u64::from(self.last.data);
        let ctrl = (input.ctrl << 4) | self.last.ctrl;
        let output = LinkWord {
            data: (data >> (8 * self.alignment)) as u32,
            ctrl: (ctrl >> self.alignment) & 0xf,
        };

        self.last = input;
        for i in 0..OCTETS_PER_WORD {
            if input.is_ctrl(i) && input.octet(i) == control_char::R {
                self.alignment = i;
            }
        }
        output
    }
}
