//! Initial lane alignment sequence (JESD204B section 5.3.3.5).
//!
//! Four multiframes per lane, precomputed into a cycle-indexed word table:
//! each multiframe is bracketed by `/R/` and `/A/` and carries a ramping
//! octet counter; multiframe 1 additionally carries `/Q/` followed by the
//! serialized link configuration, so every lane announces its own lane ID.
//! The generator streams the table once per synchronization; the checker
//! replays it against the incoming stream.

use crate::constants::{control_char, OCTETS_PER_WORD};
use crate::settings::{ConfigError, LinkSettings, SETTINGS_LEN};
use crate::types::LinkWord;

/// Precomputed lane-alignment word sequence for one lane.
///
/// Immutable after construction; exactly `F * K` words (four multiframes at
/// four octets per word).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IlasTable {
    words: Vec<LinkWord>,
}

impl IlasTable {
    /// Builds the sequence from lane-patched settings.
    ///
    /// `with_counter` fills non-boundary octets with the ramping counter
    /// pattern; otherwise they are zero.
    pub fn new(settings: &LinkSettings, with_counter: bool) -> Result<Self, ConfigError> {
        let opm = settings.octets_per_multiframe() as usize;
        // Multiframe 1 must hold R, Q, the configuration block and the closing A.
        if opm < 2 + SETTINGS_LEN + 1 {
            return Err(ConfigError::MultiframeTooShort { octets: opm as u32 });
        }

        let config = settings.serialize();
        let mut octets: Vec<(u8, bool)> = Vec::with_capacity(4 * opm);
        for mf in 0..4usize {
            let base = mf * opm;
            let mut multiframe: Vec<(u8, bool)> =
                (0..opm).map(|j| (if with_counter { ((base + j) & 0xff) as u8 } else { 0 }, false)).collect();
            multiframe[0] = (control_char::R, true);
            multiframe[opm - 1] = (control_char::A, true);
            if mf == 1 {
                multiframe[1] = (control_char::Q, true);
                for (slot, &octet) in multiframe[2..2 + SETTINGS_LEN].iter_mut().zip(config.iter()) {
                    *slot = (octet, false);
                }
            }
            octets.extend(multiframe);
        }

        let words: Vec<LinkWord> = octets
            .chunks(OCTETS_PER_WORD)
            .map(|chunk| {
                let mut word = LinkWord::default();
                for (i, &(octet, ctrl)) in chunk.iter().enumerate() {
                    word.set_octet(i, octet, ctrl);
                }
                word
            })
            .collect();
        debug_assert_eq!(words.len(), (settings.f() * settings.k()) as usize);
        Ok(Self { words })
    }

    /// Sequence length in words.
    pub fn len(&self) -> usize { self.words.len() }

    /// True when the table holds no words.
    pub fn is_empty(&self) -> bool { self.words.is_empty() }

    /// The word at `index`.
    pub fn word(&self, index: usize) -> LinkWord { self.words[index] }
}

/// One generated lane-alignment cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IlasOut {
    /// Word to transmit this cycle.
    pub word: LinkWord,
    /// True on the final cycle of the sequence.
    pub last: bool,
}

/// Streams the precomputed sequence once, then holds `done`.
#[derive(Debug)]
pub struct IlasGenerator {
    table: IlasTable,
    counter: usize,
}

impl IlasGenerator {
    /// Creates a generator over `table`.
    pub fn new(table: IlasTable) -> Self { Self { table, counter: 0 } }

    /// Restarts the sequence.
    pub fn reset(&mut self) { self.counter = 0; }

    /// True once the whole sequence has been emitted.
    pub fn done(&self) -> bool { self.counter == self.table.len() }

    /// Advances one cycle.
    pub fn step(&mut self) -> IlasOut {
        let index = self.counter.min(self.table.len() - 1);
        let last = self.counter == self.table.len() - 1;
        if self.counter != self.table.len() {
            self.counter += 1;
        }
        IlasOut { word: self.table.word(index), last }
    }
}

/// True when `input` is a plausible sequence start: octet 0 is `/R/` with its
/// control flag set and no other control flags in the cycle.
pub fn start_valid(input: &LinkWord) -> bool { input.ctrl == 0b0001 && input.octet(0) == control_char::R }

/// Replays the precomputed sequence against the incoming stream.
///
/// Validity is per cycle (monitoring, not a latched failure); the surrounding
/// state machine decides whether a mismatch forces resynchronization.
#[derive(Debug)]
pub struct IlasChecker {
    table: IlasTable,
    counter: usize,
}

impl IlasChecker {
    /// Creates a checker over `table`.
    pub fn new(table: IlasTable) -> Self { Self { table, counter: 0 } }

    /// Restarts the comparison.
    pub fn reset(&mut self) { self.counter = 0; }

    /// True once the whole sequence has been compared.
    pub fn done(&self) -> bool { self.counter == self.table.len() }

    /// Compares one cycle, byte-for-byte and flag-for-flag.
    pub fn step(&mut self, input: LinkWord) -> bool {
        let index = self.counter.min(self.table.len() - 1);
        let valid = input == self.table.word(index);
        if self.counter != self.table.len() {
            self.counter += 1;
        }
        valid
    }
}
