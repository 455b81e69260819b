//! Transport layer: sample/octet remapping (JESD204B section 5.1.3).
//!
//! Maps `M` converters of `S` samples per frame onto `L` lanes of `F` octets
//! per frame and back. Samples are padded to nibble granularity
//! (`ceil(NP/4)` nibbles per word), nibbled most-significant first, paired
//! into octets high nibble first, and dealt round-robin across lanes in
//! groups of F octets per frame; lane `i` carries octets `[i*F, (i+1)*F)` of
//! each frame. Purely combinational; multiple frames per clock are handled
//! by repeating the mapping across the lane word.

use arrayvec::ArrayVec;
use itertools::Itertools;

use crate::constants::OCTETS_PER_WORD;
use crate::settings::{ConfigError, LinkSettings};

/// Upper bound on the per-frame scratch sizes: L lanes of F octets.
const MAX_FRAME_OCTETS: usize = 32 * OCTETS_PER_WORD;

/// Per-link mapping parameters shared by both directions.
#[derive(Debug, Clone, Copy)]
struct Geometry {
    lanes: usize,
    converters: usize,
    samples_per_frame: usize,
    octets_per_frame: usize,
    sample_bits: u32,
    nibbles_per_word: usize,
    frames_per_clock: usize,
    samples_per_clock: usize,
}

impl Geometry {
    fn new(settings: &LinkSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self {
            lanes: settings.l() as usize,
            converters: settings.m() as usize,
            samples_per_frame: settings.s() as usize,
            octets_per_frame: settings.f() as usize,
            sample_bits: settings.n(),
            nibbles_per_word: settings.nibbles_per_word() as usize,
            frames_per_clock: settings.frames_per_clock() as usize,
            samples_per_clock: settings.samples_per_clock() as usize,
        })
    }

    fn sample_mask(&self) -> u32 {
        if self.sample_bits == 32 {
            u32::MAX
        } else {
            (1 << self.sample_bits) - 1
        }
    }
}

/// Converter-samples to lane-words mapping.
#[derive(Debug)]
pub struct TransportTx {
    geometry: Geometry,
}

impl TransportTx {
    /// Creates the mapper for validated settings.
    pub fn new(settings: &LinkSettings) -> Result<Self, ConfigError> {
        Ok(Self { geometry: Geometry::new(settings)? })
    }

    /// Samples consumed per converter per cycle.
    pub fn samples_per_clock(&self) -> usize { self.geometry.samples_per_clock }

    /// Maps one cycle of samples (`samples[converter][sample]`) into one lane
    /// word per lane.
    pub fn map(&self, samples: &[Vec<u32>], lanes: &mut [u32]) {
        let g = &self.geometry;
        debug_assert_eq!(samples.len(), g.converters);
        debug_assert_eq!(lanes.len(), g.lanes);
        lanes.fill(0);

        let mask = g.sample_mask();
        for frame in 0..g.frames_per_clock {
            let first_sample = frame * g.samples_per_frame;
            let first_octet = frame * g.octets_per_frame;

            // The frame's words, one per sample, converter-major, then
            // nibbles most significant first, then octets high nibble first.
            let words = (0..g.converters)
                .flat_map(|m| (0..g.samples_per_frame).map(move |s| samples[m][first_sample + s] & mask));
            let nibbles =
                words.flat_map(|word| (0..g.nibbles_per_word).rev().map(move |i| ((word >> (4 * i)) & 0xf) as u8));
            let octets = nibbles.tuples().map(|(high, low)| (high << 4) | low);

            // Lane i carries octets [i*F, (i+1)*F) of the frame.
            for (index, octet) in octets.enumerate() {
                let lane = index / g.octets_per_frame;
                let slot = first_octet + index % g.octets_per_frame;
                lanes[lane] |= u32::from(octet) << (8 * slot);
            }
        }
    }
}

/// Lane-words to converter-samples mapping; the exact inverse of
/// [`TransportTx`].
#[derive(Debug)]
pub struct TransportRx {
    geometry: Geometry,
}

impl TransportRx {
    /// Creates the mapper for validated settings.
    pub fn new(settings: &LinkSettings) -> Result<Self, ConfigError> {
        Ok(Self { geometry: Geometry::new(settings)? })
    }

    /// Samples produced per converter per cycle.
    pub fn samples_per_clock(&self) -> usize { self.geometry.samples_per_clock }

    /// Maps one lane word per lane back into samples
    /// (`samples[converter][sample]`).
    pub fn map(&self, lanes: &[u32], samples: &mut [Vec<u32>]) {
        let g = &self.geometry;
        debug_assert_eq!(lanes.len(), g.lanes);
        debug_assert_eq!(samples.len(), g.converters);

        let mask = g.sample_mask();
        for frame in 0..g.frames_per_clock {
            let first_sample = frame * g.samples_per_frame;
            let first_octet = frame * g.octets_per_frame;

            // The frame's octets in lane order.
            let octets: ArrayVec<u8, MAX_FRAME_OCTETS> = (0..g.lanes)
                .flat_map(|lane| {
                    (0..g.octets_per_frame).map(move |j| (lanes[lane] >> (8 * (first_octet + j))) as u8)
                })
                .collect();

            // Rebuild each word from its nibbles, most significant first.
            let mut nibbles = octets.iter().flat_map(|&octet| [octet >> 4, octet & 0xf]);
            for m in 0..g.converters {
                for s in 0..g.samples_per_frame {
                    let mut word: u32 = 0;
                    for _ in 0..g.nibbles_per_word {
                        word = (word << 4) | u32::from(nibbles.next().unwrap_or(0));
                    }
                    samples[m][first_sample + s] = word & mask;
                }
            }
        }
    }
}

/// Whitens an STPL seed the way the test-pattern convention suggests.
fn seed_to_data(seed: u32, random: bool) -> u32 {
    if random {
        seed.wrapping_add(1).wrapping_mul(0x3141_5979).wrapping_add(1) & 0xffff
    } else {
        seed
    }
}

/// Simple transport-layer pattern generator (JESD204B section 5.1.6.2).
///
/// Emits the same deterministic per-converter pattern every cycle, derived
/// from `(converter << 8) | sample_index`.
#[derive(Debug)]
pub struct StplGenerator {
    geometry: Geometry,
    random: bool,
}

impl StplGenerator {
    /// Creates the generator; `random` selects the whitened pattern.
    pub fn new(settings: &LinkSettings, random: bool) -> Result<Self, ConfigError> {
        Ok(Self { geometry: Geometry::new(settings)?, random })
    }

    /// Fills one cycle of converter samples with the pattern.
    pub fn fill(&self, samples: &mut [Vec<u32>]) {
        let g = &self.geometry;
        let mask = g.sample_mask();
        for (m, converter) in samples.iter_mut().enumerate() {
            for (j, sample) in converter.iter_mut().enumerate() {
                let seed = ((m as u32) << 8) | (j % g.samples_per_frame) as u32;
                *sample = seed_to_data(seed, self.random) & mask;
            }
        }
    }
}

/// Simple transport-layer pattern checker.
///
/// Compares received samples against the generator's pattern; the error
/// counter advances once per mismatching cycle.
#[derive(Debug)]
pub struct StplChecker {
    expected: Vec<Vec<u32>>,
    errors: u32,
}

impl StplChecker {
    /// Creates the checker; `random` must match the generator's setting.
    pub fn new(settings: &LinkSettings, random: bool) -> Result<Self, ConfigError> {
        let generator = StplGenerator::new(settings, random)?;
        let geometry = generator.geometry;
        let mut expected = vec![vec![0u32; geometry.samples_per_clock]; geometry.converters];
        generator.fill(&mut expected);
        Ok(Self { expected, errors: 0 })
    }

    /// Compares one cycle of received samples; true when they match.
    pub fn step(&mut self, samples: &[Vec<u32>]) -> bool {
        let matches = samples == self.expected.as_slice();
        if !matches {
            self.errors = self.errors.wrapping_add(1);
        }
        matches
    }

    /// Mismatching cycles observed so far.
    pub fn errors(&self) -> u32 { self.errors }

    /// Clears the error counter.
    pub fn reset_errors(&mut self) { self.errors = 0; }
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::settings::{ChecksumMode, LinkSettings, SettingsValues};

    fn settings(l: u32, m: u32, s: u32, n: u32, np: u32, f: u32) -> LinkSettings {
        LinkSettings::from_values(&SettingsValues {
            did: 0x5a,
            bid: 0x5,
            lid: 0,
            l,
            scr: 1,
            f,
            k: 32,
            m,
            n,
            cs: 0,
            np,
            subclassv: 1,
            s,
            jesdv: 1,
            cf: 0,
            hd: 0,
            checksum_mode: ChecksumMode::FieldSum,
        })
        .expect("consistent test settings")
    }

    #[test]
    fn two_converters_across_two_lanes() {
        // L=2, M=2, S=1, N=NP=16, F=2: one 16-bit sample per converter per
        // frame, one frame per lane word pair of octets.
        let settings = settings(2, 2, 1, 16, 16, 2);
        let tx = TransportTx::new(&settings).unwrap();

        // Two frames per clock: repeat each converter's sample.
        let samples = vec![vec![0x1234, 0x1234], vec![0x5678, 0x5678]];
        let mut lanes = [0u32; 2];
        tx.map(&samples, &mut lanes);

        // Most-significant octet of each sample leads on the wire: lane 0
        // carries 0x12 then 0x34 in both frames.
        assert_eq!(lanes[0], 0x3412_3412);
        assert_eq!(lanes[1], 0x7856_7856);
    }

    #[test]
    fn octets_deal_round_robin_across_four_lanes() {
        // L=4, M=4, S=1, N=NP=16, F=2: frame octets 0..8 split two per lane.
        let settings = settings(4, 4, 1, 16, 16, 2);
        let tx = TransportTx::new(&settings).unwrap();

        // Two frames per clock; repeat each converter's sample in both frames.
        let samples: Vec<Vec<u32>> = (0..4).map(|m| vec![0x1100 * (m + 1); 2]).collect();
        let mut lanes = [0u32; 4];
        tx.map(&samples, &mut lanes);

        for (lane, word) in lanes.iter().enumerate() {
            let sample = 0x1100 * (lane as u32 + 1);
            let frame = (sample >> 8) | ((sample & 0xff) << 8);
            assert_eq!(*word, frame | (frame << 16), "lane {lane}");
        }
    }

    #[test]
    fn roundtrip_over_parameter_combinations() {
        // Each tuple satisfies F = M*S*NP/(8*L) with F in {1, 2, 4}.
        let combos = [
            (1, 1, 1, 16, 16, 2),
            (2, 2, 1, 16, 16, 2),
            (4, 4, 1, 16, 16, 2),
            (2, 1, 1, 16, 16, 1),
            (1, 2, 1, 16, 16, 4),
            (4, 2, 2, 16, 16, 2),
            (2, 4, 1, 12, 16, 4),
            (1, 1, 2, 8, 8, 2),
        ];
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);

        for &(l, m, s, n, np, f) in &combos {
            let settings = settings(l, m, s, n, np, f);
            let tx = TransportTx::new(&settings).unwrap();
            let rx = TransportRx::new(&settings).unwrap();
            let mask = if n == 32 { u32::MAX } else { (1u32 << n) - 1 };

            for _ in 0..16 {
                let samples: Vec<Vec<u32>> = (0..m)
                    .map(|_| (0..tx.samples_per_clock()).map(|_| rng.gen::<u32>() & mask).collect())
                    .collect();
                let mut lanes = vec![0u32; l as usize];
                tx.map(&samples, &mut lanes);

                let mut recovered = vec![vec![0u32; rx.samples_per_clock()]; m as usize];
                rx.map(&lanes, &mut recovered);
                assert_eq!(recovered, samples, "L={l} M={m} S={s} N={n} NP={np} F={f}");
            }
        }
    }

    #[test]
    fn stpl_pattern_roundtrips_through_the_transport() {
        let settings = settings(2, 2, 1, 16, 16, 2);
        let tx = TransportTx::new(&settings).unwrap();
        let rx = TransportRx::new(&settings).unwrap();
        let generator = StplGenerator::new(&settings, true).unwrap();
        let mut checker = StplChecker::new(&settings, true).unwrap();

        let mut samples = vec![vec![0u32; tx.samples_per_clock()]; 2];
        generator.fill(&mut samples);
        let mut lanes = vec![0u32; 2];
        tx.map(&samples, &mut lanes);
        let mut recovered = vec![vec![0u32; rx.samples_per_clock()]; 2];
        rx.map(&lanes, &mut recovered);

        assert!(checker.step(&recovered));
        assert_eq!(checker.errors(), 0);

        recovered[1][0] ^= 1;
        assert!(!checker.step(&recovered));
        assert!(!checker.step(&recovered));
        assert_eq!(checker.errors(), 2);
    }
}
