//! Link configuration register.
//!
//! The 14-octet packed settings block exchanged during lane alignment
//! (JESD204B section 8.3). Fields are addressed through a closed [`Field`]
//! enum backed by a static placement table; count-like parameters (L, M, K,
//! ...) are stored decremented on the wire but read and written as natural
//! counts here.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::OCTETS_PER_WORD;

/// Number of octets in the packed configuration register.
pub const SETTINGS_LEN: usize = 14;

/// Closed set of configuration fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// Adjustment resolution steps for the DAC LMFC. Subclass 2 only.
    Adjcnt,
    /// Adjustment direction, 0 = advance, 1 = delay. Subclass 2 only.
    Adjdir,
    /// Bank ID.
    Bid,
    /// Control words per frame per link.
    Cf,
    /// Control bits per sample.
    Cs,
    /// Device ID.
    Did,
    /// Octets per frame.
    F,
    /// High-density format.
    Hd,
    /// JESD204 version.
    Jesdv,
    /// Frames per multiframe.
    K,
    /// Lane count.
    L,
    /// Lane ID.
    Lid,
    /// Converter count.
    M,
    /// Converter resolution in bits.
    N,
    /// Total bits per sample, including control bits.
    Np,
    /// Phase adjustment request. Subclass 2 only.
    Phadj,
    /// Samples per converter per frame.
    S,
    /// Scrambling enable.
    Scr,
    /// Device subclass version.
    Subclassv,
    /// Reserved field 1.
    Res1,
    /// Reserved field 2.
    Res2,
    /// Checksum.
    Fchk,
}

impl Field {
    /// Every field, in descriptor-table order.
    pub const ALL: [Field; 22] = [
        Field::Adjcnt,
        Field::Adjdir,
        Field::Bid,
        Field::Cf,
        Field::Cs,
        Field::Did,
        Field::F,
        Field::Hd,
        Field::Jesdv,
        Field::K,
        Field::L,
        Field::Lid,
        Field::M,
        Field::N,
        Field::Np,
        Field::Phadj,
        Field::S,
        Field::Scr,
        Field::Subclassv,
        Field::Res1,
        Field::Res2,
        Field::Fchk,
    ];

    fn desc(self) -> FieldDesc { FIELD_TABLE[self as usize] }
}

/// Bit-field placement of one configuration field.
#[derive(Debug, Clone, Copy)]
struct FieldDesc {
    octet: usize,
    offset: u32,
    width: u32,
    /// Count fields are stored decremented so callers pass natural counts (>= 1).
    count: bool,
}

const fn desc(octet: usize, offset: u32, width: u32, count: bool) -> FieldDesc {
    FieldDesc { octet, offset, width, count }
}

/// Field placements, indexed by `Field` discriminant.
static FIELD_TABLE: [FieldDesc; 22] = [
    desc(1, 4, 4, false),  // ADJCNT
    desc(2, 6, 1, false),  // ADJDIR
    desc(1, 0, 4, false),  // BID
    desc(10, 0, 5, false), // CF
    desc(7, 6, 2, false),  // CS
    desc(0, 0, 8, false),  // DID
    desc(4, 0, 8, true),   // F
    desc(10, 7, 1, false), // HD
    desc(9, 5, 3, false),  // JESDV
    desc(5, 0, 8, true),   // K
    desc(3, 0, 5, true),   // L
    desc(2, 0, 5, false),  // LID
    desc(6, 0, 8, true),   // M
    desc(7, 0, 5, true),   // N
    desc(8, 0, 5, true),   // NP
    desc(2, 5, 1, false),  // PHADJ
    desc(9, 0, 5, true),   // S
    desc(3, 7, 1, false),  // SCR
    desc(8, 5, 3, false),  // SUBCLASSV
    desc(11, 0, 8, false), // RES1
    desc(12, 0, 8, false), // RES2
    desc(13, 0, 8, false), // FCHK
];

/// Checksum computation convention.
///
/// Fixtures disagree on the convention across vendors, so it is an explicit
/// per-link choice and never inferred.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumMode {
    /// Sum of the 21 decoded field values, excluding FCHK (JESD204B standard).
    #[default]
    FieldSum,
    /// Sum of the first 11 raw octets (Analog Devices convention).
    OctetSum,
}

/// A field write whose natural value does not fit the field's bit width.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("value {value} for {field:?} does not fit in {width} bits")]
pub struct RangeError {
    /// Field being written.
    pub field: Field,
    /// Rejected natural value.
    pub value: u32,
    /// Field width in bits.
    pub width: u32,
}

/// Imported settings whose stored checksum disagrees with the recomputed one.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("stored checksum {stored:#04x} does not match computed {computed:#04x}")]
pub struct ChecksumMismatch {
    /// Checksum carried by the imported octets.
    pub stored: u8,
    /// Checksum recomputed from the imported fields.
    pub computed: u8,
}

/// Inconsistent or unsupported field combination. Fatal at configuration time.
#[allow(missing_docs)]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("F = {f} is inconsistent, M*S*NP/(8*L) = {num}/{den}")]
    InconsistentF { f: u32, num: u32, den: u32 },
    #[error("only F = 1, 2 or 4 is supported, got F = {f}")]
    UnsupportedF { f: u32 },
    #[error("F = {f} octets per frame does not divide the {width}-bit link word")]
    PartialFrame { f: u32, width: u32 },
    #[error("K = {k} frames per multiframe is not a multiple of {frames_per_clock} frames per clock")]
    MultiframeAlignment { k: u32, frames_per_clock: u32 },
    #[error("a multiframe of {octets} octets cannot carry the lane-alignment configuration block")]
    MultiframeTooShort { octets: u32 },
}

/// Any error raised while building or importing settings.
#[allow(missing_docs)]
#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    #[error(transparent)]
    Range(#[from] RangeError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Checksum(#[from] ChecksumMismatch),
}

/// Natural-valued settings, the named-field interchange form.
///
/// Counts are natural (>= 1); fields not listed in a serialized form fall back
/// to the usual defaults (scrambling on, version/subclass 1, IDs zero).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsValues {
    /// Device ID.
    #[serde(default)]
    pub did: u32,
    /// Bank ID.
    #[serde(default)]
    pub bid: u32,
    /// Lane ID.
    #[serde(default)]
    pub lid: u32,
    /// Lane count.
    pub l: u32,
    /// Scrambling enable.
    #[serde(default = "one")]
    pub scr: u32,
    /// Octets per frame.
    pub f: u32,
    /// Frames per multiframe.
    pub k: u32,
    /// Converter count.
    pub m: u32,
    /// Converter resolution in bits.
    pub n: u32,
    /// Control bits per sample.
    #[serde(default)]
    pub cs: u32,
    /// Total bits per sample.
    pub np: u32,
    /// Device subclass version.
    #[serde(default = "one")]
    pub subclassv: u32,
    /// Samples per converter per frame.
    pub s: u32,
    /// JESD204 version.
    #[serde(default = "one")]
    pub jesdv: u32,
    /// Control words per frame per link.
    #[serde(default)]
    pub cf: u32,
    /// High-density format.
    #[serde(default)]
    pub hd: u32,
    /// Checksum convention for this link.
    #[serde(default)]
    pub checksum_mode: ChecksumMode,
}

fn one() -> u32 { 1 }

/// The packed 14-octet link configuration register.
///
/// Constructed once per link at configuration time; read-only while the link
/// runs (the engines share it immutably). [`LinkSettings::recompute_checksum`]
/// must be called after a batch of field writes so multi-field updates stay
/// consistent before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSettings {
    octets: [u8; SETTINGS_LEN],
    checksum_mode: ChecksumMode,
}

macro_rules! natural_getters {
    ($($(#[$doc:meta])* $field:ident),* $(,)?) => { paste::paste! { $(
        $(#[$doc])*
        pub fn $field(&self) -> u32 { self.get(Field::[<$field:camel>]) }
    )* } };
}

impl LinkSettings {
    /// Creates settings with the usual defaults: scrambling enabled, JESD204
    /// version and subclass 1, everything else zeroed.
    pub fn new(checksum_mode: ChecksumMode) -> Self {
        let mut settings = Self { octets: [0; SETTINGS_LEN], checksum_mode };
        settings.store(Field::Scr, 1);
        settings.store(Field::Jesdv, 1);
        settings.store(Field::Subclassv, 1);
        settings
    }

    /// Builds validated settings from the named-field form.
    pub fn from_values(values: &SettingsValues) -> Result<Self, SettingsError> {
        let mut settings = Self::new(values.checksum_mode);
        settings.set(Field::Did, values.did)?;
        settings.set(Field::Bid, values.bid)?;
        settings.set(Field::Lid, values.lid)?;
        settings.set(Field::L, values.l)?;
        settings.set(Field::Scr, values.scr)?;
        settings.set(Field::F, values.f)?;
        settings.set(Field::K, values.k)?;
        settings.set(Field::M, values.m)?;
        settings.set(Field::N, values.n)?;
        settings.set(Field::Cs, values.cs)?;
        settings.set(Field::Np, values.np)?;
        settings.set(Field::Subclassv, values.subclassv)?;
        settings.set(Field::S, values.s)?;
        settings.set(Field::Jesdv, values.jesdv)?;
        settings.set(Field::Cf, values.cf)?;
        settings.set(Field::Hd, values.hd)?;
        settings.recompute_checksum()?;
        Ok(settings)
    }

    /// Exports the named-field form.
    pub fn to_values(&self) -> SettingsValues {
        SettingsValues {
            did: self.get(Field::Did),
            bid: self.get(Field::Bid),
            lid: self.get(Field::Lid),
            l: self.l(),
            scr: self.scr(),
            f: self.f(),
            k: self.k(),
            m: self.m(),
            n: self.n(),
            cs: self.cs(),
            np: self.np(),
            subclassv: self.subclassv(),
            s: self.s(),
            jesdv: self.jesdv(),
            cf: self.get(Field::Cf),
            hd: self.get(Field::Hd),
            checksum_mode: self.checksum_mode,
        }
    }

    /// Writes a field as a natural value.
    pub fn set(&mut self, field: Field, value: u32) -> Result<(), RangeError> {
        let desc = field.desc();
        let encoded = if desc.count {
            value.checked_sub(1).ok_or(RangeError { field, value, width: desc.width })?
        } else {
            value
        };
        if encoded >= 1 << desc.width {
            return Err(RangeError { field, value, width: desc.width });
        }
        self.store(field, encoded);
        Ok(())
    }

    /// Reads a field back as a natural value.
    pub fn get(&self, field: Field) -> u32 {
        let desc = field.desc();
        let raw = (u32::from(self.octets[desc.octet]) >> desc.offset) & ((1 << desc.width) - 1);
        if desc.count {
            raw + 1
        } else {
            raw
        }
    }

    natural_getters! {
        /// Lane count.
        l,
        /// Octets per frame.
        f,
        /// Frames per multiframe.
        k,
        /// Converter count.
        m,
        /// Converter resolution in bits.
        n,
        /// Total bits per sample.
        np,
        /// Samples per converter per frame.
        s,
        /// Scrambling enable.
        scr,
        /// Lane ID.
        lid,
        /// Control bits per sample.
        cs,
        /// Device subclass version.
        subclassv,
        /// JESD204 version.
        jesdv,
    }

    /// Checksum convention for this link.
    pub fn checksum_mode(&self) -> ChecksumMode { self.checksum_mode }

    /// Computes the checksum of the current field values without storing it.
    pub fn checksum(&self) -> u8 {
        match self.checksum_mode {
            ChecksumMode::OctetSum => self.octets[..11].iter().map(|&o| u32::from(o)).sum::<u32>() as u8,
            ChecksumMode::FieldSum => {
                Field::ALL.iter().filter(|&&f| f != Field::Fchk).map(|&f| self.get(f)).sum::<u32>() as u8
            }
        }
    }

    /// Stores the checksum and re-checks field consistency.
    ///
    /// Must be invoked after a batch of field writes; field writes themselves
    /// never touch FCHK.
    pub fn recompute_checksum(&mut self) -> Result<(), ConfigError> {
        let value = self.checksum();
        self.store(Field::Fchk, value.into());
        self.validate()
    }

    /// Checks the F/M/S/NP/L consistency invariant and the supported F values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let f = self.f();
        let num = self.m() * self.s() * self.np();
        let den = 8 * self.l();
        if num % den != 0 || num / den != f {
            return Err(ConfigError::InconsistentF { f, num, den });
        }
        if !matches!(f, 1 | 2 | 4) {
            return Err(ConfigError::UnsupportedF { f });
        }
        Ok(())
    }

    /// Exports the raw register octets.
    pub fn serialize(&self) -> [u8; SETTINGS_LEN] { self.octets }

    /// Imports raw register octets, verifying the stored checksum and the
    /// field consistency invariants.
    pub fn deserialize(octets: [u8; SETTINGS_LEN], checksum_mode: ChecksumMode) -> Result<Self, SettingsError> {
        let settings = Self { octets, checksum_mode };
        let computed = settings.checksum();
        let stored = settings.get(Field::Fchk) as u8;
        if stored != computed {
            return Err(ChecksumMismatch { stored, computed }.into());
        }
        settings.validate()?;
        Ok(settings)
    }

    /// Frames consumed per protocol-clock cycle. Meaningful once validated.
    pub fn frames_per_clock(&self) -> u32 { OCTETS_PER_WORD as u32 / self.f() }

    /// Protocol-clock cycles per multiframe.
    pub fn lmfc_cycles(&self) -> u32 { self.k() / self.frames_per_clock() }

    /// Octets per multiframe on one lane.
    pub fn octets_per_multiframe(&self) -> u32 { self.f() * self.k() }

    /// Nibbles per transport word (one sample padded to nibble granularity).
    pub fn nibbles_per_word(&self) -> u32 { (self.np() + 3) / 4 }

    /// Samples per converter per protocol-clock cycle.
    pub fn samples_per_clock(&self) -> u32 { self.s() * self.frames_per_clock() }

    /// Width of one converter's per-cycle sample window, in bits.
    pub fn converter_width(&self) -> u32 { self.n() * self.samples_per_clock() }

    /// Unchecked write of an already-encoded value. Callers guarantee fit.
    fn store(&mut self, field: Field, encoded: u32) {
        let desc = field.desc();
        let mask = (((1u32 << desc.width) - 1) << desc.offset) as u8;
        self.octets[desc.octet] &= !mask;
        self.octets[desc.octet] |= ((encoded << desc.offset) as u8) & mask;
    }
}

impl fmt::Display for LinkSettings {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        for octet in self.octets {
            write!(fmt, "{octet:02x} ")?;
        }
        for (i, field) in Field::ALL.iter().enumerate() {
            if i % 4 == 0 {
                writeln!(fmt)?;
            }
            write!(fmt, "{:>10}: {:3} ", format!("{field:?}").to_uppercase(), self.get(*field))?;
        }
        Ok(())
    }
}

/// Canonical two-lane test configuration: L=2, M=2, S=1, N=NP=16, F=2, K=16.
#[cfg(test)]
pub(crate) fn demo_settings() -> LinkSettings {
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
    .expect("demo settings are consistent")
}
