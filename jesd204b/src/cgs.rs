//! Code-group synchronization.
//!
//! The CGS phase fills every octet of every cycle with the `/K/` comma
//! character so the receiver's transceiver can find octet boundaries. Both
//! directions are purely combinational.

use crate::constants::{control_char, OCTETS_PER_WORD};
use crate::types::LinkWord;

/// The fixed synchronization word: `/K/` on every octet, all flags set.
pub fn word() -> LinkWord { LinkWord::splat(control_char::K, true) }

/// True exactly when every octet of `input` is `/K/` with its flag set.
/// No latching; validity is per cycle.
pub fn valid(input: &LinkWord) -> bool {
    (0..OCTETS_PER_WORD).all(|i| input.octet(i) == control_char::K && input.is_ctrl(i))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_pattern_is_valid() {
        assert!(valid(&word()));
    }

    #[test]
    fn any_mismatch_drops_valid() {
        let mut corrupt = word();
        corrupt.set_octet(2, 0xbd, true);
        assert!(!valid(&corrupt));

        let mut unflagged = word();
        unflagged.ctrl = 0b0111;
        assert!(!valid(&unflagged));

        assert!(!valid(&LinkWord::default()));
    }
}
