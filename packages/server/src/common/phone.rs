//! E.164 phone number validation.
//!
//! A phone number is the sole user identifier for both auth and record
//! ownership, so everything that accepts one validates the shape up front.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref E164: Regex = Regex::new(r"^\+[1-9]\d{1,14}$").expect("E.164 regex is valid");
}

/// Check that `value` is a plausible E.164 phone number (`+` followed by
/// 2-15 digits, no leading zero).
pub fn is_e164(value: &str) -> bool {
    E164.is_match(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_numbers() {
        assert!(is_e164("+15551234567"));
        assert!(is_e164("+5511987654321"));
        assert!(is_e164("+44"));
    }

    #[test]
    fn rejects_invalid_numbers() {
        assert!(!is_e164(""));
        assert!(!is_e164("15551234567")); // missing +
        assert!(!is_e164("+05551234567")); // leading zero
        assert!(!is_e164("+1555123456789012345")); // too long
        assert!(!is_e164("+1 555 123 4567")); // spaces
        assert!(!is_e164("+1555abc4567"));
    }
}
