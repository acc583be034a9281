//! Short code encoding.
//!
//! Codes are a 128-bit random value written in base `alphabet.len()` and then
//! forced to a fixed width: left-padded with the alphabet's first character,
//! or truncated to the right-most (least significant) characters.

use uuid::Uuid;

/// Default code length.
pub const DEFAULT_CODE_LENGTH: usize = 7;

/// Default alphabet: ASCII letters and digits.
pub const DEFAULT_ALPHABET: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Length and character set of generated codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeSettings {
    pub length: usize,
    pub alphabet: Vec<char>,
}

impl CodeSettings {
    /// Builds settings, rejecting unusable alphabets.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if `length` is zero, the alphabet
    /// has fewer than two characters, or it contains duplicates.
    pub fn new(length: usize, alphabet: &str) -> Result<Self, String> {
        if length == 0 {
            return Err("code length must be greater than 0".to_string());
        }

        let chars: Vec<char> = alphabet.chars().collect();
        if chars.len() < 2 {
            return Err("alphabet must contain at least 2 characters".to_string());
        }

        let mut sorted = chars.clone();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() != chars.len() {
            return Err("alphabet must not contain duplicate characters".to_string());
        }

        Ok(Self {
            length,
            alphabet: chars,
        })
    }

    pub fn contains(&self, c: char) -> bool {
        self.alphabet.contains(&c)
    }
}

impl Default for CodeSettings {
    fn default() -> Self {
        Self {
            length: DEFAULT_CODE_LENGTH,
            alphabet: DEFAULT_ALPHABET.chars().collect(),
        }
    }
}

/// Encodes `value` in base `alphabet.len()` at exactly `length` characters.
///
/// `alphabet` must have at least two characters.
pub fn encode_fixed_width(mut value: u128, alphabet: &[char], length: usize) -> String {
    let base = alphabet.len() as u128;
    let mut digits = Vec::new();

    while value > 0 {
        digits.push(alphabet[(value % base) as usize]);
        value /= base;
    }
    digits.reverse();

    if digits.len() < length {
        let mut padded = vec![alphabet[0]; length - digits.len()];
        padded.extend(digits);
        padded.into_iter().collect()
    } else {
        digits[digits.len() - length..].iter().collect()
    }
}

/// Generates a random candidate code. Uniqueness is not checked here.
pub fn generate_code(settings: &CodeSettings) -> String {
    let value = Uuid::new_v4().as_u128();
    encode_fixed_width(value, &settings.alphabet, settings.length)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn binary() -> Vec<char> {
        vec!['0', '1']
    }

    #[test]
    fn test_encode_most_significant_first() {
        assert_eq!(encode_fixed_width(6, &binary(), 3), "110");
    }

    #[test]
    fn test_encode_left_pads_with_first_character() {
        assert_eq!(encode_fixed_width(5, &binary(), 6), "000101");
        assert_eq!(encode_fixed_width(0, &binary(), 4), "0000");
    }

    #[test]
    fn test_encode_keeps_rightmost_characters_when_too_long() {
        // 45 = 101101
        assert_eq!(encode_fixed_width(45, &binary(), 4), "1101");
    }

    #[test]
    fn test_encode_max_value_base62() {
        let alphabet: Vec<char> = DEFAULT_ALPHABET.chars().collect();
        let code = encode_fixed_width(u128::MAX, &alphabet, 7);

        assert_eq!(code.chars().count(), 7);
    }

    #[test]
    fn test_generate_code_has_configured_length() {
        let settings = CodeSettings::default();
        for _ in 0..200 {
            assert_eq!(generate_code(&settings).chars().count(), 7);
        }
    }

    #[test]
    fn test_generate_code_uses_alphabet_only() {
        let settings = CodeSettings::new(12, "xyz").unwrap();
        for _ in 0..200 {
            let code = generate_code(&settings);
            assert_eq!(code.chars().count(), 12);
            assert!(code.chars().all(|c| settings.contains(c)), "{code}");
        }
    }

    #[test]
    fn test_generate_code_produces_distinct_codes() {
        let settings = CodeSettings::default();
        let codes: HashSet<String> = (0..1000).map(|_| generate_code(&settings)).collect();

        assert_eq!(codes.len(), 1000);
    }

    #[test]
    fn test_settings_reject_bad_input() {
        assert!(CodeSettings::new(0, DEFAULT_ALPHABET).is_err());
        assert!(CodeSettings::new(7, "a").is_err());
        assert!(CodeSettings::new(7, "abca").is_err());
        assert!(CodeSettings::new(7, "ab").is_ok());
    }
}
