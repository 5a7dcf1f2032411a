//! Cache keys for model results.
//!
//! A fingerprint is SHA-256 over every input that can change the model's answer.
//! Each field is length-prefixed, so ("ab", "c") and ("a", "bc") never collide.

use sha2::{Digest, Sha256};

/// Bump when the encoding below changes, to orphan old entries.
const SCHEME: &str = "fairmate-fp-v1";

#[derive(Debug, Clone)]
pub struct FingerprintInput<'a> {
    pub resume_text: &'a str,
    pub preferences: &'a str,
    pub catalog_digest: &'a str,
    pub model: &'a str,
    pub max_tokens: u32,
    pub temperature: f32,
    pub prompt_version: u32,
    pub match_limit: usize,
}

/// Trims and collapses all whitespace runs (including line wraps) to one space.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn fingerprint(input: &FingerprintInput<'_>) -> String {
    let mut hasher = Sha256::new();
    let mut field = |bytes: &[u8]| {
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    };

    field(SCHEME.as_bytes());
    field(normalize_text(input.resume_text).as_bytes());
    field(normalize_text(input.preferences).as_bytes());
    field(input.catalog_digest.as_bytes());
    field(input.model.as_bytes());
    field(&input.max_tokens.to_le_bytes());
    field(&input.temperature.to_bits().to_le_bytes());
    field(&input.prompt_version.to_le_bytes());
    field(&(input.match_limit as u64).to_le_bytes());

    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(resume: &'a str, prefs: &'a str) -> FingerprintInput<'a> {
        FingerprintInput {
            resume_text: resume,
            preferences: prefs,
            catalog_digest: "digest",
            model: "claude-sonnet-4-5",
            max_tokens: 1500,
            temperature: 0.2,
            prompt_version: 1,
            match_limit: 8,
        }
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = fingerprint(&input("Rust developer, 3 years", "fintech"));
        let b = fingerprint(&input("Rust developer, 3 years", "fintech"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_whitespace_differences_normalize_away() {
        let a = fingerprint(&input("Rust developer,\n  3 years ", "fintech"));
        let b = fingerprint(&input("Rust developer, 3 years", " fintech"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_any_input_change_changes_fingerprint() {
        let base = fingerprint(&input("resume", "prefs"));
        assert_ne!(base, fingerprint(&input("resume2", "prefs")));
        assert_ne!(base, fingerprint(&input("resume", "prefs2")));

        let mut other = input("resume", "prefs");
        other.catalog_digest = "other";
        assert_ne!(base, fingerprint(&other));

        let mut other = input("resume", "prefs");
        other.temperature = 0.3;
        assert_ne!(base, fingerprint(&other));

        let mut other = input("resume", "prefs");
        other.match_limit = 5;
        assert_ne!(base, fingerprint(&other));
    }

    #[test]
    fn test_field_boundaries_do_not_collide() {
        let a = fingerprint(&input("ab", "c"));
        let b = fingerprint(&input("a", "bc"));
        assert_ne!(a, b);
    }
}
