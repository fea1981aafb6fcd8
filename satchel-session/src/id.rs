//! Session identifier policy.
//!
//! Identifiers are drawn uniformly from `[0-9A-Za-z-]` (63 symbols) using the
//! operating system's random source.

use crate::error::{SessionError, SessionResult, StorageOp};
use rand::TryRngCore;
use rand::rngs::OsRng;

/// Alphabet every identifier is drawn from.
pub const ALPHABET: &[u8; 63] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz-";

/// Length used when none is configured.
pub const DEFAULT_ID_LENGTH: usize = 127;

/// Shortest length a store accepts.
pub const MIN_ID_LENGTH: usize = 32;

/// Upper bound on generate-and-check rounds in `create_id`.
pub const MAX_CREATE_ATTEMPTS: usize = 64;

/// Length and alphabet rules shared by the built-in stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionIds {
    length: usize,
}

impl Default for SessionIds {
    fn default() -> Self {
        Self {
            length: DEFAULT_ID_LENGTH,
        }
    }
}

impl SessionIds {
    /// Rules for identifiers of exactly `length` characters.
    pub fn with_length(length: usize) -> SessionResult<Self> {
        if length < MIN_ID_LENGTH {
            return Err(SessionError::Configuration(format!(
                "could not set length session ID below {}",
                MIN_ID_LENGTH
            )));
        }
        Ok(Self { length })
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// `true` when `id` has the configured length and only alphabet symbols.
    pub fn is_well_formed(&self, id: &str) -> bool {
        id.len() == self.length && Self::has_valid_chars(id)
    }

    /// `true` when `id` is non-empty and uses only alphabet symbols, whatever
    /// its length.
    pub fn has_valid_chars(id: &str) -> bool {
        !id.is_empty() && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
    }

    /// Draw a fresh identifier. Collision checks are the caller's job.
    pub fn generate(&self) -> SessionResult<String> {
        let mut id = String::with_capacity(self.length);
        let mut pool = [0u8; 64];

        while id.len() < self.length {
            OsRng
                .try_fill_bytes(&mut pool)
                .map_err(|e| SessionError::storage(StorageOp::CreateId, e))?;

            // 6 bits give 0..=63; dropping 63 keeps the 63 symbols uniform.
            for byte in pool {
                let index = usize::from(byte & 0x3f);
                if index < ALPHABET.len() {
                    id.push(char::from(ALPHABET[index]));
                    if id.len() == self.length {
                        break;
                    }
                }
            }
        }

        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_match_alphabet_and_length() {
        for length in [32, 33, 64, 127, 250] {
            let ids = SessionIds::with_length(length).unwrap();
            for _ in 0..20 {
                let id = ids.generate().unwrap();
                assert_eq!(id.len(), length);
                assert!(ids.is_well_formed(&id), "{id}");
            }
        }
    }

    #[test]
    fn test_length_below_minimum_is_rejected() {
        let err = SessionIds::with_length(31).unwrap_err();
        assert_eq!(err.to_string(), "could not set length session ID below 32");
        assert!(SessionIds::with_length(32).is_ok());
    }

    #[test]
    fn test_malformed_ids() {
        let ids = SessionIds::with_length(32).unwrap();
        assert!(!ids.is_well_formed("kjlfez/fez"));
        assert!(!ids.is_well_formed(""));
        assert!(!ids.is_well_formed(&"a".repeat(31)));
        assert!(!ids.is_well_formed(&"a".repeat(33)));
        assert!(!ids.is_well_formed(&format!("{}_", "a".repeat(31))));
        assert!(!ids.is_well_formed(&format!("{}é", "a".repeat(30))));
        assert!(ids.is_well_formed(&format!("{}-", "Z9".repeat(15) + "a")));
    }

    #[test]
    fn test_valid_chars_ignore_length() {
        assert!(SessionIds::has_valid_chars("client-chosen"));
        assert!(SessionIds::has_valid_chars(&"a".repeat(300)));
        assert!(!SessionIds::has_valid_chars(""));
        assert!(!SessionIds::has_valid_chars("../escaped"));
        assert!(!SessionIds::has_valid_chars("a b"));
        assert!(!SessionIds::has_valid_chars("sess\\0"));
    }

    #[test]
    fn test_ids_are_not_repeated() {
        let ids = SessionIds::default();
        let a = ids.generate().unwrap();
        let b = ids.generate().unwrap();
        assert_ne!(a, b);
    }
}
