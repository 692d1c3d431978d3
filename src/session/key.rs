//! Session keys

use serde::Serialize;
use std::fmt;
use thiserror::Error;

const MAX_KEY_LEN: usize = 128;

/// Raised for keys that cannot safely name session files.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid session key {0:?}: use 1-128 letters, digits, '-' or '_'")]
pub struct InvalidSessionKey(pub String);

/// Opaque identifier of an accumulation session.
///
/// Keys become part of file names, so they are limited to ASCII
/// alphanumerics, `-` and `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn parse(raw: impl Into<String>) -> Result<Self, InvalidSessionKey> {
        let raw = raw.into();
        let valid = !raw.is_empty()
            && raw.len() <= MAX_KEY_LEN
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Self(raw))
        } else {
            Err(InvalidSessionKey(raw))
        }
    }

    /// A fresh random key.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Parse `raw` when present, otherwise generate a key.
    pub fn parse_or_generate(raw: Option<&str>) -> Result<Self, InvalidSessionKey> {
        match raw {
            Some(raw) => Self::parse(raw),
            None => Ok(Self::generate()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_simple_keys() {
        for key in ["default", "user-42_run", "A1"] {
            assert_eq!(SessionKey::parse(key).unwrap().as_str(), key);
        }
    }

    #[test]
    fn rejects_path_like_keys() {
        for key in ["", "../etc", "a/b", "with space", "dot.ted"] {
            assert!(SessionKey::parse(key).is_err(), "{key:?}");
        }
        assert!(SessionKey::parse("x".repeat(129)).is_err());
    }

    #[test]
    fn generated_keys_are_valid_and_distinct() {
        let a = SessionKey::generate();
        let b = SessionKey::generate();
        assert_ne!(a, b);
        assert!(SessionKey::parse(a.as_str()).is_ok());
    }
}
