//! Deduplication keys.
//!
//! The contact table is looked up and uniquely constrained on a one-way
//! digest of the normalized email instead of the address itself, so an
//! exposed lookup index does not reveal who signed up.

use std::fmt;

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `prefix ‖ normalized email`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey(String);

impl DedupKey {
  /// Rehydrate a key previously produced by [`DedupKeys::derive`], e.g. when
  /// reading it back from storage.
  pub fn from_stored(hex: String) -> Self { Self(hex) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for DedupKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Derives [`DedupKey`]s under a fixed prefix.
#[derive(Debug, Clone)]
pub struct DedupKeys {
  prefix: String,
}

impl DedupKeys {
  pub fn new(prefix: impl Into<String>) -> Self { Self { prefix: prefix.into() } }

  /// Deterministic: the same email always yields the same key. The email is
  /// trimmed and lowercased again here so callers cannot get it wrong.
  pub fn derive(&self, email: &str) -> DedupKey {
    let mut hasher = Sha256::new();
    hasher.update(self.prefix.as_bytes());
    hasher.update(email.trim().to_lowercase().as_bytes());
    DedupKey(hex::encode(hasher.finalize()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn same_email_same_key() {
    let keys = DedupKeys::new("henrietta:");
    assert_eq!(keys.derive("a@example.com"), keys.derive("a@example.com"));
  }

  #[test]
  fn normalization_is_applied() {
    let keys = DedupKeys::new("henrietta:");
    assert_eq!(keys.derive("  A@Example.COM "), keys.derive("a@example.com"));
  }

  #[test]
  fn prefix_changes_key() {
    let a = DedupKeys::new("henrietta:").derive("a@example.com");
    let b = DedupKeys::new("other:").derive("a@example.com");
    assert_ne!(a, b);
  }

  #[test]
  fn key_is_hex_digest_not_email() {
    let key = DedupKeys::new("henrietta:").derive("a@example.com");
    assert_eq!(key.as_str().len(), 64);
    assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    assert!(!key.as_str().contains("example"));
  }

  #[test]
  fn matches_known_digest() {
    // sha256("henrietta:a@example.com")
    let mut hasher = Sha256::new();
    hasher.update(b"henrietta:a@example.com");
    let expected = hex::encode(hasher.finalize());
    assert_eq!(DedupKeys::new("henrietta:").derive("a@example.com").as_str(), expected);
  }
}
