//! Verification tokens.
//!
//! A token is live exactly while a pending contact holds it. Verification and
//! rotation both overwrite the stored value, after which the old value cannot
//! match any row. Tokens are random v4 UUIDs in hyphenated form.

use std::fmt;

use uuid::Uuid;

const HYPHENATED_LEN: usize = 36;

#[derive(Clone, PartialEq, Eq)]
pub struct VerificationToken(Uuid);

impl VerificationToken {
  /// Issue a fresh, unguessable token.
  pub fn issue() -> Self { Self(Uuid::new_v4()) }

  /// Structural check on an untrusted token: it must be a hyphenated UUID.
  /// Case is ignored; the canonical form is lowercase.
  pub fn parse(raw: &str) -> Option<Self> {
    let raw = raw.trim();
    if raw.len() != HYPHENATED_LEN {
      return None;
    }
    Uuid::try_parse(raw).ok().map(Self)
  }
}

impl fmt::Display for VerificationToken {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0.hyphenated())
  }
}

// Tokens are bearer secrets; keep them out of logs.
impl fmt::Debug for VerificationToken {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("VerificationToken(..)")
  }
}
