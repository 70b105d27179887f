//! Unsubscribe links.
//!
//! The token is the recipient's address, base64 encoded. It is not a
//! secret: unsubscribing only ever turns an opt-in off, so a forged link
//! can do nothing a recipient could not already do.

use base64::{
  Engine,
  engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};

use crate::{Context, Error, Result, mail::Mailer, store::RegistryStore, validate};

pub fn encode_token(email: &str) -> String { URL_SAFE_NO_PAD.encode(email.as_bytes()) }

/// Decode a token into the address it carries. Older links used standard
/// padded base64, so both alphabets are accepted.
///
/// A standard-alphabet `+` left unescaped in a query string arrives as a
/// space after form decoding; it is restored before decoding.
pub fn decode_token(raw: &str) -> Option<String> {
  let raw = raw.trim().replace(' ', "+");
  if raw.is_empty() {
    return None;
  }
  let bytes = URL_SAFE_NO_PAD
    .decode(&raw)
    .or_else(|_| STANDARD.decode(&raw))
    .ok()?;
  let email = String::from_utf8(bytes).ok()?;
  email.contains('@').then_some(email)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
  Success,
  Invalid,
}

pub struct Unsubscriber<S, M> {
  ctx: Context<S, M>,
}

impl<S, M> Unsubscriber<S, M>
where
  S: RegistryStore,
  M: Mailer,
{
  pub fn new(ctx: Context<S, M>) -> Self { Self { ctx } }

  /// Deactivate the opt-in named by `raw_token`. Idempotent; an address with
  /// no opt-in on file still reports success.
  pub async fn unsubscribe(&self, raw_token: Option<&str>) -> Result<UnsubscribeOutcome> {
    let Some(email) = raw_token.and_then(decode_token) else {
      return Ok(UnsubscribeOutcome::Invalid);
    };
    let email = validate::normalize_email(&email);

    let found = self
      .ctx
      .store
      .deactivate_opt_in(email, self.ctx.clock.now())
      .await
      .map_err(Error::store)?;
    tracing::info!(had_opt_in = found, "unsubscribe processed");

    Ok(UnsubscribeOutcome::Success)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tokens_are_url_safe() {
    let token = encode_token("someone+tag@example.com");
    assert!(!token.contains(['+', '/', '=']));
    assert_eq!(decode_token(&token).as_deref(), Some("someone+tag@example.com"));
  }

  #[test]
  fn accepts_padded_standard_tokens() {
    let legacy = STANDARD.encode("ab@c.co");
    assert_eq!(legacy, "YWJAYy5jbw==");
    assert_eq!(decode_token(&legacy).as_deref(), Some("ab@c.co"));
  }

  #[test]
  fn accepts_standard_alphabet_tokens() {
    let plus = STANDARD.encode("jo~e@example.org");
    assert!(plus.contains('+'));
    assert_eq!(decode_token(&plus).as_deref(), Some("jo~e@example.org"));
    // The same link after a query decoder turned `+` into a space.
    assert_eq!(
      decode_token(&plus.replace('+', " ")).as_deref(),
      Some("jo~e@example.org")
    );

    let slash = STANDARD.encode("zoë@example.com");
    assert!(slash.contains('/'));
    assert_eq!(decode_token(&slash).as_deref(), Some("zoë@example.com"));
  }

  #[test]
  fn rejects_garbage() {
    assert_eq!(decode_token(""), None);
    assert_eq!(decode_token("!!!"), None);
    // Decodes fine but is not an address.
    assert_eq!(decode_token(&encode_token("not-an-email")), None);
    // Not UTF-8.
    assert_eq!(decode_token(&URL_SAFE_NO_PAD.encode([0xff, 0xfe, b'@'])), None);
  }
}
