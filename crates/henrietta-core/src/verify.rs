//! The verification handler: consumes a token from an emailed link.

use chrono::{DateTime, Duration, Utc};

use crate::{
  Context, Error, Result,
  contact::Contact,
  mail::{EmailTemplate, Mailer},
  store::RegistryStore,
  token::VerificationToken,
};

/// Recorded as the `source` of opt-ins created by verification.
pub const OPT_IN_SOURCE: &str = "registration_flow";

/// Terminal result of presenting a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
  Success { first_name: Option<String> },
  AlreadyVerified,
  /// The contact expired, or the link is older than the expiry window.
  Expired,
  /// No contact holds this token: it never existed, was consumed, or was
  /// rotated. These cases are deliberately indistinguishable.
  NotFound,
  /// Missing or structurally malformed token.
  Invalid,
}

/// What a matched contact's state means for its token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
  AlreadyVerified,
  Expired,
  Live,
}

/// Classify the contact a token resolved to. Pure; no state changes.
pub fn classify(contact: &Contact, now: DateTime<Utc>, expiry_window: Duration) -> TokenState {
  if contact.email_verified {
    return TokenState::AlreadyVerified;
  }
  if contact.is_deleted() {
    return TokenState::Expired;
  }
  match contact.verification_sent_at {
    Some(sent) if now - sent > expiry_window => TokenState::Expired,
    _ => TokenState::Live,
  }
}

pub struct Verifier<S, M> {
  ctx: Context<S, M>,
}

impl<S, M> Verifier<S, M>
where
  S: RegistryStore,
  M: Mailer,
{
  pub fn new(ctx: Context<S, M>) -> Self { Self { ctx } }

  pub async fn verify(&self, raw_token: Option<&str>) -> Result<VerifyOutcome> {
    let Some(token) = raw_token.and_then(VerificationToken::parse) else {
      return Ok(VerifyOutcome::Invalid);
    };

    let Some(contact) = self
      .ctx
      .store
      .find_contact_by_token(token.clone())
      .await
      .map_err(Error::store)?
    else {
      return Ok(VerifyOutcome::NotFound);
    };

    let now = self.ctx.clock.now();
    match classify(&contact, now, self.ctx.config.verification.expiry_window()) {
      TokenState::AlreadyVerified => return Ok(VerifyOutcome::AlreadyVerified),
      TokenState::Expired => {
        tracing::info!(contact_id = %contact.contact_id, "verification link expired");
        return Ok(VerifyOutcome::Expired);
      }
      TokenState::Live => {}
    }

    // The conditional write is the arbiter between concurrent clicks: only
    // one of them sees the token still in place.
    let Some(verified) = self
      .ctx
      .store
      .consume_token(token, now)
      .await
      .map_err(Error::store)?
    else {
      tracing::info!(contact_id = %contact.contact_id, "token consumed concurrently");
      return Ok(VerifyOutcome::NotFound);
    };

    tracing::info!(contact_id = %verified.contact_id, "email verified");

    if let Err(e) = self
      .ctx
      .store
      .ensure_opt_in(verified.email.clone(), OPT_IN_SOURCE.to_string(), now)
      .await
    {
      tracing::error!(contact_id = %verified.contact_id, error = %e, "failed to record opt-in");
    }

    let template = EmailTemplate::Welcome {
      first_name:      verified.profile.first_name.clone(),
      unsubscribe_url: self.ctx.config.links.unsubscribe_url(&verified.email),
    };
    if let Err(e) = self.ctx.mailer.send(&verified.email, &template).await {
      tracing::warn!(contact_id = %verified.contact_id, error = %e, "welcome email failed");
    }

    Ok(VerifyOutcome::Success { first_name: verified.profile.first_name })
  }
}
