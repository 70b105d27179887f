//! The registration orchestrator.
//!
//! Decides, for one submission, whether to create a contact, start a new
//! pending cycle for an existing unverified one, or quietly accept a
//! duplicate. Every accepted outcome looks the same to the caller, so the
//! response never reveals whether an address was already registered.

use thiserror::Error;
use uuid::Uuid;

use crate::{
  Context, Error,
  contact::{Contact, ContactRefresh, NewContact, Profile, Submission},
  dedup::DedupKeys,
  mail::{EmailTemplate, Mailer},
  rate_limit::RateLimiter,
  store::{InsertOutcome, RegistryStore},
  token::VerificationToken,
  validate::{self, FieldErrors},
};

/// What happened to an accepted submission. Callers report all of these as
/// plain success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
  /// A new pending contact was inserted.
  Created { contact_id: Uuid },
  /// An unverified or expired contact started a new pending cycle.
  Refreshed { contact_id: Uuid },
  /// The address is already verified; nothing was written or sent.
  AlreadyVerified,
  /// A concurrent submission inserted the same address first.
  ConflictResolved,
  /// The honeypot was filled in; nothing was recorded.
  BotDiscarded,
}

#[derive(Debug, Error)]
pub enum RegisterError {
  #[error("invalid submission: {0}")]
  Validation(FieldErrors),

  #[error("too many attempts from this origin")]
  RateLimited,

  #[error(transparent)]
  Dependency(#[from] Error),
}

pub struct Registrar<S, M> {
  ctx:     Context<S, M>,
  limiter: RateLimiter<S>,
  keys:    DedupKeys,
}

impl<S, M> Registrar<S, M>
where
  S: RegistryStore,
  M: Mailer,
{
  pub fn new(ctx: Context<S, M>) -> Self {
    let limiter = RateLimiter::from_context(&ctx);
    let keys = DedupKeys::new(ctx.config.dedup_prefix.clone());
    Self { ctx, limiter, keys }
  }

  /// Handle one signup. `origin` identifies the requester for rate limiting.
  ///
  /// Side effects per call: at most one contact write, at most one
  /// verification email, and one rate-limit record unless the submission
  /// was discarded or rejected before reaching the limiter.
  pub async fn register(
    &self,
    submission: Submission,
    origin: &str,
  ) -> Result<Registration, RegisterError> {
    if validate::is_bot(&submission) {
      tracing::info!(origin, "honeypot filled; discarding submission");
      return Ok(Registration::BotDiscarded);
    }

    validate::validate(&submission, &self.ctx.config.validation)
      .map_err(RegisterError::Validation)?;

    if !self.limiter.check_and_record(origin).await? {
      return Err(RegisterError::RateLimited);
    }

    let email = validate::normalize_email(&submission.email);
    let dedup_key = self.keys.derive(&email);
    let profile = Profile::from_submission(&submission);

    let existing = self
      .ctx
      .store
      .find_contact_by_dedup_key(dedup_key.clone())
      .await
      .map_err(Error::store)?;

    match existing {
      None => {
        let token = VerificationToken::issue();
        let new = NewContact {
          contact_id: Uuid::new_v4(),
          email,
          dedup_key,
          profile,
          verification_token: token.clone(),
          at: self.ctx.clock.now(),
        };
        match self.ctx.store.insert_contact(new).await.map_err(Error::store)? {
          InsertOutcome::Inserted(contact) => {
            tracing::info!(contact_id = %contact.contact_id, "contact created");
            self.send_verification(&contact, token).await;
            Ok(Registration::Created { contact_id: contact.contact_id })
          }
          InsertOutcome::DuplicateKey => {
            tracing::info!("concurrent duplicate submission resolved");
            Ok(Registration::ConflictResolved)
          }
        }
      }

      Some(contact) if contact.email_verified => {
        tracing::info!(contact_id = %contact.contact_id, "already verified; nothing to do");
        Ok(Registration::AlreadyVerified)
      }

      Some(contact) => {
        let token = VerificationToken::issue();
        let refresh = ContactRefresh {
          profile,
          verification_token: token.clone(),
          at: self.ctx.clock.now(),
        };
        let refreshed = self
          .ctx
          .store
          .refresh_contact(contact.contact_id, refresh)
          .await
          .map_err(Error::store)?;

        match refreshed {
          Some(contact) => {
            tracing::info!(contact_id = %contact.contact_id, "pending cycle restarted; token rotated");
            self.send_verification(&contact, token).await;
            Ok(Registration::Refreshed { contact_id: contact.contact_id })
          }
          // Verified between our read and our write.
          None => Ok(Registration::AlreadyVerified),
        }
      }
    }
  }

  /// Best-effort: a failed send is logged and leaves the contact pending
  /// with `verification_sent_at` unset.
  async fn send_verification(&self, contact: &Contact, token: VerificationToken) {
    let links = &self.ctx.config.links;
    let template = EmailTemplate::Verification {
      first_name:      contact.profile.first_name.clone(),
      verify_url:      links.verify_url(&token),
      unsubscribe_url: links.unsubscribe_url(&contact.email),
    };

    if let Err(e) = self.ctx.mailer.send(&contact.email, &template).await {
      tracing::warn!(contact_id = %contact.contact_id, error = %e, "verification email failed");
      return;
    }

    let stamped = self
      .ctx
      .store
      .mark_verification_sent(contact.contact_id, token, self.ctx.clock.now())
      .await;
    match stamped {
      Ok(true) => {}
      Ok(false) => {
        tracing::debug!(contact_id = %contact.contact_id, "token rotated before send was stamped")
      }
      Err(e) => {
        tracing::error!(contact_id = %contact.contact_id, error = %e, "failed to stamp verification_sent_at")
      }
    }
  }
}
