//! The `RegistryStore` trait.
//!
//! Implemented by storage backends (e.g. `henrietta-store-sqlite`). The
//! lifecycle services depend on this abstraction, not on any concrete
//! backend.
//!
//! Every state transition is a single conditional write: the guard in each
//! method's documentation is part of its contract, and a `false` / `None`
//! return means the guard did not hold (someone else got there first). That
//! is how concurrent requests and scheduler runs stay safe without any
//! in-process coordination.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  contact::{Contact, ContactRefresh, NewContact, OptInRecord, ReminderLogEntry, ReminderStage},
  dedup::DedupKey,
  token::VerificationToken,
};

/// Result of [`RegistryStore::insert_contact`].
#[derive(Debug, Clone)]
pub enum InsertOutcome {
  Inserted(Contact),
  /// Another contact already owns the dedup key (typically a concurrent
  /// duplicate submission).
  DuplicateKey,
}

/// A reminder the transport accepted, ready to be booked.
#[derive(Debug, Clone)]
pub struct ReminderSent {
  pub contact_id:          Uuid,
  pub stage:               ReminderStage,
  /// The token whose link went out in the mail.
  pub token:               VerificationToken,
  pub provider_message_id: Option<String>,
  pub at:                  DateTime<Utc>,
}

/// Which pending contacts have run out of time.
#[derive(Debug, Clone, Copy)]
pub struct ExpiryRule {
  /// Reminders that must already have gone out.
  pub min_reminders:    u8,
  /// The pending cycle started at or before this instant.
  pub submitted_before: DateTime<Utc>,
  /// The last reminder went out at or before this instant.
  pub reminded_before:  DateTime<Utc>,
}

/// Abstraction over the registry's relational datastore.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait RegistryStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Contacts: reads ───────────────────────────────────────────────────

  fn find_contact_by_dedup_key(
    &self,
    key: DedupKey,
  ) -> impl Future<Output = Result<Option<Contact>, Self::Error>> + Send + '_;

  /// The contact currently holding exactly this token, if any.
  fn find_contact_by_token(
    &self,
    token: VerificationToken,
  ) -> impl Future<Output = Result<Option<Contact>, Self::Error>> + Send + '_;

  fn get_contact(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Contact>, Self::Error>> + Send + '_;

  /// Pending contacts whose cycle started at or before `submitted_before`,
  /// oldest first.
  fn list_pending_contacts(
    &self,
    submitted_before: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<Contact>, Self::Error>> + Send + '_;

  /// Pending contacts matching `rule`, oldest first.
  fn list_expirable_contacts(
    &self,
    rule: ExpiryRule,
  ) -> impl Future<Output = Result<Vec<Contact>, Self::Error>> + Send + '_;

  // ── Contacts: transitions ─────────────────────────────────────────────

  /// Insert a new pending contact. A dedup-key collision is reported as
  /// [`InsertOutcome::DuplicateKey`], not as an error.
  fn insert_contact(
    &self,
    contact: NewContact,
  ) -> impl Future<Output = Result<InsertOutcome, Self::Error>> + Send + '_;

  /// Start a new pending cycle for an unverified (possibly soft-deleted)
  /// contact: overwrite the profile, rotate the token, and reset reminder,
  /// delivery, and deletion bookkeeping.
  ///
  /// Guard: `email_verified = false`. Returns the updated contact, or `None`
  /// if the guard failed.
  fn refresh_contact(
    &self,
    id: Uuid,
    refresh: ContactRefresh,
  ) -> impl Future<Output = Result<Option<Contact>, Self::Error>> + Send + '_;

  /// Stamp `verification_sent_at` after the transport accepted a link.
  ///
  /// Guard: the contact still holds `token`.
  fn mark_verification_sent(
    &self,
    id: Uuid,
    token: VerificationToken,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Consume a token: mark the holder verified and null the token in one
  /// write.
  ///
  /// Guard: a pending contact holds `token`. Returns the verified contact,
  /// or `None` if the guard failed.
  fn consume_token(
    &self,
    token: VerificationToken,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<Contact>, Self::Error>> + Send + '_;

  /// Book a delivered reminder: bump `reminder_count` to the stage number,
  /// stamp `last_reminder_sent_at` and `verification_sent_at`, and append a
  /// reminder-log row, atomically.
  ///
  /// Guard: still pending, `reminder_count = stage - 1`, and still holding
  /// `sent.token`.
  fn record_reminder_sent(
    &self,
    sent: ReminderSent,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Soft-delete a contact that never verified, null its token, and append a
  /// `deletion` log row, atomically.
  ///
  /// Guard: still pending and matching `rule`.
  fn expire_contact(
    &self,
    id: Uuid,
    rule: ExpiryRule,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn reminder_log(
    &self,
    contact_id: Uuid,
  ) -> impl Future<Output = Result<Vec<ReminderLogEntry>, Self::Error>> + Send + '_;

  // ── Rate limiting ─────────────────────────────────────────────────────

  /// Attempts recorded for `origin` at or after `since`.
  fn count_rate_limit_events(
    &self,
    origin: String,
    since: DateTime<Utc>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  fn record_rate_limit_event(
    &self,
    origin: String,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Opt-in records ────────────────────────────────────────────────────

  /// Insert an active opt-in for `email` unless one exists. An existing
  /// record is left untouched. Returns whether a row was inserted.
  fn ensure_opt_in(
    &self,
    email: String,
    source: String,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Mark the opt-in for `email` inactive. Returns whether a record exists.
  fn deactivate_opt_in(
    &self,
    email: String,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn get_opt_in(
    &self,
    email: String,
  ) -> impl Future<Output = Result<Option<OptInRecord>, Self::Error>> + Send + '_;
}
