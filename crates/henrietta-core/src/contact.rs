//! Contact records (one per registry entrant) and the submission they are built from.
//!
//! A contact moves through a small lifecycle: it is *pending* from the
//! submission that issues its verification token until it is either verified
//! (permanent) or soft-deleted by the expiry pass (terminal until the same
//! email is submitted again).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{dedup::DedupKey, token::VerificationToken};

// ─── Submission ──────────────────────────────────────────────────────────────

/// A raw signup form submission, exactly as posted by the landing page.
///
/// Nothing here is trusted; see [`crate::validate`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Submission {
  pub email:              String,
  pub zip_code:           String,
  pub first_name:         Option<String>,
  pub dpc_status:         Option<String>,
  pub contact_preference: Option<String>,
  pub referral_source:    Option<String>,
  pub utm_source:         Option<String>,
  pub utm_medium:         Option<String>,
  pub utm_campaign:       Option<String>,
  /// Honeypot: hidden from humans, so any value marks a bot.
  pub website:            Option<String>,
}

// ─── Categorical answers ─────────────────────────────────────────────────────

/// Whether the entrant is already in a direct primary care practice.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DpcStatus {
  Yes,
  No,
  Unsure,
}

impl DpcStatus {
  pub fn normalize(raw: Option<&str>) -> Self {
    match normalize_answer(raw) {
      Some(Answer::Yes) => Self::Yes,
      Some(Answer::No) => Self::No,
      Some(Answer::Unsure | Answer::Later) | None => Self::Unsure,
    }
  }
}

/// Whether the entrant wants ongoing updates by email.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ContactPreference {
  Yes,
  No,
  Later,
}

impl ContactPreference {
  pub fn normalize(raw: Option<&str>) -> Self {
    match normalize_answer(raw) {
      Some(Answer::Yes) => Self::Yes,
      Some(Answer::No) => Self::No,
      Some(Answer::Unsure | Answer::Later) | None => Self::Later,
    }
  }
}

enum Answer {
  Yes,
  No,
  Unsure,
  Later,
}

/// Map free-form answers from the form onto a closed set.
fn normalize_answer(raw: Option<&str>) -> Option<Answer> {
  let lower = raw?.trim().to_lowercase();
  match lower.as_str() {
    "yes" => Some(Answer::Yes),
    "no" => Some(Answer::No),
    _ if lower.contains("not sure") || lower.contains("unsure") => Some(Answer::Unsure),
    _ if lower.contains("later") || lower.contains("maybe") => Some(Answer::Later),
    _ => None,
  }
}

// ─── Lifecycle enums ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum DeletionReason {
  VerificationExpired,
}

/// One of the three escalating reminder offsets.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, AsRefStr, Display, EnumString,
)]
pub enum ReminderStage {
  #[strum(serialize = "24h")]
  First,
  #[strum(serialize = "72h")]
  Second,
  #[strum(serialize = "final")]
  Final,
}

impl ReminderStage {
  pub const ALL: [Self; 3] = [Self::First, Self::Second, Self::Final];

  /// The `reminder_count` a contact has once this stage was sent.
  pub fn number(self) -> u8 {
    match self {
      Self::First => 1,
      Self::Second => 2,
      Self::Final => 3,
    }
  }

  pub fn from_number(n: u8) -> Option<Self> {
    Self::ALL.into_iter().find(|s| s.number() == n)
  }
}

/// The `reminder_type` column of the reminder log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderLogKind {
  Reminder(ReminderStage),
  Deletion,
}

impl ReminderLogKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Reminder(ReminderStage::First) => "24h",
      Self::Reminder(ReminderStage::Second) => "72h",
      Self::Reminder(ReminderStage::Final) => "final",
      Self::Deletion => "deletion",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "deletion" => Some(Self::Deletion),
      other => other.parse().ok().map(Self::Reminder),
    }
  }
}

// ─── Profile ─────────────────────────────────────────────────────────────────

/// Self-reported profile fields, normalized from a [`Submission`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
  pub first_name:         Option<String>,
  pub postal_code:        String,
  pub dpc_status:         DpcStatus,
  pub contact_preference: ContactPreference,
  pub referral_source:    Option<String>,
  pub utm_source:         Option<String>,
  pub utm_medium:         Option<String>,
  pub utm_campaign:       Option<String>,
}

impl Profile {
  pub fn from_submission(s: &Submission) -> Self {
    Self {
      first_name:         non_blank(s.first_name.as_deref()),
      postal_code:        s.zip_code.trim().to_string(),
      dpc_status:         DpcStatus::normalize(s.dpc_status.as_deref()),
      contact_preference: ContactPreference::normalize(s.contact_preference.as_deref()),
      referral_source:    non_blank(s.referral_source.as_deref()),
      utm_source:         non_blank(s.utm_source.as_deref()),
      utm_medium:         non_blank(s.utm_medium.as_deref()),
      utm_campaign:       non_blank(s.utm_campaign.as_deref()),
    }
  }

  /// Consent to non-transactional email is an explicit "yes" only.
  pub fn wants_email(&self) -> bool { self.contact_preference == ContactPreference::Yes }
}

fn non_blank(raw: Option<&str>) -> Option<String> {
  raw.map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned)
}

// ─── Contact ─────────────────────────────────────────────────────────────────

/// A persisted registry entrant.
#[derive(Debug, Clone)]
pub struct Contact {
  pub contact_id:            Uuid,
  /// Normalized (trimmed, lowercased) address.
  pub email:                 String,
  pub dedup_key:             DedupKey,
  pub profile:               Profile,
  pub email_verified:        bool,
  pub verified_at:           Option<DateTime<Utc>>,
  /// Present exactly while the contact is pending.
  pub verification_token:    Option<VerificationToken>,
  pub verification_sent_at:  Option<DateTime<Utc>>,
  pub reminder_count:        u8,
  pub last_reminder_sent_at: Option<DateTime<Utc>>,
  pub deleted_at:            Option<DateTime<Utc>>,
  pub deletion_reason:       Option<DeletionReason>,
  pub email_consent:         bool,
  pub email_consent_at:      Option<DateTime<Utc>>,
  /// Start of the current pending cycle; reminder offsets count from here.
  pub submitted_at:          DateTime<Utc>,
  pub created_at:            DateTime<Utc>,
  pub updated_at:            DateTime<Utc>,
}

impl Contact {
  pub fn is_pending(&self) -> bool { !self.email_verified && self.deleted_at.is_none() }

  pub fn is_deleted(&self) -> bool { self.deleted_at.is_some() }
}

// ─── Write inputs ────────────────────────────────────────────────────────────

/// Input to [`crate::store::RegistryStore::insert_contact`].
#[derive(Debug, Clone)]
pub struct NewContact {
  pub contact_id:         Uuid,
  pub email:              String,
  pub dedup_key:          DedupKey,
  pub profile:            Profile,
  pub verification_token: VerificationToken,
  pub at:                 DateTime<Utc>,
}

/// Input to [`crate::store::RegistryStore::refresh_contact`]: a resubmission
/// that starts a new pending cycle for an unverified or expired contact.
#[derive(Debug, Clone)]
pub struct ContactRefresh {
  pub profile:            Profile,
  pub verification_token: VerificationToken,
  pub at:                 DateTime<Utc>,
}

// ─── Opt-in and reminder log ─────────────────────────────────────────────────

/// Ongoing consent to non-transactional updates, keyed by email and
/// independent of any contact row.
#[derive(Debug, Clone)]
pub struct OptInRecord {
  pub email:       String,
  pub is_active:   bool,
  pub source:      Option<String>,
  pub verified_at: Option<DateTime<Utc>>,
  pub created_at:  DateTime<Utc>,
  pub updated_at:  DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ReminderLogEntry {
  pub log_id:              Uuid,
  pub contact_id:          Uuid,
  pub kind:                ReminderLogKind,
  pub provider_message_id: Option<String>,
  pub created_at:          DateTime<Utc>,
}
