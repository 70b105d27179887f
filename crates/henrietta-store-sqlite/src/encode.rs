//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings (microsecond
//! precision, `Z` suffix) so that SQL string comparison orders them in time.
//! UUIDs are stored as hyphenated lowercase strings. Booleans are 0/1.

use chrono::{DateTime, SecondsFormat, Utc};
use henrietta_core::{
  contact::{
    Contact, ContactPreference, DeletionReason, DpcStatus, OptInRecord, Profile,
    ReminderLogEntry, ReminderLogKind,
  },
  dedup::DedupKey,
  token::VerificationToken,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

// ─── Enumerations ────────────────────────────────────────────────────────────

fn decode_enum<T: std::str::FromStr>(column: &'static str, s: String) -> Result<T> {
  s.parse().map_err(|_| Error::Decode { column, value: s })
}

fn decode_token(s: String) -> Result<VerificationToken> {
  VerificationToken::parse(&s).ok_or(Error::Decode { column: "verification_token", value: s })
}

fn decode_reminder_count(n: i64) -> Result<u8> {
  u8::try_from(n).map_err(|_| Error::Decode { column: "reminder_count", value: n.to_string() })
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawContact::from_row`].
pub const CONTACT_COLUMNS: &str = "contact_id, email, dedup_key, first_name, postal_code,
  dpc_status, contact_preference, referral_source, utm_source, utm_medium, utm_campaign,
  email_verified, verified_at, verification_token, verification_sent_at, reminder_count,
  last_reminder_sent_at, deleted_at, deletion_reason, email_consent, email_consent_at,
  submitted_at, created_at, updated_at";

/// Raw values read directly from a `contacts` row.
pub struct RawContact {
  pub contact_id:            String,
  pub email:                 String,
  pub dedup_key:             String,
  pub first_name:            Option<String>,
  pub postal_code:           String,
  pub dpc_status:            String,
  pub contact_preference:    String,
  pub referral_source:       Option<String>,
  pub utm_source:            Option<String>,
  pub utm_medium:            Option<String>,
  pub utm_campaign:          Option<String>,
  pub email_verified:        bool,
  pub verified_at:           Option<String>,
  pub verification_token:    Option<String>,
  pub verification_sent_at:  Option<String>,
  pub reminder_count:        i64,
  pub last_reminder_sent_at: Option<String>,
  pub deleted_at:            Option<String>,
  pub deletion_reason:       Option<String>,
  pub email_consent:         bool,
  pub email_consent_at:      Option<String>,
  pub submitted_at:          String,
  pub created_at:            String,
  pub updated_at:            String,
}

impl RawContact {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      contact_id:            row.get(0)?,
      email:                 row.get(1)?,
      dedup_key:             row.get(2)?,
      first_name:            row.get(3)?,
      postal_code:           row.get(4)?,
      dpc_status:            row.get(5)?,
      contact_preference:    row.get(6)?,
      referral_source:       row.get(7)?,
      utm_source:            row.get(8)?,
      utm_medium:            row.get(9)?,
      utm_campaign:          row.get(10)?,
      email_verified:        row.get(11)?,
      verified_at:           row.get(12)?,
      verification_token:    row.get(13)?,
      verification_sent_at:  row.get(14)?,
      reminder_count:        row.get(15)?,
      last_reminder_sent_at: row.get(16)?,
      deleted_at:            row.get(17)?,
      deletion_reason:       row.get(18)?,
      email_consent:         row.get(19)?,
      email_consent_at:      row.get(20)?,
      submitted_at:          row.get(21)?,
      created_at:            row.get(22)?,
      updated_at:            row.get(23)?,
    })
  }

  pub fn into_contact(self) -> Result<Contact> {
    let profile = Profile {
      first_name:         self.first_name,
      postal_code:        self.postal_code,
      dpc_status:         decode_enum::<DpcStatus>("dpc_status", self.dpc_status)?,
      contact_preference: decode_enum::<ContactPreference>(
        "contact_preference",
        self.contact_preference,
      )?,
      referral_source:    self.referral_source,
      utm_source:         self.utm_source,
      utm_medium:         self.utm_medium,
      utm_campaign:       self.utm_campaign,
    };

    Ok(Contact {
      contact_id: decode_uuid(&self.contact_id)?,
      email: self.email,
      dedup_key: DedupKey::from_stored(self.dedup_key),
      profile,
      email_verified: self.email_verified,
      verified_at: decode_opt_dt(self.verified_at)?,
      verification_token: self.verification_token.map(decode_token).transpose()?,
      verification_sent_at: decode_opt_dt(self.verification_sent_at)?,
      reminder_count: decode_reminder_count(self.reminder_count)?,
      last_reminder_sent_at: decode_opt_dt(self.last_reminder_sent_at)?,
      deleted_at: decode_opt_dt(self.deleted_at)?,
      deletion_reason: self
        .deletion_reason
        .map(|r| decode_enum::<DeletionReason>("deletion_reason", r))
        .transpose()?,
      email_consent: self.email_consent,
      email_consent_at: decode_opt_dt(self.email_consent_at)?,
      submitted_at: decode_dt(&self.submitted_at)?,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw values read directly from an `opt_ins` row.
pub struct RawOptIn {
  pub email:       String,
  pub is_active:   bool,
  pub source:      Option<String>,
  pub verified_at: Option<String>,
  pub created_at:  String,
  pub updated_at:  String,
}

impl RawOptIn {
  pub fn into_record(self) -> Result<OptInRecord> {
    Ok(OptInRecord {
      email:       self.email,
      is_active:   self.is_active,
      source:      self.source,
      verified_at: decode_opt_dt(self.verified_at)?,
      created_at:  decode_dt(&self.created_at)?,
      updated_at:  decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw values read directly from a `reminder_log` row.
pub struct RawReminderLog {
  pub log_id:              String,
  pub contact_id:          String,
  pub reminder_type:       String,
  pub provider_message_id: Option<String>,
  pub created_at:          String,
}

impl RawReminderLog {
  pub fn into_entry(self) -> Result<ReminderLogEntry> {
    let kind = ReminderLogKind::parse(&self.reminder_type).ok_or(Error::Decode {
      column: "reminder_type",
      value:  self.reminder_type,
    })?;
    Ok(ReminderLogEntry {
      log_id: decode_uuid(&self.log_id)?,
      contact_id: decode_uuid(&self.contact_id)?,
      kind,
      provider_message_id: self.provider_message_id,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}
