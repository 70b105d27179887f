//! [`SqliteStore`]: the SQLite implementation of [`RegistryStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use henrietta_core::{
  contact::{
    Contact, ContactRefresh, DeletionReason, NewContact, OptInRecord, ReminderLogEntry,
    ReminderLogKind,
  },
  dedup::DedupKey,
  store::{ExpiryRule, InsertOutcome, RegistryStore, ReminderSent},
  token::VerificationToken,
};

use crate::{
  Result,
  encode::{CONTACT_COLUMNS, RawContact, RawOptIn, RawReminderLog, encode_dt, encode_uuid},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Henrietta registry store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    tracing::debug!(path = %path.display(), "opening sqlite store");
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Fetch at most one contact matching `predicate` (a `WHERE` body with a
  /// single `?1` placeholder).
  async fn contact_where(&self, predicate: &'static str, param: String) -> Result<Option<Contact>> {
    let raw: Option<RawContact> = self
      .conn
      .call(move |conn| Ok(select_contact(conn, predicate, &param)?))
      .await?;
    raw.map(RawContact::into_contact).transpose()
  }

  async fn contacts_where(
    &self,
    predicate: &'static str,
    params: Vec<rusqlite::types::Value>,
  ) -> Result<Vec<Contact>> {
    let raws: Vec<RawContact> = self
      .conn
      .call(move |conn| {
        let sql =
          format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE {predicate} ORDER BY submitted_at");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), RawContact::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawContact::into_contact).collect()
  }
}

fn select_contact(
  conn: &rusqlite::Connection,
  predicate: &str,
  param: &str,
) -> rusqlite::Result<Option<RawContact>> {
  conn
    .query_row(
      &format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE {predicate}"),
      rusqlite::params![param],
      RawContact::from_row,
    )
    .optional()
}

fn insert_log_row(
  conn: &rusqlite::Connection,
  contact_id: &str,
  kind: ReminderLogKind,
  provider_message_id: Option<String>,
  at: &str,
) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO reminder_log (log_id, contact_id, reminder_type, provider_message_id, created_at)
     VALUES (?1, ?2, ?3, ?4, ?5)",
    rusqlite::params![
      encode_uuid(Uuid::new_v4()),
      contact_id,
      kind.as_str(),
      provider_message_id,
      at,
    ],
  )?;
  Ok(())
}

fn consent_at(wants_email: bool, at: &str) -> Option<String> {
  wants_email.then(|| at.to_owned())
}

// ─── RegistryStore impl ──────────────────────────────────────────────────────

const PENDING: &str = "email_verified = 0 AND deleted_at IS NULL";

/// Pending, with `?1` reminders out, cycle started by `?2`, and the last
/// reminder sent by `?3`.
const EXPIRABLE: &str = "email_verified = 0 AND deleted_at IS NULL
  AND reminder_count >= ?1 AND submitted_at <= ?2 AND last_reminder_sent_at <= ?3";

impl RegistryStore for SqliteStore {
  type Error = crate::Error;

  // ── Contacts: reads ───────────────────────────────────────────────────────

  async fn find_contact_by_dedup_key(&self, key: DedupKey) -> Result<Option<Contact>> {
    self.contact_where("dedup_key = ?1", key.as_str().to_owned()).await
  }

  async fn find_contact_by_token(&self, token: VerificationToken) -> Result<Option<Contact>> {
    self.contact_where("verification_token = ?1", token.to_string()).await
  }

  async fn get_contact(&self, id: Uuid) -> Result<Option<Contact>> {
    self.contact_where("contact_id = ?1", encode_uuid(id)).await
  }

  async fn list_pending_contacts(&self, submitted_before: DateTime<Utc>) -> Result<Vec<Contact>> {
    self
      .contacts_where(
        "email_verified = 0 AND deleted_at IS NULL
         AND submitted_at <= ?1",
        vec![encode_dt(submitted_before).into()],
      )
      .await
  }

  async fn list_expirable_contacts(&self, rule: ExpiryRule) -> Result<Vec<Contact>> {
    self
      .contacts_where(
        EXPIRABLE,
        vec![
          i64::from(rule.min_reminders).into(),
          encode_dt(rule.submitted_before).into(),
          encode_dt(rule.reminded_before).into(),
        ],
      )
      .await
  }

  // ── Contacts: transitions ─────────────────────────────────────────────────

  async fn insert_contact(&self, new: NewContact) -> Result<InsertOutcome> {
    let consent   = new.profile.wants_email();
    let token_str = new.verification_token.to_string();
    let contact = Contact {
      contact_id:            new.contact_id,
      email:                 new.email,
      dedup_key:             new.dedup_key,
      profile:               new.profile,
      email_verified:        false,
      verified_at:           None,
      verification_token:    Some(new.verification_token),
      verification_sent_at:  None,
      reminder_count:        0,
      last_reminder_sent_at: None,
      deleted_at:            None,
      deletion_reason:       None,
      email_consent:         consent,
      email_consent_at:      consent.then_some(new.at),
      submitted_at:          new.at,
      created_at:            new.at,
      updated_at:            new.at,
    };

    let id_str    = encode_uuid(contact.contact_id);
    let email     = contact.email.clone();
    let key       = contact.dedup_key.as_str().to_owned();
    let p         = contact.profile.clone();
    let at_str    = encode_dt(new.at);

    let inserted = self
      .conn
      .call(move |conn| {
        // A concurrent submission for the same address loses here, on the
        // unique dedup key.
        let changed = conn.execute(
          "INSERT INTO contacts (
             contact_id, email, dedup_key, first_name, postal_code, dpc_status,
             contact_preference, referral_source, utm_source, utm_medium, utm_campaign,
             verification_token, email_consent, email_consent_at,
             submitted_at, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15, ?15)
           ON CONFLICT (dedup_key) DO NOTHING",
          rusqlite::params![
            id_str,
            email,
            key,
            p.first_name,
            p.postal_code,
            p.dpc_status.as_ref(),
            p.contact_preference.as_ref(),
            p.referral_source,
            p.utm_source,
            p.utm_medium,
            p.utm_campaign,
            token_str,
            consent,
            consent_at(consent, &at_str),
            at_str,
          ],
        )?;
        Ok(changed == 1)
      })
      .await?;

    Ok(if inserted { InsertOutcome::Inserted(contact) } else { InsertOutcome::DuplicateKey })
  }

  async fn refresh_contact(&self, id: Uuid, refresh: ContactRefresh) -> Result<Option<Contact>> {
    let id_str    = encode_uuid(id);
    let p         = refresh.profile;
    let consent   = p.wants_email();
    let token_str = refresh.verification_token.to_string();
    let at_str    = encode_dt(refresh.at);

    let raw: Option<RawContact> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let changed = tx.execute(
          "UPDATE contacts SET
             first_name = ?2, postal_code = ?3, dpc_status = ?4, contact_preference = ?5,
             referral_source = ?6, utm_source = ?7, utm_medium = ?8, utm_campaign = ?9,
             verification_token = ?10, verification_sent_at = NULL,
             reminder_count = 0, last_reminder_sent_at = NULL,
             deleted_at = NULL, deletion_reason = NULL,
             email_consent = ?11, email_consent_at = ?12,
             submitted_at = ?13, updated_at = ?13
           WHERE contact_id = ?1 AND email_verified = 0",
          rusqlite::params![
            id_str,
            p.first_name,
            p.postal_code,
            p.dpc_status.as_ref(),
            p.contact_preference.as_ref(),
            p.referral_source,
            p.utm_source,
            p.utm_medium,
            p.utm_campaign,
            token_str,
            consent,
            consent_at(consent, &at_str),
            at_str,
          ],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        let raw = select_contact(&tx, "contact_id = ?1", &id_str)?;
        tx.commit()?;
        Ok(raw)
      })
      .await?;

    raw.map(RawContact::into_contact).transpose()
  }

  async fn mark_verification_sent(
    &self,
    id: Uuid,
    token: VerificationToken,
    at: DateTime<Utc>,
  ) -> Result<bool> {
    let id_str    = encode_uuid(id);
    let token_str = token.to_string();
    let at_str    = encode_dt(at);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE contacts SET verification_sent_at = ?3, updated_at = ?3
           WHERE contact_id = ?1 AND verification_token = ?2",
          rusqlite::params![id_str, token_str, at_str],
        )?)
      })
      .await?;
    Ok(changed == 1)
  }

  async fn consume_token(
    &self,
    token: VerificationToken,
    at: DateTime<Utc>,
  ) -> Result<Option<Contact>> {
    let token_str = token.to_string();
    let at_str    = encode_dt(at);

    let raw: Option<RawContact> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let Some(id_str) = tx
          .query_row(
            &format!("SELECT contact_id FROM contacts WHERE verification_token = ?1 AND {PENDING}"),
            rusqlite::params![token_str],
            |r| r.get::<_, String>(0),
          )
          .optional()?
        else {
          return Ok(None);
        };
        let changed = tx.execute(
          &format!(
            "UPDATE contacts SET
               email_verified = 1, verified_at = ?3, verification_token = NULL, updated_at = ?3
             WHERE contact_id = ?1 AND verification_token = ?2 AND {PENDING}"
          ),
          rusqlite::params![id_str, token_str, at_str],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        let raw = select_contact(&tx, "contact_id = ?1", &id_str)?;
        tx.commit()?;
        Ok(raw)
      })
      .await?;

    raw.map(RawContact::into_contact).transpose()
  }

  async fn record_reminder_sent(&self, sent: ReminderSent) -> Result<bool> {
    let id_str   = encode_uuid(sent.contact_id);
    let stage    = i64::from(sent.stage.number());
    let kind     = ReminderLogKind::Reminder(sent.stage);
    let at_str   = encode_dt(sent.at);
    let provider = sent.provider_message_id;
    let token    = sent.token.to_string();

    let booked = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let changed = tx.execute(
          &format!(
            "UPDATE contacts SET
               reminder_count = ?2, last_reminder_sent_at = ?3,
               verification_sent_at = ?3, updated_at = ?3
             WHERE contact_id = ?1 AND reminder_count = ?2 - 1
               AND verification_token = ?4 AND {PENDING}"
          ),
          rusqlite::params![id_str, stage, at_str, token],
        )?;
        if changed == 0 {
          return Ok(false);
        }
        insert_log_row(&tx, &id_str, kind, provider, &at_str)?;
        tx.commit()?;
        Ok(true)
      })
      .await?;
    Ok(booked)
  }

  async fn expire_contact(&self, id: Uuid, rule: ExpiryRule, at: DateTime<Utc>) -> Result<bool> {
    let id_str    = encode_uuid(id);
    let min       = i64::from(rule.min_reminders);
    let submitted = encode_dt(rule.submitted_before);
    let reminded  = encode_dt(rule.reminded_before);
    let at_str    = encode_dt(at);
    let reason    = DeletionReason::VerificationExpired.as_ref().to_owned();

    let expired = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let changed = tx.execute(
          &format!(
            "UPDATE contacts SET
               deleted_at = ?5, deletion_reason = ?6, verification_token = NULL, updated_at = ?5
             WHERE contact_id = ?4 AND {EXPIRABLE}"
          ),
          rusqlite::params![min, submitted, reminded, id_str, at_str, reason],
        )?;
        if changed == 0 {
          return Ok(false);
        }
        insert_log_row(&tx, &id_str, ReminderLogKind::Deletion, None, &at_str)?;
        tx.commit()?;
        Ok(true)
      })
      .await?;
    Ok(expired)
  }

  async fn reminder_log(&self, contact_id: Uuid) -> Result<Vec<ReminderLogEntry>> {
    let id_str = encode_uuid(contact_id);

    let raws: Vec<RawReminderLog> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT log_id, contact_id, reminder_type, provider_message_id, created_at
           FROM reminder_log WHERE contact_id = ?1
           ORDER BY created_at, rowid",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |row| {
            Ok(RawReminderLog {
              log_id:              row.get(0)?,
              contact_id:          row.get(1)?,
              reminder_type:       row.get(2)?,
              provider_message_id: row.get(3)?,
              created_at:          row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawReminderLog::into_entry).collect()
  }

  // ── Rate limiting ─────────────────────────────────────────────────────────

  async fn count_rate_limit_events(&self, origin: String, since: DateTime<Utc>) -> Result<u64> {
    let since_str = encode_dt(since);

    let count: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM rate_limit_events WHERE origin = ?1 AND created_at >= ?2",
          rusqlite::params![origin, since_str],
          |r| r.get(0),
        )?)
      })
      .await?;
    Ok(count.max(0) as u64)
  }

  async fn record_rate_limit_event(&self, origin: String, at: DateTime<Utc>) -> Result<()> {
    let at_str = encode_dt(at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO rate_limit_events (origin, created_at) VALUES (?1, ?2)",
          rusqlite::params![origin, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Opt-in records ────────────────────────────────────────────────────────

  async fn ensure_opt_in(&self, email: String, source: String, at: DateTime<Utc>) -> Result<bool> {
    let at_str = encode_dt(at);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "INSERT INTO opt_ins (email, is_active, source, verified_at, created_at, updated_at)
           VALUES (?1, 1, ?2, ?3, ?3, ?3)
           ON CONFLICT (email) DO NOTHING",
          rusqlite::params![email, source, at_str],
        )?)
      })
      .await?;
    Ok(changed == 1)
  }

  async fn deactivate_opt_in(&self, email: String, at: DateTime<Utc>) -> Result<bool> {
    let at_str = encode_dt(at);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE opt_ins SET is_active = 0, updated_at = ?2 WHERE email = ?1",
          rusqlite::params![email, at_str],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }

  async fn get_opt_in(&self, email: String) -> Result<Option<OptInRecord>> {
    let raw: Option<RawOptIn> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT email, is_active, source, verified_at, created_at, updated_at
             FROM opt_ins WHERE email = ?1",
            rusqlite::params![email],
            |row| {
              Ok(RawOptIn {
                email:       row.get(0)?,
                is_active:   row.get(1)?,
                source:      row.get(2)?,
                verified_at: row.get(3)?,
                created_at:  row.get(4)?,
                updated_at:  row.get(5)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    raw.map(RawOptIn::into_record).transpose()
  }
}
