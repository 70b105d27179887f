//! SQL schema for the Henrietta SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One row per normalized email, located through its dedup key digest.
-- A token is present exactly while the contact is pending.
CREATE TABLE IF NOT EXISTS contacts (
    contact_id            TEXT PRIMARY KEY,
    email                 TEXT NOT NULL,
    dedup_key             TEXT NOT NULL UNIQUE,
    first_name            TEXT,
    postal_code           TEXT NOT NULL,
    dpc_status            TEXT NOT NULL,   -- 'yes' | 'no' | 'unsure'
    contact_preference    TEXT NOT NULL,   -- 'yes' | 'no' | 'later'
    referral_source       TEXT,
    utm_source            TEXT,
    utm_medium            TEXT,
    utm_campaign          TEXT,
    email_verified        INTEGER NOT NULL DEFAULT 0,
    verified_at           TEXT,
    verification_token    TEXT UNIQUE,
    verification_sent_at  TEXT,
    reminder_count        INTEGER NOT NULL DEFAULT 0,
    last_reminder_sent_at TEXT,
    deleted_at            TEXT,
    deletion_reason       TEXT,            -- 'verification_expired'
    email_consent         INTEGER NOT NULL DEFAULT 0,
    email_consent_at      TEXT,
    submitted_at          TEXT NOT NULL,   -- start of the current pending cycle
    created_at            TEXT NOT NULL,
    updated_at            TEXT NOT NULL,
    CHECK (reminder_count BETWEEN 0 AND 3),
    CHECK ((verification_token IS NOT NULL) = (email_verified = 0 AND deleted_at IS NULL))
);

CREATE INDEX IF NOT EXISTS contacts_pending_idx
    ON contacts(submitted_at) WHERE email_verified = 0 AND deleted_at IS NULL;

CREATE TABLE IF NOT EXISTS rate_limit_events (
    event_id   INTEGER PRIMARY KEY AUTOINCREMENT,
    origin     TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS rate_limit_origin_idx ON rate_limit_events(origin, created_at);

-- Ongoing consent, keyed by email and independent of any contact row.
CREATE TABLE IF NOT EXISTS opt_ins (
    email       TEXT PRIMARY KEY,
    is_active   INTEGER NOT NULL,
    source      TEXT,
    verified_at TEXT,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

-- Append-only. No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS reminder_log (
    log_id              TEXT PRIMARY KEY,
    contact_id          TEXT NOT NULL REFERENCES contacts(contact_id),
    reminder_type       TEXT NOT NULL
        CHECK (reminder_type IN ('24h', '72h', 'final', 'deletion')),
    provider_message_id TEXT,
    created_at          TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS reminder_log_contact_idx ON reminder_log(contact_id);

PRAGMA user_version = 1;
";
