//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{DateTime, Duration, TimeZone, Utc};
use henrietta_core::{
  config::ReminderConfig,
  contact::{
    Contact, ContactPreference, ContactRefresh, DeletionReason, DpcStatus, NewContact, Profile,
    ReminderLogKind, ReminderStage,
  },
  dedup::DedupKeys,
  store::{ExpiryRule, InsertOutcome, RegistryStore, ReminderSent},
  token::VerificationToken,
};
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn t0() -> DateTime<Utc> { Utc.with_ymd_and_hms(2025, 4, 1, 8, 30, 0).unwrap() }

fn profile(first_name: Option<&str>, preference: ContactPreference) -> Profile {
  Profile {
    first_name:         first_name.map(str::to_owned),
    postal_code:        "94110".into(),
    dpc_status:         DpcStatus::Yes,
    contact_preference: preference,
    referral_source:    Some("newsletter".into()),
    utm_source:         Some("mastodon".into()),
    utm_medium:         None,
    utm_campaign:       None,
  }
}

fn new_contact(email: &str, at: DateTime<Utc>) -> NewContact {
  NewContact {
    contact_id:         Uuid::new_v4(),
    email:              email.into(),
    dedup_key:          DedupKeys::new("test:").derive(email),
    profile:            profile(Some("Ada"), ContactPreference::Yes),
    verification_token: VerificationToken::issue(),
    at,
  }
}

async fn insert(s: &SqliteStore, email: &str, at: DateTime<Utc>) -> Contact {
  match s.insert_contact(new_contact(email, at)).await.unwrap() {
    InsertOutcome::Inserted(c) => c,
    InsertOutcome::DuplicateKey => panic!("unexpected duplicate for {email}"),
  }
}

fn reminder(contact: &Contact, stage: ReminderStage, at: DateTime<Utc>) -> ReminderSent {
  ReminderSent {
    contact_id: contact.contact_id,
    stage,
    token: contact.verification_token.clone().expect("pending contact"),
    provider_message_id: Some(format!("msg-{}", stage.number())),
    at,
  }
}

fn expiry(now: DateTime<Utc>) -> ExpiryRule { ReminderConfig::default().expiry_rule(now) }

// ─── Contacts ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn insert_and_read_back() {
  let s = store().await;
  let c = insert(&s, "ada@example.com", t0()).await;

  let by_key = s.find_contact_by_dedup_key(c.dedup_key.clone()).await.unwrap().unwrap();
  assert_eq!(by_key.contact_id, c.contact_id);
  assert_eq!(by_key.email, "ada@example.com");
  assert_eq!(by_key.profile, c.profile);
  assert_eq!(by_key.submitted_at, t0());
  assert!(by_key.email_consent);
  assert_eq!(by_key.email_consent_at, Some(t0()));
  assert!(by_key.is_pending());
  assert_eq!(by_key.reminder_count, 0);
  assert_eq!(by_key.verification_sent_at, None);

  let token = c.verification_token.clone().unwrap();
  let by_token = s.find_contact_by_token(token).await.unwrap().unwrap();
  assert_eq!(by_token.contact_id, c.contact_id);

  assert!(s.get_contact(c.contact_id).await.unwrap().is_some());
  assert!(s.get_contact(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn second_insert_for_same_key_is_a_duplicate() {
  let s = store().await;
  insert(&s, "dup@example.com", t0()).await;

  let again = s.insert_contact(new_contact("dup@example.com", t0())).await.unwrap();
  assert!(matches!(again, InsertOutcome::DuplicateKey));
}

#[tokio::test]
async fn consent_requires_explicit_yes() {
  let s = store().await;
  let mut n = new_contact("later@example.com", t0());
  n.profile = profile(None, ContactPreference::Later);
  let InsertOutcome::Inserted(c) = s.insert_contact(n).await.unwrap() else {
    panic!("expected insert");
  };
  let stored = s.get_contact(c.contact_id).await.unwrap().unwrap();
  assert!(!stored.email_consent);
  assert_eq!(stored.email_consent_at, None);
}

#[tokio::test]
async fn consume_token_works_once() {
  let s = store().await;
  let c = insert(&s, "once@example.com", t0()).await;
  let token = c.verification_token.clone().unwrap();
  let at = t0() + Duration::hours(1);

  let verified = s.consume_token(token.clone(), at).await.unwrap().unwrap();
  assert!(verified.email_verified);
  assert_eq!(verified.verified_at, Some(at));
  assert_eq!(verified.verification_token, None);

  assert!(s.consume_token(token.clone(), at).await.unwrap().is_none());
  assert!(s.find_contact_by_token(token).await.unwrap().is_none());
}

#[tokio::test]
async fn refresh_rotates_token_and_resets_cycle() {
  let s = store().await;
  let c = insert(&s, "again@example.com", t0()).await;
  let old = c.verification_token.clone().unwrap();
  s.mark_verification_sent(c.contact_id, old.clone(), t0()).await.unwrap();
  s.record_reminder_sent(reminder(&c, ReminderStage::First, t0() + Duration::hours(24)))
    .await
    .unwrap();

  let later = t0() + Duration::hours(30);
  let fresh = VerificationToken::issue();
  let refreshed = s
    .refresh_contact(c.contact_id, ContactRefresh {
      profile:            profile(Some("Ada L."), ContactPreference::No),
      verification_token: fresh.clone(),
      at:                 later,
    })
    .await
    .unwrap()
    .unwrap();

  assert_eq!(refreshed.reminder_count, 0);
  assert_eq!(refreshed.last_reminder_sent_at, None);
  assert_eq!(refreshed.verification_sent_at, None);
  assert_eq!(refreshed.submitted_at, later);
  assert_eq!(refreshed.created_at, t0());
  assert_eq!(refreshed.profile.first_name.as_deref(), Some("Ada L."));
  assert!(!refreshed.email_consent);
  assert_eq!(refreshed.verification_token, Some(fresh.clone()));

  assert!(s.find_contact_by_token(old).await.unwrap().is_none());
  assert!(s.find_contact_by_token(fresh).await.unwrap().is_some());
}

#[tokio::test]
async fn refresh_revives_expired_contact() {
  let s = store().await;
  let c = insert(&s, "gone@example.com", t0()).await;
  for (i, stage) in ReminderStage::ALL.into_iter().enumerate() {
    let at = t0() + Duration::hours(24 * (i as i64 + 1));
    assert!(s.record_reminder_sent(reminder(&c, stage, at)).await.unwrap());
  }
  let gone_at = t0() + Duration::days(8);
  assert!(s.expire_contact(c.contact_id, expiry(gone_at), gone_at).await.unwrap());

  let revived = s
    .refresh_contact(c.contact_id, ContactRefresh {
      profile:            profile(None, ContactPreference::Yes),
      verification_token: VerificationToken::issue(),
      at:                 t0() + Duration::days(9),
    })
    .await
    .unwrap()
    .unwrap();
  assert!(revived.is_pending());
  assert_eq!(revived.deleted_at, None);
  assert_eq!(revived.deletion_reason, None);
}

#[tokio::test]
async fn refresh_refuses_verified_contact() {
  let s = store().await;
  let c = insert(&s, "done@example.com", t0()).await;
  s.consume_token(c.verification_token.clone().unwrap(), t0()).await.unwrap();

  let result = s
    .refresh_contact(c.contact_id, ContactRefresh {
      profile:            profile(None, ContactPreference::Yes),
      verification_token: VerificationToken::issue(),
      at:                 t0() + Duration::hours(1),
    })
    .await
    .unwrap();
  assert!(result.is_none());

  let stored = s.get_contact(c.contact_id).await.unwrap().unwrap();
  assert!(stored.email_verified);
  assert_eq!(stored.verified_at, Some(t0()));
}

#[tokio::test]
async fn mark_sent_is_guarded_on_current_token() {
  let s = store().await;
  let c = insert(&s, "sent@example.com", t0()).await;
  let token = c.verification_token.clone().unwrap();

  assert!(!s.mark_verification_sent(c.contact_id, VerificationToken::issue(), t0()).await.unwrap());
  assert!(s.mark_verification_sent(c.contact_id, token, t0()).await.unwrap());

  let stored = s.get_contact(c.contact_id).await.unwrap().unwrap();
  assert_eq!(stored.verification_sent_at, Some(t0()));
}

// ─── Reminders and expiry ────────────────────────────────────────────────────

#[tokio::test]
async fn reminders_advance_one_stage_at_a_time() {
  let s = store().await;
  let c = insert(&s, "nudge@example.com", t0()).await;
  let day1 = t0() + Duration::hours(24);

  // Skipping a stage is refused.
  assert!(!s.record_reminder_sent(reminder(&c, ReminderStage::Second, day1)).await.unwrap());

  assert!(s.record_reminder_sent(reminder(&c, ReminderStage::First, day1)).await.unwrap());
  // Booking the same stage twice is refused.
  assert!(!s.record_reminder_sent(reminder(&c, ReminderStage::First, day1)).await.unwrap());

  let stored = s.get_contact(c.contact_id).await.unwrap().unwrap();
  assert_eq!(stored.reminder_count, 1);
  assert_eq!(stored.last_reminder_sent_at, Some(day1));
  assert_eq!(stored.verification_sent_at, Some(day1));

  let log = s.reminder_log(c.contact_id).await.unwrap();
  assert_eq!(log.len(), 1);
  assert_eq!(log[0].kind, ReminderLogKind::Reminder(ReminderStage::First));
  assert_eq!(log[0].provider_message_id.as_deref(), Some("msg-1"));
}

#[tokio::test]
async fn no_reminders_once_verified() {
  let s = store().await;
  let c = insert(&s, "quick@example.com", t0()).await;
  s.consume_token(c.verification_token.clone().unwrap(), t0()).await.unwrap();

  let day1 = t0() + Duration::hours(24);
  assert!(!s.record_reminder_sent(reminder(&c, ReminderStage::First, day1)).await.unwrap());
  assert!(s.reminder_log(c.contact_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn reminder_for_a_rotated_token_is_not_booked() {
  let s = store().await;
  let c = insert(&s, "rotate@example.com", t0()).await;
  let refreshed = s
    .refresh_contact(c.contact_id, ContactRefresh {
      profile:            profile(Some("Ada"), ContactPreference::Yes),
      verification_token: VerificationToken::issue(),
      at:                 t0() + Duration::hours(1),
    })
    .await
    .unwrap()
    .unwrap();

  let day1 = t0() + Duration::hours(25);
  assert!(!s.record_reminder_sent(reminder(&c, ReminderStage::First, day1)).await.unwrap());
  assert_eq!(s.get_contact(c.contact_id).await.unwrap().unwrap().reminder_count, 0);

  assert!(s.record_reminder_sent(reminder(&refreshed, ReminderStage::First, day1)).await.unwrap());
}

#[tokio::test]
async fn expire_requires_final_reminder_and_happens_once() {
  let s = store().await;
  let c = insert(&s, "late@example.com", t0()).await;
  let deadline = t0() + Duration::days(7);

  assert!(!s.expire_contact(c.contact_id, expiry(deadline), deadline).await.unwrap());

  for (i, stage) in ReminderStage::ALL.into_iter().enumerate() {
    let at = t0() + Duration::hours(24 * (i as i64 + 1));
    assert!(s.record_reminder_sent(reminder(&c, stage, at)).await.unwrap());
  }

  assert!(s.expire_contact(c.contact_id, expiry(deadline), deadline).await.unwrap());
  assert!(!s.expire_contact(c.contact_id, expiry(deadline), deadline).await.unwrap());

  let stored = s.get_contact(c.contact_id).await.unwrap().unwrap();
  assert_eq!(stored.deleted_at, Some(deadline));
  assert_eq!(stored.deletion_reason, Some(DeletionReason::VerificationExpired));
  assert_eq!(stored.verification_token, None);
  assert!(!stored.is_pending());

  let kinds: Vec<_> = s
    .reminder_log(c.contact_id)
    .await
    .unwrap()
    .into_iter()
    .map(|e| e.kind)
    .collect();
  assert_eq!(kinds, [
    ReminderLogKind::Reminder(ReminderStage::First),
    ReminderLogKind::Reminder(ReminderStage::Second),
    ReminderLogKind::Reminder(ReminderStage::Final),
    ReminderLogKind::Deletion,
  ]);
}

#[tokio::test]
async fn late_final_reminder_postpones_expiry() {
  let s = store().await;
  let c = insert(&s, "slow@example.com", t0()).await;
  for (stage, hours) in ReminderStage::ALL.into_iter().zip([24, 72, 168]) {
    let at = t0() + Duration::hours(hours);
    assert!(s.record_reminder_sent(reminder(&c, stage, at)).await.unwrap());
  }

  for hours in [168, 191] {
    let now = t0() + Duration::hours(hours);
    assert!(s.list_expirable_contacts(expiry(now)).await.unwrap().is_empty());
    assert!(!s.expire_contact(c.contact_id, expiry(now), now).await.unwrap());
  }

  let now = t0() + Duration::hours(192);
  let due: Vec<_> = s
    .list_expirable_contacts(expiry(now))
    .await
    .unwrap()
    .into_iter()
    .map(|c| c.contact_id)
    .collect();
  assert_eq!(due, [c.contact_id]);
  assert!(s.expire_contact(c.contact_id, expiry(now), now).await.unwrap());
}

#[tokio::test]
async fn listings_only_return_due_pending_contacts() {
  let s = store().await;
  let old = insert(&s, "old@example.com", t0()).await;
  let new = insert(&s, "new@example.com", t0() + Duration::hours(20)).await;
  let verified = insert(&s, "ok@example.com", t0()).await;
  s.consume_token(verified.verification_token.clone().unwrap(), t0()).await.unwrap();

  let cutoff = t0() + Duration::hours(1);
  let pending: Vec<_> = s
    .list_pending_contacts(cutoff)
    .await
    .unwrap()
    .into_iter()
    .map(|c| c.contact_id)
    .collect();
  assert_eq!(pending, [old.contact_id]);

  let all: Vec<_> = s
    .list_pending_contacts(t0() + Duration::days(1))
    .await
    .unwrap()
    .into_iter()
    .map(|c| c.contact_id)
    .collect();
  assert_eq!(all, [old.contact_id, new.contact_id]);

  assert!(s.list_expirable_contacts(expiry(t0() + Duration::days(30))).await.unwrap().is_empty());
}

// ─── Rate limiting ───────────────────────────────────────────────────────────

#[tokio::test]
async fn rate_limit_events_are_counted_per_origin_and_window() {
  let s = store().await;
  for i in 0..3 {
    s.record_rate_limit_event("203.0.113.9".into(), t0() + Duration::minutes(i))
      .await
      .unwrap();
  }
  s.record_rate_limit_event("198.51.100.1".into(), t0()).await.unwrap();

  assert_eq!(s.count_rate_limit_events("203.0.113.9".into(), t0()).await.unwrap(), 3);
  assert_eq!(
    s.count_rate_limit_events("203.0.113.9".into(), t0() + Duration::minutes(1))
      .await
      .unwrap(),
    2
  );
  assert_eq!(s.count_rate_limit_events("198.51.100.1".into(), t0()).await.unwrap(), 1);
  assert_eq!(s.count_rate_limit_events("unknown".into(), t0()).await.unwrap(), 0);
}

// ─── Opt-ins ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn opt_in_insert_if_absent_and_deactivate() {
  let s = store().await;
  let email = "fan@example.com".to_string();

  assert!(!s.deactivate_opt_in(email.clone(), t0()).await.unwrap());
  assert!(s.ensure_opt_in(email.clone(), "registration_flow".into(), t0()).await.unwrap());
  assert!(!s.ensure_opt_in(email.clone(), "other".into(), t0()).await.unwrap());

  let rec = s.get_opt_in(email.clone()).await.unwrap().unwrap();
  assert!(rec.is_active);
  assert_eq!(rec.source.as_deref(), Some("registration_flow"));
  assert_eq!(rec.verified_at, Some(t0()));

  let later = t0() + Duration::days(2);
  assert!(s.deactivate_opt_in(email.clone(), later).await.unwrap());
  assert!(s.deactivate_opt_in(email.clone(), later).await.unwrap());
  let rec = s.get_opt_in(email.clone()).await.unwrap().unwrap();
  assert!(!rec.is_active);
  assert_eq!(rec.updated_at, later);

  // An existing record is never reactivated by a later insert-if-absent.
  assert!(!s.ensure_opt_in(email.clone(), "registration_flow".into(), later).await.unwrap());
  assert!(!s.get_opt_in(email).await.unwrap().unwrap().is_active);
}

#[tokio::test]
async fn reopening_file_keeps_data() {
  let dir = std::env::temp_dir().join(format!("henrietta-{}", Uuid::new_v4()));
  std::fs::create_dir_all(&dir).unwrap();
  let path = dir.join("registry.db");

  let id = {
    let s = SqliteStore::open(&path).await.unwrap();
    insert(&s, "disk@example.com", t0()).await.contact_id
  };
  let s = SqliteStore::open(&path).await.unwrap();
  assert!(s.get_contact(id).await.unwrap().is_some());

  std::fs::remove_dir_all(dir).ok();
}
