//! The reminder and expiry job.
//!
//! Each run makes two passes. The reminder pass sends every pending contact
//! the next stage it has become due for; the expiry pass soft-deletes
//! contacts that received every reminder and passed the deletion deadline.
//! Both passes book their effects through guarded store writes, so reruns
//! and overlapping runs never double-send or double-delete.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
  Context,
  config::ReminderConfig,
  contact::{Contact, ReminderStage},
  mail::{EmailTemplate, Mailer},
  store::{RegistryStore, ReminderSent},
};

/// Outcome of one run, reported to logs and by the `run-reminders` command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobSummary {
  /// False only when a pass could not list its candidates.
  pub success:        bool,
  pub reminders_sent: u32,
  pub deletions:      u32,
  pub errors:         Vec<String>,
}

/// The stage `contact` should receive now, if any. Pure.
///
/// The next stage is always `reminder_count + 1`, so a contact that missed
/// a run catches up one stage at a time.
pub fn due_stage(
  contact: &Contact,
  now: DateTime<Utc>,
  config: &ReminderConfig,
) -> Option<ReminderStage> {
  if !contact.is_pending() {
    return None;
  }
  let stage = ReminderStage::from_number(contact.reminder_count.checked_add(1)?)?;
  (now - contact.submitted_at >= config.offset(stage)).then_some(stage)
}

/// Whether `contact` has exhausted its reminders, passed the deadline, and
/// had its final reminder out for the full grace period.
///
/// A final reminder sent late (after a failed send or missed runs) pushes
/// expiry back, so its link is never dead on arrival.
pub fn is_expirable(contact: &Contact, now: DateTime<Utc>, config: &ReminderConfig) -> bool {
  let rule = config.expiry_rule(now);
  contact.is_pending()
    && contact.reminder_count >= rule.min_reminders
    && contact.submitted_at <= rule.submitted_before
    && contact.last_reminder_sent_at.is_some_and(|at| at <= rule.reminded_before)
}

pub struct ReminderScheduler<S, M> {
  ctx: Context<S, M>,
}

impl<S, M> ReminderScheduler<S, M>
where
  S: RegistryStore,
  M: Mailer,
{
  pub fn new(ctx: Context<S, M>) -> Self { Self { ctx } }

  pub async fn run_once(&self) -> JobSummary {
    let now = self.ctx.clock.now();
    let mut summary = JobSummary { success: true, ..Default::default() };

    self.reminder_pass(now, &mut summary).await;
    self.expiry_pass(now, &mut summary).await;

    tracing::info!(
      success = summary.success,
      reminders_sent = summary.reminders_sent,
      deletions = summary.deletions,
      errors = summary.errors.len(),
      "reminder job finished"
    );
    summary
  }

  async fn reminder_pass(&self, now: DateTime<Utc>, summary: &mut JobSummary) {
    let config = &self.ctx.config.reminders;
    let cutoff = now - config.offset(ReminderStage::First);

    let candidates = match self.ctx.store.list_pending_contacts(cutoff).await {
      Ok(c) => c,
      Err(e) => {
        tracing::error!(error = %e, "failed to list pending contacts");
        summary.success = false;
        summary.errors.push(format!("listing pending contacts: {e}"));
        return;
      }
    };

    for contact in candidates {
      let Some(stage) = due_stage(&contact, now, config) else {
        continue;
      };
      match self.send_reminder(&contact, stage, now).await {
        Ok(true) => summary.reminders_sent += 1,
        Ok(false) => {}
        Err(msg) => summary.errors.push(msg),
      }
    }
  }

  /// `Ok(false)` means the booking guard missed: another run got there first
  /// or the contact left the pending state.
  async fn send_reminder(
    &self,
    contact: &Contact,
    stage: ReminderStage,
    now: DateTime<Utc>,
  ) -> Result<bool, String> {
    let Some(token) = &contact.verification_token else {
      return Ok(false);
    };

    let links = &self.ctx.config.links;
    let template = EmailTemplate::Reminder {
      stage,
      verify_url: links.verify_url(token),
      unsubscribe_url: links.unsubscribe_url(&contact.email),
    };

    let delivery = self.ctx.mailer.send(&contact.email, &template).await.map_err(|e| {
      tracing::warn!(contact_id = %contact.contact_id, %stage, error = %e, "reminder send failed");
      format!("reminder {stage} for {}: {e}", contact.contact_id)
    })?;

    let sent = ReminderSent {
      contact_id: contact.contact_id,
      stage,
      token: token.clone(),
      provider_message_id: delivery.provider_message_id,
      at: now,
    };
    let booked = self.ctx.store.record_reminder_sent(sent).await.map_err(|e| {
      tracing::error!(contact_id = %contact.contact_id, %stage, error = %e, "failed to record reminder");
      format!("recording reminder {stage} for {}: {e}", contact.contact_id)
    })?;

    if booked {
      tracing::info!(contact_id = %contact.contact_id, %stage, "reminder sent");
    } else {
      tracing::warn!(contact_id = %contact.contact_id, %stage, "reminder already booked; skipping");
    }
    Ok(booked)
  }

  async fn expiry_pass(&self, now: DateTime<Utc>, summary: &mut JobSummary) {
    let config = &self.ctx.config.reminders;
    let rule = config.expiry_rule(now);

    let candidates = match self.ctx.store.list_expirable_contacts(rule).await {
      Ok(c) => c,
      Err(e) => {
        tracing::error!(error = %e, "failed to list expirable contacts");
        summary.success = false;
        summary.errors.push(format!("listing expirable contacts: {e}"));
        return;
      }
    };

    for contact in candidates.iter().filter(|c| is_expirable(c, now, config)) {
      match self.ctx.store.expire_contact(contact.contact_id, rule, now).await {
        Ok(true) => {
          tracing::info!(contact_id = %contact.contact_id, "unverified contact expired");
          summary.deletions += 1;
        }
        Ok(false) => {}
        Err(e) => {
          tracing::error!(contact_id = %contact.contact_id, error = %e, "failed to expire contact");
          summary.errors.push(format!("expiring {}: {e}", contact.contact_id));
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone};
  use uuid::Uuid;

  use super::*;
  use crate::{
    contact::{ContactPreference, DpcStatus, Profile},
    dedup::DedupKeys,
    token::VerificationToken,
  };

  fn start() -> DateTime<Utc> { Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap() }

  fn pending(reminder_count: u8) -> Contact {
    let last_reminder = match reminder_count {
      0 => None,
      n => Some(start() + Duration::hours([24, 72, 144][usize::from(n.min(3)) - 1])),
    };
    Contact {
      contact_id: Uuid::new_v4(),
      email: "b@example.com".into(),
      dedup_key: DedupKeys::new("t:").derive("b@example.com"),
      profile: Profile {
        first_name:         Some("Bea".into()),
        postal_code:        "02139".into(),
        dpc_status:         DpcStatus::No,
        contact_preference: ContactPreference::Yes,
        referral_source:    None,
        utm_source:         None,
        utm_medium:         None,
        utm_campaign:       None,
      },
      email_verified: false,
      verified_at: None,
      verification_token: Some(VerificationToken::issue()),
      verification_sent_at: Some(start()),
      reminder_count,
      last_reminder_sent_at: last_reminder,
      deleted_at: None,
      deletion_reason: None,
      email_consent: true,
      email_consent_at: Some(start()),
      submitted_at: start(),
      created_at: start(),
      updated_at: start(),
    }
  }

  fn after(hours: i64) -> DateTime<Utc> { start() + Duration::hours(hours) }

  #[test]
  fn nothing_due_before_first_offset() {
    let cfg = ReminderConfig::default();
    assert_eq!(due_stage(&pending(0), after(23), &cfg), None);
    assert_eq!(due_stage(&pending(0), after(24), &cfg), Some(ReminderStage::First));
  }

  #[test]
  fn next_stage_follows_count() {
    let cfg = ReminderConfig::default();
    assert_eq!(due_stage(&pending(1), after(71), &cfg), None);
    assert_eq!(due_stage(&pending(1), after(72), &cfg), Some(ReminderStage::Second));
    assert_eq!(due_stage(&pending(2), after(144), &cfg), Some(ReminderStage::Final));
    assert_eq!(due_stage(&pending(3), after(500), &cfg), None);
  }

  #[test]
  fn missed_runs_catch_up_one_stage_at_a_time() {
    let cfg = ReminderConfig::default();
    assert_eq!(due_stage(&pending(0), after(150), &cfg), Some(ReminderStage::First));
  }

  #[test]
  fn verified_or_deleted_never_due() {
    let cfg = ReminderConfig::default();
    let mut verified = pending(0);
    verified.email_verified = true;
    assert_eq!(due_stage(&verified, after(30), &cfg), None);

    let mut deleted = pending(3);
    deleted.deleted_at = Some(after(168));
    assert!(!is_expirable(&deleted, after(200), &cfg));
  }

  #[test]
  fn expirable_needs_all_reminders_and_deadline() {
    let cfg = ReminderConfig::default();
    assert!(!is_expirable(&pending(2), after(200), &cfg));
    assert!(!is_expirable(&pending(3), after(167), &cfg));
    assert!(is_expirable(&pending(3), after(168), &cfg));
  }

  #[test]
  fn late_final_reminder_gets_full_grace() {
    let cfg = ReminderConfig::default();
    let mut late = pending(3);
    late.last_reminder_sent_at = Some(after(168));
    assert!(!is_expirable(&late, after(168), &cfg));
    assert!(!is_expirable(&late, after(191), &cfg));
    assert!(is_expirable(&late, after(192), &cfg));
  }

  #[test]
  fn summary_serializes_flat() {
    let s = JobSummary { success: true, reminders_sent: 2, deletions: 1, errors: vec![] };
    let json = serde_json::to_value(&s).unwrap();
    assert_eq!(
      json,
      serde_json::json!({ "success": true, "reminders_sent": 2, "deletions": 1, "errors": [] })
    );
  }
}
