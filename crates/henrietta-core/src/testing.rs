//! In-memory test doubles for the mail transport and the clock.

use std::sync::{
  Mutex,
  atomic::{AtomicBool, AtomicU64, Ordering},
};

use chrono::{DateTime, Duration, TimeZone, Utc};
use thiserror::Error;

use crate::{
  clock::Clock,
  mail::{Delivery, EmailTemplate, Mailer},
};

// ─── Clock ───────────────────────────────────────────────────────────────────

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
  now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
  pub fn new(start: DateTime<Utc>) -> Self { Self { now: Mutex::new(start) } }

  /// A fixed, arbitrary starting instant.
  pub fn at_epoch() -> Self {
    Self::new(Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap())
  }

  pub fn set(&self, to: DateTime<Utc>) { *self.now.lock().unwrap() = to; }

  pub fn advance(&self, by: Duration) { *self.now.lock().unwrap() += by; }
}

impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> { *self.now.lock().unwrap() }
}

// ─── Mailer ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
  pub to:       String,
  pub template: EmailTemplate,
}

#[derive(Debug, Error)]
#[error("mail transport unavailable")]
pub struct MailerUnavailable;

/// Records every accepted message. Can be switched into a failing mode.
#[derive(Debug, Default)]
pub struct RecordingMailer {
  sent:    Mutex<Vec<SentEmail>>,
  failing: AtomicBool,
  next_id: AtomicU64,
}

impl RecordingMailer {
  pub fn new() -> Self { Self::default() }

  /// While set, every `send` fails and nothing is recorded.
  pub fn set_failing(&self, failing: bool) { self.failing.store(failing, Ordering::SeqCst); }

  pub fn sent(&self) -> Vec<SentEmail> { self.sent.lock().unwrap().clone() }

  pub fn sent_to(&self, to: &str) -> Vec<EmailTemplate> {
    self
      .sent
      .lock()
      .unwrap()
      .iter()
      .filter(|m| m.to == to)
      .map(|m| m.template.clone())
      .collect()
  }

  pub fn count(&self) -> usize { self.sent.lock().unwrap().len() }

  pub fn clear(&self) { self.sent.lock().unwrap().clear(); }
}

impl Mailer for RecordingMailer {
  type Error = MailerUnavailable;

  async fn send<'a>(
    &'a self,
    to: &'a str,
    template: &'a EmailTemplate,
  ) -> Result<Delivery, MailerUnavailable> {
    if self.failing.load(Ordering::SeqCst) {
      return Err(MailerUnavailable);
    }
    let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
    self.sent.lock().unwrap().push(SentEmail {
      to:       to.to_string(),
      template: template.clone(),
    });
    Ok(Delivery { provider_message_id: Some(format!("msg-{id}")) })
  }
}
