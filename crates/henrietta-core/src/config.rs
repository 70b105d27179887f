//! Registry configuration.
//!
//! Every threshold, window, and deny-list the lifecycle depends on lives here
//! and is handed to each component at construction time. All fields have
//! defaults, so an empty configuration source yields a working registry.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use url::Url;

use crate::{Error, Result, contact::ReminderStage, store::ExpiryRule};

// ─── Root ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
  /// Fixed, secret-free prefix mixed into every dedup key digest.
  pub dedup_prefix: String,
  pub validation:   ValidationConfig,
  pub rate_limit:   RateLimitConfig,
  pub verification: VerificationConfig,
  pub reminders:    ReminderConfig,
  pub links:        LinkConfig,
}

impl Default for RegistryConfig {
  fn default() -> Self {
    Self {
      dedup_prefix: "henrietta:".to_string(),
      validation:   ValidationConfig::default(),
      rate_limit:   RateLimitConfig::default(),
      verification: VerificationConfig::default(),
      reminders:    ReminderConfig::default(),
      links:        LinkConfig::default(),
    }
  }
}

impl RegistryConfig {
  /// Reject configurations the lifecycle cannot run under.
  pub fn validate(&self) -> Result<()> {
    if self.rate_limit.max_attempts == 0 {
      return Err(Error::Config("rate_limit.max_attempts must be at least 1".into()));
    }
    if self.rate_limit.window_minutes == 0 {
      return Err(Error::Config("rate_limit.window_minutes must be positive".into()));
    }
    if self.verification.expiry_hours == 0 {
      return Err(Error::Config("verification.expiry_hours must be positive".into()));
    }
    if self.validation.postal_code_digits == 0 {
      return Err(Error::Config("validation.postal_code_digits must be positive".into()));
    }

    let offsets = self.reminders.offsets_hours;
    if offsets[0] == 0 || !offsets.windows(2).all(|w| w[0] < w[1]) {
      return Err(Error::Config(format!(
        "reminders.offsets_hours must be positive and strictly increasing, got {offsets:?}"
      )));
    }
    if self.reminders.deletion_after_hours <= offsets[2] {
      return Err(Error::Config(
        "reminders.deletion_after_hours must come after the final reminder".into(),
      ));
    }

    for (name, raw) in [
      ("links.site_url", &self.links.site_url),
      ("links.api_base_url", &self.links.api_base_url),
    ] {
      Url::parse(raw).map_err(|e| Error::Config(format!("{name}: {e}")))?;
    }

    Ok(())
  }
}

// ─── Validation ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
  /// Exact number of ASCII digits a postal code must have.
  pub postal_code_digits: usize,
  /// Domains (the part after `@`) that are refused as throwaway inboxes.
  pub disposable_domains: Vec<String>,
}

impl Default for ValidationConfig {
  fn default() -> Self {
    Self {
      postal_code_digits: 5,
      disposable_domains: [
        "tempmail.com",
        "throwaway.com",
        "mailinator.com",
        "10minutemail.com",
        "guerrillamail.com",
        "sharklasers.com",
        "yopmail.com",
        "maildrop.cc",
      ]
      .into_iter()
      .map(str::to_owned)
      .collect(),
    }
  }
}

impl ValidationConfig {
  pub fn is_disposable(&self, domain: &str) -> bool {
    self
      .disposable_domains
      .iter()
      .any(|d| d.eq_ignore_ascii_case(domain))
  }
}

// ─── Rate limiting ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
  /// Attempts allowed per origin inside one window.
  pub max_attempts:        u64,
  pub window_minutes:      u32,
  /// Take the origin from `X-Forwarded-For`. Only safe behind a proxy that
  /// overwrites the header; a directly exposed listener should turn this off
  /// and key on the socket peer.
  pub trust_forwarded_for: bool,
}

impl Default for RateLimitConfig {
  fn default() -> Self {
    Self { max_attempts: 5, window_minutes: 60, trust_forwarded_for: true }
  }
}

impl RateLimitConfig {
  pub fn window(&self) -> Duration { Duration::minutes(i64::from(self.window_minutes)) }
}

// ─── Verification ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
  /// How long a delivered verification link stays usable.
  pub expiry_hours: u32,
}

impl Default for VerificationConfig {
  fn default() -> Self { Self { expiry_hours: 48 } }
}

impl VerificationConfig {
  pub fn expiry_window(&self) -> Duration { Duration::hours(i64::from(self.expiry_hours)) }
}

// ─── Reminders ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
  /// Offsets from the start of the pending cycle, one per reminder stage.
  pub offsets_hours:        [u32; 3],
  /// Hard deadline after which a contact that got every reminder is expired.
  pub deletion_after_hours: u32,
}

impl Default for ReminderConfig {
  fn default() -> Self {
    Self { offsets_hours: [24, 72, 144], deletion_after_hours: 168 }
  }
}

impl ReminderConfig {
  pub fn offset(&self, stage: ReminderStage) -> Duration {
    let idx = usize::from(stage.number() - 1);
    Duration::hours(i64::from(self.offsets_hours[idx]))
  }

  pub fn deletion_deadline(&self) -> Duration {
    Duration::hours(i64::from(self.deletion_after_hours))
  }

  /// How long the final reminder's link stays live before expiry, measured
  /// from when that reminder actually went out.
  pub fn final_grace(&self) -> Duration {
    self.deletion_deadline() - self.offset(ReminderStage::Final)
  }

  /// Contacts that run out of time at `now`.
  pub fn expiry_rule(&self, now: DateTime<Utc>) -> ExpiryRule {
    ExpiryRule {
      min_reminders:    ReminderStage::Final.number(),
      submitted_before: now - self.deletion_deadline(),
      reminded_before:  now - self.final_grace(),
    }
  }
}

// ─── Links ───────────────────────────────────────────────────────────────────

/// Public base URLs used to build links in outbound email and redirects.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
  /// The landing site; status pages live at `/verify` and `/unsubscribe`.
  pub site_url:     String,
  /// Where this service's `/verify-email` and `/unsubscribe` are reachable.
  pub api_base_url: String,
}

impl Default for LinkConfig {
  fn default() -> Self {
    Self {
      site_url:     "https://henriettatech.com".to_string(),
      api_base_url: "http://localhost:8080".to_string(),
    }
  }
}

impl LinkConfig {
  pub fn verify_url(&self, token: &crate::token::VerificationToken) -> String {
    format!("{}/verify-email?token={token}", self.api_base_url.trim_end_matches('/'))
  }

  pub fn unsubscribe_url(&self, email: &str) -> String {
    format!(
      "{}/unsubscribe?token={}",
      self.api_base_url.trim_end_matches('/'),
      crate::unsubscribe::encode_token(email),
    )
  }

  /// The landing-site status page for `page` (e.g. `"verify"`).
  pub fn status_page(&self, page: &str) -> Result<Url> {
    let raw = format!("{}/{page}", self.site_url.trim_end_matches('/'));
    Url::parse(&raw).map_err(|e| Error::Config(format!("links.site_url: {e}")))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_are_valid() {
    RegistryConfig::default().validate().unwrap();
  }

  #[test]
  fn default_reminder_offsets() {
    let r = ReminderConfig::default();
    assert_eq!(r.offset(ReminderStage::First), Duration::hours(24));
    assert_eq!(r.offset(ReminderStage::Second), Duration::hours(72));
    assert_eq!(r.offset(ReminderStage::Final), Duration::hours(144));
    assert_eq!(r.deletion_deadline(), Duration::days(7));
    assert_eq!(r.final_grace(), Duration::hours(24));
  }

  #[test]
  fn rejects_unordered_offsets() {
    let mut cfg = RegistryConfig::default();
    cfg.reminders.offsets_hours = [72, 24, 144];
    assert!(matches!(cfg.validate(), Err(Error::Config(_))));
  }

  #[test]
  fn rejects_deadline_before_final_reminder() {
    let mut cfg = RegistryConfig::default();
    cfg.reminders.deletion_after_hours = 100;
    assert!(matches!(cfg.validate(), Err(Error::Config(_))));
  }

  #[test]
  fn disposable_lookup_ignores_case() {
    let v = ValidationConfig::default();
    assert!(v.is_disposable("Mailinator.COM"));
    assert!(!v.is_disposable("example.com"));
  }

  #[test]
  fn links_trim_trailing_slash() {
    let links = LinkConfig {
      site_url:     "https://example.org/".into(),
      api_base_url: "https://api.example.org/".into(),
    };
    let url = links.unsubscribe_url("a@b.co");
    assert!(url.starts_with("https://api.example.org/unsubscribe?token="));
    assert_eq!(
      links.status_page("verify").unwrap().as_str(),
      "https://example.org/verify"
    );
  }
}
