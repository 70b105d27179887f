//! Deployable Henrietta service.
//!
//! Wires the registry router from `henrietta-api` to a SQLite store and the
//! Resend mail transport, layers CORS and request tracing on top, and owns
//! the periodic reminder job.

pub mod mailer;

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::Router;
use henrietta_api::{AppState, api_router};
use henrietta_core::{
  config::RegistryConfig, mail::Mailer, reminders::ReminderScheduler, store::RegistryStore,
};
use serde::Deserialize;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime configuration, deserialised from `config.toml` and `HENRIETTA__*`
/// environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
  pub registry:   RegistryConfig,
  pub mail:       MailConfig,
  pub scheduler:  SchedulerConfig,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:       "0.0.0.0".to_string(),
      port:       8080,
      store_path: PathBuf::from("henrietta.db"),
      registry:   RegistryConfig::default(),
      mail:       MailConfig::default(),
      scheduler:  SchedulerConfig::default(),
    }
  }
}

impl ServerConfig {
  /// Check everything needed before touching the store or the network.
  pub fn validate(&self) -> anyhow::Result<()> {
    self.registry.validate()?;
    if self.mail.api_key.trim().is_empty() {
      anyhow::bail!("mail.api_key is not set");
    }
    if self.scheduler.interval_minutes == 0 {
      anyhow::bail!("scheduler.interval_minutes must be positive");
    }
    Ok(())
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

/// Resend credentials and sender identity.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MailConfig {
  pub api_key:  String,
  pub from:     String,
  pub reply_to: Option<String>,
  pub api_url:  String,
}

impl Default for MailConfig {
  fn default() -> Self {
    Self {
      api_key:  String::new(),
      from:     "Henrietta <hello@henriettatech.com>".to_string(),
      reply_to: None,
      api_url:  "https://api.resend.com".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
  /// Run the reminder job inside `serve`. Turn off when an external cron
  /// drives `run-reminders` instead.
  pub enabled:          bool,
  pub interval_minutes: u64,
}

impl Default for SchedulerConfig {
  fn default() -> Self { Self { enabled: true, interval_minutes: 24 * 60 } }
}

impl SchedulerConfig {
  pub fn interval(&self) -> Duration { Duration::from_secs(self.interval_minutes * 60) }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// The registry router with the browser-facing layers applied.
pub fn app<S, M>(state: AppState<S, M>) -> Router
where
  S: RegistryStore + 'static,
  M: Mailer + 'static,
{
  api_router(state)
    .layer(CorsLayer::permissive())
    .layer(TraceLayer::new_for_http())
}

// ─── Scheduler ────────────────────────────────────────────────────────────────

/// Run the reminder job every `every`, starting immediately.
///
/// A slow run delays the next tick rather than stacking runs.
pub fn spawn_scheduler<S, M>(
  scheduler: Arc<ReminderScheduler<S, M>>,
  every: Duration,
) -> JoinHandle<()>
where
  S: RegistryStore + 'static,
  M: Mailer + 'static,
{
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
      ticker.tick().await;
      let summary = scheduler.run_once().await;
      if summary.success {
        tracing::info!(
          reminders_sent = summary.reminders_sent,
          deletions = summary.deletions,
          errors = summary.errors.len(),
          "reminder job finished"
        );
      } else {
        tracing::error!(errors = ?summary.errors, "reminder job could not complete");
      }
    }
  })
}

// ─── Tests ────────────────────────────────────────────────────────────────────
