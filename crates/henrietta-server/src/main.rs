//! henrietta server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`) layered with
//! `HENRIETTA__*` environment variables, opens the SQLite store, and either
//! serves the registry over HTTP or runs the reminder job once and exits.
//!
//! ```
//! HENRIETTA__MAIL__API_KEY=re_... henrietta serve
//! henrietta run-reminders   # e.g. from cron, with scheduler.enabled = false
//! ```

use std::{
  net::SocketAddr,
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use henrietta_api::AppState;
use henrietta_core::{Context, clock::SystemClock, reminders::ReminderScheduler};
use henrietta_server::{ServerConfig, mailer::ResendMailer};
use henrietta_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Henrietta signup registry")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the HTTP API (the default).
  Serve,
  /// Run one reminder and expiry pass, print its summary as JSON, and exit.
  RunReminders,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("HENRIETTA").separator("__"))
    .build()
    .context("failed to read configuration")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;
  server_cfg.validate().context("invalid configuration")?;

  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  let mailer = ResendMailer::new(&server_cfg.mail).context("failed to build mail client")?;

  let ctx = Context::new(
    Arc::new(store),
    Arc::new(mailer),
    Arc::new(server_cfg.registry.clone()),
    Arc::new(SystemClock),
  );

  match cli.command.unwrap_or(Command::Serve) {
    Command::RunReminders => {
      let summary = ReminderScheduler::new(ctx).run_once().await;
      println!("{}", serde_json::to_string_pretty(&summary)?);
      if !summary.success {
        anyhow::bail!("reminder job failed");
      }
      Ok(())
    }
    Command::Serve => serve(&server_cfg, ctx).await,
  }
}

async fn serve(
  server_cfg: &ServerConfig,
  ctx: Context<SqliteStore, ResendMailer>,
) -> anyhow::Result<()> {
  if server_cfg.scheduler.enabled {
    let scheduler = Arc::new(ReminderScheduler::new(ctx.clone()));
    henrietta_server::spawn_scheduler(scheduler, server_cfg.scheduler.interval());
    tracing::info!(
      every_minutes = server_cfg.scheduler.interval_minutes,
      "reminder scheduler started"
    );
  }

  let app = henrietta_server::app(AppState::new(ctx));
  let address = server_cfg.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
    .await
    .context("server error")?;

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
