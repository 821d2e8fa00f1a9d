//! Process wiring for the `entitle` binary: configuration, logging, the
//! HTTP router and the in-process renewal loop.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::{Context as _, anyhow};
use axum::{Router, routing::get};
use chrono_tz::Tz;
use entitle_core::{
  renewal::{RenewalOptions, run_renewals},
  store::SupportStore,
};
use serde::Deserialize;
use tokio::{
  task::JoinHandle,
  time::{self, MissedTickBehavior},
};
use tower_http::trace::TraceLayer;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime configuration, read from a TOML file and `ENTITLE_*` variables.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                  String,
  #[serde(default = "default_port")]
  pub port:                  u16,
  #[serde(default = "default_store_path")]
  pub store_path:            PathBuf,
  /// IANA zone name used for every calendar decision.
  #[serde(default = "default_timezone")]
  pub timezone:              String,
  /// When set, `serve` also runs renewals on this cadence.
  #[serde(default)]
  pub renewal_interval_secs: Option<u64>,
  #[serde(default)]
  pub renewal_lead_days:     u32,
  #[serde(default)]
  pub log_json:              bool,
}

fn default_host() -> String { "127.0.0.1".into() }
fn default_port() -> u16 { 8080 }
fn default_store_path() -> PathBuf { PathBuf::from("entitle.sqlite3") }
fn default_timezone() -> String { "America/Bogota".into() }

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:                  default_host(),
      port:                  default_port(),
      store_path:            default_store_path(),
      timezone:              default_timezone(),
      renewal_interval_secs: None,
      renewal_lead_days:     0,
      log_json:              false,
    }
  }
}

impl ServerConfig {
  pub fn zone(&self) -> anyhow::Result<Tz> {
    self
      .timezone
      .parse::<Tz>()
      .map_err(|e| anyhow!("invalid timezone {:?}: {e}", self.timezone))
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn store_path(&self) -> PathBuf { expand_tilde(&self.store_path) }

  pub fn renewal_interval(&self) -> Option<Duration> {
    self
      .renewal_interval_secs
      .filter(|secs| *secs > 0)
      .map(Duration::from_secs)
  }
}

/// Layer `path` (optional) under `ENTITLE_*` environment variables.
pub fn load_config(path: &Path) -> anyhow::Result<ServerConfig> {
  config::Config::builder()
    .add_source(config::File::from(path.to_path_buf()).required(false))
    .add_source(config::Environment::with_prefix("ENTITLE"))
    .build()
    .context("failed to read configuration")?
    .try_deserialize()
    .context("failed to deserialise ServerConfig")
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

// ─── Logging ─────────────────────────────────────────────────────────────────

/// `RUST_LOG` overrides the default `info` level.
pub fn init_tracing(json: bool) {
  let filter = EnvFilter::builder()
    .with_default_directive(LevelFilter::INFO.into())
    .from_env_lossy();
  let builder = tracing_subscriber::fmt().with_env_filter(filter);
  if json {
    builder.json().init();
  } else {
    builder.init();
  }
}

// ─── HTTP ────────────────────────────────────────────────────────────────────

/// The API under `/api`, plus an unauthenticated `/health` probe.
pub fn router<S>(store: Arc<S>) -> Router
where
  S: SupportStore + 'static,
{
  Router::new()
    .route("/health", get(health))
    .nest("/api", entitle_api::api_router(store))
    .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str { "ok" }

// ─── Renewal loop ────────────────────────────────────────────────────────────

/// Run the renewal batch every `every`. Overlapping runs, including ones
/// started by another process, are turned away by the job lock.
pub fn spawn_renewal_loop<S>(
  store: Arc<S>,
  every: Duration,
  lead_days: u32,
) -> JoinHandle<()>
where
  S: SupportStore + 'static,
{
  info!(every_secs = every.as_secs(), lead_days, "renewal loop enabled");
  tokio::spawn(async move {
    let mut ticker = time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
      ticker.tick().await;
      let options = RenewalOptions { dry_run: false, lead_days };
      match run_renewals(store.as_ref(), store.today(), options).await {
        Ok(report) if !report.is_clean() => {
          warn!(failed = report.errors.len(), "renewal run left failures");
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "renewal run aborted"),
      }
    }
  })
}
