//! `entitle` binary.
//!
//! `serve` exposes the REST API (and optionally the renewal loop);
//! `renew` runs one renewal batch and prints its report as JSON.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use entitle_core::{
  clock::SystemClock,
  renewal::{RenewalOptions, run_renewals},
  store::SupportStore,
};
use entitle_server::{ServerConfig, init_tracing, load_config, router, spawn_renewal_loop};
use entitle_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about = "Support entitlement engine")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, env = "ENTITLE_CONFIG", default_value = "entitle.toml")]
  config: PathBuf,

  /// Emit logs as JSON.
  #[arg(long)]
  log_json: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the HTTP API.
  Serve,
  /// Run one renewal batch.
  Renew {
    /// Report what would happen without writing anything.
    #[arg(long)]
    dry_run: bool,

    /// Also pick up records ending this many days ahead.
    #[arg(long)]
    lead_days: Option<u32>,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let cli = Cli::parse();
  let cfg = load_config(&cli.config)?;
  init_tracing(cli.log_json || cfg.log_json);

  let store = open_store(&cfg).await?;

  match cli.command {
    Command::Serve => serve(cfg, store).await,
    Command::Renew { dry_run, lead_days } => {
      let options = RenewalOptions {
        dry_run,
        lead_days: lead_days.unwrap_or(cfg.renewal_lead_days),
      };
      let report = run_renewals(&store, store.today(), options)
        .await
        .context("renewal run failed")?;
      println!("{}", serde_json::to_string_pretty(&report)?);
      if !report.is_clean() {
        anyhow::bail!("{} record(s) failed to renew", report.errors.len());
      }
      Ok(())
    }
  }
}

async fn open_store(cfg: &ServerConfig) -> anyhow::Result<SqliteStore> {
  let zone = cfg.zone()?;
  let path = cfg.store_path();
  let store = SqliteStore::open(&path)
    .await
    .with_context(|| format!("failed to open store at {path:?}"))?
    .with_clock(Arc::new(SystemClock::new(zone)));
  Ok(store)
}

async fn serve(cfg: ServerConfig, store: SqliteStore) -> anyhow::Result<()> {
  let store = Arc::new(store);
  if let Some(every) = cfg.renewal_interval() {
    spawn_renewal_loop(store.clone(), every, cfg.renewal_lead_days);
  }

  let app = router(store);
  let address = cfg.address();

  info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}
