//! `accred`: the accreditation registry binary.
//!
//! # Usage
//!
//! ```text
//! accred serve
//! accred ingest intake.csv
//! accred activate cleared.csv --auto-reject
//! accred expire
//! accred blacklist --surname Иванов --name Иван --birth-date 1985-05-01
//! ```
//!
//! Settings come from `accred.toml` (or `--config`) and `ACCRED_*`
//! environment variables.

mod desk;
mod settings;

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use accred_core::{
  identity::{PersonData, PersonIdentity},
  registry::Registry,
};
use accred_intake::{
  activation::run_activation,
  cancel::CancelToken,
  normalize::normalize_person,
  pipeline::{Disposition, IntakeConfig, IntakePipeline, IntakeReport},
  review::{AutoReviewer, Reviewer, review_channel},
  tabular::{ACTIVATION_COLUMNS, INTAKE_COLUMNS, read_path},
};
use accred_store_sqlite::SqliteStore;
use anyhow::Context as _;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use settings::Settings;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "accred", author, version, about = "Accreditation registry")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "accred.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the JSON API and run the periodic expiry sweep.
  Serve,
  /// Run an intake file through validation and matching.
  Ingest {
    file:   PathBuf,
    #[command(flatten)]
    review: ReviewMode,
  },
  /// Promote the people listed in an activation file.
  Activate {
    file:   PathBuf,
    #[command(flatten)]
    review: ReviewMode,
  },
  /// Expire every accreditation whose window has closed.
  Expire,
  /// Move the holding pool into pending person records.
  PromoteWeekly,
  /// Toggle the blacklist flag for a person.
  Blacklist(PersonArgs),
  /// Print the audit history of a person.
  History { person_id: Uuid },
}

#[derive(Args)]
#[group(multiple = false)]
struct ReviewMode {
  /// Accept every suspicious row; queue every unknown person.
  #[arg(long)]
  auto_confirm: bool,
  /// Reject every suspicious row; skip every unknown person.
  #[arg(long)]
  auto_reject:  bool,
}

#[derive(Args)]
struct PersonArgs {
  #[arg(long)]
  surname:      String,
  #[arg(long)]
  name:         String,
  #[arg(long)]
  middle_name:  Option<String>,
  /// `YYYY-MM-DD`
  #[arg(long)]
  birth_date:   NaiveDate,
  #[arg(long)]
  organization: Option<String>,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

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
  let settings = Settings::load(&cli.config)?;

  let store_path = expand_tilde(&settings.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  let registry = Registry::new(Arc::new(store))
    .with_policy(settings.policy())
    .with_categories(settings.categories());

  match cli.command {
    Command::Serve => serve(registry, &settings).await,
    Command::Ingest { file, review } => ingest(registry, &settings, &file, &review).await,
    Command::Activate { file, review } => activate(registry, &settings, &file, &review).await,
    Command::Expire => print_json(&registry.run_expiry_sweep().await?),
    Command::PromoteWeekly => print_json(&registry.run_weekly_promotion().await?),
    Command::Blacklist(args) => {
      let identity =
        PersonIdentity::new(args.surname, args.name, args.middle_name, args.birth_date);
      let data = normalize_person(PersonData {
        organization: args.organization,
        ..PersonData::new(identity)
      })?;
      print_json(&registry.toggle_blacklist(data).await?)
    }
    Command::History { person_id } => print_json(&registry.history(person_id).await?),
  }
}

// ─── Commands ─────────────────────────────────────────────────────────────────

async fn serve(registry: Registry<SqliteStore>, settings: &Settings) -> anyhow::Result<()> {
  if settings.expiry_interval_secs > 0 {
    let registry = registry.clone();
    let period = Duration::from_secs(settings.expiry_interval_secs);
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(period);
      loop {
        ticker.tick().await;
        if let Err(e) = registry.run_expiry_sweep().await {
          tracing::error!(error = %e, "scheduled expiry sweep failed");
        }
      }
    });
  }

  let app = accred_api::api_router(registry);
  let address = format!("{}:{}", settings.host, settings.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;
  Ok(())
}

async fn ingest(
  registry: Registry<SqliteStore>,
  settings: &Settings,
  file: &Path,
  review: &ReviewMode,
) -> anyhow::Result<()> {
  let rows =
    read_path(file, INTAKE_COLUMNS).with_context(|| format!("failed to read {file:?}"))?;
  let config = settings.intake_config();

  let report = match auto_reviewer(review) {
    Some(reviewer) => run_intake(registry, Arc::new(reviewer), config, rows).await?,
    None => {
      let (reviewer, desk) = review_channel(1, settings.review_timeout());
      desk::spawn_terminal_desk(desk);
      run_intake(registry, Arc::new(reviewer), config, rows).await?
    }
  };

  for row in &report.rows {
    match &row.disposition {
      Disposition::Classified { .. } => {}
      other => println!("row {}: {}", row.index, serde_json::to_string(other)?),
    }
  }
  print_json(&report.stats)?;
  if report.cancelled {
    println!("cancelled after {} rows", report.rows.len());
  }
  Ok(())
}

/// Run the batch on its own task.
async fn run_intake<R: Reviewer + 'static>(
  registry: Registry<SqliteStore>,
  reviewer: Arc<R>,
  config: IntakeConfig,
  rows: Vec<accred_intake::tabular::RawRow>,
) -> anyhow::Result<IntakeReport> {
  let cancel = cancel_on(tokio::signal::ctrl_c());
  let handle = IntakePipeline::new(registry, reviewer, config).spawn(rows, cancel);
  let report = handle.await.context("intake task panicked")??;
  Ok(report)
}

async fn activate(
  registry: Registry<SqliteStore>,
  settings: &Settings,
  file: &Path,
  review: &ReviewMode,
) -> anyhow::Result<()> {
  let rows =
    read_path(file, ACTIVATION_COLUMNS).with_context(|| format!("failed to read {file:?}"))?;
  let cancel = cancel_on(tokio::signal::ctrl_c());

  let report = match auto_reviewer(review) {
    Some(reviewer) => run_activation(&registry, Arc::new(reviewer), rows, &cancel).await,
    None => {
      let (reviewer, desk) = review_channel(1, settings.review_timeout());
      desk::spawn_terminal_desk(desk);
      run_activation(&registry, Arc::new(reviewer), rows, &cancel).await
    }
  };
  print_json(&report)
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn auto_reviewer(mode: &ReviewMode) -> Option<AutoReviewer> {
  if mode.auto_confirm {
    Some(AutoReviewer::accept_all())
  } else if mode.auto_reject {
    Some(AutoReviewer::reject_all())
  } else {
    None
  }
}

/// A token cancelled once `signal` resolves successfully. Batches check it
/// between rows.
fn cancel_on<F>(signal: F) -> CancelToken
where
  F: Future<Output = std::io::Result<()>> + Send + 'static,
{
  let cancel = CancelToken::new();
  let on_signal = cancel.clone();
  tokio::spawn(async move {
    if signal.await.is_ok() {
      tracing::warn!("interrupted, stopping after the current row");
      on_signal.cancel();
    }
  });
  cancel
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/") {
    if let Ok(home) = std::env::var("HOME") {
      return PathBuf::from(home).join(rest);
    }
  }
  path.to_path_buf()
}
