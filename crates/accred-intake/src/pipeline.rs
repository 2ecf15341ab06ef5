//! The intake batch: normalize, validate, confirm, match, classify, queue.
//!
//! Normalization and per-row checks run on blocking worker threads over
//! contiguous shards. Everything after the date scan runs row by row, in
//! input order, because duplicate detection and the reviewer are sequential.
//! A failure inside one row is recorded on that row and the batch moves on.

use std::{collections::BTreeMap, num::NonZeroUsize, sync::Arc};

use accred_core::{
  identity::PersonIdentity,
  lifecycle::{NOTE_FROM_INTAKE, QueueOutcome},
  registry::Registry,
  status::DerivedStatus,
  store::AccreditationStore,
};
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{
  Result,
  cancel::CancelToken,
  classify::{self, Bucket},
  matcher::{BatchDeduplicator, MatchKind, StoreMatch, match_in_store},
  normalize::{NormalizedRow, normalize_row},
  review::{ConfirmationDecision, ConfirmationPrompt, Reviewer},
  tabular::{Column, RawRow},
  validate::{Problem, ValidationConfig, Verdict, check_row, scan_dates, verdict},
};

// ─── Config ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
  pub validation: ValidationConfig,
  /// Normalization shards. `0` uses the available parallelism.
  pub workers:    usize,
}

impl IntakeConfig {
  fn worker_count(&self) -> usize {
    match self.workers {
      0 => std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
      n => n,
    }
  }
}

// ─── Report ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "disposition", rename_all = "snake_case")]
pub enum Disposition {
  /// Failed validation, or the reviewer said no.
  Rejected { bucket: Bucket },
  /// Suspicious and nobody answered in time.
  Unconfirmed { bucket: Bucket },
  DuplicateInBatch { first: usize },
  Failed { reason: String },
  Classified {
    matched:      MatchKind,
    person_id:    Option<Uuid>,
    candidate_id: Option<Uuid>,
    status:       DerivedStatus,
    bucket:       Bucket,
    /// Whether this row added a candidate to the holding pool.
    queued:       bool,
  },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowOutcome {
  pub index:       usize,
  pub identity:    Option<PersonIdentity>,
  pub problems:    Vec<Problem>,
  pub disposition: Disposition,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeStats {
  pub total:      usize,
  pub passed:     usize,
  pub rejected:   usize,
  /// Rows that went to the reviewer.
  pub suspicious: usize,
  pub duplicates: usize,
  pub queued:     usize,
  pub failed:     usize,
  /// Row count per bucket label.
  pub buckets:    BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntakeReport {
  pub rows:      Vec<RowOutcome>,
  pub stats:     IntakeStats,
  /// The batch stopped early; `rows` covers only what was processed.
  pub cancelled: bool,
}

impl IntakeReport {
  fn record(&mut self, outcome: RowOutcome, asked: bool) {
    let stats = &mut self.stats;
    stats.total += 1;
    if asked {
      stats.suspicious += 1;
    }
    match &outcome.disposition {
      Disposition::Rejected { bucket } | Disposition::Unconfirmed { bucket } => {
        stats.rejected += 1;
        *stats.buckets.entry(bucket.label()).or_default() += 1;
      }
      Disposition::DuplicateInBatch { .. } => stats.duplicates += 1,
      Disposition::Failed { .. } => stats.failed += 1,
      Disposition::Classified { bucket, queued, .. } => {
        stats.passed += 1;
        if *queued {
          stats.queued += 1;
        }
        *stats.buckets.entry(bucket.label()).or_default() += 1;
      }
    }
    self.rows.push(outcome);
  }
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

pub struct IntakePipeline<S, R> {
  registry: Registry<S>,
  reviewer: Arc<R>,
  config:   IntakeConfig,
}

impl<S, R> IntakePipeline<S, R>
where
  S: AccreditationStore + 'static,
  R: Reviewer + 'static,
{
  pub fn new(registry: Registry<S>, reviewer: Arc<R>, config: IntakeConfig) -> Self {
    Self {
      registry,
      reviewer,
      config,
    }
  }

  /// Run the batch on its own task.
  pub fn spawn(self, rows: Vec<RawRow>, cancel: CancelToken) -> JoinHandle<Result<IntakeReport>> {
    tokio::spawn(async move { self.run(rows, &cancel).await })
  }

  pub async fn run(&self, rows: Vec<RawRow>, cancel: &CancelToken) -> Result<IntakeReport> {
    tracing::info!(rows = rows.len(), "intake started");
    let prepared = self.prepare(rows).await?;

    let mut report = IntakeReport::default();
    let mut dedup = BatchDeduplicator::new();
    for (row, problems) in prepared {
      if cancel.is_cancelled() {
        tracing::warn!(processed = report.rows.len(), "intake cancelled");
        report.cancelled = true;
        break;
      }
      let (outcome, asked) = self.process(row, problems, &mut dedup).await;
      report.record(outcome, asked);
    }

    let stats = &report.stats;
    tracing::info!(
      total = stats.total,
      passed = stats.passed,
      rejected = stats.rejected,
      suspicious = stats.suspicious,
      duplicates = stats.duplicates,
      queued = stats.queued,
      failed = stats.failed,
      "intake finished"
    );
    Ok(report)
  }

  // ── Stages ────────────────────────────────────────────────────────────

  /// Normalize and check every row, then run the order-dependent date scan.
  async fn prepare(&self, rows: Vec<RawRow>) -> Result<Vec<(NormalizedRow, Vec<Problem>)>> {
    let max_year = self.registry.now().year() + 1;
    let validation = Arc::new(self.config.validation.clone());
    let shard_len = rows.len().div_ceil(self.config.worker_count()).max(1);

    let mut shards = Vec::new();
    let mut rest = rows;
    while !rest.is_empty() {
      let tail = rest.split_off(shard_len.min(rest.len()));
      shards.push(std::mem::replace(&mut rest, tail));
    }

    let handles: Vec<_> = shards
      .into_iter()
      .map(|shard| {
        let validation = Arc::clone(&validation);
        tokio::task::spawn_blocking(move || {
          shard
            .iter()
            .map(|raw| {
              let row = normalize_row(raw, max_year);
              let problems = check_row(raw, &row, &validation);
              (row, problems)
            })
            .collect::<Vec<_>>()
        })
      })
      .collect();

    let mut prepared = Vec::new();
    for handle in handles {
      prepared.extend(handle.await?);
    }

    let normalized: Vec<NormalizedRow> = prepared.iter().map(|(row, _)| row.clone()).collect();
    let date_problems = scan_dates(&normalized, &validation);
    for ((_, problems), extra) in prepared.iter_mut().zip(date_problems) {
      problems.extend(extra);
    }
    Ok(prepared)
  }

  async fn lookup(&self, identity: &PersonIdentity) -> Result<StoreMatch, S::Error> {
    let identity = identity.clone();
    self
      .registry
      .store()
      .transact(move |tx| match_in_store(tx, &identity))
      .await
  }

  /// Decide one row. The flag says whether the reviewer was consulted.
  async fn process(
    &self,
    row: NormalizedRow,
    mut problems: Vec<Problem>,
    dedup: &mut BatchDeduplicator,
  ) -> (RowOutcome, bool) {
    let index = row.index;
    let rules = self.registry.categories();
    let organization = row.organization.clone();
    let rejected_bucket = classify::rejected(organization.as_deref(), rules);

    let identity = row.identity();
    if identity.is_none() {
      for column in [Column::Surname, Column::Name, Column::BirthDate] {
        let missing = Problem::Missing { column };
        if !row.is_present(column) && !problems.contains(&missing) {
          problems.push(missing);
        }
      }
    }
    let finish = |problems: Vec<Problem>, disposition| RowOutcome {
      index,
      identity: row.identity(),
      problems,
      disposition,
    };

    let verdict = verdict(&problems);
    if verdict == Verdict::Rejected {
      tracing::warn!(row = index, problems = problems.len(), "row rejected");
      let disposition = Disposition::Rejected {
        bucket: rejected_bucket,
      };
      return (finish(problems, disposition), false);
    }
    let (Some(identity), Some(data)) = (identity, row.person_data()) else {
      // Unreachable after the key-field check, kept total.
      let disposition = Disposition::Rejected {
        bucket: rejected_bucket,
      };
      return (finish(problems, disposition), false);
    };

    if let Some(first) = dedup.check(&identity, index) {
      tracing::info!(row = index, first, "duplicate row in batch skipped");
      return (finish(problems, Disposition::DuplicateInBatch { first }), false);
    }

    let asked = verdict == Verdict::PendingConfirmation;
    if asked {
      tracing::warn!(row = index, problems = problems.len(), "row needs confirmation");
      let suggested = match self.lookup(&identity).await {
        Ok(found) => Some(classify::classify(
          organization.as_deref(),
          found.derived(self.registry.now()),
          rules,
        )),
        Err(e) => {
          tracing::warn!(row = index, error = %e, "lookup for suggestion failed");
          None
        }
      };
      let prompt = ConfirmationPrompt {
        row: row.clone(),
        problems: problems.clone(),
        suggested,
      };
      match self.reviewer.confirm(prompt).await {
        ConfirmationDecision::Confirmed => {
          tracing::info!(row = index, "row confirmed");
        }
        ConfirmationDecision::Rejected => {
          tracing::warn!(row = index, "row rejected by reviewer");
          let disposition = Disposition::Rejected {
            bucket: rejected_bucket,
          };
          return (finish(problems, disposition), true);
        }
        ConfirmationDecision::Unconfirmed => {
          tracing::warn!(row = index, "row rejected: unconfirmed");
          let disposition = Disposition::Unconfirmed {
            bucket: rejected_bucket,
          };
          return (finish(problems, disposition), true);
        }
      }
    }

    let found = match self.lookup(&identity).await {
      Ok(found) => found,
      Err(e) => {
        tracing::error!(row = index, error = %e, "identity lookup failed");
        let disposition = Disposition::Failed {
          reason: e.to_string(),
        };
        return (finish(problems, disposition), asked);
      }
    };
    let status = found.derived(self.registry.now());
    let bucket = classify::classify(organization.as_deref(), status, rules);
    tracing::debug!(row = index, matched = %found.kind, %status, %bucket, "row classified");

    let mut candidate_id = found.candidate_id;
    let mut queued = false;
    if bucket.queues_for_promotion() && found.kind == MatchKind::New {
      match self.registry.queue_candidate(data, NOTE_FROM_INTAKE).await {
        Ok(QueueOutcome::Queued { candidate_id: id }) => {
          candidate_id = Some(id);
          queued = true;
        }
        Ok(other) => {
          tracing::debug!(row = index, outcome = ?other, "row not queued");
        }
        Err(e) => {
          tracing::error!(row = index, error = %e, "queueing failed");
          let disposition = Disposition::Failed {
            reason: e.to_string(),
          };
          return (finish(problems, disposition), asked);
        }
      }
    }

    let disposition = Disposition::Classified {
      matched: found.kind,
      person_id: found.person_id,
      candidate_id,
      status,
      bucket,
      queued,
    };
    (finish(problems, disposition), asked)
  }
}
