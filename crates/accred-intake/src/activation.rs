//! Activation files: a list of people cleared by the reviewing service.
//!
//! Each listed pending person is promoted, with the window starting the day
//! after the row's check date when one is given. People the registry does not
//! know are put to the reviewer, who activates, queues or skips them.

use std::sync::Arc;

use accred_core::{
  lifecycle::{NOTE_FROM_ACTIVATION, PromotionOutcome, QueueOutcome, Registration, RegistrationOutcome},
  registry::Registry,
  store::{AccreditationStore, PersonKey},
};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  cancel::CancelToken,
  normalize::normalize_row,
  review::{Reviewer, UnmatchedAction, UnmatchedPrompt},
  tabular::RawRow,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ActivationResult {
  Activated { person_id: Uuid },
  /// Known, but not pending.
  Unchanged { person_id: Uuid, message: String },
  /// Unknown person registered straight into accredited.
  Registered { person_id: Uuid },
  Queued { candidate_id: Uuid },
  Skipped { reason: String },
  Failed { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationRow {
  pub index:  usize,
  pub result: ActivationResult,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivationReport {
  pub rows:       Vec<ActivationRow>,
  pub activated:  usize,
  pub unchanged:  usize,
  pub registered: usize,
  pub queued:     usize,
  pub skipped:    usize,
  pub failed:     usize,
  pub cancelled:  bool,
}

impl ActivationReport {
  fn record(&mut self, index: usize, result: ActivationResult) {
    match &result {
      ActivationResult::Activated { .. } => self.activated += 1,
      ActivationResult::Unchanged { .. } => self.unchanged += 1,
      ActivationResult::Registered { .. } => self.registered += 1,
      ActivationResult::Queued { .. } => self.queued += 1,
      ActivationResult::Skipped { .. } => self.skipped += 1,
      ActivationResult::Failed { .. } => self.failed += 1,
    }
    self.rows.push(ActivationRow { index, result });
  }
}

/// Midnight UTC of the day after `check_date`.
pub fn window_start(check_date: NaiveDate) -> Option<DateTime<Utc>> {
  let next = check_date.checked_add_signed(Duration::days(1))?;
  Some(next.and_hms_opt(0, 0, 0)?.and_utc())
}

pub async fn run_activation<S, R>(
  registry: &Registry<S>,
  reviewer: Arc<R>,
  rows: Vec<RawRow>,
  cancel: &CancelToken,
) -> ActivationReport
where
  S: AccreditationStore,
  R: Reviewer,
{
  let max_year = registry.now().year() + 1;
  let mut report = ActivationReport::default();

  for raw in rows {
    if cancel.is_cancelled() {
      tracing::warn!(processed = report.rows.len(), "activation cancelled");
      report.cancelled = true;
      break;
    }
    let row = normalize_row(&raw, max_year);
    let index = row.index;
    let Some(data) = row.person_data() else {
      tracing::warn!(row = index, "activation row lacks surname, name or birth date");
      report.record(index, ActivationResult::Skipped {
        reason: "missing surname, name or birth date".into(),
      });
      continue;
    };
    let effective = row.check_date.and_then(window_start);

    let key = PersonKey::Identity(data.identity.clone());
    let result = match registry.promote(key, effective).await {
      Ok(PromotionOutcome::Activated { person_id, .. }) => {
        ActivationResult::Activated { person_id }
      }
      Ok(outcome @ PromotionOutcome::Unchanged { person_id, .. }) => {
        ActivationResult::Unchanged {
          person_id,
          message: outcome.message(),
        }
      }
      Ok(PromotionOutcome::NotFound) => {
        let prompt = UnmatchedPrompt {
          row:  index,
          data: data.clone(),
        };
        match reviewer.resolve_unmatched(prompt).await {
          UnmatchedAction::Skip => ActivationResult::Skipped {
            reason: "unknown person".into(),
          },
          UnmatchedAction::Activate => {
            let start = effective.unwrap_or_else(|| registry.now());
            match registry.register(data, Registration::Active { start }).await {
              Ok(RegistrationOutcome::Registered { person_id }) => {
                ActivationResult::Registered { person_id }
              }
              Ok(RegistrationOutcome::AlreadyRegistered { person_id }) => {
                ActivationResult::Unchanged {
                  person_id,
                  message: "registered meanwhile".into(),
                }
              }
              Err(e) => failed(index, e),
            }
          }
          UnmatchedAction::Queue => {
            match registry.queue_candidate(data, NOTE_FROM_ACTIVATION).await {
              Ok(QueueOutcome::Queued { candidate_id })
              | Ok(QueueOutcome::AlreadyQueued { candidate_id }) => {
                ActivationResult::Queued { candidate_id }
              }
              Ok(QueueOutcome::AlreadyRegistered { person_id }) => ActivationResult::Unchanged {
                person_id,
                message: "registered meanwhile".into(),
              },
              Err(e) => failed(index, e),
            }
          }
        }
      }
      Err(e) => failed(index, e),
    };
    report.record(index, result);
  }

  tracing::info!(
    activated = report.activated,
    unchanged = report.unchanged,
    registered = report.registered,
    queued = report.queued,
    skipped = report.skipped,
    failed = report.failed,
    "activation finished"
  );
  report
}

fn failed(index: usize, error: impl std::fmt::Display) -> ActivationResult {
  tracing::error!(row = index, error = %error, "activation row failed");
  ActivationResult::Failed {
    reason: error.to_string(),
  }
}
