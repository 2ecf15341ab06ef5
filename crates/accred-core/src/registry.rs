//! [`Registry`]: the async service that runs lifecycle transitions against a
//! store, one transaction per person.
//!
//! This is what the API, the CLI and the scheduler talk to. The periodic entry
//! points ([`Registry::run_expiry_sweep`], [`Registry::run_weekly_promotion`])
//! take no arguments and are safe to call repeatedly.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  category::{Category, CategoryRule},
  clock::{Clock, SystemClock},
  identity::PersonData,
  lifecycle::{
    self, BlacklistOutcome, CandidatePromotion, Policy, PromotionOutcome, QueueOutcome,
    Registration, RegistrationOutcome,
  },
  record::{AccreditationStatus, AuditEntry, PersonRecord},
  status::DerivedStatus,
  store::{AccreditationStore, PersonKey, SearchRow},
};

// ─── Reports ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedItem {
  pub id:     Uuid,
  pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepReport {
  pub expired: Vec<Uuid>,
  pub failed:  Vec<FailedItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeeklyPromotionReport {
  /// Person ids created from the holding pool.
  pub promoted: Vec<Uuid>,
  /// Candidate ids dropped because the identity was already registered.
  pub skipped:  Vec<Uuid>,
  pub failed:   Vec<FailedItem>,
}

/// A search row with its derived status attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonSummary {
  #[serde(flatten)]
  pub row:       SearchRow,
  pub derived:   DerivedStatus,
  pub category:  Category,
  pub has_notes: bool,
}

// ─── Registry ────────────────────────────────────────────────────────────────

pub struct Registry<S> {
  store:      Arc<S>,
  clock:      Arc<dyn Clock>,
  policy:     Policy,
  categories: CategoryRule,
}

impl<S> Clone for Registry<S> {
  fn clone(&self) -> Self {
    Self {
      store:      Arc::clone(&self.store),
      clock:      Arc::clone(&self.clock),
      policy:     self.policy,
      categories: self.categories.clone(),
    }
  }
}

impl<S: AccreditationStore> Registry<S> {
  pub fn new(store: Arc<S>) -> Self {
    Self {
      store,
      clock: Arc::new(SystemClock),
      policy: Policy::default(),
      categories: CategoryRule::default(),
    }
  }

  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn with_policy(mut self, policy: Policy) -> Self {
    self.policy = policy;
    self
  }

  pub fn with_categories(mut self, categories: CategoryRule) -> Self {
    self.categories = categories;
    self
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn categories(&self) -> &CategoryRule { &self.categories }

  pub fn now(&self) -> DateTime<Utc> { self.clock.now() }

  // ── Transitions ───────────────────────────────────────────────────────

  pub async fn promote(
    &self,
    key: PersonKey,
    effective: Option<DateTime<Utc>>,
  ) -> Result<PromotionOutcome, S::Error> {
    let now = self.now();
    let policy = self.policy;
    let outcome = self
      .store
      .transact(move |tx| lifecycle::promote(tx, &key, effective, now, policy))
      .await?;
    match &outcome {
      PromotionOutcome::Activated { person_id, .. } => {
        tracing::info!(person_id = %person_id, "person accredited");
      }
      PromotionOutcome::Unchanged { person_id, status } => {
        tracing::debug!(person_id = %person_id, %status, "promotion not required");
      }
      PromotionOutcome::NotFound => {}
    }
    Ok(outcome)
  }

  pub async fn toggle_blacklist(&self, data: PersonData) -> Result<BlacklistOutcome, S::Error> {
    let now = self.now();
    let outcome = self
      .store
      .transact(move |tx| lifecycle::toggle_blacklist(tx, &data, now))
      .await?;
    tracing::info!(?outcome, "blacklist toggled");
    Ok(outcome)
  }

  pub async fn register(
    &self,
    data: PersonData,
    registration: Registration,
  ) -> Result<RegistrationOutcome, S::Error> {
    let now = self.now();
    let policy = self.policy;
    self
      .store
      .transact(move |tx| lifecycle::register(tx, &data, registration, now, policy))
      .await
  }

  pub async fn queue_candidate(
    &self,
    data: PersonData,
    review_note: &'static str,
  ) -> Result<QueueOutcome, S::Error> {
    let now = self.now();
    self
      .store
      .transact(move |tx| lifecycle::queue_candidate(tx, &data, review_note, now))
      .await
  }

  pub async fn update_notes(&self, person_id: Uuid, notes: Option<String>) -> Result<(), S::Error> {
    let now = self.now();
    self
      .store
      .transact(move |tx| lifecycle::update_notes(tx, person_id, notes.as_deref(), now))
      .await
  }

  // ── Periodic entry points ─────────────────────────────────────────────

  /// Expire every accredited person whose window has closed. Each person is
  /// handled in its own transaction; one failure does not stop the sweep.
  pub async fn run_expiry_sweep(&self) -> Result<SweepReport, S::Error> {
    let now = self.now();
    let accredited = self
      .store
      .transact(|tx| tx.persons_with_status(AccreditationStatus::Accredited))
      .await?;

    let mut report = SweepReport::default();
    for person in accredited {
      let person_id = person.person_id;
      match self
        .store
        .transact(move |tx| lifecycle::expire(tx, person_id, now))
        .await
      {
        Ok(true) => report.expired.push(person_id),
        Ok(false) => {}
        Err(e) => {
          tracing::error!(person_id = %person_id, error = %e, "expiry failed");
          report.failed.push(FailedItem {
            id:     person_id,
            reason: e.to_string(),
          });
        }
      }
    }

    tracing::info!(
      expired = report.expired.len(),
      failed = report.failed.len(),
      "expiry sweep finished"
    );
    Ok(report)
  }

  /// Move the whole holding pool into pending person records.
  pub async fn run_weekly_promotion(&self) -> Result<WeeklyPromotionReport, S::Error> {
    let now = self.now();
    let candidates = self.store.transact(|tx| tx.list_candidates()).await?;

    let mut report = WeeklyPromotionReport::default();
    for candidate in candidates {
      let candidate_id = candidate.candidate_id;
      match self
        .store
        .transact(move |tx| lifecycle::promote_candidate(tx, candidate_id, now))
        .await
      {
        Ok(CandidatePromotion::Promoted { person_id }) => report.promoted.push(person_id),
        Ok(CandidatePromotion::AlreadyRegistered { person_id }) => {
          tracing::debug!(
            candidate_id = %candidate_id,
            person_id = %person_id,
            "candidate already registered, dropped from pool"
          );
          report.skipped.push(candidate_id);
        }
        Err(e) => {
          tracing::error!(candidate_id = %candidate_id, error = %e, "weekly promotion failed");
          report.failed.push(FailedItem {
            id:     candidate_id,
            reason: e.to_string(),
          });
        }
      }
    }

    tracing::info!(
      promoted = report.promoted.len(),
      skipped = report.skipped.len(),
      failed = report.failed.len(),
      "weekly promotion finished"
    );
    Ok(report)
  }

  // ── Reads ─────────────────────────────────────────────────────────────

  pub async fn search(&self, text: String, limit: usize) -> Result<Vec<PersonSummary>, S::Error> {
    let now = self.now();
    let rows = self.store.transact(move |tx| tx.search(&text, limit)).await?;
    Ok(
      rows
        .into_iter()
        .map(|row| PersonSummary {
          derived: DerivedStatus::derive(row.period.as_ref(), now),
          category: self.categories.categorize(row.data.organization.as_deref()),
          has_notes: row.data.notes.as_deref().is_some_and(|n| !n.is_empty()),
          row,
        })
        .collect(),
    )
  }

  /// Audit history for a person, newest first.
  pub async fn history(&self, person_id: Uuid) -> Result<Vec<AuditEntry>, S::Error> {
    self
      .store
      .transact(move |tx| tx.audit_for_person(person_id))
      .await
  }

  /// Pending person records awaiting a recheck, optionally limited to one
  /// category.
  pub async fn pending_review(
    &self,
    category: Option<Category>,
  ) -> Result<Vec<PersonRecord>, S::Error> {
    let pending = self
      .store
      .transact(|tx| tx.persons_with_status(AccreditationStatus::Pending))
      .await?;
    Ok(
      pending
        .into_iter()
        .filter(|p| {
          category.is_none_or(|c| self.categories.categorize(p.data.organization.as_deref()) == c)
        })
        .collect(),
    )
  }
}
