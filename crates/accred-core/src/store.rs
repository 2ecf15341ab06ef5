//! The store contract: a transactional handle plus the async entry point
//! that scopes it.
//!
//! Storage backends (e.g. `accred-store-sqlite`) implement both traits. The
//! lifecycle state machine is written against [`StoreTx`] only, so every
//! read, decision and write it performs lands in one transaction.

use std::{fmt, future::Future};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Result,
  identity::{PersonData, PersonIdentity},
  record::{AccreditationPeriod, AccreditationStatus, AuditEntry, PendingCandidate, PersonRecord},
};

// ─── Keys and query rows ─────────────────────────────────────────────────────

/// How a caller names a person: by surrogate id (admin surfaces) or by
/// natural key (spreadsheets).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonKey {
  Id(Uuid),
  Identity(PersonIdentity),
}

impl fmt::Display for PersonKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Id(id) => write!(f, "{id}"),
      Self::Identity(identity) => write!(f, "{identity}"),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
  Person,
  Candidate,
}

/// One search result, from either the person records or the holding pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRow {
  pub source:     RecordSource,
  /// `person_id` or `candidate_id` depending on `source`.
  pub id:         Uuid,
  #[serde(flatten)]
  pub data:       PersonData,
  pub status:     Option<AccreditationStatus>,
  pub period:     Option<AccreditationPeriod>,
  pub created_at: DateTime<Utc>,
}

// ─── Transaction handle ──────────────────────────────────────────────────────

/// Synchronous operations available inside one store transaction.
///
/// Identity lookups treat an absent middle name and an empty one as equal and
/// return the most recently created match.
pub trait StoreTx {
  // ── Person records ────────────────────────────────────────────────────

  fn find_person(&mut self, identity: &PersonIdentity) -> Result<Option<PersonRecord>>;

  fn get_person(&mut self, person_id: Uuid) -> Result<Option<PersonRecord>>;

  fn insert_person(&mut self, person: &PersonRecord) -> Result<()>;

  fn update_person_status(&mut self, person_id: Uuid, status: AccreditationStatus) -> Result<()>;

  fn update_person_notes(&mut self, person_id: Uuid, notes: Option<&str>) -> Result<()>;

  fn delete_person(&mut self, person_id: Uuid) -> Result<()>;

  fn persons_with_status(&mut self, status: AccreditationStatus) -> Result<Vec<PersonRecord>>;

  // ── Periods ───────────────────────────────────────────────────────────

  /// The authoritative (most recently created) period, if any.
  fn latest_period(&mut self, person_id: Uuid) -> Result<Option<AccreditationPeriod>>;

  /// Insert the period, or overwrite it if `period_id` already exists.
  fn upsert_period(&mut self, period: &AccreditationPeriod) -> Result<()>;

  fn delete_periods(&mut self, person_id: Uuid) -> Result<()>;

  // ── Holding pool ──────────────────────────────────────────────────────

  fn find_candidate(&mut self, identity: &PersonIdentity) -> Result<Option<PendingCandidate>>;

  fn get_candidate(&mut self, candidate_id: Uuid) -> Result<Option<PendingCandidate>>;

  fn insert_candidate(&mut self, candidate: &PendingCandidate) -> Result<()>;

  fn delete_candidate(&mut self, candidate_id: Uuid) -> Result<()>;

  /// All candidates, oldest intake first.
  fn list_candidates(&mut self) -> Result<Vec<PendingCandidate>>;

  // ── Audit and reads ───────────────────────────────────────────────────

  fn append_audit(&mut self, entry: &AuditEntry) -> Result<()>;

  /// Audit entries for a person, newest first.
  fn audit_for_person(&mut self, person_id: Uuid) -> Result<Vec<AuditEntry>>;

  /// Case-insensitive substring search over surname, name, middle name and
  /// organization, across person records and candidates.
  fn search(&mut self, text: &str, limit: usize) -> Result<Vec<SearchRow>>;
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// Abstraction over an accreditation store backend.
///
/// The only entry point is [`AccreditationStore::transact`]: the closure runs
/// against a [`StoreTx`] and either commits as a whole (on `Ok`) or rolls back
/// as a whole (on `Err`). Backends serialize transactions, so a
/// read-decide-write sequence inside one closure is atomic with respect to
/// every other caller.
pub trait AccreditationStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn transact<T, F>(&self, f: F) -> impl Future<Output = Result<T, Self::Error>> + Send + '_
  where
    T: Send + 'static,
    F: FnOnce(&mut dyn StoreTx) -> Result<T> + Send + 'static;
}
