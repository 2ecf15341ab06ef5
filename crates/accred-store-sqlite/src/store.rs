//! [`SqliteStore`]: the SQLite implementation of [`AccreditationStore`].

use std::{path::Path, time::Duration};

use accred_core::{
  identity::PersonIdentity,
  record::{AccreditationPeriod, AccreditationStatus, AuditEntry, PendingCandidate, PersonRecord},
  store::{AccreditationStore, SearchRow, StoreTx},
};
use rusqlite::TransactionBehavior;
use uuid::Uuid;

use crate::{Result, queries, schema::SCHEMA};

/// How long a transaction waits for another connection's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Store ───────────────────────────────────────────────────────────────────

/// An accreditation store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. Every
/// transaction runs on the connection's own thread, one at a time.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Shut the connection thread down. Dropping every clone does the same.
  pub async fn close(self) -> Result<()> {
    self.conn.close().await?;
    Ok(())
  }
}

// ─── AccreditationStore impl ─────────────────────────────────────────────────

impl AccreditationStore for SqliteStore {
  type Error = crate::Error;

  async fn transact<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&mut dyn StoreTx) -> accred_core::Result<T> + Send + 'static,
  {
    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let outcome = f(&mut SqliteTx { conn: &tx });
        match outcome {
          Ok(_) => tx.commit()?,
          Err(ref e) => {
            tracing::debug!(error = %e, "rolling back transaction");
            tx.rollback()?;
          }
        }
        Ok(outcome)
      })
      .await?;
    Ok(outcome?)
  }
}

// ─── Transaction handle ──────────────────────────────────────────────────────

struct SqliteTx<'a> {
  conn: &'a rusqlite::Connection,
}

impl StoreTx for SqliteTx<'_> {
  fn find_person(&mut self, identity: &PersonIdentity) -> accred_core::Result<Option<PersonRecord>> {
    Ok(queries::find_person(self.conn, identity)?)
  }

  fn get_person(&mut self, person_id: Uuid) -> accred_core::Result<Option<PersonRecord>> {
    Ok(queries::get_person(self.conn, person_id)?)
  }

  fn insert_person(&mut self, person: &PersonRecord) -> accred_core::Result<()> {
    Ok(queries::insert_person(self.conn, person)?)
  }

  fn update_person_status(
    &mut self,
    person_id: Uuid,
    status: AccreditationStatus,
  ) -> accred_core::Result<()> {
    Ok(queries::update_person_status(self.conn, person_id, status)?)
  }

  fn update_person_notes(&mut self, person_id: Uuid, notes: Option<&str>) -> accred_core::Result<()> {
    Ok(queries::update_person_notes(self.conn, person_id, notes)?)
  }

  fn delete_person(&mut self, person_id: Uuid) -> accred_core::Result<()> {
    Ok(queries::delete_person(self.conn, person_id)?)
  }

  fn persons_with_status(
    &mut self,
    status: AccreditationStatus,
  ) -> accred_core::Result<Vec<PersonRecord>> {
    Ok(queries::persons_with_status(self.conn, status)?)
  }

  fn latest_period(&mut self, person_id: Uuid) -> accred_core::Result<Option<AccreditationPeriod>> {
    Ok(queries::latest_period(self.conn, person_id)?)
  }

  fn upsert_period(&mut self, period: &AccreditationPeriod) -> accred_core::Result<()> {
    Ok(queries::upsert_period(self.conn, period)?)
  }

  fn delete_periods(&mut self, person_id: Uuid) -> accred_core::Result<()> {
    Ok(queries::delete_periods(self.conn, person_id)?)
  }

  fn find_candidate(
    &mut self,
    identity: &PersonIdentity,
  ) -> accred_core::Result<Option<PendingCandidate>> {
    Ok(queries::find_candidate(self.conn, identity)?)
  }

  fn get_candidate(&mut self, candidate_id: Uuid) -> accred_core::Result<Option<PendingCandidate>> {
    Ok(queries::get_candidate(self.conn, candidate_id)?)
  }

  fn insert_candidate(&mut self, candidate: &PendingCandidate) -> accred_core::Result<()> {
    Ok(queries::insert_candidate(self.conn, candidate)?)
  }

  fn delete_candidate(&mut self, candidate_id: Uuid) -> accred_core::Result<()> {
    Ok(queries::delete_candidate(self.conn, candidate_id)?)
  }

  fn list_candidates(&mut self) -> accred_core::Result<Vec<PendingCandidate>> {
    Ok(queries::list_candidates(self.conn)?)
  }

  fn append_audit(&mut self, entry: &AuditEntry) -> accred_core::Result<()> {
    Ok(queries::append_audit(self.conn, entry)?)
  }

  fn audit_for_person(&mut self, person_id: Uuid) -> accred_core::Result<Vec<AuditEntry>> {
    Ok(queries::audit_for_person(self.conn, person_id)?)
  }

  fn search(&mut self, text: &str, limit: usize) -> accred_core::Result<Vec<SearchRow>> {
    Ok(queries::search(self.conn, text, limit)?)
  }
}
