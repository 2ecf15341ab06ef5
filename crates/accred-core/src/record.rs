//! Persisted record types: holding-pool candidates, person records,
//! accreditation periods and the audit log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::identity::PersonData;

// ─── Workflow status ─────────────────────────────────────────────────────────

/// Administrative workflow state stored on a [`PersonRecord`].
///
/// This is not the answer to "may this person enter"; that is
/// [`DerivedStatus`](crate::status::DerivedStatus), computed from the latest
/// period.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AccreditationStatus {
  Pending,
  Accredited,
  Expired,
  Rejected,
}

// ─── Holding pool ────────────────────────────────────────────────────────────

/// A normalized record waiting in the holding pool for review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingCandidate {
  pub candidate_id: Uuid,
  #[serde(flatten)]
  pub data:         PersonData,
  /// Short tag describing why the record is in the pool.
  pub review_note:  String,
  pub intake_at:    DateTime<Utc>,
}

impl PendingCandidate {
  pub fn new(data: PersonData, review_note: impl Into<String>, now: DateTime<Utc>) -> Self {
    Self {
      candidate_id: Uuid::new_v4(),
      data,
      review_note: review_note.into(),
      intake_at: now,
    }
  }
}

// ─── Person records ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonRecord {
  pub person_id:  Uuid,
  #[serde(flatten)]
  pub data:       PersonData,
  pub status:     AccreditationStatus,
  pub created_at: DateTime<Utc>,
}

impl PersonRecord {
  pub fn new(data: PersonData, status: AccreditationStatus, now: DateTime<Utc>) -> Self {
    Self {
      person_id: Uuid::new_v4(),
      data,
      status,
      created_at: now,
    }
  }
}

/// One accreditation window. The most recently created period for a person
/// is authoritative; older ones are history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccreditationPeriod {
  pub period_id:    Uuid,
  pub person_id:    Uuid,
  pub start:        Option<DateTime<Utc>>,
  pub end:          Option<DateTime<Utc>>,
  /// Overrides any active `end` when deriving status.
  pub blacklisted:  bool,
  pub last_checked: Option<DateTime<Utc>>,
  pub created_at:   DateTime<Utc>,
}

impl AccreditationPeriod {
  /// An empty period: no window, not blacklisted.
  pub fn open(person_id: Uuid, now: DateTime<Utc>) -> Self {
    Self {
      period_id: Uuid::new_v4(),
      person_id,
      start: None,
      end: None,
      blacklisted: false,
      last_checked: Some(now),
      created_at: now,
    }
  }
}

// ─── Audit log ───────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuditOperation {
  Registered,
  Queued,
  Promoted,
  Activated,
  Expired,
  Blacklisted,
  Unblacklisted,
  Demoted,
  NotesUpdated,
}

/// Append-only audit log entry. Never mutated or deleted, and it outlives the
/// person record it describes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
  pub audit_id:    Uuid,
  /// `None` for entries about holding-pool candidates.
  pub person_id:   Option<Uuid>,
  pub recorded_at: DateTime<Utc>,
  pub operation:   AuditOperation,
  pub details:     String,
}

impl AuditEntry {
  pub fn new(
    person_id: Option<Uuid>,
    operation: AuditOperation,
    details: impl Into<String>,
    now: DateTime<Utc>,
  ) -> Self {
    Self {
      audit_id: Uuid::new_v4(),
      person_id,
      recorded_at: now,
      operation,
      details: details.into(),
    }
  }
}
