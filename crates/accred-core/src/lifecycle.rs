//! The accreditation state machine.
//!
//! Every transition is a plain function over a [`StoreTx`]: it reads the
//! current state, decides, writes, and appends exactly one [`AuditEntry`].
//! Callers run each function inside [`AccreditationStore::transact`], which
//! makes the whole sequence atomic. A transition requested from the wrong
//! state is not an error; it comes back as an `Unchanged` outcome.
//!
//! [`AccreditationStore::transact`]: crate::store::AccreditationStore::transact

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  identity::PersonData,
  record::{
    AccreditationPeriod, AccreditationStatus, AuditEntry, AuditOperation, PendingCandidate,
    PersonRecord,
  },
  status::DerivedStatus,
  store::{PersonKey, StoreTx},
};

/// Length of an accreditation window.
pub const DEFAULT_VALIDITY_DAYS: i64 = 180;

pub const NOTE_FROM_INTAKE: &str = "queued from intake";
pub const NOTE_FROM_ACTIVATION: &str = "queued from activation file";
pub const NOTE_RELEASED_FROM_BLACKLIST: &str = "released from blacklist";

// ─── Policy ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
  pub validity: Duration,
}

impl Policy {
  pub fn with_validity_days(days: i64) -> Self { Self { validity: Duration::days(days) } }
}

impl Default for Policy {
  fn default() -> Self { Self::with_validity_days(DEFAULT_VALIDITY_DAYS) }
}

// ─── Outcomes ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PromotionOutcome {
  Activated {
    person_id: Uuid,
    period:    AccreditationPeriod,
  },
  /// The person was not pending; nothing was written.
  Unchanged {
    person_id: Uuid,
    status:    AccreditationStatus,
  },
  NotFound,
}

impl PromotionOutcome {
  pub fn message(&self) -> String {
    match self {
      Self::Activated { period, .. } => match period.end {
        Some(end) => format!("activated until {}", end.date_naive()),
        None => "activated".into(),
      },
      Self::Unchanged { status, .. } => format!("activation not required: status is {status}"),
      Self::NotFound => "person not found".into(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BlacklistOutcome {
  /// Unknown identity entered straight into the blacklist.
  Created { person_id: Uuid },
  Blacklisted {
    person_id: Uuid,
    previous:  AccreditationStatus,
  },
  /// Flag lifted over a still-valid window.
  Restored { person_id: Uuid },
  /// Flag lifted with nothing underneath: the person went back to the pool.
  Demoted {
    former_person_id: Uuid,
    candidate_id:     Uuid,
  },
}

/// How a previously unknown person enters the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
  Pending,
  Active { start: DateTime<Utc> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RegistrationOutcome {
  Registered { person_id: Uuid },
  AlreadyRegistered { person_id: Uuid },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum QueueOutcome {
  Queued { candidate_id: Uuid },
  AlreadyQueued { candidate_id: Uuid },
  AlreadyRegistered { person_id: Uuid },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CandidatePromotion {
  Promoted { person_id: Uuid },
  /// The identity already had a person record; the candidate was dropped.
  AlreadyRegistered { person_id: Uuid },
}

// ─── Transitions ─────────────────────────────────────────────────────────────

fn resolve(tx: &mut dyn StoreTx, key: &PersonKey) -> Result<Option<PersonRecord>> {
  match key {
    PersonKey::Id(id) => tx.get_person(*id),
    PersonKey::Identity(identity) => tx.find_person(identity),
  }
}

/// pending → accredited. Opens a window of `policy.validity` starting at
/// `effective` (or `now`).
pub fn promote(
  tx: &mut dyn StoreTx,
  key: &PersonKey,
  effective: Option<DateTime<Utc>>,
  now: DateTime<Utc>,
  policy: Policy,
) -> Result<PromotionOutcome> {
  let Some(person) = resolve(tx, key)? else {
    return Ok(PromotionOutcome::NotFound);
  };
  let person_id = person.person_id;
  if person.status != AccreditationStatus::Pending {
    return Ok(PromotionOutcome::Unchanged {
      person_id,
      status: person.status,
    });
  }

  let start = effective.unwrap_or(now);
  let mut period = tx
    .latest_period(person_id)?
    .unwrap_or_else(|| AccreditationPeriod::open(person_id, now));
  period.start = Some(start);
  period.end = Some(start + policy.validity);
  period.blacklisted = false;
  period.last_checked = Some(now);

  tx.upsert_period(&period)?;
  tx.update_person_status(person_id, AccreditationStatus::Accredited)?;
  tx.append_audit(&AuditEntry::new(
    Some(person_id),
    AuditOperation::Activated,
    format!(
      "pending -> accredited, window {} .. {}",
      start.date_naive(),
      (start + policy.validity).date_naive()
    ),
    now,
  ))?;

  Ok(PromotionOutcome::Activated { person_id, period })
}

/// accredited → expired, when the latest period derives to `Expired`.
/// The period itself is left untouched. Returns whether anything changed.
pub fn expire(tx: &mut dyn StoreTx, person_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
  let Some(person) = tx.get_person(person_id)? else {
    return Ok(false);
  };
  if person.status != AccreditationStatus::Accredited {
    return Ok(false);
  }
  let period = tx.latest_period(person_id)?;
  if DerivedStatus::derive(period.as_ref(), now) != DerivedStatus::Expired {
    return Ok(false);
  }

  tx.update_person_status(person_id, AccreditationStatus::Expired)?;
  let ended = period
    .and_then(|p| p.end)
    .map(|end| end.date_naive().to_string())
    .unwrap_or_default();
  tx.append_audit(&AuditEntry::new(
    Some(person_id),
    AuditOperation::Expired,
    format!("accredited -> expired, window ended {ended}"),
    now,
  ))?;
  Ok(true)
}

/// Flip the blacklist flag for the identity in `data`.
///
/// Lifting the flag from a person with no still-valid window demotes them:
/// their record and periods are deleted and a holding-pool candidate built
/// from the record takes their place.
pub fn toggle_blacklist(
  tx: &mut dyn StoreTx,
  data: &PersonData,
  now: DateTime<Utc>,
) -> Result<BlacklistOutcome> {
  let Some(person) = tx.find_person(&data.identity)? else {
    return blacklist_unknown(tx, data, now);
  };

  let period = tx.latest_period(person.person_id)?;
  match period {
    Some(period) if period.blacklisted => lift_blacklist(tx, person, period, now),
    period => blacklist_existing(tx, person, period, now),
  }
}

fn blacklist_unknown(
  tx: &mut dyn StoreTx,
  data: &PersonData,
  now: DateTime<Utc>,
) -> Result<BlacklistOutcome> {
  let person = PersonRecord::new(data.clone(), AccreditationStatus::Rejected, now);
  let person_id = person.person_id;
  tx.insert_person(&person)?;

  let period = AccreditationPeriod {
    blacklisted: true,
    ..AccreditationPeriod::open(person_id, now)
  };
  tx.upsert_period(&period)?;

  if let Some(candidate) = tx.find_candidate(&data.identity)? {
    tx.delete_candidate(candidate.candidate_id)?;
  }

  tx.append_audit(&AuditEntry::new(
    Some(person_id),
    AuditOperation::Blacklisted,
    "new person entered directly as rejected",
    now,
  ))?;
  Ok(BlacklistOutcome::Created { person_id })
}

fn blacklist_existing(
  tx: &mut dyn StoreTx,
  person: PersonRecord,
  period: Option<AccreditationPeriod>,
  now: DateTime<Utc>,
) -> Result<BlacklistOutcome> {
  let person_id = person.person_id;
  let mut period = period.unwrap_or_else(|| AccreditationPeriod::open(person_id, now));
  period.blacklisted = true;
  period.last_checked = Some(now);
  tx.upsert_period(&period)?;
  tx.update_person_status(person_id, AccreditationStatus::Rejected)?;
  tx.append_audit(&AuditEntry::new(
    Some(person_id),
    AuditOperation::Blacklisted,
    format!("{} -> rejected", person.status),
    now,
  ))?;
  Ok(BlacklistOutcome::Blacklisted {
    person_id,
    previous: person.status,
  })
}

fn lift_blacklist(
  tx: &mut dyn StoreTx,
  person: PersonRecord,
  mut period: AccreditationPeriod,
  now: DateTime<Utc>,
) -> Result<BlacklistOutcome> {
  let person_id = person.person_id;

  if period.end.is_some_and(|end| end > now) {
    period.blacklisted = false;
    period.last_checked = Some(now);
    tx.upsert_period(&period)?;
    tx.update_person_status(person_id, AccreditationStatus::Accredited)?;
    tx.append_audit(&AuditEntry::new(
      Some(person_id),
      AuditOperation::Unblacklisted,
      format!("{} -> accredited, window still valid", person.status),
      now,
    ))?;
    return Ok(BlacklistOutcome::Restored { person_id });
  }

  let candidate = PendingCandidate::new(person.data, NOTE_RELEASED_FROM_BLACKLIST, now);
  let candidate_id = candidate.candidate_id;
  tx.insert_candidate(&candidate)?;
  tx.delete_periods(person_id)?;
  tx.delete_person(person_id)?;
  tx.append_audit(&AuditEntry::new(
    Some(person_id),
    AuditOperation::Demoted,
    format!(
      "{} -> holding pool as candidate {candidate_id}, no valid window",
      person.status
    ),
    now,
  ))?;
  Ok(BlacklistOutcome::Demoted {
    former_person_id: person_id,
    candidate_id,
  })
}

/// Insert a person record for a previously unknown identity.
pub fn register(
  tx: &mut dyn StoreTx,
  data: &PersonData,
  registration: Registration,
  now: DateTime<Utc>,
  policy: Policy,
) -> Result<RegistrationOutcome> {
  if let Some(existing) = tx.find_person(&data.identity)? {
    return Ok(RegistrationOutcome::AlreadyRegistered {
      person_id: existing.person_id,
    });
  }

  let (status, details) = match registration {
    Registration::Pending => (AccreditationStatus::Pending, "registered as pending".to_owned()),
    Registration::Active { start } => (
      AccreditationStatus::Accredited,
      format!(
        "registered as accredited, window {} .. {}",
        start.date_naive(),
        (start + policy.validity).date_naive()
      ),
    ),
  };

  let person = PersonRecord::new(data.clone(), status, now);
  let person_id = person.person_id;
  tx.insert_person(&person)?;

  if let Registration::Active { start } = registration {
    let period = AccreditationPeriod {
      start: Some(start),
      end: Some(start + policy.validity),
      ..AccreditationPeriod::open(person_id, now)
    };
    tx.upsert_period(&period)?;
  }

  tx.append_audit(&AuditEntry::new(
    Some(person_id),
    AuditOperation::Registered,
    details,
    now,
  ))?;
  Ok(RegistrationOutcome::Registered { person_id })
}

/// Put a record into the holding pool unless the identity is already known.
pub fn queue_candidate(
  tx: &mut dyn StoreTx,
  data: &PersonData,
  review_note: &str,
  now: DateTime<Utc>,
) -> Result<QueueOutcome> {
  if let Some(person) = tx.find_person(&data.identity)? {
    return Ok(QueueOutcome::AlreadyRegistered {
      person_id: person.person_id,
    });
  }
  if let Some(candidate) = tx.find_candidate(&data.identity)? {
    return Ok(QueueOutcome::AlreadyQueued {
      candidate_id: candidate.candidate_id,
    });
  }

  let candidate = PendingCandidate::new(data.clone(), review_note, now);
  tx.insert_candidate(&candidate)?;
  tx.append_audit(&AuditEntry::new(
    None,
    AuditOperation::Queued,
    format!("{} queued as candidate {}: {review_note}", data.identity, candidate.candidate_id),
    now,
  ))?;
  Ok(QueueOutcome::Queued {
    candidate_id: candidate.candidate_id,
  })
}

/// Move one candidate out of the holding pool into a pending person record.
pub fn promote_candidate(
  tx: &mut dyn StoreTx,
  candidate_id: Uuid,
  now: DateTime<Utc>,
) -> Result<CandidatePromotion> {
  let candidate = tx
    .get_candidate(candidate_id)?
    .ok_or(Error::CandidateNotFound(candidate_id))?;

  if let Some(existing) = tx.find_person(&candidate.data.identity)? {
    tx.delete_candidate(candidate_id)?;
    return Ok(CandidatePromotion::AlreadyRegistered {
      person_id: existing.person_id,
    });
  }

  let person = PersonRecord::new(candidate.data, AccreditationStatus::Pending, now);
  let person_id = person.person_id;
  tx.insert_person(&person)?;
  tx.delete_candidate(candidate_id)?;
  tx.append_audit(&AuditEntry::new(
    Some(person_id),
    AuditOperation::Promoted,
    format!("candidate {candidate_id} -> pending"),
    now,
  ))?;
  Ok(CandidatePromotion::Promoted { person_id })
}

pub fn update_notes(
  tx: &mut dyn StoreTx,
  person_id: Uuid,
  notes: Option<&str>,
  now: DateTime<Utc>,
) -> Result<()> {
  if tx.get_person(person_id)?.is_none() {
    return Err(Error::PersonNotFound(person_id));
  }
  let notes = notes.map(str::trim).filter(|n| !n.is_empty());
  tx.update_person_notes(person_id, notes)?;
  tx.append_audit(&AuditEntry::new(
    Some(person_id),
    AuditOperation::NotesUpdated,
    match notes {
      Some(_) => "notes updated",
      None => "notes cleared",
    },
    now,
  ))?;
  Ok(())
}
