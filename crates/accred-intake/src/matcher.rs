//! Identity matching: inside the batch, then against the store.
//!
//! Matching is exact on the natural key. There is no fuzzy matching.

use std::collections::HashMap;

use accred_core::{
  identity::PersonIdentity, record::AccreditationPeriod, status::DerivedStatus, store::StoreTx,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MatchKind {
  New,
  DuplicateInBatch,
  InHoldingPool,
  InPersonRecords,
}

/// Where an identity already lives in the store, if anywhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMatch {
  pub kind:         MatchKind,
  pub person_id:    Option<Uuid>,
  pub candidate_id: Option<Uuid>,
  /// Latest period of the matched person.
  pub period:       Option<AccreditationPeriod>,
}

impl StoreMatch {
  fn new_identity() -> Self {
    Self {
      kind:         MatchKind::New,
      person_id:    None,
      candidate_id: None,
      period:       None,
    }
  }

  pub fn derived(&self, now: DateTime<Utc>) -> DerivedStatus {
    DerivedStatus::derive(self.period.as_ref(), now)
  }
}

/// Look `identity` up in the person records, then in the holding pool.
pub fn match_in_store(
  tx: &mut dyn StoreTx,
  identity: &PersonIdentity,
) -> accred_core::Result<StoreMatch> {
  if let Some(person) = tx.find_person(identity)? {
    let period = tx.latest_period(person.person_id)?;
    return Ok(StoreMatch {
      kind: MatchKind::InPersonRecords,
      person_id: Some(person.person_id),
      candidate_id: None,
      period,
    });
  }
  if let Some(candidate) = tx.find_candidate(identity)? {
    return Ok(StoreMatch {
      kind: MatchKind::InHoldingPool,
      candidate_id: Some(candidate.candidate_id),
      ..StoreMatch::new_identity()
    });
  }
  Ok(StoreMatch::new_identity())
}

/// Remembers which identities a batch has already produced.
#[derive(Debug, Default)]
pub struct BatchDeduplicator {
  seen: HashMap<PersonIdentity, usize>,
}

impl BatchDeduplicator {
  pub fn new() -> Self { Self::default() }

  /// Returns the index of the first row with this identity, or records
  /// `index` as the first and returns `None`.
  pub fn check(&mut self, identity: &PersonIdentity, index: usize) -> Option<usize> {
    match self.seen.get(identity) {
      Some(&first) => Some(first),
      None => {
        self.seen.insert(identity.clone(), index);
        None
      }
    }
  }

  pub fn len(&self) -> usize { self.seen.len() }

  pub fn is_empty(&self) -> bool { self.seen.is_empty() }
}
