//! Derived accreditation status.
//!
//! The status a person actually holds is computed at query time from their
//! latest [`AccreditationPeriod`] and the current instant. The stored
//! workflow status is never consulted here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

use crate::record::AccreditationPeriod;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DerivedStatus {
  Blacklisted,
  Active,
  Expired,
  /// No period, or a period with no decision recorded yet.
  NotFound,
}

impl DerivedStatus {
  /// Derive the status of a person from their latest period.
  ///
  /// Priority: blacklist, then an end in the future, then an end that has
  /// passed. An end equal to `now` counts as expired.
  pub fn derive(period: Option<&AccreditationPeriod>, now: DateTime<Utc>) -> Self {
    match period {
      Some(p) => Self::from_parts(p.blacklisted, p.end, now),
      None => Self::NotFound,
    }
  }

  pub fn from_parts(blacklisted: bool, end: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
    if blacklisted {
      return Self::Blacklisted;
    }
    match end {
      Some(end) if end > now => Self::Active,
      Some(_) => Self::Expired,
      None => Self::NotFound,
    }
  }

  pub fn is_active(&self) -> bool { matches!(self, Self::Active) }
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone};
  use uuid::Uuid;

  use super::*;

  fn now() -> DateTime<Utc> { Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap() }

  fn period(blacklisted: bool, end: Option<DateTime<Utc>>) -> AccreditationPeriod {
    AccreditationPeriod {
      end,
      blacklisted,
      ..AccreditationPeriod::open(Uuid::new_v4(), now())
    }
  }

  #[test]
  fn missing_period_is_not_found() {
    assert_eq!(DerivedStatus::derive(None, now()), DerivedStatus::NotFound);
  }

  #[test]
  fn blacklist_overrides_active_end() {
    let p = period(true, Some(now() + Duration::days(30)));
    assert_eq!(DerivedStatus::derive(Some(&p), now()), DerivedStatus::Blacklisted);
  }

  #[test]
  fn future_end_is_active() {
    let p = period(false, Some(now() + Duration::seconds(1)));
    assert_eq!(DerivedStatus::derive(Some(&p), now()), DerivedStatus::Active);
  }

  #[test]
  fn end_equal_to_now_is_expired() {
    let p = period(false, Some(now()));
    assert_eq!(DerivedStatus::derive(Some(&p), now()), DerivedStatus::Expired);
  }

  #[test]
  fn past_end_is_expired() {
    let p = period(false, Some(now() - Duration::days(1)));
    assert_eq!(DerivedStatus::derive(Some(&p), now()), DerivedStatus::Expired);
  }

  #[test]
  fn undecided_period_is_not_found() {
    let p = period(false, None);
    assert_eq!(DerivedStatus::derive(Some(&p), now()), DerivedStatus::NotFound);
  }
}
