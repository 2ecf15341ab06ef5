//! Review buckets for processed intake rows.

use std::fmt;

use accred_core::{
  category::{Category, CategoryRule},
  status::DerivedStatus,
};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BucketKind {
  NeedsReview,
  PreviouslyCleared,
  PreviouslyRejected,
  /// Failed validation.
  Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Bucket {
  pub kind:     BucketKind,
  pub category: Category,
}

impl Bucket {
  /// Stable report label, e.g. `needs_review/civil_contract`.
  pub fn label(&self) -> String { format!("{}/{}", self.kind, self.category) }

  /// Rows in this bucket go to the holding pool when they are new.
  pub fn queues_for_promotion(&self) -> bool { self.kind == BucketKind::NeedsReview }
}

impl fmt::Display for Bucket {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.label()) }
}

pub fn classify(organization: Option<&str>, derived: DerivedStatus, rule: &CategoryRule) -> Bucket {
  let kind = match derived {
    DerivedStatus::Blacklisted => BucketKind::PreviouslyRejected,
    DerivedStatus::Active => BucketKind::PreviouslyCleared,
    DerivedStatus::Expired | DerivedStatus::NotFound => BucketKind::NeedsReview,
  };
  Bucket {
    kind,
    category: rule.categorize(organization),
  }
}

/// Bucket for a row that failed validation.
pub fn rejected(organization: Option<&str>, rule: &CategoryRule) -> Bucket {
  Bucket {
    kind:     BucketKind::Rejected,
    category: rule.categorize(organization),
  }
}
