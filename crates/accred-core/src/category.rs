//! Operational categories derived from the organization name.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Organization marker for civil-law contract workers.
pub const DEFAULT_CIVIL_CONTRACT_MARKER: &str = "ГПХ";

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
  EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Category {
  CivilContract,
  Contractor,
}

/// Substring heuristic over the upper-cased organization name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRule {
  marker: String,
}

impl CategoryRule {
  pub fn new(marker: impl AsRef<str>) -> Self {
    Self { marker: marker.as_ref().to_uppercase() }
  }

  pub fn categorize(&self, organization: Option<&str>) -> Category {
    match organization {
      Some(org) if !self.marker.is_empty() && org.to_uppercase().contains(&self.marker) => {
        Category::CivilContract
      }
      _ => Category::Contractor,
    }
  }
}

impl Default for CategoryRule {
  fn default() -> Self { Self::new(DEFAULT_CIVIL_CONTRACT_MARKER) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn marker_is_case_insensitive() {
    let rule = CategoryRule::default();
    assert_eq!(rule.categorize(Some("ООО Ромашка (гпх)")), Category::CivilContract);
    assert_eq!(rule.categorize(Some("ГПХ Петров")), Category::CivilContract);
  }

  #[test]
  fn everything_else_is_contractor() {
    let rule = CategoryRule::default();
    assert_eq!(rule.categorize(Some("OrgA")), Category::Contractor);
    assert_eq!(rule.categorize(None), Category::Contractor);
  }
}
