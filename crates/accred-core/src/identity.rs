//! Person identity: the natural key used for every match in the system.
//!
//! No surrogate key is trusted for matching. Two records describe the same
//! individual exactly when their surname, name, middle name and birth date
//! agree, where an absent middle name and an empty one are the same thing.

use std::{
  fmt,
  hash::{Hash, Hasher},
};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Identity ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonIdentity {
  pub surname:     String,
  pub name:        String,
  pub middle_name: Option<String>,
  pub birth_date:  NaiveDate,
}

impl PersonIdentity {
  /// Build an identity, folding an empty middle name to `None`.
  pub fn new(
    surname: impl Into<String>,
    name: impl Into<String>,
    middle_name: Option<String>,
    birth_date: NaiveDate,
  ) -> Self {
    Self {
      surname: surname.into(),
      name: name.into(),
      middle_name: middle_name.filter(|m| !m.trim().is_empty()),
      birth_date,
    }
  }

  /// Like [`PersonIdentity::new`] but rejects a blank surname or name.
  pub fn try_new(
    surname: impl Into<String>,
    name: impl Into<String>,
    middle_name: Option<String>,
    birth_date: NaiveDate,
  ) -> Result<Self> {
    let identity = Self::new(surname, name, middle_name, birth_date);
    if identity.surname.trim().is_empty() {
      return Err(Error::InvalidIdentity("surname is blank".into()));
    }
    if identity.name.trim().is_empty() {
      return Err(Error::InvalidIdentity("name is blank".into()));
    }
    Ok(identity)
  }

  /// The middle name as used for matching: `""` when absent.
  pub fn middle_key(&self) -> &str { self.middle_name.as_deref().unwrap_or("") }
}

impl PartialEq for PersonIdentity {
  fn eq(&self, other: &Self) -> bool {
    self.surname == other.surname
      && self.name == other.name
      && self.middle_key() == other.middle_key()
      && self.birth_date == other.birth_date
  }
}

impl Eq for PersonIdentity {}

impl Hash for PersonIdentity {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.surname.hash(state);
    self.name.hash(state);
    self.middle_key().hash(state);
    self.birth_date.hash(state);
  }
}

impl fmt::Display for PersonIdentity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.surname, self.name)?;
    if let Some(middle) = &self.middle_name {
      write!(f, " {middle}")?;
    }
    write!(f, " ({})", self.birth_date)
  }
}

// ─── Person data ─────────────────────────────────────────────────────────────

/// Identity plus the descriptive fields every record kind carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonData {
  #[serde(flatten)]
  pub identity:             PersonIdentity,
  #[serde(default)]
  pub birth_place:          Option<String>,
  #[serde(default)]
  pub registration_address: Option<String>,
  #[serde(default)]
  pub organization:         Option<String>,
  #[serde(default)]
  pub position:             Option<String>,
  #[serde(default)]
  pub notes:                Option<String>,
}

impl PersonData {
  pub fn new(identity: PersonIdentity) -> Self {
    Self {
      identity,
      birth_place: None,
      registration_address: None,
      organization: None,
      position: None,
      notes: None,
    }
  }

  pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
    self.organization = Some(organization.into());
    self
  }
}

#[cfg(test)]
mod tests {
  use std::collections::HashSet;

  use super::*;

  fn born() -> NaiveDate { NaiveDate::from_ymd_opt(1985, 5, 1).unwrap() }

  #[test]
  fn absent_and_empty_middle_name_are_equal() {
    let absent = PersonIdentity {
      surname:     "Ivanov".into(),
      name:        "Ivan".into(),
      middle_name: None,
      birth_date:  born(),
    };
    let empty = PersonIdentity {
      middle_name: Some(String::new()),
      ..absent.clone()
    };
    assert_eq!(absent, empty);

    let mut set = HashSet::new();
    set.insert(absent);
    assert!(set.contains(&empty));
  }

  #[test]
  fn constructor_folds_blank_middle_name() {
    let id = PersonIdentity::new("Ivanov", "Ivan", Some("  ".into()), born());
    assert_eq!(id.middle_name, None);
    assert_eq!(id.middle_key(), "");
  }

  #[test]
  fn different_middle_names_differ() {
    let a = PersonIdentity::new("Ivanov", "Ivan", Some("Ivanovich".into()), born());
    let b = PersonIdentity::new("Ivanov", "Ivan", None, born());
    assert_ne!(a, b);
  }

  #[test]
  fn try_new_rejects_blank_name() {
    let err = PersonIdentity::try_new("Ivanov", " ", None, born()).unwrap_err();
    assert!(matches!(err, Error::InvalidIdentity(_)));
  }

  #[test]
  fn person_data_flattens_identity_in_json() {
    let data = PersonData::new(PersonIdentity::new("Ivanov", "Ivan", None, born()))
      .with_organization("OrgA");
    let json = serde_json::to_value(&data).unwrap();
    assert_eq!(json["surname"], "Ivanov");
    assert_eq!(json["birth_date"], "1985-05-01");
    assert_eq!(json["organization"], "OrgA");
  }
}
