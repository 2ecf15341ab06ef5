//! Runtime settings: an optional TOML file overlaid by `ACCRED_*` variables.
//!
//! Nested keys use a double underscore, e.g. `ACCRED_INTAKE__WORKERS=4`.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use accred_core::{
  category::{CategoryRule, DEFAULT_CIVIL_CONTRACT_MARKER},
  lifecycle::{DEFAULT_VALIDITY_DAYS, Policy},
};
use accred_intake::{
  pipeline::IntakeConfig,
  validate::{
    DEFAULT_IDENTICAL_THRESHOLD, DEFAULT_MIN_BIRTH_YEAR, DEFAULT_SEQUENTIAL_THRESHOLD,
    ValidationConfig,
  },
};
use anyhow::Context as _;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub store_path:           PathBuf,
  pub host:                 String,
  pub port:                 u16,
  /// Seconds between expiry sweeps while serving. `0` turns the sweep off.
  pub expiry_interval_secs: u64,
  pub lifecycle:            LifecycleSettings,
  pub intake:               IntakeSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LifecycleSettings {
  pub validity_days:   i64,
  pub category_marker: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IntakeSettings {
  pub sequential_threshold: usize,
  pub identical_threshold:  usize,
  /// `0` turns the check off.
  pub min_birth_year:       i32,
  pub review_timeout_secs:  u64,
  pub workers:              usize,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      store_path:           PathBuf::from("accred.db"),
      host:                 "127.0.0.1".to_string(),
      port:                 8080,
      expiry_interval_secs: 3600,
      lifecycle:            LifecycleSettings::default(),
      intake:               IntakeSettings::default(),
    }
  }
}

impl Default for LifecycleSettings {
  fn default() -> Self {
    Self {
      validity_days:   DEFAULT_VALIDITY_DAYS,
      category_marker: DEFAULT_CIVIL_CONTRACT_MARKER.to_string(),
    }
  }
}

impl Default for IntakeSettings {
  fn default() -> Self {
    Self {
      sequential_threshold: DEFAULT_SEQUENTIAL_THRESHOLD,
      identical_threshold:  DEFAULT_IDENTICAL_THRESHOLD,
      min_birth_year:       DEFAULT_MIN_BIRTH_YEAR,
      review_timeout_secs:  300,
      workers:              0,
    }
  }
}

impl Settings {
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("ACCRED")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()
      .context("failed to read configuration")?
      .try_deserialize()
      .context("failed to deserialise Settings")
  }

  pub fn policy(&self) -> Policy { Policy::with_validity_days(self.lifecycle.validity_days) }

  pub fn categories(&self) -> CategoryRule { CategoryRule::new(&self.lifecycle.category_marker) }

  pub fn review_timeout(&self) -> Duration { Duration::from_secs(self.intake.review_timeout_secs) }

  pub fn intake_config(&self) -> IntakeConfig {
    let intake = &self.intake;
    IntakeConfig {
      validation: ValidationConfig {
        sequential_threshold: intake.sequential_threshold,
        identical_threshold: intake.identical_threshold,
        min_birth_year: (intake.min_birth_year > 0).then_some(intake.min_birth_year),
        ..ValidationConfig::default()
      },
      workers:    intake.workers,
    }
  }
}
