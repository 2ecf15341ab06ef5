//! Per-row checks and the batch-wide date anomaly scan.
//!
//! Missing required fields are hard problems and reject the row. Everything
//! else is soft: the row needs a human to confirm it.

use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{
  normalize::NormalizedRow,
  tabular::{Column, INTAKE_COLUMNS, RawRow, RawValue},
};

pub const DEFAULT_SEQUENTIAL_THRESHOLD: usize = 2;
pub const DEFAULT_IDENTICAL_THRESHOLD: usize = 3;
pub const DEFAULT_MIN_BIRTH_YEAR: i32 = 1950;

const NAME_COLUMNS: [Column; 3] = [Column::Surname, Column::Name, Column::MiddleName];

// ─── Config ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
  pub required:             Vec<Column>,
  /// A run of consecutive dates longer than this is flagged.
  pub sequential_threshold: usize,
  /// A run of identical dates longer than this is flagged.
  pub identical_threshold:  usize,
  /// Birth years before this are flagged. `None` disables the check.
  pub min_birth_year:       Option<i32>,
}

impl Default for ValidationConfig {
  fn default() -> Self {
    Self {
      required:             INTAKE_COLUMNS.to_vec(),
      sequential_threshold: DEFAULT_SEQUENTIAL_THRESHOLD,
      identical_threshold:  DEFAULT_IDENTICAL_THRESHOLD,
      min_birth_year:       Some(DEFAULT_MIN_BIRTH_YEAR),
    }
  }
}

// ─── Problems ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "pattern", content = "char", rename_all = "snake_case")]
pub enum SuspiciousPattern {
  RepeatedWhitespace,
  RepeatedHyphen,
  WhitespaceNearHyphen,
  EdgeWhitespace,
  EdgeHyphen,
  DisallowedCharacter(char),
}

impl fmt::Display for SuspiciousPattern {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::RepeatedWhitespace => write!(f, "repeated whitespace"),
      Self::RepeatedHyphen => write!(f, "repeated hyphens"),
      Self::WhitespaceNearHyphen => write!(f, "whitespace next to a hyphen"),
      Self::EdgeWhitespace => write!(f, "leading or trailing whitespace"),
      Self::EdgeHyphen => write!(f, "leading or trailing hyphen"),
      Self::DisallowedCharacter(c) => write!(f, "disallowed character {c:?}"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "problem", rename_all = "snake_case")]
pub enum Problem {
  Missing {
    column: Column,
  },
  Suspicious {
    column:  Column,
    value:   String,
    pattern: SuspiciousPattern,
  },
  BirthYearBefore {
    year: i32,
    min:  i32,
  },
  /// Part of a run of consecutive birth dates; indices are row indices.
  SequentialDates {
    first: usize,
    last:  usize,
  },
  RepeatedDates {
    first: usize,
    last:  usize,
  },
}

impl Problem {
  pub fn is_hard(&self) -> bool { matches!(self, Self::Missing { .. }) }
}

impl fmt::Display for Problem {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Missing { column } => write!(f, "required field {column} is missing"),
      Self::Suspicious {
        column,
        value,
        pattern,
      } => write!(f, "{column} {value:?} looks suspicious: {pattern}"),
      Self::BirthYearBefore { year, min } => {
        write!(f, "birth year {year} is before {min}")
      }
      Self::SequentialDates { first, last } => {
        write!(f, "consecutive birth dates in rows {first}..={last}")
      }
      Self::RepeatedDates { first, last } => {
        write!(f, "identical birth dates in rows {first}..={last}")
      }
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
  Clean,
  PendingConfirmation,
  Rejected,
}

pub fn verdict(problems: &[Problem]) -> Verdict {
  if problems.is_empty() {
    Verdict::Clean
  } else if problems.iter().any(Problem::is_hard) {
    Verdict::Rejected
  } else {
    Verdict::PendingConfirmation
  }
}

// ─── Row checks ──────────────────────────────────────────────────────────────

fn allowed_in_name(c: char) -> bool {
  c.is_ascii_alphabetic() || matches!(c, 'а'..='я' | 'А'..='Я' | 'ё' | 'Ё' | '-') || c.is_whitespace()
}

/// First suspicious pattern in a name as it was typed.
pub fn detect_suspicious(value: &str) -> Option<SuspiciousPattern> {
  let chars: Vec<char> = value.chars().collect();
  let pairs = || chars.windows(2).map(|w| (w[0], w[1]));

  if pairs().any(|(a, b)| a.is_whitespace() && b.is_whitespace()) {
    return Some(SuspiciousPattern::RepeatedWhitespace);
  }
  if pairs().any(|(a, b)| a == '-' && b == '-') {
    return Some(SuspiciousPattern::RepeatedHyphen);
  }
  if pairs().any(|(a, b)| (a.is_whitespace() && b == '-') || (a == '-' && b.is_whitespace())) {
    return Some(SuspiciousPattern::WhitespaceNearHyphen);
  }
  let edges = [chars.first(), chars.last()];
  if edges.iter().flatten().any(|c| c.is_whitespace()) {
    return Some(SuspiciousPattern::EdgeWhitespace);
  }
  if edges.iter().flatten().any(|&&c| c == '-') {
    return Some(SuspiciousPattern::EdgeHyphen);
  }
  chars
    .iter()
    .find(|&&c| !allowed_in_name(c))
    .map(|&c| SuspiciousPattern::DisallowedCharacter(c))
}

/// Problems found in one row in isolation.
///
/// Name patterns are checked on the raw cells; normalization would already
/// have erased them.
pub fn check_row(raw: &RawRow, row: &NormalizedRow, config: &ValidationConfig) -> Vec<Problem> {
  let mut problems: Vec<Problem> = config
    .required
    .iter()
    .filter(|column| !row.is_present(**column))
    .map(|&column| Problem::Missing { column })
    .collect();

  for column in NAME_COLUMNS {
    let RawValue::Text(value) = raw.get(column) else {
      continue;
    };
    if let Some(pattern) = detect_suspicious(value) {
      problems.push(Problem::Suspicious {
        column,
        value: value.clone(),
        pattern,
      });
    }
  }

  if let (Some(min), Some(born)) = (config.min_birth_year, row.birth_date) {
    if born.year() < min {
      problems.push(Problem::BirthYearBefore {
        year: born.year(),
        min,
      });
    }
  }

  problems
}

// ─── Date scan ───────────────────────────────────────────────────────────────

fn is_sequential(prev: NaiveDate, cur: NaiveDate) -> bool {
  (cur - prev).num_days().abs() == 1
    || (cur.month() == prev.month()
      && cur.day() == prev.day()
      && (cur.year() - prev.year()).abs() == 1)
}

/// A run of positions `[start, end]` in the batch, tracked while scanning.
#[derive(Debug, Clone, Copy)]
struct Run {
  start: usize,
  len:   usize,
}

impl Run {
  fn at(position: usize) -> Self { Self { start: position, len: 1 } }

  fn extend_or_reset(&mut self, continues: bool, position: usize) {
    if continues {
      self.len += 1;
    } else {
      *self = Self::at(position);
    }
  }
}

/// Record `[start, end]` in `flagged`, merging with the run it extends.
fn flag(flagged: &mut Vec<(usize, usize)>, start: usize, end: usize) {
  match flagged.last_mut() {
    Some(last) if last.0 == start => last.1 = end,
    _ => flagged.push((start, end)),
  }
}

/// Scan birth dates in batch order for runs of consecutive or identical
/// values. Returns one problem list per row, aligned with `rows`.
pub fn scan_dates(rows: &[NormalizedRow], config: &ValidationConfig) -> Vec<Vec<Problem>> {
  let mut sequential = Run::at(0);
  let mut identical = Run::at(0);
  let mut seq_flagged = Vec::new();
  let mut same_flagged = Vec::new();

  for position in 1..rows.len() {
    match (rows[position - 1].birth_date, rows[position].birth_date) {
      (Some(prev), Some(cur)) => {
        sequential.extend_or_reset(is_sequential(prev, cur), position);
        identical.extend_or_reset(prev == cur, position);
      }
      _ => {
        sequential = Run::at(position);
        identical = Run::at(position);
      }
    }
    if sequential.len > config.sequential_threshold {
      flag(&mut seq_flagged, sequential.start, position);
    }
    if identical.len > config.identical_threshold {
      flag(&mut same_flagged, identical.start, position);
    }
  }

  let mut out = vec![Vec::new(); rows.len()];
  for (start, end) in seq_flagged {
    let (first, last) = (rows[start].index, rows[end].index);
    for problems in &mut out[start..=end] {
      problems.push(Problem::SequentialDates { first, last });
    }
  }
  for (start, end) in same_flagged {
    let (first, last) = (rows[start].index, rows[end].index);
    for problems in &mut out[start..=end] {
      problems.push(Problem::RepeatedDates { first, last });
    }
  }
  out
}
