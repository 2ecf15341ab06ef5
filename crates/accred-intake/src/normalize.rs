//! Text and date normalization.
//!
//! Every function here is pure and idempotent: normalizing an already
//! normalized value returns it unchanged.

use accred_core::identity::{PersonData, PersonIdentity};
use chrono::{Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::tabular::{Column, RawRow, RawValue};

/// Earliest accepted year for any parsed date.
pub const MIN_YEAR: i32 = 1900;

/// Formats tried in order; the first in-range result wins. ISO first, then
/// day-first, then month-first as the last resort.
const DATE_FORMATS: &[&str] = &[
  "%Y-%m-%d", "%Y.%m.%d", "%Y/%m/%d", "%d.%m.%Y", "%d/%m/%Y", "%d-%m-%Y", "%d%m%Y", "%Y%m%d",
  "%d%m%y", "%d.%m.%y", "%d/%m/%y", "%d-%m-%y", "%m/%d/%Y",
];

/// Longest all-digit text read as a spreadsheet serial. Six digits is `ddmmyy`.
const MAX_SERIAL_DIGITS: usize = 5;

// ─── Text ────────────────────────────────────────────────────────────────────

/// Zero-width and bidi formatting characters that survive copy-paste.
fn is_invisible(c: char) -> bool {
  c.is_control()
    || matches!(
      c,
      '\u{00AD}'
        | '\u{200B}'..='\u{200F}'
        | '\u{202A}'..='\u{202E}'
        | '\u{2060}'..='\u{2064}'
        | '\u{FEFF}'
    )
}

fn is_name_char(c: char) -> bool {
  c.is_ascii_alphabetic()
    || matches!(c, 'а'..='я' | 'А'..='Я' | 'ё' | 'Ё' | ' ' | '-')
}

/// Collapse whitespace runs, trim, and drop spaces next to hyphens.
fn tidy(s: &str) -> String {
  let collapsed = s.split_whitespace().collect::<Vec<_>>().join(" ");
  let mut out = String::with_capacity(collapsed.len());
  let mut chars = collapsed.chars().peekable();
  while let Some(c) = chars.next() {
    if c == ' ' && (out.ends_with('-') || chars.peek() == Some(&'-')) {
      continue;
    }
    out.push(c);
  }
  out
}

fn clean(raw: &str, whitelist: bool) -> Option<String> {
  let visible: String = raw
    .chars()
    .filter_map(|c| {
      if c.is_whitespace() {
        Some(' ')
      } else if is_invisible(c) {
        None
      } else {
        Some(c)
      }
    })
    .collect();

  let composed: String = visible.nfc().collect();
  let mut out = tidy(&composed);
  if whitelist {
    let kept: String = out.chars().filter(|&c| is_name_char(c)).collect();
    out = tidy(&kept);
  }
  let out: String = out.nfc().collect();
  (!out.is_empty()).then_some(out)
}

/// Canonical form of a free-text field, or `None` if nothing is left.
pub fn normalize_text(raw: &str) -> Option<String> { clean(raw, false) }

/// Like [`normalize_text`] but keeps only Latin and Cyrillic letters, spaces
/// and hyphens.
pub fn normalize_name(raw: &str) -> Option<String> { clean(raw, true) }

/// Normalize a cell destined for a text column.
pub fn normalize_cell(value: &RawValue, column: Column) -> Option<String> {
  let text = match value {
    RawValue::Empty => return None,
    RawValue::Text(s) => s.clone(),
    RawValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
    RawValue::Number(n) => n.to_string(),
    RawValue::Date(d) => d.format("%Y-%m-%d").to_string(),
  };
  if column.is_name() {
    normalize_name(&text)
  } else {
    normalize_text(&text)
  }
}

/// Normalize the identity and text fields of a record that did not come
/// through a spreadsheet, so it keys the same way intake rows do.
pub fn normalize_person(data: PersonData) -> accred_core::Result<PersonData> {
  let PersonData {
    identity,
    birth_place,
    registration_address,
    organization,
    position,
    notes,
  } = data;
  let text = |field: Option<String>| field.as_deref().and_then(normalize_text);

  let identity = PersonIdentity::try_new(
    normalize_name(&identity.surname).unwrap_or_default(),
    normalize_name(&identity.name).unwrap_or_default(),
    identity.middle_name.as_deref().and_then(normalize_name),
    identity.birth_date,
  )?;
  Ok(PersonData {
    identity,
    birth_place: text(birth_place),
    registration_address: text(registration_address),
    organization: text(organization),
    position: text(position),
    notes: text(notes),
  })
}

// ─── Dates ───────────────────────────────────────────────────────────────────

/// Latest accepted year: next year, relative to the wall clock.
pub fn default_max_year() -> i32 { Utc::now().year() + 1 }

fn in_range(date: NaiveDate, max_year: i32) -> bool {
  (MIN_YEAR..=max_year).contains(&date.year())
}

/// Spreadsheet serial day count on the 1899-12-30 epoch.
pub fn from_serial(serial: f64) -> Option<NaiveDate> {
  if !serial.is_finite() || serial < 1.0 || serial > 2_958_465.0 {
    return None;
  }
  let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
  epoch.checked_add_signed(Duration::days(serial.floor() as i64))
}

fn parse_date_text(raw: &str, max_year: i32) -> Option<NaiveDate> {
  // First token carrying digits; drops prefixes and any time-of-day part.
  let date_part = raw
    .split(|c: char| c.is_whitespace() || c == 'T')
    .find(|token| token.chars().any(|c| c.is_ascii_digit()))?;
  let cleaned: String = date_part
    .chars()
    .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '/' | '-'))
    .collect();
  if cleaned.is_empty() {
    return None;
  }
  if cleaned.len() <= MAX_SERIAL_DIGITS && cleaned.chars().all(|c| c.is_ascii_digit()) {
    return from_serial(cleaned.parse().ok()?);
  }
  DATE_FORMATS
    .iter()
    .filter_map(|format| NaiveDate::parse_from_str(&cleaned, format).ok())
    .find(|date| in_range(*date, max_year))
}

/// Canonical date for a cell, or `None` when it is unparseable or outside
/// `[1900, max_year]`.
pub fn normalize_date_with(value: &RawValue, max_year: i32) -> Option<NaiveDate> {
  let date = match value {
    RawValue::Empty => None,
    RawValue::Date(d) => Some(*d),
    RawValue::Number(n) => from_serial(*n),
    RawValue::Text(s) => parse_date_text(s, max_year),
  }?;
  in_range(date, max_year).then_some(date)
}

pub fn normalize_date(value: &RawValue) -> Option<NaiveDate> {
  normalize_date_with(value, default_max_year())
}

// ─── Rows ────────────────────────────────────────────────────────────────────

/// A row after normalization. Absent fields are `None`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedRow {
  pub index:                usize,
  pub surname:              Option<String>,
  pub name:                 Option<String>,
  pub middle_name:          Option<String>,
  pub birth_date:           Option<NaiveDate>,
  pub birth_place:          Option<String>,
  pub registration_address: Option<String>,
  pub organization:         Option<String>,
  pub position:             Option<String>,
  pub notes:                Option<String>,
  pub check_date:           Option<NaiveDate>,
}

impl NormalizedRow {
  pub fn text(&self, column: Column) -> Option<&str> {
    match column {
      Column::Surname => self.surname.as_deref(),
      Column::Name => self.name.as_deref(),
      Column::MiddleName => self.middle_name.as_deref(),
      Column::BirthPlace => self.birth_place.as_deref(),
      Column::RegistrationAddress => self.registration_address.as_deref(),
      Column::Organization => self.organization.as_deref(),
      Column::Position => self.position.as_deref(),
      Column::Notes => self.notes.as_deref(),
      Column::BirthDate | Column::CheckDate => None,
    }
  }

  pub fn is_present(&self, column: Column) -> bool {
    match column {
      Column::BirthDate => self.birth_date.is_some(),
      Column::CheckDate => self.check_date.is_some(),
      other => self.text(other).is_some_and(|t| !t.trim().is_empty()),
    }
  }

  /// The natural key, when surname, name and birth date are all present.
  pub fn identity(&self) -> Option<PersonIdentity> {
    Some(PersonIdentity::new(
      self.surname.clone()?,
      self.name.clone()?,
      self.middle_name.clone(),
      self.birth_date?,
    ))
  }

  pub fn person_data(&self) -> Option<PersonData> {
    Some(PersonData {
      identity:             self.identity()?,
      birth_place:          self.birth_place.clone(),
      registration_address: self.registration_address.clone(),
      organization:         self.organization.clone(),
      position:             self.position.clone(),
      notes:                self.notes.clone(),
    })
  }
}

pub fn normalize_row(row: &RawRow, max_year: i32) -> NormalizedRow {
  let text = |column: Column| normalize_cell(row.get(column), column);
  NormalizedRow {
    index:                row.index,
    surname:              text(Column::Surname),
    name:                 text(Column::Name),
    middle_name:          text(Column::MiddleName),
    birth_date:           normalize_date_with(row.get(Column::BirthDate), max_year),
    birth_place:          text(Column::BirthPlace),
    registration_address: text(Column::RegistrationAddress),
    organization:         text(Column::Organization),
    position:             text(Column::Position),
    notes:                text(Column::Notes),
    check_date:           normalize_date_with(row.get(Column::CheckDate), max_year),
  }
}
