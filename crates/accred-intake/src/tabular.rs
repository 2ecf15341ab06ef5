//! Header-driven CSV adapter.
//!
//! String column names exist only here. Headers are matched against English
//! and Russian aliases, column order does not matter, and unknown columns are
//! ignored. Everything past this module works on typed [`RawRow`]s.

use std::{collections::BTreeMap, fs::File, io::Read, path::Path};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

use crate::{Error, Result};

// ─── Columns ─────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Column {
  Surname,
  Name,
  MiddleName,
  BirthDate,
  BirthPlace,
  RegistrationAddress,
  Organization,
  Position,
  Notes,
  CheckDate,
}

/// Columns an intake file must carry.
pub const INTAKE_COLUMNS: &[Column] =
  &[Column::Surname, Column::Name, Column::BirthDate, Column::Organization];

/// Columns an activation file must carry.
pub const ACTIVATION_COLUMNS: &[Column] = &[Column::Surname, Column::Name, Column::BirthDate];

impl Column {
  pub const ALL: [Column; 10] = [
    Column::Surname,
    Column::Name,
    Column::MiddleName,
    Column::BirthDate,
    Column::BirthPlace,
    Column::RegistrationAddress,
    Column::Organization,
    Column::Position,
    Column::Notes,
    Column::CheckDate,
  ];

  /// Lower-case header spellings accepted for this column.
  pub fn aliases(self) -> &'static [&'static str] {
    match self {
      Column::Surname => &["surname", "last name", "фамилия"],
      Column::Name => &["name", "first name", "имя"],
      Column::MiddleName => &["middle name", "patronymic", "отчество"],
      Column::BirthDate => &["birth date", "date of birth", "дата рождения"],
      Column::BirthPlace => &["birth place", "place of birth", "место рождения"],
      Column::RegistrationAddress => &[
        "registration address",
        "address",
        "адрес регистрации",
        "регистрация",
      ],
      Column::Organization => &["organization", "organisation", "организация"],
      Column::Position => &["position", "job title", "должность"],
      Column::Notes => &["notes", "примечания", "примечание"],
      Column::CheckDate => &["check date", "дата проверки"],
    }
  }

  pub fn from_header(header: &str) -> Option<Self> {
    let key = header
      .trim()
      .trim_start_matches('\u{feff}')
      .replace('_', " ")
      .to_lowercase();
    Self::ALL
      .into_iter()
      .find(|c| c.aliases().contains(&key.as_str()))
  }

  /// Name fields get the character whitelist during normalization.
  pub fn is_name(self) -> bool {
    matches!(self, Column::Surname | Column::Name | Column::MiddleName)
  }

  pub fn is_date(self) -> bool { matches!(self, Column::BirthDate | Column::CheckDate) }
}

// ─── Rows ────────────────────────────────────────────────────────────────────

/// One cell as read from the source, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawValue {
  Empty,
  Text(String),
  /// Spreadsheet numeric cell; dates arrive as serial day counts.
  Number(f64),
  Date(NaiveDate),
}

impl RawValue {
  pub fn from_cell(cell: &str) -> Self {
    if cell.trim().is_empty() {
      Self::Empty
    } else {
      Self::Text(cell.to_owned())
    }
  }

  pub fn is_blank(&self) -> bool {
    match self {
      Self::Empty => true,
      Self::Text(s) => s.trim().is_empty(),
      Self::Number(_) | Self::Date(_) => false,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawRow {
  /// Zero-based position of the row among the data rows of its source.
  pub index: usize,
  pub cells: BTreeMap<Column, RawValue>,
}

impl RawRow {
  pub fn new(index: usize) -> Self {
    Self {
      index,
      cells: BTreeMap::new(),
    }
  }

  pub fn with(mut self, column: Column, value: RawValue) -> Self {
    self.cells.insert(column, value);
    self
  }

  /// Shorthand for a text cell.
  pub fn with_text(self, column: Column, text: &str) -> Self {
    self.with(column, RawValue::from_cell(text))
  }

  pub fn get(&self, column: Column) -> &RawValue {
    self.cells.get(&column).unwrap_or(&RawValue::Empty)
  }

  pub fn is_blank(&self) -> bool { self.cells.values().all(RawValue::is_blank) }
}

// ─── Reading ─────────────────────────────────────────────────────────────────

/// Read every data row from CSV `reader`.
///
/// Fails before producing any row when a `required` column has no header.
/// Rows whose cells are all blank are dropped; the remaining rows keep their
/// original position as `index`.
pub fn read_rows<R: Read>(reader: R, required: &[Column]) -> Result<Vec<RawRow>> {
  let mut csv_reader = csv::ReaderBuilder::new()
    .flexible(true)
    .trim(csv::Trim::All)
    .from_reader(reader);

  let mut mapping: Vec<(usize, Column)> = Vec::new();
  for (position, header) in csv_reader.headers()?.iter().enumerate() {
    match Column::from_header(header) {
      Some(column) if !mapping.iter().any(|(_, c)| *c == column) => {
        mapping.push((position, column));
      }
      Some(column) => tracing::warn!(%column, header, "duplicate column ignored"),
      None => tracing::debug!(header, "unknown column ignored"),
    }
  }

  if let Some(missing) = required
    .iter()
    .find(|c| !mapping.iter().any(|(_, m)| m == *c))
  {
    return Err(Error::MissingColumn(*missing));
  }

  let mut rows = Vec::new();
  for (index, record) in csv_reader.records().enumerate() {
    let record = record?;
    let mut row = RawRow::new(index);
    for (position, column) in &mapping {
      let cell = record.get(*position).unwrap_or_default();
      row.cells.insert(*column, RawValue::from_cell(cell));
    }
    if row.is_blank() {
      tracing::debug!(row = index, "blank row dropped");
      continue;
    }
    rows.push(row);
  }
  Ok(rows)
}

pub fn read_path(path: impl AsRef<Path>, required: &[Column]) -> Result<Vec<RawRow>> {
  read_rows(File::open(path)?, required)
}
