//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 UTC strings with fixed microsecond
//! precision so that text order equals time order. Dates are `YYYY-MM-DD`.
//! UUIDs are stored as hyphenated lowercase strings.

use std::str::FromStr;

use accred_core::{
  identity::{PersonData, PersonIdentity},
  record::{AccreditationPeriod, AuditEntry, PendingCandidate, PersonRecord},
  store::{RecordSource, SearchRow},
};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

/// Decode a snake_case enum tag written with `AsRef<str>`.
pub fn decode_tag<T: FromStr>(kind: &'static str, s: &str) -> Result<T> {
  s.parse().map_err(|_| Error::UnknownValue {
    kind,
    value: s.to_owned(),
  })
}

/// Lower-cased name and organization, matched with `LIKE` by search.
pub fn search_text(data: &PersonData) -> String {
  let id = &data.identity;
  [
    Some(id.surname.as_str()),
    Some(id.name.as_str()),
    id.middle_name.as_deref(),
    data.organization.as_deref(),
  ]
  .into_iter()
  .flatten()
  .collect::<Vec<_>>()
  .join(" ")
  .to_lowercase()
}

/// Escape `LIKE` metacharacters; pair with `ESCAPE '\'`.
pub fn escape_like(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  for c in s.chars() {
    if matches!(c, '%' | '_' | '\\') {
      out.push('\\');
    }
    out.push(c);
  }
  out
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Shared descriptive columns of `candidates` and `person_records`, in the
/// order of [`DATA_COLUMNS`].
pub const DATA_COLUMNS: &str = "surname, name, middle_name, birth_date, birth_place, \
                                registration_address, organization, position, notes";

pub struct RawData {
  pub surname:              String,
  pub name:                 String,
  pub middle_name:          Option<String>,
  pub birth_date:           String,
  pub birth_place:          Option<String>,
  pub registration_address: Option<String>,
  pub organization:         Option<String>,
  pub position:             Option<String>,
  pub notes:                Option<String>,
}

impl RawData {
  /// Read the nine data columns starting at `offset`.
  pub fn from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      surname:              row.get(offset)?,
      name:                 row.get(offset + 1)?,
      middle_name:          row.get(offset + 2)?,
      birth_date:           row.get(offset + 3)?,
      birth_place:          row.get(offset + 4)?,
      registration_address: row.get(offset + 5)?,
      organization:         row.get(offset + 6)?,
      position:             row.get(offset + 7)?,
      notes:                row.get(offset + 8)?,
    })
  }

  pub fn into_data(self) -> Result<PersonData> {
    Ok(PersonData {
      identity:             PersonIdentity::new(
        self.surname,
        self.name,
        self.middle_name,
        decode_date(&self.birth_date)?,
      ),
      birth_place:          self.birth_place,
      registration_address: self.registration_address,
      organization:         self.organization,
      position:             self.position,
      notes:                self.notes,
    })
  }
}

/// `person_id, <data>, status, created_at`
pub struct RawPerson {
  pub person_id:  String,
  pub data:       RawData,
  pub status:     String,
  pub created_at: String,
}

impl RawPerson {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      person_id:  row.get(0)?,
      data:       RawData::from_row(row, 1)?,
      status:     row.get(10)?,
      created_at: row.get(11)?,
    })
  }

  pub fn into_person(self) -> Result<PersonRecord> {
    Ok(PersonRecord {
      person_id:  decode_uuid(&self.person_id)?,
      data:       self.data.into_data()?,
      status:     decode_tag("status", &self.status)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// `candidate_id, <data>, review_note, intake_at`
pub struct RawCandidate {
  pub candidate_id: String,
  pub data:         RawData,
  pub review_note:  String,
  pub intake_at:    String,
}

impl RawCandidate {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      candidate_id: row.get(0)?,
      data:         RawData::from_row(row, 1)?,
      review_note:  row.get(10)?,
      intake_at:    row.get(11)?,
    })
  }

  pub fn into_candidate(self) -> Result<PendingCandidate> {
    Ok(PendingCandidate {
      candidate_id: decode_uuid(&self.candidate_id)?,
      data:         self.data.into_data()?,
      review_note:  self.review_note,
      intake_at:    decode_dt(&self.intake_at)?,
    })
  }
}

pub const PERIOD_COLUMNS: &str =
  "period_id, person_id, start_at, end_at, blacklisted, last_checked, created_at";

pub struct RawPeriod {
  pub period_id:    String,
  pub person_id:    String,
  pub start_at:     Option<String>,
  pub end_at:       Option<String>,
  pub blacklisted:  bool,
  pub last_checked: Option<String>,
  pub created_at:   String,
}

impl RawPeriod {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      period_id:    row.get(0)?,
      person_id:    row.get(1)?,
      start_at:     row.get(2)?,
      end_at:       row.get(3)?,
      blacklisted:  row.get(4)?,
      last_checked: row.get(5)?,
      created_at:   row.get(6)?,
    })
  }

  pub fn into_period(self) -> Result<AccreditationPeriod> {
    Ok(AccreditationPeriod {
      period_id:    decode_uuid(&self.period_id)?,
      person_id:    decode_uuid(&self.person_id)?,
      start:        self.start_at.as_deref().map(decode_dt).transpose()?,
      end:          self.end_at.as_deref().map(decode_dt).transpose()?,
      blacklisted:  self.blacklisted,
      last_checked: self.last_checked.as_deref().map(decode_dt).transpose()?,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

pub const AUDIT_COLUMNS: &str = "audit_id, person_id, recorded_at, operation, details";

pub struct RawAudit {
  pub audit_id:    String,
  pub person_id:   Option<String>,
  pub recorded_at: String,
  pub operation:   String,
  pub details:     String,
}

impl RawAudit {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      audit_id:    row.get(0)?,
      person_id:   row.get(1)?,
      recorded_at: row.get(2)?,
      operation:   row.get(3)?,
      details:     row.get(4)?,
    })
  }

  pub fn into_entry(self) -> Result<AuditEntry> {
    Ok(AuditEntry {
      audit_id:    decode_uuid(&self.audit_id)?,
      person_id:   self.person_id.as_deref().map(decode_uuid).transpose()?,
      recorded_at: decode_dt(&self.recorded_at)?,
      operation:   decode_tag("audit operation", &self.operation)?,
      details:     self.details,
    })
  }
}

/// `source, id, <data>, status, created_at` from the search union.
pub struct RawSearchRow {
  pub source:     String,
  pub id:         String,
  pub data:       RawData,
  pub status:     Option<String>,
  pub created_at: String,
}

impl RawSearchRow {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      source:     row.get(0)?,
      id:         row.get(1)?,
      data:       RawData::from_row(row, 2)?,
      status:     row.get(11)?,
      created_at: row.get(12)?,
    })
  }

  pub fn into_row(self) -> Result<SearchRow> {
    let source = match self.source.as_str() {
      "person" => RecordSource::Person,
      "candidate" => RecordSource::Candidate,
      other => {
        return Err(Error::UnknownValue {
          kind:  "record source",
          value: other.to_owned(),
        });
      }
    };
    Ok(SearchRow {
      source,
      id: decode_uuid(&self.id)?,
      data: self.data.into_data()?,
      status: self
        .status
        .as_deref()
        .map(|s| decode_tag("status", s))
        .transpose()?,
      period: None,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}
