//! Synchronous statements run inside a store transaction.
//!
//! Each function takes the transaction's connection and is called from the
//! [`StoreTx`](accred_core::store::StoreTx) impl in `store.rs`.

use accred_core::{
  identity::{PersonData, PersonIdentity},
  record::{AccreditationPeriod, AccreditationStatus, AuditEntry, PendingCandidate, PersonRecord},
  store::{RecordSource, SearchRow},
};
use rusqlite::{Connection, OptionalExtension as _, params};
use uuid::Uuid;

use crate::{
  Result,
  encode::{
    AUDIT_COLUMNS, DATA_COLUMNS, PERIOD_COLUMNS, RawAudit, RawCandidate, RawPeriod, RawPerson,
    RawSearchRow, encode_date, encode_dt, encode_uuid, escape_like, search_text,
  },
};

/// Identity predicate over `?1..?4`; absent and empty middle names match.
const IDENTITY_WHERE: &str =
  "surname = ?1 AND name = ?2 AND COALESCE(middle_name, '') = ?3 AND birth_date = ?4";

fn identity_params(identity: &PersonIdentity) -> (String, String, String, String) {
  (
    identity.surname.clone(),
    identity.name.clone(),
    identity.middle_key().to_owned(),
    encode_date(identity.birth_date),
  )
}

// ─── Person records ──────────────────────────────────────────────────────────

pub fn find_person(conn: &Connection, identity: &PersonIdentity) -> Result<Option<PersonRecord>> {
  let (surname, name, middle, born) = identity_params(identity);
  let raw = conn
    .query_row(
      &format!(
        "SELECT person_id, {DATA_COLUMNS}, status, created_at
         FROM person_records
         WHERE {IDENTITY_WHERE}
         ORDER BY created_at DESC, rowid DESC
         LIMIT 1"
      ),
      params![surname, name, middle, born],
      RawPerson::from_row,
    )
    .optional()?;
  raw.map(RawPerson::into_person).transpose()
}

pub fn get_person(conn: &Connection, person_id: Uuid) -> Result<Option<PersonRecord>> {
  let raw = conn
    .query_row(
      &format!(
        "SELECT person_id, {DATA_COLUMNS}, status, created_at
         FROM person_records WHERE person_id = ?1"
      ),
      params![encode_uuid(person_id)],
      RawPerson::from_row,
    )
    .optional()?;
  raw.map(RawPerson::into_person).transpose()
}

fn data_params(data: &PersonData) -> [Option<String>; 9] {
  let id = &data.identity;
  [
    Some(id.surname.clone()),
    Some(id.name.clone()),
    id.middle_name.clone(),
    Some(encode_date(id.birth_date)),
    data.birth_place.clone(),
    data.registration_address.clone(),
    data.organization.clone(),
    data.position.clone(),
    data.notes.clone(),
  ]
}

pub fn insert_person(conn: &Connection, person: &PersonRecord) -> Result<()> {
  let [surname, name, middle, born, place, address, org, position, notes] = data_params(&person.data);
  conn.execute(
    &format!(
      "INSERT INTO person_records (
         person_id, {DATA_COLUMNS}, status, created_at, search_text
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
    ),
    params![
      encode_uuid(person.person_id),
      surname,
      name,
      middle,
      born,
      place,
      address,
      org,
      position,
      notes,
      person.status.as_ref(),
      encode_dt(person.created_at),
      search_text(&person.data),
    ],
  )?;
  Ok(())
}

pub fn update_person_status(
  conn: &Connection,
  person_id: Uuid,
  status: AccreditationStatus,
) -> Result<()> {
  conn.execute(
    "UPDATE person_records SET status = ?2 WHERE person_id = ?1",
    params![encode_uuid(person_id), status.as_ref()],
  )?;
  Ok(())
}

pub fn update_person_notes(conn: &Connection, person_id: Uuid, notes: Option<&str>) -> Result<()> {
  conn.execute(
    "UPDATE person_records SET notes = ?2 WHERE person_id = ?1",
    params![encode_uuid(person_id), notes],
  )?;
  Ok(())
}

pub fn delete_person(conn: &Connection, person_id: Uuid) -> Result<()> {
  conn.execute(
    "DELETE FROM person_records WHERE person_id = ?1",
    params![encode_uuid(person_id)],
  )?;
  Ok(())
}

pub fn persons_with_status(
  conn: &Connection,
  status: AccreditationStatus,
) -> Result<Vec<PersonRecord>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT person_id, {DATA_COLUMNS}, status, created_at
     FROM person_records
     WHERE status = ?1
     ORDER BY created_at, rowid"
  ))?;
  let raws = stmt
    .query_map(params![status.as_ref()], RawPerson::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawPerson::into_person).collect()
}

// ─── Periods ─────────────────────────────────────────────────────────────────

pub fn latest_period(conn: &Connection, person_id: Uuid) -> Result<Option<AccreditationPeriod>> {
  let raw = conn
    .query_row(
      &format!(
        "SELECT {PERIOD_COLUMNS}
         FROM accreditation_periods
         WHERE person_id = ?1
         ORDER BY created_at DESC, rowid DESC
         LIMIT 1"
      ),
      params![encode_uuid(person_id)],
      RawPeriod::from_row,
    )
    .optional()?;
  raw.map(RawPeriod::into_period).transpose()
}

pub fn upsert_period(conn: &Connection, period: &AccreditationPeriod) -> Result<()> {
  conn.execute(
    &format!(
      "INSERT INTO accreditation_periods ({PERIOD_COLUMNS})
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
       ON CONFLICT (period_id) DO UPDATE SET
         start_at     = excluded.start_at,
         end_at       = excluded.end_at,
         blacklisted  = excluded.blacklisted,
         last_checked = excluded.last_checked"
    ),
    params![
      encode_uuid(period.period_id),
      encode_uuid(period.person_id),
      period.start.map(encode_dt),
      period.end.map(encode_dt),
      period.blacklisted,
      period.last_checked.map(encode_dt),
      encode_dt(period.created_at),
    ],
  )?;
  Ok(())
}

pub fn delete_periods(conn: &Connection, person_id: Uuid) -> Result<()> {
  conn.execute(
    "DELETE FROM accreditation_periods WHERE person_id = ?1",
    params![encode_uuid(person_id)],
  )?;
  Ok(())
}

// ─── Holding pool ────────────────────────────────────────────────────────────

pub fn find_candidate(
  conn: &Connection,
  identity: &PersonIdentity,
) -> Result<Option<PendingCandidate>> {
  let (surname, name, middle, born) = identity_params(identity);
  let raw = conn
    .query_row(
      &format!(
        "SELECT candidate_id, {DATA_COLUMNS}, review_note, intake_at
         FROM candidates
         WHERE {IDENTITY_WHERE}
         ORDER BY intake_at DESC, rowid DESC
         LIMIT 1"
      ),
      params![surname, name, middle, born],
      RawCandidate::from_row,
    )
    .optional()?;
  raw.map(RawCandidate::into_candidate).transpose()
}

pub fn get_candidate(conn: &Connection, candidate_id: Uuid) -> Result<Option<PendingCandidate>> {
  let raw = conn
    .query_row(
      &format!(
        "SELECT candidate_id, {DATA_COLUMNS}, review_note, intake_at
         FROM candidates WHERE candidate_id = ?1"
      ),
      params![encode_uuid(candidate_id)],
      RawCandidate::from_row,
    )
    .optional()?;
  raw.map(RawCandidate::into_candidate).transpose()
}

pub fn insert_candidate(conn: &Connection, candidate: &PendingCandidate) -> Result<()> {
  let [surname, name, middle, born, place, address, org, position, notes] =
    data_params(&candidate.data);
  conn.execute(
    &format!(
      "INSERT INTO candidates (
         candidate_id, {DATA_COLUMNS}, review_note, intake_at, search_text
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
    ),
    params![
      encode_uuid(candidate.candidate_id),
      surname,
      name,
      middle,
      born,
      place,
      address,
      org,
      position,
      notes,
      candidate.review_note,
      encode_dt(candidate.intake_at),
      search_text(&candidate.data),
    ],
  )?;
  Ok(())
}

pub fn delete_candidate(conn: &Connection, candidate_id: Uuid) -> Result<()> {
  conn.execute(
    "DELETE FROM candidates WHERE candidate_id = ?1",
    params![encode_uuid(candidate_id)],
  )?;
  Ok(())
}

pub fn list_candidates(conn: &Connection) -> Result<Vec<PendingCandidate>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT candidate_id, {DATA_COLUMNS}, review_note, intake_at
     FROM candidates
     ORDER BY intake_at, rowid"
  ))?;
  let raws = stmt
    .query_map([], RawCandidate::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawCandidate::into_candidate).collect()
}

// ─── Audit ───────────────────────────────────────────────────────────────────

pub fn append_audit(conn: &Connection, entry: &AuditEntry) -> Result<()> {
  conn.execute(
    &format!("INSERT INTO audit_log ({AUDIT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"),
    params![
      encode_uuid(entry.audit_id),
      entry.person_id.map(encode_uuid),
      encode_dt(entry.recorded_at),
      entry.operation.as_ref(),
      entry.details,
    ],
  )?;
  Ok(())
}

pub fn audit_for_person(conn: &Connection, person_id: Uuid) -> Result<Vec<AuditEntry>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {AUDIT_COLUMNS}
     FROM audit_log
     WHERE person_id = ?1
     ORDER BY recorded_at DESC, rowid DESC"
  ))?;
  let raws = stmt
    .query_map(params![encode_uuid(person_id)], RawAudit::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawAudit::into_entry).collect()
}

// ─── Search ──────────────────────────────────────────────────────────────────

pub fn search(conn: &Connection, text: &str, limit: usize) -> Result<Vec<SearchRow>> {
  // `search_text` is lower-cased in Rust, which covers Cyrillic where
  // SQLite's own `lower()` does not.
  let pattern = format!("%{}%", escape_like(&text.trim().to_lowercase()));
  let limit = i64::try_from(limit).unwrap_or(i64::MAX);

  let mut stmt = conn.prepare(&format!(
    "SELECT 'person', person_id, {DATA_COLUMNS}, status, created_at
     FROM person_records
     WHERE search_text LIKE ?1 ESCAPE '\\'
     UNION ALL
     SELECT 'candidate', candidate_id, {DATA_COLUMNS}, NULL, intake_at
     FROM candidates
     WHERE search_text LIKE ?1 ESCAPE '\\'
     ORDER BY 3, 4
     LIMIT ?2"
  ))?;
  let raws = stmt
    .query_map(params![pattern, limit], RawSearchRow::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let mut rows = Vec::with_capacity(raws.len());
  for raw in raws {
    let mut row = raw.into_row()?;
    if row.source == RecordSource::Person {
      row.period = latest_period(conn, row.id)?;
    }
    rows.push(row);
  }
  Ok(rows)
}
