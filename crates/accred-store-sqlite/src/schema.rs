//! SQL schema for the accreditation store.
//!
//! Executed once at connection startup. `PRAGMA user_version` records the
//! layout version for future migrations.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Holding pool: normalized records awaiting weekly promotion.
CREATE TABLE IF NOT EXISTS candidates (
    candidate_id         TEXT PRIMARY KEY,
    surname              TEXT NOT NULL,
    name                 TEXT NOT NULL,
    middle_name          TEXT,            -- NULL and '' match each other
    birth_date           TEXT NOT NULL,   -- YYYY-MM-DD
    birth_place          TEXT,
    registration_address TEXT,
    organization         TEXT,
    position             TEXT,
    notes                TEXT,
    review_note          TEXT NOT NULL,
    intake_at            TEXT NOT NULL,   -- RFC 3339 UTC, fixed precision
    search_text          TEXT NOT NULL    -- lower-cased name and organization
);

-- One row per known individual; no unique constraint, inserts look up first.
CREATE TABLE IF NOT EXISTS person_records (
    person_id            TEXT PRIMARY KEY,
    surname              TEXT NOT NULL,
    name                 TEXT NOT NULL,
    middle_name          TEXT,
    birth_date           TEXT NOT NULL,
    birth_place          TEXT,
    registration_address TEXT,
    organization         TEXT,
    position             TEXT,
    notes                TEXT,
    status               TEXT NOT NULL,   -- 'pending' | 'accredited' | 'expired' | 'rejected'
    created_at           TEXT NOT NULL,
    search_text          TEXT NOT NULL
);

-- The most recently created period per person is authoritative.
CREATE TABLE IF NOT EXISTS accreditation_periods (
    period_id    TEXT PRIMARY KEY,
    person_id    TEXT NOT NULL REFERENCES person_records(person_id),
    start_at     TEXT,
    end_at       TEXT,
    blacklisted  INTEGER NOT NULL DEFAULT 0,
    last_checked TEXT,
    created_at   TEXT NOT NULL
);

-- Append-only. No foreign key: entries outlive demoted person records.
CREATE TABLE IF NOT EXISTS audit_log (
    audit_id    TEXT PRIMARY KEY,
    person_id   TEXT,
    recorded_at TEXT NOT NULL,
    operation   TEXT NOT NULL,
    details     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS candidates_identity_idx
    ON candidates(surname, name, COALESCE(middle_name, ''), birth_date);
CREATE INDEX IF NOT EXISTS person_records_identity_idx
    ON person_records(surname, name, COALESCE(middle_name, ''), birth_date);
CREATE INDEX IF NOT EXISTS person_records_status_idx ON person_records(status);
CREATE INDEX IF NOT EXISTS periods_person_idx        ON accreditation_periods(person_id);
CREATE INDEX IF NOT EXISTS periods_end_idx           ON accreditation_periods(end_at);
CREATE INDEX IF NOT EXISTS periods_blacklisted_idx   ON accreditation_periods(blacklisted);
CREATE INDEX IF NOT EXISTS audit_person_idx          ON audit_log(person_id);

PRAGMA user_version = 1;
";
