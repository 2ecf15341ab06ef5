//! Shared fixtures for the intake integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use accred_core::{
  clock::FixedClock,
  identity::{PersonData, PersonIdentity},
  lifecycle::{Registration, RegistrationOutcome},
  record::{AccreditationPeriod, AccreditationStatus, PendingCandidate},
  registry::Registry,
  store::AccreditationStore,
};
use accred_store_sqlite::SqliteStore;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use uuid::Uuid;

pub fn t0() -> DateTime<Utc> { Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap() }

pub async fn registry() -> Registry<SqliteStore> {
  let store = SqliteStore::open_in_memory().await.expect("in-memory store");
  Registry::new(Arc::new(store)).with_clock(Arc::new(FixedClock::new(t0())))
}

pub fn person(surname: &str, name: &str, middle: Option<&str>, born: &str) -> PersonData {
  PersonData::new(PersonIdentity::new(
    surname,
    name,
    middle.map(str::to_owned),
    born.parse::<NaiveDate>().unwrap(),
  ))
  .with_organization("OrgA")
}

pub async fn register(
  registry: &Registry<SqliteStore>,
  data: PersonData,
  registration: Registration,
) -> Uuid {
  match registry.register(data, registration).await.unwrap() {
    RegistrationOutcome::Registered { person_id } => person_id,
    other => panic!("expected registration, got {other:?}"),
  }
}

pub async fn candidates(registry: &Registry<SqliteStore>) -> Vec<PendingCandidate> {
  registry
    .store()
    .transact(|tx| tx.list_candidates())
    .await
    .unwrap()
}

pub async fn status_of(registry: &Registry<SqliteStore>, id: Uuid) -> Option<AccreditationStatus> {
  registry
    .store()
    .transact(move |tx| tx.get_person(id))
    .await
    .unwrap()
    .map(|p| p.status)
}

pub async fn latest_period(
  registry: &Registry<SqliteStore>,
  id: Uuid,
) -> Option<AccreditationPeriod> {
  registry
    .store()
    .transact(move |tx| tx.latest_period(id))
    .await
    .unwrap()
}
