//! Integration tests for `SqliteStore` and the lifecycle state machine against
//! an in-memory database.

use std::sync::Arc;

use accred_core::{
  category::Category,
  clock::FixedClock,
  identity::{PersonData, PersonIdentity},
  lifecycle::{
    self, BlacklistOutcome, PromotionOutcome, QueueOutcome, Registration, RegistrationOutcome,
  },
  record::{AccreditationPeriod, AccreditationStatus, AuditOperation},
  registry::Registry,
  status::DerivedStatus,
  store::{AccreditationStore, PersonKey, RecordSource},
};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn t0() -> DateTime<Utc> { Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap() }

async fn registry() -> (Registry<SqliteStore>, Arc<FixedClock>) {
  let clock = Arc::new(FixedClock::new(t0()));
  let registry = Registry::new(Arc::new(store().await)).with_clock(clock.clone());
  (registry, clock)
}

fn ivanov() -> PersonData {
  PersonData::new(PersonIdentity::new(
    "Иванов",
    "Иван",
    Some("Иванович".into()),
    NaiveDate::from_ymd_opt(1985, 5, 1).unwrap(),
  ))
  .with_organization("ООО Ромашка")
}

fn petrov() -> PersonData {
  PersonData::new(PersonIdentity::new(
    "Petrov",
    "Petr",
    None,
    NaiveDate::from_ymd_opt(1990, 1, 15).unwrap(),
  ))
  .with_organization("ГПХ Petrov")
}

async fn register_pending(registry: &Registry<SqliteStore>, data: PersonData) -> Uuid {
  match registry.register(data, Registration::Pending).await.unwrap() {
    RegistrationOutcome::Registered { person_id } => person_id,
    other => panic!("expected registration, got {other:?}"),
  }
}

async fn register_active(
  registry: &Registry<SqliteStore>,
  data: PersonData,
  start: DateTime<Utc>,
) -> Uuid {
  match registry.register(data, Registration::Active { start }).await.unwrap() {
    RegistrationOutcome::Registered { person_id } => person_id,
    other => panic!("expected registration, got {other:?}"),
  }
}

async fn latest_period(registry: &Registry<SqliteStore>, id: Uuid) -> Option<AccreditationPeriod> {
  registry
    .store()
    .transact(move |tx| tx.latest_period(id))
    .await
    .unwrap()
}

async fn status_of(registry: &Registry<SqliteStore>, id: Uuid) -> Option<AccreditationStatus> {
  registry
    .store()
    .transact(move |tx| tx.get_person(id))
    .await
    .unwrap()
    .map(|p| p.status)
}

async fn candidate_count(registry: &Registry<SqliteStore>) -> usize {
  registry
    .store()
    .transact(|tx| tx.list_candidates())
    .await
    .unwrap()
    .len()
}

// ─── Identity matching ───────────────────────────────────────────────────────

#[tokio::test]
async fn find_person_treats_empty_middle_name_as_absent() {
  let (registry, _) = registry().await;
  let id = register_pending(&registry, petrov()).await;

  let mut lookup = petrov().identity;
  lookup.middle_name = Some(String::new());

  let found = registry
    .store()
    .transact(move |tx| tx.find_person(&lookup))
    .await
    .unwrap()
    .expect("person found");
  assert_eq!(found.person_id, id);
  assert_eq!(found.data.identity.middle_name, None);
}

#[tokio::test]
async fn register_twice_returns_existing_person() {
  let (registry, _) = registry().await;
  let id = register_pending(&registry, ivanov()).await;

  let again = registry.register(ivanov(), Registration::Pending).await.unwrap();
  assert!(matches!(
    again,
    RegistrationOutcome::AlreadyRegistered { person_id } if person_id == id
  ));
}

#[tokio::test]
async fn latest_period_is_most_recently_created() {
  let (registry, _) = registry().await;
  let id = register_pending(&registry, ivanov()).await;

  let older = AccreditationPeriod {
    end: Some(t0() + Duration::days(10)),
    ..AccreditationPeriod::open(id, t0() - Duration::days(30))
  };
  let newer = AccreditationPeriod {
    blacklisted: true,
    ..AccreditationPeriod::open(id, t0())
  };
  let (o, n) = (older.clone(), newer.clone());
  registry
    .store()
    .transact(move |tx| {
      tx.upsert_period(&n)?;
      tx.upsert_period(&o)
    })
    .await
    .unwrap();

  let latest = latest_period(&registry, id).await.unwrap();
  assert_eq!(latest.period_id, newer.period_id);
  assert_eq!(
    DerivedStatus::derive(Some(&latest), t0()),
    DerivedStatus::Blacklisted
  );
}

// ─── Promotion ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn promotion_is_idempotent() {
  let (registry, _) = registry().await;
  let id = register_pending(&registry, ivanov()).await;
  let before = registry.history(id).await.unwrap().len();

  let first = registry.promote(PersonKey::Id(id), None).await.unwrap();
  let PromotionOutcome::Activated { period, .. } = first else {
    panic!("expected activation, got {first:?}");
  };
  assert_eq!(period.start, Some(t0()));
  assert_eq!(period.end, Some(t0() + Duration::days(180)));
  assert!(!period.blacklisted);

  let after_first = registry.history(id).await.unwrap();
  assert_eq!(after_first.len(), before + 1);
  assert_eq!(after_first[0].operation, AuditOperation::Activated);

  let second = registry.promote(PersonKey::Id(id), None).await.unwrap();
  assert!(matches!(
    second,
    PromotionOutcome::Unchanged { status: AccreditationStatus::Accredited, .. }
  ));
  assert!(second.message().contains("not required"));
  assert_eq!(registry.history(id).await.unwrap().len(), before + 1);
}

#[tokio::test]
async fn promote_by_identity_with_effective_date() {
  let (registry, _) = registry().await;
  let id = register_pending(&registry, petrov()).await;
  let effective = t0() - Duration::days(7);

  let outcome = registry
    .promote(PersonKey::Identity(petrov().identity), Some(effective))
    .await
    .unwrap();
  assert!(matches!(outcome, PromotionOutcome::Activated { person_id, .. } if person_id == id));

  let period = latest_period(&registry, id).await.unwrap();
  assert_eq!(period.start, Some(effective));
  assert_eq!(period.end, Some(effective + Duration::days(180)));
  assert_eq!(period.last_checked, Some(t0()));
}

#[tokio::test]
async fn promote_unknown_person_is_not_found() {
  let (registry, _) = registry().await;
  let outcome = registry
    .promote(PersonKey::Identity(ivanov().identity), None)
    .await
    .unwrap();
  assert!(matches!(outcome, PromotionOutcome::NotFound));
}

// ─── Expiry ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn expiry_sweep_expires_closed_windows_only() {
  let (registry, clock) = registry().await;
  let stale = register_active(&registry, ivanov(), t0() - Duration::days(200)).await;
  let fresh = register_active(&registry, petrov(), t0()).await;
  let period_before = latest_period(&registry, stale).await.unwrap();

  let report = registry.run_expiry_sweep().await.unwrap();
  assert_eq!(report.expired, vec![stale]);
  assert!(report.failed.is_empty());

  assert_eq!(status_of(&registry, stale).await, Some(AccreditationStatus::Expired));
  assert_eq!(status_of(&registry, fresh).await, Some(AccreditationStatus::Accredited));
  assert_eq!(latest_period(&registry, stale).await.unwrap(), period_before);

  let history = registry.history(stale).await.unwrap();
  assert_eq!(history[0].operation, AuditOperation::Expired);

  // Running again changes nothing.
  let again = registry.run_expiry_sweep().await.unwrap();
  assert!(again.expired.is_empty());

  // The fresh window closes exactly at start + 180 days.
  clock.set(t0() + Duration::days(180));
  let at_end = registry.run_expiry_sweep().await.unwrap();
  assert_eq!(at_end.expired, vec![fresh]);
}

// ─── Blacklist ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn blacklisting_unknown_person_creates_rejected_record() {
  let (registry, _) = registry().await;
  registry.queue_candidate(ivanov(), "queued").await.unwrap();

  let outcome = registry.toggle_blacklist(ivanov()).await.unwrap();
  let BlacklistOutcome::Created { person_id } = outcome else {
    panic!("expected creation, got {outcome:?}");
  };

  assert_eq!(status_of(&registry, person_id).await, Some(AccreditationStatus::Rejected));
  let period = latest_period(&registry, person_id).await.unwrap();
  assert!(period.blacklisted);
  assert_eq!(period.end, None);
  assert_eq!(candidate_count(&registry).await, 0);
  assert_eq!(registry.history(person_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn blacklisting_pending_person_without_period_opens_one() {
  let (registry, _) = registry().await;
  let id = register_pending(&registry, ivanov()).await;
  assert_eq!(latest_period(&registry, id).await, None);

  let outcome = registry.toggle_blacklist(ivanov()).await.unwrap();
  assert!(matches!(
    outcome,
    BlacklistOutcome::Blacklisted { person_id, previous: AccreditationStatus::Pending }
      if person_id == id
  ));

  assert_eq!(status_of(&registry, id).await, Some(AccreditationStatus::Rejected));
  let period = latest_period(&registry, id).await.unwrap();
  assert!(period.blacklisted);
  assert_eq!((period.start, period.end), (None, None));
  assert_eq!(DerivedStatus::derive(Some(&period), t0()), DerivedStatus::Blacklisted);
  assert_eq!(candidate_count(&registry).await, 0);

  let history = registry.history(id).await.unwrap();
  assert_eq!(history.len(), 2);
  assert_eq!(history[0].operation, AuditOperation::Blacklisted);
}

#[tokio::test]
async fn lifting_blacklist_over_active_window_restores_accreditation() {
  let (registry, _) = registry().await;
  let id = register_active(&registry, ivanov(), t0() - Duration::days(10)).await;

  let on = registry.toggle_blacklist(ivanov()).await.unwrap();
  assert!(matches!(
    on,
    BlacklistOutcome::Blacklisted { previous: AccreditationStatus::Accredited, .. }
  ));
  assert_eq!(status_of(&registry, id).await, Some(AccreditationStatus::Rejected));

  let off = registry.toggle_blacklist(ivanov()).await.unwrap();
  assert!(matches!(off, BlacklistOutcome::Restored { person_id } if person_id == id));

  assert_eq!(status_of(&registry, id).await, Some(AccreditationStatus::Accredited));
  let period = latest_period(&registry, id).await.unwrap();
  assert!(!period.blacklisted);
  assert_eq!(candidate_count(&registry).await, 0);
}

#[tokio::test]
async fn lifting_blacklist_without_window_demotes_to_holding_pool() {
  let (registry, _) = registry().await;
  let mut data = ivanov();
  data.notes = Some("escorted visits only".into());

  let BlacklistOutcome::Created { person_id } = registry.toggle_blacklist(data).await.unwrap()
  else {
    panic!("expected creation");
  };

  let off = registry.toggle_blacklist(ivanov()).await.unwrap();
  let BlacklistOutcome::Demoted {
    former_person_id,
    candidate_id,
  } = off
  else {
    panic!("expected demotion, got {off:?}");
  };
  assert_eq!(former_person_id, person_id);

  assert_eq!(status_of(&registry, person_id).await, None);
  assert_eq!(latest_period(&registry, person_id).await, None);

  let candidates = registry
    .store()
    .transact(|tx| tx.list_candidates())
    .await
    .unwrap();
  assert_eq!(candidates.len(), 1);
  assert_eq!(candidates[0].candidate_id, candidate_id);
  assert_eq!(candidates[0].data.notes.as_deref(), Some("escorted visits only"));
  assert_eq!(candidates[0].review_note, lifecycle::NOTE_RELEASED_FROM_BLACKLIST);

  // History survives the deletion of the record.
  let history = registry.history(person_id).await.unwrap();
  assert_eq!(history[0].operation, AuditOperation::Demoted);
  assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn failed_transaction_rolls_back_demotion() {
  let (registry, _) = registry().await;
  let BlacklistOutcome::Created { person_id } = registry.toggle_blacklist(ivanov()).await.unwrap()
  else {
    panic!("expected creation");
  };

  let now = t0();
  let data = ivanov();
  let result = registry
    .store()
    .transact(move |tx| {
      lifecycle::toggle_blacklist(tx, &data, now)?;
      Err::<(), _>(accred_core::Error::InvalidIdentity("abort".into()))
    })
    .await;
  assert!(result.is_err());

  assert_eq!(status_of(&registry, person_id).await, Some(AccreditationStatus::Rejected));
  assert!(latest_period(&registry, person_id).await.unwrap().blacklisted);
  assert_eq!(candidate_count(&registry).await, 0);
  assert_eq!(registry.history(person_id).await.unwrap().len(), 1);
}

// ─── Holding pool ────────────────────────────────────────────────────────────

#[tokio::test]
async fn queue_candidate_skips_known_identities() {
  let (registry, _) = registry().await;

  let first = registry.queue_candidate(ivanov(), "queued").await.unwrap();
  let QueueOutcome::Queued { candidate_id } = first else {
    panic!("expected queue, got {first:?}");
  };
  let second = registry.queue_candidate(ivanov(), "queued").await.unwrap();
  assert!(matches!(second, QueueOutcome::AlreadyQueued { candidate_id: c } if c == candidate_id));

  let id = register_pending(&registry, petrov()).await;
  let third = registry.queue_candidate(petrov(), "queued").await.unwrap();
  assert!(matches!(third, QueueOutcome::AlreadyRegistered { person_id } if person_id == id));

  assert_eq!(candidate_count(&registry).await, 1);
}

#[tokio::test]
async fn weekly_promotion_empties_the_pool() {
  let (registry, _) = registry().await;
  registry.queue_candidate(ivanov(), "queued").await.unwrap();
  registry.queue_candidate(petrov(), "queued").await.unwrap();

  // Register Petrov behind the queue's back so the candidate is stale.
  let now = t0();
  let existing = registry
    .store()
    .transact(move |tx| {
      lifecycle::register(
        tx,
        &petrov(),
        Registration::Pending,
        now,
        lifecycle::Policy::default(),
      )
    })
    .await
    .unwrap();
  let RegistrationOutcome::Registered { person_id: petrov_id } = existing else {
    panic!("expected registration");
  };

  let report = registry.run_weekly_promotion().await.unwrap();
  assert_eq!(report.promoted.len(), 1);
  assert_eq!(report.skipped.len(), 1);
  assert!(report.failed.is_empty());
  assert_eq!(candidate_count(&registry).await, 0);

  let promoted = report.promoted[0];
  assert_ne!(promoted, petrov_id);
  assert_eq!(status_of(&registry, promoted).await, Some(AccreditationStatus::Pending));
  assert_eq!(
    registry.history(promoted).await.unwrap()[0].operation,
    AuditOperation::Promoted
  );

  let again = registry.run_weekly_promotion().await.unwrap();
  assert!(again.promoted.is_empty() && again.skipped.is_empty());
}

// ─── Reads ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn search_is_case_insensitive_across_records_and_pool() {
  let (registry, _) = registry().await;
  let id = register_active(&registry, ivanov(), t0()).await;
  registry.queue_candidate(petrov(), "queued").await.unwrap();

  let hits = registry.search("иванОВ".into(), 50).await.unwrap();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].row.id, id);
  assert_eq!(hits[0].row.source, RecordSource::Person);
  assert_eq!(hits[0].derived, DerivedStatus::Active);

  let hits = registry.search("гпх".into(), 50).await.unwrap();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].row.source, RecordSource::Candidate);
  assert_eq!(hits[0].derived, DerivedStatus::NotFound);
  assert_eq!(hits[0].category, Category::CivilContract);

  let all = registry.search(String::new(), 50).await.unwrap();
  assert_eq!(all.len(), 2);

  let none = registry.search("100%".into(), 50).await.unwrap();
  assert!(none.is_empty());
}

#[tokio::test]
async fn notes_update_is_audited() {
  let (registry, clock) = registry().await;
  let id = register_pending(&registry, ivanov()).await;

  clock.advance(Duration::minutes(5));
  registry
    .update_notes(id, Some("  badge reissued ".into()))
    .await
    .unwrap();

  let person = registry
    .store()
    .transact(move |tx| tx.get_person(id))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(person.data.notes.as_deref(), Some("badge reissued"));

  let history = registry.history(id).await.unwrap();
  assert_eq!(history.len(), 2);
  assert_eq!(history[0].operation, AuditOperation::NotesUpdated);
  assert_eq!(history[1].operation, AuditOperation::Registered);

  let hits = registry.search("иванов".into(), 10).await.unwrap();
  assert!(hits[0].has_notes);
}

#[tokio::test]
async fn update_notes_for_unknown_person_fails() {
  let (registry, _) = registry().await;
  let err = registry
    .update_notes(Uuid::new_v4(), Some("x".into()))
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    crate::Error::Core(accred_core::Error::PersonNotFound(_))
  ));
}

#[tokio::test]
async fn pending_review_filters_by_category() {
  let (registry, _) = registry().await;
  register_pending(&registry, ivanov()).await;
  let civil = register_pending(&registry, petrov()).await;

  let all = registry.pending_review(None).await.unwrap();
  assert_eq!(all.len(), 2);

  let only_civil = registry
    .pending_review(Some(Category::CivilContract))
    .await
    .unwrap();
  assert_eq!(only_civil.len(), 1);
  assert_eq!(only_civil[0].person_id, civil);
}

#[tokio::test]
async fn open_file_store_persists_between_connections() {
  let dir = std::env::temp_dir().join(format!("accred-{}", Uuid::new_v4()));
  std::fs::create_dir_all(&dir).unwrap();
  let path = dir.join("accred.db");

  {
    let registry = Registry::new(Arc::new(SqliteStore::open(&path).await.unwrap()));
    register_pending(&registry, ivanov()).await;
  }

  let reopened = SqliteStore::open(&path).await.unwrap();
  let found = reopened
    .transact(|tx| tx.find_person(&ivanov().identity))
    .await
    .unwrap();
  assert!(found.is_some());
  reopened.close().await.unwrap();
  std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn concurrent_toggles_on_one_identity_apply_in_sequence() {
  let dir = std::env::temp_dir().join(format!("accred-{}", Uuid::new_v4()));
  std::fs::create_dir_all(&dir).unwrap();
  let path = dir.join("accred.db");

  // Two connections to one file, as with a server and a CLI run side by side.
  let clock = Arc::new(FixedClock::new(t0()));
  let first = Registry::new(Arc::new(SqliteStore::open(&path).await.unwrap()))
    .with_clock(clock.clone());
  let second =
    Registry::new(Arc::new(SqliteStore::open(&path).await.unwrap())).with_clock(clock);
  let id = register_pending(&first, ivanov()).await;

  let (a, b) = tokio::join!(first.toggle_blacklist(ivanov()), second.toggle_blacklist(ivanov()));
  let mut outcomes = [a.unwrap(), b.unwrap()];
  outcomes.sort_by_key(|o| matches!(o, BlacklistOutcome::Demoted { .. }));

  // Whichever ran first saw a pending person; the other saw the blacklist.
  assert!(matches!(
    outcomes[0],
    BlacklistOutcome::Blacklisted { person_id, previous: AccreditationStatus::Pending }
      if person_id == id
  ));
  assert!(matches!(
    outcomes[1],
    BlacklistOutcome::Demoted { former_person_id, .. } if former_person_id == id
  ));

  assert_eq!(status_of(&second, id).await, None);
  assert_eq!(latest_period(&second, id).await, None);
  assert_eq!(candidate_count(&first).await, 1);

  let operations: Vec<_> = first
    .history(id)
    .await
    .unwrap()
    .into_iter()
    .map(|entry| entry.operation)
    .collect();
  assert_eq!(operations, vec![
    AuditOperation::Demoted,
    AuditOperation::Blacklisted,
    AuditOperation::Registered,
  ]);

  drop((first, second));
  std::fs::remove_dir_all(&dir).ok();
}
