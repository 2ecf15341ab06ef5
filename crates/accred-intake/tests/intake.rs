//! End-to-end intake runs against an in-memory SQLite store.

mod common;

use std::{
  future::{Future, ready},
  io,
  sync::{Arc, Mutex},
  time::Duration,
};

use accred_core::{
  category::Category,
  lifecycle::Registration,
  registry::Registry,
  status::DerivedStatus,
  store::{AccreditationStore, StoreTx},
};
use accred_intake::{
  cancel::CancelToken,
  classify::{Bucket, BucketKind},
  matcher::MatchKind,
  pipeline::{Disposition, IntakeConfig, IntakePipeline, IntakeReport},
  review::{
    AutoReviewer, ConfirmationDecision, ConfirmationPrompt, Reviewer, UnmatchedAction,
    UnmatchedPrompt, review_channel,
  },
  tabular::{Column, INTAKE_COLUMNS, read_rows},
  validate::Problem,
};
use accred_store_sqlite::SqliteStore;
use tracing_subscriber::fmt::MakeWriter;
use common::{candidates, person, register, registry, t0};

const HEADER: &str = "surname,name,middle_name,birth_date,organization\n";

async fn ingest<R: Reviewer + 'static>(
  registry: &Registry<SqliteStore>,
  reviewer: R,
  body: &str,
) -> IntakeReport {
  let rows = read_rows(format!("{HEADER}{body}").as_bytes(), INTAKE_COLUMNS).unwrap();
  let config = IntakeConfig {
    workers: 2,
    ..Default::default()
  };
  IntakePipeline::new(registry.clone(), Arc::new(reviewer), config)
    .run(rows, &CancelToken::new())
    .await
    .unwrap()
}

#[tokio::test]
async fn identical_rows_queue_once() {
  let registry = registry().await;
  let report = ingest(
    &registry,
    AutoReviewer::reject_all(),
    "Ivanov,Ivan,Ivanovich,1985-05-01,OrgA\n\
     Ivanov,Ivan,Ivanovich,1985-05-01,OrgA\n",
  )
  .await;

  assert_eq!(report.rows.len(), 2);
  match &report.rows[0].disposition {
    Disposition::Classified {
      matched,
      status,
      bucket,
      queued,
      candidate_id,
      ..
    } => {
      assert_eq!(*matched, MatchKind::New);
      assert_eq!(*status, DerivedStatus::NotFound);
      assert_eq!(bucket.kind, BucketKind::NeedsReview);
      assert!(*queued);
      assert!(candidate_id.is_some());
    }
    other => panic!("expected classified row, got {other:?}"),
  }
  assert!(report.rows[0].problems.is_empty());
  assert!(matches!(
    report.rows[1].disposition,
    Disposition::DuplicateInBatch { first: 0 }
  ));

  assert_eq!(report.stats.passed, 1);
  assert_eq!(report.stats.duplicates, 1);
  assert_eq!(report.stats.queued, 1);
  assert_eq!(report.stats.buckets.get("needs_review/contractor"), Some(&1));

  let pool = candidates(&registry).await;
  assert_eq!(pool.len(), 1);
  assert_eq!(pool[0].data.identity.surname, "Ivanov");
  assert_eq!(pool[0].review_note, "queued from intake");
}

#[tokio::test]
async fn missing_required_field_rejects_the_row() {
  let registry = registry().await;
  let report = ingest(
    &registry,
    AutoReviewer::accept_all(),
    "Ivanov,Ivan,,1985-05-01,\n\
     Petrov,,,1990-01-15,ГПХ Петров\n",
  )
  .await;

  assert_eq!(report.stats.rejected, 2);
  assert_eq!(report.stats.suspicious, 0);
  assert!(report.rows[0].problems.contains(&Problem::Missing {
    column: Column::Organization,
  }));
  match &report.rows[1].disposition {
    Disposition::Rejected { bucket } => {
      assert_eq!(bucket.kind, BucketKind::Rejected);
      assert_eq!(bucket.category, Category::CivilContract);
    }
    other => panic!("expected rejection, got {other:?}"),
  }
  assert!(candidates(&registry).await.is_empty());
}

#[tokio::test]
async fn suspicious_rows_wait_for_the_reviewer() {
  let body = "Ivanov1,Ivan,,1985-05-01,OrgA\n";

  let registry_a = registry().await;
  let accepted = ingest(&registry_a, AutoReviewer::accept_all(), body).await;
  assert_eq!(accepted.stats.suspicious, 1);
  assert_eq!(accepted.stats.queued, 1);
  assert_eq!(candidates(&registry_a).await[0].data.identity.surname, "Ivanov");

  let registry_b = registry().await;
  let (reviewer, desk) = review_channel(1, Duration::from_millis(50));
  drop(desk);
  let unanswered = ingest(&registry_b, reviewer, body).await;
  assert!(matches!(
    unanswered.rows[0].disposition,
    Disposition::Unconfirmed { .. }
  ));
  assert_eq!(unanswered.stats.rejected, 1);
  assert!(candidates(&registry_b).await.is_empty());
}

#[tokio::test]
async fn consecutive_birth_dates_need_confirmation() {
  let registry = registry().await;
  let report = ingest(
    &registry,
    AutoReviewer::reject_all(),
    "Ivanov,Ivan,,1999-01-01,OrgA\n\
     Petrov,Petr,,1999-01-02,OrgA\n\
     Sidorov,Sidor,,1999-01-03,OrgA\n",
  )
  .await;

  assert_eq!(report.stats.suspicious, 3);
  assert_eq!(report.stats.rejected, 3);
  assert!(
    report.rows[2]
      .problems
      .contains(&Problem::SequentialDates { first: 0, last: 2 })
  );
}

#[tokio::test]
async fn known_people_are_bucketed_not_queued() {
  let registry = registry().await;
  register(
    &registry,
    person("Ivanov", "Ivan", None, "1985-05-01"),
    Registration::Active { start: t0() },
  )
  .await;
  registry
    .toggle_blacklist(person("Petrov", "Petr", None, "1970-02-02"))
    .await
    .unwrap();
  registry
    .queue_candidate(person("Sidorov", "Sidor", None, "1991-07-07"), "manual")
    .await
    .unwrap();

  let report = ingest(
    &registry,
    AutoReviewer::reject_all(),
    "Ivanov,Ivan,,1985-05-01,OrgA\n\
     Petrov,Petr,,1970-02-02,OrgA\n\
     Sidorov,Sidor,,1991-07-07,OrgA\n",
  )
  .await;

  let kinds: Vec<_> = report
    .rows
    .iter()
    .map(|row| match &row.disposition {
      Disposition::Classified {
        matched,
        bucket,
        queued,
        ..
      } => (*matched, bucket.kind, *queued),
      other => panic!("expected classified row, got {other:?}"),
    })
    .collect();
  assert_eq!(kinds, vec![
    (MatchKind::InPersonRecords, BucketKind::PreviouslyCleared, false),
    (MatchKind::InPersonRecords, BucketKind::PreviouslyRejected, false),
    (MatchKind::InHoldingPool, BucketKind::NeedsReview, false),
  ]);
  assert_eq!(candidates(&registry).await.len(), 1);
}

#[tokio::test]
async fn cancelled_batch_stops_between_rows() {
  let registry = registry().await;
  let rows = read_rows(
    format!("{HEADER}Ivanov,Ivan,,1985-05-01,OrgA\n").as_bytes(),
    INTAKE_COLUMNS,
  )
  .unwrap();
  let cancel = CancelToken::new();
  cancel.cancel();

  let pipeline = IntakePipeline::new(
    registry.clone(),
    Arc::new(AutoReviewer::accept_all()),
    IntakeConfig::default(),
  );
  let report = pipeline.spawn(rows, cancel).await.unwrap().unwrap();

  assert!(report.cancelled);
  assert!(report.rows.is_empty());
  assert!(candidates(&registry).await.is_empty());
}

#[tokio::test]
async fn unanswered_confirmation_times_out_and_the_batch_goes_on() {
  let registry = registry().await;
  let (reviewer, mut desk) = review_channel(1, Duration::from_millis(50));
  // A desk that takes every request and never answers.
  let desk_task = tokio::spawn(async move {
    let mut held = Vec::new();
    while let Some(request) = desk.next().await {
      held.push(request);
    }
    held.len()
  });

  let report = ingest(
    &registry,
    reviewer,
    "Ivanov1,Ivan,,1985-05-01,OrgA
     Petrov,Petr,,1990-01-15,OrgA
",
  )
  .await;

  assert!(matches!(
    report.rows[0].disposition,
    Disposition::Unconfirmed { .. }
  ));
  assert!(matches!(
    report.rows[1].disposition,
    Disposition::Classified { queued: true, .. }
  ));
  assert_eq!(report.stats.rejected, 1);
  assert_eq!(report.stats.queued, 1);
  assert_eq!(desk_task.await.unwrap(), 1);

  let pool = candidates(&registry).await;
  assert_eq!(pool.len(), 1);
  assert_eq!(pool[0].data.identity.surname, "Petrov");
}

// ── Store failures ──────────────────────────────────────────────────────────

/// A store whose every transaction fails.
struct OfflineStore;

impl AccreditationStore for OfflineStore {
  type Error = io::Error;

  fn transact<T, F>(&self, _f: F) -> impl Future<Output = Result<T, Self::Error>> + Send + '_
  where
    T: Send + 'static,
    F: FnOnce(&mut dyn StoreTx) -> accred_core::Result<T> + Send + 'static,
  {
    ready(Err(io::Error::other("store offline")))
  }
}

/// Confirms everything and remembers the suggestion it was shown.
#[derive(Default)]
struct RecordingReviewer {
  suggestions: Mutex<Vec<Option<Bucket>>>,
}

impl Reviewer for RecordingReviewer {
  async fn confirm(&self, prompt: ConfirmationPrompt) -> ConfirmationDecision {
    self.suggestions.lock().unwrap().push(prompt.suggested);
    ConfirmationDecision::Confirmed
  }

  async fn resolve_unmatched(&self, _prompt: UnmatchedPrompt) -> UnmatchedAction {
    UnmatchedAction::Skip
  }
}

#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
  fn text(&self) -> String { String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned() }
}

impl io::Write for CapturedLogs {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    self.0.lock().unwrap().extend_from_slice(buf);
    Ok(buf.len())
  }

  fn flush(&mut self) -> io::Result<()> { Ok(()) }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
  type Writer = CapturedLogs;

  fn make_writer(&'a self) -> Self::Writer { self.clone() }
}

#[tokio::test]
async fn store_failures_are_logged_and_fail_only_their_rows() {
  let logs = CapturedLogs::default();
  let subscriber = tracing_subscriber::fmt()
    .with_writer(logs.clone())
    .with_ansi(false)
    .finish();
  let _guard = tracing::subscriber::set_default(subscriber);

  let rows = read_rows(
    format!("{HEADER}Ivanov1,Ivan,,1985-05-01,OrgA
Petrov,Petr,,1990-01-15,OrgA
").as_bytes(),
    INTAKE_COLUMNS,
  )
  .unwrap();
  let reviewer = Arc::new(RecordingReviewer::default());
  let registry = Registry::new(Arc::new(OfflineStore));
  let report = IntakePipeline::new(registry, reviewer.clone(), IntakeConfig::default())
    .run(rows, &CancelToken::new())
    .await
    .unwrap();

  assert_eq!(*reviewer.suggestions.lock().unwrap(), vec![None]);
  assert_eq!(report.rows.len(), 2);
  for row in &report.rows {
    assert!(matches!(&row.disposition, Disposition::Failed { reason } if reason.contains("store offline")));
  }
  assert_eq!(report.stats.failed, 2);

  let text = logs.text();
  assert!(text.contains("lookup for suggestion failed"), "{text}");
  assert!(text.contains("store offline"), "{text}");
}
