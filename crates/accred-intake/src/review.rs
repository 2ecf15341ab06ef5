//! The human side of intake.
//!
//! A background batch never polls for answers. It sends a [`ReviewRequest`]
//! carrying a oneshot reply slot over a bounded channel and awaits the reply.
//! Whoever holds the [`ReviewDesk`] (a terminal, a web session) answers each
//! request once. A reply that does not arrive within the timeout, or a desk
//! that has gone away, resolves to the safe default: `Unconfirmed` for
//! suspicious rows, `Skip` for unknown persons in an activation file.

use std::{future::Future, time::Duration};

use accred_core::identity::PersonData;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::{classify::Bucket, normalize::NormalizedRow, validate::Problem};

// ─── Prompts and answers ─────────────────────────────────────────────────────

/// A row with soft problems, waiting for a human to accept or reject it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationPrompt {
  pub row:       NormalizedRow,
  pub problems:  Vec<Problem>,
  /// Where the row would land if confirmed.
  pub suggested: Option<Bucket>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationDecision {
  Confirmed,
  Rejected,
  /// No answer in time.
  Unconfirmed,
}

/// An activation-file row naming a person the registry does not know.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnmatchedPrompt {
  pub row:  usize,
  pub data: PersonData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedAction {
  Skip,
  /// Register straight away as accredited.
  Activate,
  /// Put into the holding pool.
  Queue,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

pub trait Reviewer: Send + Sync {
  fn confirm(
    &self,
    prompt: ConfirmationPrompt,
  ) -> impl Future<Output = ConfirmationDecision> + Send + '_;

  fn resolve_unmatched(
    &self,
    prompt: UnmatchedPrompt,
  ) -> impl Future<Output = UnmatchedAction> + Send + '_;
}

/// Answers every prompt the same way. Used for unattended runs.
#[derive(Debug, Clone, Copy)]
pub struct AutoReviewer {
  pub confirm:   ConfirmationDecision,
  pub unmatched: UnmatchedAction,
}

impl AutoReviewer {
  pub fn accept_all() -> Self {
    Self {
      confirm:   ConfirmationDecision::Confirmed,
      unmatched: UnmatchedAction::Queue,
    }
  }

  pub fn reject_all() -> Self {
    Self {
      confirm:   ConfirmationDecision::Rejected,
      unmatched: UnmatchedAction::Skip,
    }
  }
}

impl Reviewer for AutoReviewer {
  async fn confirm(&self, _prompt: ConfirmationPrompt) -> ConfirmationDecision { self.confirm }

  async fn resolve_unmatched(&self, _prompt: UnmatchedPrompt) -> UnmatchedAction { self.unmatched }
}

// ─── Channel bridge ──────────────────────────────────────────────────────────

/// A prompt plus the slot its answer goes into.
#[derive(Debug)]
pub struct PendingReview<P, A> {
  pub prompt: P,
  reply:      oneshot::Sender<A>,
}

impl<P, A> PendingReview<P, A> {
  /// Send the answer back. Returns `false` if the batch stopped waiting.
  pub fn answer(self, answer: A) -> bool {
    let delivered = self.reply.send(answer).is_ok();
    if !delivered {
      tracing::debug!("review answered after the batch stopped waiting");
    }
    delivered
  }
}

#[derive(Debug)]
pub enum ReviewRequest {
  Confirm(PendingReview<ConfirmationPrompt, ConfirmationDecision>),
  Unmatched(PendingReview<UnmatchedPrompt, UnmatchedAction>),
}

/// Create a connected reviewer and desk. At most `capacity` requests queue up
/// before the batch waits; each request waits at most `timeout` overall.
pub fn review_channel(capacity: usize, timeout: Duration) -> (ChannelReviewer, ReviewDesk) {
  let (tx, rx) = mpsc::channel(capacity.max(1));
  (ChannelReviewer { tx, timeout }, ReviewDesk { rx })
}

/// The batch's end of the bridge.
#[derive(Debug, Clone)]
pub struct ChannelReviewer {
  tx:      mpsc::Sender<ReviewRequest>,
  timeout: Duration,
}

impl ChannelReviewer {
  async fn ask<P, A>(
    &self,
    prompt: P,
    wrap: fn(PendingReview<P, A>) -> ReviewRequest,
  ) -> Option<A>
  where
    P: Send,
    A: Send,
  {
    let (reply, answer) = oneshot::channel();
    let request = wrap(PendingReview { prompt, reply });
    let exchange = async {
      self.tx.send(request).await.ok()?;
      answer.await.ok()
    };
    match tokio::time::timeout(self.timeout, exchange).await {
      Ok(answer) => answer,
      Err(_) => {
        tracing::warn!(timeout = ?self.timeout, "review timed out");
        None
      }
    }
  }
}

impl Reviewer for ChannelReviewer {
  async fn confirm(&self, prompt: ConfirmationPrompt) -> ConfirmationDecision {
    let row = prompt.row.index;
    self.ask(prompt, ReviewRequest::Confirm).await.unwrap_or_else(|| {
      tracing::warn!(row, "no confirmation received, row left unconfirmed");
      ConfirmationDecision::Unconfirmed
    })
  }

  async fn resolve_unmatched(&self, prompt: UnmatchedPrompt) -> UnmatchedAction {
    let row = prompt.row;
    self.ask(prompt, ReviewRequest::Unmatched).await.unwrap_or_else(|| {
      tracing::warn!(row, "no decision for unknown person, skipping");
      UnmatchedAction::Skip
    })
  }
}

/// The human's end of the bridge.
#[derive(Debug)]
pub struct ReviewDesk {
  rx: mpsc::Receiver<ReviewRequest>,
}

impl ReviewDesk {
  /// Next request, or `None` once every reviewer handle is gone.
  pub async fn next(&mut self) -> Option<ReviewRequest> { self.rx.recv().await }

  /// Blocking variant for a desk driven from a plain thread.
  pub fn blocking_next(&mut self) -> Option<ReviewRequest> { self.rx.blocking_recv() }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn prompt(index: usize) -> ConfirmationPrompt {
    ConfirmationPrompt {
      row:       NormalizedRow {
        index,
        ..Default::default()
      },
      problems:  vec![],
      suggested: None,
    }
  }

  #[tokio::test]
  async fn desk_answers_reach_the_batch() {
    let (reviewer, mut desk) = review_channel(4, Duration::from_secs(5));
    let desk_task = tokio::spawn(async move {
      while let Some(request) = desk.next().await {
        match request {
          ReviewRequest::Confirm(pending) => {
            let decision = if pending.prompt.row.index == 0 {
              ConfirmationDecision::Confirmed
            } else {
              ConfirmationDecision::Rejected
            };
            assert!(pending.answer(decision));
          }
          ReviewRequest::Unmatched(pending) => {
            pending.answer(UnmatchedAction::Queue);
          }
        }
      }
    });

    assert_eq!(reviewer.confirm(prompt(0)).await, ConfirmationDecision::Confirmed);
    assert_eq!(reviewer.confirm(prompt(1)).await, ConfirmationDecision::Rejected);
    drop(reviewer);
    desk_task.await.unwrap();
  }

  #[tokio::test]
  async fn silence_means_unconfirmed() {
    let (reviewer, mut desk) = review_channel(4, Duration::from_millis(50));
    // Hold the request without answering it.
    let holder = tokio::spawn(async move { desk.next().await });

    assert_eq!(reviewer.confirm(prompt(0)).await, ConfirmationDecision::Unconfirmed);
    let held = holder.await.unwrap();
    assert!(matches!(held, Some(ReviewRequest::Confirm(_))));
  }

  #[tokio::test]
  async fn missing_desk_means_unconfirmed_and_skip() {
    let (reviewer, desk) = review_channel(1, Duration::from_secs(5));
    drop(desk);
    assert_eq!(reviewer.confirm(prompt(0)).await, ConfirmationDecision::Unconfirmed);

    let data = PersonData::new(accred_core::identity::PersonIdentity::new(
      "Ivanov",
      "Ivan",
      None,
      chrono::NaiveDate::from_ymd_opt(1985, 5, 1).unwrap(),
    ));
    let action = reviewer.resolve_unmatched(UnmatchedPrompt { row: 0, data }).await;
    assert_eq!(action, UnmatchedAction::Skip);
  }
}
