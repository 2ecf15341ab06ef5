//! Cooperative cancellation for long-running batches.

use std::sync::{
  Arc,
  atomic::{AtomicBool, Ordering},
};

/// Checked between rows; a row that has started always finishes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
  cancelled: Arc<AtomicBool>,
}

impl CancelToken {
  pub fn new() -> Self { Self::default() }

  pub fn cancel(&self) { self.cancelled.store(true, Ordering::SeqCst); }

  pub fn is_cancelled(&self) -> bool { self.cancelled.load(Ordering::SeqCst) }
}
