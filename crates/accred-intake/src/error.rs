//! Batch-level errors for `accred-intake`.
//!
//! Row-level problems never surface here; they are reported per row in the
//! intake and activation reports.

use thiserror::Error;

use crate::tabular::Column;

#[derive(Debug, Error)]
pub enum Error {
  #[error("csv error: {0}")]
  Csv(#[from] csv::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("input has no {0} column")]
  MissingColumn(Column),

  #[error("normalization worker failed: {0}")]
  Join(#[from] tokio::task::JoinError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
