//! Batch intake for the accreditation registry.
//!
//! Pipeline:
//!   spreadsheet rows (csv)
//!     └─ tabular::read_rows()      → Vec<RawRow>
//!          └─ normalize            → NormalizedRow      (sharded, parallel)
//!               └─ validate        → Vec<Problem>, Verdict
//!                    └─ review     → confirm suspicious rows with a human
//!                         └─ matcher  → in-batch duplicates, store matches
//!                              └─ classify → Bucket; new rows join the holding pool
//!
//! [`activation`] runs the companion flow for activation files: promote the
//! listed pending persons and ask the reviewer what to do with unknown ones.

pub mod activation;
pub mod cancel;
pub mod classify;
pub mod error;
pub mod matcher;
pub mod normalize;
pub mod pipeline;
pub mod review;
pub mod tabular;
pub mod validate;

pub use error::{Error, Result};
