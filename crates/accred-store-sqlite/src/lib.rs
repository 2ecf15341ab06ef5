//! SQLite backend for the accreditation registry.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every [`transact`] call is one
//! `BEGIN IMMEDIATE` transaction on that thread.
//!
//! [`transact`]: accred_core::store::AccreditationStore::transact

mod encode;
mod queries;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
