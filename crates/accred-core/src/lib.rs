//! Core types and trait definitions for the accreditation registry.
//!
//! This crate is free of HTTP, spreadsheet and database dependencies. It owns
//! the person identity model, the derived-status rules, the store contract and
//! the lifecycle state machine. Every other crate in the workspace builds on
//! it.

pub mod category;
pub mod clock;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod record;
pub mod registry;
pub mod status;
pub mod store;

pub use error::{Error, Result};
