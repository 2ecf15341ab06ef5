//! JSON REST API for the accreditation registry.
//!
//! Exposes an axum [`Router`] backed by a [`Registry`] over any
//! [`AccreditationStore`]. Auth and TLS are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", accred_api::api_router(registry.clone()))
//! ```

pub mod admin;
pub mod error;
pub mod people;

use std::sync::Arc;

use accred_core::{registry::Registry, store::AccreditationStore};
use axum::{
  Router,
  routing::{get, post, put},
};
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Build a fully-materialised API router for `registry`.
pub fn api_router<S>(registry: Registry<S>) -> Router<()>
where
  S: AccreditationStore + 'static,
{
  Router::new()
    // People
    .route("/people", get(people::search::<S>))
    .route("/people/pending", get(people::pending::<S>))
    .route("/people/{id}/history", get(people::history::<S>))
    .route("/people/{id}/notes", put(people::update_notes::<S>))
    .route("/people/{id}/promote", post(people::promote::<S>))
    // Admin
    .route("/blacklist/toggle", post(admin::toggle_blacklist::<S>))
    .route("/sweeps/expiry", post(admin::expiry_sweep::<S>))
    .route("/sweeps/weekly-promotion", post(admin::weekly_promotion::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(Arc::new(registry))
}
