//! Handlers for `/people` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/people` | Optional `?q=<text>&limit=<n>` |
//! | `GET`  | `/people/pending` | Optional `?category=civil_contract\|contractor` |
//! | `GET`  | `/people/{id}/history` | Newest first |
//! | `PUT`  | `/people/{id}/notes` | Body: `{"notes":"..."}` or `{"notes":null}` |
//! | `POST` | `/people/{id}/promote` | Optional `?effective=<rfc3339>`; 404 if unknown |

use std::sync::Arc;

use accred_core::{
  category::Category,
  lifecycle::PromotionOutcome,
  record::{AuditEntry, PersonRecord},
  registry::{PersonSummary, Registry},
  store::{AccreditationStore, PersonKey},
};
use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

pub const DEFAULT_SEARCH_LIMIT: usize = 50;

// ─── Search ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct SearchParams {
  /// Substring of surname, name, middle name or organization.
  pub q:     Option<String>,
  pub limit: Option<usize>,
}

/// `GET /people[?q=...][&limit=...]`
pub async fn search<S>(
  State(registry): State<Arc<Registry<S>>>,
  Query(params): Query<SearchParams>,
) -> Result<Json<Vec<PersonSummary>>, ApiError>
where
  S: AccreditationStore,
{
  let hits = registry
    .search(
      params.q.unwrap_or_default(),
      params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT),
    )
    .await
    .map_err(ApiError::store)?;
  Ok(Json(hits))
}

// ─── Recheck list ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PendingParams {
  pub category: Option<Category>,
}

/// `GET /people/pending[?category=...]`
pub async fn pending<S>(
  State(registry): State<Arc<Registry<S>>>,
  Query(params): Query<PendingParams>,
) -> Result<Json<Vec<PersonRecord>>, ApiError>
where
  S: AccreditationStore,
{
  let people = registry
    .pending_review(params.category)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(people))
}

// ─── History ──────────────────────────────────────────────────────────────────

/// `GET /people/{id}/history`
pub async fn history<S>(
  State(registry): State<Arc<Registry<S>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<AuditEntry>>, ApiError>
where
  S: AccreditationStore,
{
  let entries = registry.history(id).await.map_err(ApiError::store)?;
  Ok(Json(entries))
}

// ─── Notes ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct NotesBody {
  pub notes: Option<String>,
}

/// `PUT /people/{id}/notes`
pub async fn update_notes<S>(
  State(registry): State<Arc<Registry<S>>>,
  Path(id): Path<Uuid>,
  Json(body): Json<NotesBody>,
) -> Result<StatusCode, ApiError>
where
  S: AccreditationStore,
{
  registry
    .update_notes(id, body.notes)
    .await
    .map_err(ApiError::store)?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Promote ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PromoteParams {
  /// Window start; defaults to now.
  pub effective: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct PromoteResponse {
  pub message: String,
  #[serde(flatten)]
  pub outcome: PromotionOutcome,
}

/// `POST /people/{id}/promote[?effective=...]`
///
/// A person who is not pending gets `200` with `"outcome":"unchanged"`.
pub async fn promote<S>(
  State(registry): State<Arc<Registry<S>>>,
  Path(id): Path<Uuid>,
  Query(params): Query<PromoteParams>,
) -> Result<Json<PromoteResponse>, ApiError>
where
  S: AccreditationStore,
{
  let outcome = registry
    .promote(PersonKey::Id(id), params.effective)
    .await
    .map_err(ApiError::store)?;
  if let PromotionOutcome::NotFound = outcome {
    return Err(ApiError::NotFound(format!("person {id} not found")));
  }
  Ok(Json(PromoteResponse {
    message: outcome.message(),
    outcome,
  }))
}
