//! Handlers for the blacklist toggle and the periodic sweeps.
//!
//! The sweeps are the same entry points the scheduler calls; exposing them
//! lets an operator run one on demand.

use std::sync::Arc;

use accred_core::{
  identity::PersonData,
  lifecycle::BlacklistOutcome,
  registry::{Registry, SweepReport, WeeklyPromotionReport},
  store::AccreditationStore,
};
use accred_intake::normalize::normalize_person;
use axum::{Json, extract::State};

use crate::error::ApiError;

/// `POST /blacklist/toggle`, body: a person record
/// (`{"surname":..,"name":..,"birth_date":"YYYY-MM-DD",..}`).
///
/// Names are normalized the same way intake rows are before the lookup.
pub async fn toggle_blacklist<S>(
  State(registry): State<Arc<Registry<S>>>,
  Json(data): Json<PersonData>,
) -> Result<Json<BlacklistOutcome>, ApiError>
where
  S: AccreditationStore,
{
  let data = normalize_person(data).map_err(|e| ApiError::BadRequest(e.to_string()))?;

  let outcome = registry
    .toggle_blacklist(data)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(outcome))
}

/// `POST /sweeps/expiry`
pub async fn expiry_sweep<S>(
  State(registry): State<Arc<Registry<S>>>,
) -> Result<Json<SweepReport>, ApiError>
where
  S: AccreditationStore,
{
  let report = registry.run_expiry_sweep().await.map_err(ApiError::store)?;
  Ok(Json(report))
}

/// `POST /sweeps/weekly-promotion`
pub async fn weekly_promotion<S>(
  State(registry): State<Arc<Registry<S>>>,
) -> Result<Json<WeeklyPromotionReport>, ApiError>
where
  S: AccreditationStore,
{
  let report = registry
    .run_weekly_promotion()
    .await
    .map_err(ApiError::store)?;
  Ok(Json(report))
}
