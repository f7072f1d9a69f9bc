//! Handlers for the trash ledger and the duplicate report.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/trash` | `?reason=` required |
//! | `POST` | `/trash/restore` | Body: `{"reason":"..."}` or `{"ids":["..."]}` |
//! | `GET`  | `/duplicates` | Optional `?limit=`, default 20 |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
};
use roster_core::{
  ops,
  report::DEFAULT_LIMIT,
  store::StudentStore,
  trash::RestoreQuery,
};
use serde::Deserialize;
use serde_json::Value;

use crate::{AppState, error::ApiError, json::relaxed};

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub reason: Option<String>,
}

/// `GET /trash?reason=<reason>`
pub async fn list<S>(
  State(state): State<Arc<AppState<S>>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Value>, ApiError>
where
  S: StudentStore,
{
  let reason = params
    .reason
    .ok_or_else(|| ApiError::BadRequest("reason is required".into()))?;
  let entries = state
    .store
    .find_trash(&RestoreQuery::Reason(reason))
    .await
    .map_err(ApiError::store)?;
  relaxed(&entries)
}

/// Body of `POST /trash/restore`. `reason` wins when both are present.
#[derive(Debug, Deserialize)]
pub struct RestoreBody {
  pub reason: Option<String>,
  pub ids:    Option<Vec<String>>,
}

impl RestoreBody {
  pub fn into_query(self) -> Result<RestoreQuery, ApiError> {
    if let Some(reason) = self.reason {
      return Ok(RestoreQuery::Reason(reason));
    }
    let ids = self
      .ids
      .ok_or_else(|| ApiError::BadRequest("expected reason or ids".into()))?;
    RestoreQuery::parse_ids(ids).map_err(|e| ApiError::BadRequest(e.to_string()))
  }
}

/// `POST /trash/restore`
pub async fn restore<S>(
  State(state): State<Arc<AppState<S>>>,
  Json(body): Json<RestoreBody>,
) -> Result<Json<Value>, ApiError>
where
  S: StudentStore,
{
  let query = body.into_query()?;
  let summary = ops::restore(state.store.as_ref(), &query)
    .await
    .map_err(ApiError::store)?;
  relaxed(&summary)
}

#[derive(Debug, Deserialize)]
pub struct DuplicateParams {
  pub limit: Option<usize>,
}

/// `GET /duplicates[?limit=<n>]`
pub async fn duplicates<S>(
  State(state): State<Arc<AppState<S>>>,
  Query(params): Query<DuplicateParams>,
) -> Result<Json<Value>, ApiError>
where
  S: StudentStore,
{
  let report = ops::check_duplicates(
    state.store.as_ref(),
    &state.config,
    params.limit.unwrap_or(DEFAULT_LIMIT),
  )
  .await
  .map_err(ApiError::store)?;
  relaxed(&report)
}
