//! Handlers for `/students` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/students` | `?q`, `only_names`, `klasse`, `angebot`, `include_deleted`, `limit`, `skip` |
//! | `POST`   | `/students` | Body: any JSON object; returns 201 + stored document |
//! | `GET`    | `/students/{id}` | 404 if not found, deleted records included |
//! | `PATCH`  | `/students/{id}` | Body: fields to set |
//! | `DELETE` | `/students/{id}` | Soft delete |
//! | `POST`   | `/students/{id}/restore` | Undo a soft delete |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use bson::{Bson, DateTime, Document};
use roster_core::{
  normalize::{normalize_username, prefix},
  record::{ClassFields, fields},
  store::{ClassFilter, StudentQuery, StudentStore},
  trash::{soft_delete_update, undelete_update},
  update::UpdateOp,
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
  AppState,
  error::ApiError,
  json::{document, object_id, record},
};

pub const DEFAULT_LIMIT: usize = 50;
pub const MAX_LIMIT: usize = 200;

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  /// Whitespace-separated tokens, all of which must match.
  pub q:               Option<String>,
  /// Search tokens in the given and family name only.
  #[serde(default)]
  pub only_names:      bool,
  pub klasse:          Option<String>,
  pub angebot:         Option<String>,
  #[serde(default)]
  pub include_deleted: bool,
  pub limit:           Option<usize>,
  pub skip:            Option<usize>,
}

impl ListParams {
  fn to_query(&self, class_fields: &ClassFields) -> StudentQuery {
    let non_empty = |v: &Option<String>| {
      v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned)
    };

    let mut query = StudentQuery {
      include_deleted: self.include_deleted,
      names_only: self.only_names,
      offering: non_empty(&self.angebot),
      limit: Some(self.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT)),
      skip: self.skip,
      ..StudentQuery::default()
    };
    if let Some(class) = non_empty(&self.klasse) {
      query.class = ClassFilter::Equals(class_fields.clone(), class);
    }
    if let Some(q) = &self.q {
      query = query.with_text(q);
    }
    query
  }
}

/// `GET /students`
pub async fn list<S>(
  State(state): State<Arc<AppState<S>>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Value>, ApiError>
where
  S: StudentStore,
{
  let query = params.to_query(&state.config.class_fields);
  let total = state.store.count(&query).await.map_err(ApiError::store)?;
  let items: Vec<Value> = state
    .store
    .find(&query)
    .await
    .map_err(ApiError::store)?
    .iter()
    .map(|r| r.to_json())
    .collect();
  Ok(Json(json!({ "total": total, "items": items })))
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// The `NormBenutzername` for a username value; blank usernames get none.
fn norm_username(value: Option<&Bson>) -> Bson {
  match value {
    Some(Bson::String(s)) if !s.trim().is_empty() => Bson::String(normalize_username(s)),
    _ => Bson::Null,
  }
}

/// `POST /students`
pub async fn create<S>(
  State(state): State<Arc<AppState<S>>>,
  Json(body): Json<Value>,
) -> Result<impl IntoResponse, ApiError>
where
  S: StudentStore,
{
  let mut doc = document(body)?;
  doc.remove(fields::ID);
  let now = DateTime::now();
  doc.insert(fields::CREATED_AT, now);
  doc.insert(fields::UPDATED_AT, now);
  if doc.contains_key(fields::USERNAME) {
    let norm = norm_username(doc.get(fields::USERNAME));
    doc.insert(fields::NORM_USERNAME, norm);
  }

  let created = state.store.insert(doc).await.map_err(ApiError::store)?;
  tracing::info!(id = %created.id(), "student created");
  Ok((StatusCode::CREATED, record(&created)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /students/{id}`
pub async fn get_one<S>(
  State(state): State<Arc<AppState<S>>>,
  Path(id): Path<String>,
) -> Result<Json<Value>, ApiError>
where
  S: StudentStore,
{
  let id = object_id(&id)?;
  let found = state
    .store
    .get(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("student {id} not found")))?;
  Ok(record(&found))
}

// ─── Patch ────────────────────────────────────────────────────────────────────

/// Turn a PATCH body into the `$set` document.
pub fn patch_set(mut body: Document, class_fields: &ClassFields, now: DateTime) -> Document {
  body.remove(fields::ID);
  body.remove(fields::CREATED_AT);

  if let Some(raw) = body.get(&class_fields.display) {
    let class = match raw {
      Bson::String(s) => s.trim().to_owned(),
      Bson::Null => String::new(),
      other => other.to_string(),
    };
    body.insert(class_fields.display.clone(), class.clone());
    body.insert(class_fields.canonical.clone(), class);
  }

  if matches!(body.get(fields::PASSWORD), Some(Bson::String(s)) if s.trim().is_empty()) {
    body.remove(fields::PASSWORD);
  }

  let short_birth_date = match body.get(fields::BIRTH_DATE) {
    Some(Bson::String(s)) if s.chars().count() >= 10 => Some(prefix(s, 10).to_owned()),
    _ => None,
  };
  if let Some(date) = short_birth_date {
    body.insert(fields::BIRTH_DATE, date);
  }

  if body.contains_key(fields::USERNAME) {
    let norm = norm_username(body.get(fields::USERNAME));
    body.insert(fields::NORM_USERNAME, norm);
  }

  body.insert(fields::UPDATED_AT, now);
  body
}

/// `PATCH /students/{id}`
pub async fn patch<S>(
  State(state): State<Arc<AppState<S>>>,
  Path(id): Path<String>,
  Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError>
where
  S: StudentStore,
{
  let id = object_id(&id)?;
  let set = patch_set(document(body)?, &state.config.class_fields, DateTime::now());
  let updated = state
    .store
    .update(UpdateOp::set(id, set))
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("student {id} not found")))?;
  Ok(record(&updated))
}

// ─── Soft delete / restore ────────────────────────────────────────────────────

/// `DELETE /students/{id}`
pub async fn delete<S>(
  State(state): State<Arc<AppState<S>>>,
  Path(id): Path<String>,
) -> Result<Json<Value>, ApiError>
where
  S: StudentStore,
{
  let id = object_id(&id)?;
  let deleted = state
    .store
    .update(soft_delete_update(id, DateTime::now()))
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("student {id} not found")))?;
  tracing::info!(%id, "student soft-deleted");
  Ok(record(&deleted))
}

/// `POST /students/{id}/restore`
pub async fn restore_one<S>(
  State(state): State<Arc<AppState<S>>>,
  Path(id): Path<String>,
) -> Result<Json<Value>, ApiError>
where
  S: StudentStore,
{
  let id = object_id(&id)?;
  let restored = state
    .store
    .update(undelete_update(id, DateTime::now()))
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("student {id} not found")))?;
  tracing::info!(%id, "student restored");
  Ok(record(&restored))
}

#[cfg(test)]
mod tests {
  use bson::doc;

  use super::*;

  #[test]
  fn patch_syncs_class_and_cleans_body() {
    let cf = ClassFields::default();
    let now = DateTime::now();
    let set = patch_set(
      doc! {
        "_id": "x", "createdAt": "y",
        "Klasse 25/26": " 3b ", "Passwort": "  ",
        "Geburtsdatum": "2012-05-01 00:00:00",
        "Benutzername": " AMuster ",
      },
      &cf,
      now,
    );

    assert!(!set.contains_key("_id"));
    assert!(!set.contains_key("createdAt"));
    assert!(!set.contains_key("Passwort"));
    assert_eq!(set.get_str("Klasse 25/26").unwrap(), "3b");
    assert_eq!(set.get_str("25/26").unwrap(), "3b");
    assert_eq!(set.get_str("Geburtsdatum").unwrap(), "2012-05-01");
    assert_eq!(set.get_str("NormBenutzername").unwrap(), "amuster");
    assert_eq!(set.get_datetime("updatedAt").unwrap(), &now);
  }

  #[test]
  fn patch_empty_class_clears_both() {
    let set = patch_set(doc! { "Klasse 25/26": null }, &ClassFields::default(), DateTime::now());
    assert_eq!(set.get_str("Klasse 25/26").unwrap(), "");
    assert_eq!(set.get_str("25/26").unwrap(), "");
  }

  #[test]
  fn patch_keeps_short_birth_date_and_real_password() {
    let set = patch_set(
      doc! { "Geburtsdatum": "2012", "Passwort": "geheim" },
      &ClassFields::default(),
      DateTime::now(),
    );
    assert_eq!(set.get_str("Geburtsdatum").unwrap(), "2012");
    assert_eq!(set.get_str("Passwort").unwrap(), "geheim");
    assert!(!set.contains_key("NormBenutzername"));
  }

  #[test]
  fn list_params_clamp_limit() {
    let cf = ClassFields::default();
    let q = ListParams { limit: Some(1000), ..ListParams::default() }.to_query(&cf);
    assert_eq!(q.limit, Some(MAX_LIMIT));
    let q = ListParams::default().to_query(&cf);
    assert_eq!(q.limit, Some(DEFAULT_LIMIT));
    let q = ListParams { klasse: Some(" 3a ".into()), ..ListParams::default() }.to_query(&cf);
    assert_eq!(q.class, ClassFilter::Equals(cf, "3a".into()));
  }
}
