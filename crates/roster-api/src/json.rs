//! Conversion between request JSON and BSON documents.
//!
//! Request bodies may use extended JSON (`{"$oid": ...}`, `{"$date": ...}`);
//! responses are rendered as relaxed extended JSON.

use axum::Json;
use bson::{Bson, Document, oid::ObjectId};
use roster_core::record::StudentRecord;
use serde::Serialize;
use serde_json::Value;

use crate::error::ApiError;

/// Parse a path id.
pub fn object_id(raw: &str) -> Result<ObjectId, ApiError> {
  ObjectId::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("invalid id: {raw:?}")))
}

/// A JSON request body that must be an object.
pub fn document(value: Value) -> Result<Document, ApiError> {
  match Bson::try_from(value) {
    Ok(Bson::Document(doc)) => {
      if let Some(key) = doc.keys().find(|k| k.starts_with('$')) {
        return Err(ApiError::BadRequest(format!("field name {key:?} is not allowed")));
      }
      Ok(doc)
    }
    Ok(_) => Err(ApiError::BadRequest("expected a JSON object".into())),
    Err(e) => Err(ApiError::BadRequest(e.to_string())),
  }
}

pub fn record(record: &StudentRecord) -> Json<Value> { Json(record.to_json()) }

/// Any serialisable value, rendered through BSON so ids and dates come out
/// as relaxed extended JSON.
pub fn relaxed<T: Serialize>(value: &T) -> Result<Json<Value>, ApiError> {
  let bson = bson::to_bson(value).map_err(ApiError::store)?;
  Ok(Json(bson.into_relaxed_extjson()))
}
