//! Error types for `roster-core`.

use bson::oid::ObjectId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("document has no ObjectId `_id`")]
  MissingId,

  #[error("student not found: {0}")]
  StudentNotFound(ObjectId),

  #[error("normalised username {0:?} is already taken")]
  DuplicateUsername(String),

  #[error("invalid restore arguments: {0}")]
  InvalidRestoreQuery(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
