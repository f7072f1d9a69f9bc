//! Error type for `roster-store-mongo`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] roster_core::Error),

  #[error("database error: {0}")]
  Mongo(#[from] mongodb::error::Error),

  /// A server reply lacked a field the driver contract promises.
  #[error("unexpected server reply: {0}")]
  Reply(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
