//! JSON REST API for the roster student store.
//!
//! Exposes an axum [`Router`] backed by any [`roster_core::store::StudentStore`].
//! Auth, TLS, and transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", roster_api::api_router(store.clone(), run_config))
//! ```

pub mod error;
pub mod json;
pub mod students;
pub mod trash;

use std::sync::Arc;

use axum::{
  Json, Router,
  routing::{get, post},
};
use roster_core::{ops::RunConfig, store::StudentStore};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Shared state threaded through all handlers.
pub struct AppState<S> {
  pub store:  Arc<S>,
  /// School year class fields and the actor recorded on deletions.
  pub config: RunConfig,
}

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>, config: RunConfig) -> Router<()>
where
  S: StudentStore + 'static,
{
  let state = Arc::new(AppState { store, config });
  Router::new()
    // Students
    .route("/students", get(students::list::<S>).post(students::create::<S>))
    .route(
      "/students/{id}",
      get(students::get_one::<S>)
        .patch(students::patch::<S>)
        .delete(students::delete::<S>),
    )
    .route("/students/{id}/restore", post(students::restore_one::<S>))
    // Trash
    .route("/trash", get(trash::list::<S>))
    .route("/trash/restore", post(trash::restore::<S>))
    .route("/duplicates", get(trash::duplicates::<S>))
    .route("/health", get(health))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

/// `GET /health`
async fn health() -> Json<Value> { Json(json!({ "ok": true })) }
