//! Core types and reconciliation logic for the roster student store.
//!
//! No HTTP or database-driver dependencies. Student documents are carried as
//! [`bson::Document`]s, since their set of fields is open; grouping, merging
//! and the trash ledger are plain transformations over them. Backends
//! implement [`store::StudentStore`].

// Store implementations use `async fn`; the trait spells out the `Send`
// bounds itself.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod group;
pub mod memory;
pub mod merge;
pub mod normalize;
pub mod ops;
pub mod record;
pub mod report;
pub mod similar;
pub mod store;
pub mod trash;
pub mod update;

pub use error::{Error, Result};

#[cfg(test)]
mod tests;
