//! MongoDB backend for the roster student store.
//!
//! Student documents live in the `students` collection, trash snapshots in
//! `students_trash`. Query translation is kept in [`filter`] so it can be
//! tested without a server.

pub mod error;
pub mod filter;
mod store;

pub use error::{Error, Result};
pub use store::{MongoSettings, MongoStore};
