//! The `StudentStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `roster-store-mongo`
//! and [`crate::memory::MemoryStore`]). The operations in [`crate::ops`] and
//! the HTTP layer depend on this abstraction, not on any concrete backend.

use std::future::Future;

use bson::{Bson, Document, oid::ObjectId};

use crate::{
  normalize::casefold,
  record::{ClassFields, StudentRecord, fields},
  trash::{RestoreQuery, TrashEntry},
  update::{BulkOutcome, UpdateOp},
};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Restriction on the class fields of a school year.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ClassFilter {
  #[default]
  Any,
  /// Either class field holds a string.
  Present(ClassFields),
  /// Either class field equals the value exactly.
  Equals(ClassFields, String),
}

/// Parameters for [`StudentStore::find`] and [`StudentStore::count`].
///
/// The default query matches every active record.
#[derive(Debug, Clone, Default)]
pub struct StudentQuery {
  /// Also return records flagged `_deleted`.
  pub include_deleted:  bool,
  /// Only records without a string `NormBenutzername`.
  pub without_username: bool,
  /// `(given, family)`, compared trimmed and case-insensitively.
  pub name:             Option<(String, String)>,
  /// Every token must occur (case-insensitive substring) in one of
  /// [`StudentQuery::text_fields`].
  pub text:             Vec<String>,
  /// Restrict text tokens to the given and family name.
  pub names_only:       bool,
  pub class:            ClassFilter,
  /// Case-insensitive exact element of `Angebote`.
  pub offering:         Option<String>,
  pub limit:            Option<usize>,
  pub skip:             Option<usize>,
}

impl StudentQuery {
  /// Active records that have not been assigned a normalised username yet.
  pub fn dedup_candidates() -> Self {
    Self { without_username: true, ..Self::default() }
  }

  /// Dedup candidates with the given name.
  pub fn by_name(given: &str, family: &str) -> Self {
    Self {
      name: Some((given.to_owned(), family.to_owned())),
      ..Self::dedup_candidates()
    }
  }

  /// Active records with a string value in either class field.
  pub fn with_class(class_fields: ClassFields) -> Self {
    Self { class: ClassFilter::Present(class_fields), ..Self::default() }
  }

  /// Split a free-text search into tokens.
  pub fn with_text(mut self, text: &str) -> Self {
    self.text = text.split_whitespace().map(str::to_owned).collect();
    self
  }

  pub fn text_fields(&self) -> &'static [&'static str] {
    if self.names_only {
      &[fields::GIVEN_NAME, fields::FAMILY_NAME]
    } else {
      &[fields::GIVEN_NAME, fields::FAMILY_NAME, fields::USERNAME]
    }
  }

  /// Evaluate the query against one document. Backends that cannot push the
  /// query down use this; others must agree with it.
  pub fn matches(&self, doc: &Document) -> bool {
    let str_of = |key: &str| match doc.get(key) {
      Some(Bson::String(s)) => Some(s.as_str()),
      _ => None,
    };

    if !self.include_deleted && matches!(doc.get(fields::DELETED), Some(Bson::Boolean(true))) {
      return false;
    }
    if self.without_username && str_of(fields::NORM_USERNAME).is_some() {
      return false;
    }
    if let Some((given, family)) = &self.name {
      let same = |key: &str, want: &str| str_of(key).is_some_and(|v| casefold(v) == casefold(want));
      if !same(fields::GIVEN_NAME, given) || !same(fields::FAMILY_NAME, family) {
        return false;
      }
    }
    for token in &self.text {
      let token = token.to_lowercase();
      let hit = self
        .text_fields()
        .iter()
        .any(|key| str_of(key).is_some_and(|v| v.to_lowercase().contains(&token)));
      if !hit {
        return false;
      }
    }
    match &self.class {
      ClassFilter::Any => {}
      ClassFilter::Present(cf) => {
        if str_of(&cf.canonical).is_none() && str_of(&cf.display).is_none() {
          return false;
        }
      }
      ClassFilter::Equals(cf, value) => {
        if str_of(&cf.canonical) != Some(value.as_str()) && str_of(&cf.display) != Some(value.as_str()) {
          return false;
        }
      }
    }
    if let Some(offering) = &self.offering {
      let want = offering.to_lowercase();
      let has = match doc.get(fields::OFFERINGS) {
        Some(Bson::Array(items)) => items
          .iter()
          .any(|i| i.as_str().is_some_and(|s| s.to_lowercase() == want)),
        Some(Bson::String(s)) => s.to_lowercase() == want,
        _ => false,
      };
      if !has {
        return false;
      }
    }
    true
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a student store backend.
///
/// Records are never hard-deleted through this trait: deletion is expressed
/// as updates that set `_deleted`, and trashing copies snapshots into a
/// separate ledger.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait StudentStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Records matching `query`, sorted by family name then given name.
  fn find<'a>(
    &'a self,
    query: &'a StudentQuery,
  ) -> impl Future<Output = Result<Vec<StudentRecord>, Self::Error>> + Send + 'a;

  /// Number of records matching `query`, ignoring `limit` and `skip`.
  fn count<'a>(
    &'a self,
    query: &'a StudentQuery,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  /// Retrieve a record by id, deleted or not. Returns `None` if not found.
  fn get(
    &self,
    id: ObjectId,
  ) -> impl Future<Output = Result<Option<StudentRecord>, Self::Error>> + Send + '_;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Insert a new document. An `_id` is assigned when missing.
  fn insert(
    &self,
    doc: Document,
  ) -> impl Future<Output = Result<StudentRecord, Self::Error>> + Send + '_;

  /// Apply one update and return the document as it is afterwards, or `None`
  /// if no document has that id.
  fn update(
    &self,
    op: UpdateOp,
  ) -> impl Future<Output = Result<Option<StudentRecord>, Self::Error>> + Send + '_;

  /// Apply a batch of updates unordered: a failing update does not prevent
  /// the others from applying.
  fn apply_updates(
    &self,
    ops: Vec<UpdateOp>,
  ) -> impl Future<Output = Result<BulkOutcome, Self::Error>> + Send + '_;

  /// Replace blank `Benutzername` strings with `null`. Returns the number of
  /// modified records.
  fn clear_blank_usernames(&self) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Trash ledger ──────────────────────────────────────────────────────

  /// Store trash entries. Returns the number inserted.
  fn insert_trash(
    &self,
    entries: Vec<TrashEntry>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Trash entries matching `query`, oldest first.
  fn find_trash<'a>(
    &'a self,
    query: &'a RestoreQuery,
  ) -> impl Future<Output = Result<Vec<TrashEntry>, Self::Error>> + Send + 'a;
}

#[cfg(test)]
mod tests {
  use bson::doc;

  use super::*;

  #[test]
  fn default_query_hides_deleted() {
    let q = StudentQuery::default();
    assert!(q.matches(&doc! { "Vorname": "A" }));
    assert!(q.matches(&doc! { "Vorname": "A", "_deleted": false }));
    assert!(!q.matches(&doc! { "Vorname": "A", "_deleted": true }));

    let q = StudentQuery { include_deleted: true, ..StudentQuery::default() };
    assert!(q.matches(&doc! { "Vorname": "A", "_deleted": true }));
  }

  #[test]
  fn dedup_candidates_lack_string_username() {
    let q = StudentQuery::dedup_candidates();
    assert!(q.matches(&doc! { "Vorname": "A" }));
    assert!(q.matches(&doc! { "Vorname": "A", "NormBenutzername": null }));
    assert!(!q.matches(&doc! { "Vorname": "A", "NormBenutzername": "a" }));
  }

  #[test]
  fn name_match_is_trimmed_and_case_insensitive() {
    let q = StudentQuery::by_name("anna", "MUSTER");
    assert!(q.matches(&doc! { "Vorname": " Anna", "Familienname": "Muster " }));
    assert!(!q.matches(&doc! { "Vorname": "Anna-Lena", "Familienname": "Muster" }));
  }

  #[test]
  fn text_tokens_are_anded() {
    let q = StudentQuery::default().with_text("ann must");
    assert!(q.matches(&doc! { "Vorname": "Anna", "Familienname": "Muster" }));
    assert!(!q.matches(&doc! { "Vorname": "Anna", "Familienname": "Meier" }));

    let q = StudentQuery::default().with_text("amuster");
    assert!(q.matches(&doc! { "Vorname": "Anna", "Benutzername": "amuster" }));
    let q = StudentQuery { names_only: true, ..q };
    assert!(!q.matches(&doc! { "Vorname": "Anna", "Benutzername": "amuster" }));
  }

  #[test]
  fn class_and_offering_filters() {
    let cf = ClassFields::default();
    let q = StudentQuery::with_class(cf.clone());
    assert!(q.matches(&doc! { "Klasse 25/26": "" }));
    assert!(!q.matches(&doc! { "25/26": null }));

    let q = StudentQuery { class: ClassFilter::Equals(cf, "3a".into()), ..StudentQuery::default() };
    assert!(q.matches(&doc! { "Klasse 25/26": "3a" }));
    assert!(!q.matches(&doc! { "Klasse 25/26": "3b" }));

    let q = StudentQuery { offering: Some("chor".into()), ..StudentQuery::default() };
    assert!(q.matches(&doc! { "Angebote": ["Theater", "Chor"] }));
    assert!(!q.matches(&doc! { "Angebote": ["Chorleitung"] }));
  }
}
