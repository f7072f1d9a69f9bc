//! Write operations against a single student document.

use bson::{Bson, Document, doc, oid::ObjectId};
use serde::Serialize;

/// A `$set` / `$unset` update addressed to one document by `_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOp {
  pub id:    ObjectId,
  pub set:   Document,
  pub unset: Vec<String>,
}

impl UpdateOp {
  pub fn set(id: ObjectId, set: Document) -> Self {
    Self { id, set, unset: Vec::new() }
  }

  pub fn unsetting<I, S>(mut self, keys: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.unset.extend(keys.into_iter().map(Into::into));
    self
  }

  pub fn is_noop(&self) -> bool { self.set.is_empty() && self.unset.is_empty() }

  /// The update document in MongoDB operator form. Empty operators are
  /// omitted; the server rejects `{"$unset": {}}`.
  pub fn to_update_document(&self) -> Document {
    let mut update = Document::new();
    if !self.set.is_empty() {
      update.insert("$set", self.set.clone());
    }
    if !self.unset.is_empty() {
      let unset: Document = self
        .unset
        .iter()
        .map(|k| (k.clone(), Bson::String(String::new())))
        .collect();
      update.insert("$unset", unset);
    }
    update
  }

  /// Apply the update to an in-memory document. Returns whether anything
  /// changed.
  pub fn apply_to(&self, target: &mut Document) -> bool {
    let mut changed = false;
    for (k, v) in &self.set {
      if target.get(k) != Some(v) {
        target.insert(k.clone(), v.clone());
        changed = true;
      }
    }
    for k in &self.unset {
      changed |= target.remove(k).is_some();
    }
    changed
  }

  /// The `_id` filter this update targets.
  pub fn filter(&self) -> Document { doc! { "_id": self.id } }
}

/// Aggregate result of an unordered batch of updates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BulkOutcome {
  /// Updates whose filter matched a document.
  pub matched:  u64,
  /// Updates that changed the matched document.
  pub modified: u64,
  /// Updates the server rejected. The rest of the batch still applied.
  pub failed:   u64,
}

impl std::ops::AddAssign for BulkOutcome {
  fn add_assign(&mut self, rhs: Self) {
    self.matched += rhs.matched;
    self.modified += rhs.modified;
    self.failed += rhs.failed;
  }
}
