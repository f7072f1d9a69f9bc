//! [`MemoryStore`]: an in-process implementation of [`StudentStore`].
//!
//! Query semantics come from [`StudentQuery::matches`], so this store is the
//! reference the database backends are checked against. It also enforces the
//! partial unique constraint on string `NormBenutzername` values.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bson::{Bson, Document, oid::ObjectId};

use crate::{
  Error, Result,
  record::{StudentRecord, fields},
  store::{StudentQuery, StudentStore},
  trash::{RestoreQuery, TrashEntry},
  update::{BulkOutcome, UpdateOp},
};

#[derive(Default)]
struct Inner {
  students: Vec<Document>,
  trash:    Vec<TrashEntry>,
  writes:   u64,
}

impl Inner {
  fn position(&self, id: ObjectId) -> Option<usize> {
    self
      .students
      .iter()
      .position(|d| d.get_object_id(fields::ID).ok() == Some(id))
  }

  fn check_unique(&self, doc: &Document, skip: Option<usize>) -> Result<()> {
    let Ok(norm) = doc.get_str(fields::NORM_USERNAME) else {
      return Ok(());
    };
    let taken = self
      .students
      .iter()
      .enumerate()
      .filter(|(i, _)| Some(*i) != skip)
      .any(|(_, d)| d.get_str(fields::NORM_USERNAME).ok() == Some(norm));
    if taken {
      return Err(Error::DuplicateUsername(norm.to_owned()));
    }
    Ok(())
  }

  /// Returns `(matched, modified)`.
  fn apply(&mut self, op: &UpdateOp) -> Result<(bool, bool)> {
    let Some(pos) = self.position(op.id) else {
      return Ok((false, false));
    };
    let mut next = self.students[pos].clone();
    let changed = op.apply_to(&mut next);
    if changed {
      self.check_unique(&next, Some(pos))?;
      self.students[pos] = next;
      self.writes += 1;
    }
    Ok((true, changed))
  }
}

fn sort_key(doc: &Document) -> (String, String) {
  let s = |key| doc.get_str(key).unwrap_or_default().to_owned();
  (s(fields::FAMILY_NAME), s(fields::GIVEN_NAME))
}

/// A student store held entirely in memory.
///
/// Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
  inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
  pub fn new() -> Self { Self::default() }

  /// A store pre-filled with `docs`. Documents without an `_id` get one.
  pub fn with_documents<I>(docs: I) -> Result<Self>
  where
    I: IntoIterator<Item = Document>,
  {
    let store = Self::new();
    {
      let mut inner = store.lock();
      for doc in docs {
        let doc = with_id(doc);
        inner.check_unique(&doc, None)?;
        inner.students.push(doc);
      }
    }
    Ok(store)
  }

  fn lock(&self) -> MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Number of student documents, deleted ones included.
  pub fn len(&self) -> usize { self.lock().students.len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }

  /// Number of trash entries.
  pub fn trash_len(&self) -> usize { self.lock().trash.len() }

  /// Number of write operations that changed something.
  pub fn writes(&self) -> u64 { self.lock().writes }

  /// Every stored student document, in insertion order.
  pub fn documents(&self) -> Vec<Document> { self.lock().students.clone() }

  /// Remove a document outright, bypassing the soft-delete model.
  pub fn purge(&self, id: ObjectId) -> bool {
    let mut inner = self.lock();
    match inner.position(id) {
      Some(pos) => {
        inner.students.remove(pos);
        inner.writes += 1;
        true
      }
      None => false,
    }
  }
}

fn with_id(doc: Document) -> Document {
  if matches!(doc.get(fields::ID), Some(Bson::ObjectId(_))) {
    return doc;
  }
  let mut out = Document::new();
  out.insert(fields::ID, ObjectId::new());
  out.extend(doc.into_iter().filter(|(k, _)| k != fields::ID));
  out
}

// ─── StudentStore impl ───────────────────────────────────────────────────────

impl StudentStore for MemoryStore {
  type Error = Error;

  async fn find(&self, query: &StudentQuery) -> Result<Vec<StudentRecord>> {
    let mut docs: Vec<Document> = self
      .lock()
      .students
      .iter()
      .filter(|d| query.matches(d))
      .cloned()
      .collect();
    docs.sort_by_key(sort_key);

    docs
      .into_iter()
      .skip(query.skip.unwrap_or(0))
      .take(query.limit.unwrap_or(usize::MAX))
      .map(StudentRecord::from_document)
      .collect()
  }

  async fn count(&self, query: &StudentQuery) -> Result<u64> {
    let inner = self.lock();
    Ok(inner.students.iter().filter(|d| query.matches(d)).count() as u64)
  }

  async fn get(&self, id: ObjectId) -> Result<Option<StudentRecord>> {
    let inner = self.lock();
    inner
      .position(id)
      .map(|pos| StudentRecord::from_document(inner.students[pos].clone()))
      .transpose()
  }

  async fn insert(&self, doc: Document) -> Result<StudentRecord> {
    let doc = with_id(doc);
    let mut inner = self.lock();
    inner.check_unique(&doc, None)?;
    inner.students.push(doc.clone());
    inner.writes += 1;
    StudentRecord::from_document(doc)
  }

  async fn update(&self, op: UpdateOp) -> Result<Option<StudentRecord>> {
    let mut inner = self.lock();
    let (matched, _) = inner.apply(&op)?;
    if !matched {
      return Ok(None);
    }
    let pos = inner.position(op.id).ok_or(Error::StudentNotFound(op.id))?;
    StudentRecord::from_document(inner.students[pos].clone()).map(Some)
  }

  async fn apply_updates(&self, ops: Vec<UpdateOp>) -> Result<BulkOutcome> {
    let mut inner = self.lock();
    let mut outcome = BulkOutcome::default();
    for op in &ops {
      match inner.apply(op) {
        Ok((matched, modified)) => {
          outcome.matched += u64::from(matched);
          outcome.modified += u64::from(modified);
        }
        Err(e) => {
          tracing::warn!(id = %op.id, error = %e, "update rejected");
          outcome.matched += 1;
          outcome.failed += 1;
        }
      }
    }
    Ok(outcome)
  }

  async fn clear_blank_usernames(&self) -> Result<u64> {
    let mut inner = self.lock();
    let mut modified = 0;
    for doc in inner.students.iter_mut() {
      if doc.get_str(fields::USERNAME).ok() == Some("") {
        doc.insert(fields::USERNAME, Bson::Null);
        modified += 1;
      }
    }
    inner.writes += modified;
    Ok(modified)
  }

  async fn insert_trash(&self, entries: Vec<TrashEntry>) -> Result<u64> {
    let mut inner = self.lock();
    let n = entries.len() as u64;
    inner.trash.extend(entries);
    inner.writes += n;
    Ok(n)
  }

  async fn find_trash(&self, query: &RestoreQuery) -> Result<Vec<TrashEntry>> {
    let inner = self.lock();
    let mut entries: Vec<TrashEntry> =
      inner.trash.iter().filter(|e| query.matches(e)).cloned().collect();
    entries.sort_by_key(|e| e.trashed_at);
    Ok(entries)
  }
}
