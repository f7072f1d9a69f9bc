//! The trash ledger: bulk soft-delete with restorable snapshots.
//!
//! Trashing copies each selected document into a separate collection as a
//! [`TrashEntry`] and then flags the original `_deleted`. Restoring only flips
//! flags on the original; the snapshot is never written back and the entry is
//! never removed, so restoring twice is harmless.

use std::{collections::BTreeSet, fmt, str::FromStr};

use bson::{DateTime, Document, doc, oid::ObjectId};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  normalize::casefold,
  record::{ClassFields, StudentRecord, fields},
  update::UpdateOp,
};

/// Fields removed from an original when it is restored.
pub const DELETION_METADATA: &[&str] = &[
  fields::DELETED_AT,
  fields::DELETED_BY,
  fields::DELETED_REASON,
  fields::TRASH_ID,
];

/// A full snapshot of a trashed student document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrashEntry {
  #[serde(rename = "_id")]
  pub id:          ObjectId,
  pub original_id: ObjectId,
  pub snapshot:    Document,
  pub reason:      String,
  pub trashed_at:  DateTime,
  pub trashed_by:  String,
}

// ─── Selection ───────────────────────────────────────────────────────────────

/// Case-insensitive set of class values to trash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSelector {
  /// As given, for the reason string.
  classes:    Vec<String>,
  normalized: BTreeSet<String>,
}

impl ClassSelector {
  pub fn new<I, S>(classes: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    let classes: Vec<String> = classes
      .into_iter()
      .map(|c| c.as_ref().trim().to_owned())
      .filter(|c| !c.is_empty())
      .collect();
    let normalized = classes.iter().map(|c| casefold(c)).collect();
    Self { classes, normalized }
  }

  pub fn is_empty(&self) -> bool { self.classes.is_empty() }

  pub fn matches(&self, record: &StudentRecord, class_fields: &ClassFields) -> bool {
    record
      .class(class_fields)
      .is_some_and(|c| self.normalized.contains(&casefold(c)))
  }

  /// `trash-by-class: A,o,V,W,w`
  pub fn reason(&self) -> String { format!("trash-by-class: {}", self.classes.join(",")) }
}

impl Default for ClassSelector {
  /// The placeholder classes left behind by spreadsheet imports.
  fn default() -> Self { Self::new(["A", "o", "V", "W", "w"]) }
}

impl FromStr for ClassSelector {
  type Err = std::convert::Infallible;

  /// Comma-separated class list.
  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> { Ok(Self::new(s.split(','))) }
}

impl fmt::Display for ClassSelector {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.classes.join(","))
  }
}

// ─── Trash ───────────────────────────────────────────────────────────────────

/// The two write batches of a trash run.
#[derive(Debug, Clone, Default)]
pub struct TrashPlan {
  pub entries:    Vec<TrashEntry>,
  pub tombstones: Vec<UpdateOp>,
}

impl TrashPlan {
  pub fn len(&self) -> usize { self.entries.len() }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

/// Snapshot every record and prepare the tombstone that links the original to
/// its entry.
pub fn plan_trash<'a, I>(records: I, reason: &str, actor: &str, at: DateTime) -> TrashPlan
where
  I: IntoIterator<Item = &'a StudentRecord>,
{
  let mut plan = TrashPlan::default();
  for record in records {
    let entry = TrashEntry {
      id:          ObjectId::new(),
      original_id: record.id(),
      snapshot:    record.document().clone(),
      reason:      reason.to_owned(),
      trashed_at:  at,
      trashed_by:  actor.to_owned(),
    };
    plan.tombstones.push(UpdateOp::set(
      record.id(),
      doc! {
        fields::DELETED:        true,
        fields::DELETED_AT:     at,
        fields::DELETED_BY:     actor,
        fields::DELETED_REASON: reason,
        fields::TRASH_ID:       entry.id,
      },
    ));
    plan.entries.push(entry);
  }
  plan
}

// ─── Restore ─────────────────────────────────────────────────────────────────

/// Which trash entries to restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreQuery {
  Reason(String),
  Ids(Vec<ObjectId>),
}

impl RestoreQuery {
  /// Parse `reason=<text>` or `ids=<id>,<id>,...` command-line arguments.
  /// `reason` takes precedence when both are given.
  pub fn from_args<I, S>(args: I) -> Result<Self>
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    let mut reason = None;
    let mut ids = None;
    for arg in args {
      match arg.as_ref().split_once('=') {
        Some(("reason", value)) => reason = Some(value.to_owned()),
        Some(("ids", value)) => ids = Some(value.to_owned()),
        _ => {
          return Err(Error::InvalidRestoreQuery(format!(
            "unexpected argument {:?}",
            arg.as_ref()
          )));
        }
      }
    }

    if let Some(reason) = reason {
      return Ok(Self::Reason(reason));
    }
    match ids {
      Some(ids) => Self::parse_ids(ids.split(',')),
      None => Err(Error::InvalidRestoreQuery("expected reason=... or ids=...".into())),
    }
  }

  pub fn parse_ids<I, S>(ids: I) -> Result<Self>
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    let ids = ids
      .into_iter()
      .map(|s| s.as_ref().trim().to_owned())
      .filter(|s| !s.is_empty())
      .map(|s| {
        ObjectId::parse_str(&s)
          .map_err(|_| Error::InvalidRestoreQuery(format!("not an ObjectId: {s:?}")))
      })
      .collect::<Result<Vec<_>>>()?;
    if ids.is_empty() {
      return Err(Error::InvalidRestoreQuery("empty id list".into()));
    }
    Ok(Self::Ids(ids))
  }

  pub fn matches(&self, entry: &TrashEntry) -> bool {
    match self {
      Self::Reason(reason) => &entry.reason == reason,
      Self::Ids(ids) => ids.contains(&entry.id),
    }
  }
}

/// Clear the deletion flags of a trashed original.
pub fn restore_update(original_id: ObjectId) -> UpdateOp {
  UpdateOp::set(original_id, doc! { fields::DELETED: false })
    .unsetting(DELETION_METADATA.iter().copied())
}

// ─── Single-record soft delete ───────────────────────────────────────────────

/// Flag one record deleted without a trash snapshot.
pub fn soft_delete_update(id: ObjectId, at: DateTime) -> UpdateOp {
  UpdateOp::set(
    id,
    doc! {
      fields::DELETED:    true,
      fields::DELETED_AT: at,
      fields::UPDATED_AT: at,
    },
  )
}

/// Undo a soft delete of one record.
pub fn undelete_update(id: ObjectId, at: DateTime) -> UpdateOp {
  UpdateOp::set(
    id,
    doc! {
      fields::DELETED:    false,
      fields::UPDATED_AT: at,
    },
  )
  .unsetting(DELETION_METADATA.iter().copied())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn record(doc: Document) -> StudentRecord {
    let mut doc = doc;
    doc.insert("_id", ObjectId::new());
    StudentRecord::from_document(doc).unwrap()
  }

  #[test]
  fn selector_is_case_insensitive_and_trims() {
    let fields = ClassFields::default();
    let selector: ClassSelector = "A, w ,".parse().unwrap();
    assert_eq!(selector.reason(), "trash-by-class: A,w");

    assert!(selector.matches(&record(doc! { "25/26": " a " }), &fields));
    assert!(selector.matches(&record(doc! { "Klasse 25/26": "W" }), &fields));
    assert!(!selector.matches(&record(doc! { "25/26": "3a" }), &fields));
    assert!(!selector.matches(&record(doc! { "Vorname": "Anna" }), &fields));
  }

  #[test]
  fn default_selector_reason() {
    assert_eq!(ClassSelector::default().reason(), "trash-by-class: A,o,V,W,w");
  }

  #[test]
  fn plan_links_tombstones_to_entries() {
    let records = vec![record(doc! { "Vorname": "A" }), record(doc! { "Vorname": "B" })];
    let at = DateTime::now();
    let plan = plan_trash(&records, "cleanup", "script:test", at);

    assert_eq!(plan.len(), 2);
    for ((entry, tombstone), record) in plan.entries.iter().zip(&plan.tombstones).zip(&records) {
      assert_eq!(entry.original_id, record.id());
      assert_eq!(&entry.snapshot, record.document());
      assert_eq!(tombstone.id, record.id());
      assert_eq!(tombstone.set.get_object_id("_trashId").unwrap(), entry.id);
      assert_eq!(tombstone.set.get_str("deletedReason").unwrap(), "cleanup");
    }
  }

  #[test]
  fn trash_entry_uses_wire_field_names() {
    let entry = TrashEntry {
      id:          ObjectId::new(),
      original_id: ObjectId::new(),
      snapshot:    doc! { "Vorname": "A" },
      reason:      "r".into(),
      trashed_at:  DateTime::now(),
      trashed_by:  "me".into(),
    };
    let d = bson::to_document(&entry).unwrap();
    for key in ["_id", "originalId", "snapshot", "reason", "trashedAt", "trashedBy"] {
      assert!(d.contains_key(key), "missing {key}");
    }
    let back: TrashEntry = bson::from_document(d).unwrap();
    assert_eq!(back, entry);
  }

  #[test]
  fn restore_args() {
    assert_eq!(
      RestoreQuery::from_args(["reason=trash-by-class: A,o"]).unwrap(),
      RestoreQuery::Reason("trash-by-class: A,o".into())
    );

    let id = ObjectId::new();
    assert_eq!(
      RestoreQuery::from_args([format!("ids={id}, ")]).unwrap(),
      RestoreQuery::Ids(vec![id])
    );

    assert!(RestoreQuery::from_args(Vec::<String>::new()).is_err());
    assert!(RestoreQuery::from_args(["ids=nope"]).is_err());
    assert!(RestoreQuery::from_args(["verbose"]).is_err());
  }

  #[test]
  fn restore_update_clears_metadata() {
    let op = restore_update(ObjectId::new());
    assert_eq!(op.set, doc! { "_deleted": false });
    assert_eq!(op.unset, vec!["deletedAt", "deletedBy", "deletedReason", "_trashId"]);
  }
}
