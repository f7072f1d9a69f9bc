//! Winner selection and field merging within a duplicate group.
//!
//! The record with the most populated fields wins. Every other member (a
//! loser) contributes only what the winner lacks: empty winner fields are
//! filled and arrays are unioned. A populated winner value is never
//! overwritten. Losers are tombstoned with a pointer to the winner rather than
//! deleted.

use std::cmp::Ordering;

use bson::{Bson, DateTime, Document, doc, oid::ObjectId};

use crate::{
  group::DuplicateGroup,
  record::{ClassFields, StudentRecord, fields, is_bookkeeping, is_empty},
  update::UpdateOp,
};

/// Keys that cannot be written with a plain `$set` path.
fn is_unsafe_path(key: &str) -> bool { key.contains('.') || key.starts_with('$') }

fn is_mergeable(key: &str) -> bool { !is_bookkeeping(key) && !is_unsafe_path(key) }

// ─── Scoring ─────────────────────────────────────────────────────────────────

/// Number of populated non-bookkeeping fields, plus 0.5 when the record
/// carries an `updatedAt`.
pub fn score(record: &StudentRecord) -> f64 {
  let populated = record
    .document()
    .iter()
    .filter(|(k, v)| !is_bookkeeping(k) && !is_empty(Some(*v)))
    .count();
  let bonus = if is_empty(record.get(fields::UPDATED_AT)) { 0.0 } else { 0.5 };
  populated as f64 + bonus
}

/// Winner-first ordering: higher score, then more recent `updatedAt`, then
/// the smaller identifier.
pub fn compare(a: &StudentRecord, b: &StudentRecord) -> Ordering {
  score(b)
    .total_cmp(&score(a))
    .then_with(|| b.updated_at().cmp(&a.updated_at()))
    .then_with(|| a.id().cmp(&b.id()))
}

/// Sort records so the winner comes first.
pub fn rank(mut records: Vec<StudentRecord>) -> Vec<StudentRecord> {
  records.sort_by(compare);
  records
}

// ─── Merging ─────────────────────────────────────────────────────────────────

fn union(winner: &[Bson], loser: &[Bson]) -> Vec<Bson> {
  let mut out: Vec<Bson> = Vec::with_capacity(winner.len() + loser.len());
  for item in winner.iter().chain(loser) {
    if !out.contains(item) {
      out.push(item.clone());
    }
  }
  out
}

/// Fold `loser` into `target` in place.
pub fn merge_fields(target: &mut Document, loser: &Document) {
  for (key, value) in loser {
    if !is_mergeable(key) {
      continue;
    }
    let current = target.get(key);
    if let (Some(Bson::Array(ours)), Bson::Array(theirs)) = (current, value) {
      let unioned = union(ours, theirs);
      target.insert(key.clone(), unioned);
    } else if is_empty(current) && !is_empty(Some(value)) {
      target.insert(key.clone(), value.clone());
    }
  }
}

/// Make the canonical and display class fields agree. The display value wins.
pub fn reconcile_class(target: &mut Document, class_fields: &ClassFields) {
  let read = |key: &str| {
    target
      .get_str(key)
      .ok()
      .map(str::trim)
      .filter(|v| !v.is_empty())
      .map(str::to_owned)
  };
  let Some(class) = read(&class_fields.display).or_else(|| read(&class_fields.canonical))
  else {
    return;
  };
  target.insert(class_fields.display.clone(), class.clone());
  target.insert(class_fields.canonical.clone(), class);
}

// ─── Plans ───────────────────────────────────────────────────────────────────

/// The writes that resolve one duplicate group.
#[derive(Debug, Clone)]
pub struct MergePlan {
  pub winner:     ObjectId,
  /// The winner document after all losers were folded in.
  pub merged:     Document,
  /// Fields of `merged` that differ from the stored winner. Empty when the
  /// losers contribute nothing.
  pub winner_set: Document,
  pub losers:     Vec<ObjectId>,
  pub at:         DateTime,
}

impl MergePlan {
  pub fn updates(&self) -> Vec<UpdateOp> {
    let mut ops = Vec::with_capacity(self.losers.len() + 1);
    if !self.winner_set.is_empty() {
      let mut set = self.winner_set.clone();
      set.insert(fields::UPDATED_AT, self.at);
      ops.push(UpdateOp::set(self.winner, set));
    }
    for loser in &self.losers {
      ops.push(UpdateOp::set(
        *loser,
        doc! {
          fields::DELETED:     true,
          fields::MERGED_INTO: self.winner,
          fields::DEDUP_AT:    self.at,
        },
      ));
    }
    ops
  }
}

/// Pick a winner among `members` and merge the others into it.
///
/// Returns `None` for fewer than two members.
pub fn plan_merge(
  members: Vec<StudentRecord>,
  class_fields: &ClassFields,
  at: DateTime,
) -> Option<MergePlan> {
  if members.len() < 2 {
    return None;
  }
  let mut ranked = rank(members).into_iter();
  let winner = ranked.next()?;
  let losers: Vec<StudentRecord> = ranked.collect();

  let mut merged = winner.document().clone();
  for loser in &losers {
    merge_fields(&mut merged, loser.document());
  }
  reconcile_class(&mut merged, class_fields);

  let winner_set: Document = merged
    .iter()
    .filter(|(k, v)| is_mergeable(k) && winner.get(k) != Some(*v))
    .map(|(k, v)| (k.clone(), v.clone()))
    .collect();

  Some(MergePlan {
    winner: winner.id(),
    merged,
    winner_set,
    losers: losers.iter().map(StudentRecord::id).collect(),
    at,
  })
}

/// Merge plans for every group of a dedup run.
#[derive(Debug, Clone, Default)]
pub struct DedupPlan {
  /// Number of groups with two or more members.
  pub groups: usize,
  pub plans:  Vec<MergePlan>,
}

impl DedupPlan {
  pub fn build(groups: Vec<DuplicateGroup>, class_fields: &ClassFields, at: DateTime) -> Self {
    let total = groups.len();
    let plans = groups
      .into_iter()
      .filter_map(|g| plan_merge(g.members, class_fields, at))
      .collect();
    Self { groups: total, plans }
  }

  pub fn merged_groups(&self) -> usize { self.plans.len() }

  /// All writes of the run, to be submitted as one unordered batch.
  pub fn updates(&self) -> Vec<UpdateOp> {
    self.plans.iter().flat_map(MergePlan::updates).collect()
  }
}
