//! The reconciliation commands, written against any [`StudentStore`].
//!
//! Each operation loads what it needs, plans its writes with the pure
//! functions of this crate and then submits them. In dry-run mode nothing is
//! written; the returned summary still reports what would have happened.

use bson::{DateTime, oid::ObjectId};
use serde::Serialize;
use tracing::{debug, info};

use crate::{
  group::group_candidates,
  merge::{DedupPlan, plan_merge},
  record::{ClassFields, StudentRecord},
  report::{DuplicateReport, build_report},
  similar::{SimilarHit, similar_names},
  store::{StudentQuery, StudentStore},
  trash::{ClassSelector, RestoreQuery, plan_trash, restore_update},
  update::BulkOutcome,
};

/// Actor recorded on trash entries when none is configured.
pub const DEFAULT_ACTOR: &str = "script:trash-by-class";

/// Settings shared by every operation of one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
  pub class_fields: ClassFields,
  pub dry_run:      bool,
  /// Recorded as `trashedBy` / `deletedBy`.
  pub actor:        String,
}

impl Default for RunConfig {
  fn default() -> Self {
    Self {
      class_fields: ClassFields::default(),
      dry_run:      false,
      actor:        DEFAULT_ACTOR.to_owned(),
    }
  }
}

// ─── Dedup ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupSummary {
  pub dry_run:           bool,
  /// `None` when the cleanup was skipped.
  pub blank_usernames:   Option<u64>,
  pub candidates:        usize,
  pub groups:            usize,
  pub merged_groups:     usize,
  pub updates:           usize,
  /// `None` when nothing was submitted.
  pub outcome:           Option<BulkOutcome>,
}

/// Merge every group of duplicate candidates.
pub async fn dedup<S: StudentStore>(
  store: &S,
  cfg: &RunConfig,
) -> Result<DedupSummary, S::Error> {
  let mut summary = DedupSummary { dry_run: cfg.dry_run, ..DedupSummary::default() };

  if !cfg.dry_run {
    let cleared = store.clear_blank_usernames().await?;
    info!(cleared, "blank usernames set to null");
    summary.blank_usernames = Some(cleared);
  }

  let candidates = store.find(&StudentQuery::dedup_candidates()).await?;
  summary.candidates = candidates.len();
  info!(candidates = summary.candidates, "loaded candidates without normalised username");

  let groups = group_candidates(candidates, &cfg.class_fields);
  for group in &groups {
    debug!(key = %group.key, members = group.members.len(), "duplicate group");
  }

  let plan = DedupPlan::build(groups, &cfg.class_fields, DateTime::now());
  let updates = plan.updates();
  summary.groups = plan.groups;
  summary.merged_groups = plan.merged_groups();
  summary.updates = updates.len();
  info!(
    groups = summary.groups,
    merged = summary.merged_groups,
    updates = summary.updates,
    "dedup planned"
  );

  if cfg.dry_run {
    info!("dry run, nothing written");
  } else if !updates.is_empty() {
    let outcome = store.apply_updates(updates).await?;
    info!(matched = outcome.matched, modified = outcome.modified, failed = outcome.failed, "dedup written");
    summary.outcome = Some(outcome);
  }
  Ok(summary)
}

// ─── Merge by name ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeSummary {
  pub dry_run: bool,
  pub found:   usize,
  pub winner:  Option<ObjectId>,
  pub losers:  Vec<ObjectId>,
  pub updates: usize,
  pub outcome: Option<BulkOutcome>,
}

/// Merge all unassigned records with exactly this name, regardless of birth
/// date or class.
pub async fn merge_by_name<S: StudentStore>(
  store: &S,
  cfg: &RunConfig,
  given: &str,
  family: &str,
) -> Result<MergeSummary, S::Error> {
  let records = store.find(&StudentQuery::by_name(given, family)).await?;
  let mut summary = MergeSummary { dry_run: cfg.dry_run, found: records.len(), ..MergeSummary::default() };
  info!(given, family, found = summary.found, "records with this name");

  let Some(plan) = plan_merge(records, &cfg.class_fields, DateTime::now()) else {
    info!("fewer than two records, nothing to merge");
    return Ok(summary);
  };

  let updates = plan.updates();
  summary.winner = Some(plan.winner);
  summary.losers = plan.losers.clone();
  summary.updates = updates.len();
  info!(winner = %plan.winner, losers = plan.losers.len(), "merge planned");

  if !cfg.dry_run {
    let outcome = store.apply_updates(updates).await?;
    info!(matched = outcome.matched, modified = outcome.modified, "merge written");
    summary.outcome = Some(outcome);
  }
  Ok(summary)
}

// ─── Trash by class ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrashSummary {
  pub dry_run:    bool,
  pub reason:     String,
  pub candidates: usize,
  pub selected:   usize,
  /// Trash entries written.
  pub trashed:    u64,
  pub outcome:    Option<BulkOutcome>,
}

/// Move every active record whose class is in `selector` to the trash.
pub async fn trash_by_class<S: StudentStore>(
  store: &S,
  cfg: &RunConfig,
  selector: &ClassSelector,
) -> Result<TrashSummary, S::Error> {
  let reason = selector.reason();
  let candidates = store.find(&StudentQuery::with_class(cfg.class_fields.clone())).await?;
  let targets: Vec<&StudentRecord> = candidates
    .iter()
    .filter(|r| selector.matches(r, &cfg.class_fields))
    .collect();

  let mut summary = TrashSummary {
    dry_run: cfg.dry_run,
    reason: reason.clone(),
    candidates: candidates.len(),
    selected: targets.len(),
    ..TrashSummary::default()
  };
  info!(
    candidates = summary.candidates,
    selected = summary.selected,
    classes = %selector,
    "trash candidates"
  );

  if cfg.dry_run || targets.is_empty() {
    if cfg.dry_run {
      info!(would_trash = summary.selected, "dry run, nothing written");
    }
    return Ok(summary);
  }

  let plan = plan_trash(targets, &reason, &cfg.actor, DateTime::now());
  summary.trashed = store.insert_trash(plan.entries).await?;
  let outcome = store.apply_updates(plan.tombstones).await?;
  info!(trashed = summary.trashed, soft_deleted = outcome.modified, "trash written");
  summary.outcome = Some(outcome);
  Ok(summary)
}

// ─── Restore ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreSummary {
  pub entries: usize,
  pub outcome: BulkOutcome,
}

/// Undelete the originals of the matching trash entries.
///
/// Entries whose original no longer exists are skipped silently; the summary
/// shows them as the gap between `entries` and `outcome.matched`.
pub async fn restore<S: StudentStore>(
  store: &S,
  query: &RestoreQuery,
) -> Result<RestoreSummary, S::Error> {
  let entries = store.find_trash(query).await?;
  let mut originals: Vec<ObjectId> = Vec::with_capacity(entries.len());
  for entry in &entries {
    if !originals.contains(&entry.original_id) {
      originals.push(entry.original_id);
    }
  }
  info!(entries = entries.len(), originals = originals.len(), "trash entries found");

  let mut summary = RestoreSummary { entries: entries.len(), ..RestoreSummary::default() };
  if originals.is_empty() {
    return Ok(summary);
  }
  summary.outcome = store
    .apply_updates(originals.into_iter().map(restore_update).collect())
    .await?;
  info!(restored = summary.outcome.modified, matched = summary.outcome.matched, "restore written");
  Ok(summary)
}

// ─── Read-only lookups ───────────────────────────────────────────────────────

pub async fn check_duplicates<S: StudentStore>(
  store: &S,
  cfg: &RunConfig,
  limit: usize,
) -> Result<DuplicateReport, S::Error> {
  let records = store.find(&StudentQuery::default()).await?;
  Ok(build_report(&records, &cfg.class_fields, limit))
}

pub async fn similar<S: StudentStore>(
  store: &S,
  cfg: &RunConfig,
  family: &str,
  given: &str,
  limit: usize,
) -> Result<Vec<SimilarHit>, S::Error> {
  let records = store.find(&StudentQuery::default()).await?;
  Ok(similar_names(&records, family, given, &cfg.class_fields, limit))
}
