//! One function per subcommand: run the operation and print its summary.

use std::sync::Arc;

use anyhow::Context as _;
use roster_core::{
  ops::{self, RunConfig},
  trash::{ClassSelector, RestoreQuery},
  update::BulkOutcome,
};
use roster_store_mongo::MongoStore;
use tokio::net::TcpListener;

use crate::settings::Settings;

pub async fn connect(settings: &Settings) -> anyhow::Result<MongoStore> {
  let mongo = settings.mongo()?;
  MongoStore::connect(&mongo)
    .await
    .context("failed to connect to MongoDB")
}

fn print_outcome(label: &str, outcome: &BulkOutcome) {
  println!(
    "{label}: matched {}, modified {}, failed {}",
    outcome.matched, outcome.modified, outcome.failed
  );
}

pub async fn dedup(store: &MongoStore, cfg: &RunConfig) -> anyhow::Result<()> {
  let summary = ops::dedup(store, cfg).await.context("dedup failed")?;

  if let Some(cleared) = summary.blank_usernames {
    println!("Blank usernames set to null: {cleared}");
  }
  println!("Candidates without normalised username: {}", summary.candidates);
  println!("Duplicate groups: {}", summary.groups);
  println!("Groups to merge: {}, updates: {}", summary.merged_groups, summary.updates);
  match &summary.outcome {
    Some(outcome) => print_outcome("Written", outcome),
    None if summary.dry_run => println!("DRY_RUN: nothing written."),
    None => {}
  }
  Ok(())
}

pub async fn merge_by_name(
  store: &MongoStore,
  cfg: &RunConfig,
  given: &str,
  family: &str,
) -> anyhow::Result<()> {
  let summary = ops::merge_by_name(store, cfg, given, family)
    .await
    .context("merge failed")?;

  println!("Found: {}", summary.found);
  let Some(winner) = summary.winner else {
    println!("Nothing to merge.");
    return Ok(());
  };
  println!("Winner: {winner}, losers: {}", summary.losers.len());
  match &summary.outcome {
    Some(outcome) => print_outcome("Merged", outcome),
    None => println!("DRY_RUN: would apply {} updates.", summary.updates),
  }
  Ok(())
}

pub async fn trash_by_class(
  store: &MongoStore,
  cfg: &RunConfig,
  selector: &ClassSelector,
) -> anyhow::Result<()> {
  let summary = ops::trash_by_class(store, cfg, selector)
    .await
    .context("trash-by-class failed")?;

  println!(
    "Candidates: {} | selected: {} | classes: {selector}",
    summary.candidates, summary.selected
  );
  if summary.dry_run {
    println!("DRY_RUN: would trash {} records.", summary.selected);
    return Ok(());
  }
  println!("Trash entries written: {}", summary.trashed);
  if let Some(outcome) = &summary.outcome {
    println!("Soft-deleted: {} of {}", outcome.modified, summary.selected);
  }
  println!("Reason: {}", summary.reason);
  Ok(())
}

pub async fn restore(store: &MongoStore, query: &RestoreQuery) -> anyhow::Result<()> {
  let summary = ops::restore(store, query).await.context("restore failed")?;
  println!("Trash entries: {}", summary.entries);
  println!("Restored: {}", summary.outcome.modified);
  let missing = (summary.entries as u64).saturating_sub(summary.outcome.matched);
  if missing > 0 {
    println!("Originals not found: {missing}");
  }
  Ok(())
}

pub async fn check(store: &MongoStore, cfg: &RunConfig, limit: usize) -> anyhow::Result<()> {
  let report = ops::check_duplicates(store, cfg, limit)
    .await
    .context("duplicate check failed")?;
  println!("Duplicate check (top groups):");
  print!("{report}");
  Ok(())
}

pub async fn similar(
  store: &MongoStore,
  cfg: &RunConfig,
  family: &str,
  given: &str,
  limit: usize,
) -> anyhow::Result<()> {
  let hits = ops::similar(store, cfg, family, given, limit)
    .await
    .context("lookup failed")?;

  println!("{family}, {given}");
  if hits.is_empty() {
    println!("  (no similar names)");
  }
  for hit in hits {
    let mark = if hit.given_matches { '✓' } else { ' ' };
    let class = hit.class.as_deref().unwrap_or("?");
    println!("  {mark} {}, {} ({class}) {}", hit.family, hit.given, hit.id);
  }
  Ok(())
}

pub async fn indexes(store: &MongoStore) -> anyhow::Result<()> {
  store.ensure_indexes().await.context("failed to create indexes")?;
  println!("Indexes ensured.");
  Ok(())
}

pub async fn serve(store: MongoStore, cfg: RunConfig, settings: &Settings) -> anyhow::Result<()> {
  let app = axum::Router::new().nest("/api", roster_api::api_router(Arc::new(store), cfg));
  let address = format!("{}:{}", settings.host, settings.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;
  Ok(())
}
