//! Process-wide settings, read once at start-up.
//!
//! Sources, later ones overriding earlier ones:
//!
//! 1. built-in defaults,
//! 2. the optional TOML file given with `--config`,
//! 3. the bare variables `MONGODB_URI` and `DRY_RUN`,
//! 4. `ROSTER_*` variables (`ROSTER_MONGODB_URI`, `ROSTER_SCHOOL_YEAR`, ...).
//!
//! `.env.local` and then `.env` are loaded into the environment first; a
//! variable that is already set is never overwritten.

use std::path::Path;

use anyhow::{Context as _, anyhow};
use roster_core::{
  ops::{DEFAULT_ACTOR, RunConfig},
  record::SchoolYear,
};
use roster_store_mongo::MongoSettings;
use serde::Deserialize;

/// Unprefixed variables honoured for compatibility with existing `.env` files.
const BARE_VARS: &[&str] = &["MONGODB_URI", "DRY_RUN"];

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
  pub mongodb_uri: Option<String>,
  pub database:    Option<String>,
  pub school_year: SchoolYear,
  pub host:        String,
  pub port:        u16,
  pub dry_run:     bool,
  pub actor:       String,
}

impl Settings {
  /// Load `.env` files, then build settings from `file` and the process
  /// environment.
  pub fn load(file: Option<&Path>) -> anyhow::Result<Self> {
    dotenvy::from_filename(".env.local").ok();
    dotenvy::dotenv().ok();
    Self::build(file, std::env::vars().collect())
  }

  /// Build settings from `file` and an explicit environment snapshot.
  pub fn build(file: Option<&Path>, env: config::Map<String, String>) -> anyhow::Result<Self> {
    let bare: config::Map<String, String> = env
      .iter()
      .filter(|(k, _)| BARE_VARS.contains(&k.as_str()))
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect();

    let mut builder = config::Config::builder()
      .set_default("school_year", SchoolYear::default().as_str())?
      .set_default("host", "127.0.0.1")?
      .set_default("port", 3000)?
      .set_default("dry_run", false)?
      .set_default("actor", DEFAULT_ACTOR)?;
    if let Some(path) = file {
      builder = builder.add_source(config::File::from(path).required(true));
    }

    builder
      .add_source(config::Environment::default().source(Some(bare)))
      .add_source(config::Environment::with_prefix("ROSTER").source(Some(env)))
      .build()
      .context("failed to read configuration")?
      .try_deserialize()
      .context("failed to deserialise settings")
  }

  /// Connection settings, or an error naming the missing variable.
  pub fn mongo(&self) -> anyhow::Result<MongoSettings> {
    let uri = self
      .mongodb_uri
      .clone()
      .filter(|u| !u.trim().is_empty())
      .ok_or_else(|| anyhow!("MONGODB_URI is not set (checked the environment, .env.local and .env)"))?;
    Ok(MongoSettings { uri, database: self.database.clone() })
  }

  /// Run settings; `force_dry_run` comes from the command line.
  pub fn run_config(&self, force_dry_run: bool) -> RunConfig {
    RunConfig {
      class_fields: self.school_year.class_fields(),
      dry_run:      self.dry_run || force_dry_run,
      actor:        self.actor.clone(),
    }
  }
}
