//! `roster`: maintenance commands for the student roster.
//!
//! # Usage
//!
//! ```text
//! roster dedup --dry-run
//! roster merge-by-name Anna Muster
//! roster trash-by-class A,o,V,W,w
//! roster restore "reason=trash-by-class: A,o,V,W,w"
//! roster check --limit 50
//! roster serve
//! ```
//!
//! The database is taken from `MONGODB_URI` (environment, `.env.local` or
//! `.env`). Setting `DRY_RUN=1` has the same effect as `--dry-run`.

mod commands;
mod settings;

use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use roster_core::{
  report, similar,
  trash::{ClassSelector, RestoreQuery},
};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use commands::connect;
use settings::Settings;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "roster", version, about = "Maintenance commands for the student roster")]
struct Cli {
  /// Path to a TOML settings file.
  #[arg(short, long, value_name = "FILE", global = true)]
  config: Option<PathBuf>,

  /// Report what would change without writing anything.
  #[arg(long, global = true)]
  dry_run: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Merge every group of duplicate records that lack a normalised username.
  Dedup,

  /// Merge all records with exactly this name, ignoring birth date and class.
  MergeByName {
    given:  String,
    family: String,
  },

  /// Move records whose class is one of the given placeholders to the trash.
  TrashByClass {
    /// Comma-separated class values, matched case-insensitively.
    #[arg(default_value = "A,o,V,W,w")]
    classes: ClassSelector,
  },

  /// Undelete the originals of trash entries: `reason=<text>` or
  /// `ids=<id>,<id>`.
  Restore {
    #[arg(required = true, value_name = "reason=..|ids=..")]
    args: Vec<String>,
  },

  /// Print the duplicate report.
  Check {
    /// Groups shown per section.
    #[arg(long, env = "DEDUP_LIMIT", default_value_t = report::DEFAULT_LIMIT)]
    limit: usize,
  },

  /// List records with a similar family name.
  Similar {
    family: String,
    given:  String,
    #[arg(long, default_value_t = similar::DEFAULT_LIMIT)]
    limit:  usize,
  },

  /// Create the indexes the store relies on.
  Indexes,

  /// Serve the JSON API.
  Serve,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = match Cli::try_parse() {
    Ok(cli) => cli,
    Err(e) => {
      // Help and version go to stdout and are not failures.
      let failed = e.use_stderr();
      e.print().ok();
      return if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS };
    }
  };

  match run(cli).await {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      eprintln!("error: {e:#}");
      ExitCode::FAILURE
    }
  }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
  let settings = Settings::load(cli.config.as_deref())?;
  let cfg = settings.run_config(cli.dry_run);

  match cli.command {
    Command::Dedup => commands::dedup(&connect(&settings).await?, &cfg).await,
    Command::MergeByName { given, family } => {
      commands::merge_by_name(&connect(&settings).await?, &cfg, &given, &family).await
    }
    Command::TrashByClass { classes } => {
      commands::trash_by_class(&connect(&settings).await?, &cfg, &classes).await
    }
    Command::Restore { args } => {
      // Usage errors are reported before connecting.
      let query = RestoreQuery::from_args(&args)?;
      commands::restore(&connect(&settings).await?, &query).await
    }
    Command::Check { limit } => commands::check(&connect(&settings).await?, &cfg, limit).await,
    Command::Similar { family, given, limit } => {
      commands::similar(&connect(&settings).await?, &cfg, &family, &given, limit).await
    }
    Command::Indexes => commands::indexes(&connect(&settings).await?).await,
    Command::Serve => commands::serve(connect(&settings).await?, cfg, &settings).await,
  }
}
