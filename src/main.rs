//! blobmirror - Back up a directory tree as compressed tar blobs.
//!
//! Usage:
//!   blobmirror run CONFIG           Build blobs, report changes, sync mirror
//!   blobmirror check CONFIG         Validate a configuration file
//!   blobmirror diff CONFIG          Compare the current build area with the mirror
//!   blobmirror sanitize NAME...     Show how names are rewritten for blob files
//!   blobmirror --help               Show help

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use blobmirror_analyze::{DiffConfig, DiffReporter, RunSummary};
use blobmirror_build::{explore, prepare_build_area};
use blobmirror_core::{sanitize, BackupConfig};
use blobmirror_sync::mirror_for;

#[derive(Parser)]
#[command(
    name = "blobmirror",
    version,
    about = "Back up a directory tree as compressed tar blobs",
    long_about = "blobmirror packs a directory tree into .tar.bz2 blobs, split along \
                  configured group levels so that unchanged parts produce identical \
                  blobs, then mirrors the blobs to a sync directory."
)]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build blobs, report changes and sync the mirror
    Run {
        /// YAML configuration file
        config: PathBuf,

        /// Print the run summary as JSON on stdout
        #[arg(long)]
        json: bool,

        /// Stop after reporting, leave the mirror untouched
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate a configuration file and show the resolved settings
    Check {
        /// YAML configuration file
        config: PathBuf,
    },

    /// Compare the existing build area with the mirror
    Diff {
        /// YAML configuration file
        config: PathBuf,

        /// Print the summary as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Print sanitized blob names
    Sanitize {
        /// Names to sanitize
        #[arg(required = true)]
        names: Vec<String>,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Run {
            config,
            json,
            dry_run,
        } => run_backup(&config, json, dry_run)?,
        Command::Check { config } => run_check(&config)?,
        Command::Diff { config, json } => run_diff(&config, json)?,
        Command::Sanitize { names } => {
            for name in names {
                println!("{}", sanitize(&name));
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Full pipeline: build area, change report, mirror.
fn run_backup(config_path: &Path, json: bool, dry_run: bool) -> Result<()> {
    let config = load_config(config_path)?;

    prepare_build_area(&config.build_dir).wrap_err("Cannot prepare build dir")?;
    let manifest = explore(
        &config.root,
        &config.build_dir,
        &config.group_levels,
        &config.ignore,
    )
    .wrap_err("Build failed")?;
    info!(
        "Built {} blobs holding {} entries",
        manifest.blob_count(),
        manifest.total_entries()
    );

    if manifest.has_warnings() {
        warn!("{} path(s) skipped while building", manifest.warnings.len());
    }

    let summary = report_changes(&config)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    if dry_run {
        info!("Dry run, mirror left untouched");
        return Ok(());
    }

    let mirror = mirror_for(config.mirror);
    info!("Syncing with {}...", mirror.name());
    let outcome = mirror
        .sync(&config.build_dir, &config.sync_dir)
        .wrap_err_with(|| format!("Sync to {} failed", config.sync_dir.display()))?;
    info!("{}", outcome.summary());
    info!("Done");

    Ok(())
}

/// Validate a configuration and show what it resolves to.
fn run_check(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;

    println!("{}", "─".repeat(60));
    println!(" Root:       {}", config.root.display());
    println!(" Build dir:  {}", config.build_dir.display());
    println!(" Sync dir:   {}", config.sync_dir.display());
    println!(" Mirror:     {}", config.mirror);
    println!(" Details:    blobs > {}", format_size(config.detail_threshold));
    println!("{}", "─".repeat(60));

    if config.ignore.is_empty() {
        println!(" Nothing ignored");
    } else {
        println!(" Ignored:");
        for path in config.ignore.iter() {
            println!("   {}", path.display());
        }
    }

    if config.group_levels.is_empty() {
        println!(" No group levels, the root is archived whole");
    } else {
        println!(" Group levels:");
        for (dir, budget) in config.group_levels.iter() {
            println!("   {:<30} {}", dir.display(), budget);
        }
    }

    Ok(())
}

/// Report changes of the existing build area without rebuilding.
fn run_diff(config_path: &Path, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let summary = report_changes(&config)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(())
}

fn load_config(path: &Path) -> Result<BackupConfig> {
    BackupConfig::load(path).wrap_err_with(|| format!("Bad config: {}", path.display()))
}

/// Compare the build area with the mirror and log the stats.
fn report_changes(config: &BackupConfig) -> Result<RunSummary> {
    let diff_config = DiffConfig::builder()
        .detail_threshold(config.detail_threshold)
        .build()
        .wrap_err("Invalid diff settings")?;
    let report = DiffReporter::with_config(diff_config)
        .compare(&config.build_dir, &config.sync_dir)
        .wrap_err("Cannot compare build dir with mirror")?;

    let summary = report.summary(config.detail_threshold);
    log_summary(&summary);
    Ok(summary)
}

fn log_summary(summary: &RunSummary) {
    info!(
        "Stats: built {} files, total size: {}",
        summary.blobs,
        format_size(summary.total_size)
    );
    info!(
        "Stats: {} new, {} changed; showing details for those > {}...",
        summary.new,
        summary.changed,
        format_size(summary.detail_threshold)
    );
    for blob in &summary.details {
        info!(
            "{:>10}  {:<7}  {}",
            format_size(blob.size),
            blob.status.as_ref(),
            blob.path.display()
        );
    }
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
