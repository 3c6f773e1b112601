//! Binary entry point for groupsync.
//!
//! Runs one sync from a definition file, or prints the members one side
//! currently reports.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use groupsync::config::{SideDefinition, SyncDefinition};
use groupsync::observability;
use groupsync::{Adapter, ExternalKey, SyncContext, SyncEngine, SyncReport};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Groupsync - differential membership sync between group directories.
#[derive(Parser)]
#[command(name = "groupsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the sync definition file.
    #[arg(short, long, global = true, env = "GROUPSYNC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Converge the target onto the source.
    Sync {
        /// Compute and print the diff without changing the target.
        #[arg(long)]
        dry_run: bool,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the members one side currently reports.
    Members {
        /// Which side to fetch.
        #[arg(long, value_enum)]
        side: Side,

        /// Print the member list as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Side {
    Source,
    Target,
}

/// Main entry point.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    if let Err(e) = observability::init_from_env(cli.verbose) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let definition = load_definition(cli.config.as_deref())?;
    let ctx = definition.context();

    let handle = ctx.cancel_handle();
    ctrlc::set_handler(move || {
        tracing::warn!("Interrupted, cancelling run");
        handle.cancel();
    })
    .context("failed to install Ctrl-C handler")?;

    match cli.command {
        Commands::Sync { dry_run, json } => {
            let report = sync(&ctx, &definition, dry_run)?;
            print_report(&report, json)
        },
        Commands::Members { side, json } => {
            let members = members(&ctx, &definition, side)?;
            print_members(&members, json)
        },
    }
}

fn load_definition(path: Option<&Path>) -> anyhow::Result<SyncDefinition> {
    match path {
        Some(path) => SyncDefinition::load_from_file(path)
            .with_context(|| format!("failed to load {}", path.display())),
        None => SyncDefinition::load_default().context("failed to load the default sync definition"),
    }
}

fn sync(ctx: &SyncContext, definition: &SyncDefinition, dry_run: bool) -> anyhow::Result<SyncReport> {
    let mut options = definition.options;
    if dry_run {
        options.dry_run = true;
    }
    let engine = SyncEngine::new(options);
    let mut target = definition.target.build().context("failed to build target adapter")?;

    let report = match &definition.source {
        SideDefinition::Members(desired) => engine.sync(ctx, desired, target.as_mut())?,
        SideDefinition::Adapter { .. } => {
            let mut source = definition.source.build().context("failed to build source adapter")?;
            engine.sync_with(ctx, source.as_mut(), target.as_mut())?
        },
    };
    Ok(report)
}

fn members(ctx: &SyncContext, definition: &SyncDefinition, side: Side) -> anyhow::Result<Vec<ExternalKey>> {
    let definition = match side {
        Side::Source => &definition.source,
        Side::Target => &definition.target,
    };
    if let SideDefinition::Members(members) = definition {
        return Ok(members.clone());
    }
    let mut adapter = definition.build()?;
    Ok(adapter.get(ctx)?)
}

fn print_report(report: &SyncReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let verb = if report.dry_run { "Would add" } else { "Added" };
    println!("{verb} {} member(s)", report.added.len());
    for key in &report.added {
        println!("  + {key}");
    }
    let verb = if report.dry_run { "Would remove" } else { "Removed" };
    println!("{verb} {} member(s)", report.removed.len());
    for key in &report.removed {
        println!("  - {key}");
    }
    Ok(())
}

fn print_members(members: &[ExternalKey], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(members)?);
    } else {
        for member in members {
            println!("{member}");
        }
    }
    Ok(())
}
