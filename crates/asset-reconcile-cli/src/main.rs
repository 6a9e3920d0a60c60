mod commands;
mod logging;
mod progress;

use std::path::Path;
use std::process;
use std::sync::atomic::Ordering;

use anyhow::Context;
use asset_reconcile_core::config::{self, AppConfig};
use asset_reconcile_core::{
    AssetStore, ExecutionReport, MemoryStore, PlanningOutcome, ReconcileEngine, ReportKind, ReportWriter,
    SqliteStore,
};
use clap::Parser;
use colored::*;
use commands::Cli;
use dotenv::dotenv;
use progress::CliReporter;
use tracing::{error, info, warn};

/// Exit code for unreadable roots, unopenable stores and bad configuration.
const EXIT_FATAL: i32 = 2;
const EXIT_FOLLOW_UP: i32 = 1;

fn main() {
    dotenv().ok();

    let guard = logging::init_logger();
    let args = Cli::parse();

    let code = match run(&args) {
        Ok(code) => code,
        Err(err) => {
            error!("Error: {:#}", err);
            EXIT_FATAL
        }
    };

    // process::exit skips destructors; flush the file log first.
    drop(guard);
    process::exit(code);
}

fn run(args: &Cli) -> anyhow::Result<i32> {
    let config = load_config(args)?;
    if args.print_config {
        println!("Configuration: {:#?}", config);
        return Ok(0);
    }
    let root = args.root.as_deref().context("a content root is required")?;

    let engine = ReconcileEngine::new(config.clone());
    let reporter = CliReporter::new();
    let mut store = open_store(&config, args.execute)?;

    let outcome = engine
        .analyze(root, store.as_ref(), &reporter)
        .with_context(|| format!("analysis of {} failed", root.display()))?;

    let writer = ReportWriter::new(Path::new(&config.report_dir)).context("creating report directory")?;
    writer.write_planning(&outcome).context("writing plan reports")?;
    print_plan_summary(&outcome);

    if !args.execute {
        info!("Dry run: nothing was changed. Re-run with --execute to apply.");
        return Ok(0);
    }

    let token = engine.cancel_token();
    if let Err(e) = ctrlc::set_handler(move || token.store(true, Ordering::SeqCst)) {
        warn!("Could not install Ctrl-C handler: {}", e);
    }

    let report = engine.execute(root, &outcome.plan, store.as_mut(), &reporter);
    writer
        .write(ReportKind::Execution, &report)
        .context("writing execution report")?;
    print_execution_summary(&report);

    Ok(if report.needs_follow_up() { EXIT_FOLLOW_UP } else { 0 })
}

/// File and environment first, then command-line overrides.
fn load_config(args: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => config::load_configuration_from(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => config::load_configuration().context("loading configuration")?,
    };

    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(store) = &args.store {
        config.asset_store = store.clone();
    }
    if let Some(dir) = &args.report_dir {
        config.report_dir = dir.clone();
    }
    if let Some(scope) = args.scope {
        config.conflict_scope = scope.into();
    }
    if args.prune_orphans {
        config.prune_orphans = true;
    }
    Ok(config)
}

/// Dry runs never write to the store, not even to create its schema.
fn open_store(config: &AppConfig, execute: bool) -> anyhow::Result<Box<dyn AssetStore>> {
    let path = Path::new(&config.asset_store);
    let timeout = config.operation_timeout();

    if execute {
        let store = SqliteStore::open(path, timeout)
            .with_context(|| format!("opening asset store {}", path.display()))?;
        return Ok(Box::new(store));
    }
    if path.exists() {
        let store = SqliteStore::open_read_only(path, timeout)
            .with_context(|| format!("opening asset store {} read-only", path.display()))?;
        return Ok(Box::new(store));
    }
    warn!(
        "Asset store {} does not exist; planning against an empty store",
        path.display()
    );
    Ok(Box::new(MemoryStore::new()))
}

fn print_plan_summary(outcome: &PlanningOutcome) {
    let plan = &outcome.plan;
    let stats = &outcome.stats;

    println!();
    info!(
        "{} files scanned ({} bytes), {} left in place, {} entries skipped",
        format!("{}", stats.files_scanned).green(),
        stats.total_bytes,
        format!("{}", stats.frozen).yellow(),
        format!("{}", outcome.scan_issues.len()).yellow(),
    );
    info!(
        "{} conflict groups, {} duplicates, {} files to recode",
        format!("{}", plan.conflict_groups.len()).cyan(),
        format!("{}", stats.duplicates).red(),
        format!("{}", outcome.formats.recode_count()).cyan(),
    );
    if plan.is_empty() {
        info!("{}", "Nothing to do.".green());
    }
    for (kind, count) in plan.counts() {
        info!("  {:<20} {}", kind.to_string(), format!("{}", count).cyan());
    }

    if plan.errors.is_empty() {
        info!("{}", "No planning errors.".green());
    } else {
        warn!("{} planning errors need attention:", format!("{}", plan.errors.len()).red());
        for err in &plan.errors {
            warn!("  {}", err);
        }
    }
}

fn print_execution_summary(report: &ExecutionReport) {
    println!();
    info!(
        "{} applied, {} skipped, {} failed, {} warnings",
        format!("{}", report.applied_total()).green(),
        format!("{}", report.skipped.len()).yellow(),
        format!("{}", report.failures.len()).red(),
        format!("{}", report.warnings.len()).red(),
    );
    for failure in &report.failures {
        error!("  #{} {}: {}", failure.index, failure.operation, failure.message);
    }
    for warning in &report.warnings {
        warn!("  #{} {}: {}", warning.index, warning.operation, warning.message);
    }
    if report.cancelled {
        warn!("Cancelled with {} operations not started", report.not_started);
    }
    if report.needs_follow_up() {
        warn!("{}", "Follow-up required; see the execution report.".red());
    } else {
        info!("{}", "Tree and store are reconciled.".green());
    }
}
