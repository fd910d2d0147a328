//! CLI entry point for the clip archiver.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use archiver_core::archive::{DiskBudget, format_size};
use archiver_core::engine::{ArchiveEngine, BatchPlan, BatchSummary, StopReason, plan_batch};
use archiver_core::export::{ExportParseResult, parse_export, read_export};
use archiver_core::{
    ArchiverConfig, IdentityRotator, JsonHistoryStore, StateLock, ThrottleController, TokioClock,
    YtDlpBackend,
};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(args.default_log_level()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    match run(&args).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!("{err:#}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> Result<u8> {
    let mut config = ArchiverConfig::load(args.config.as_deref())?;
    args.apply_overrides(&mut config);
    config.validate().context("Invalid configuration after CLI overrides")?;

    let document = read_export(&args.data_file)?;
    let parsed = parse_export(&document, args.kind, args.limit())?;
    info!(
        kind = %args.kind,
        items = parsed.items.len(),
        skipped = parsed.skipped.len(),
        "Parsed export"
    );

    let storage = &config.storage;
    let metadata_file = storage.state_dir.join(args.kind.metadata_file_name());

    if args.dry_run {
        let store = JsonHistoryStore::open(&storage.history_file(), &metadata_file)?;
        print_dry_run(&parsed, &plan_batch(parsed.items.clone(), &store));
        return Ok(0);
    }

    let _lock = StateLock::acquire(&storage.state_dir)?;
    let store = JsonHistoryStore::open(&storage.history_file(), &metadata_file)?;

    let cookie_file = config
        .identity
        .cookie_file
        .clone()
        .unwrap_or_else(|| storage.default_cookie_file());
    let identity = IdentityRotator::load(&config.identity, &storage.session_file(), Some(cookie_file));
    let throttle = ThrottleController::new(config.pacing.clone(), Arc::new(TokioClock));
    let budget = DiskBudget::new(&storage.archive_dir, storage.capacity_bytes);
    info!(
        archive_dir = %storage.archive_dir.display(),
        usage = %format_size(budget.usage()),
        capacity = %format_size(budget.capacity_bytes()),
        "Archive budget"
    );

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let mut engine = ArchiveEngine::new(
        YtDlpBackend::new(config.backend.clone()),
        store,
        throttle,
        identity,
        budget,
    )
    .with_retry(&config.retry)
    .with_rotation_interval(config.identity.rotate_every_successes)
    .with_cancellation(cancel);

    let summary = engine.run_batch(parsed.items).await;
    print_summary(&summary);
    Ok(summary.exit_code())
}

fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping at the next safe point");
            cancel.cancel();
        }
    });
}

fn print_dry_run(parsed: &ExportParseResult, plan: &BatchPlan) {
    println!(
        "Dry run: {} unique item(s), {} duplicate(s), {} already archived, {} skipped entr(y/ies).",
        plan.total_found,
        plan.duplicates,
        plan.already_archived,
        parsed.skipped.len()
    );
    println!("Would attempt {} item(s).", plan.pending.len());
    for item in &plan.pending {
        println!("- {} {}", item.id, item.url);
    }
}

fn print_summary(summary: &BatchSummary) {
    match &summary.stop_reason {
        StopReason::Completed => info!("Download session completed"),
        StopReason::Cancelled => warn!(remaining = summary.remaining, "Download session cancelled"),
        StopReason::DiskExhausted(exhausted) => {
            error!(remaining = summary.remaining, "Stopped: {exhausted}");
        }
    }
    println!(
        "Successful downloads: {}\nFailed downloads: {}\nRate limit hits: {}\nAlready archived: {}",
        summary.succeeded, summary.failed, summary.rate_limit_hits, summary.already_archived
    );
}
