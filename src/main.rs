// src/main.rs

mod archiver;
mod backup;
mod cli;
mod error;
mod model;
mod repo_list;
mod retention;
mod storage;

use anyhow::Context;
use archiver::GitTarArchiver;
use backup::BackupOrchestrator;
use clap::Parser;
use cli::Args;
use indicatif::ProgressBar;
use model::RunSummary;
use repo_list::RepositoryList;
use retention::RetentionPolicy;
use std::fs::OpenOptions;
use std::process::ExitCode;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use storage::ArchiveStore;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = init_logging(&args) {
        eprintln!("Error setting up logging: {e:#}");
        return ExitCode::from(2);
    }

    let start_time = Instant::now();
    match run(&args) {
        Ok(summary) => {
            info!(
                repositories = summary.repositories.len(),
                archived = summary.archived(),
                deleted = summary.deleted(),
                failed_deletions = summary.failed_deletions(),
                errored = summary.errored(),
                rejected_lines = summary.rejected_lines,
                warnings = summary.warnings,
                elapsed = ?start_time.elapsed(),
                "backup run finished"
            );
            if summary.errored() > 0 {
                for (id, errors) in summary.failures() {
                    error!(id, errors, "repository finished with errors");
                }
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!(severity = "critical", error = %format!("{e:#}"), "unhandled error, aborting run");
            ExitCode::from(2)
        }
    }
}

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&args.log_level)
            .with_context(|| format!("invalid log level {:?}", args.log_level))?,
    };
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match &args.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("could not open log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

fn run(args: &Args) -> anyhow::Result<RunSummary> {
    let today = args
        .today
        .unwrap_or_else(|| chrono::Local::now().date_naive());
    let keep = RetentionPolicy::new(args.days, args.weeks, args.months).keep_set(today);
    debug!(
        %today,
        count = keep.len(),
        dates = %keep.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(","),
        "keeping archives"
    );

    let list = RepositoryList::from_path(&args.config)
        .with_context(|| format!("could not read repository list {}", args.config.display()))?;
    let loaded = repo_list::load_entries(list);

    let archiver = GitTarArchiver::new(Duration::from_secs(args.timeout));
    let store = ArchiveStore::new(&args.storage);
    let orchestrator = BackupOrchestrator::new(&archiver, &store, today, &keep);

    let bar = if args.no_progress {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(loaded.entries.len() as u64)
    };
    bar.set_message("Backing up repositories");

    let mut summary = if args.jobs > 1 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(args.jobs)
            .build()
            .context("could not start worker pool")?;
        pool.install(|| orchestrator.run(&loaded.entries, true, bar))
    } else {
        orchestrator.run(&loaded.entries, false, bar)
    };
    summary.rejected_lines = loaded.rejected;
    summary.warnings = loaded.warnings;
    Ok(summary)
}
