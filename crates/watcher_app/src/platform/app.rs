use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use engine_logging::{engine_error, engine_info};
use watcher_core::{ChannelResult, RunReport, SourceResult};
use watcher_engine::{CodeStore, ReqwestFetcher, VisibleTextExtractor, Watcher};

use super::config::{load_config, AppConfig};
use super::logging::{self, LogSink};
use super::persistence::save_report;

/// Scan configured pages for SHIFT codes and notify about new ones.
///
/// One invocation performs one scan-store-notify cycle; schedule it externally
/// (cron, systemd timer) for recurring checks.
#[derive(Debug, Parser)]
#[command(name = "shift_watcher", version)]
pub struct Cli {
    /// Path to the YAML config file
    #[arg(short, long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Override the database path from the config file
    #[arg(long)]
    pub database: Option<PathBuf>,

    /// Write the run report as JSON to this path
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    pub verbose: bool,
}

pub fn run_app() -> ExitCode {
    let cli = Cli::parse();
    logging::initialize(cli.log_file.clone(), cli.verbose);

    match run(&cli) {
        Ok(report) => {
            print_report(&report);
            ExitCode::SUCCESS
        }
        Err(err) => {
            engine_error!("Run aborted: {:#}", err);
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<RunReport> {
    let mut config = load_config(&cli.config)?;
    if let Some(database) = &cli.database {
        config.database = database.clone();
    }

    let watcher = build_watcher(&config)?;
    let store = CodeStore::open(&config.database)
        .with_context(|| format!("Failed to open code store {:?}", config.database))?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    engine_info!(
        "Scanning {} source(s), store {:?}",
        config.sources.len(),
        config.database
    );
    let report = runtime
        .block_on(watcher.run_once(&config.sources, &store, &LogSink))
        .context("Code store failure")?;
    engine_info!("Run finished: {}", report.summary());

    if let Some(path) = &cli.report {
        save_report(path, &report);
    }
    Ok(report)
}

fn build_watcher(config: &AppConfig) -> Result<Watcher> {
    let scanner = config
        .scanner
        .build()
        .context("Invalid scanner configuration")?;
    let notifier = config
        .notify
        .build_notifier()
        .context("Invalid notification configuration")?;
    let fetcher = ReqwestFetcher::new(config.fetch.to_settings());

    Ok(Watcher::new(
        Arc::new(fetcher),
        Arc::new(VisibleTextExtractor::default()),
        scanner,
        notifier,
    )
    .with_max_in_flight(config.fetch.max_in_flight))
}

fn print_report(report: &RunReport) {
    for source in &report.sources {
        match &source.result {
            SourceResult::Scanned { candidates } => {
                println!("scanned  {} ({candidates} candidate(s))", source.url)
            }
            SourceResult::Failed { reason } => println!("failed   {} ({reason})", source.url),
        }
    }
    for hit in &report.new_codes {
        println!("new      {}  (source: {})", hit.code, hit.source);
    }
    for channel in &report.channels {
        match &channel.result {
            ChannelResult::Delivered => println!("notified {}", channel.channel),
            ChannelResult::Failed { reason } => {
                println!("notify failed {} ({reason})", channel.channel)
            }
        }
    }
    println!("{}", report.summary());
}
