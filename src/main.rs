mod config;
mod extract;
mod funds;
mod ledger;
mod pipeline;
mod probe;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::extract::Tier;
use crate::ledger::MergeOutcome;
use crate::pipeline::RunReport;

/// Collect the daily CGD fund quotes into a CSV ledger.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// Config file; the built-in configuration is used when omitted
    #[arg(long, env = "FUND_QUOTES_CONFIG")]
    config: Option<PathBuf>,

    /// Ledger file, overriding the configured path
    #[arg(long)]
    ledger: Option<PathBuf>,

    /// Date of the ledger row (YYYY-MM-DD), today by default
    #[arg(long)]
    date: Option<NaiveDate>,
}

async fn collect(cli: Cli) -> anyhow::Result<RunReport> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::embedded().context("built-in config is invalid")?,
    };
    if let Some(path) = cli.ledger {
        config.ledger.path = path;
    }

    let date = cli.date.unwrap_or_else(|| Local::now().date_naive());
    let client = probe::build_client(&config.probe).context("failed to build HTTP client")?;

    let report = pipeline::run(&config, &client, date)
        .await
        .with_context(|| format!("failed to update ledger {}", config.ledger.path.display()))?;
    Ok(report)
}

/// `info` unless `directives` (the value of `RUST_LOG`) names a level of its own.
fn log_filter(directives: &str) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .parse_lossy(directives)
}

fn log_report(report: &RunReport) {
    let row = match report.outcome {
        MergeOutcome::Created => "new ledger created",
        MergeOutcome::Appended => "new row added",
        MergeOutcome::Updated => "existing row updated",
    };
    info!("Ledger for {}: {}", report.summary.date, row);

    for tier in [Tier::KnownValue, Tier::Pattern, Tier::Fallback] {
        let count = report.observation.iter().filter(|(_, r)| r.tier == tier).count();
        if count > 0 {
            info!("{} fund(s) resolved by {}", count, tier);
        }
    }

    match &report.endpoint {
        Some(url) => info!("Collection finished using {}", url),
        None => info!("Collection finished with fallback data only"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(
            &std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default(),
        ))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    info!("CGD fund quotes - automatic run");

    // run on its own task so a panic is reported as a failed run
    match tokio::spawn(collect(cli)).await {
        Ok(Ok(report)) => {
            log_report(&report);
            ExitCode::SUCCESS
        }
        Ok(Err(e)) => {
            error!("Run failed: {:#}", e);
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("Run aborted: {}", e);
            ExitCode::FAILURE
        }
    }
}
