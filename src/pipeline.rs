//! One collection run: probe → extract → reconcile.

use chrono::NaiveDate;
use reqwest::Client;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::extract::{self, Observation};
use crate::ledger::{Ledger, LedgerError, MergeOutcome, Summary};
use crate::probe::Prober;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Debug, Clone)]
pub struct RunReport {
    /// `None` when every candidate failed and fallback values were used.
    pub endpoint: Option<String>,
    pub observation: Observation,
    pub outcome: MergeOutcome,
    pub summary: Summary,
}

/// Collect today's quotes and write them into the ledger.
///
/// Unreachable endpoints are not an error: extraction then runs on an empty
/// page and yields the fallback table. Only ledger I/O fails the run.
pub async fn run(
    config: &Config,
    client: &Client,
    date: NaiveDate,
) -> Result<RunReport, PipelineError> {
    info!("[RUN] Looking for a reachable quotes page...");
    let probed = Prober::new(client, config.probe.min_body_chars)
        .probe(&config.probe.endpoints)
        .await;

    let body = match &probed {
        Some(p) => {
            info!("[RUN] Page loaded: {} characters", p.body.chars().count());
            p.body.as_str()
        }
        None => {
            warn!("[RUN] No endpoint reachable, continuing with fallback data");
            ""
        }
    };

    let observation = extract::extract(&config.funds, body);

    let columns = config.funds.columns();
    let path = &config.ledger.path;
    let mut ledger = Ledger::load(path, &columns)?;

    let values = observation.iter().map(|(id, resolved)| {
        (
            config.funds.get(id).display_name.as_str(),
            resolved.value.as_str(),
        )
    });
    let outcome = ledger.merge(date, values);
    ledger.save(path)?;

    let summary = ledger.summary(date, &columns);
    summary.log();

    Ok(RunReport {
        endpoint: probed.map(|p| p.url),
        observation,
        outcome,
        summary,
    })
}
