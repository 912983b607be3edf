//! JSON-lines intake. Each line is one record tagged by `kind`:
//!
//! ```text
//! {"kind":"event","source":"jobs","type":"job.failed","payload":{...},"timestamp":"..."}
//! {"kind":"alert","source":"api","message":"5xx spike","severity":"critical"}
//! ```
//!
//! A bad record is logged and skipped; it never stops the feed.

use std::future::Future;

use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use ember_app::context::EngineContext;
use ember_core::error::DomainError;
use ember_core::signal::Event;
use ember_ports::error::UseCaseError;
use ember_ports::types::{AlertInput, IngestOutcome};

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FeedRecord {
    Event(Event),
    Alert(AlertInput),
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid record: {0}")]
    Invalid(#[from] DomainError),
    #[error(transparent)]
    UseCase(#[from] UseCaseError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub records: usize,
    pub rejected: usize,
    pub incidents_opened: usize,
}

impl FeedStats {
    fn record(&mut self, outcomes: &[IngestOutcome]) {
        self.records += 1;
        self.incidents_opened += outcomes
            .iter()
            .filter(|o| matches!(o, IngestOutcome::Opened(_)))
            .count();
    }
}

/// Handles one line and returns what ingestion did with it.
pub async fn process_line(
    ctx: &EngineContext,
    line: &str,
) -> Result<Vec<IngestOutcome>, FeedError> {
    match serde_json::from_str::<FeedRecord>(line)? {
        FeedRecord::Event(event) => Ok(ctx.events.handle_event(event).await?),
        FeedRecord::Alert(input) => {
            let alert = input.into_alert(ctx.clock.now())?;
            Ok(vec![ctx.alerts.ingest_alert(alert).await?])
        }
    }
}

/// Reads records until EOF or until `shutdown` resolves.
pub async fn run<R, S>(ctx: &EngineContext, reader: R, shutdown: S) -> std::io::Result<FeedStats>
where
    R: AsyncBufRead + Unpin,
    S: Future<Output = ()>,
{
    let mut lines = reader.lines();
    let mut stats = FeedStats::default();
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            biased;
            _ = &mut shutdown => {
                tracing::info!("feed interrupted");
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            tracing::info!("feed closed");
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match process_line(ctx, line).await {
            Ok(outcomes) => stats.record(&outcomes),
            Err(e) => {
                stats.rejected += 1;
                tracing::warn!(error = %e, "skipping feed record");
            }
        }
    }

    Ok(stats)
}
