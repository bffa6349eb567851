//! Metrics collection and exposition.
//!
//! # Metrics
//! - `rtrmgr_commits_total` (counter): commit attempts by outcome
//! - `rtrmgr_actions_dispatched_total` (counter): actions sent to modules
//! - `rtrmgr_commit_duration_seconds` (histogram): commit latency

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Outcome label of a finished commit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Success,
    /// Nothing changed; no transaction was opened.
    Empty,
    Rejected,
    Failed,
}

impl CommitOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitOutcome::Success => "success",
            CommitOutcome::Empty => "empty",
            CommitOutcome::Rejected => "rejected",
            CommitOutcome::Failed => "failed",
        }
    }
}

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_commit(outcome: CommitOutcome, start: Instant) {
    metrics::counter!("rtrmgr_commits_total", "outcome" => outcome.as_str()).increment(1);
    metrics::histogram!("rtrmgr_commit_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_actions_dispatched(module: &str, count: usize) {
    if count > 0 {
        metrics::counter!("rtrmgr_actions_dispatched_total", "module" => module.to_string())
            .increment(count as u64);
    }
}
