//! One-shot probe sweeps.
//!
//! Probes every distinct address of a target list once through a
//! [`Prober`] and collects the outcomes into a [`SweepReport`].

mod rate_limiter;

pub use rate_limiter::RateLimiter;

use crate::ping::Prober;
use crate::types::ProbeTarget;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::Instant;

/// Whether an address answered its probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reachability {
    Reachable,
    Unreachable,
}

impl fmt::Display for Reachability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reachable => write!(f, "reachable"),
            Self::Unreachable => write!(f, "unreachable"),
        }
    }
}

/// Outcome for one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepEntry {
    /// Target as given on the command line.
    pub target: String,
    pub address: IpAddr,
    pub status: Reachability,
    /// Round trip in microseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtt_micros: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of a finished sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub probed: usize,
    pub reachable: usize,
    pub unreachable: usize,
    pub results: Vec<SweepEntry>,
}

/// Sweep tuning.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Maximum probes in flight.
    pub concurrency: usize,
    /// Probes per second, 0 for unlimited.
    pub rate_limit: u32,
    /// Keep unreachable addresses in the result list.
    pub show_unreachable: bool,
    /// Draw a progress bar.
    pub verbose: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            concurrency: 256,
            rate_limit: 0,
            show_unreachable: false,
            verbose: false,
        }
    }
}

/// Drop repeated addresses, keeping the first target that produced each.
pub fn distinct_targets(targets: Vec<ProbeTarget>) -> Vec<ProbeTarget> {
    let mut seen = HashSet::new();
    targets
        .into_iter()
        .filter(|target| seen.insert(target.ip))
        .collect()
}

/// Probe every distinct address in `targets` once.
pub async fn run_sweep(
    prober: Arc<dyn Prober>,
    targets: Vec<ProbeTarget>,
    config: &SweepConfig,
) -> SweepReport {
    let started_at = Utc::now();
    let start = Instant::now();
    let targets = distinct_targets(targets);
    let probed = targets.len();

    let progress = if config.verbose {
        let pb = ProgressBar::new(probed as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
        {
            pb.set_style(style.progress_chars("=>-"));
        }
        Some(pb)
    } else {
        None
    };

    let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let limiter = RateLimiter::new(config.rate_limit);

    let mut results: Vec<SweepEntry> = stream::iter(targets)
        .map(|target| {
            let semaphore = Arc::clone(&semaphore);
            let prober = Arc::clone(&prober);
            let limiter = limiter.clone();
            let progress = progress.clone();

            async move {
                // The semaphore is never closed
                let _permit = semaphore.acquire_owned().await.ok();
                if let Some(limiter) = &limiter {
                    limiter.wait().await;
                }

                let outcome = prober.probe(target.ip).await;
                let entry = match outcome {
                    Ok(echo) => SweepEntry {
                        target: target.original,
                        address: target.ip,
                        status: Reachability::Reachable,
                        rtt_micros: Some(echo.rtt_micros()),
                        error: None,
                    },
                    Err(e) => SweepEntry {
                        target: target.original,
                        address: target.ip,
                        status: Reachability::Unreachable,
                        rtt_micros: None,
                        error: Some(e.to_string()),
                    },
                };

                if let Some(pb) = &progress {
                    pb.inc(1);
                    if entry.status == Reachability::Reachable {
                        pb.set_message(format!("{} is up", entry.address));
                    }
                }
                entry
            }
        })
        .buffer_unordered(config.concurrency.max(1))
        .collect()
        .await;

    if let Some(pb) = progress {
        pb.finish_with_message("Sweep complete");
    }

    let reachable = results
        .iter()
        .filter(|entry| entry.status == Reachability::Reachable)
        .count();

    if !config.show_unreachable {
        results.retain(|entry| entry.status == Reachability::Reachable);
    }
    results.sort_by_key(|entry| entry.address);

    SweepReport {
        started_at,
        duration_ms: start.elapsed().as_millis() as u64,
        probed,
        reachable,
        unreachable: probed - reachable,
        results,
    }
}
