//! Pipeline counters and rolling stage latencies.
//!
//! Values live in atomics so `snapshot` never contends with the hot
//! path. Every update is mirrored to the `metrics` facade; the binary
//! installs a Prometheus recorder when an address is configured.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Pipeline stage, used for rejection counters and latency tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Decode,
    Prefilter,
    Simulation,
    Sizing,
    Consensus,
    Viability,
    Assembly,
    Submission,
}

const STAGES: usize = 8;

impl Stage {
    pub const ALL: [Stage; STAGES] = [
        Stage::Decode,
        Stage::Prefilter,
        Stage::Simulation,
        Stage::Sizing,
        Stage::Consensus,
        Stage::Viability,
        Stage::Assembly,
        Stage::Submission,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Stage::Decode => "decode",
            Stage::Prefilter => "prefilter",
            Stage::Simulation => "simulation",
            Stage::Sizing => "sizing",
            Stage::Consensus => "consensus",
            Stage::Viability => "viability",
            Stage::Assembly => "assembly",
            Stage::Submission => "submission",
        }
    }

    #[inline]
    const fn idx(self) -> usize {
        self as usize
    }
}

/// Exponential moving average with weight 1/10; the first sample seeds it.
fn ema_update(cell: &AtomicU64, sample: u64) {
    let _ = cell.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |prev| {
        Some(if prev == 0 {
            sample.max(1)
        } else {
            (prev.saturating_mul(9) + sample) / 10
        })
    });
}

#[derive(Default)]
pub struct PipelineMetrics {
    processed: AtomicU64,
    opportunities: AtomicU64,
    submitted: AtomicU64,
    failures: AtomicU64,
    simulations: AtomicU64,
    default_state_inserts: AtomicU64,
    estimator_timeouts: AtomicU64,
    rejected: [AtomicU64; STAGES],
    stage_latency_ns: [AtomicU64; STAGES],
    total_latency_ns: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_processed(&self, elapsed: Duration) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        ema_update(&self.total_latency_ns, elapsed.as_nanos() as u64);
        metrics::counter!("mev_pipeline_processed_total").increment(1);
        metrics::histogram!("mev_pipeline_latency_seconds").record(elapsed.as_secs_f64());
    }

    pub fn record_stage(&self, stage: Stage, elapsed: Duration) {
        ema_update(&self.stage_latency_ns[stage.idx()], elapsed.as_nanos() as u64);
        metrics::histogram!("mev_pipeline_stage_latency_seconds", "stage" => stage.as_str())
            .record(elapsed.as_secs_f64());
    }

    pub fn reject(&self, stage: Stage) {
        self.rejected[stage.idx()].fetch_add(1, Ordering::Relaxed);
        metrics::counter!("mev_pipeline_rejected_total", "stage" => stage.as_str()).increment(1);
    }

    pub fn opportunity(&self) {
        self.opportunities.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("mev_pipeline_opportunities_total").increment(1);
    }

    pub fn submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("mev_pipeline_submitted_total").increment(1);
    }

    pub fn failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("mev_pipeline_failures_total").increment(1);
    }

    pub fn simulation(&self) {
        self.simulations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn default_state_insert(&self) {
        self.default_state_inserts.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("mev_pipeline_state_default_inserts_total").increment(1);
    }

    pub fn estimator_timeouts(&self, count: u64) {
        if count > 0 {
            self.estimator_timeouts.fetch_add(count, Ordering::Relaxed);
            metrics::counter!("mev_pipeline_estimator_timeouts_total").increment(count);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |a: &AtomicU64| a.load(Ordering::Relaxed);
        MetricsSnapshot {
            transactions_processed: load(&self.processed),
            opportunities_found: load(&self.opportunities),
            bundles_submitted: load(&self.submitted),
            submission_failures: load(&self.failures),
            simulations_run: load(&self.simulations),
            default_state_inserts: load(&self.default_state_inserts),
            estimator_timeouts: load(&self.estimator_timeouts),
            avg_latency_ns: load(&self.total_latency_ns),
            rejected: Stage::ALL
                .iter()
                .map(|s| (*s, load(&self.rejected[s.idx()])))
                .collect(),
            stage_latency_ns: Stage::ALL
                .iter()
                .map(|s| (*s, load(&self.stage_latency_ns[s.idx()])))
                .collect(),
        }
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub transactions_processed: u64,
    pub opportunities_found: u64,
    pub bundles_submitted: u64,
    pub submission_failures: u64,
    pub simulations_run: u64,
    pub default_state_inserts: u64,
    pub estimator_timeouts: u64,
    /// Rolling end-to-end latency
    pub avg_latency_ns: u64,
    pub rejected: BTreeMap<Stage, u64>,
    pub stage_latency_ns: BTreeMap<Stage, u64>,
}

impl MetricsSnapshot {
    pub fn rejected_at(&self, stage: Stage) -> u64 {
        self.rejected.get(&stage).copied().unwrap_or(0)
    }
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed={} opportunities={} submitted={} failures={} sims={} avg={:.1}µs",
            self.transactions_processed,
            self.opportunities_found,
            self.bundles_submitted,
            self.submission_failures,
            self.simulations_run,
            self.avg_latency_ns as f64 / 1_000.0,
        )?;
        for (stage, count) in self.rejected.iter().filter(|(_, c)| **c > 0) {
            write!(f, " rej.{}={}", stage.as_str(), count)?;
        }
        Ok(())
    }
}
