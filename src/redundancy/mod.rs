//! Cross-validated profit estimation.
//!
//! Up to three independent estimators run on the worker pool, each
//! bounded by a deadline. Missing answers degrade confidence instead of
//! failing the decision.

pub mod estimators;
pub mod pool;

pub use estimators::{
    default_estimators, EstimateInput, HeuristicEstimator, LinearEstimator, ProfitEstimator,
    TableEstimator,
};
pub use pool::WorkerPool;

use crossbeam_channel::RecvTimeoutError;
use ethers::types::U256;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::RedundancyConfig;
use crate::math;

pub const CONFIDENCE_AGREED: u8 = 95;
pub const CONFIDENCE_DISAGREED: u8 = 75;
pub const CONFIDENCE_SINGLE: u8 = 50;

/// Reconciled estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Consensus {
    /// Median of the completed estimates
    pub value: U256,
    /// At least two answers, all within tolerance of each other
    pub agreed: bool,
    pub confidence: u8,
    pub completed: usize,
    pub requested: usize,
}

/// Reduces completed estimates to a consensus. `None` when nothing
/// completed.
pub fn reconcile(values: &[U256], requested: usize, tolerance_bps: u32) -> Option<Consensus> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let n = sorted.len();
    let value = if n % 2 == 1 {
        sorted[n / 2]
    } else {
        let (a, b) = (sorted[n / 2 - 1], sorted[n / 2]);
        // floor((a + b) / 2) without overflow
        let carry = U256::from(a.low_u64() & b.low_u64() & 1);
        (a >> 1).saturating_add(b >> 1).saturating_add(carry)
    };

    let (min, max) = (sorted[0], sorted[n - 1]);
    let within_tolerance = max.is_zero()
        || math::mul_div(max.saturating_sub(min), U256::from(math::BPS), max)
            .is_some_and(|spread| spread <= U256::from(tolerance_bps));
    let agreed = n >= 2 && within_tolerance;

    // full confidence needs the whole requested set
    let confidence = if n == 1 {
        CONFIDENCE_SINGLE
    } else if agreed && n == requested {
        CONFIDENCE_AGREED
    } else {
        CONFIDENCE_DISAGREED
    };

    Some(Consensus {
        value,
        agreed,
        confidence,
        completed: n,
        requested,
    })
}

pub struct RedundancyEngine {
    estimators: Vec<Arc<dyn ProfitEstimator>>,
    pool: Arc<WorkerPool>,
    level: usize,
    parallel: bool,
    timeout: Duration,
    tolerance_bps: u32,
    timeouts: AtomicU64,
    disagreements: AtomicU64,
}

impl RedundancyEngine {
    pub fn new(
        estimators: Vec<Arc<dyn ProfitEstimator>>,
        pool: Arc<WorkerPool>,
        config: &RedundancyConfig,
    ) -> Self {
        let level = (config.level as usize).clamp(1, estimators.len().max(1));
        Self {
            estimators,
            pool,
            level,
            parallel: config.parallel,
            timeout: config.timeout(),
            tolerance_bps: config.tolerance_bps,
            timeouts: AtomicU64::new(0),
            disagreements: AtomicU64::new(0),
        }
    }

    /// Runs the first `level` estimators and reconciles whatever
    /// completes before the deadline.
    pub fn estimate_consensus(&self, input: &EstimateInput) -> Option<Consensus> {
        let active = &self.estimators[..self.level.min(self.estimators.len())];
        if active.is_empty() {
            return None;
        }
        let results = if self.parallel && active.len() > 1 {
            self.run_parallel(active, input)
        } else {
            self.run_sequential(active, input)
        };

        let values: Vec<U256> = results.iter().flatten().copied().collect();
        let consensus = reconcile(&values, active.len(), self.tolerance_bps);
        match &consensus {
            Some(c) if !c.agreed && c.completed > 1 => {
                self.disagreements.fetch_add(1, Ordering::Relaxed);
                debug!(
                    estimates = ?results,
                    median = %c.value,
                    "estimators disagree"
                );
            }
            None => warn!(requested = active.len(), "no estimator completed"),
            _ => {}
        }
        consensus
    }

    /// Inline, in order. No deadline applies.
    fn run_sequential(&self, active: &[Arc<dyn ProfitEstimator>], input: &EstimateInput) -> Vec<Option<U256>> {
        active.iter().map(|est| est.estimate(input)).collect()
    }

    fn run_parallel(&self, active: &[Arc<dyn ProfitEstimator>], input: &EstimateInput) -> Vec<Option<U256>> {
        let (tx, rx) = crossbeam_channel::bounded(active.len());
        let mut results = vec![None; active.len()];
        let mut pending = 0usize;

        for (idx, est) in active.iter().enumerate() {
            let est = est.clone();
            let tx = tx.clone();
            let owned = *input;
            let job = Box::new(move || {
                let _ = tx.send((idx, est.estimate(&owned)));
            });
            match self.pool.execute(job) {
                Ok(()) => pending += 1,
                // saturated or stopping: run it here rather than lose it
                Err(e) => {
                    debug!(estimator = active[idx].name(), error = %e, "estimating inline");
                    results[idx] = active[idx].estimate(input);
                }
            }
        }
        drop(tx);

        let deadline = Instant::now() + self.timeout;
        while pending > 0 {
            match rx.recv_deadline(deadline) {
                Ok((idx, value)) => {
                    results[idx] = value;
                    pending -= 1;
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.timeouts.fetch_add(pending as u64, Ordering::Relaxed);
                    warn!(pending, "estimator deadline expired");
                    break;
                }
                // every remaining job dropped its sender without answering
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        results
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    pub fn disagreements(&self) -> u64 {
        self.disagreements.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn amounts(v: &[u64]) -> Vec<U256> {
        v.iter().copied().map(U256::from).collect()
    }

    struct Fixed(&'static str, Option<u64>);

    impl ProfitEstimator for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }

        fn estimate(&self, _input: &EstimateInput) -> Option<U256> {
            self.1.map(U256::from)
        }
    }

    struct Slow(Duration);

    impl ProfitEstimator for Slow {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn estimate(&self, _input: &EstimateInput) -> Option<U256> {
            std::thread::sleep(self.0);
            Some(U256::from(1_000_000))
        }
    }

    fn input() -> EstimateInput {
        EstimateInput {
            victim_amount: U256::from(1_000),
            reserve_in: U256::from(1_000_000),
            reserve_out: U256::from(1_000_000),
            fee_bps: 30,
        }
    }

    fn config(level: u8, parallel: bool) -> RedundancyConfig {
        RedundancyConfig {
            level,
            parallel,
            timeout_ms: 50,
            ..Default::default()
        }
    }

    #[test]
    fn test_outlier_breaks_agreement() {
        let c = reconcile(&amounts(&[100, 105, 200]), 3, 1_000).unwrap();
        assert!(!c.agreed);
        assert_eq!(c.value, U256::from(105));
        assert_eq!(c.confidence, CONFIDENCE_DISAGREED);
    }

    #[test]
    fn test_close_values_agree() {
        let c = reconcile(&amounts(&[100, 102, 98]), 3, 1_000).unwrap();
        assert!(c.agreed);
        assert_eq!(c.value, U256::from(100));
        assert_eq!(c.confidence, CONFIDENCE_AGREED);
    }

    #[test]
    fn test_two_values_use_floor_mean() {
        let c = reconcile(&amounts(&[101, 104]), 3, 1_000).unwrap();
        assert_eq!(c.value, U256::from(102));
        // the pair agrees, but one estimator is missing
        assert!(c.agreed);
        assert_eq!(c.confidence, CONFIDENCE_DISAGREED);
        let full = reconcile(&amounts(&[101, 104]), 2, 1_000).unwrap();
        assert_eq!(full.confidence, CONFIDENCE_AGREED);
        let max = reconcile(&[U256::MAX, U256::MAX], 2, 0).unwrap();
        assert_eq!(max.value, U256::MAX);
    }

    #[test]
    fn test_single_and_empty() {
        let c = reconcile(&amounts(&[7]), 1, 1_000).unwrap();
        assert_eq!(c.confidence, CONFIDENCE_SINGLE);
        assert!(!c.agreed);
        assert_eq!(reconcile(&[], 3, 1_000), None);
        assert!(reconcile(&amounts(&[0, 0, 0]), 3, 0).unwrap().agreed);
    }

    #[test]
    fn test_parallel_consensus() {
        let pool = Arc::new(WorkerPool::new(3, 16, "est"));
        let set: Vec<Arc<dyn ProfitEstimator>> = vec![
            Arc::new(Fixed("a", Some(100))),
            Arc::new(Fixed("b", Some(102))),
            Arc::new(Fixed("c", Some(98))),
        ];
        let engine = RedundancyEngine::new(set, pool, &config(3, true));
        let c = engine.estimate_consensus(&input()).unwrap();
        assert!(c.agreed);
        assert_eq!(c.value, U256::from(100));
        assert_eq!(c.completed, 3);
    }

    #[test]
    fn test_slow_estimator_times_out() {
        let pool = Arc::new(WorkerPool::new(3, 16, "est"));
        let set: Vec<Arc<dyn ProfitEstimator>> = vec![
            Arc::new(Fixed("a", Some(100))),
            Arc::new(Slow(Duration::from_millis(500))),
            Arc::new(Fixed("c", Some(110))),
        ];
        let engine = RedundancyEngine::new(set, pool, &config(3, true));
        let c = engine.estimate_consensus(&input()).unwrap();
        assert_eq!(c.completed, 2);
        assert!(c.agreed);
        assert_eq!(c.confidence, CONFIDENCE_DISAGREED);
        assert_eq!(c.value, U256::from(105));
        assert_eq!(engine.timeouts(), 1);
    }

    #[test]
    fn test_level_limits_estimators() {
        let pool = Arc::new(WorkerPool::new(1, 4, "est"));
        let set: Vec<Arc<dyn ProfitEstimator>> = vec![
            Arc::new(Fixed("a", Some(40))),
            Arc::new(Fixed("b", Some(9_999))),
        ];
        let engine = RedundancyEngine::new(set, pool, &config(1, false));
        let c = engine.estimate_consensus(&input()).unwrap();
        assert_eq!(c.value, U256::from(40));
        assert_eq!(c.confidence, CONFIDENCE_SINGLE);
        assert_eq!(engine.level(), 1);
    }

    #[test]
    fn test_stopped_pool_estimates_inline() {
        let pool = Arc::new(WorkerPool::new(2, 4, "est"));
        pool.shutdown();
        let set: Vec<Arc<dyn ProfitEstimator>> = vec![
            Arc::new(Fixed("a", Some(100))),
            Arc::new(Fixed("b", Some(104))),
            Arc::new(Fixed("c", Some(96))),
        ];
        let engine = RedundancyEngine::new(set, pool, &config(3, true));
        let c = engine.estimate_consensus(&input()).unwrap();
        assert_eq!(c.completed, 3);
        assert_eq!(c.value, U256::from(100));
        assert_eq!(engine.timeouts(), 0);
    }

    #[test]
    fn test_all_absent() {
        let pool = Arc::new(WorkerPool::new(2, 4, "est"));
        let set: Vec<Arc<dyn ProfitEstimator>> =
            vec![Arc::new(Fixed("a", None)), Arc::new(Fixed("b", None))];
        let engine = RedundancyEngine::new(set, pool, &config(2, true));
        assert_eq!(engine.estimate_consensus(&input()), None);
    }

    proptest! {
        #[test]
        fn prop_consensus_within_bounds(raw in proptest::collection::vec(any::<u128>(), 1..=5)) {
            let values: Vec<U256> = raw.iter().copied().map(U256::from).collect();
            let c = reconcile(&values, values.len(), 1_000).unwrap();
            let min = values.iter().min().copied().unwrap();
            let max = values.iter().max().copied().unwrap();
            prop_assert!(c.value >= min && c.value <= max);
            prop_assert_eq!(c.completed, values.len());
            if values.len() == 1 {
                prop_assert_eq!(c.confidence, CONFIDENCE_SINGLE);
            }
        }
    }
}
