//! Independent profit estimators.
//!
//! Each one sees the same inputs and must not share mutable state with
//! the others, so a fault in one cannot skew the rest.

use ethers::types::U256;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::config::RedundancyConfig;
use crate::math;
use crate::sizer::OptimalSizer;

/// Inputs every estimator receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EstimateInput {
    pub victim_amount: U256,
    pub reserve_in: U256,
    pub reserve_out: U256,
    pub fee_bps: u32,
}

pub trait ProfitEstimator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Expected profit in the victim's input asset. `None` when the
    /// estimator cannot produce a value for these inputs.
    fn estimate(&self, input: &EstimateInput) -> Option<U256>;
}

/// Reads the sizer's precomputed table.
pub struct TableEstimator {
    sizer: Arc<OptimalSizer>,
}

impl TableEstimator {
    pub fn new(sizer: Arc<OptimalSizer>) -> Self {
        Self { sizer }
    }
}

impl ProfitEstimator for TableEstimator {
    fn name(&self) -> &'static str {
        "table"
    }

    fn estimate(&self, input: &EstimateInput) -> Option<U256> {
        self.sizer
            .calculate(input.victim_amount, input.reserve_in, input.reserve_out, input.fee_bps)
            .ok()
            .map(|r| r.expected_profit)
    }
}

const FEATURES: usize = 4;

/// Linear model over price-impact features predicting profit as a
/// fraction of the victim amount. Weights adapt with [`observe`].
///
/// [`observe`]: LinearEstimator::observe
pub struct LinearEstimator {
    weights: RwLock<[f64; FEATURES]>,
    learning_rate: f64,
}

impl LinearEstimator {
    /// impact, impact^2, fee fraction, bias
    pub const DEFAULT_WEIGHTS: [f64; FEATURES] = [0.5, 0.0, -1.0, 0.008];

    pub fn new(learning_rate: f64) -> Self {
        Self::with_weights(Self::DEFAULT_WEIGHTS, learning_rate)
    }

    pub fn with_weights(weights: [f64; FEATURES], learning_rate: f64) -> Self {
        Self {
            weights: RwLock::new(weights),
            learning_rate,
        }
    }

    fn features(input: &EstimateInput) -> Option<[f64; FEATURES]> {
        let reserve = math::to_f64(input.reserve_in);
        if reserve <= 0.0 {
            return None;
        }
        let impact = math::to_f64(input.victim_amount) / reserve;
        Some([impact, impact * impact, input.fee_bps as f64 / 10_000.0, 1.0])
    }

    fn predict_ratio(&self, x: &[f64; FEATURES]) -> f64 {
        let w = self.weights.read();
        w.iter().zip(x).map(|(w, x)| w * x).sum()
    }

    /// One SGD step toward `realized_profit`.
    pub fn observe(&self, input: &EstimateInput, realized_profit: U256) {
        let Some(x) = Self::features(input) else { return };
        let victim = math::to_f64(input.victim_amount);
        if victim <= 0.0 {
            return;
        }
        let target = math::to_f64(realized_profit) / victim;
        let error = self.predict_ratio(&x) - target;
        if !error.is_finite() {
            return;
        }
        let mut w = self.weights.write();
        for (w, x) in w.iter_mut().zip(x) {
            *w -= self.learning_rate * error * x;
        }
    }

    pub fn weights(&self) -> [f64; FEATURES] {
        *self.weights.read()
    }
}

impl ProfitEstimator for LinearEstimator {
    fn name(&self) -> &'static str {
        "linear"
    }

    fn estimate(&self, input: &EstimateInput) -> Option<U256> {
        let x = Self::features(input)?;
        let ratio = self.predict_ratio(&x);
        if !ratio.is_finite() {
            return None;
        }
        Some(math::from_f64(math::to_f64(input.victim_amount) * ratio.max(0.0)))
    }
}

/// Fixed rule of thumb: frontrun a share of the victim and keep a
/// margin on it.
pub struct HeuristicEstimator {
    frontrun_bps: u32,
    margin_bps: u32,
}

impl HeuristicEstimator {
    pub fn new(frontrun_bps: u32, margin_bps: u32) -> Self {
        Self {
            frontrun_bps,
            margin_bps,
        }
    }
}

impl ProfitEstimator for HeuristicEstimator {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn estimate(&self, input: &EstimateInput) -> Option<U256> {
        let frontrun = math::apply_bps(input.victim_amount, self.frontrun_bps);
        Some(math::apply_bps(frontrun, self.margin_bps))
    }
}

/// The standard estimator set, table first. The linear model is also
/// returned so callers can feed it outcomes.
pub fn default_estimators(
    sizer: Arc<OptimalSizer>,
    config: &RedundancyConfig,
) -> (Vec<Arc<dyn ProfitEstimator>>, Arc<LinearEstimator>) {
    let linear = Arc::new(LinearEstimator::with_weights(
        config.linear_weights,
        config.linear_learning_rate,
    ));
    let set: Vec<Arc<dyn ProfitEstimator>> = vec![
        Arc::new(TableEstimator::new(sizer)),
        linear.clone(),
        Arc::new(HeuristicEstimator::new(
            config.heuristic_frontrun_bps,
            config.heuristic_margin_bps,
        )),
    ];
    (set, linear)
}
