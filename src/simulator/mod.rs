//! Shadow simulator
//!
//! Replays swaps against cached constant-product reserves. Nothing here
//! touches shared state: every bundle runs on its own working copy of
//! the pool snapshot.

pub mod amm;
pub mod intent;

pub use intent::{swap_intent, SwapIntent};

use ethers::types::U256;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::error::SimulationError;
use crate::math;
use crate::state::StateCache;
use crate::types::{PoolState, SwapDirection, Transaction, SWAP_GAS_LIMIT};

/// Result of replaying one swap in isolation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapSimulation {
    pub success: bool,
    pub amount_out: U256,
    pub gas_used: u64,
    pub intent: Option<SwapIntent>,
    /// Snapshot the swap ran against
    pub pool: Option<PoolState>,
    /// False when the snapshot is a freshly inserted placeholder
    pub cache_hit: bool,
    pub error: Option<SimulationError>,
}

/// Result of replaying a frontrun / victim / backrun triple.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BundleSimulation {
    pub success: bool,
    /// Backrun proceeds minus frontrun spend, in the input asset
    pub frontrun_profit: U256,
    /// Backrun proceeds minus an immediate unwind of the frontrun
    pub backrun_profit: U256,
    pub victim_slippage: U256,
    pub victim_out_clean: U256,
    pub frontrun_in: U256,
    /// Sold back by the backrun
    pub acquired: U256,
    pub total_gas: u64,
    pub error: Option<SimulationError>,
}

impl BundleSimulation {
    fn failed(error: SimulationError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    /// Victim slippage relative to its clean output, in basis points.
    pub fn victim_slippage_bps(&self) -> u64 {
        math::mul_div(self.victim_slippage, U256::from(math::BPS), self.victim_out_clean)
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(u64::MAX)
    }
}

pub struct ShadowSimulator {
    state: Arc<StateCache>,
    count: AtomicU64,
}

impl ShadowSimulator {
    pub fn new(state: Arc<StateCache>) -> Self {
        Self {
            state,
            count: AtomicU64::new(0),
        }
    }

    /// Simulates `tx` alone against the cached state of its pool.
    pub fn simulate_swap(&self, tx: &Transaction) -> SwapSimulation {
        self.count.fetch_add(1, Ordering::Relaxed);

        let Some(intent) = swap_intent(tx) else {
            return SwapSimulation {
                success: false,
                amount_out: U256::zero(),
                gas_used: 0,
                intent: None,
                pool: None,
                cache_hit: false,
                error: Some(SimulationError::Unsimulatable),
            };
        };

        // pools are keyed by the recipient router
        let lookup = self.state.lookup(&tx.to);
        let cache_hit = lookup.is_hit();
        let pool = lookup.into_state();
        let (r_in, r_out) = pool.reserves(intent.direction);
        let amount_out = amm::get_amount_out(intent.amount_in, r_in, r_out, pool.fee_bps);
        let error = amount_out.is_zero().then_some(SimulationError::NoLiquidity);

        SwapSimulation {
            success: error.is_none(),
            amount_out,
            gas_used: tx.gas_limit,
            intent: Some(intent),
            pool: Some(pool),
            cache_hit,
            error,
        }
    }

    /// Simulates `[frontrun, victim, backrun]` in order on one working
    /// copy of the victim's pool.
    pub fn simulate_bundle(&self, txs: &[Transaction; 3]) -> BundleSimulation {
        let [front, victim, back] = txs;
        let (Some(f), Some(v), Some(b)) = (swap_intent(front), swap_intent(victim), swap_intent(back)) else {
            self.count.fetch_add(1, Ordering::Relaxed);
            return BundleSimulation::failed(SimulationError::Unsimulatable);
        };
        if f.direction != v.direction || b.direction != v.direction.reversed() {
            self.count.fetch_add(1, Ordering::Relaxed);
            return BundleSimulation::failed(SimulationError::DirectionMismatch);
        }
        let pool = self.state.lookup(&victim.to).into_state();
        self.simulate_sandwich(&pool, v.direction, f.amount_in, v.amount_in, victim.gas_limit)
    }

    /// Core sandwich replay. The backrun always sells exactly what the
    /// frontrun acquired.
    pub fn simulate_sandwich(
        &self,
        pool: &PoolState,
        direction: SwapDirection,
        frontrun_in: U256,
        victim_in: U256,
        victim_gas: u64,
    ) -> BundleSimulation {
        self.count.fetch_add(1, Ordering::Relaxed);
        match Self::replay(pool, direction, frontrun_in, victim_in, victim_gas) {
            Ok(sim) => sim,
            Err(e) => {
                debug!(error = %e, %frontrun_in, %victim_in, "sandwich rejected");
                BundleSimulation::failed(e)
            }
        }
    }

    fn replay(
        pool: &PoolState,
        direction: SwapDirection,
        frontrun_in: U256,
        victim_in: U256,
        victim_gas: u64,
    ) -> Result<BundleSimulation, SimulationError> {
        if !pool.has_liquidity() {
            return Err(SimulationError::NoLiquidity);
        }
        let fee = pool.fee_bps;
        let (r_in, r_out) = pool.reserves(direction);
        let victim_out_clean = amm::get_amount_out(victim_in, r_in, r_out, fee);

        let mut working = pool.clone();

        let (r_in, r_out) = working.reserves(direction);
        let acquired = amm::get_amount_out(frontrun_in, r_in, r_out, fee);
        if acquired.is_zero() {
            return Err(SimulationError::NoLiquidity);
        }
        working.apply_swap(direction, frontrun_in, acquired);

        let (r_in, r_out) = working.reserves(direction.reversed());
        let unwind_out = amm::get_amount_out(acquired, r_in, r_out, fee);

        let (r_in, r_out) = working.reserves(direction);
        let victim_out = amm::get_amount_out(victim_in, r_in, r_out, fee);
        working.apply_swap(direction, victim_in, victim_out);

        let (r_in, r_out) = working.reserves(direction.reversed());
        let backrun_out = amm::get_amount_out(acquired, r_in, r_out, fee);
        working.apply_swap(direction.reversed(), acquired, backrun_out);

        let victim_slippage = victim_out_clean.saturating_sub(victim_out);
        if victim_slippage.is_zero() {
            return Err(SimulationError::NoSlippage);
        }
        let frontrun_profit = backrun_out
            .checked_sub(frontrun_in)
            .filter(|p| !p.is_zero())
            .ok_or(SimulationError::Unprofitable {
                frontrun_in,
                backrun_out,
            })?;

        Ok(BundleSimulation {
            success: true,
            frontrun_profit,
            backrun_profit: backrun_out.saturating_sub(unwind_out),
            victim_slippage,
            victim_out_clean,
            frontrun_in,
            acquired,
            total_gas: 2 * SWAP_GAS_LIMIT + victim_gas,
            error: None,
        })
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}
