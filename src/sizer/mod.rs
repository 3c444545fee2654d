//! Optimal frontrun sizing
//!
//! A table indexed by (victim bucket, liquidity bucket) is filled once at
//! startup by solving the sandwich on a balanced pool at each bucket's
//! representative values. Lookups scale the stored entry to the actual
//! victim size; anything the table cannot answer is solved exactly.

pub mod buckets;

pub use buckets::LogBuckets;

use ethers::types::U256;
use std::sync::OnceLock;
use std::time::Instant;
use tracing::{info, warn};

use crate::config::SizerConfig;
use crate::error::SizerError;
use crate::math;
use crate::simulator::amm;
use crate::types::SizingResult;

const PPM: u64 = 1_000_000;
/// Frontrun search window, as a fraction of the victim amount.
const MIN_PPM: u32 = 1_000;
const MAX_PPM: u32 = 500_000;
const GRID_STEP_PPM: u32 = 5_000;

const TABLE_CONFIDENCE: u8 = 80;
const EXACT_CONFIDENCE: u8 = 95;

#[derive(Debug, Clone, Copy, Default)]
struct TableEntry {
    victim_ref: U256,
    frontrun: U256,
    profit: U256,
    slippage: U256,
    confidence: u8,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    ppm: u32,
    frontrun: U256,
    acquired: U256,
    profit: U256,
    slippage: U256,
}

pub struct OptimalSizer {
    victim_buckets: LogBuckets,
    liquidity_buckets: LogBuckets,
    table_fee_bps: u32,
    tip_share_bps: u32,
    congestion_threshold: u8,
    congestion_multiplier_bps: u32,
    base_fee_margin_bps: u32,
    table: OnceLock<Vec<TableEntry>>,
}

impl OptimalSizer {
    pub fn new(config: &SizerConfig) -> Result<Self, SizerError> {
        Ok(Self {
            victim_buckets: LogBuckets::new(
                config.min_victim_wei,
                config.max_victim_wei,
                config.victim_buckets,
            )?,
            liquidity_buckets: LogBuckets::new(
                config.min_liquidity_wei,
                config.max_liquidity_wei,
                config.liquidity_buckets,
            )?,
            table_fee_bps: config.table_fee_bps,
            tip_share_bps: config.tip_share_bps,
            congestion_threshold: config.congestion_threshold,
            congestion_multiplier_bps: config.congestion_multiplier_bps,
            base_fee_margin_bps: config.base_fee_margin_bps,
            table: OnceLock::new(),
        })
    }

    /// Fills the sizing table across all cores. Idempotent.
    pub fn precompute(&self) {
        if self.table.get().is_some() {
            return;
        }
        let started = Instant::now();
        let rows = self.victim_buckets.len();
        let cols = self.liquidity_buckets.len();
        let threads = num_cpus::get().clamp(1, rows);
        let chunk = rows.div_ceil(threads);

        let row_range = |start: usize, end: usize| -> Vec<TableEntry> {
            (start..end)
                .flat_map(|vi| (0..cols).map(move |li| self.compute_entry(vi, li)))
                .collect()
        };

        let entries: Vec<TableEntry> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..rows)
                .step_by(chunk)
                .map(|start| {
                    let end = (start + chunk).min(rows);
                    (start, end, s.spawn(move || row_range(start, end)))
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|(start, end, h)| {
                    h.join().unwrap_or_else(|_| {
                        warn!(start, end, "sizing worker panicked, recomputing rows inline");
                        row_range(start, end)
                    })
                })
                .collect()
        });

        let profitable = entries.iter().filter(|e| e.confidence > 0).count();
        if self.table.set(entries).is_ok() {
            info!(
                rows,
                cols,
                profitable,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "sizing table precomputed"
            );
        }
    }

    pub fn is_ready(&self) -> bool {
        self.table.get().is_some()
    }

    fn compute_entry(&self, vi: usize, li: usize) -> TableEntry {
        let victim = self.victim_buckets.representative(vi);
        let half = self
            .liquidity_buckets
            .representative(li)
            .checked_div(U256::from(2))
            .unwrap_or(U256::zero());
        match Self::search(victim, half, half, self.table_fee_bps) {
            Some(best) => TableEntry {
                victim_ref: victim,
                frontrun: best.frontrun,
                profit: best.profit,
                slippage: best.slippage,
                confidence: TABLE_CONFIDENCE,
            },
            None => TableEntry {
                victim_ref: victim,
                ..Default::default()
            },
        }
    }

    /// Sizes a frontrun for `victim_amount` against `(reserve_in, reserve_out)`.
    ///
    /// Liquidity is bucketed by twice the input-side reserve, the depth of
    /// the balanced pool the table was built on.
    pub fn calculate(
        &self,
        victim_amount: U256,
        reserve_in: U256,
        reserve_out: U256,
        fee_bps: u32,
    ) -> Result<SizingResult, SizerError> {
        let table = self.table.get().ok_or(SizerError::NotPrecomputed)?;
        if victim_amount.is_zero() || reserve_in.is_zero() || reserve_out.is_zero() {
            return Ok(SizingResult::none());
        }
        if fee_bps != self.table_fee_bps {
            return Ok(Self::solve(victim_amount, reserve_in, reserve_out, fee_bps));
        }

        let vi = self.victim_buckets.index(&victim_amount);
        let li = self
            .liquidity_buckets
            .index(&reserve_in.saturating_mul(U256::from(2)));
        let entry = table[vi * self.liquidity_buckets.len() + li];
        if entry.confidence == 0 || entry.victim_ref.is_zero() {
            return Ok(Self::solve(victim_amount, reserve_in, reserve_out, fee_bps));
        }

        let scale = |v: U256| math::mul_div(v, victim_amount, entry.victim_ref).unwrap_or(U256::MAX);
        let frontrun = scale(entry.frontrun);
        Ok(SizingResult {
            frontrun_amount: frontrun,
            backrun_amount: amm::get_amount_out(frontrun, reserve_in, reserve_out, fee_bps),
            expected_profit: scale(entry.profit),
            victim_slippage: scale(entry.slippage),
            confidence: entry.confidence,
        })
    }

    /// Exact search: coarse grid over the window, then halving refinement
    /// around the best point.
    pub fn solve(victim_amount: U256, reserve_in: U256, reserve_out: U256, fee_bps: u32) -> SizingResult {
        match Self::search(victim_amount, reserve_in, reserve_out, fee_bps) {
            Some(best) => SizingResult {
                frontrun_amount: best.frontrun,
                backrun_amount: best.acquired,
                expected_profit: best.profit,
                victim_slippage: best.slippage,
                confidence: EXACT_CONFIDENCE,
            },
            None => SizingResult::none(),
        }
    }

    fn search(victim: U256, reserve_in: U256, reserve_out: U256, fee_bps: u32) -> Option<Candidate> {
        if victim.is_zero() || reserve_in.is_zero() || reserve_out.is_zero() {
            return None;
        }
        let eval = |ppm: u32| -> Option<Candidate> {
            let frontrun = math::mul_div(victim, U256::from(ppm), U256::from(PPM))?;
            if frontrun.is_zero() {
                return None;
            }
            let legs = amm::sandwich(frontrun, victim, reserve_in, reserve_out, fee_bps);
            let slippage = legs.victim_slippage();
            // a frontrun that does not move the victim is not a sandwich
            if slippage.is_zero() {
                return None;
            }
            Some(Candidate {
                ppm,
                frontrun,
                acquired: legs.acquired,
                profit: legs.profit(frontrun)?,
                slippage,
            })
        };

        let mut best: Option<Candidate> = None;
        for ppm in (MIN_PPM..=MAX_PPM).step_by(GRID_STEP_PPM as usize) {
            keep_better(&mut best, eval(ppm));
        }
        let mut step = GRID_STEP_PPM / 2;
        while step > 0 {
            let Some(center) = best.map(|b| b.ppm) else { break };
            for ppm in [center.saturating_sub(step), center.saturating_add(step)] {
                if (MIN_PPM..=MAX_PPM).contains(&ppm) {
                    keep_better(&mut best, eval(ppm));
                }
            }
            step /= 2;
        }
        best
    }

    /// Priority tip for a bundle expected to earn `expected_profit`.
    ///
    /// Never below the base fee plus the configured margin.
    pub fn estimate_tip(&self, expected_profit: U256, base_fee: U256, congestion: u8) -> U256 {
        let mut tip = math::apply_bps(expected_profit, self.tip_share_bps);
        if congestion > self.congestion_threshold {
            tip = math::apply_bps(tip, self.congestion_multiplier_bps);
        }
        let floor = math::apply_bps(base_fee, 10_000 + self.base_fee_margin_bps)
            .max(base_fee.saturating_add(U256::one()));
        tip.max(floor)
    }

    pub fn victim_buckets(&self) -> &LogBuckets {
        &self.victim_buckets
    }

    pub fn liquidity_buckets(&self) -> &LogBuckets {
        &self.liquidity_buckets
    }

    pub fn table_fee_bps(&self) -> u32 {
        self.table_fee_bps
    }
}

fn keep_better(best: &mut Option<Candidate>, candidate: Option<Candidate>) {
    if let Some(c) = candidate {
        if best.map_or(true, |b| c.profit > b.profit) {
            *best = Some(c);
        }
    }
}
