//! Pipeline orchestration
//!
//! decode → prefilter → simulate → size → consensus → viability →
//! assemble → submit. Each stage either hands a richer value to the next
//! one or rejects with a counted reason. No stage blocks on I/O.

use anyhow::Context;
use bytes::Bytes;
use ethers::types::U256;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use crate::builder::BundleAssembler;
use crate::codec;
use crate::config::Config;
use crate::math;
use crate::metrics::{MetricsSnapshot, PipelineMetrics, Stage};
use crate::prefilter::{Prefilter, TxClass};
use crate::redundancy::{
    default_estimators, Consensus, EstimateInput, LinearEstimator, RedundancyEngine, WorkerPool,
};
use crate::simulator::{BundleSimulation, ShadowSimulator, SwapIntent};
use crate::sizer::OptimalSizer;
use crate::state::{ReserveSource, StateCache};
use crate::submit::BundleSubmitter;
use crate::types::{Opportunity, PoolState, SizingResult, Transaction, SWAP_GAS_LIMIT};

/// Consensus confidence at or above which the base profit threshold applies.
const HIGH_CONFIDENCE: u8 = 90;

/// Victim context produced by the simulation stage.
struct Victim {
    tx: Transaction,
    intent: SwapIntent,
    pool: PoolState,
}

/// Pre-screen outcome for one raw transaction.
enum Screened {
    Rejected(Stage),
    Passed(Transaction, TxClass),
}

pub struct MevEngine {
    config: Arc<Config>,
    prefilter: Arc<Prefilter>,
    state: Arc<StateCache>,
    simulator: ShadowSimulator,
    sizer: Arc<OptimalSizer>,
    linear: Arc<LinearEstimator>,
    redundancy: RedundancyEngine,
    assembler: BundleAssembler,
    submitter: Arc<dyn BundleSubmitter>,
    pool: Arc<WorkerPool>,
    metrics: PipelineMetrics,
    base_fee: RwLock<U256>,
    congestion: AtomicU8,
    running: AtomicBool,
}

impl MevEngine {
    /// Builds every stage and precomputes the sizing table.
    pub fn new(config: Config, submitter: Arc<dyn BundleSubmitter>) -> anyhow::Result<Self> {
        config.validate().context("invalid configuration")?;
        let config = Arc::new(config);

        let state = Arc::new(StateCache::new(&config.state));
        state.prewarm(&config.state.prewarm);
        let sizer = Arc::new(OptimalSizer::new(&config.sizer).context("sizer layout")?);
        sizer.precompute();

        let pool = Arc::new(WorkerPool::new(
            config.performance.worker_threads,
            config.performance.queue_capacity,
            "pipeline",
        ));
        let (estimators, linear) = default_estimators(sizer.clone(), &config.redundancy);
        let redundancy = RedundancyEngine::new(estimators, pool.clone(), &config.redundancy);

        info!(
            workers = pool.size(),
            redundancy = redundancy.level(),
            simulation_only = config.strategy.simulation_only,
            "engine initialized"
        );

        Ok(Self {
            prefilter: Arc::new(Prefilter::new(&config.prefilter)),
            simulator: ShadowSimulator::new(state.clone()),
            assembler: BundleAssembler::new(&config.strategy),
            state,
            sizer,
            linear,
            redundancy,
            submitter,
            pool,
            metrics: PipelineMetrics::new(),
            base_fee: RwLock::new(config.network.initial_base_fee_wei),
            congestion: AtomicU8::new(config.network.initial_congestion),
            running: AtomicBool::new(true),
            config,
        })
    }

    /// Runs one raw transaction through the whole pipeline. Returns true
    /// when a bundle was built and handed off (or would have been, in
    /// simulation-only mode).
    pub fn process(&self, raw: &[u8]) -> bool {
        self.process_shared(&Bytes::copy_from_slice(raw))
    }

    /// As [`process`](Self::process), sharing `raw` instead of copying it.
    pub fn process_shared(&self, raw: &Bytes) -> bool {
        if !self.is_running() {
            return false;
        }
        let started = Instant::now();
        let found = match screen(&self.prefilter, raw) {
            (Screened::Passed(tx, class), timings) => {
                self.record_screen_timings(timings);
                self.run_stages(tx, class)
            }
            (Screened::Rejected(stage), timings) => {
                self.record_screen_timings(timings);
                self.metrics.reject(stage);
                false
            }
        };
        self.metrics.record_processed(started.elapsed());
        found
    }

    /// Decodes and prefilters a batch on the worker pool, then runs the
    /// survivors through the remaining stages. Results keep input order.
    pub fn process_batch(&self, raws: &[Bytes]) -> Vec<bool> {
        if !self.is_running() {
            return vec![false; raws.len()];
        }
        let started = Instant::now();
        let (tx, rx) = crossbeam_channel::bounded(raws.len());
        let mut screened: Vec<Option<(Screened, [Duration; 2])>> = Vec::with_capacity(raws.len());
        screened.resize_with(raws.len(), || None);
        let mut pending = 0usize;

        for (idx, raw) in raws.iter().enumerate() {
            let prefilter = self.prefilter.clone();
            let raw_job = raw.clone();
            let tx = tx.clone();
            let job = Box::new(move || {
                let _ = tx.send((idx, screen(&prefilter, &raw_job)));
            });
            match self.pool.execute(job) {
                Ok(()) => pending += 1,
                Err(_) => screened[idx] = Some(screen(&self.prefilter, raw)),
            }
        }
        drop(tx);
        for _ in 0..pending {
            match rx.recv() {
                Ok((idx, result)) => screened[idx] = Some(result),
                Err(_) => break,
            }
        }

        let per_tx = started.elapsed() / raws.len().max(1) as u32;
        screened
            .into_iter()
            .zip(raws)
            .map(|(slot, raw)| {
                let t0 = Instant::now();
                // a job lost to a panicking worker is screened again here
                let (result, timings) = slot.unwrap_or_else(|| screen(&self.prefilter, raw));
                self.record_screen_timings(timings);
                let found = match result {
                    Screened::Passed(tx, class) => self.run_stages(tx, class),
                    Screened::Rejected(stage) => {
                        self.metrics.reject(stage);
                        false
                    }
                };
                self.metrics.record_processed(per_tx + t0.elapsed());
                found
            })
            .collect()
    }

    fn record_screen_timings(&self, timings: [Duration; 2]) {
        self.metrics.record_stage(Stage::Decode, timings[0]);
        if !timings[1].is_zero() {
            self.metrics.record_stage(Stage::Prefilter, timings[1]);
        }
    }

    fn run_stages(&self, tx: Transaction, class: TxClass) -> bool {
        trace!(to = ?tx.to, class = class.bits(), "prefilter passed");
        match self.evaluate(tx) {
            Ok(opportunity) => self.hand_off(&opportunity),
            Err(stage) => {
                self.metrics.reject(stage);
                false
            }
        }
    }

    /// Simulation through viability. Errors name the rejecting stage.
    fn evaluate(&self, tx: Transaction) -> Result<Opportunity, Stage> {
        let t = Instant::now();
        let victim = self.simulate_victim(tx)?;
        self.metrics.record_stage(Stage::Simulation, t.elapsed());

        let t = Instant::now();
        debug_assert!(self.sizer.is_ready(), "sizer used before precompute");
        let input = EstimateInput {
            victim_amount: victim.intent.amount_in,
            reserve_in: victim.pool.reserves(victim.intent.direction).0,
            reserve_out: victim.pool.reserves(victim.intent.direction).1,
            fee_bps: victim.pool.fee_bps,
        };
        let sizing = self
            .sizer
            .calculate(input.victim_amount, input.reserve_in, input.reserve_out, input.fee_bps)
            .map_err(|e| {
                warn!(error = %e, "sizer unavailable");
                Stage::Sizing
            })?;
        if !sizing.is_actionable() {
            return Err(Stage::Sizing);
        }
        let bundle_sim = self.simulator.simulate_sandwich(
            &victim.pool,
            victim.intent.direction,
            sizing.frontrun_amount,
            victim.intent.amount_in,
            victim.tx.gas_limit,
        );
        self.metrics.simulation();
        if bundle_sim.success {
            self.linear.observe(&input, bundle_sim.frontrun_profit);
        }
        self.metrics.record_stage(Stage::Sizing, t.elapsed());

        let t = Instant::now();
        let timeouts_before = self.redundancy.timeouts();
        let consensus = self.redundancy.estimate_consensus(&input);
        self.metrics
            .estimator_timeouts(self.redundancy.timeouts().saturating_sub(timeouts_before));
        self.metrics.record_stage(Stage::Consensus, t.elapsed());
        let consensus = consensus.filter(|c| !c.value.is_zero()).ok_or(Stage::Consensus)?;

        let t = Instant::now();
        let opportunity = self.check_viability(victim, sizing, consensus, &bundle_sim)?;
        self.metrics.record_stage(Stage::Viability, t.elapsed());
        Ok(opportunity)
    }

    fn simulate_victim(&self, tx: Transaction) -> Result<Victim, Stage> {
        let swap = self.simulator.simulate_swap(&tx);
        self.metrics.simulation();
        if !swap.cache_hit && swap.pool.is_some() {
            self.metrics.default_state_insert();
        }
        match (swap.success, swap.intent, swap.pool) {
            (true, Some(intent), Some(pool)) => Ok(Victim { tx, intent, pool }),
            (_, _, _) => {
                debug!(to = ?tx.to, error = ?swap.error, "victim not simulatable");
                Err(Stage::Simulation)
            }
        }
    }

    fn check_viability(
        &self,
        victim: Victim,
        mut sizing: SizingResult,
        consensus: Consensus,
        sim: &BundleSimulation,
    ) -> Result<Opportunity, Stage> {
        let strategy = &self.config.strategy;
        if !sim.success {
            debug!(error = ?sim.error, "sandwich does not simulate");
            return Err(Stage::Viability);
        }
        if sim.victim_slippage_bps() > strategy.max_victim_slippage_bps as u64 {
            debug!(slippage_bps = sim.victim_slippage_bps(), "victim slippage over limit");
            return Err(Stage::Viability);
        }
        if sim.total_gas > strategy.max_bundle_gas {
            return Err(Stage::Viability);
        }

        let base_fee = self.base_fee();
        let gas_cost = base_fee.saturating_mul(U256::from(2 * SWAP_GAS_LIMIT));
        let gross = sim.frontrun_profit;
        let after_gas = gross.checked_sub(gas_cost).ok_or(Stage::Viability)?;
        let tip = self.sizer.estimate_tip(after_gas, base_fee, self.congestion());
        if tip > strategy.max_fee_wei {
            debug!(%tip, max = %strategy.max_fee_wei, "tip over fee cap");
            return Err(Stage::Viability);
        }
        let net = after_gas.checked_sub(tip).ok_or(Stage::Viability)?;

        let threshold = if consensus.confidence >= HIGH_CONFIDENCE {
            strategy.min_profit_wei
        } else {
            math::apply_bps(strategy.min_profit_wei, strategy.low_confidence_multiplier_bps)
        };
        if net < threshold {
            debug!(%net, %threshold, confidence = consensus.confidence, "below profit threshold");
            return Err(Stage::Viability);
        }

        // the simulated legs are authoritative for what goes on the wire
        sizing.frontrun_amount = sim.frontrun_in;
        sizing.backrun_amount = sim.acquired;
        sizing.expected_profit = gross;
        sizing.victim_slippage = sim.victim_slippage;
        sizing.confidence = sizing.confidence.min(consensus.confidence);

        Ok(Opportunity {
            pool: victim.tx.to,
            direction: victim.intent.direction,
            path: victim.intent.path,
            victim: victim.tx,
            sizing,
            consensus,
            gross_profit: gross,
            gas_cost,
            tip,
            net_profit: net,
            resource_cost: sim.total_gas,
        })
    }

    fn hand_off(&self, opportunity: &Opportunity) -> bool {
        let t = Instant::now();
        let bundle = match self.assembler.assemble(opportunity) {
            Ok(bundle) => bundle,
            Err(e) => {
                debug!(error = %e, "assembly rejected");
                self.metrics.reject(Stage::Assembly);
                return false;
            }
        };
        let bytes = match self.assembler.serialize(&bundle) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(error = %e, "serialization rejected");
                self.assembler.release(&bundle);
                self.metrics.reject(Stage::Assembly);
                return false;
            }
        };
        let check = self.simulator.simulate_bundle(&bundle.txs);
        self.metrics.simulation();
        if !check.success {
            warn!(error = ?check.error, "assembled bundle failed re-simulation");
            self.assembler.release(&bundle);
            self.metrics.reject(Stage::Assembly);
            return false;
        }
        self.metrics.record_stage(Stage::Assembly, t.elapsed());
        self.metrics.opportunity();

        info!(
            victim = ?opportunity.victim.hash(),
            frontrun = %opportunity.sizing.frontrun_amount,
            net_profit = %opportunity.net_profit,
            confidence = opportunity.consensus.confidence,
            agreed = opportunity.consensus.agreed,
            bytes = bytes.len(),
            "sandwich opportunity"
        );

        if self.config.strategy.simulation_only {
            debug!("simulation-only mode, bundle not submitted");
            self.assembler.release(&bundle);
            return true;
        }

        let t = Instant::now();
        let accepted = self.submitter.submit(&bytes);
        self.metrics.record_stage(Stage::Submission, t.elapsed());
        if accepted {
            self.metrics.submitted();
        } else {
            warn!(victim = ?opportunity.victim.hash(), "bundle submission rejected");
            self.assembler.release(&bundle);
            self.metrics.failure();
            self.metrics.reject(Stage::Submission);
        }
        accepted
    }

    /// Advances the state cache to `block`.
    pub fn sync_state(&self, block: u64) {
        self.state.sync(block);
    }

    /// Refreshes cached reserves from `source` within the configured timeout.
    pub async fn refresh_state(&self, source: &dyn ReserveSource, block: u64) -> anyhow::Result<usize> {
        self.state
            .refresh(source, block, self.config.state.refresh_timeout())
            .await
            .context("reserve refresh")
    }

    /// Updates the fee environment used by the viability gate.
    pub fn update_network(&self, base_fee: U256, congestion: u8) {
        *self.base_fee.write() = base_fee;
        self.congestion.store(congestion.min(100), Ordering::Relaxed);
    }

    pub fn base_fee(&self) -> U256 {
        *self.base_fee.read()
    }

    pub fn congestion(&self) -> u8 {
        self.congestion.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn state(&self) -> &Arc<StateCache> {
        &self.state
    }

    pub fn sizer(&self) -> &Arc<OptimalSizer> {
        &self.sizer
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stops accepting work and joins the worker pool. Idempotent.
    pub fn shutdown(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            self.pool.shutdown();
            info!(stats = %self.snapshot(), "engine stopped");
        }
    }
}

impl Drop for MevEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Decode and prefilter. Timings are `[decode, prefilter]`.
fn screen(prefilter: &Prefilter, raw: &Bytes) -> (Screened, [Duration; 2]) {
    let t = Instant::now();
    let tx = match codec::decode_shared(raw) {
        Ok(tx) => tx,
        Err(e) => {
            trace!(error = %e, "decode rejected");
            return (Screened::Rejected(Stage::Decode), [t.elapsed(), Duration::ZERO]);
        }
    };
    let decode = t.elapsed();

    let t = Instant::now();
    let class = prefilter.classify(&tx);
    let filter = t.elapsed();
    if class.is_swap() {
        (Screened::Passed(tx, class), [decode, filter])
    } else {
        (Screened::Rejected(Stage::Prefilter), [decode, filter])
    }
}
