//! Precision benchmarks for the per-transaction hot path
//! Each stage is measured in isolation against warmed state

use bytes::Bytes;
use ethers::types::{Address, U256};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Instant;

use crate::codec::{self, abi::selectors};
use crate::config::{Config, PrefilterConfig, SizerConfig, StateConfig};
use crate::math;
use crate::prefilter::Prefilter;
use crate::redundancy::reconcile;
use crate::simulator::{amm, ShadowSimulator};
use crate::sizer::OptimalSizer;
use crate::state::StateCache;
use crate::types::{PoolState, SwapDirection, Transaction};
use crate::MevEngine;

const ETH: u128 = 1_000_000_000_000_000_000;

/// Benchmark result
#[derive(Debug, Clone)]
pub struct BenchResult {
    pub name: String,
    pub iterations: u64,
    pub total_ns: u64,
    pub avg_ns: f64,
    pub min_ns: u64,
    pub max_ns: u64,
    pub p50_ns: u64,
    pub p99_ns: u64,
    pub throughput_ops: f64,
}

impl std::fmt::Display for BenchResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:<30} | avg: {:>8.2}ns | min: {:>6}ns | p50: {:>6}ns | p99: {:>6}ns | throughput: {:>12.0} ops/s",
            self.name, self.avg_ns, self.min_ns, self.p50_ns, self.p99_ns, self.throughput_ops
        )
    }
}

/// Run a benchmark with high precision
pub fn run_bench<F>(name: &str, iterations: u64, mut f: F) -> BenchResult
where
    F: FnMut(),
{
    // Warmup
    for _ in 0..1000 {
        black_box(f());
    }

    let mut samples = Vec::with_capacity(iterations as usize);
    for _ in 0..iterations {
        let start = Instant::now();
        black_box(f());
        samples.push(start.elapsed().as_nanos() as u64);
    }
    samples.sort_unstable();

    let total: u64 = samples.iter().sum();
    let avg = total as f64 / iterations.max(1) as f64;
    let throughput = if avg > 0.0 { 1_000_000_000.0 / avg } else { f64::INFINITY };

    BenchResult {
        name: name.to_string(),
        iterations,
        total_ns: total,
        avg_ns: avg,
        min_ns: samples.first().copied().unwrap_or(0),
        max_ns: samples.last().copied().unwrap_or(0),
        p50_ns: samples.get(samples.len() / 2).copied().unwrap_or(0),
        p99_ns: samples.get(samples.len() * 99 / 100).copied().unwrap_or(0),
        throughput_ops: throughput,
    }
}

fn uniswap_v2_router() -> Address {
    Address::from_slice(&[
        0x7a, 0x25, 0x0d, 0x56, 0x30, 0xb4, 0xcf, 0x53, 0x97, 0x39, 0xdf, 0x2c, 0x5d, 0xac, 0xb4,
        0xc6, 0x59, 0xf2, 0x48, 0x8d,
    ])
}

/// Raw legacy envelope of a 10 ETH `swapExactETHForTokens` to the V2 router.
pub fn sample_victim() -> Vec<u8> {
    let mut input = selectors::SWAP_EXACT_ETH_FOR_TOKENS.to_vec();
    input.extend_from_slice(&[0u8; 32]);
    codec::encode(&Transaction {
        from: Address::zero(),
        to: uniswap_v2_router(),
        value: U256::from(10 * ETH),
        gas_price: U256::from(30_000_000_000u128),
        gas_limit: 200_000,
        nonce: 42,
        input: Bytes::from(input),
        timestamp_us: 0,
        raw: Bytes::new(),
    })
}

fn sample_pool() -> PoolState {
    PoolState::new(U256::from(100 * ETH), U256::from(200_000 * ETH), 30)
}

/// Benchmark transaction decode
pub fn bench_decode() -> BenchResult {
    let raw = Bytes::from(sample_victim());
    run_bench("RLP decode (legacy tx)", 100_000, || {
        black_box(codec::decode_shared(&raw).ok());
    })
}

/// Benchmark prefilter classification
pub fn bench_prefilter() -> BenchResult {
    let prefilter = Prefilter::new(&PrefilterConfig::default());
    let tx = codec::decode(&sample_victim()).ok();
    run_bench("Prefilter classify", 100_000, || {
        if let Some(tx) = &tx {
            black_box(prefilter.classify(tx));
        }
    })
}

/// Benchmark 256-bit widened mul/div
pub fn bench_mul_div() -> BenchResult {
    let a = U256::from(1_000 * ETH);
    let b = U256::from(2_000_000 * ETH);
    let c = U256::from(1_001 * ETH);
    run_bench("U256 mul_div", 100_000, || {
        black_box(math::mul_div(a, b, c));
    })
}

/// Benchmark constant-product quote
pub fn bench_swap_quote() -> BenchResult {
    let pool = sample_pool();
    let amount_in = U256::from(ETH);
    run_bench("Swap quote (constant product)", 100_000, || {
        black_box(amm::get_amount_out(amount_in, pool.reserve0, pool.reserve1, pool.fee_bps));
    })
}

/// Benchmark a full sandwich replay on a working copy
pub fn bench_sandwich() -> BenchResult {
    let sim = ShadowSimulator::new(Arc::new(StateCache::new(&StateConfig::default())));
    let pool = sample_pool();
    let (front, victim) = (U256::from(5 * ETH), U256::from(10 * ETH));
    run_bench("Sandwich replay", 100_000, || {
        black_box(sim.simulate_sandwich(&pool, SwapDirection::ZeroForOne, front, victim, 200_000));
    })
}

/// Benchmark sizing table lookup
pub fn bench_sizer_lookup() -> BenchResult {
    let result = OptimalSizer::new(&SizerConfig::default()).map(|sizer| {
        sizer.precompute();
        let pool = sample_pool();
        let victim = U256::from(10 * ETH);
        run_bench("Sizer table lookup", 100_000, || {
            black_box(sizer.calculate(victim, pool.reserve0, pool.reserve1, pool.fee_bps).ok());
        })
    });
    result.unwrap_or_else(|_| run_bench("Sizer table lookup (unavailable)", 1, || {}))
}

/// Benchmark state cache hit
pub fn bench_state_lookup() -> BenchResult {
    let cache = StateCache::new(&StateConfig::default());
    for i in 0..10_000u64 {
        cache.insert(Address::from_low_u64_be(i), sample_pool());
    }
    let addr = Address::from_low_u64_be(5_000);
    run_bench("State cache lookup", 100_000, || {
        black_box(cache.lookup(&addr).is_hit());
    })
}

/// Benchmark consensus reconciliation
pub fn bench_reconcile() -> BenchResult {
    let values = [U256::from(100), U256::from(105), U256::from(200)];
    run_bench("Consensus reconcile (3)", 100_000, || {
        black_box(reconcile(&values, 3, 1_000));
    })
}

/// Benchmark the whole pipeline on a profitable victim
pub fn bench_pipeline() -> BenchResult {
    let mut config = Config::default();
    config.strategy.simulation_only = true;
    config.strategy.max_victim_slippage_bps = 2_000;
    let raw = Bytes::from(sample_victim());
    match MevEngine::new(config, Arc::new(|_: &[u8]| true)) {
        Ok(engine) => {
            engine.state().insert(uniswap_v2_router(), sample_pool());
            let result = run_bench("Full pipeline (process)", 10_000, || {
                black_box(engine.process_shared(&raw));
            });
            engine.shutdown();
            result
        }
        Err(_) => run_bench("Full pipeline (unavailable)", 1, || {}),
    }
}

/// Run all benchmarks
pub fn run_all_benchmarks() -> Vec<BenchResult> {
    println!("\n╔══════════════════════════════════════════════════════════════════════════════╗");
    println!("║                    MEV PIPELINE - LATENCY BENCHMARKS                         ║");
    println!("╠══════════════════════════════════════════════════════════════════════════════╣");

    let results = vec![
        // Intake
        bench_decode(),
        bench_prefilter(),
        // Math
        bench_mul_div(),
        bench_swap_quote(),
        bench_sandwich(),
        // Data structures
        bench_sizer_lookup(),
        bench_state_lookup(),
        bench_reconcile(),
        // End to end
        bench_pipeline(),
    ];

    for r in &results {
        println!("║ {} ║", r);
    }
    println!("╚══════════════════════════════════════════════════════════════════════════════╝");

    println!("\n📊 LATENCY SUMMARY:");
    let critical_ops = ["RLP decode", "Prefilter", "Sandwich", "Sizer"];
    let total_critical: f64 = results
        .iter()
        .filter(|r| critical_ops.iter().any(|op| r.name.contains(op)))
        .map(|r| r.avg_ns)
        .sum();

    println!("   Critical path total: {:.2}ns ({:.2}µs)", total_critical, total_critical / 1000.0);
    if total_critical < 1000.0 {
        println!("   ✅ SUB-MICROSECOND ACHIEVED!");
    } else if total_critical < 10000.0 {
        println!("   ⚠️  Under 10µs - good but can improve");
    } else {
        println!("   ❌ Over 10µs - needs optimization");
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bench_framework() {
        let result = run_bench("test_noop", 1000, || {
            black_box(42);
        });

        assert!(result.avg_ns < 1000.0);
        assert!(result.min_ns <= result.p50_ns);
        assert!(result.p50_ns <= result.p99_ns);
    }

    #[test]
    fn test_sample_victim_decodes_to_router() {
        let tx = codec::decode(&sample_victim()).unwrap();
        assert_eq!(tx.to, uniswap_v2_router());
        assert_eq!(tx.selector(), Some(selectors::SWAP_EXACT_ETH_FOR_TOKENS));
    }
}
