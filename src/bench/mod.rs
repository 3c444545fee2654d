//! Benchmark module
//! Latency measurements for every pipeline stage

pub mod latency;

pub use latency::{run_all_benchmarks, run_bench, sample_victim, BenchResult};
