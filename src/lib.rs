//! MEV Pipeline
//!
//! Low-latency sandwich detection over raw pending transactions.
//!
//! ## Architecture
//! - Codec: zero-copy RLP transaction decoding and bundle encoding
//! - Prefilter: bloom + exact allow-list screening of swap traffic
//! - State: concurrent pool reserve cache with placeholder inserts
//! - Simulator: shadow constant-product replay on working copies
//! - Sizer: precomputed frontrun table with an exact fallback solver
//! - Redundancy: cross-validated profit estimates on a worker pool
//! - Builder: frontrun / victim / backrun bundle assembly

pub mod math;
pub mod bench;
pub mod builder;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod prefilter;
pub mod redundancy;
pub mod simulator;
pub mod sizer;
pub mod state;
pub mod submit;
pub mod types;

pub use ethers::types::U256;
pub use bench::run_all_benchmarks;
pub use builder::BundleAssembler;
pub use config::Config;
pub use engine::MevEngine;
pub use error::{AssembleError, ConfigError, DecodeError, PoolError, SimulationError, SizerError};
pub use self::metrics::{MetricsSnapshot, PipelineMetrics, Stage};
pub use prefilter::{Prefilter, TxClass};
pub use redundancy::{Consensus, RedundancyEngine};
pub use simulator::ShadowSimulator;
pub use sizer::OptimalSizer;
pub use state::{ReserveSource, StateCache};
pub use submit::{BundleSubmitter, ChannelSubmitter};
pub use types::{Bundle, Opportunity, PoolState, SizingResult, SwapDirection, Transaction};
