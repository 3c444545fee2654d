//! Error types for the pipeline stages.

use ethers::types::U256;
use thiserror::Error;

/// Malformed transaction envelope.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty input")]
    Empty,

    #[error("truncated {context}: need {need} bytes, have {have}")]
    Truncated {
        context: &'static str,
        need: usize,
        have: usize,
    },

    #[error("length-of-length {len_of_len} exceeds remaining {remaining} bytes")]
    LengthOfLength { len_of_len: usize, remaining: usize },

    #[error("declared length does not fit in memory")]
    LengthOverflow,

    #[error("{field}: expected a byte string, found a list")]
    UnexpectedList { field: &'static str },

    #[error("expected a list, found a byte string")]
    UnexpectedString,

    #[error("{field}: expected {expected} bytes, got {got}")]
    FieldLength {
        field: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{field}: {len}-byte integer exceeds {max} bytes")]
    IntegerTooWide {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("{0} trailing bytes after envelope")]
    TrailingBytes(usize),
}

/// Why a swap or bundle could not be replayed profitably.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SimulationError {
    #[error("calldata does not describe a simulatable swap")]
    Unsimulatable,

    #[error("pool has no liquidity")]
    NoLiquidity,

    #[error("swap legs do not form a sandwich around the victim")]
    DirectionMismatch,

    #[error("victim output unaffected by frontrun")]
    NoSlippage,

    #[error("backrun returns {backrun_out}, frontrun spent {frontrun_in}")]
    Unprofitable { frontrun_in: U256, backrun_out: U256 },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SizerError {
    /// Lookups are only valid after `precompute` has finished.
    #[error("sizing table has not been precomputed")]
    NotPrecomputed,

    #[error("invalid bucket layout: {0}")]
    InvalidBuckets(&'static str),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssembleError {
    #[error("victim fee {victim_fee} leaves no room to order around it")]
    FeeOrdering { victim_fee: U256 },

    #[error("bundle of {size} bytes exceeds limit of {limit}")]
    BundleTooLarge { size: usize, limit: usize },

    #[error("bundle gas {gas} exceeds ceiling of {limit}")]
    ResourceCeiling { gas: u64, limit: u64 },

    #[error("bundle ordering violated: {0}")]
    Ordering(&'static str),
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    #[error("worker pool is shut down")]
    ShutDown,

    #[error("worker queue is full")]
    QueueFull,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("redundancy level must be 1..={max}, got {got}")]
    RedundancyLevel { got: u8, max: u8 },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("bloom filter size 2^{0} is outside 10..=30")]
    BloomBits(u32),

    #[error("{0}: minimum must be below maximum")]
    Range(&'static str),

    #[error("selector {0:?} is not 4 hex bytes")]
    Selector(String),
}
