//! Core types shared across the pipeline

use bytes::Bytes;
use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

use crate::error::AssembleError;
use crate::redundancy::Consensus;

/// Gas limit charged for each searcher-originated swap.
pub const SWAP_GAS_LIMIT: u64 = 150_000;

/// Pending transaction, either decoded from the wire or derived by us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Unsigned envelopes carry no sender; derived txs use the searcher.
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub gas_price: U256,
    pub gas_limit: u64,
    pub nonce: u64,
    pub input: Bytes,
    /// Arrival time in microseconds since the epoch
    pub timestamp_us: u64,
    /// Original envelope bytes. Empty for transactions we build.
    pub raw: Bytes,
}

impl Transaction {
    #[inline]
    pub fn selector(&self) -> Option<[u8; 4]> {
        self.input.get(..4).and_then(|s| s.try_into().ok())
    }

    #[inline]
    pub fn is_derived(&self) -> bool {
        self.raw.is_empty()
    }

    /// Keccak-256 over the envelope as it goes on the wire.
    pub fn hash(&self) -> H256 {
        let digest = if self.is_derived() {
            ethers::utils::keccak256(crate::codec::encode(self))
        } else {
            ethers::utils::keccak256(&self.raw)
        };
        H256::from(digest)
    }
}

/// Which side of a two-asset pool is being sold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwapDirection {
    /// Sell reserve0, receive reserve1
    ZeroForOne,
    /// Sell reserve1, receive reserve0
    OneForZero,
}

impl SwapDirection {
    pub fn reversed(self) -> Self {
        match self {
            Self::ZeroForOne => Self::OneForZero,
            Self::OneForZero => Self::ZeroForOne,
        }
    }
}

/// Constant-product pool snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolState {
    pub reserve0: U256,
    pub reserve1: U256,
    /// Fee in basis points (30 = 0.3%)
    pub fee_bps: u32,
    pub last_refresh_block: u64,
    /// True when this is a placeholder inserted on a cache miss
    pub estimated: bool,
}

impl PoolState {
    pub fn new(reserve0: U256, reserve1: U256, fee_bps: u32) -> Self {
        Self {
            reserve0,
            reserve1,
            fee_bps,
            last_refresh_block: 0,
            estimated: false,
        }
    }

    /// `(reserve_in, reserve_out)` for a swap in `direction`.
    #[inline]
    pub fn reserves(&self, direction: SwapDirection) -> (U256, U256) {
        match direction {
            SwapDirection::ZeroForOne => (self.reserve0, self.reserve1),
            SwapDirection::OneForZero => (self.reserve1, self.reserve0),
        }
    }

    pub fn apply_swap(&mut self, direction: SwapDirection, amount_in: U256, amount_out: U256) {
        let (r_in, r_out) = match direction {
            SwapDirection::ZeroForOne => (&mut self.reserve0, &mut self.reserve1),
            SwapDirection::OneForZero => (&mut self.reserve1, &mut self.reserve0),
        };
        *r_in = r_in.saturating_add(amount_in);
        *r_out = r_out.saturating_sub(amount_out);
    }

    pub fn has_liquidity(&self) -> bool {
        !self.reserve0.is_zero() && !self.reserve1.is_zero()
    }
}

/// Output of the sizer for one victim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SizingResult {
    pub frontrun_amount: U256,
    /// Quantity acquired by the frontrun and sold back in the backrun
    pub backrun_amount: U256,
    pub expected_profit: U256,
    pub victim_slippage: U256,
    /// 0..=100
    pub confidence: u8,
}

impl SizingResult {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_actionable(&self) -> bool {
        !self.frontrun_amount.is_zero() && !self.expected_profit.is_zero()
    }
}

/// Viable sandwich, ready for assembly.
#[derive(Debug, Clone)]
pub struct Opportunity {
    pub victim: Transaction,
    pub pool: Address,
    pub direction: SwapDirection,
    pub path: Vec<Address>,
    pub sizing: SizingResult,
    pub consensus: Consensus,
    pub gross_profit: U256,
    pub gas_cost: U256,
    pub tip: U256,
    pub net_profit: U256,
    pub resource_cost: u64,
}

/// Ordered frontrun / victim / backrun triple.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub txs: [Transaction; 3],
    pub total_gas: u64,
    pub total_fees: U256,
    pub priority_tip: U256,
    pub expected_profit: U256,
}

impl Bundle {
    pub fn frontrun(&self) -> &Transaction {
        &self.txs[0]
    }

    pub fn victim(&self) -> &Transaction {
        &self.txs[1]
    }

    pub fn backrun(&self) -> &Transaction {
        &self.txs[2]
    }

    /// Checks the ordering invariants every submitted bundle must hold.
    pub fn validate(&self) -> Result<(), AssembleError> {
        let [front, victim, back] = &self.txs;
        if victim.is_derived() {
            return Err(AssembleError::Ordering("victim must be the original envelope"));
        }
        if front.gas_price >= victim.gas_price {
            return Err(AssembleError::Ordering("frontrun must pay less than the victim"));
        }
        if back.gas_price <= victim.gas_price {
            return Err(AssembleError::Ordering("backrun must pay more than the victim"));
        }
        if front.from != back.from || back.nonce != front.nonce.wrapping_add(1) {
            return Err(AssembleError::Ordering("derived nonces must be consecutive"));
        }
        Ok(())
    }
}
