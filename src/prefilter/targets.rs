//! Built-in routers, swap selectors and classification flags.

use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::ops::{BitOr, BitOrAssign};

use crate::codec::abi::selectors;

/// Bitmask of transaction classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TxClass(u8);

impl TxClass {
    pub const UNKNOWN: Self = Self(0);
    pub const UNISWAP_V2_SWAP: Self = Self(1 << 0);
    pub const UNISWAP_V3_SWAP: Self = Self(1 << 1);
    pub const SUSHISWAP_SWAP: Self = Self(1 << 2);
    pub const AGGREGATOR_SWAP: Self = Self(1 << 3);
    pub const LARGE_TRANSFER: Self = Self(1 << 4);
    pub const HIGH_GAS: Self = Self(1 << 5);

    const SWAP_MASK: u8 = 0b1111;

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when any venue swap flag is set.
    pub const fn is_swap(self) -> bool {
        self.0 & Self::SWAP_MASK != 0
    }
}

impl BitOr for TxClass {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for TxClass {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Calldata family of a recognised selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwapFamily {
    V2,
    V3,
    Aggregator,
}

/// Venue a router address belongs to, when it is a single venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Venue {
    UniswapV2,
    UniswapV3,
    SushiSwap,
    Aggregator,
}

pub const KNOWN_ROUTERS: [(&str, &str, Venue); 10] = [
    ("0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D", "uniswap-v2", Venue::UniswapV2),
    ("0xE592427A0AEce92De3Edee1F18E0157C05861564", "uniswap-v3", Venue::UniswapV3),
    ("0xd9e1cE17f2641f24aE83637ab66a2cca9C378B9F", "sushiswap", Venue::SushiSwap),
    ("0x1111111254fb6c44bAC0beD2854e76F90643097d", "1inch-v4", Venue::Aggregator),
    ("0x68b3465833fb72A70ecDF485E0e4C7bD8665Fc45", "uniswap-v3-router02", Venue::UniswapV3),
    ("0xDef1C0ded9bec7F1a1670819833240f027b25EfF", "0x-exchange", Venue::Aggregator),
    ("0x881D40237659C251811CEC9c364ef91dC08D300C", "metamask-swap", Venue::Aggregator),
    ("0x216B4B4Ba9F3e719726886d34a177484278Bfcae", "token-swap", Venue::Aggregator),
    ("0x3fC91A3afd70395Cd496C647d5a6CC9D4B2b7FAD", "uniswap-universal", Venue::UniswapV3),
    ("0x6131B5fae19EA4f9D964eAc0408E4408b66337b5", "kyberswap", Venue::Aggregator),
];

pub const KNOWN_SELECTORS: [([u8; 4], SwapFamily); 8] = [
    (selectors::SWAP_EXACT_TOKENS_FOR_TOKENS, SwapFamily::V2),
    (selectors::SWAP_TOKENS_FOR_EXACT_TOKENS, SwapFamily::V2),
    (selectors::SWAP_EXACT_ETH_FOR_TOKENS, SwapFamily::V2),
    (selectors::SWAP_EXACT_TOKENS_FOR_ETH, SwapFamily::V2),
    (selectors::EXACT_INPUT_SINGLE, SwapFamily::V3),
    (selectors::EXACT_INPUT, SwapFamily::V3),
    (selectors::MULTICALL, SwapFamily::V3),
    (selectors::AGGREGATOR_SWAP, SwapFamily::Aggregator),
];

/// Built-in routers that parse as addresses.
pub fn known_routers() -> impl Iterator<Item = (Address, &'static str, Venue)> {
    KNOWN_ROUTERS
        .iter()
        .filter_map(|(addr, label, venue)| addr.parse().ok().map(|a| (a, *label, *venue)))
}

/// Flag for a recognised selector sent to a recognised router.
///
/// The flag names the router's venue. `None` when the router does not
/// expose that selector family; aggregators accept every family.
pub fn classify_swap(venue: Venue, family: SwapFamily) -> Option<TxClass> {
    match (venue, family) {
        (Venue::UniswapV2, SwapFamily::V2) => Some(TxClass::UNISWAP_V2_SWAP),
        (Venue::SushiSwap, SwapFamily::V2) => Some(TxClass::SUSHISWAP_SWAP),
        (Venue::UniswapV3, SwapFamily::V3) => Some(TxClass::UNISWAP_V3_SWAP),
        (Venue::Aggregator, _) => Some(TxClass::AGGREGATOR_SWAP),
        _ => None,
    }
}
