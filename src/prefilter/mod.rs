//! Fast screening of pending transactions.
//!
//! A bloom filter over router addresses and swap selectors rejects the
//! bulk of irrelevant traffic with two lookups. Anything it passes is
//! confirmed against exact allow-lists before a venue flag is set.

pub mod bloom;
pub mod targets;

pub use bloom::BloomFilter;
pub use targets::{SwapFamily, TxClass, Venue};

use ethers::types::{Address, U256};
use std::collections::HashMap;
use tracing::debug;

use crate::config::PrefilterConfig;
use crate::types::Transaction;

pub struct Prefilter {
    bloom: BloomFilter,
    routers: HashMap<Address, (String, Venue)>,
    selectors: HashMap<[u8; 4], SwapFamily>,
    large_transfer: U256,
    high_gas: u64,
}

impl Prefilter {
    /// Builds a filter preloaded with the built-in routers and selectors.
    pub fn new(config: &PrefilterConfig) -> Self {
        let mut filter = Self {
            bloom: BloomFilter::new(config.bloom_bits_log2, config.bloom_hashes),
            routers: HashMap::new(),
            selectors: HashMap::new(),
            large_transfer: config.large_transfer_wei,
            high_gas: config.high_gas_limit,
        };
        for (addr, label, venue) in targets::known_routers() {
            filter.register_router(addr, label, venue);
        }
        for (selector, family) in targets::KNOWN_SELECTORS {
            filter.register_selector(selector, family);
        }
        for addr in &config.extra_routers {
            filter.register_router(*addr, "custom", Venue::Aggregator);
        }
        for selector in config.parsed_selectors() {
            filter.register_selector(selector, SwapFamily::V2);
        }
        debug!(
            routers = filter.routers.len(),
            selectors = filter.selectors.len(),
            fp_rate = filter.bloom.estimated_fp_rate(),
            "prefilter loaded"
        );
        filter
    }

    pub fn register_router(&mut self, addr: Address, label: impl Into<String>, venue: Venue) {
        self.bloom.insert(addr.as_bytes());
        self.routers.insert(addr, (label.into(), venue));
    }

    pub fn register_selector(&mut self, selector: [u8; 4], family: SwapFamily) {
        self.bloom.insert(&selector);
        self.selectors.insert(selector, family);
    }

    /// Approximate membership test. The recipient must hit the filter,
    /// and so must the selector when the calldata carries one. Any miss
    /// proves the transaction is not a target.
    ///
    /// Addresses and selectors share one bit array, so a selector can
    /// collide with an address. Classification still requires exact matches.
    #[inline]
    pub fn might_match(&self, tx: &Transaction) -> bool {
        if !self.bloom.contains(tx.to.as_bytes()) {
            return false;
        }
        tx.selector().map_or(true, |s| self.bloom.contains(&s))
    }

    /// Classifies `tx`. Venue swap flags require an exact router match
    /// and an exact selector match; bloom hits alone never set them.
    pub fn classify(&self, tx: &Transaction) -> TxClass {
        let mut class = TxClass::UNKNOWN;
        if tx.value >= self.large_transfer {
            class |= TxClass::LARGE_TRANSFER;
        }
        if tx.gas_limit > self.high_gas {
            class |= TxClass::HIGH_GAS;
        }
        if !self.might_match(tx) {
            return class;
        }
        let router = self.routers.get(&tx.to);
        let family = tx.selector().and_then(|s| self.selectors.get(&s));
        if let (Some((_, venue)), Some(family)) = (router, family) {
            if let Some(flag) = targets::classify_swap(*venue, *family) {
                class |= flag;
            }
        }
        class
    }

    pub fn router_label(&self, addr: &Address) -> Option<&str> {
        self.routers.get(addr).map(|(label, _)| label.as_str())
    }

    pub fn is_router(&self, addr: &Address) -> bool {
        self.routers.contains_key(addr)
    }

    pub fn bloom(&self) -> &BloomFilter {
        &self.bloom
    }
}
