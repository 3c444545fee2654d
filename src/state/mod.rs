//! Concurrent pool-state cache.
//!
//! Reads never block writers for long: entries live in a sharded
//! `DashMap`, and a miss inserts a placeholder snapshot so the pipeline
//! can keep going while a refresh is pending.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ethers::types::{Address, U256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::StateConfig;
use crate::types::PoolState;

/// Result of a cache read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Hit(PoolState),
    /// The pool was unknown; this placeholder is now cached for it.
    InsertedDefault(PoolState),
}

impl Lookup {
    pub fn state(&self) -> &PoolState {
        match self {
            Lookup::Hit(s) | Lookup::InsertedDefault(s) => s,
        }
    }

    pub fn into_state(self) -> PoolState {
        match self {
            Lookup::Hit(s) | Lookup::InsertedDefault(s) => s,
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }
}

/// Reserves reported by an external source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolUpdate {
    pub pool: Address,
    pub reserve0: U256,
    pub reserve1: U256,
    pub fee_bps: u32,
}

/// Supplier of fresh reserves, e.g. an RPC-backed reader.
#[async_trait]
pub trait ReserveSource: Send + Sync {
    async fn fetch_reserves(&self, block: u64, pools: &[Address]) -> anyhow::Result<Vec<PoolUpdate>>;
}

pub struct StateCache {
    pools: DashMap<Address, PoolState>,
    placeholder: PoolState,
    current_block: AtomicU64,
    default_inserts: AtomicU64,
    stale_after_blocks: u64,
}

impl StateCache {
    pub fn new(config: &StateConfig) -> Self {
        let mut placeholder = PoolState::new(
            config.default_reserve0,
            config.default_reserve1,
            config.default_fee_bps,
        );
        placeholder.estimated = true;
        Self {
            pools: DashMap::new(),
            placeholder,
            current_block: AtomicU64::new(0),
            default_inserts: AtomicU64::new(0),
            stale_after_blocks: config.stale_after_blocks,
        }
    }

    /// Returns the cached snapshot, inserting the placeholder on a miss.
    pub fn lookup(&self, pool: &Address) -> Lookup {
        if let Some(state) = self.pools.get(pool) {
            return Lookup::Hit(state.clone());
        }
        match self.pools.entry(*pool) {
            // raced with another inserter
            Entry::Occupied(e) => Lookup::Hit(e.get().clone()),
            Entry::Vacant(e) => {
                let mut state = self.placeholder.clone();
                state.last_refresh_block = self.current_block();
                e.insert(state.clone());
                self.default_inserts.fetch_add(1, Ordering::Relaxed);
                warn!(pool = ?pool, "pool state miss, placeholder inserted");
                Lookup::InsertedDefault(state)
            }
        }
    }

    pub fn get(&self, pool: &Address) -> Option<PoolState> {
        self.pools.get(pool).map(|s| s.clone())
    }

    pub fn insert(&self, pool: Address, state: PoolState) {
        self.pools.insert(pool, state);
    }

    /// Inserts placeholders for pools not yet cached.
    pub fn prewarm(&self, pools: &[Address]) {
        let block = self.current_block();
        for pool in pools {
            self.pools.entry(*pool).or_insert_with(|| {
                let mut state = self.placeholder.clone();
                state.last_refresh_block = block;
                state
            });
        }
    }

    /// Overwrites cached reserves, returning how many pools changed.
    pub fn apply_updates(&self, block: u64, updates: &[PoolUpdate]) -> usize {
        for u in updates {
            let mut state = PoolState::new(u.reserve0, u.reserve1, u.fee_bps);
            state.last_refresh_block = block;
            self.pools.insert(u.pool, state);
        }
        updates.len()
    }

    /// Advances the cache to `block`.
    pub fn sync(&self, block: u64) {
        let prev = self.current_block.fetch_max(block, Ordering::AcqRel);
        if block > prev {
            debug!(block, stale = self.stale_pools().len(), "state cache synced");
        }
    }

    /// Pulls fresh reserves for every cached pool, bounded by `timeout`.
    ///
    /// A timeout leaves the cache untouched and reports zero updates;
    /// source errors are returned to the caller.
    pub async fn refresh(
        &self,
        source: &dyn ReserveSource,
        block: u64,
        timeout: Duration,
    ) -> anyhow::Result<usize> {
        let pools: Vec<Address> = self.pools.iter().map(|e| *e.key()).collect();
        if pools.is_empty() {
            self.sync(block);
            return Ok(0);
        }
        match tokio::time::timeout(timeout, source.fetch_reserves(block, &pools)).await {
            Ok(updates) => {
                let applied = self.apply_updates(block, &updates?);
                self.sync(block);
                Ok(applied)
            }
            Err(_) => {
                warn!(block, pools = pools.len(), ?timeout, "reserve refresh timed out");
                Ok(0)
            }
        }
    }

    /// Pools whose snapshot lags the current block by more than the
    /// configured window.
    pub fn stale_pools(&self) -> Vec<Address> {
        let block = self.current_block();
        self.pools
            .iter()
            .filter(|e| block.saturating_sub(e.value().last_refresh_block) > self.stale_after_blocks)
            .map(|e| *e.key())
            .collect()
    }

    pub fn current_block(&self) -> u64 {
        self.current_block.load(Ordering::Acquire)
    }

    pub fn default_inserts(&self) -> u64 {
        self.default_inserts.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct FixedSource(Vec<PoolUpdate>);

    #[async_trait]
    impl ReserveSource for FixedSource {
        async fn fetch_reserves(&self, _block: u64, _pools: &[Address]) -> anyhow::Result<Vec<PoolUpdate>> {
            Ok(self.0.clone())
        }
    }

    struct SlowSource;

    #[async_trait]
    impl ReserveSource for SlowSource {
        async fn fetch_reserves(&self, _block: u64, _pools: &[Address]) -> anyhow::Result<Vec<PoolUpdate>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![])
        }
    }

    #[test]
    fn test_miss_inserts_default_then_hits() {
        let cache = StateCache::new(&StateConfig::default());
        let pool = Address::repeat_byte(0x01);
        let first = cache.lookup(&pool);
        assert!(matches!(first, Lookup::InsertedDefault(_)));
        assert!(first.state().estimated);
        assert_eq!(first.state().fee_bps, 30);

        let second = cache.lookup(&pool);
        assert!(second.is_hit());
        assert_eq!(second.into_state(), first.into_state());
        assert_eq!(cache.default_inserts(), 1);
    }

    #[test]
    fn test_concurrent_lookups_insert_once() {
        let cache = Arc::new(StateCache::new(&StateConfig::default()));
        let pool = Address::repeat_byte(0x02);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || cache.lookup(&pool).is_hit())
            })
            .collect();
        let misses = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|hit| !hit)
            .count();
        assert_eq!(misses, 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_applies_updates() {
        let cache = StateCache::new(&StateConfig::default());
        let pool = Address::repeat_byte(0x03);
        cache.lookup(&pool);
        let source = FixedSource(vec![PoolUpdate {
            pool,
            reserve0: U256::from(5_000),
            reserve1: U256::from(7_000),
            fee_bps: 25,
        }]);
        let applied = cache.refresh(&source, 10, Duration::from_millis(100)).await.unwrap();
        assert_eq!(applied, 1);
        let state = cache.get(&pool).unwrap();
        assert!(!state.estimated);
        assert_eq!(state.reserve1, U256::from(7_000));
        assert_eq!(state.last_refresh_block, 10);
        assert_eq!(cache.current_block(), 10);
    }

    #[tokio::test]
    async fn test_refresh_timeout_keeps_cache() {
        let cache = StateCache::new(&StateConfig::default());
        let pool = Address::repeat_byte(0x04);
        cache.lookup(&pool);
        let applied = cache.refresh(&SlowSource, 1, Duration::from_millis(5)).await.unwrap();
        assert_eq!(applied, 0);
        assert!(cache.get(&pool).unwrap().estimated);
    }

    #[test]
    fn test_stale_pools() {
        let cache = StateCache::new(&StateConfig::default());
        let fresh = Address::repeat_byte(0x05);
        let old = Address::repeat_byte(0x06);
        cache.prewarm(&[old]);
        cache.sync(10);
        cache.apply_updates(
            10,
            &[PoolUpdate {
                pool: fresh,
                reserve0: U256::one(),
                reserve1: U256::one(),
                fee_bps: 30,
            }],
        );
        assert_eq!(cache.stale_pools(), vec![old]);
    }
}
