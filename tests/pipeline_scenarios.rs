//! End-to-end pipeline scenarios

use async_trait::async_trait;
use bytes::Bytes;
use ethers::types::Address;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use mev_pipeline::codec::{self, abi::selectors, rlp};
use mev_pipeline::config::SizerConfig;
use mev_pipeline::redundancy::{default_estimators, EstimateInput, RedundancyEngine, WorkerPool};
use mev_pipeline::state::PoolUpdate;
use mev_pipeline::{
    BundleAssembler, BundleSubmitter, Config, MevEngine, OptimalSizer, PoolState,
    ReserveSource, Stage, SwapDirection, Transaction, U256,
};

const ETH: u128 = 1_000_000_000_000_000_000;
const GWEI: u64 = 1_000_000_000;

fn router() -> Address {
    "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D".parse().unwrap()
}

fn searcher() -> Address {
    Address::repeat_byte(0x5e)
}

fn config() -> Config {
    let mut config = Config::default();
    config.sizer = SizerConfig {
        victim_buckets: 16,
        liquidity_buckets: 8,
        ..Default::default()
    };
    config.performance.worker_threads = 2;
    config.redundancy.timeout_ms = 500;
    config.strategy.max_victim_slippage_bps = 2_000;
    config.strategy.searcher_address = searcher();
    config.strategy.starting_nonce = 100;
    config
}

fn shallow_pool() -> PoolState {
    PoolState::new(U256::from(100 * ETH), U256::from(200_000 * ETH), 30)
}

fn victim(to: Address, value: u128) -> Vec<u8> {
    let mut input = selectors::SWAP_EXACT_ETH_FOR_TOKENS.to_vec();
    input.extend_from_slice(&[0u8; 32]);
    codec::encode(&Transaction {
        from: Address::zero(),
        to,
        value: U256::from(value),
        gas_price: U256::from(30 * GWEI),
        gas_limit: 200_000,
        nonce: 9,
        input: Bytes::from(input),
        timestamp_us: 0,
        raw: Bytes::new(),
    })
}

#[derive(Default)]
struct Recorder(Mutex<Vec<Vec<u8>>>);

impl BundleSubmitter for Recorder {
    fn submit(&self, bundle: &[u8]) -> bool {
        self.0.lock().push(bundle.to_vec());
        true
    }
}

#[test]
fn sandwich_bundle_wraps_original_victim() {
    let recorder = Arc::new(Recorder::default());
    let engine = MevEngine::new(config(), recorder.clone()).unwrap();
    engine.state().insert(router(), shallow_pool());
    engine.update_network(U256::from(20 * GWEI), 30);

    let raw = victim(router(), 10 * ETH);
    assert!(engine.process(&raw));

    let submitted = recorder.0.lock();
    assert_eq!(submitted.len(), 1);
    let items = rlp::split_list(&submitted[0]).unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[1], raw.as_slice());

    let front = codec::decode(items[0]).unwrap();
    let back = codec::decode(items[2]).unwrap();
    let victim_fee = U256::from(30 * GWEI);
    assert!(front.gas_price < victim_fee);
    assert!(back.gas_price > victim_fee);
    assert_eq!((front.nonce, back.nonce), (100, 101));
    assert_eq!(front.to, router());
    assert_eq!(front.selector(), Some(selectors::SWAP_EXACT_TOKENS_FOR_TOKENS));
    assert_eq!(back.selector(), Some(selectors::SWAP_EXACT_TOKENS_FOR_ETH));

    let snap = engine.snapshot();
    assert_eq!(snap.opportunities_found, 1);
    assert_eq!(snap.bundles_submitted, 1);
    assert_eq!(snap.submission_failures, 0);
    // victim replay, sandwich replay, re-simulation of the assembled bundle
    assert_eq!(snap.simulations_run, 3);
}

#[test]
fn unknown_recipient_never_reaches_simulation() {
    let engine = MevEngine::new(config(), Arc::new(Recorder::default())).unwrap();
    assert!(!engine.process(&victim(Address::repeat_byte(0x42), 10 * ETH)));

    let snap = engine.snapshot();
    assert_eq!(snap.rejected_at(Stage::Prefilter), 1);
    assert_eq!(snap.simulations_run, 0);
    assert_eq!(snap.opportunities_found, 0);
}

#[test]
fn cache_miss_inserts_estimated_pool() {
    let engine = MevEngine::new(config(), Arc::new(Recorder::default())).unwrap();
    assert!(!engine.process(&victim(router(), 10 * ETH)));

    let snap = engine.snapshot();
    assert_eq!(snap.default_state_inserts, 1);
    assert!(snap.simulations_run >= 1);
    // a 10 ETH trade against the deep placeholder pool cannot beat fees
    assert_eq!(snap.rejected_at(Stage::Sizing), 1);
    assert!(engine.state().get(&router()).unwrap().estimated);

    assert!(!engine.process(&victim(router(), 10 * ETH)));
    assert_eq!(engine.snapshot().default_state_inserts, 1);
}

#[test]
fn batch_matches_sequential_outcomes() {
    let raws: Vec<Bytes> = (0..24)
        .map(|i| match i % 3 {
            0 => Bytes::from(victim(router(), 10 * ETH)),
            1 => Bytes::from(victim(Address::repeat_byte(0x42), ETH)),
            _ => Bytes::from_static(&[0xc0, 0x80]),
        })
        .collect();

    let mut cfg = config();
    cfg.strategy.simulation_only = true;
    let engine = MevEngine::new(cfg, Arc::new(Recorder::default())).unwrap();
    engine.state().insert(router(), shallow_pool());

    let found = engine.process_batch(&raws);
    let expected: Vec<bool> = (0..24).map(|i| i % 3 == 0).collect();
    assert_eq!(found, expected);

    let snap = engine.snapshot();
    assert_eq!(snap.transactions_processed, 24);
    assert_eq!(snap.rejected_at(Stage::Prefilter), 8);
    assert_eq!(snap.rejected_at(Stage::Decode), 8);
    assert_eq!(snap.opportunities_found, 8);
}

/// 10 ETH victim against a 1M / 2B ETH pool.
fn deep_pool_input() -> EstimateInput {
    EstimateInput {
        victim_amount: U256::from(10 * ETH),
        reserve_in: U256::from(1_000_000 * ETH),
        reserve_out: U256::from(2_000_000_000 * ETH),
        fee_bps: 30,
    }
}

fn deep_pool_consensus() -> mev_pipeline::Consensus {
    let cfg = config();
    let sizer = Arc::new(OptimalSizer::new(&cfg.sizer).unwrap());
    sizer.precompute();
    let (estimators, _) = default_estimators(sizer, &cfg.redundancy);
    let engine = RedundancyEngine::new(estimators, Arc::new(WorkerPool::new(3, 16, "est")), &cfg.redundancy);
    engine.estimate_consensus(&deep_pool_input()).unwrap()
}

#[test]
fn consensus_takes_median_of_three() {
    // the sandwich itself cannot beat fees here, the models still guess
    let consensus = deep_pool_consensus();
    assert_eq!(consensus.completed, 3);
    assert!(!consensus.agreed);
    assert_eq!(consensus.confidence, 75);
    assert!(!consensus.value.is_zero());
    assert!(consensus.value <= U256::from(ETH / 10));
}

#[test]
fn deep_pool_bundle_carries_victim_bytes() {
    let raw = victim(router(), 10 * ETH);
    let victim_tx = codec::decode(&raw).unwrap();
    let consensus = deep_pool_consensus();
    assert!(!consensus.value.is_zero());

    let cfg = config();
    let assembler = BundleAssembler::new(&cfg.strategy);
    let opportunity = mev_pipeline::Opportunity {
        pool: router(),
        direction: SwapDirection::ZeroForOne,
        path: vec![],
        sizing: mev_pipeline::SizingResult {
            frontrun_amount: U256::from(ETH),
            backrun_amount: U256::from(1_990 * ETH),
            expected_profit: consensus.value,
            victim_slippage: U256::from(ETH),
            confidence: consensus.confidence,
        },
        consensus,
        gross_profit: consensus.value,
        gas_cost: U256::from(ETH / 1_000),
        tip: U256::from(ETH / 1_000),
        net_profit: consensus.value,
        resource_cost: 500_000,
        victim: victim_tx,
    };
    let bundle = assembler.assemble(&opportunity).unwrap();
    let bytes = assembler.serialize(&bundle).unwrap();
    let items = rlp::split_list(&bytes).unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[1], raw.as_slice());
    assert_eq!(codec::decode(items[0]).unwrap().input, bundle.frontrun().input);
    assert_eq!(bundle.frontrun().from, searcher());
}

struct Snapshot(Vec<PoolUpdate>);

#[async_trait]
impl ReserveSource for Snapshot {
    async fn fetch_reserves(&self, _block: u64, _pools: &[Address]) -> anyhow::Result<Vec<PoolUpdate>> {
        Ok(self.0.clone())
    }
}

struct Hanging;

#[async_trait]
impl ReserveSource for Hanging {
    async fn fetch_reserves(&self, _block: u64, _pools: &[Address]) -> anyhow::Result<Vec<PoolUpdate>> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(vec![])
    }
}

#[tokio::test]
async fn refresh_replaces_placeholder_reserves() {
    let mut cfg = config();
    cfg.state.prewarm = vec![router()];
    let engine = MevEngine::new(cfg, Arc::new(Recorder::default())).unwrap();
    assert!(engine.state().get(&router()).unwrap().estimated);

    // a stalled source is bounded by the refresh timeout
    assert_eq!(engine.refresh_state(&Hanging, 1).await.unwrap(), 0);
    assert!(engine.state().get(&router()).unwrap().estimated);

    let source = Snapshot(vec![PoolUpdate {
        pool: router(),
        reserve0: U256::from(100 * ETH),
        reserve1: U256::from(200_000 * ETH),
        fee_bps: 30,
    }]);
    assert_eq!(engine.refresh_state(&source, 2).await.unwrap(), 1);
    let state = engine.state().get(&router()).unwrap();
    assert!(!state.estimated);
    assert_eq!(state.last_refresh_block, 2);
    assert_eq!(engine.state().current_block(), 2);

    let found = tokio::task::spawn_blocking(move || engine.process(&victim(router(), 10 * ETH)))
        .await
        .unwrap();
    assert!(found);
}
