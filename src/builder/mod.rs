//! Bundle assembly
//!
//! Turns a viable opportunity into an ordered frontrun / victim / backrun
//! bundle and serializes it for submission.

use bytes::Bytes;
use ethers::types::{Address, U256};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::codec::{self, abi};
use crate::config::StrategyConfig;
use crate::error::AssembleError;
use crate::types::{Bundle, Opportunity, SwapDirection, Transaction, SWAP_GAS_LIMIT};

/// Bundle assembler for sandwich extraction
pub struct BundleAssembler {
    searcher: Address,
    nonce: AtomicU64,
    fee_nudge: U256,
    deadline_secs: u64,
    max_bundle_gas: u64,
    max_bundle_bytes: usize,
    count: AtomicU64,
}

impl BundleAssembler {
    pub fn new(config: &StrategyConfig) -> Self {
        Self {
            searcher: config.searcher_address,
            nonce: AtomicU64::new(config.starting_nonce),
            fee_nudge: config.fee_nudge_wei,
            deadline_secs: config.deadline_secs,
            max_bundle_gas: config.max_bundle_gas,
            max_bundle_bytes: config.max_bundle_bytes,
            count: AtomicU64::new(0),
        }
    }

    /// Builds `[frontrun, victim, backrun]`.
    ///
    /// The frontrun pays one nudge below the victim's fee and the backrun
    /// one nudge above it, so fee ordering places them around the victim.
    /// The victim is carried unchanged. Searcher nonces are reserved only
    /// once the bundle validates.
    pub fn assemble(&self, opportunity: &Opportunity) -> Result<Bundle, AssembleError> {
        let victim = &opportunity.victim;
        let front_fee = victim
            .gas_price
            .checked_sub(self.fee_nudge)
            .filter(|_| !victim.gas_price.is_zero())
            .ok_or(AssembleError::FeeOrdering {
                victim_fee: victim.gas_price,
            })?;
        let back_fee = victim
            .gas_price
            .checked_add(self.fee_nudge)
            .ok_or(AssembleError::FeeOrdering {
                victim_fee: victim.gas_price,
            })?;

        let total_gas = 2 * SWAP_GAS_LIMIT + victim.gas_limit;
        if total_gas > self.max_bundle_gas {
            return Err(AssembleError::ResourceCeiling {
                gas: total_gas,
                limit: self.max_bundle_gas,
            });
        }

        let deadline = victim.timestamp_us / 1_000_000 + self.deadline_secs;
        let reversed: Vec<Address> = opportunity.path.iter().rev().copied().collect();

        let frontrun = self.swap_tx(
            victim,
            opportunity.direction,
            opportunity.sizing.frontrun_amount,
            &opportunity.path,
            deadline,
            0,
            front_fee,
        );
        let backrun = self.swap_tx(
            victim,
            opportunity.direction.reversed(),
            opportunity.sizing.backrun_amount,
            &reversed,
            deadline,
            1,
            back_fee,
        );

        let fee = |tx: &Transaction| tx.gas_price.saturating_mul(U256::from(tx.gas_limit));
        let total_fees = fee(&frontrun)
            .saturating_add(fee(victim))
            .saturating_add(fee(&backrun));

        let mut bundle = Bundle {
            txs: [frontrun, victim.clone(), backrun],
            total_gas,
            total_fees,
            priority_tip: opportunity.tip,
            expected_profit: opportunity.net_profit,
        };
        bundle.validate()?;

        let nonce = self.nonce.fetch_add(2, Ordering::AcqRel);
        bundle.txs[0].nonce = nonce;
        bundle.txs[2].nonce = nonce.wrapping_add(1);

        self.count.fetch_add(1, Ordering::Relaxed);
        debug!(
            victim = ?victim.hash(),
            nonce,
            frontrun = %opportunity.sizing.frontrun_amount,
            profit = %opportunity.net_profit,
            "bundle assembled"
        );
        Ok(bundle)
    }

    /// Wire form of `bundle`, bounded by the configured size ceiling.
    pub fn serialize(&self, bundle: &Bundle) -> Result<Vec<u8>, AssembleError> {
        let bytes = codec::encode_bundle(&bundle.txs);
        if bytes.len() > self.max_bundle_bytes {
            return Err(AssembleError::BundleTooLarge {
                size: bytes.len(),
                limit: self.max_bundle_bytes,
            });
        }
        Ok(bytes)
    }

    #[allow(clippy::too_many_arguments)]
    fn swap_tx(
        &self,
        victim: &Transaction,
        direction: SwapDirection,
        amount_in: U256,
        path: &[Address],
        deadline: u64,
        nonce: u64,
        gas_price: U256,
    ) -> Transaction {
        let selector = match direction {
            SwapDirection::ZeroForOne => abi::selectors::SWAP_EXACT_TOKENS_FOR_TOKENS,
            SwapDirection::OneForZero => abi::selectors::SWAP_EXACT_TOKENS_FOR_ETH,
        };
        let input = abi::encode_exact_input_swap(
            selector,
            &amount_in,
            &U256::zero(),
            path,
            &self.searcher,
            deadline,
        );
        Transaction {
            from: self.searcher,
            to: victim.to,
            value: U256::zero(),
            gas_price,
            gas_limit: SWAP_GAS_LIMIT,
            nonce,
            input: Bytes::from(input),
            timestamp_us: victim.timestamp_us,
            raw: Bytes::new(),
        }
    }

    /// Hands back the nonces of a bundle that never left the process.
    ///
    /// Only the most recent reservation can be returned; returns false
    /// when later bundles have already taken nonces past it.
    pub fn release(&self, bundle: &Bundle) -> bool {
        let first = bundle.frontrun().nonce;
        self.nonce
            .compare_exchange(first.wrapping_add(2), first, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Resets the nonce, e.g. after an on-chain resync.
    pub fn set_nonce(&self, nonce: u64) {
        self.nonce.store(nonce, Ordering::Release);
    }

    pub fn next_nonce(&self) -> u64 {
        self.nonce.load(Ordering::Acquire)
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::rlp;
    use crate::redundancy::Consensus;
    use crate::simulator::swap_intent;
    use crate::types::SizingResult;

    fn victim(gas_price: u64) -> Transaction {
        let mut input = abi::selectors::SWAP_EXACT_ETH_FOR_TOKENS.to_vec();
        input.extend_from_slice(&[0u8; 32]);
        let tx = Transaction {
            from: Address::zero(),
            to: Address::repeat_byte(0x7a),
            value: U256::from(10_000),
            gas_price: U256::from(gas_price),
            gas_limit: 200_000,
            nonce: 3,
            input: Bytes::from(input),
            timestamp_us: 1_700_000_000_000_000,
            raw: Bytes::new(),
        };
        codec::decode(&codec::encode(&tx)).unwrap()
    }

    fn opportunity(victim: Transaction) -> Opportunity {
        Opportunity {
            victim,
            pool: Address::repeat_byte(0x7a),
            direction: SwapDirection::ZeroForOne,
            path: vec![Address::repeat_byte(0x01), Address::repeat_byte(0x02)],
            sizing: SizingResult {
                frontrun_amount: U256::from(4_000),
                backrun_amount: U256::from(3_900),
                expected_profit: U256::from(500),
                victim_slippage: U256::from(10),
                confidence: 95,
            },
            consensus: Consensus {
                value: U256::from(500),
                agreed: true,
                confidence: 95,
                completed: 3,
                requested: 3,
            },
            gross_profit: U256::from(500),
            gas_cost: U256::from(100),
            tip: U256::from(50),
            net_profit: U256::from(350),
            resource_cost: 500_000,
        }
    }

    fn assembler() -> BundleAssembler {
        BundleAssembler::new(&StrategyConfig {
            searcher_address: Address::repeat_byte(0x5e),
            starting_nonce: 10,
            ..Default::default()
        })
    }

    #[test]
    fn test_ordering_and_nonces() {
        let a = assembler();
        let opp = opportunity(victim(30_000_000_000));
        let bundle = a.assemble(&opp).unwrap();

        assert_eq!(bundle.victim(), &opp.victim);
        assert!(bundle.frontrun().gas_price < bundle.victim().gas_price);
        assert!(bundle.backrun().gas_price > bundle.victim().gas_price);
        assert_eq!(bundle.frontrun().nonce, 10);
        assert_eq!(bundle.backrun().nonce, 11);
        assert_eq!(bundle.frontrun().from, Address::repeat_byte(0x5e));
        assert_eq!(bundle.total_gas, 500_000);
        assert_eq!(a.next_nonce(), 12);

        let front = swap_intent(bundle.frontrun()).unwrap();
        let back = swap_intent(bundle.backrun()).unwrap();
        assert_eq!(front.amount_in, U256::from(4_000));
        assert_eq!(front.direction, SwapDirection::ZeroForOne);
        assert_eq!(back.amount_in, U256::from(3_900));
        assert_eq!(back.direction, SwapDirection::OneForZero);
        assert_eq!(back.path, vec![Address::repeat_byte(0x02), Address::repeat_byte(0x01)]);
    }

    #[test]
    fn test_zero_victim_fee_cannot_be_undercut() {
        let a = assembler();
        let err = a.assemble(&opportunity(victim(0))).unwrap_err();
        assert_eq!(err, AssembleError::FeeOrdering { victim_fee: U256::zero() });
        assert_eq!(a.next_nonce(), 10);
    }

    #[test]
    fn test_invalid_bundle_keeps_nonces() {
        let a = assembler();
        let mut opp = opportunity(victim(30_000_000_000));
        // a victim we built ourselves has no original envelope
        opp.victim.raw = Bytes::new();
        let err = a.assemble(&opp).unwrap_err();
        assert!(matches!(err, AssembleError::Ordering(_)));
        assert_eq!(a.next_nonce(), 10);

        opp = opportunity(victim(30_000_000_000));
        let bundle = a.assemble(&opp).unwrap();
        assert_eq!((bundle.frontrun().nonce, bundle.backrun().nonce), (10, 11));
    }

    #[test]
    fn test_release_returns_latest_reservation() {
        let a = assembler();
        let opp = opportunity(victim(30_000_000_000));
        let first = a.assemble(&opp).unwrap();
        let second = a.assemble(&opp).unwrap();
        assert_eq!(a.next_nonce(), 14);
        // a later reservation exists, so the first cannot be returned
        assert!(!a.release(&first));
        assert!(a.release(&second));
        assert_eq!(a.next_nonce(), 12);
    }

    #[test]
    fn test_gas_ceiling() {
        let mut v = victim(10);
        v.gas_limit = 5_000_000;
        let err = assembler().assemble(&opportunity(v)).unwrap_err();
        assert!(matches!(err, AssembleError::ResourceCeiling { .. }));
    }

    #[test]
    fn test_serialize_passes_victim_through() {
        let a = assembler();
        let opp = opportunity(victim(30_000_000_000));
        let bundle = a.assemble(&opp).unwrap();
        let bytes = a.serialize(&bundle).unwrap();
        let items = rlp::split_list(&bytes).unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[1], opp.victim.raw.as_ref());
        let front = codec::decode(items[0]).unwrap();
        assert_eq!(front.nonce, bundle.frontrun().nonce);

        let tight = BundleAssembler::new(&StrategyConfig {
            max_bundle_bytes: 64,
            ..Default::default()
        });
        assert!(matches!(
            tight.serialize(&bundle),
            Err(AssembleError::BundleTooLarge { limit: 64, .. })
        ));
    }
}
