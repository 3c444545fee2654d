//! Swap parameters recovered from router calldata.

use ethers::types::{Address, U256};

use crate::codec::abi::{self, selectors};
use crate::types::{SwapDirection, Transaction};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapIntent {
    pub amount_in: U256,
    pub direction: SwapDirection,
    /// Token path when the calldata carries one
    pub path: Vec<Address>,
}

/// Extracts the input amount and direction from `tx`.
///
/// Native-input swaps use the attached value; token-input swaps read the
/// amount word of their entry point. Unrecognised calldata falls back to
/// the attached value and is unsimulatable when that is zero.
pub fn swap_intent(tx: &Transaction) -> Option<SwapIntent> {
    let data = tx.input.as_ref();
    let selector = tx.selector();
    let (amount_in, direction, path_word) = match selector {
        Some(selectors::SWAP_EXACT_ETH_FOR_TOKENS) => (tx.value, SwapDirection::ZeroForOne, Some(1)),
        Some(selectors::SWAP_EXACT_TOKENS_FOR_TOKENS) => {
            (abi::word_amount(data, 0)?, SwapDirection::ZeroForOne, Some(2))
        }
        Some(selectors::SWAP_TOKENS_FOR_EXACT_TOKENS) => {
            // amountInMax bounds what the victim can spend
            (abi::word_amount(data, 1)?, SwapDirection::ZeroForOne, Some(2))
        }
        Some(selectors::SWAP_EXACT_TOKENS_FOR_ETH) => {
            (abi::word_amount(data, 0)?, SwapDirection::OneForZero, Some(2))
        }
        Some(selectors::EXACT_INPUT_SINGLE) => (abi::word_amount(data, 5)?, SwapDirection::ZeroForOne, None),
        Some(selectors::EXACT_INPUT) => (abi::word_amount(data, 4)?, SwapDirection::ZeroForOne, None),
        _ => (tx.value, SwapDirection::ZeroForOne, None),
    };
    if amount_in.is_zero() {
        return None;
    }
    let path = path_word
        .and_then(|w| abi::address_array(data, w))
        .unwrap_or_default();
    Some(SwapIntent {
        amount_in,
        direction,
        path,
    })
}
