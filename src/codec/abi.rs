//! Calldata helpers for the router swap entry points we read and emit.
//!
//! Arguments are 32-byte big-endian words after the 4-byte selector.

use ethers::types::{Address, U256};

use crate::math;

pub const WORD: usize = 32;
const SELECTOR_LEN: usize = 4;
/// Longer paths are treated as malformed.
const MAX_PATH_LEN: usize = 8;

/// Router entry points recognised by the prefilter and the simulator.
pub mod selectors {
    pub const SWAP_EXACT_TOKENS_FOR_TOKENS: [u8; 4] = [0x38, 0xed, 0x17, 0x39];
    pub const SWAP_TOKENS_FOR_EXACT_TOKENS: [u8; 4] = [0x88, 0x03, 0xdb, 0xee];
    pub const SWAP_EXACT_ETH_FOR_TOKENS: [u8; 4] = [0x7f, 0xf3, 0x6a, 0xb5];
    pub const SWAP_EXACT_TOKENS_FOR_ETH: [u8; 4] = [0x18, 0xcb, 0xaf, 0xe5];
    pub const EXACT_INPUT_SINGLE: [u8; 4] = [0x41, 0x4b, 0xf3, 0x89];
    pub const EXACT_INPUT: [u8; 4] = [0xc0, 0x4b, 0x8d, 0x59];
    pub const MULTICALL: [u8; 4] = [0x5a, 0xe4, 0x01, 0xdc];
    pub const AGGREGATOR_SWAP: [u8; 4] = [0x12, 0xaa, 0x3c, 0xaf];
}

#[inline]
fn args(data: &[u8]) -> Option<&[u8]> {
    data.get(SELECTOR_LEN..)
}

/// The `index`-th argument word.
pub fn word(data: &[u8], index: usize) -> Option<&[u8]> {
    let start = index.checked_mul(WORD)?;
    args(data)?.get(start..start.checked_add(WORD)?)
}

pub fn word_amount(data: &[u8], index: usize) -> Option<U256> {
    word(data, index).and_then(math::from_be_slice)
}

/// Word interpreted as an offset or length. Rejects anything past u32.
pub fn word_usize(data: &[u8], index: usize) -> Option<usize> {
    let w = word(data, index)?;
    if w[..28].iter().any(|&b| b != 0) {
        return None;
    }
    Some(u32::from_be_bytes([w[28], w[29], w[30], w[31]]) as usize)
}

/// Reads a dynamic `address[]` whose head offset sits at word `index`.
pub fn address_array(data: &[u8], index: usize) -> Option<Vec<Address>> {
    let args = args(data)?;
    let offset = word_usize(data, index)?;
    if offset % WORD != 0 {
        return None;
    }
    let len_word = offset / WORD;
    let len = word_usize(data, len_word)?;
    if len > MAX_PATH_LEN {
        return None;
    }
    let body = args.get(offset + WORD..offset + WORD + len * WORD)?;
    Some(
        body.chunks_exact(WORD)
            .map(|w| Address::from_slice(&w[12..]))
            .collect(),
    )
}

pub fn push_amount(out: &mut Vec<u8>, v: &U256) {
    out.extend_from_slice(&math::to_be_bytes(*v));
}

pub fn push_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&[0u8; 24]);
    out.extend_from_slice(&v.to_be_bytes());
}

pub fn push_address(out: &mut Vec<u8>, addr: &Address) {
    out.extend_from_slice(&[0u8; 12]);
    out.extend_from_slice(addr.as_bytes());
}

/// `(amountIn, amountOutMin, address[] path, address to, uint deadline)`
pub fn encode_exact_input_swap(
    selector: [u8; 4],
    amount_in: &U256,
    amount_out_min: &U256,
    path: &[Address],
    to: &Address,
    deadline: u64,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(SELECTOR_LEN + WORD * (6 + path.len()));
    out.extend_from_slice(&selector);
    push_amount(&mut out, amount_in);
    push_amount(&mut out, amount_out_min);
    push_u64(&mut out, (5 * WORD) as u64);
    push_address(&mut out, to);
    push_u64(&mut out, deadline);
    push_u64(&mut out, path.len() as u64);
    for hop in path {
        push_address(&mut out, hop);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_then_read_words() {
        let path = vec![Address::repeat_byte(0x11), Address::repeat_byte(0x22)];
        let to = Address::repeat_byte(0x33);
        let data = encode_exact_input_swap(
            selectors::SWAP_EXACT_TOKENS_FOR_TOKENS,
            &U256::from(5_000),
            &U256::zero(),
            &path,
            &to,
            1_700_000_000,
        );
        assert_eq!(&data[..4], &selectors::SWAP_EXACT_TOKENS_FOR_TOKENS);
        assert_eq!(word_amount(&data, 0), Some(U256::from(5_000)));
        assert_eq!(word_amount(&data, 1), Some(U256::zero()));
        assert_eq!(word_usize(&data, 4), Some(1_700_000_000));
        assert_eq!(address_array(&data, 2), Some(path));
        assert_eq!(word(&data, 8), None);
    }

    #[test]
    fn test_short_calldata() {
        assert_eq!(word(&[0x38, 0xed], 0), None);
        assert_eq!(word_amount(&[0x38, 0xed, 0x17, 0x39, 0x01], 0), None);
    }

    #[test]
    fn test_path_offset_out_of_range() {
        let mut data = selectors::SWAP_EXACT_TOKENS_FOR_TOKENS.to_vec();
        push_u64(&mut data, 0);
        push_u64(&mut data, 0);
        push_u64(&mut data, 0x1000);
        assert_eq!(address_array(&data, 2), None);
    }
}
