//! Wei arithmetic helpers on top of `U256`.

use ethers::types::{U256, U512};

/// One whole unit in basis points.
pub const BPS: u64 = 10_000;

const TWO_POW_64: f64 = 18_446_744_073_709_551_616.0;

/// `floor(a * b / denom)` through a 512-bit intermediate.
///
/// `None` when `denom` is zero or the quotient needs more than 256 bits.
#[inline]
pub fn mul_div(a: U256, b: U256, denom: U256) -> Option<U256> {
    if denom.is_zero() {
        return None;
    }
    U256::try_from(a.full_mul(b) / U512::from(denom)).ok()
}

/// Scales by a basis-point factor (10_000 = 1x). Saturates on overflow.
#[inline]
pub fn apply_bps(value: U256, bps: u32) -> U256 {
    mul_div(value, U256::from(bps), U256::from(BPS)).unwrap_or(U256::MAX)
}

/// Lossy conversion used only for bucketing and heuristics.
pub fn to_f64(value: U256) -> f64 {
    value.0.iter().rev().fold(0.0, |acc, &w| acc * TWO_POW_64 + w as f64)
}

/// Truncating conversion from a float. Negative and NaN map to zero,
/// values past 2^256 saturate.
pub fn from_f64(value: f64) -> U256 {
    if !(value >= 1.0) {
        return U256::zero();
    }
    if value >= TWO_POW_64.powi(4) {
        return U256::MAX;
    }
    let mut rem = value.trunc();
    let mut words = [0u64; 4];
    for i in (0..4).rev() {
        let scale = TWO_POW_64.powi(i as i32);
        let w = (rem / scale).floor();
        if w >= 1.0 {
            words[i] = w as u64;
            rem = (rem - w * scale).max(0.0);
        }
    }
    U256(words)
}

/// Up to 32 big-endian bytes, leading zeros allowed.
pub fn from_be_slice(bytes: &[u8]) -> Option<U256> {
    (bytes.len() <= 32).then(|| U256::from_big_endian(bytes))
}

pub fn to_be_bytes(value: U256) -> [u8; 32] {
    let mut out = [0u8; 32];
    value.to_big_endian(&mut out);
    out
}

/// Length of the minimal big-endian encoding.
#[inline]
pub fn byte_len(value: U256) -> usize {
    (value.bits() + 7) / 8
}
