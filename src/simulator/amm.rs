//! Constant-product swap math.

use ethers::types::U256;

use crate::math;

pub const FEE_DENOMINATOR: u32 = 10_000;

/// Output of swapping `amount_in` against `(reserve_in, reserve_out)`.
///
/// `out = r_out * in * (D - fee) / (r_in * D + in * (D - fee))`, floored.
/// Zero for empty pools, zero input, fees of 100% or more, and on
/// arithmetic overflow.
pub fn get_amount_out(amount_in: U256, reserve_in: U256, reserve_out: U256, fee_bps: u32) -> U256 {
    if amount_in.is_zero() || reserve_in.is_zero() || reserve_out.is_zero() || fee_bps >= FEE_DENOMINATOR {
        return U256::zero();
    }
    let fee_factor = U256::from(FEE_DENOMINATOR - fee_bps);
    let denom = U256::from(FEE_DENOMINATOR);
    let quote = || {
        let in_with_fee = amount_in.checked_mul(fee_factor)?;
        let denominator = reserve_in.checked_mul(denom)?.checked_add(in_with_fee)?;
        math::mul_div(reserve_out, in_with_fee, denominator)
    };
    quote().unwrap_or(U256::zero())
}

/// Every leg of a frontrun / victim / backrun sequence on one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SandwichLegs {
    /// Tokens received by the frontrun, sold back by the backrun
    pub acquired: U256,
    /// Victim output with no frontrun ahead of it
    pub victim_out_clean: U256,
    pub victim_out: U256,
    pub backrun_out: U256,
    /// What selling `acquired` right after the frontrun would return
    pub unwind_out: U256,
}

impl SandwichLegs {
    /// `backrun_out - frontrun_in`, `None` unless strictly positive.
    pub fn profit(&self, frontrun_in: U256) -> Option<U256> {
        self.backrun_out
            .checked_sub(frontrun_in)
            .filter(|p| !p.is_zero())
    }

    pub fn victim_slippage(&self) -> U256 {
        self.victim_out_clean.saturating_sub(self.victim_out)
    }
}

/// Replays a sandwich on a working copy of `(reserve_in, reserve_out)`.
pub fn sandwich(
    frontrun_in: U256,
    victim_in: U256,
    reserve_in: U256,
    reserve_out: U256,
    fee_bps: u32,
) -> SandwichLegs {
    let victim_out_clean = get_amount_out(victim_in, reserve_in, reserve_out, fee_bps);

    let acquired = get_amount_out(frontrun_in, reserve_in, reserve_out, fee_bps);
    let (mut r_in, mut r_out) = (
        reserve_in.saturating_add(frontrun_in),
        reserve_out.saturating_sub(acquired),
    );
    let unwind_out = get_amount_out(acquired, r_out, r_in, fee_bps);

    let victim_out = get_amount_out(victim_in, r_in, r_out, fee_bps);
    r_in = r_in.saturating_add(victim_in);
    r_out = r_out.saturating_sub(victim_out);

    let backrun_out = get_amount_out(acquired, r_out, r_in, fee_bps);

    SandwichLegs {
        acquired,
        victim_out_clean,
        victim_out,
        backrun_out,
        unwind_out,
    }
}
