use crate::{IndentureError, Result};

use crate::types::{Bps, BPS_U64};

/// Seconds in the 365-day accounting year used for all annual-rate proration.
pub const SECS_PER_YEAR: u64 = 31_536_000;

pub fn mul_div_floor_u64(a: u64, b: u64, denom: u64) -> Result<u64> {
    if denom == 0 {
        return Err(IndentureError::InvalidInput("division by zero".into()));
    }
    let num = (a as u128)
        .checked_mul(b as u128)
        .ok_or_else(|| IndentureError::BoundedValueExceeded("u128 overflow in mul".into()))?;
    let out = num / (denom as u128);
    u64::try_from(out)
        .map_err(|_| IndentureError::BoundedValueExceeded("u64 overflow in div".into()))
}

pub fn add_u64(a: u64, b: u64) -> Result<u64> {
    a.checked_add(b)
        .ok_or_else(|| IndentureError::BoundedValueExceeded("u64 overflow in add".into()))
}

pub fn sub_u64(a: u64, b: u64) -> Result<u64> {
    a.checked_sub(b)
        .ok_or_else(|| IndentureError::InvalidInput("u64 underflow in sub".into()))
}

pub fn floor_bps(amount: u64, bps: Bps) -> Result<u64> {
    mul_div_floor_u64(amount, bps.as_u64(), BPS_U64)
}

/// Annual rate applied to `base` and prorated to `span_secs`:
/// `floor(base * rate_bps * span_secs / (10_000 * SECS_PER_YEAR))`.
///
/// Single u128 numerator, so no precision is lost to intermediate floors.
pub fn prorated_annual(base: u64, rate: Bps, span_secs: u64) -> Result<u64> {
    let num = (base as u128)
        .checked_mul(rate.as_u64() as u128)
        .and_then(|n| n.checked_mul(span_secs as u128))
        .ok_or_else(|| {
            IndentureError::BoundedValueExceeded("u128 overflow in prorated_annual".into())
        })?;
    let denom = (BPS_U64 as u128) * (SECS_PER_YEAR as u128);
    u64::try_from(num / denom).map_err(|_| {
        IndentureError::BoundedValueExceeded("prorated amount does not fit u64".into())
    })
}

/// Fixed redemption liability for a bond: principal plus the term-prorated
/// coupon at the rate in effect when the bond is issued.
pub fn bond_redemption(principal: u64, rate: Bps, term_secs: u64) -> Result<u64> {
    add_u64(principal, prorated_annual(principal, rate, term_secs)?)
}

/// Principal forfeited on early withdrawal.
///
/// Flat bps of principal, independent of remaining term (the original program
/// charges the same penalty on day one and the day before maturity).
pub fn early_withdrawal_penalty(principal: u64, penalty: Bps) -> Result<u64> {
    floor_bps(principal, penalty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn one_year_bond_at_ten_percent() {
        assert_eq!(
            bond_redemption(100_000, Bps::new(1_000).unwrap(), SECS_PER_YEAR).unwrap(),
            110_000
        );
    }

    #[test]
    fn half_year_term_prorates_coupon() {
        assert_eq!(
            bond_redemption(100_000, Bps::new(1_000).unwrap(), SECS_PER_YEAR / 2).unwrap(),
            105_000
        );
    }

    #[test]
    fn mul_div_rejects_zero_denominator() {
        assert!(mul_div_floor_u64(1, 1, 0).is_err());
    }

    proptest! {
        #[test]
        fn floor_bps_never_exceeds_amount(amount in 0u64..u64::MAX, bps in 0u16..=10_000) {
            let out = floor_bps(amount, Bps::new(bps).unwrap()).unwrap();
            prop_assert!(out <= amount);
        }

        #[test]
        fn prorated_annual_is_monotone_in_span(
            base in 0u64..1_000_000_000_000u64,
            rate in 0u16..=1_000,
            s1 in 0u64..SECS_PER_YEAR * 10,
            s2 in 0u64..SECS_PER_YEAR * 10,
        ) {
            let rate = Bps::new(rate).unwrap();
            let (a, b) = if s1 <= s2 { (s1, s2) } else { (s2, s1) };
            prop_assert!(prorated_annual(base, rate, a).unwrap() <= prorated_annual(base, rate, b).unwrap());
        }

        #[test]
        fn redemption_never_below_principal(
            principal in 0u64..1_000_000_000_000u64,
            rate in 0u16..=1_000,
            term in 1u64..SECS_PER_YEAR * 30,
        ) {
            let r = bond_redemption(principal, Bps::new(rate).unwrap(), term).unwrap();
            prop_assert!(r >= principal);
        }

        #[test]
        fn penalty_is_bounded_by_principal(
            principal in 0u64..u64::MAX,
            penalty in 0u16..=10_000,
        ) {
            let p = early_withdrawal_penalty(principal, Bps::new(penalty).unwrap()).unwrap();
            prop_assert!(p <= principal);
        }
    }
}
