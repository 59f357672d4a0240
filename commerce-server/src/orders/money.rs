//! Money calculation utilities using rust_decimal for precision
//!
//! All monetary amounts are carried as `Decimal` end to end; rounding only
//! happens at the points where an amount becomes externally visible (an
//! installment amount, a discounted total).

use rust_decimal::prelude::*;

/// Monetary values are expressed with 2 decimal places, half-up
const DECIMAL_PLACES: u32 = 2;

/// Round a monetary value to the cent (midpoint rounds away from zero)
#[inline]
pub fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// `pct` percent of `total`, rounded to the cent
#[inline]
pub fn percent_of(total: Decimal, pct: u32) -> Decimal {
    round_cents(total * Decimal::from(pct) / Decimal::ONE_HUNDRED)
}
