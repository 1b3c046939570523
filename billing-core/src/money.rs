//! Fixed-point money helpers.
//!
//! All monetary amounts are 2-decimal-place values rounded half-up; service
//! quantities are 4-place. Binary floating point never touches money.

use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places for monetary amounts.
pub const MONEY_DP: u32 = 2;
/// Decimal places for quantities.
pub const QTY_DP: u32 = 4;

/// Round a monetary amount to 2 places, half-up.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Round a quantity to 4 places, half-up.
pub fn round_qty(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(QTY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Clamp a monetary amount into `[0, max]`.
pub fn clamp_money(value: Decimal, max: Decimal) -> Decimal {
    round_money(value.max(Decimal::ZERO).min(max))
}

/// True when the amount is strictly positive after money rounding.
pub fn is_positive(value: Decimal) -> bool {
    round_money(value) > Decimal::ZERO
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rounds_half_up_at_two_places() {
        assert_eq!(round_money(dec!(10.005)), dec!(10.01));
        assert_eq!(round_money(dec!(10.004)), dec!(10.00));
        assert_eq!(round_money(dec!(-10.005)), dec!(-10.01));
    }

    #[test]
    fn rounds_quantities_at_four_places() {
        assert_eq!(round_qty(dec!(1.00005)), dec!(1.0001));
        assert_eq!(round_qty(dec!(2)), dec!(2));
    }

    #[test]
    fn clamps_into_range() {
        assert_eq!(clamp_money(dec!(-5), dec!(100)), dec!(0));
        assert_eq!(clamp_money(dec!(150), dec!(100)), dec!(100));
        assert_eq!(clamp_money(dec!(42.42), dec!(100)), dec!(42.42));
    }
}
