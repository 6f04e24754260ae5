//! Decimal arithmetic utilities for financial calculations.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Round a decimal to a specific number of decimal places.
pub fn round_to_precision(value: Decimal, decimals: u32) -> Decimal {
    value.round_dp(decimals)
}

/// Safe division that returns zero if divisor is zero.
pub fn safe_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator == Decimal::ZERO {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}

/// Convert a fraction (0.1) to percentage points (10).
pub fn to_percent(fraction: Decimal) -> Decimal {
    fraction * dec!(100)
}

/// Convert percentage points (10) to a fraction (0.1).
pub fn from_percent(percent: Decimal) -> Decimal {
    percent / dec!(100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_div() {
        assert_eq!(safe_div(dec!(1), dec!(4)), dec!(0.25));
        assert_eq!(safe_div(dec!(1), Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_percent_conversion() {
        assert_eq!(to_percent(dec!(0.1)), dec!(10));
        assert_eq!(from_percent(dec!(5)), dec!(0.05));
        assert_eq!(round_to_precision(dec!(10.004), 2), dec!(10.00));
    }
}
