//! Overflow-safe fixed-point helpers.
//!
//! `mul_div` forms the full product in a `U256` before dividing, so
//! `a * b / c` never loses precision to operation order and never wraps.

use alloy_primitives::U256;

use crate::{Amount, BPS_DENOMINATOR};

/// Compute `floor(a * b / c)` with a 256-bit intermediate product.
///
/// Returns `None` if `c` is zero or the quotient does not fit in `u128`.
///
/// # Examples
///
/// ```
/// use colla_types::math::mul_div;
///
/// assert_eq!(mul_div(1000, 25, 100), Some(250));
/// assert_eq!(mul_div(u128::MAX, u128::MAX, u128::MAX), Some(u128::MAX));
/// assert_eq!(mul_div(1, 1, 0), None);
/// ```
pub fn mul_div(a: u128, b: u128, c: u128) -> Option<u128> {
    if c == 0 {
        return None;
    }
    let product = U256::from(a).checked_mul(U256::from(b))?;
    let quotient = product.checked_div(U256::from(c))?;
    u128::try_from(quotient).ok()
}

/// Apply a basis-point rate to an amount, rounding down.
///
/// Rates above [`BPS_DENOMINATOR`] are the caller's responsibility to reject.
pub fn apply_bps(amount: Amount, bps: u16) -> Option<Amount> {
    mul_div(amount, u128::from(bps), u128::from(BPS_DENOMINATOR))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_values() {
        assert_eq!(mul_div(1000, 25, 100), Some(250));
        assert_eq!(mul_div(7, 3, 2), Some(10));
        assert_eq!(mul_div(0, 5, 3), Some(0));
    }

    #[test]
    fn test_zero_divisor() {
        assert_eq!(mul_div(10, 10, 0), None);
    }

    #[test]
    fn test_wide_product_exact() {
        // (2^127 * 6) / 3 = 2^128, which overflows
        assert_eq!(mul_div(1u128 << 127, 6, 3), None);
        // (2^127 * 6) / 4 = 3 * 2^126
        assert_eq!(mul_div(1u128 << 127, 6, 4), Some(3u128 << 126));
        assert_eq!(mul_div(u128::MAX, u128::MAX, u128::MAX), Some(u128::MAX));
        assert_eq!(mul_div(u128::MAX, 2, 4), Some(u128::MAX / 2));
    }

    #[test]
    fn test_rounds_down() {
        assert_eq!(mul_div(10, 1, 3), Some(3));
        assert_eq!(mul_div(u128::MAX, 1, 2), Some(u128::MAX / 2));
    }

    #[test]
    fn test_apply_bps() {
        assert_eq!(apply_bps(250, 1_000), Some(25));
        assert_eq!(apply_bps(250, 0), Some(0));
        assert_eq!(apply_bps(250, 10_000), Some(250));
        assert_eq!(apply_bps(u128::MAX, 10_000), Some(u128::MAX));
    }
}
