//! Fixed-scale money/quantity arithmetic and residual reconciliation (C1).
//!
//! Every amount the core handles is a [`rust_decimal::Decimal`] — never an
//! `f64`. Money is always rounded half-up to [`crate::constants::MONEY_SCALE`]
//! decimal places before it is compared, summed, or persisted.

use rust_decimal::Decimal;
use rust_decimal::RoundingStrategy;

use crate::constants::MONEY_SCALE;

/// Round a monetary amount half-up to the canonical money scale.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Render a decimal in canonical form: trailing zeros and a trailing `.`
/// stripped, never scientific notation.
///
/// `rust_decimal`'s `Display` never emits scientific notation, so
/// canonicalization only has to trim.
pub fn to_canonical_string(amount: Decimal) -> String {
    let normalized = amount.normalize();
    let text = normalized.to_string();
    if let Some(stripped) = text.strip_suffix('.') {
        stripped.to_string()
    } else {
        text
    }
}

/// Split a total amount across `parts` raw (unrounded) per-part amounts,
/// rounding each independently and then nudging the largest-magnitude part
/// by whatever signed residual is left so the rounded parts sum exactly to
/// the rounded total.
///
/// Returns the rounded parts and the index of the part that absorbed the
/// residual (`None` when `parts` is empty, in which case no residual
/// adjustment happens).
pub fn allocate_with_residual(total: Decimal, parts: &[Decimal]) -> (Vec<Decimal>, Option<usize>) {
    if parts.is_empty() {
        return (Vec::new(), None);
    }

    let rounded_total = round_money(total);
    let mut rounded: Vec<Decimal> = parts.iter().map(|p| round_money(*p)).collect();

    let largest_index = parts
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.abs().cmp(&b.abs()))
        .map(|(idx, _)| idx)
        .expect("parts is non-empty");

    let rounded_sum: Decimal = rounded.iter().sum();
    let residual = rounded_total - rounded_sum;
    rounded[largest_index] += residual;

    (rounded, Some(largest_index))
}

/// Compute a gross amount (`|quantity| * price`), rounded to money scale.
pub fn gross_amount(quantity: Decimal, price: Decimal) -> Decimal {
    round_money(quantity.abs() * price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_money_half_up() {
        assert_eq!(round_money(dec!(1.005)), dec!(1.01));
        assert_eq!(round_money(dec!(1.004)), dec!(1.00));
        assert_eq!(round_money(dec!(-1.005)), dec!(-1.01));
    }

    #[test]
    fn test_to_canonical_string_strips_trailing_zeros() {
        assert_eq!(to_canonical_string(dec!(1.500)), "1.5");
        assert_eq!(to_canonical_string(dec!(2.000)), "2");
        assert_eq!(to_canonical_string(dec!(-3.140)), "-3.14");
    }

    #[test]
    fn test_allocate_with_residual_sums_to_total() {
        let total = dec!(100.00);
        let parts = vec![dec!(33.333), dec!(33.333), dec!(33.334)];
        let (allocated, idx) = allocate_with_residual(total, &parts);
        let sum: Decimal = allocated.iter().sum();
        assert_eq!(sum, round_money(total));
        assert_eq!(idx, Some(2));
    }

    #[test]
    fn test_allocate_with_residual_largest_magnitude_absorbs() {
        let total = dec!(10.00);
        let parts = vec![dec!(1.005), dec!(8.995)];
        let (allocated, idx) = allocate_with_residual(total, &parts);
        assert_eq!(idx, Some(1));
        let sum: Decimal = allocated.iter().sum();
        assert_eq!(sum, round_money(total));
    }

    #[test]
    fn test_allocate_with_residual_empty() {
        let (allocated, idx) = allocate_with_residual(dec!(0), &[]);
        assert!(allocated.is_empty());
        assert_eq!(idx, None);
    }

    #[test]
    fn test_gross_amount() {
        assert_eq!(gross_amount(dec!(-150), dec!(10.005)), dec!(1500.75));
    }
}
