//! Decimal arithmetic for the derived invoice fields.
//!
//! Every stored amount has exactly two decimal places. Rounding is half away
//! from zero, which is what a 2-decimal display of the same number shows.

use rust_decimal::{Decimal, RoundingStrategy};

/// Largest value a `NUMERIC(10, 2)` column holds
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(1_410_065_407, 2, 0, false, 2);

/// Rounds to two decimals and pins the scale so that `125` renders as `125.00`
pub fn round(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

/// `amount = rate × quantity`
pub fn line_amount(rate: Decimal, quantity: i32) -> Decimal {
    round(rate * Decimal::from(quantity))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl Totals {
    pub fn compute(
        amounts: impl IntoIterator<Item = Decimal>,
        tax_percentage: Decimal,
        shipping_cost: Decimal,
    ) -> Self {
        let subtotal = round(amounts.into_iter().sum());
        let tax = round(subtotal * tax_percentage / Decimal::ONE_HUNDRED);
        let total = round(subtotal + tax + shipping_cost);

        Self {
            subtotal,
            tax,
            total,
        }
    }
}
