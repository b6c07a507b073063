//! Validation utilities for stock and money amounts

use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places kept by every stored quantity and amount (`NUMERIC(18, 4)`)
pub const STORED_SCALE: u32 = 4;

/// Stored quantities and amounts must stay strictly below 10^14 in magnitude
const STORED_INTEGER_LIMIT: i64 = 100_000_000_000_000;

/// Whether `value` fits a `NUMERIC(18, 4)` column without rounding or overflow
pub fn is_storable(value: Decimal) -> bool {
    validate_storable(value).is_ok()
}

fn validate_storable(value: Decimal) -> Result<(), &'static str> {
    if value.normalize().scale() > STORED_SCALE {
        return Err("Value must have at most 4 decimal places");
    }
    if value.abs() >= Decimal::from(STORED_INTEGER_LIMIT) {
        return Err("Value is too large");
    }
    Ok(())
}

// ============================================================================
// Quantity Validations
// ============================================================================

/// Validate that a stock movement quantity is strictly positive and storable
pub fn validate_quantity(quantity: Decimal) -> Result<(), &'static str> {
    if quantity <= Decimal::ZERO {
        return Err("Quantity must be greater than zero");
    }
    validate_storable(quantity)
}

/// Validate a manual adjustment delta (either sign, never zero)
pub fn validate_delta(delta: Decimal) -> Result<(), &'static str> {
    if delta.is_zero() {
        return Err("Adjustment delta must not be zero");
    }
    validate_storable(delta)
}

/// Validate that a cumulative receipt stays within the ordered quantity
pub fn validate_receipt(
    ordered: Decimal,
    already_received: Decimal,
    receiving: Decimal,
) -> Result<(), &'static str> {
    validate_quantity(receiving)?;
    if already_received + receiving > ordered {
        return Err("Received quantity would exceed ordered quantity");
    }
    Ok(())
}

// ============================================================================
// Money Validations
// ============================================================================

/// Validate a unit price or unit cost
pub fn validate_unit_amount(amount: Decimal) -> Result<(), &'static str> {
    if amount < Decimal::ZERO {
        return Err("Unit amount cannot be negative");
    }
    validate_storable(amount)
}

/// Validate a tax rate expressed in percent
pub fn validate_tax_rate(rate: Decimal) -> Result<(), &'static str> {
    if rate < Decimal::ZERO || rate > Decimal::from(100) {
        return Err("Tax rate must be between 0 and 100%");
    }
    Ok(())
}

/// Validate a flat discount against the subtotal it applies to
pub fn validate_discount(discount: Decimal, subtotal: Decimal) -> Result<(), &'static str> {
    if discount < Decimal::ZERO {
        return Err("Discount cannot be negative");
    }
    if discount > subtotal {
        return Err("Discount cannot exceed the subtotal");
    }
    validate_storable(discount)
}

/// Line total for a sale or purchase line, rounded to the stored scale.
///
/// `None` when the product does not fit a stored amount.
pub fn line_total(quantity: Decimal, unit_price: Decimal) -> Option<Decimal> {
    let total = quantity
        .checked_mul(unit_price)?
        .round_dp_with_strategy(STORED_SCALE, RoundingStrategy::MidpointAwayFromZero);
    is_storable(total).then_some(total)
}

/// Sum of amounts, `None` when the result does not fit a stored amount
pub fn checked_total<I>(amounts: I) -> Option<Decimal>
where
    I: IntoIterator<Item = Decimal>,
{
    let total = amounts
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, amount| acc.checked_add(amount))?;
    is_storable(total).then_some(total)
}
