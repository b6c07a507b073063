//! Point-of-sale models

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::UnknownVariant;

/// Decimal places used for money amounts
pub const MONEY_SCALE: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Transfer,
    Other,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Transfer => "transfer",
            PaymentMethod::Other => "other",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(PaymentMethod::Cash),
            "card" => Ok(PaymentMethod::Card),
            "transfer" => Ok(PaymentMethod::Transfer),
            "other" => Ok(PaymentMethod::Other),
            other => Err(UnknownVariant::new("payment method", other)),
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Completed point-of-sale transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    pub id: i64,
    pub warehouse_id: i64,
    pub customer_name: Option<String>,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub payment_method: PaymentMethod,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub items: Vec<SaleItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleItem {
    pub id: i64,
    pub sale_id: i64,
    pub variant_id: i64,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

/// Monetary breakdown of a sale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleTotals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl SaleTotals {
    /// Compute totals from line totals, a flat discount and a tax rate in percent.
    ///
    /// Tax is charged on the discounted subtotal and rounded half away from
    /// zero to [`MONEY_SCALE`] places.
    pub fn compute(
        line_totals: &[Decimal],
        discount: Decimal,
        tax_rate_percent: Decimal,
    ) -> Result<Self, &'static str> {
        crate::validation::validate_tax_rate(tax_rate_percent)?;

        let subtotal = crate::validation::checked_total(line_totals.iter().copied())
            .ok_or("Sale subtotal is too large")?;
        crate::validation::validate_discount(discount, subtotal)?;

        let taxable = subtotal - discount;
        let tax = taxable
            .checked_mul(tax_rate_percent)
            .and_then(|t| t.checked_div(Decimal::from(100)))
            .ok_or("Sale tax is too large")?
            .round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
        let total = crate::validation::checked_total([taxable, tax])
            .ok_or("Sale total is too large")?;

        Ok(Self {
            subtotal,
            discount,
            tax,
            total,
        })
    }
}
