//! Point-of-sale settlement service

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;
use shared::{
    combine_quantities, in_lock_order, line_total, validate_quantity, validate_unit_amount,
    PaginatedResponse, Pagination, PaymentMethod, Sale, SaleTotals, StockDelta, StockKey,
};
use validator::Validate;

use super::inventory::{ensure_variant, ensure_warehouse, shortfall};
use crate::error::{AppError, AppResult};
use crate::store::{NewSale, NewSaleItem, Store};

/// Sales service
#[derive(Clone)]
pub struct SalesService {
    store: Arc<dyn Store>,
}

/// Input for recording a sale
#[derive(Debug, Deserialize, Validate)]
pub struct CreateSaleInput {
    pub warehouse_id: i64,
    #[validate(length(max = 200, message = "Customer name must be at most 200 characters"))]
    pub customer_name: Option<String>,
    pub payment_method: String,
    /// Flat discount taken off the subtotal
    #[serde(default)]
    pub discount_amount: Decimal,
    /// Tax rate in percent applied after the discount
    #[serde(default)]
    pub tax_rate: Decimal,
    pub items: Vec<SaleItemInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SaleItemInput {
    pub variant_id: i64,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

impl SalesService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Record a sale and deduct its stock; all lines succeed or nothing changes
    pub async fn process_sale(&self, user_id: i64, input: CreateSaleInput) -> AppResult<Sale> {
        input.validate()?;
        if input.items.is_empty() {
            return Err(AppError::InvalidInput(
                "Sale must contain at least one item".to_string(),
            ));
        }
        let payment_method: PaymentMethod = input
            .payment_method
            .parse()
            .map_err(|e: shared::UnknownVariant| AppError::InvalidInput(e.to_string()))?;

        let mut lines = Vec::with_capacity(input.items.len());
        for item in &input.items {
            validate_quantity(item.quantity)
                .map_err(|m| AppError::InvalidQuantity(m.to_string()))?;
            validate_unit_amount(item.unit_price).map_err(|m| AppError::Validation {
                field: "unit_price".to_string(),
                message: m.to_string(),
            })?;
            lines.push(NewSaleItem {
                variant_id: item.variant_id,
                quantity: item.quantity,
                unit_price: item.unit_price,
                line_total: line_total(item.quantity, item.unit_price).ok_or_else(|| {
                    AppError::InvalidInput("Line total is too large".to_string())
                })?,
            });
        }

        let line_totals: Vec<Decimal> = lines.iter().map(|l| l.line_total).collect();
        let totals = SaleTotals::compute(&line_totals, input.discount_amount, input.tax_rate)
            .map_err(|m| AppError::InvalidInput(m.to_string()))?;

        let warehouse_id = input.warehouse_id;
        let mut tx = self.store.begin().await?;
        ensure_warehouse(tx.as_mut(), warehouse_id).await?;
        for line in &lines {
            ensure_variant(tx.as_mut(), line.variant_id).await?;
        }

        let demand = combine_quantities(lines.iter().map(|l| (l.variant_id, l.quantity)))
            .ok_or_else(|| {
                AppError::InvalidQuantity("Combined sale quantity is too large".to_string())
            })?;
        for (&variant_id, &requested) in &demand {
            let available = tx
                .level(StockKey::new(warehouse_id, variant_id))
                .await?
                .map(|l| l.quantity)
                .unwrap_or(Decimal::ZERO);
            if available < requested {
                tracing::warn!(
                    warehouse_id,
                    variant_id,
                    available = %available,
                    requested = %requested,
                    "Sale rejected: insufficient stock"
                );
                return Err(AppError::InsufficientStock {
                    warehouse_id,
                    variant_id,
                    available,
                    requested,
                });
            }
        }

        let sale = tx
            .insert_sale(&NewSale {
                warehouse_id,
                customer_name: input.customer_name,
                subtotal: totals.subtotal,
                discount_amount: totals.discount,
                tax_amount: totals.tax,
                total_amount: totals.total,
                payment_method,
                user_id,
                items: lines,
            })
            .await?;

        let deductions = demand
            .into_iter()
            .map(|(variant_id, quantity)| {
                StockDelta::strict(StockKey::new(warehouse_id, variant_id), -quantity)
            })
            .collect();

        for deduction in in_lock_order(deductions) {
            if tx.apply_delta(&deduction).await?.is_none() {
                tracing::warn!(
                    warehouse_id,
                    variant_id = deduction.key.variant_id,
                    "Sale deduction rejected by stock guard"
                );
                return Err(shortfall(tx.as_mut(), deduction.key, -deduction.delta).await);
            }
        }

        tx.commit().await?;

        tracing::info!(
            sale_id = sale.id,
            user_id,
            warehouse_id,
            total = %sale.total_amount,
            items = sale.items.len(),
            "Sale processed"
        );

        Ok(sale)
    }

    pub async fn get_sale(&self, id: i64) -> AppResult<Sale> {
        self.store.sale(id).await?.ok_or(AppError::SaleNotFound(id))
    }

    pub async fn list_sales(&self, page: &Pagination) -> AppResult<PaginatedResponse<Sale>> {
        let (sales, total) = self.store.list_sales(page).await?;
        Ok(PaginatedResponse::new(sales, page, total))
    }
}
