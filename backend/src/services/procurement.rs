//! Procurement service: purchase orders, status workflow and goods receipt

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    checked_total, combine_quantities, in_lock_order, line_total, validate_quantity,
    validate_receipt, validate_unit_amount, PaginatedResponse, Pagination, Procurement, ProcurementStatus, StockDelta, StockKey,
};
use validator::Validate;

use super::inventory::{ensure_variant, ensure_warehouse};
use crate::error::{AppError, AppResult};
use crate::store::{NewProcurement, NewProcurementItem, Store};

/// Procurement service
#[derive(Clone)]
pub struct ProcurementService {
    store: Arc<dyn Store>,
}

/// Input for creating a purchase order
#[derive(Debug, Deserialize, Validate)]
pub struct CreateProcurementInput {
    pub supplier_id: i64,
    pub warehouse_id: i64,
    pub expected_delivery: Option<DateTime<Utc>>,
    #[validate(length(max = 1000, message = "Notes must be at most 1000 characters"))]
    pub notes: Option<String>,
    pub items: Vec<ProcurementItemInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcurementItemInput {
    pub variant_id: i64,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
}

/// Input for a manual status change
#[derive(Debug, Deserialize)]
pub struct UpdateStatusInput {
    pub status: String,
}

/// Input for booking delivered goods against an order
#[derive(Debug, Deserialize)]
pub struct ReceiveItemsInput {
    pub items: Vec<ReceiveItemInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReceiveItemInput {
    pub item_id: i64,
    pub quantity_received: Decimal,
}

/// Procurement with its total cost
#[derive(Debug, Clone, Serialize)]
pub struct ProcurementResponse {
    #[serde(flatten)]
    pub procurement: Procurement,
    pub total_cost: Decimal,
}

impl From<Procurement> for ProcurementResponse {
    fn from(procurement: Procurement) -> Self {
        let total_cost = procurement.total_cost();
        Self {
            procurement,
            total_cost,
        }
    }
}

impl ProcurementService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Create a purchase order in `pending` status
    pub async fn create(
        &self,
        user_id: i64,
        input: CreateProcurementInput,
    ) -> AppResult<ProcurementResponse> {
        input.validate()?;
        if input.items.is_empty() {
            return Err(AppError::InvalidInput(
                "Procurement must contain at least one item".to_string(),
            ));
        }
        let mut line_costs = Vec::with_capacity(input.items.len());
        for item in &input.items {
            validate_quantity(item.quantity)
                .map_err(|m| AppError::InvalidQuantity(m.to_string()))?;
            validate_unit_amount(item.unit_cost).map_err(|m| AppError::Validation {
                field: "unit_cost".to_string(),
                message: m.to_string(),
            })?;
            line_costs.push(line_total(item.quantity, item.unit_cost).ok_or_else(|| {
                AppError::InvalidInput("Line cost is too large".to_string())
            })?);
        }
        if checked_total(line_costs).is_none() {
            return Err(AppError::InvalidInput(
                "Procurement total cost is too large".to_string(),
            ));
        }

        let mut tx = self.store.begin().await?;
        ensure_warehouse(tx.as_mut(), input.warehouse_id).await?;
        for item in &input.items {
            ensure_variant(tx.as_mut(), item.variant_id).await?;
        }

        let procurement = tx
            .insert_procurement(&NewProcurement {
                supplier_id: input.supplier_id,
                warehouse_id: input.warehouse_id,
                user_id,
                expected_delivery: input.expected_delivery,
                notes: input.notes,
                items: input
                    .items
                    .iter()
                    .map(|i| NewProcurementItem {
                        variant_id: i.variant_id,
                        quantity: i.quantity,
                        unit_cost: i.unit_cost,
                    })
                    .collect(),
            })
            .await?;
        tx.commit().await?;

        tracing::info!(
            procurement_id = procurement.id,
            user_id,
            supplier_id = procurement.supplier_id,
            warehouse_id = procurement.warehouse_id,
            "Procurement created"
        );

        Ok(procurement.into())
    }

    pub async fn get(&self, id: i64) -> AppResult<ProcurementResponse> {
        self.store
            .procurement(id)
            .await?
            .map(ProcurementResponse::from)
            .ok_or(AppError::ProcurementNotFound(id))
    }

    pub async fn list(&self, page: &Pagination) -> AppResult<PaginatedResponse<ProcurementResponse>> {
        let (procurements, total) = self.store.list_procurements(page).await?;
        Ok(PaginatedResponse::new(procurements, page, total).map(ProcurementResponse::from))
    }

    /// Move an order to a new status along the legal transition table
    pub async fn update_status(
        &self,
        user_id: i64,
        id: i64,
        input: UpdateStatusInput,
    ) -> AppResult<ProcurementResponse> {
        let next: ProcurementStatus = input
            .status
            .parse()
            .map_err(|e: shared::UnknownVariant| AppError::InvalidInput(e.to_string()))?;

        let mut tx = self.store.begin().await?;
        let procurement = tx
            .lock_procurement(id)
            .await?
            .ok_or(AppError::ProcurementNotFound(id))?;
        let current = procurement.status;

        if !current.can_transition_to(next) {
            tracing::warn!(procurement_id = id, from = %current, to = %next, "Status change rejected");
            return Err(AppError::transition(current, next));
        }

        // Receipt states must agree with what has actually been booked in
        let consistent = match next {
            ProcurementStatus::Received => procurement.is_fully_received(),
            ProcurementStatus::Partial => {
                procurement.receipt_status() == Some(ProcurementStatus::Partial)
            }
            _ => true,
        };
        if !consistent {
            tracing::warn!(
                procurement_id = id,
                from = %current,
                to = %next,
                "Status change rejected: received quantities do not match"
            );
            return Err(AppError::transition(current, next));
        }

        if !tx.set_procurement_status(id, next).await? {
            return Err(AppError::ProcurementNotFound(id));
        }
        let procurement = tx
            .lock_procurement(id)
            .await?
            .ok_or(AppError::ProcurementNotFound(id))?;
        tx.commit().await?;

        tracing::info!(procurement_id = id, user_id, from = %current, to = %next, "Procurement status changed");

        Ok(procurement.into())
    }

    /// Book delivered quantities in and credit the order's warehouse.
    ///
    /// All lines are checked before anything is written; a single offending
    /// line rejects the whole request.
    pub async fn receive_items(
        &self,
        user_id: i64,
        id: i64,
        input: ReceiveItemsInput,
    ) -> AppResult<ProcurementResponse> {
        if input.items.is_empty() {
            return Err(AppError::InvalidInput(
                "Receipt must contain at least one item".to_string(),
            ));
        }
        for line in &input.items {
            validate_quantity(line.quantity_received)
                .map_err(|m| AppError::InvalidQuantity(m.to_string()))?;
        }

        let mut tx = self.store.begin().await?;
        let mut procurement = tx
            .lock_procurement(id)
            .await?
            .ok_or(AppError::ProcurementNotFound(id))?;

        if !procurement.status.accepts_receipts() {
            tracing::warn!(procurement_id = id, status = %procurement.status, "Receipt rejected");
            return Err(AppError::transition(
                procurement.status,
                ProcurementStatus::Received,
            ));
        }

        let receipts =
            combine_quantities(input.items.iter().map(|l| (l.item_id, l.quantity_received)))
                .ok_or_else(|| {
                    AppError::InvalidQuantity("Combined receipt quantity is too large".to_string())
                })?;

        let mut credits = Vec::with_capacity(receipts.len());
        for (&item_id, &quantity) in &receipts {
            let item = procurement.item(item_id).ok_or_else(|| {
                AppError::InvalidInput(format!(
                    "Item {} does not belong to procurement {}",
                    item_id, id
                ))
            })?;
            validate_receipt(item.quantity, item.quantity_received, quantity).map_err(|m| {
                AppError::InvalidInput(format!("Item {}: {}", item_id, m))
            })?;
            credits.push(StockDelta::strict(
                StockKey::new(procurement.warehouse_id, item.variant_id),
                quantity,
            ));
        }

        for (&item_id, &quantity) in &receipts {
            if !tx.add_quantity_received(id, item_id, quantity).await? {
                return Err(AppError::InvalidInput(format!(
                    "Item {}: Received quantity would exceed ordered quantity",
                    item_id
                )));
            }
        }

        for credit in in_lock_order(credits) {
            if tx.apply_delta(&credit).await?.is_none() {
                return Err(AppError::Internal(format!(
                    "receipt credit rejected for {}",
                    credit.key
                )));
            }
        }

        for item in procurement.items.iter_mut() {
            if let Some(quantity) = receipts.get(&item.id) {
                item.quantity_received += *quantity;
            }
        }

        if let Some(status) = procurement.receipt_status() {
            if status != procurement.status {
                if !procurement.status.can_transition_to(status) {
                    return Err(AppError::transition(procurement.status, status));
                }
                tx.set_procurement_status(id, status).await?;
            }
        }

        let procurement = tx
            .lock_procurement(id)
            .await?
            .ok_or(AppError::ProcurementNotFound(id))?;
        tx.commit().await?;

        tracing::info!(
            procurement_id = id,
            user_id,
            warehouse_id = procurement.warehouse_id,
            lines = receipts.len(),
            status = %procurement.status,
            "Procurement items received"
        );

        Ok(procurement.into())
    }
}
