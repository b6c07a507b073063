//! Inventory ledger service: stock levels, adjustments, transfers and alerts

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    combine_quantities, validate_delta, validate_quantity, InventoryLevel, InventoryTransfer,
    PaginatedResponse, Pagination, StockDelta, StockKey, TransferStatus,
};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::store::{NewTransfer, NewTransferItem, Store, StoreTx};

/// Inventory service for reading and moving stock
#[derive(Clone)]
pub struct InventoryService {
    store: Arc<dyn Store>,
}

/// Input for a manual stock adjustment
#[derive(Debug, Deserialize, Validate)]
pub struct AdjustInput {
    pub warehouse_id: i64,
    pub variant_id: i64,
    /// Signed change; positive adds stock, negative removes it
    pub delta: Decimal,
    #[validate(length(min = 1, max = 100, message = "Batch number must be 1-100 characters"))]
    pub batch_number: Option<String>,
    pub expiry_date: Option<DateTime<Utc>>,
    /// Permit the level to go below zero (write-offs and corrections)
    #[serde(default)]
    pub allow_negative: bool,
}

/// Input for moving stock between two warehouses
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTransferInput {
    pub source_warehouse_id: i64,
    pub destination_warehouse_id: i64,
    #[validate(length(max = 1000, message = "Notes must be at most 1000 characters"))]
    pub notes: Option<String>,
    pub items: Vec<TransferItemInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferItemInput {
    pub variant_id: i64,
    pub quantity: Decimal,
}

/// Level entry returned by the expiring stock scan
#[derive(Debug, Clone, Serialize)]
pub struct ExpiringStock {
    #[serde(flatten)]
    pub level: InventoryLevel,
    pub days_until_expiry: i64,
}

impl InventoryService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Current level for a (warehouse, variant) pair; zero when never stocked
    pub async fn get_level(&self, warehouse_id: i64, variant_id: i64) -> AppResult<InventoryLevel> {
        let key = StockKey::new(warehouse_id, variant_id);
        let level = self.store.level(key).await?;
        Ok(level.unwrap_or_else(|| InventoryLevel::empty(key)))
    }

    /// Apply a signed manual adjustment in a single guarded upsert
    pub async fn adjust(&self, user_id: i64, input: AdjustInput) -> AppResult<InventoryLevel> {
        input.validate()?;
        validate_delta(input.delta).map_err(|m| AppError::InvalidQuantity(m.to_string()))?;

        let key = StockKey::new(input.warehouse_id, input.variant_id);
        let mut tx = self.store.begin().await?;
        ensure_warehouse(tx.as_mut(), key.warehouse_id).await?;
        ensure_variant(tx.as_mut(), key.variant_id).await?;

        let delta = StockDelta {
            key,
            delta: input.delta,
            allow_negative: input.allow_negative,
            batch_number: input.batch_number,
            expiry_date: input.expiry_date,
        };

        let Some(level) = tx.apply_delta(&delta).await? else {
            tracing::warn!(
                warehouse_id = key.warehouse_id,
                variant_id = key.variant_id,
                delta = %delta.delta,
                "Adjustment rejected: insufficient stock"
            );
            return Err(shortfall(tx.as_mut(), key, -delta.delta).await);
        };

        tx.commit().await?;

        tracing::info!(
            user_id,
            warehouse_id = key.warehouse_id,
            variant_id = key.variant_id,
            delta = %delta.delta,
            quantity = %level.quantity,
            allow_negative = delta.allow_negative,
            "Inventory adjusted"
        );

        Ok(level)
    }

    /// Move stock from one warehouse to another.
    ///
    /// Validation failures leave no trace. A failure while applying the legs
    /// rolls everything back and records the attempt as `failed`.
    pub async fn transfer(
        &self,
        user_id: i64,
        input: CreateTransferInput,
    ) -> AppResult<InventoryTransfer> {
        if input.source_warehouse_id == input.destination_warehouse_id {
            return Err(AppError::SameWarehouse);
        }
        input.validate()?;
        if input.items.is_empty() {
            return Err(AppError::InvalidInput(
                "Transfer must contain at least one item".to_string(),
            ));
        }

        let source = input.source_warehouse_id;
        let mut tx = self.store.begin().await?;
        ensure_warehouse(tx.as_mut(), source).await?;
        ensure_warehouse(tx.as_mut(), input.destination_warehouse_id).await?;

        for item in &input.items {
            validate_quantity(item.quantity)
                .map_err(|m| AppError::InvalidQuantity(m.to_string()))?;
            ensure_variant(tx.as_mut(), item.variant_id).await?;
        }

        let demand = combine_quantities(input.items.iter().map(|i| (i.variant_id, i.quantity)))
            .ok_or_else(|| {
                AppError::InvalidQuantity("Combined transfer quantity is too large".to_string())
            })?;
        for (variant_id, requested) in demand {
            let available = tx
                .level(StockKey::new(source, variant_id))
                .await?
                .map(|l| l.quantity)
                .unwrap_or(Decimal::ZERO);
            if available < requested {
                tracing::warn!(
                    warehouse_id = source,
                    variant_id,
                    available = %available,
                    requested = %requested,
                    "Transfer rejected: insufficient stock"
                );
                return Err(AppError::InsufficientStock {
                    warehouse_id: source,
                    variant_id,
                    available,
                    requested,
                });
            }
        }

        let new_transfer = NewTransfer {
            source_warehouse_id: source,
            destination_warehouse_id: input.destination_warehouse_id,
            user_id,
            status: TransferStatus::Pending,
            notes: input.notes,
            items: input
                .items
                .iter()
                .map(|i| NewTransferItem {
                    variant_id: i.variant_id,
                    quantity: i.quantity,
                })
                .collect(),
        };
        let transfer = tx.insert_transfer(&new_transfer).await?;

        match complete_transfer(tx, transfer).await {
            Ok(transfer) => {
                tracing::info!(
                    transfer_id = transfer.id,
                    user_id,
                    source_warehouse_id = transfer.source_warehouse_id,
                    destination_warehouse_id = transfer.destination_warehouse_id,
                    items = transfer.items.len(),
                    "Transfer completed"
                );
                Ok(transfer)
            }
            Err(err) => {
                self.record_failed_transfer(new_transfer).await;
                Err(err)
            }
        }
    }

    /// Persist an audit record for a transfer whose legs could not be applied
    async fn record_failed_transfer(&self, attempt: NewTransfer) {
        let failed = NewTransfer {
            status: TransferStatus::Failed,
            ..attempt
        };

        let recorded = async {
            let mut tx = self.store.begin().await?;
            let transfer = tx.insert_transfer(&failed).await?;
            tx.commit().await?;
            Ok::<_, AppError>(transfer)
        }
        .await;

        match recorded {
            Ok(transfer) => tracing::warn!(
                transfer_id = transfer.id,
                source_warehouse_id = transfer.source_warehouse_id,
                destination_warehouse_id = transfer.destination_warehouse_id,
                "Transfer rolled back and recorded as failed"
            ),
            Err(err) => tracing::error!(error = %err, "Could not record failed transfer"),
        }
    }

    pub async fn get_transfer(&self, id: i64) -> AppResult<InventoryTransfer> {
        self.store
            .transfer(id)
            .await?
            .ok_or(AppError::TransferNotFound(id))
    }

    pub async fn list_transfers(
        &self,
        page: &Pagination,
    ) -> AppResult<PaginatedResponse<InventoryTransfer>> {
        let (transfers, total) = self.store.list_transfers(page).await?;
        Ok(PaginatedResponse::new(transfers, page, total))
    }

    /// In-stock levels whose expiry falls within `days` from now, soonest first
    pub async fn expiring_stock(&self, days: i64) -> AppResult<Vec<ExpiringStock>> {
        if !(0..=3650).contains(&days) {
            return Err(AppError::InvalidInput(
                "days must be between 0 and 3650".to_string(),
            ));
        }

        let now = Utc::now();
        let levels = self.store.expiring_levels(now + Duration::days(days)).await?;

        Ok(levels
            .into_iter()
            .map(|level| {
                let days_until_expiry = level
                    .expiry_date
                    .map(|at| (at - now).num_days())
                    .unwrap_or_default();
                ExpiringStock {
                    level,
                    days_until_expiry,
                }
            })
            .collect())
    }

    /// Levels at or below `threshold`, lowest first
    pub async fn low_stock(&self, threshold: Decimal) -> AppResult<Vec<InventoryLevel>> {
        if threshold < Decimal::ZERO {
            return Err(AppError::InvalidInput(
                "threshold cannot be negative".to_string(),
            ));
        }
        self.store.low_levels(threshold).await
    }
}

/// Apply the legs of a pending transfer and mark it completed.
///
/// Takes the transaction by value: any early return drops it and rolls back.
async fn complete_transfer(
    mut tx: Box<dyn StoreTx>,
    transfer: InventoryTransfer,
) -> AppResult<InventoryTransfer> {
    if !transfer.status.can_transition_to(TransferStatus::Completed) {
        return Err(AppError::transition(transfer.status, TransferStatus::Completed));
    }

    for leg in transfer.legs() {
        if tx.apply_delta(&leg).await?.is_none() {
            tracing::warn!(
                transfer_id = transfer.id,
                warehouse_id = leg.key.warehouse_id,
                variant_id = leg.key.variant_id,
                "Transfer debit rejected by stock guard"
            );
            return Err(shortfall(tx.as_mut(), leg.key, -leg.delta).await);
        }
    }

    let completed = tx
        .set_transfer_status(transfer.id, TransferStatus::Completed)
        .await?
        .ok_or_else(|| {
            AppError::Internal(format!("transfer {} vanished before completion", transfer.id))
        })?;
    tx.commit().await?;

    Ok(completed)
}

/// Insufficient-stock error carrying the balance as this transaction sees it
pub(crate) async fn shortfall(tx: &mut dyn StoreTx, key: StockKey, requested: Decimal) -> AppError {
    let available = match tx.level(key).await {
        Ok(level) => level.map(|l| l.quantity).unwrap_or(Decimal::ZERO),
        Err(err) => return err,
    };
    AppError::InsufficientStock {
        warehouse_id: key.warehouse_id,
        variant_id: key.variant_id,
        available,
        requested,
    }
}

pub(crate) async fn ensure_warehouse(tx: &mut dyn StoreTx, warehouse_id: i64) -> AppResult<()> {
    if tx.warehouse_exists(warehouse_id).await? {
        Ok(())
    } else {
        Err(AppError::WarehouseNotFound(warehouse_id))
    }
}

pub(crate) async fn ensure_variant(tx: &mut dyn StoreTx, variant_id: i64) -> AppResult<()> {
    if tx.variant_exists(variant_id).await? {
        Ok(())
    } else {
        Err(AppError::VariantNotFound(variant_id))
    }
}
