//! HTTP handlers for inventory ledger endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::{InventoryLevel, InventoryTransfer, PaginatedResponse, Pagination};

use crate::error::AppResult;
use crate::middleware::{check_permission, CurrentUser};
use crate::services::inventory::{AdjustInput, CreateTransferInput, ExpiringStock, InventoryService};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ExpiringQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct LowStockQuery {
    pub threshold: Option<Decimal>,
}

/// Get the stock level of a variant in a warehouse
pub async fn get_level(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((warehouse_id, variant_id)): Path<(i64, i64)>,
) -> AppResult<Json<InventoryLevel>> {
    check_permission(&current_user.0, "inventory", "read")?;
    let service = InventoryService::new(state.store);
    let level = service.get_level(warehouse_id, variant_id).await?;
    Ok(Json(level))
}

/// Apply a manual stock adjustment
pub async fn adjust(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<AdjustInput>,
) -> AppResult<Json<InventoryLevel>> {
    check_permission(&current_user.0, "inventory", "write")?;
    let service = InventoryService::new(state.store);
    let level = service.adjust(current_user.0.user_id, input).await?;
    Ok(Json(level))
}

/// Stock expiring within the requested number of days
pub async fn get_expiring_stock(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ExpiringQuery>,
) -> AppResult<Json<Vec<ExpiringStock>>> {
    check_permission(&current_user.0, "inventory", "read")?;
    let days = query
        .days
        .unwrap_or(state.config.inventory.expiring_within_days);
    let service = InventoryService::new(state.store);
    let levels = service.expiring_stock(days).await?;
    Ok(Json(levels))
}

/// Stock at or below a threshold
pub async fn get_low_stock(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<LowStockQuery>,
) -> AppResult<Json<Vec<InventoryLevel>>> {
    check_permission(&current_user.0, "inventory", "read")?;
    let threshold = query
        .threshold
        .unwrap_or(state.config.inventory.low_stock_threshold);
    let service = InventoryService::new(state.store);
    let levels = service.low_stock(threshold).await?;
    Ok(Json(levels))
}

/// Move stock between warehouses
pub async fn create_transfer(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateTransferInput>,
) -> AppResult<Json<InventoryTransfer>> {
    check_permission(&current_user.0, "inventory", "write")?;
    let service = InventoryService::new(state.store);
    let transfer = service.transfer(current_user.0.user_id, input).await?;
    Ok(Json(transfer))
}

/// List transfers, newest first
pub async fn list_transfers(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(page): Query<Pagination>,
) -> AppResult<Json<PaginatedResponse<InventoryTransfer>>> {
    check_permission(&current_user.0, "inventory", "read")?;
    let service = InventoryService::new(state.store);
    let transfers = service.list_transfers(&page).await?;
    Ok(Json(transfers))
}

/// Get a transfer by ID
pub async fn get_transfer(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(transfer_id): Path<i64>,
) -> AppResult<Json<InventoryTransfer>> {
    check_permission(&current_user.0, "inventory", "read")?;
    let service = InventoryService::new(state.store);
    let transfer = service.get_transfer(transfer_id).await?;
    Ok(Json(transfer))
}
