//! HTTP handlers for procurement endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use shared::{PaginatedResponse, Pagination};

use crate::error::AppResult;
use crate::middleware::{check_permission, CurrentUser};
use crate::services::procurement::{
    CreateProcurementInput, ProcurementResponse, ProcurementService, ReceiveItemsInput,
    UpdateStatusInput,
};
use crate::AppState;

/// Create a purchase order
pub async fn create_procurement(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateProcurementInput>,
) -> AppResult<Json<ProcurementResponse>> {
    check_permission(&current_user.0, "procurement", "write")?;
    let service = ProcurementService::new(state.store);
    let procurement = service.create(current_user.0.user_id, input).await?;
    Ok(Json(procurement))
}

/// List purchase orders, newest first
pub async fn list_procurements(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(page): Query<Pagination>,
) -> AppResult<Json<PaginatedResponse<ProcurementResponse>>> {
    check_permission(&current_user.0, "procurement", "read")?;
    let service = ProcurementService::new(state.store);
    let procurements = service.list(&page).await?;
    Ok(Json(procurements))
}

/// Get a purchase order by ID
pub async fn get_procurement(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(procurement_id): Path<i64>,
) -> AppResult<Json<ProcurementResponse>> {
    check_permission(&current_user.0, "procurement", "read")?;
    let service = ProcurementService::new(state.store);
    let procurement = service.get(procurement_id).await?;
    Ok(Json(procurement))
}

/// Change the status of a purchase order
pub async fn update_procurement_status(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(procurement_id): Path<i64>,
    Json(input): Json<UpdateStatusInput>,
) -> AppResult<Json<ProcurementResponse>> {
    check_permission(&current_user.0, "procurement", "write")?;
    let service = ProcurementService::new(state.store);
    let procurement = service
        .update_status(current_user.0.user_id, procurement_id, input)
        .await?;
    Ok(Json(procurement))
}

/// Book delivered goods against a purchase order
pub async fn receive_items(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(procurement_id): Path<i64>,
    Json(input): Json<ReceiveItemsInput>,
) -> AppResult<Json<ProcurementResponse>> {
    check_permission(&current_user.0, "procurement", "write")?;
    let service = ProcurementService::new(state.store);
    let procurement = service
        .receive_items(current_user.0.user_id, procurement_id, input)
        .await?;
    Ok(Json(procurement))
}
