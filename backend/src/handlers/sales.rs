//! HTTP handlers for point-of-sale endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use shared::{PaginatedResponse, Pagination, Sale};

use crate::error::AppResult;
use crate::middleware::{check_permission, CurrentUser};
use crate::services::sales::{CreateSaleInput, SalesService};
use crate::AppState;

/// Record a sale and deduct its stock
pub async fn create_sale(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateSaleInput>,
) -> AppResult<Json<Sale>> {
    check_permission(&current_user.0, "sales", "write")?;
    let service = SalesService::new(state.store);
    let sale = service.process_sale(current_user.0.user_id, input).await?;
    Ok(Json(sale))
}

/// List sales, newest first
pub async fn list_sales(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(page): Query<Pagination>,
) -> AppResult<Json<PaginatedResponse<Sale>>> {
    check_permission(&current_user.0, "sales", "read")?;
    let service = SalesService::new(state.store);
    let sales = service.list_sales(&page).await?;
    Ok(Json(sales))
}

/// Get a sale by ID
pub async fn get_sale(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(sale_id): Path<i64>,
) -> AppResult<Json<Sale>> {
    check_permission(&current_user.0, "sales", "read")?;
    let service = SalesService::new(state.store);
    let sale = service.get_sale(sale_id).await?;
    Ok(Json(sale))
}
