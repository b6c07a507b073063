//! Route definitions for the Depot inventory API

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Protected routes - inventory ledger
        .nest("/inventory", inventory_routes(state.clone()))
        // Protected routes - purchase orders
        .nest("/procurements", procurement_routes(state.clone()))
        // Protected routes - point of sale
        .nest("/sales", sales_routes(state))
}

/// Inventory ledger routes (protected)
fn inventory_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/levels/:warehouse_id/:variant_id",
            get(handlers::get_level),
        )
        .route("/adjustments", post(handlers::adjust))
        .route("/expiring", get(handlers::get_expiring_stock))
        .route("/low-stock", get(handlers::get_low_stock))
        .route(
            "/transfers",
            get(handlers::list_transfers).post(handlers::create_transfer),
        )
        .route("/transfers/:transfer_id", get(handlers::get_transfer))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Procurement routes (protected)
fn procurement_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_procurements).post(handlers::create_procurement),
        )
        .route("/:procurement_id", get(handlers::get_procurement))
        .route(
            "/:procurement_id/status",
            put(handlers::update_procurement_status),
        )
        .route("/:procurement_id/receive", post(handlers::receive_items))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Sales routes (protected)
fn sales_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_sales).post(handlers::create_sale))
        .route("/:sale_id", get(handlers::get_sale))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
