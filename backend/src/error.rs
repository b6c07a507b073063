//! Error handling for the Depot inventory backend
//!
//! Every failure surfaces as one `AppError`; the HTTP layer maps each kind to
//! a status code and a stable machine-readable code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication errors
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    // Not found errors
    #[error("Warehouse {0} not found")]
    WarehouseNotFound(i64),

    #[error("Product variant {0} not found")]
    VariantNotFound(i64),

    #[error("Procurement {0} not found")]
    ProcurementNotFound(i64),

    #[error("Transfer {0} not found")]
    TransferNotFound(i64),

    #[error("Sale {0} not found")]
    SaleNotFound(i64),

    // Validation errors
    #[error("Source and destination warehouse must differ")]
    SameWarehouse,

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    // Business rule errors
    #[error("Insufficient stock for variant {variant_id} in warehouse {warehouse_id}: available {available}, requested {requested}")]
    InsufficientStock {
        warehouse_id: i64,
        variant_id: i64,
        available: Decimal,
        requested: Decimal,
    },

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    pub fn transition(from: impl ToString, to: impl ToString) -> Self {
        AppError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Stable error code exposed to clients
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::WarehouseNotFound(_) => "WAREHOUSE_NOT_FOUND",
            AppError::VariantNotFound(_) => "VARIANT_NOT_FOUND",
            AppError::ProcurementNotFound(_) => "PROCUREMENT_NOT_FOUND",
            AppError::TransferNotFound(_) => "TRANSFER_NOT_FOUND",
            AppError::SaleNotFound(_) => "SALE_NOT_FOUND",
            AppError::SameWarehouse => "SAME_WAREHOUSE",
            AppError::InvalidQuantity(_) => "INVALID_QUANTITY",
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            AppError::InvalidTransition { .. } => "INVALID_TRANSITION",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::Internal(_) | AppError::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::WarehouseNotFound(_)
            | AppError::VariantNotFound(_)
            | AppError::ProcurementNotFound(_)
            | AppError::TransferNotFound(_)
            | AppError::SaleNotFound(_) => StatusCode::NOT_FOUND,
            AppError::SameWarehouse
            | AppError::InvalidQuantity(_)
            | AppError::InvalidInput(_)
            | AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::InsufficientStock { .. } => StatusCode::CONFLICT,
            AppError::InvalidTransition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::DatabaseError(_) | AppError::Internal(_) | AppError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn field(&self) -> Option<String> {
        match self {
            AppError::Validation { field, .. } => Some(field.clone()),
            _ => None,
        }
    }

    /// Message shown to clients; infrastructure details stay in the logs
    fn public_message(&self) -> String {
        match self {
            AppError::DatabaseError(_) => "A database error occurred".to_string(),
            AppError::Internal(_) | AppError::InternalError(_) => {
                "An internal server error occurred".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let (field, message) = errors
            .field_errors()
            .into_iter()
            .next()
            .map(|(field, errs)| {
                let message = errs
                    .first()
                    .and_then(|e| e.message.as_ref().map(|m| m.to_string()))
                    .unwrap_or_else(|| format!("{} is invalid", field));
                (field.to_string(), message)
            })
            .unwrap_or_else(|| ("request".to_string(), errors.to_string()));

        AppError::Validation { field, message }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(code = self.code(), "Error: {:?}", self);
        } else {
            tracing::warn!(code = self.code(), "Request rejected: {}", self);
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.public_message(),
                field: self.field(),
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers and services
pub type AppResult<T> = Result<T, AppError>;
