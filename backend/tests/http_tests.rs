//! HTTP API tests
//!
//! Drive the full router (auth, handlers, error mapping) over the in-memory
//! store with locally minted tokens.

mod common;

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use common::*;
use depot_backend::middleware::Claims;
use depot_backend::{create_app, AppState};
use jsonwebtoken::{encode, EncodingKey, Header};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt;

const ALL_PERMISSIONS: &[&str] = &[
    "inventory:read",
    "inventory:write",
    "procurement:read",
    "procurement:write",
    "sales:read",
    "sales:write",
];

fn app() -> Router {
    let (_, store) = store();
    create_app(AppState {
        store,
        config: Arc::new(test_config()),
    })
}

fn token(permissions: &[&str]) -> String {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: USER.to_string(),
        permissions: permissions.iter().map(|p| p.to_string()).collect(),
        exp: now + 3600,
        iat: now,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn quantity(value: &Value) -> Decimal {
    value["quantity"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn test_health_is_public() {
    let app = app();
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], "connected");
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let app = app();
    let (status, body) = send(&app, Method::GET, "/api/v1/inventory/levels/1/100", None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_token_signed_with_other_secret_is_rejected() {
    let app = app();
    let claims = Claims {
        sub: USER.to_string(),
        permissions: vec!["inventory:read".to_string()],
        exp: Utc::now().timestamp() + 3600,
        iat: Utc::now().timestamp(),
    };
    let forged = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"other")).unwrap();

    let (status, _) = send(&app, Method::GET, "/api/v1/inventory/levels/1/100", Some(&forged), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_missing_permission_is_forbidden() {
    let app = app();
    let read_only = token(&["inventory:read"]);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/inventory/adjustments",
        Some(&read_only),
        Some(json!({ "warehouse_id": MAIN, "variant_id": WIDGET, "delta": "5" })),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_adjust_then_read_level() {
    let app = app();
    let token = token(ALL_PERMISSIONS);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/inventory/adjustments",
        Some(&token),
        Some(json!({ "warehouse_id": MAIN, "variant_id": WIDGET, "delta": "12.5" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(quantity(&body), dec("12.5"));

    let (status, body) = send(&app, Method::GET, "/api/v1/inventory/levels/1/100", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(quantity(&body), dec("12.5"));
}

#[tokio::test]
async fn test_transfer_error_codes() {
    let app = app();
    let token = token(ALL_PERMISSIONS);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/inventory/transfers",
        Some(&token),
        Some(json!({
            "source_warehouse_id": MAIN,
            "destination_warehouse_id": MAIN,
            "items": [{ "variant_id": WIDGET, "quantity": "1" }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "SAME_WAREHOUSE");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/inventory/transfers",
        Some(&token),
        Some(json!({
            "source_warehouse_id": MAIN,
            "destination_warehouse_id": BRANCH,
            "items": [{ "variant_id": WIDGET, "quantity": "1" }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_STOCK");

    let (status, body) = send(&app, Method::GET, "/api/v1/inventory/transfers/999", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "TRANSFER_NOT_FOUND");
}

#[tokio::test]
async fn test_unknown_warehouse_is_not_found() {
    let app = app();
    let token = token(ALL_PERMISSIONS);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/inventory/adjustments",
        Some(&token),
        Some(json!({ "warehouse_id": MISSING_WAREHOUSE, "variant_id": WIDGET, "delta": "1" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "WAREHOUSE_NOT_FOUND");
}

#[tokio::test]
async fn test_procurement_flow_over_http() {
    let app = app();
    let token = token(ALL_PERMISSIONS);

    let (status, created) = send(
        &app,
        Method::POST,
        "/api/v1/procurements",
        Some(&token),
        Some(json!({
            "supplier_id": 5,
            "warehouse_id": BRANCH,
            "items": [{ "variant_id": GADGET, "quantity": "8", "unit_cost": "1.25" }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["status"], "pending");
    assert_eq!(created["total_cost"], "10.00");

    let id = created["id"].as_i64().unwrap();
    let item_id = created["items"][0]["id"].as_i64().unwrap();

    for next in ["approved", "ordered"] {
        let (status, _) = send(
            &app,
            Method::PUT,
            &format!("/api/v1/procurements/{}/status", id),
            Some(&token),
            Some(json!({ "status": next })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/v1/procurements/{}/status", id),
        Some(&token),
        Some(json!({ "status": "received" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "INVALID_TRANSITION");

    let (status, received) = send(
        &app,
        Method::POST,
        &format!("/api/v1/procurements/{}/receive", id),
        Some(&token),
        Some(json!({ "items": [{ "item_id": item_id, "quantity_received": "8" }] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(received["status"], "received");

    let (_, level) = send(&app, Method::GET, "/api/v1/inventory/levels/2/101", Some(&token), None).await;
    assert_eq!(quantity(&level), dec("8"));
}

#[tokio::test]
async fn test_sale_over_http() {
    let app = app();
    let token = token(ALL_PERMISSIONS);

    send(
        &app,
        Method::POST,
        "/api/v1/inventory/adjustments",
        Some(&token),
        Some(json!({ "warehouse_id": OUTLET, "variant_id": WIDGET, "delta": "3" })),
    )
    .await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/sales",
        Some(&token),
        Some(json!({
            "warehouse_id": OUTLET,
            "payment_method": "cash",
            "items": [{ "variant_id": WIDGET, "quantity": "4", "unit_price": "2.00" }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_STOCK");

    let (status, sale) = send(
        &app,
        Method::POST,
        "/api/v1/sales",
        Some(&token),
        Some(json!({
            "warehouse_id": OUTLET,
            "payment_method": "cash",
            "items": [{ "variant_id": WIDGET, "quantity": "3", "unit_price": "2.00" }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sale["payment_method"], "cash");

    let (status, page) = send(&app, Method::GET, "/api/v1/sales?page=1&per_page=10", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["pagination"]["total_items"], 1);
    assert_eq!(page["data"][0]["id"], sale["id"]);
}

#[tokio::test]
async fn test_low_stock_uses_configured_default() {
    let app = app();
    let token = token(ALL_PERMISSIONS);

    send(
        &app,
        Method::POST,
        "/api/v1/inventory/adjustments",
        Some(&token),
        Some(json!({ "warehouse_id": MAIN, "variant_id": WIDGET, "delta": "4" })),
    )
    .await;
    send(
        &app,
        Method::POST,
        "/api/v1/inventory/adjustments",
        Some(&token),
        Some(json!({ "warehouse_id": MAIN, "variant_id": GADGET, "delta": "40" })),
    )
    .await;

    let (status, body) = send(&app, Method::GET, "/api/v1/inventory/low-stock", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (_, body) = send(&app, Method::GET, "/api/v1/inventory/low-stock?threshold=50", Some(&token), None).await;
    assert_eq!(body.as_array().unwrap().len(), 2);
}
