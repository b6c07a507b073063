//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;

use depot_backend::config::{
    Config, DatabaseConfig, InventoryConfig, JwtConfig, LogFormat, LoggingConfig, ServerConfig,
    StoreBackend, StoreConfig,
};
use depot_backend::services::inventory::{AdjustInput, CreateTransferInput, TransferItemInput};
use depot_backend::services::InventoryService;
use depot_backend::store::{MemoryStore, Store};
use rust_decimal::Decimal;

pub const MAIN: i64 = 1;
pub const BRANCH: i64 = 2;
pub const OUTLET: i64 = 3;
pub const MISSING_WAREHOUSE: i64 = 99;

pub const WIDGET: i64 = 100;
pub const GADGET: i64 = 101;
pub const MISSING_VARIANT: i64 = 999;

pub const USER: i64 = 7;
pub const JWT_SECRET: &str = "test-secret";

/// Memory store with three warehouses and two variants registered.
///
/// The returned handle shares state with the trait object, so tests can
/// inject failures after wiring services.
pub fn store() -> (MemoryStore, Arc<dyn Store>) {
    let memory = MemoryStore::with_catalog([MAIN, BRANCH, OUTLET], [WIDGET, GADGET]);
    let store: Arc<dyn Store> = Arc::new(memory.clone());
    (memory, store)
}

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn adjustment(warehouse_id: i64, variant_id: i64, delta: Decimal) -> AdjustInput {
    AdjustInput {
        warehouse_id,
        variant_id,
        delta,
        batch_number: None,
        expiry_date: None,
        allow_negative: false,
    }
}

pub fn transfer_input(source: i64, destination: i64, items: &[(i64, Decimal)]) -> CreateTransferInput {
    CreateTransferInput {
        source_warehouse_id: source,
        destination_warehouse_id: destination,
        notes: None,
        items: items
            .iter()
            .map(|&(variant_id, quantity)| TransferItemInput {
                variant_id,
                quantity,
            })
            .collect(),
    }
}

/// Put `quantity` of a variant into a warehouse
pub async fn stock(store: &Arc<dyn Store>, warehouse_id: i64, variant_id: i64, quantity: Decimal) {
    InventoryService::new(store.clone())
        .adjust(USER, adjustment(warehouse_id, variant_id, quantity))
        .await
        .unwrap();
}

pub async fn level(store: &Arc<dyn Store>, warehouse_id: i64, variant_id: i64) -> Decimal {
    InventoryService::new(store.clone())
        .get_level(warehouse_id, variant_id)
        .await
        .unwrap()
        .quantity
}

pub fn test_config() -> Config {
    Config {
        environment: "test".to_string(),
        server: ServerConfig::default(),
        database: DatabaseConfig {
            url: "postgres://localhost/depot_test".to_string(),
            max_connections: 1,
            min_connections: 0,
            acquire_timeout_secs: 1,
        },
        jwt: JwtConfig {
            secret: JWT_SECRET.to_string(),
        },
        store: StoreConfig {
            backend: StoreBackend::Memory,
            seed_warehouses: vec![MAIN, BRANCH, OUTLET],
            seed_variants: vec![WIDGET, GADGET],
        },
        inventory: InventoryConfig {
            expiring_within_days: 30,
            low_stock_threshold: Decimal::from(10),
        },
        logging: LoggingConfig {
            format: LogFormat::Pretty,
        },
    }
}
