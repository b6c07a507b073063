//! Persistence seam for the inventory core
//!
//! Services never talk to a database directly. Reads go through [`Store`];
//! every mutation runs inside a [`StoreTx`] obtained from [`Store::begin`].
//! A transaction that is dropped without [`StoreTx::commit`] rolls back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::{
    InventoryLevel, InventoryTransfer, Pagination, PaymentMethod, Procurement, ProcurementStatus,
    Sale, StockDelta, StockKey, TransferStatus,
};

use crate::error::AppResult;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Transfer header and lines to persist
#[derive(Debug, Clone)]
pub struct NewTransfer {
    pub source_warehouse_id: i64,
    pub destination_warehouse_id: i64,
    pub user_id: i64,
    pub status: TransferStatus,
    pub notes: Option<String>,
    pub items: Vec<NewTransferItem>,
}

#[derive(Debug, Clone)]
pub struct NewTransferItem {
    pub variant_id: i64,
    pub quantity: Decimal,
}

#[derive(Debug, Clone)]
pub struct NewProcurement {
    pub supplier_id: i64,
    pub warehouse_id: i64,
    pub user_id: i64,
    pub expected_delivery: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub items: Vec<NewProcurementItem>,
}

#[derive(Debug, Clone)]
pub struct NewProcurementItem {
    pub variant_id: i64,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
}

#[derive(Debug, Clone)]
pub struct NewSale {
    pub warehouse_id: i64,
    pub customer_name: Option<String>,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub payment_method: PaymentMethod,
    pub user_id: i64,
    pub items: Vec<NewSaleItem>,
}

#[derive(Debug, Clone)]
pub struct NewSaleItem {
    pub variant_id: i64,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

/// Read access and transaction factory
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>>;

    /// Cheap connectivity probe for health checks
    async fn ping(&self) -> AppResult<()>;

    async fn level(&self, key: StockKey) -> AppResult<Option<InventoryLevel>>;

    /// Levels with an expiry date at or before `before`, soonest first
    async fn expiring_levels(&self, before: DateTime<Utc>) -> AppResult<Vec<InventoryLevel>>;

    /// Levels with quantity at or below `threshold`, lowest first
    async fn low_levels(&self, threshold: Decimal) -> AppResult<Vec<InventoryLevel>>;

    async fn transfer(&self, id: i64) -> AppResult<Option<InventoryTransfer>>;

    /// Page of transfers, newest first, with the total count
    async fn list_transfers(&self, page: &Pagination) -> AppResult<(Vec<InventoryTransfer>, u64)>;

    async fn procurement(&self, id: i64) -> AppResult<Option<Procurement>>;

    async fn list_procurements(&self, page: &Pagination) -> AppResult<(Vec<Procurement>, u64)>;

    async fn sale(&self, id: i64) -> AppResult<Option<Sale>>;

    async fn list_sales(&self, page: &Pagination) -> AppResult<(Vec<Sale>, u64)>;
}

/// One store transaction
#[async_trait]
pub trait StoreTx: Send {
    async fn warehouse_exists(&mut self, warehouse_id: i64) -> AppResult<bool>;

    async fn variant_exists(&mut self, variant_id: i64) -> AppResult<bool>;

    /// Current level as seen inside this transaction
    async fn level(&mut self, key: StockKey) -> AppResult<Option<InventoryLevel>>;

    /// Atomically add `delta.delta` to the row, creating it if missing.
    ///
    /// Returns `None` without writing when the non-negative guard rejects the
    /// change. The guard is evaluated against the row as locked by this
    /// statement, not against an earlier read.
    async fn apply_delta(&mut self, delta: &StockDelta) -> AppResult<Option<InventoryLevel>>;

    async fn insert_transfer(&mut self, transfer: &NewTransfer) -> AppResult<InventoryTransfer>;

    /// Returns the transfer as stored after the change, or `None` if it does not exist
    async fn set_transfer_status(
        &mut self,
        id: i64,
        status: TransferStatus,
    ) -> AppResult<Option<InventoryTransfer>>;

    async fn insert_procurement(&mut self, procurement: &NewProcurement) -> AppResult<Procurement>;

    /// Load a procurement and hold its header lock until the transaction ends
    async fn lock_procurement(&mut self, id: i64) -> AppResult<Option<Procurement>>;

    /// Returns false if the procurement does not exist
    async fn set_procurement_status(&mut self, id: i64, status: ProcurementStatus)
        -> AppResult<bool>;

    /// Increase `quantity_received` on one line.
    ///
    /// Returns false without writing if the line does not belong to the
    /// procurement or the new total would exceed the ordered quantity.
    async fn add_quantity_received(
        &mut self,
        procurement_id: i64,
        item_id: i64,
        quantity: Decimal,
    ) -> AppResult<bool>;

    async fn insert_sale(&mut self, sale: &NewSale) -> AppResult<Sale>;

    async fn commit(self: Box<Self>) -> AppResult<()>;
}
