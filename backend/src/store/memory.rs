//! In-process store used by tests and the `memory` backend
//!
//! A transaction holds the state lock for its whole lifetime and works on a
//! private copy; commit swaps the copy in, drop discards it. Transactions are
//! therefore fully serialized, which is stricter than Postgres row locking but
//! produces the same observable outcomes.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::{
    InventoryLevel, InventoryTransfer, InventoryTransferItem, Pagination, Procurement,
    ProcurementItem, ProcurementStatus, Sale, SaleItem, StockDelta, StockKey, TransferStatus,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{NewProcurement, NewSale, NewTransfer, Store, StoreTx};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    warehouses: BTreeSet<i64>,
    variants: BTreeSet<i64>,
    levels: BTreeMap<StockKey, InventoryLevel>,
    transfers: BTreeMap<i64, InventoryTransfer>,
    procurements: BTreeMap<i64, Procurement>,
    sales: BTreeMap<i64, Sale>,
    failing_keys: HashSet<StockKey>,
    last_id: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with the given warehouses and product variants registered
    pub fn with_catalog(
        warehouses: impl IntoIterator<Item = i64>,
        variants: impl IntoIterator<Item = i64>,
    ) -> Self {
        let state = MemoryState {
            warehouses: warehouses.into_iter().collect(),
            variants: variants.into_iter().collect(),
            ..MemoryState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub async fn add_warehouse(&self, warehouse_id: i64) {
        self.state.lock().await.warehouses.insert(warehouse_id);
    }

    pub async fn add_variant(&self, variant_id: i64) {
        self.state.lock().await.variants.insert(variant_id);
    }

    /// Make every later quantity write to `key` fail with an internal error
    pub async fn inject_delta_failure(&self, key: StockKey) {
        self.state.lock().await.failing_keys.insert(key);
    }

    pub async fn clear_delta_failures(&self) {
        self.state.lock().await.failing_keys.clear();
    }
}

fn page_of<T: Clone>(rows: &BTreeMap<i64, T>, page: &Pagination) -> (Vec<T>, u64) {
    let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    let limit = usize::try_from(page.limit()).unwrap_or(usize::MAX);
    let data = rows.values().rev().skip(offset).take(limit).cloned().collect();
    (data, rows.len() as u64)
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn level(&self, key: StockKey) -> AppResult<Option<InventoryLevel>> {
        Ok(self.state.lock().await.levels.get(&key).cloned())
    }

    async fn expiring_levels(&self, before: DateTime<Utc>) -> AppResult<Vec<InventoryLevel>> {
        let state = self.state.lock().await;
        let mut levels: Vec<InventoryLevel> = state
            .levels
            .values()
            .filter(|l| l.quantity > Decimal::ZERO)
            .filter(|l| l.expiry_date.is_some_and(|at| at <= before))
            .cloned()
            .collect();
        levels.sort_by_key(|l| (l.expiry_date, l.key()));
        Ok(levels)
    }

    async fn low_levels(&self, threshold: Decimal) -> AppResult<Vec<InventoryLevel>> {
        let state = self.state.lock().await;
        let mut levels: Vec<InventoryLevel> = state
            .levels
            .values()
            .filter(|l| l.quantity <= threshold)
            .cloned()
            .collect();
        levels.sort_by_key(|l| (l.quantity, l.key()));
        Ok(levels)
    }

    async fn transfer(&self, id: i64) -> AppResult<Option<InventoryTransfer>> {
        Ok(self.state.lock().await.transfers.get(&id).cloned())
    }

    async fn list_transfers(&self, page: &Pagination) -> AppResult<(Vec<InventoryTransfer>, u64)> {
        Ok(page_of(&self.state.lock().await.transfers, page))
    }

    async fn procurement(&self, id: i64) -> AppResult<Option<Procurement>> {
        Ok(self.state.lock().await.procurements.get(&id).cloned())
    }

    async fn list_procurements(&self, page: &Pagination) -> AppResult<(Vec<Procurement>, u64)> {
        Ok(page_of(&self.state.lock().await.procurements, page))
    }

    async fn sale(&self, id: i64) -> AppResult<Option<Sale>> {
        Ok(self.state.lock().await.sales.get(&id).cloned())
    }

    async fn list_sales(&self, page: &Pagination) -> AppResult<(Vec<Sale>, u64)> {
        Ok(page_of(&self.state.lock().await.sales, page))
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn warehouse_exists(&mut self, warehouse_id: i64) -> AppResult<bool> {
        Ok(self.working.warehouses.contains(&warehouse_id))
    }

    async fn variant_exists(&mut self, variant_id: i64) -> AppResult<bool> {
        Ok(self.working.variants.contains(&variant_id))
    }

    async fn level(&mut self, key: StockKey) -> AppResult<Option<InventoryLevel>> {
        Ok(self.working.levels.get(&key).cloned())
    }

    async fn apply_delta(&mut self, delta: &StockDelta) -> AppResult<Option<InventoryLevel>> {
        if self.working.failing_keys.contains(&delta.key) {
            return Err(AppError::Internal(format!(
                "injected write failure for {}",
                delta.key
            )));
        }

        let current = self
            .working
            .levels
            .get(&delta.key)
            .map(|l| l.quantity)
            .unwrap_or(Decimal::ZERO);
        let Some(next) = delta.apply_to(current) else {
            return Ok(None);
        };

        let level = self
            .working
            .levels
            .entry(delta.key)
            .or_insert_with(|| InventoryLevel::empty(delta.key));
        level.quantity = next;
        if delta.batch_number.is_some() {
            level.batch_number = delta.batch_number.clone();
        }
        if delta.expiry_date.is_some() {
            level.expiry_date = delta.expiry_date;
        }
        level.updated_at = Some(Utc::now());

        Ok(Some(level.clone()))
    }

    async fn insert_transfer(&mut self, transfer: &NewTransfer) -> AppResult<InventoryTransfer> {
        let id = self.working.next_id();
        let items = transfer
            .items
            .iter()
            .map(|item| InventoryTransferItem {
                id: self.working.next_id(),
                transfer_id: id,
                variant_id: item.variant_id,
                quantity: item.quantity,
            })
            .collect();

        let created = InventoryTransfer {
            id,
            source_warehouse_id: transfer.source_warehouse_id,
            destination_warehouse_id: transfer.destination_warehouse_id,
            user_id: transfer.user_id,
            status: transfer.status,
            notes: transfer.notes.clone(),
            created_at: Utc::now(),
            completed_at: None,
            items,
        };
        self.working.transfers.insert(id, created.clone());
        Ok(created)
    }

    async fn set_transfer_status(
        &mut self,
        id: i64,
        status: TransferStatus,
    ) -> AppResult<Option<InventoryTransfer>> {
        let Some(transfer) = self.working.transfers.get_mut(&id) else {
            return Ok(None);
        };
        transfer.status = status;
        if status == TransferStatus::Completed {
            transfer.completed_at = Some(Utc::now());
        }
        Ok(Some(transfer.clone()))
    }

    async fn insert_procurement(&mut self, procurement: &NewProcurement) -> AppResult<Procurement> {
        let id = self.working.next_id();
        let items = procurement
            .items
            .iter()
            .map(|item| ProcurementItem {
                id: self.working.next_id(),
                procurement_id: id,
                variant_id: item.variant_id,
                quantity: item.quantity,
                quantity_received: Decimal::ZERO,
                unit_cost: item.unit_cost,
            })
            .collect();

        let now = Utc::now();
        let created = Procurement {
            id,
            supplier_id: procurement.supplier_id,
            warehouse_id: procurement.warehouse_id,
            user_id: procurement.user_id,
            status: ProcurementStatus::Pending,
            expected_delivery: procurement.expected_delivery,
            notes: procurement.notes.clone(),
            created_at: now,
            updated_at: now,
            items,
        };
        self.working.procurements.insert(id, created.clone());
        Ok(created)
    }

    async fn lock_procurement(&mut self, id: i64) -> AppResult<Option<Procurement>> {
        Ok(self.working.procurements.get(&id).cloned())
    }

    async fn set_procurement_status(
        &mut self,
        id: i64,
        status: ProcurementStatus,
    ) -> AppResult<bool> {
        let Some(procurement) = self.working.procurements.get_mut(&id) else {
            return Ok(false);
        };
        procurement.status = status;
        procurement.updated_at = Utc::now();
        Ok(true)
    }

    async fn add_quantity_received(
        &mut self,
        procurement_id: i64,
        item_id: i64,
        quantity: Decimal,
    ) -> AppResult<bool> {
        let Some(item) = self
            .working
            .procurements
            .get_mut(&procurement_id)
            .and_then(|p| p.items.iter_mut().find(|i| i.id == item_id))
        else {
            return Ok(false);
        };
        if item.quantity_received + quantity > item.quantity {
            return Ok(false);
        }
        item.quantity_received += quantity;
        Ok(true)
    }

    async fn insert_sale(&mut self, sale: &NewSale) -> AppResult<Sale> {
        let id = self.working.next_id();
        let items = sale
            .items
            .iter()
            .map(|item| SaleItem {
                id: self.working.next_id(),
                sale_id: id,
                variant_id: item.variant_id,
                quantity: item.quantity,
                unit_price: item.unit_price,
                line_total: item.line_total,
            })
            .collect();

        let created = Sale {
            id,
            warehouse_id: sale.warehouse_id,
            customer_name: sale.customer_name.clone(),
            subtotal: sale.subtotal,
            discount_amount: sale.discount_amount,
            tax_amount: sale.tax_amount,
            total_amount: sale.total_amount,
            payment_method: sale.payment_method,
            user_id: sale.user_id,
            created_at: Utc::now(),
            items,
        };
        self.working.sales.insert(id, created.clone());
        Ok(created)
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
