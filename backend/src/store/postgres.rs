//! PostgreSQL store backed by sqlx
//!
//! Quantity changes are single statements: credits and permitted negatives
//! are an `INSERT ... ON CONFLICT DO UPDATE`, strict debits a guarded
//! `UPDATE`. Concurrent writers to one (warehouse, variant) row serialize on
//! the row lock and the non-negative guard sees the latest committed quantity.

use std::collections::HashMap;
use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::{
    InventoryLevel, InventoryTransfer, InventoryTransferItem, Pagination, Procurement,
    ProcurementItem, ProcurementStatus, Sale, SaleItem, StockDelta, StockKey, TransferStatus,
};
use sqlx::{FromRow, PgConnection, PgPool, Postgres, Transaction};

use super::{NewProcurement, NewSale, NewTransfer, Store, StoreTx};
use crate::error::AppResult;

/// Store implementation over a Postgres connection pool
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// Errors worth one more attempt on an idempotent read
fn is_transient(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::PoolTimedOut | sqlx::Error::Io(_))
}

/// Run a read, retrying once on a transient failure. Never used for writes.
async fn read_with_retry<T, F, Fut>(op: F) -> AppResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    match op().await {
        Err(err) if is_transient(&err) => {
            tracing::warn!(error = %err, "Transient store error on read, retrying once");
            Ok(op().await?)
        }
        result => Ok(result?),
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>> {
        let tx = self.db.begin().await?;
        Ok(Box::new(PgStoreTx { tx }))
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }

    async fn level(&self, key: StockKey) -> AppResult<Option<InventoryLevel>> {
        read_with_retry(|| {
            let db = self.db.clone();
            async move {
                let mut conn = db.acquire().await?;
                queries::level(&mut *conn, key).await
            }
        })
        .await
    }

    async fn expiring_levels(&self, before: DateTime<Utc>) -> AppResult<Vec<InventoryLevel>> {
        read_with_retry(|| {
            let db = self.db.clone();
            async move {
                let rows = sqlx::query_as::<_, LevelRow>(
                    r#"
                    SELECT warehouse_id, variant_id, quantity, batch_number, expiry_date, updated_at
                    FROM inventory_levels
                    WHERE expiry_date IS NOT NULL AND expiry_date <= $1 AND quantity > 0
                    ORDER BY expiry_date ASC, warehouse_id, variant_id
                    "#,
                )
                .bind(before)
                .fetch_all(&db)
                .await?;
                Ok(rows.into_iter().map(InventoryLevel::from).collect())
            }
        })
        .await
    }

    async fn low_levels(&self, threshold: Decimal) -> AppResult<Vec<InventoryLevel>> {
        read_with_retry(|| {
            let db = self.db.clone();
            async move {
                let rows = sqlx::query_as::<_, LevelRow>(
                    r#"
                    SELECT warehouse_id, variant_id, quantity, batch_number, expiry_date, updated_at
                    FROM inventory_levels
                    WHERE quantity <= $1
                    ORDER BY quantity ASC, warehouse_id, variant_id
                    "#,
                )
                .bind(threshold)
                .fetch_all(&db)
                .await?;
                Ok(rows.into_iter().map(InventoryLevel::from).collect())
            }
        })
        .await
    }

    async fn transfer(&self, id: i64) -> AppResult<Option<InventoryTransfer>> {
        read_with_retry(|| {
            let db = self.db.clone();
            async move {
                let mut conn = db.acquire().await?;
                queries::transfer(&mut *conn, id).await
            }
        })
        .await
    }

    async fn list_transfers(&self, page: &Pagination) -> AppResult<(Vec<InventoryTransfer>, u64)> {
        let (limit, offset) = page_bounds(page);
        read_with_retry(|| {
            let db = self.db.clone();
            async move {
                let mut conn = db.acquire().await?;
                queries::transfer_page(&mut *conn, limit, offset).await
            }
        })
        .await
    }

    async fn procurement(&self, id: i64) -> AppResult<Option<Procurement>> {
        read_with_retry(|| {
            let db = self.db.clone();
            async move {
                let mut conn = db.acquire().await?;
                queries::procurement(&mut *conn, id, false).await
            }
        })
        .await
    }

    async fn list_procurements(&self, page: &Pagination) -> AppResult<(Vec<Procurement>, u64)> {
        let (limit, offset) = page_bounds(page);
        read_with_retry(|| {
            let db = self.db.clone();
            async move {
                let mut conn = db.acquire().await?;
                queries::procurement_page(&mut *conn, limit, offset).await
            }
        })
        .await
    }

    async fn sale(&self, id: i64) -> AppResult<Option<Sale>> {
        read_with_retry(|| {
            let db = self.db.clone();
            async move {
                let mut conn = db.acquire().await?;
                queries::sale(&mut *conn, id).await
            }
        })
        .await
    }

    async fn list_sales(&self, page: &Pagination) -> AppResult<(Vec<Sale>, u64)> {
        let (limit, offset) = page_bounds(page);
        read_with_retry(|| {
            let db = self.db.clone();
            async move {
                let mut conn = db.acquire().await?;
                queries::sale_page(&mut *conn, limit, offset).await
            }
        })
        .await
    }
}

fn page_bounds(page: &Pagination) -> (i64, i64) {
    let limit = i64::try_from(page.limit()).unwrap_or(i64::MAX);
    let offset = i64::try_from(page.offset()).unwrap_or(i64::MAX);
    (limit, offset)
}

/// An open Postgres transaction. Dropping it without commit rolls back.
pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn warehouse_exists(&mut self, warehouse_id: i64) -> AppResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM warehouses WHERE id = $1)",
        )
        .bind(warehouse_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn variant_exists(&mut self, variant_id: i64) -> AppResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM product_variants WHERE id = $1)",
        )
        .bind(variant_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn level(&mut self, key: StockKey) -> AppResult<Option<InventoryLevel>> {
        Ok(queries::level(&mut *self.tx, key).await?)
    }

    async fn apply_delta(&mut self, delta: &StockDelta) -> AppResult<Option<InventoryLevel>> {
        if delta.delta < Decimal::ZERO && !delta.allow_negative {
            // Strict debit: only an existing row holding enough stock is
            // touched. The guard reads the row under its update lock.
            let row = sqlx::query_as::<_, LevelRow>(
                r#"
                UPDATE inventory_levels
                SET quantity = quantity + $3,
                    batch_number = COALESCE($4, batch_number),
                    expiry_date = COALESCE($5, expiry_date),
                    updated_at = NOW()
                WHERE warehouse_id = $1 AND variant_id = $2 AND quantity + $3 >= 0
                RETURNING warehouse_id, variant_id, quantity, batch_number, expiry_date, updated_at
                "#,
            )
            .bind(delta.key.warehouse_id)
            .bind(delta.key.variant_id)
            .bind(delta.delta)
            .bind(&delta.batch_number)
            .bind(delta.expiry_date)
            .fetch_optional(&mut *self.tx)
            .await?;

            return Ok(row.map(InventoryLevel::from));
        }

        let row = sqlx::query_as::<_, LevelRow>(
            r#"
            INSERT INTO inventory_levels AS il (warehouse_id, variant_id, quantity, batch_number, expiry_date)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (warehouse_id, variant_id) DO UPDATE
            SET quantity = il.quantity + EXCLUDED.quantity,
                batch_number = COALESCE(EXCLUDED.batch_number, il.batch_number),
                expiry_date = COALESCE(EXCLUDED.expiry_date, il.expiry_date),
                updated_at = NOW()
            RETURNING warehouse_id, variant_id, quantity, batch_number, expiry_date, updated_at
            "#,
        )
        .bind(delta.key.warehouse_id)
        .bind(delta.key.variant_id)
        .bind(delta.delta)
        .bind(&delta.batch_number)
        .bind(delta.expiry_date)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(Some(row.into()))
    }

    async fn insert_transfer(&mut self, transfer: &NewTransfer) -> AppResult<InventoryTransfer> {
        let header = sqlx::query_as::<_, TransferRow>(
            r#"
            INSERT INTO inventory_transfers (source_warehouse_id, destination_warehouse_id, user_id, status, notes)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, source_warehouse_id, destination_warehouse_id, user_id, status, notes,
                      created_at, completed_at
            "#,
        )
        .bind(transfer.source_warehouse_id)
        .bind(transfer.destination_warehouse_id)
        .bind(transfer.user_id)
        .bind(transfer.status.as_str())
        .bind(&transfer.notes)
        .fetch_one(&mut *self.tx)
        .await?;

        let mut items = Vec::with_capacity(transfer.items.len());
        for item in &transfer.items {
            let row = sqlx::query_as::<_, TransferItemRow>(
                r#"
                INSERT INTO inventory_transfer_items (transfer_id, variant_id, quantity)
                VALUES ($1, $2, $3)
                RETURNING id, transfer_id, variant_id, quantity
                "#,
            )
            .bind(header.id)
            .bind(item.variant_id)
            .bind(item.quantity)
            .fetch_one(&mut *self.tx)
            .await?;
            items.push(row.into());
        }

        Ok(header.into_model(items)?)
    }

    async fn set_transfer_status(
        &mut self,
        id: i64,
        status: TransferStatus,
    ) -> AppResult<Option<InventoryTransfer>> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_transfers
            SET status = $2,
                completed_at = CASE WHEN $2 = 'completed' THEN NOW() ELSE completed_at END
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(queries::transfer(&mut *self.tx, id).await?)
    }

    async fn insert_procurement(&mut self, procurement: &NewProcurement) -> AppResult<Procurement> {
        let header = sqlx::query_as::<_, ProcurementRow>(
            r#"
            INSERT INTO procurements (supplier_id, warehouse_id, user_id, status, expected_delivery, notes)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, supplier_id, warehouse_id, user_id, status, expected_delivery, notes,
                      created_at, updated_at
            "#,
        )
        .bind(procurement.supplier_id)
        .bind(procurement.warehouse_id)
        .bind(procurement.user_id)
        .bind(ProcurementStatus::Pending.as_str())
        .bind(procurement.expected_delivery)
        .bind(&procurement.notes)
        .fetch_one(&mut *self.tx)
        .await?;

        let mut items = Vec::with_capacity(procurement.items.len());
        for item in &procurement.items {
            let row = sqlx::query_as::<_, ProcurementItemRow>(
                r#"
                INSERT INTO procurement_items (procurement_id, variant_id, quantity, quantity_received, unit_cost)
                VALUES ($1, $2, $3, 0, $4)
                RETURNING id, procurement_id, variant_id, quantity, quantity_received, unit_cost
                "#,
            )
            .bind(header.id)
            .bind(item.variant_id)
            .bind(item.quantity)
            .bind(item.unit_cost)
            .fetch_one(&mut *self.tx)
            .await?;
            items.push(row.into());
        }

        Ok(header.into_model(items)?)
    }

    async fn lock_procurement(&mut self, id: i64) -> AppResult<Option<Procurement>> {
        Ok(queries::procurement(&mut *self.tx, id, true).await?)
    }

    async fn set_procurement_status(
        &mut self,
        id: i64,
        status: ProcurementStatus,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE procurements SET status = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn add_quantity_received(
        &mut self,
        procurement_id: i64,
        item_id: i64,
        quantity: Decimal,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE procurement_items
            SET quantity_received = quantity_received + $3
            WHERE id = $2 AND procurement_id = $1 AND quantity_received + $3 <= quantity
            "#,
        )
        .bind(procurement_id)
        .bind(item_id)
        .bind(quantity)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn insert_sale(&mut self, sale: &NewSale) -> AppResult<Sale> {
        let header = sqlx::query_as::<_, SaleRow>(
            r#"
            INSERT INTO sales (warehouse_id, customer_name, subtotal, discount_amount, tax_amount,
                               total_amount, payment_method, user_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, warehouse_id, customer_name, subtotal, discount_amount, tax_amount,
                      total_amount, payment_method, user_id, created_at
            "#,
        )
        .bind(sale.warehouse_id)
        .bind(&sale.customer_name)
        .bind(sale.subtotal)
        .bind(sale.discount_amount)
        .bind(sale.tax_amount)
        .bind(sale.total_amount)
        .bind(sale.payment_method.as_str())
        .bind(sale.user_id)
        .fetch_one(&mut *self.tx)
        .await?;

        let mut items = Vec::with_capacity(sale.items.len());
        for item in &sale.items {
            let row = sqlx::query_as::<_, SaleItemRow>(
                r#"
                INSERT INTO sale_items (sale_id, variant_id, quantity, unit_price, line_total)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, sale_id, variant_id, quantity, unit_price, line_total
                "#,
            )
            .bind(header.id)
            .bind(item.variant_id)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.line_total)
            .fetch_one(&mut *self.tx)
            .await?;
            items.push(row.into());
        }

        Ok(header.into_model(items)?)
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

// ============================================================================
// Row types
// ============================================================================

fn decode_status<T>(value: &str) -> Result<T, sqlx::Error>
where
    T: std::str::FromStr<Err = shared::UnknownVariant>,
{
    value
        .parse::<T>()
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

#[derive(Debug, FromRow)]
struct LevelRow {
    warehouse_id: i64,
    variant_id: i64,
    quantity: Decimal,
    batch_number: Option<String>,
    expiry_date: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl From<LevelRow> for InventoryLevel {
    fn from(row: LevelRow) -> Self {
        InventoryLevel {
            warehouse_id: row.warehouse_id,
            variant_id: row.variant_id,
            quantity: row.quantity,
            batch_number: row.batch_number,
            expiry_date: row.expiry_date,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct TransferRow {
    id: i64,
    source_warehouse_id: i64,
    destination_warehouse_id: i64,
    user_id: i64,
    status: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TransferRow {
    fn into_model(self, items: Vec<InventoryTransferItem>) -> Result<InventoryTransfer, sqlx::Error> {
        Ok(InventoryTransfer {
            id: self.id,
            source_warehouse_id: self.source_warehouse_id,
            destination_warehouse_id: self.destination_warehouse_id,
            user_id: self.user_id,
            status: decode_status::<TransferStatus>(&self.status)?,
            notes: self.notes,
            created_at: self.created_at,
            completed_at: self.completed_at,
            items,
        })
    }
}

#[derive(Debug, FromRow)]
struct TransferItemRow {
    id: i64,
    transfer_id: i64,
    variant_id: i64,
    quantity: Decimal,
}

impl From<TransferItemRow> for InventoryTransferItem {
    fn from(row: TransferItemRow) -> Self {
        InventoryTransferItem {
            id: row.id,
            transfer_id: row.transfer_id,
            variant_id: row.variant_id,
            quantity: row.quantity,
        }
    }
}

#[derive(Debug, FromRow)]
struct ProcurementRow {
    id: i64,
    supplier_id: i64,
    warehouse_id: i64,
    user_id: i64,
    status: String,
    expected_delivery: Option<DateTime<Utc>>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProcurementRow {
    fn into_model(self, items: Vec<ProcurementItem>) -> Result<Procurement, sqlx::Error> {
        Ok(Procurement {
            id: self.id,
            supplier_id: self.supplier_id,
            warehouse_id: self.warehouse_id,
            user_id: self.user_id,
            status: decode_status::<ProcurementStatus>(&self.status)?,
            expected_delivery: self.expected_delivery,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
            items,
        })
    }
}

#[derive(Debug, FromRow)]
struct ProcurementItemRow {
    id: i64,
    procurement_id: i64,
    variant_id: i64,
    quantity: Decimal,
    quantity_received: Decimal,
    unit_cost: Decimal,
}

impl From<ProcurementItemRow> for ProcurementItem {
    fn from(row: ProcurementItemRow) -> Self {
        ProcurementItem {
            id: row.id,
            procurement_id: row.procurement_id,
            variant_id: row.variant_id,
            quantity: row.quantity,
            quantity_received: row.quantity_received,
            unit_cost: row.unit_cost,
        }
    }
}

#[derive(Debug, FromRow)]
struct SaleRow {
    id: i64,
    warehouse_id: i64,
    customer_name: Option<String>,
    subtotal: Decimal,
    discount_amount: Decimal,
    tax_amount: Decimal,
    total_amount: Decimal,
    payment_method: String,
    user_id: i64,
    created_at: DateTime<Utc>,
}

impl SaleRow {
    fn into_model(self, items: Vec<SaleItem>) -> Result<Sale, sqlx::Error> {
        Ok(Sale {
            id: self.id,
            warehouse_id: self.warehouse_id,
            customer_name: self.customer_name,
            subtotal: self.subtotal,
            discount_amount: self.discount_amount,
            tax_amount: self.tax_amount,
            total_amount: self.total_amount,
            payment_method: decode_status(&self.payment_method)?,
            user_id: self.user_id,
            created_at: self.created_at,
            items,
        })
    }
}

#[derive(Debug, FromRow)]
struct SaleItemRow {
    id: i64,
    sale_id: i64,
    variant_id: i64,
    quantity: Decimal,
    unit_price: Decimal,
    line_total: Decimal,
}

impl From<SaleItemRow> for SaleItem {
    fn from(row: SaleItemRow) -> Self {
        SaleItem {
            id: row.id,
            sale_id: row.sale_id,
            variant_id: row.variant_id,
            quantity: row.quantity,
            unit_price: row.unit_price,
            line_total: row.line_total,
        }
    }
}

/// Group child rows under their parent id
fn group_by<R, T>(rows: Vec<R>, parent: impl Fn(&R) -> i64) -> HashMap<i64, Vec<T>>
where
    T: From<R>,
{
    let mut grouped: HashMap<i64, Vec<T>> = HashMap::new();
    for row in rows {
        grouped.entry(parent(&row)).or_default().push(T::from(row));
    }
    grouped
}

/// Queries shared between pooled reads and open transactions
mod queries {
    use super::*;

    pub(super) async fn level(
        conn: &mut PgConnection,
        key: StockKey,
    ) -> Result<Option<InventoryLevel>, sqlx::Error> {
        let row = sqlx::query_as::<_, LevelRow>(
            r#"
            SELECT warehouse_id, variant_id, quantity, batch_number, expiry_date, updated_at
            FROM inventory_levels
            WHERE warehouse_id = $1 AND variant_id = $2
            "#,
        )
        .bind(key.warehouse_id)
        .bind(key.variant_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(row.map(InventoryLevel::from))
    }

    pub(super) async fn transfer(
        conn: &mut PgConnection,
        id: i64,
    ) -> Result<Option<InventoryTransfer>, sqlx::Error> {
        let Some(header) = sqlx::query_as::<_, TransferRow>(
            r#"
            SELECT id, source_warehouse_id, destination_warehouse_id, user_id, status, notes,
                   created_at, completed_at
            FROM inventory_transfers
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, TransferItemRow>(
            "SELECT id, transfer_id, variant_id, quantity FROM inventory_transfer_items WHERE transfer_id = $1 ORDER BY id",
        )
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;

        header
            .into_model(items.into_iter().map(Into::into).collect())
            .map(Some)
    }

    pub(super) async fn transfer_page(
        conn: &mut PgConnection,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<InventoryTransfer>, u64), sqlx::Error> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM inventory_transfers")
            .fetch_one(&mut *conn)
            .await?;

        let headers = sqlx::query_as::<_, TransferRow>(
            r#"
            SELECT id, source_warehouse_id, destination_warehouse_id, user_id, status, notes,
                   created_at, completed_at
            FROM inventory_transfers
            ORDER BY created_at DESC, id DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *conn)
        .await?;

        let ids: Vec<i64> = headers.iter().map(|h| h.id).collect();
        let rows = sqlx::query_as::<_, TransferItemRow>(
            "SELECT id, transfer_id, variant_id, quantity FROM inventory_transfer_items WHERE transfer_id = ANY($1) ORDER BY id",
        )
        .bind(&ids)
        .fetch_all(&mut *conn)
        .await?;
        let mut items: HashMap<i64, Vec<InventoryTransferItem>> = group_by(rows, |r| r.transfer_id);

        let transfers = headers
            .into_iter()
            .map(|h| {
                let lines = items.remove(&h.id).unwrap_or_default();
                h.into_model(lines)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok((transfers, total.max(0) as u64))
    }

    pub(super) async fn procurement(
        conn: &mut PgConnection,
        id: i64,
        for_update: bool,
    ) -> Result<Option<Procurement>, sqlx::Error> {
        let sql = if for_update {
            "SELECT id, supplier_id, warehouse_id, user_id, status, expected_delivery, notes, created_at, updated_at FROM procurements WHERE id = $1 FOR UPDATE"
        } else {
            "SELECT id, supplier_id, warehouse_id, user_id, status, expected_delivery, notes, created_at, updated_at FROM procurements WHERE id = $1"
        };

        let Some(header) = sqlx::query_as::<_, ProcurementRow>(sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
        else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, ProcurementItemRow>(
            r#"
            SELECT id, procurement_id, variant_id, quantity, quantity_received, unit_cost
            FROM procurement_items
            WHERE procurement_id = $1
            ORDER BY id
            "#,
        )
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;

        header
            .into_model(items.into_iter().map(Into::into).collect())
            .map(Some)
    }

    pub(super) async fn procurement_page(
        conn: &mut PgConnection,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Procurement>, u64), sqlx::Error> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM procurements")
            .fetch_one(&mut *conn)
            .await?;

        let headers = sqlx::query_as::<_, ProcurementRow>(
            r#"
            SELECT id, supplier_id, warehouse_id, user_id, status, expected_delivery, notes,
                   created_at, updated_at
            FROM procurements
            ORDER BY created_at DESC, id DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *conn)
        .await?;

        let ids: Vec<i64> = headers.iter().map(|h| h.id).collect();
        let rows = sqlx::query_as::<_, ProcurementItemRow>(
            r#"
            SELECT id, procurement_id, variant_id, quantity, quantity_received, unit_cost
            FROM procurement_items
            WHERE procurement_id = ANY($1)
            ORDER BY id
            "#,
        )
        .bind(&ids)
        .fetch_all(&mut *conn)
        .await?;
        let mut items: HashMap<i64, Vec<ProcurementItem>> = group_by(rows, |r| r.procurement_id);

        let procurements = headers
            .into_iter()
            .map(|h| {
                let lines = items.remove(&h.id).unwrap_or_default();
                h.into_model(lines)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok((procurements, total.max(0) as u64))
    }

    pub(super) async fn sale(conn: &mut PgConnection, id: i64) -> Result<Option<Sale>, sqlx::Error> {
        let Some(header) = sqlx::query_as::<_, SaleRow>(
            r#"
            SELECT id, warehouse_id, customer_name, subtotal, discount_amount, tax_amount,
                   total_amount, payment_method, user_id, created_at
            FROM sales
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, SaleItemRow>(
            "SELECT id, sale_id, variant_id, quantity, unit_price, line_total FROM sale_items WHERE sale_id = $1 ORDER BY id",
        )
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;

        header
            .into_model(items.into_iter().map(Into::into).collect())
            .map(Some)
    }

    pub(super) async fn sale_page(
        conn: &mut PgConnection,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Sale>, u64), sqlx::Error> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sales")
            .fetch_one(&mut *conn)
            .await?;

        let headers = sqlx::query_as::<_, SaleRow>(
            r#"
            SELECT id, warehouse_id, customer_name, subtotal, discount_amount, tax_amount,
                   total_amount, payment_method, user_id, created_at
            FROM sales
            ORDER BY created_at DESC, id DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *conn)
        .await?;

        let ids: Vec<i64> = headers.iter().map(|h| h.id).collect();
        let rows = sqlx::query_as::<_, SaleItemRow>(
            "SELECT id, sale_id, variant_id, quantity, unit_price, line_total FROM sale_items WHERE sale_id = ANY($1) ORDER BY id",
        )
        .bind(&ids)
        .fetch_all(&mut *conn)
        .await?;
        let mut items: HashMap<i64, Vec<SaleItem>> = group_by(rows, |r| r.sale_id);

        let sales = headers
            .into_iter()
            .map(|h| {
                let lines = items.remove(&h.id).unwrap_or_default();
                h.into_model(lines)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok((sales, total.max(0) as u64))
    }
}
