//! Inventory ledger models

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::UnknownVariant;

/// Identifies one ledger row: a variant held in a warehouse.
///
/// Ordering is (warehouse, variant); multi-row writes apply their deltas in
/// this order so concurrent transactions always lock rows in the same order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub warehouse_id: i64,
    pub variant_id: i64,
}

impl StockKey {
    pub fn new(warehouse_id: i64, variant_id: i64) -> Self {
        Self {
            warehouse_id,
            variant_id,
        }
    }
}

impl fmt::Display for StockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "warehouse {} / variant {}", self.warehouse_id, self.variant_id)
    }
}

/// Quantity of one variant present in one warehouse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryLevel {
    pub warehouse_id: i64,
    pub variant_id: i64,
    pub quantity: Decimal,
    pub batch_number: Option<String>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl InventoryLevel {
    /// The level reported for a pair that has never been adjusted
    pub fn empty(key: StockKey) -> Self {
        Self {
            warehouse_id: key.warehouse_id,
            variant_id: key.variant_id,
            quantity: Decimal::ZERO,
            batch_number: None,
            expiry_date: None,
            updated_at: None,
        }
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.warehouse_id, self.variant_id)
    }

    /// Whether `requested` can be deducted without going negative
    pub fn covers(&self, requested: Decimal) -> bool {
        self.quantity >= requested
    }
}

/// A signed change to one ledger row.
///
/// `allow_negative` is only ever set by manual corrections; system initiated
/// deductions always run with the non-negative guard.
#[derive(Debug, Clone, PartialEq)]
pub struct StockDelta {
    pub key: StockKey,
    pub delta: Decimal,
    pub allow_negative: bool,
    pub batch_number: Option<String>,
    pub expiry_date: Option<DateTime<Utc>>,
}

impl StockDelta {
    pub fn strict(key: StockKey, delta: Decimal) -> Self {
        Self {
            key,
            delta,
            allow_negative: false,
            batch_number: None,
            expiry_date: None,
        }
    }

    /// Result of applying this delta to `current`, or `None` if the guard rejects it
    pub fn apply_to(&self, current: Decimal) -> Option<Decimal> {
        let next = current + self.delta;
        if self.delta < Decimal::ZERO && next < Decimal::ZERO && !self.allow_negative {
            None
        } else {
            Some(next)
        }
    }
}

/// Sort deltas into lock order
pub fn in_lock_order(mut deltas: Vec<StockDelta>) -> Vec<StockDelta> {
    deltas.sort_by_key(|d| d.key);
    deltas
}

/// Sum quantities per id; `None` when a sum leaves the stored range
pub fn combine_quantities<I>(lines: I) -> Option<BTreeMap<i64, Decimal>>
where
    I: IntoIterator<Item = (i64, Decimal)>,
{
    let mut combined = BTreeMap::new();
    for (id, quantity) in lines {
        let entry = combined.entry(id).or_insert(Decimal::ZERO);
        *entry = entry.checked_add(quantity)?;
        if !crate::validation::is_storable(*entry) {
            return None;
        }
    }
    Some(combined)
}

/// Inventory transfer status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Completed,
    Failed,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Completed => "completed",
            TransferStatus::Failed => "failed",
        }
    }

    pub fn can_transition_to(self, next: TransferStatus) -> bool {
        matches!(
            (self, next),
            (TransferStatus::Pending, TransferStatus::Completed)
                | (TransferStatus::Pending, TransferStatus::Failed)
        )
    }
}

impl FromStr for TransferStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransferStatus::Pending),
            "completed" => Ok(TransferStatus::Completed),
            "failed" => Ok(TransferStatus::Failed),
            other => Err(UnknownVariant::new("transfer status", other)),
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directed movement of stock between two warehouses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryTransfer {
    pub id: i64,
    pub source_warehouse_id: i64,
    pub destination_warehouse_id: i64,
    pub user_id: i64,
    pub status: TransferStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub items: Vec<InventoryTransferItem>,
}

impl InventoryTransfer {
    /// Source debits and destination credits for every line
    pub fn legs(&self) -> Vec<StockDelta> {
        let mut legs = Vec::with_capacity(self.items.len() * 2);
        for item in &self.items {
            legs.push(StockDelta::strict(
                StockKey::new(self.source_warehouse_id, item.variant_id),
                -item.quantity,
            ));
            legs.push(StockDelta::strict(
                StockKey::new(self.destination_warehouse_id, item.variant_id),
                item.quantity,
            ));
        }
        in_lock_order(legs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryTransferItem {
    pub id: i64,
    pub transfer_id: i64,
    pub variant_id: i64,
    pub quantity: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dec(n: i64) -> Decimal {
        Decimal::from(n)
    }

    #[test]
    fn test_empty_level_is_zero() {
        let level = InventoryLevel::empty(StockKey::new(1, 5));
        assert_eq!(level.quantity, Decimal::ZERO);
        assert_eq!(level.key(), StockKey::new(1, 5));
    }

    #[test]
    fn test_strict_delta_rejects_underflow() {
        let d = StockDelta::strict(StockKey::new(1, 1), dec(-10));
        assert_eq!(d.apply_to(dec(9)), None);
        assert_eq!(d.apply_to(dec(10)), Some(Decimal::ZERO));
    }

    #[test]
    fn test_permissive_delta_allows_underflow() {
        let mut d = StockDelta::strict(StockKey::new(1, 1), dec(-10));
        d.allow_negative = true;
        assert_eq!(d.apply_to(dec(3)), Some(dec(-7)));
    }

    #[test]
    fn test_positive_delta_on_negative_level() {
        let d = StockDelta::strict(StockKey::new(1, 1), dec(4));
        assert_eq!(d.apply_to(dec(-7)), Some(dec(-3)));
    }

    #[test]
    fn test_transfer_status_transitions() {
        assert!(TransferStatus::Pending.can_transition_to(TransferStatus::Completed));
        assert!(TransferStatus::Pending.can_transition_to(TransferStatus::Failed));
        assert!(!TransferStatus::Completed.can_transition_to(TransferStatus::Pending));
        assert!(!TransferStatus::Failed.can_transition_to(TransferStatus::Completed));
    }

    #[test]
    fn test_transfer_status_parse() {
        assert_eq!("completed".parse::<TransferStatus>(), Ok(TransferStatus::Completed));
        assert!("rolled_back".parse::<TransferStatus>().is_err());
    }

    #[test]
    fn test_transfer_legs_are_in_lock_order() {
        let transfer = InventoryTransfer {
            id: 1,
            source_warehouse_id: 2,
            destination_warehouse_id: 1,
            user_id: 9,
            status: TransferStatus::Pending,
            notes: None,
            created_at: Utc::now(),
            completed_at: None,
            items: vec![
                InventoryTransferItem { id: 1, transfer_id: 1, variant_id: 7, quantity: dec(3) },
                InventoryTransferItem { id: 2, transfer_id: 1, variant_id: 5, quantity: dec(4) },
            ],
        };

        let keys: Vec<StockKey> = transfer.legs().iter().map(|d| d.key).collect();
        assert_eq!(
            keys,
            vec![
                StockKey::new(1, 5),
                StockKey::new(1, 7),
                StockKey::new(2, 5),
                StockKey::new(2, 7),
            ]
        );
    }

    #[test]
    fn test_combine_quantities_merges_duplicates() {
        let combined = combine_quantities(vec![(5, dec(2)), (3, dec(1)), (5, dec(4))]).unwrap();
        assert_eq!(combined.len(), 2);
        assert_eq!(combined[&5], dec(6));
        assert_eq!(combined[&3], dec(1));
    }

    #[test]
    fn test_combine_quantities_rejects_overflowing_sum() {
        assert!(combine_quantities(vec![(5, Decimal::MAX), (5, Decimal::MAX)]).is_none());
        let big = Decimal::from(60_000_000_000_000i64);
        assert!(combine_quantities(vec![(5, big), (5, big)]).is_none());
        assert!(combine_quantities(vec![(5, big), (6, big)]).is_some());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Transfer legs net to zero per variant
        #[test]
        fn prop_transfer_legs_conserve_stock(
            quantities in prop::collection::vec((1i64..20, 1i64..10_000), 1..8)
        ) {
            let items = quantities
                .iter()
                .enumerate()
                .map(|(i, (variant, q))| InventoryTransferItem {
                    id: i as i64,
                    transfer_id: 1,
                    variant_id: *variant,
                    quantity: Decimal::new(*q, 2),
                })
                .collect();
            let transfer = InventoryTransfer {
                id: 1,
                source_warehouse_id: 1,
                destination_warehouse_id: 2,
                user_id: 1,
                status: TransferStatus::Pending,
                notes: None,
                created_at: Utc::now(),
                completed_at: None,
                items,
            };

            let net: Decimal = transfer.legs().iter().map(|d| d.delta).sum();
            prop_assert_eq!(net, Decimal::ZERO);
        }

        /// A strict delta never yields a negative result from a non-negative start
        #[test]
        fn prop_strict_delta_never_negative(current in 0i64..10_000, delta in -10_000i64..10_000) {
            let d = StockDelta::strict(StockKey::new(1, 1), Decimal::new(delta, 1));
            if let Some(next) = d.apply_to(Decimal::new(current, 1)) {
                prop_assert!(next >= Decimal::ZERO);
            }
        }
    }
}
