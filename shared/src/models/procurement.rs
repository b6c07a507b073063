//! Purchase order models

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::UnknownVariant;

/// Purchase order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcurementStatus {
    Pending,
    Approved,
    Ordered,
    Partial,
    Received,
    Cancelled,
}

impl ProcurementStatus {
    pub const ALL: [ProcurementStatus; 6] = [
        ProcurementStatus::Pending,
        ProcurementStatus::Approved,
        ProcurementStatus::Ordered,
        ProcurementStatus::Partial,
        ProcurementStatus::Received,
        ProcurementStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcurementStatus::Pending => "pending",
            ProcurementStatus::Approved => "approved",
            ProcurementStatus::Ordered => "ordered",
            ProcurementStatus::Partial => "partial",
            ProcurementStatus::Received => "received",
            ProcurementStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ProcurementStatus::Received | ProcurementStatus::Cancelled)
    }

    /// Legal status transitions.
    ///
    /// `partial -> partial` is allowed so every receipt that leaves items
    /// outstanding can record the same status again.
    pub fn can_transition_to(self, next: ProcurementStatus) -> bool {
        use ProcurementStatus::*;

        match (self, next) {
            (Pending, Approved) => true,
            (Approved, Ordered) => true,
            (Ordered, Partial) | (Ordered, Received) => true,
            (Partial, Partial) | (Partial, Received) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Whether goods may be booked in against the order
    pub fn accepts_receipts(self) -> bool {
        matches!(self, ProcurementStatus::Ordered | ProcurementStatus::Partial)
    }
}

impl FromStr for ProcurementStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProcurementStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("procurement status", s))
    }
}

impl fmt::Display for ProcurementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Purchase order placed with a supplier for delivery into a warehouse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Procurement {
    pub id: i64,
    pub supplier_id: i64,
    pub warehouse_id: i64,
    pub user_id: i64,
    pub status: ProcurementStatus,
    pub expected_delivery: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<ProcurementItem>,
}

impl Procurement {
    pub fn item(&self, item_id: i64) -> Option<&ProcurementItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    /// Sum of line costs; saturates instead of overflowing
    pub fn total_cost(&self) -> Decimal {
        self.items
            .iter()
            .map(ProcurementItem::line_cost)
            .fold(Decimal::ZERO, Decimal::saturating_add)
    }

    pub fn is_fully_received(&self) -> bool {
        !self.items.is_empty() && self.items.iter().all(ProcurementItem::is_fully_received)
    }

    pub fn has_receipts(&self) -> bool {
        self.items.iter().any(|i| i.quantity_received > Decimal::ZERO)
    }

    /// Status implied by the received quantities, if any goods have arrived
    pub fn receipt_status(&self) -> Option<ProcurementStatus> {
        if self.is_fully_received() {
            Some(ProcurementStatus::Received)
        } else if self.has_receipts() {
            Some(ProcurementStatus::Partial)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcurementItem {
    pub id: i64,
    pub procurement_id: i64,
    pub variant_id: i64,
    pub quantity: Decimal,
    pub quantity_received: Decimal,
    pub unit_cost: Decimal,
}

impl ProcurementItem {
    pub fn remaining(&self) -> Decimal {
        (self.quantity - self.quantity_received).max(Decimal::ZERO)
    }

    pub fn is_fully_received(&self) -> bool {
        self.quantity_received >= self.quantity
    }

    pub fn line_cost(&self) -> Decimal {
        self.quantity.saturating_mul(self.unit_cost)
    }
}
