//! Domain models for the Depot inventory backend

mod inventory;
mod procurement;
mod sale;

pub use inventory::*;
pub use procurement::*;
pub use sale::*;

/// Error returned when parsing a status or enum value from its wire form
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
