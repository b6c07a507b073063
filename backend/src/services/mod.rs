//! Business logic services for the Depot inventory backend

pub mod inventory;
pub mod procurement;
pub mod sales;

pub use inventory::InventoryService;
pub use procurement::ProcurementService;
pub use sales::SalesService;
