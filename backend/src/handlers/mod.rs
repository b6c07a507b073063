//! HTTP request handlers

pub mod health;
pub mod inventory;
pub mod procurement;
pub mod sales;

pub use health::health_check;
pub use inventory::*;
pub use procurement::*;
pub use sales::*;
