//! Shared types and models for the Depot inventory backend
//!
//! This crate holds the pure domain layer: entities, status machines and
//! validation rules. It performs no I/O so it can be reused by any client of
//! the backend.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
