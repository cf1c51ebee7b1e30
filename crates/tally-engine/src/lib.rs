//! # tally-engine: Sale Transaction Engine for Tally POS
//!
//! Turns a cart into a recorded sale and keeps inventory consistent with
//! every later status change.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sale Engine Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                 SaleEngine (Clone, Send + Sync)                  │  │
//! │  │                                                                  │  │
//! │  │  create_sale   update_status   get_sale   list_sales             │  │
//! │  │  every call bounded by EngineConfig::operation_timeout           │  │
//! │  └──────────────┬───────────────────────────────┬───────────────────┘  │
//! │                 │                               │                       │
//! │                 ▼                               ▼                       │
//! │  ┌────────────────────────────┐  ┌──────────────────────────────────┐  │
//! │  │ tally-core                 │  │ tally-db (one transaction)       │  │
//! │  │ compute_totals             │  │ InventoryStore::try_reserve_on   │  │
//! │  │ plan_transition            │  │ InventoryStore::restore_on       │  │
//! │  │ InvoiceGenerator           │  │ SaleRepository::*_on             │  │
//! │  └────────────────────────────┘  └──────────────────────────────────┘  │
//! │                                                                         │
//! │  After commit: detached task → CustomerRepository::add_loyalty_points  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`engine`] - `SaleEngine` and its transactions
//! - [`dto`] - request / response / filter types
//! - [`error`] - `SaleError` with kind and retry classification
//! - [`config`] - `EngineConfig`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_db::{Database, DbConfig};
//! use tally_engine::{EngineConfig, SaleEngine};
//!
//! let db = Database::new(DbConfig::new("./data/tally.db")).await?;
//! let engine = SaleEngine::new(db, EngineConfig::default())?;
//!
//! let sale = engine.create_sale("cashier-1", request).await?;
//! println!("{} {}", sale.invoice_number, sale.total_amount);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod dto;
pub mod engine;
pub mod error;

#[cfg(test)]
pub(crate) mod test_support;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{EngineConfig, DEFAULT_OPERATION_TIMEOUT};
pub use dto::{
    CreateSaleRequest, Pagination, SaleDto, SaleFilter, SaleItemDto, SaleLineRequest, SortField,
    SortOrder, UpdateStatusRequest, MAX_PER_PAGE,
};
pub use engine::SaleEngine;
pub use error::{ErrorKind, SaleError, SaleResult};
