//! # tally-core: Pure Business Logic for Tally POS
//!
//! This crate is the **heart** of Tally POS. It contains all business logic
//! as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally POS Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    HTTP API (axum)                              │   │
//! │  │    POST /sales, PATCH /sales/{id}/status, GET /sales           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    tally-engine (SaleEngine)                    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │  totals   │  │  status   │  │   │
//! │  │   │  Product  │  │   Money   │  │  Totals   │  │ Transition│  │   │
//! │  │   │   Sale    │  │  TaxRate  │  │           │  │  rules    │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    tally-db (Database Layer)                    │   │
//! │  │        SQLite queries, migrations, inventory, repositories      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Sale, SaleItem, enums)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`totals`] - Subtotal / tax / discount / total calculation
//! - [`status`] - Sale status transition table
//! - [`invoice`] - Invoice number generation
//! - [`error`] - Domain error types
//! - [`validation`] - Business rule validation
//!
//! ## Example Usage
//!
//! ```rust
//! use tally_core::money::Money;
//! use tally_core::totals::compute_totals;
//! use tally_core::DEFAULT_TAX_RATE;
//!
//! let lines = [
//!     (Money::from_major_minor(10_000, 0), 2),
//!     (Money::from_major_minor(5_000, 0), 3),
//! ];
//! let totals = compute_totals(&lines, DEFAULT_TAX_RATE, Money::zero()).unwrap();
//!
//! assert_eq!(totals.subtotal, Money::from_major_minor(35_000, 0));
//! assert_eq!(totals.tax, Money::from_major_minor(3_500, 0));
//! assert_eq!(totals.total, Money::from_major_minor(38_500, 0));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod invoice;
pub mod money;
pub mod status;
pub mod totals;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use invoice::{InvoiceGenerator, SequenceInvoiceGenerator};
pub use money::Money;
pub use status::{next_statuses, plan_transition, Transition};
pub use totals::{compute_totals, Totals};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Tax applied to every sale: 10%.
pub const DEFAULT_TAX_RATE: TaxRate = TaxRate::from_bps(1000);

/// Loyalty points credited to a customer for each sale.
pub const LOYALTY_POINTS_PER_SALE: i64 = 10;

/// Maximum length of the free-text note on a sale.
pub const MAX_NOTES_LEN: usize = 500;
