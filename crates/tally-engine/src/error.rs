//! # Sale Engine Error Types
//!
//! Every failure the engine can report, grouped so callers can decide what
//! to do without parsing messages.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │   Validation    │  │ InventoryConflict│  │     StateMachine       │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Validation     │  │  InsufficientStock│ │  InvalidTransition     │ │
//! │  │  InvalidPayment │  │  ProductNotFound │  │                         │ │
//! │  │  DiscountExceeds│  │  ProductInactive │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌───────────────────────────────────────────────┐ │
//! │  │    NotFound     │  │               Infrastructure                  │ │
//! │  │                 │  │                                               │ │
//! │  │  NotFound       │  │  DuplicateInvoice   Timeout   Storage         │ │
//! │  └─────────────────┘  └───────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only infrastructure errors can be retryable, and only some of them:
//! see [`SaleError::is_retryable`].

use std::time::Duration;

use thiserror::Error;

use tally_core::{CoreError, Money, SaleStatus, ValidationError};
use tally_db::DbError;

/// Result type alias for engine operations.
pub type SaleResult<T> = Result<T, SaleError>;

/// Coarse classification of a [`SaleError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request itself is wrong; resubmitting it unchanged fails again.
    Validation,
    /// Stock or catalog state prevents the sale.
    InventoryConflict,
    /// The sale is not in a status that allows the requested change.
    StateMachine,
    /// The sale does not exist.
    NotFound,
    /// Storage, timeouts, identifier collisions.
    Infrastructure,
}

/// Sale engine error type.
#[derive(Debug, Error)]
pub enum SaleError {
    // =========================================================================
    // Validation Errors
    // =========================================================================
    /// Input failed validation before any storage was touched.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Payment method is not one of cash, card, ewallet, other.
    #[error("Invalid payment method: {0}")]
    InvalidPaymentMethod(String),

    /// Discount larger than subtotal plus tax.
    #[error("Discount {discount} exceeds sale amount {gross}")]
    DiscountExceedsTotal { discount: Money, gross: Money },

    // =========================================================================
    // Inventory Conflicts
    // =========================================================================
    /// Not enough stock for one of the lines.
    ///
    /// ## When This Occurs
    /// - Another sale took the last units first
    /// - The cart asks for more than is on the shelf
    #[error("Insufficient stock for product {product_id}: {available} available, {requested} requested")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Product is inactive: {0}")]
    ProductInactive(String),

    // =========================================================================
    // State Machine / Lookup
    // =========================================================================
    /// The sale's current status has no edge to the requested one.
    ///
    /// ## When This Occurs
    /// - Refunding a pending sale, cancelling a completed one
    /// - Any change out of `cancelled` or `refunded`
    /// - A concurrent request changed the status first
    #[error("Cannot transition sale {sale_id} from {from} to {to}")]
    InvalidTransition {
        sale_id: String,
        from: SaleStatus,
        to: SaleStatus,
    },

    #[error("Sale not found: {0}")]
    NotFound(String),

    // =========================================================================
    // Infrastructure Errors
    // =========================================================================
    /// The generated invoice number is already taken. Nothing was written.
    #[error("Invoice number already exists: {0}")]
    DuplicateInvoice(String),

    /// The operation did not finish within the configured timeout.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The database failed underneath the engine.
    #[error("Storage error ({context}): {source}")]
    Storage {
        context: String,
        #[source]
        source: DbError,
    },
}

impl SaleError {
    /// Wraps a database error with the id of what was being worked on.
    pub fn storage(context: impl Into<String>, source: DbError) -> Self {
        SaleError::Storage {
            context: context.into(),
            source,
        }
    }

    /// Which category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SaleError::Validation(_)
            | SaleError::InvalidPaymentMethod(_)
            | SaleError::DiscountExceedsTotal { .. } => ErrorKind::Validation,
            SaleError::InsufficientStock { .. }
            | SaleError::ProductNotFound(_)
            | SaleError::ProductInactive(_) => ErrorKind::InventoryConflict,
            SaleError::InvalidTransition { .. } => ErrorKind::StateMachine,
            SaleError::NotFound(_) => ErrorKind::NotFound,
            SaleError::DuplicateInvoice(_) | SaleError::Timeout(_) | SaleError::Storage { .. } => {
                ErrorKind::Infrastructure
            }
        }
    }

    /// True if retrying the same request may succeed.
    ///
    /// A retried create draws a fresh invoice number, so a duplicate invoice
    /// counts as retryable. Storage errors are retryable only when the
    /// database reported contention or a lost connection.
    pub fn is_retryable(&self) -> bool {
        match self {
            SaleError::Timeout(_) | SaleError::DuplicateInvoice(_) => true,
            SaleError::Storage { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}

/// Maps pure-core failures onto engine errors.
///
/// `CoreError` carries no sale id, so a mapped `InvalidTransition` has an
/// empty one; the engine builds that variant itself where it knows the id.
impl From<CoreError> for SaleError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(v) => SaleError::Validation(v),
            CoreError::InvalidPaymentMethod(method) => SaleError::InvalidPaymentMethod(method),
            CoreError::DiscountExceedsTotal { discount, gross } => {
                SaleError::DiscountExceedsTotal { discount, gross }
            }
            CoreError::InvalidTransition { from, to } => SaleError::InvalidTransition {
                sale_id: String::new(),
                from,
                to,
            },
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
