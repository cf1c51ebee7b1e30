//! # Sale Status Transitions
//!
//! The table of legal status changes and which of them give stock back.
//!
//! ```text
//!                 ┌──────────────┐
//!      create ───►│   pending    │──── cancel ────► cancelled  (restock)
//!                 └──────┬───────┘
//!                        │ complete
//!                        ▼
//!      create ───►┌──────────────┐
//!     (default)   │  completed   │──── refund ────► refunded   (restock)
//!                 └──────────────┘
//! ```
//!
//! `cancelled` and `refunded` are terminal. Self transitions are rejected.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::SaleStatus;

/// An approved status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: SaleStatus,
    pub to: SaleStatus,
    /// Every line item's quantity goes back to inventory.
    pub restores_stock: bool,
}

/// Checks `from → to` against the transition table.
///
/// ## Example
/// ```rust
/// use tally_core::{plan_transition, SaleStatus};
///
/// let t = plan_transition(SaleStatus::Completed, SaleStatus::Refunded).unwrap();
/// assert!(t.restores_stock);
///
/// assert!(plan_transition(SaleStatus::Completed, SaleStatus::Pending).is_err());
/// ```
pub fn plan_transition(from: SaleStatus, to: SaleStatus) -> CoreResult<Transition> {
    use SaleStatus::*;

    let restores_stock = match (from, to) {
        (Pending, Completed) => false,
        (Pending, Cancelled) => true,
        (Completed, Refunded) => true,
        _ => return Err(CoreError::InvalidTransition { from, to }),
    };

    Ok(Transition {
        from,
        to,
        restores_stock,
    })
}

/// Statuses reachable in one step from `from`.
pub fn next_statuses(from: SaleStatus) -> Vec<SaleStatus> {
    SaleStatus::ALL
        .into_iter()
        .filter(|&to| plan_transition(from, to).is_ok())
        .collect()
}
