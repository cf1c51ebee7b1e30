//! # Totals Calculator
//!
//! Pure calculation of a sale's subtotal, tax and total from its lines.
//!
//! ## Calculation Order
//! ```text
//! lines [(unit, qty), ...]
//!      │
//!      ▼
//! subtotal = Σ unit × qty            (exact, integer cents)
//!      │
//!      ▼
//! tax      = subtotal × rate         (half-up to the cent)
//!      │
//!      ▼
//! total    = subtotal + tax − discount
//!      │
//!      └── discount > subtotal + tax  → DiscountExceedsTotal (never clamped)
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::TaxRate;

/// Monetary breakdown of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: Money,
    pub tax: Money,
    pub discount: Money,
    pub total: Money,
}

/// Computes the totals for a cart.
///
/// ## Arguments
/// * `lines` - `(unit price, quantity)` pairs in cart order
/// * `tax_rate` - applied to the whole subtotal
/// * `discount` - flat amount subtracted after tax
///
/// ## Errors
/// - `Validation` for a non-positive quantity, a negative price or discount,
///   or a cart whose amounts overflow
/// - `DiscountExceedsTotal` when the discount would make the total negative
///
/// ## Example
/// ```rust
/// use tally_core::{compute_totals, Money, TaxRate};
///
/// let totals = compute_totals(
///     &[(Money::from_cents(1000), 1)],
///     TaxRate::from_bps(1000),
///     Money::from_cents(100),
/// ).unwrap();
/// assert_eq!(totals.total, Money::from_cents(1000));
/// ```
pub fn compute_totals(
    lines: &[(Money, i64)],
    tax_rate: TaxRate,
    discount: Money,
) -> CoreResult<Totals> {
    if discount.is_negative() {
        return Err(ValidationError::Negative {
            field: "discount_amount".to_string(),
        }
        .into());
    }

    let mut subtotal = Money::zero();
    for &(unit_price, quantity) in lines {
        if quantity <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "quantity".to_string(),
            }
            .into());
        }
        if unit_price.is_negative() {
            return Err(ValidationError::Negative {
                field: "unit_price".to_string(),
            }
            .into());
        }

        subtotal = unit_price
            .checked_mul_quantity(quantity)
            .and_then(|line| subtotal.checked_add(line))
            .ok_or_else(overflow)?;
    }

    let tax = subtotal.calculate_tax(tax_rate);
    let gross = subtotal.checked_add(tax).ok_or_else(overflow)?;

    if discount > gross {
        return Err(CoreError::DiscountExceedsTotal { discount, gross });
    }

    Ok(Totals {
        subtotal,
        tax,
        discount,
        total: gross.checked_sub(discount).ok_or_else(overflow)?,
    })
}

fn overflow() -> CoreError {
    ValidationError::InvalidFormat {
        field: "items".to_string(),
        reason: "sale amount is too large".to_string(),
    }
    .into()
}

// =============================================================================
// Unit Tests
// =============================================================================
