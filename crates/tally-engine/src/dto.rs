//! # Wire Types
//!
//! What clients send to and receive from the engine.
//!
//! ## Money on the Wire
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Client JSON               Engine                 Storage               │
//! │  ───────────               ──────                 ───────               │
//! │  "discount_amount": 5.5 ─► Decimal ─► Money(550) ─► discount_cents 550 │
//! │                                                                         │
//! │  "total_amount": 38.5   ◄─ Decimal ◄─ Money(3850) ◄─ total_cents 3850  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Amounts arrive as JSON numbers or strings and are rounded half-up to the
//! cent. Amounts leave as JSON numbers with at most two decimals.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use tally_core::{PaymentMethod, Sale, SaleItem, SaleStatus};
use tally_db::{SalePage, SaleQuery, SaleSort};

/// Largest page a caller may ask for.
pub const MAX_PER_PAGE: u32 = 100;

/// Page size when none (or nonsense) is given.
pub const DEFAULT_PER_PAGE: u32 = 10;

// =============================================================================
// Requests
// =============================================================================

/// One cart line as submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleLineRequest {
    pub product_id: String,
    pub quantity: i64,
}

/// Input of [`SaleEngine::create_sale`](crate::SaleEngine::create_sale).
///
/// ## JSON
/// ```json
/// {
///   "customer_id": "c-42",
///   "payment_method": "cash",
///   "discount_amount": 5.00,
///   "notes": "birthday promo",
///   "items": [
///     { "product_id": "p-1", "quantity": 2 },
///     { "product_id": "p-2", "quantity": 3 }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CreateSaleRequest {
    #[serde(default)]
    pub customer_id: Option<String>,

    /// `cash`, `card`, `ewallet` or `other` (a few aliases are accepted).
    pub payment_method: String,

    #[serde(default)]
    #[ts(type = "number")]
    pub discount_amount: Decimal,

    #[serde(default)]
    pub notes: Option<String>,

    /// `pending` opens a held sale; anything but `pending` or `completed`
    /// is rejected. Defaults to `completed`.
    #[serde(default)]
    pub initial_status: Option<SaleStatus>,

    pub items: Vec<SaleLineRequest>,
}

/// Body of a status change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UpdateStatusRequest {
    pub status: SaleStatus,
}

// =============================================================================
// Responses
// =============================================================================

/// A sale as returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleDto {
    pub id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    pub invoice_number: String,
    #[serde(with = "rust_decimal::serde::float")]
    #[ts(type = "number")]
    pub subtotal: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    #[ts(type = "number")]
    pub tax_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    #[ts(type = "number")]
    pub discount_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    #[ts(type = "number")]
    pub total_amount: Decimal,
    pub payment_method: PaymentMethod,
    pub status: SaleStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    pub items: Vec<SaleItemDto>,
}

/// A line item as returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleItemDto {
    pub id: String,
    pub product_id: String,
    pub product_name: String,
    #[serde(with = "rust_decimal::serde::float")]
    #[ts(type = "number")]
    pub unit_price: Decimal,
    pub quantity: i64,
    #[serde(with = "rust_decimal::serde::float")]
    #[ts(type = "number")]
    pub subtotal: Decimal,
}

impl SaleDto {
    /// Builds the wire form of a stored sale. `items` are expected in cart
    /// order.
    pub fn from_parts(sale: Sale, items: Vec<SaleItem>) -> Self {
        SaleDto {
            subtotal: sale.subtotal().to_decimal(),
            tax_amount: sale.tax().to_decimal(),
            discount_amount: sale.discount().to_decimal(),
            total_amount: sale.total().to_decimal(),
            id: sale.id,
            user_id: sale.user_id,
            customer_id: sale.customer_id,
            invoice_number: sale.invoice_number,
            payment_method: sale.payment_method,
            status: sale.status,
            notes: sale.notes,
            created_at: sale.created_at,
            updated_at: sale.updated_at,
            items: items.into_iter().map(SaleItemDto::from).collect(),
        }
    }
}

impl From<SaleItem> for SaleItemDto {
    fn from(item: SaleItem) -> Self {
        SaleItemDto {
            unit_price: item.unit_price().to_decimal(),
            subtotal: item.subtotal().to_decimal(),
            id: item.id,
            product_id: item.product_id,
            product_name: item.product_name,
            quantity: item.quantity,
        }
    }
}

// =============================================================================
// Listing
// =============================================================================

/// Filters for [`SaleEngine::list_sales`](crate::SaleEngine::list_sales).
/// `None` means "any".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaleFilter {
    pub user_id: Option<String>,
    pub customer_id: Option<String>,
    pub status: Option<SaleStatus>,
    pub payment_method: Option<PaymentMethod>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

impl From<&SaleFilter> for SaleQuery {
    fn from(filter: &SaleFilter) -> Self {
        SaleQuery {
            user_id: filter.user_id.clone(),
            customer_id: filter.customer_id.clone(),
            status: filter.status,
            payment_method: filter.payment_method,
            date_from: filter.date_from,
            date_to: filter.date_to,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    CreatedAt,
    TotalAmount,
    InvoiceNumber,
}

impl SortField {
    /// Parses a query-string value; unknown fields yield `None`.
    pub fn from_param(s: &str) -> Option<Self> {
        match s.trim() {
            "created_at" => Some(SortField::CreatedAt),
            "total_amount" => Some(SortField::TotalAmount),
            "invoice_number" => Some(SortField::InvoiceNumber),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn from_param(s: &str) -> Option<Self> {
        match s.trim() {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }
}

/// Which page of a listing to return, and in what order.
///
/// Out-of-range values are corrected rather than rejected:
/// ```text
/// page 0          → 1
/// per_page 0      → 10
/// per_page 500    → 100
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
    pub sort: SortField,
    pub order: SortOrder,
}

impl Default for Pagination {
    fn default() -> Self {
        Pagination {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
            sort: SortField::CreatedAt,
            order: SortOrder::Desc,
        }
    }
}

impl Pagination {
    /// Page `page` of `per_page` rows, newest first.
    pub fn new(page: u32, per_page: u32) -> Self {
        Pagination {
            page,
            per_page,
            ..Default::default()
        }
        .normalized()
    }

    pub fn sorted_by(mut self, sort: SortField, order: SortOrder) -> Self {
        self.sort = sort;
        self.order = order;
        self
    }

    /// Clamps page and page size into their legal ranges.
    pub fn normalized(self) -> Self {
        let per_page = match self.per_page {
            0 => DEFAULT_PER_PAGE,
            n => n.min(MAX_PER_PAGE),
        };
        Pagination {
            page: self.page.max(1),
            per_page,
            ..self
        }
    }

    /// Number of pages needed for `total` rows.
    pub fn total_pages(&self, total: i64) -> u32 {
        let per_page = i64::from(self.normalized().per_page);
        let pages = (total.max(0) + per_page - 1) / per_page;
        u32::try_from(pages).unwrap_or(u32::MAX)
    }

    pub(crate) fn to_page(self) -> SalePage {
        let p = self.normalized();
        SalePage {
            limit: p.per_page,
            offset: (p.page - 1).saturating_mul(p.per_page),
            sort: match p.sort {
                SortField::CreatedAt => SaleSort::CreatedAt,
                SortField::TotalAmount => SaleSort::TotalAmount,
                SortField::InvoiceNumber => SaleSort::InvoiceNumber,
            },
            descending: p.order == SortOrder::Desc,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_request_accepts_numbers_and_strings() {
        let req: CreateSaleRequest = serde_json::from_value(json!({
            "payment_method": "cash",
            "discount_amount": 5.5,
            "items": [{ "product_id": "p-1", "quantity": 2 }]
        }))
        .unwrap();
        assert_eq!(req.discount_amount, Decimal::new(55, 1));
        assert!(req.customer_id.is_none());
        assert!(req.initial_status.is_none());

        let req: CreateSaleRequest = serde_json::from_value(json!({
            "payment_method": "card",
            "discount_amount": "1.25",
            "initial_status": "pending",
            "items": []
        }))
        .unwrap();
        assert_eq!(req.discount_amount, Decimal::new(125, 2));
        assert_eq!(req.initial_status, Some(SaleStatus::Pending));
    }

    #[test]
    fn test_missing_discount_defaults_to_zero() {
        let req: CreateSaleRequest = serde_json::from_value(json!({
            "payment_method": "cash",
            "items": [{ "product_id": "p-1", "quantity": 1 }]
        }))
        .unwrap();
        assert!(req.discount_amount.is_zero());
    }

    #[test]
    fn test_sale_dto_serializes_money_as_numbers() {
        let now = Utc::now();
        let sale = Sale {
            id: "s-1".into(),
            user_id: "u-1".into(),
            customer_id: None,
            invoice_number: "INV-20250101-0000abcd".into(),
            subtotal_cents: 35000,
            tax_cents: 3500,
            discount_cents: 0,
            total_cents: 38500,
            payment_method: PaymentMethod::Cash,
            status: SaleStatus::Completed,
            notes: None,
            created_at: now,
            updated_at: now,
        };
        let item = SaleItem {
            id: "i-1".into(),
            sale_id: "s-1".into(),
            product_id: "p-1".into(),
            product_name: "Widget".into(),
            unit_price_cents: 1099,
            quantity: 2,
            subtotal_cents: 2198,
            line_no: 0,
            created_at: now,
        };

        let value = serde_json::to_value(SaleDto::from_parts(sale, vec![item])).unwrap();
        assert_eq!(value["subtotal"], json!(350.0));
        assert_eq!(value["tax_amount"], json!(35.0));
        assert_eq!(value["total_amount"], json!(385.0));
        assert_eq!(value["items"][0]["unit_price"], json!(10.99));
        assert_eq!(value["items"][0]["subtotal"], json!(21.98));
        assert_eq!(value["status"], json!("completed"));
        assert_eq!(value["payment_method"], json!("cash"));
        assert!(value.get("customer_id").is_none());
    }

    #[test]
    fn test_pagination_normalizes() {
        assert_eq!(Pagination::new(0, 0), Pagination::default());

        let p = Pagination::new(3, 500);
        assert_eq!(p.page, 3);
        assert_eq!(p.per_page, MAX_PER_PAGE);

        let page = p.to_page();
        assert_eq!(page.limit, 100);
        assert_eq!(page.offset, 200);
        assert!(page.descending);
    }

    #[test]
    fn test_pagination_sorting_and_total_pages() {
        let p = Pagination::new(1, 10).sorted_by(SortField::TotalAmount, SortOrder::Asc);
        let page = p.to_page();
        assert_eq!(page.sort, SaleSort::TotalAmount);
        assert!(!page.descending);

        assert_eq!(p.total_pages(0), 0);
        assert_eq!(p.total_pages(10), 1);
        assert_eq!(p.total_pages(11), 2);

        assert_eq!(SortField::from_param("invoice_number"), Some(SortField::InvoiceNumber));
        assert_eq!(SortField::from_param("id; DROP TABLE sales"), None);
        assert_eq!(SortOrder::from_param("asc"), Some(SortOrder::Asc));
        assert_eq!(SortOrder::from_param("sideways"), None);
    }
}
