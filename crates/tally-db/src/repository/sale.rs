//! # Sale Repository
//!
//! Database operations for sales and sale items.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  1. RECORD (inside the engine's transaction)                           │
//! │     └── insert_with_items_on() → sale row + every item row             │
//! │                                                                         │
//! │  2. TRANSITION (compare-and-swap on status)                            │
//! │     └── transition_status_on(id, expected, new)                        │
//! │         UPDATE sales SET status = new WHERE id = ? AND status = expected│
//! │         1 row → this caller won; 0 rows → someone else moved it first  │
//! │                                                                         │
//! │  3. READ                                                               │
//! │     └── get_by_id() / get_by_invoice_number() / list()                 │
//! │                                                                         │
//! │  Rows are never deleted and never updated beyond status/updated_at.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use tracing::debug;

use crate::error::DbResult;
use tally_core::{PaymentMethod, Sale, SaleItem, SaleStatus};

const SALE_COLUMNS: &str = "id, user_id, customer_id, invoice_number, \
     subtotal_cents, tax_cents, discount_cents, total_cents, \
     payment_method, status, notes, created_at, updated_at";

const ITEM_COLUMNS: &str = "id, sale_id, product_id, product_name, \
     unit_price_cents, quantity, subtotal_cents, line_no, created_at";

// =============================================================================
// Query Types
// =============================================================================

/// Filters for [`SaleRepository::list`]. `None` means "any".
#[derive(Debug, Clone, Default)]
pub struct SaleQuery {
    pub user_id: Option<String>,
    pub customer_id: Option<String>,
    pub status: Option<SaleStatus>,
    pub payment_method: Option<PaymentMethod>,
    /// Inclusive lower bound on `created_at`.
    pub date_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`.
    pub date_to: Option<DateTime<Utc>>,
}

/// Sortable columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaleSort {
    #[default]
    CreatedAt,
    TotalAmount,
    InvoiceNumber,
}

impl SaleSort {
    fn column(&self) -> &'static str {
        match self {
            SaleSort::CreatedAt => "created_at",
            SaleSort::TotalAmount => "total_cents",
            SaleSort::InvoiceNumber => "invoice_number",
        }
    }
}

/// Page window and ordering for [`SaleRepository::list`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SalePage {
    pub limit: u32,
    pub offset: u32,
    pub sort: SaleSort,
    pub descending: bool,
}

impl Default for SalePage {
    fn default() -> Self {
        SalePage {
            limit: 10,
            offset: 0,
            sort: SaleSort::CreatedAt,
            descending: true,
        }
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Inserts a sale and all of its items on the caller's connection.
    ///
    /// ## Errors
    /// `DbError::UniqueViolation { field: "sales.invoice_number", .. }` if
    /// the invoice number is already taken.
    pub async fn insert_with_items_on(
        conn: &mut SqliteConnection,
        sale: &Sale,
        items: &[SaleItem],
    ) -> DbResult<()> {
        debug!(id = %sale.id, invoice_number = %sale.invoice_number, items = items.len(), "Inserting sale");

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, user_id, customer_id, invoice_number,
                subtotal_cents, tax_cents, discount_cents, total_cents,
                payment_method, status, notes,
                created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4,
                ?5, ?6, ?7, ?8,
                ?9, ?10, ?11,
                ?12, ?13
            )
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.user_id)
        .bind(&sale.customer_id)
        .bind(&sale.invoice_number)
        .bind(sale.subtotal_cents)
        .bind(sale.tax_cents)
        .bind(sale.discount_cents)
        .bind(sale.total_cents)
        .bind(sale.payment_method)
        .bind(sale.status)
        .bind(&sale.notes)
        .bind(sale.created_at)
        .bind(sale.updated_at)
        .execute(&mut *conn)
        .await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO sale_items (
                    id, sale_id, product_id, product_name,
                    unit_price_cents, quantity, subtotal_cents,
                    line_no, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(&item.id)
            .bind(&item.sale_id)
            .bind(&item.product_id)
            .bind(&item.product_name)
            .bind(item.unit_price_cents)
            .bind(item.quantity)
            .bind(item.subtotal_cents)
            .bind(item.line_no)
            .bind(item.created_at)
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }

    /// Gets a sale by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_by_id_on(&mut conn, id).await
    }

    pub async fn get_by_id_on(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>(&format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(conn)
        .await?;

        Ok(sale)
    }

    /// Gets a sale by its invoice number.
    pub async fn get_by_invoice_number(&self, invoice_number: &str) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>(&format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE invoice_number = ?1"
        ))
        .bind(invoice_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(sale)
    }

    /// Gets all items for a sale, in cart order.
    pub async fn get_items(&self, sale_id: &str) -> DbResult<Vec<SaleItem>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_items_on(&mut conn, sale_id).await
    }

    pub async fn get_items_on(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Vec<SaleItem>> {
        let items = sqlx::query_as::<_, SaleItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM sale_items WHERE sale_id = ?1 ORDER BY line_no"
        ))
        .bind(sale_id)
        .fetch_all(conn)
        .await?;

        Ok(items)
    }

    /// Gets the items of several sales in one query, grouped by sale id.
    pub async fn get_items_for(&self, sale_ids: &[String]) -> DbResult<HashMap<String, Vec<SaleItem>>> {
        let mut grouped: HashMap<String, Vec<SaleItem>> = HashMap::new();
        if sale_ids.is_empty() {
            return Ok(grouped);
        }

        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {ITEM_COLUMNS} FROM sale_items WHERE sale_id IN ("
        ));
        let mut ids = qb.separated(", ");
        for id in sale_ids {
            ids.push_bind(id.clone());
        }
        ids.push_unseparated(") ORDER BY sale_id, line_no");

        let items = qb.build_query_as::<SaleItem>().fetch_all(&self.pool).await?;
        for item in items {
            grouped.entry(item.sale_id.clone()).or_default().push(item);
        }

        Ok(grouped)
    }

    /// Current status of a sale, read on the caller's connection.
    pub async fn get_status_on(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<SaleStatus>> {
        let status = sqlx::query_scalar::<_, SaleStatus>("SELECT status FROM sales WHERE id = ?1")
            .bind(id)
            .fetch_optional(conn)
            .await?;

        Ok(status)
    }

    /// Moves a sale from `expected` to `new_status`, only if it is still in
    /// `expected`.
    ///
    /// ## Returns
    /// * `Ok(true)` - this call performed the transition
    /// * `Ok(false)` - the sale is missing or no longer in `expected`
    pub async fn transition_status_on(
        conn: &mut SqliteConnection,
        id: &str,
        expected: SaleStatus,
        new_status: SaleStatus,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE sales SET status = ?3, updated_at = ?4 WHERE id = ?1 AND status = ?2",
        )
        .bind(id)
        .bind(expected)
        .bind(new_status)
        .bind(now)
        .execute(conn)
        .await?;

        let won = result.rows_affected() == 1;
        debug!(id = %id, from = %expected, to = %new_status, won, "Sale status compare-and-swap");
        Ok(won)
    }

    /// Lists sales matching `query`, returning one page plus the total match
    /// count.
    pub async fn list(&self, query: &SaleQuery, page: &SalePage) -> DbResult<(Vec<Sale>, i64)> {
        let mut count_qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM sales WHERE 1 = 1");
        push_filters(&mut count_qb, query);
        let total: i64 = count_qb.build_query_scalar().fetch_one(&self.pool).await?;

        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {SALE_COLUMNS} FROM sales WHERE 1 = 1"));
        push_filters(&mut qb, query);

        let direction = if page.descending { "DESC" } else { "ASC" };
        qb.push(format!(
            " ORDER BY {col} {dir}, id {dir} LIMIT ",
            col = page.sort.column(),
            dir = direction
        ));
        qb.push_bind(i64::from(page.limit));
        qb.push(" OFFSET ");
        qb.push_bind(i64::from(page.offset));

        let sales = qb.build_query_as::<Sale>().fetch_all(&self.pool).await?;

        debug!(count = sales.len(), total, "Listed sales");
        Ok((sales, total))
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, query: &SaleQuery) {
    if let Some(user_id) = &query.user_id {
        qb.push(" AND user_id = ").push_bind(user_id.clone());
    }
    if let Some(customer_id) = &query.customer_id {
        qb.push(" AND customer_id = ").push_bind(customer_id.clone());
    }
    if let Some(status) = query.status {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(method) = query.payment_method {
        qb.push(" AND payment_method = ").push_bind(method);
    }
    if let Some(from) = query.date_from {
        qb.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = query.date_to {
        qb.push(" AND created_at <= ").push_bind(to);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
