//! # Inventory Store
//!
//! The only code that changes `products.current_stock`.
//!
//! ## Check-and-Decrement in One Statement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ❌ Read-modify-write (two cashiers can both see stock = 1)            │
//! │     SELECT current_stock ...        → 1                                │
//! │     UPDATE ... SET current_stock = 0                                   │
//! │                                                                         │
//! │  ✅ Conditional decrement (SQLite serializes writers)                  │
//! │     UPDATE products                                                    │
//! │        SET current_stock = current_stock - :qty                        │
//! │      WHERE id = :id AND is_active = 1 AND current_stock >= :qty        │
//! │                                                                         │
//! │     1 row  → Reserved                                                  │
//! │     0 rows → re-read on the same connection to say why                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every operation comes in two forms: a pool form for standalone use, and
//! an `_on` form that runs on a caller-held connection so reservations can
//! share the caller's transaction. The store applies each call exactly as
//! given; making a restore happen once is the caller's job.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};

/// Result of a reservation attempt that reached the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// Stock was decremented by the requested quantity.
    Reserved,
    /// Not enough stock; nothing changed.
    InsufficientStock { available: i64 },
    /// No product with that id.
    NotFound,
    /// Product exists but is deactivated.
    Inactive,
}

/// Conditional stock operations over the `products` table.
#[derive(Debug, Clone)]
pub struct InventoryStore {
    pool: SqlitePool,
}

impl InventoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        InventoryStore { pool }
    }

    /// Current stock for a product.
    ///
    /// ## Errors
    /// `DbError::NotFound` if the product does not exist.
    pub async fn get_available(&self, product_id: &str) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        Self::get_available_on(&mut conn, product_id).await
    }

    pub async fn get_available_on(conn: &mut SqliteConnection, product_id: &str) -> DbResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT current_stock FROM products WHERE id = ?1")
            .bind(product_id)
            .fetch_optional(conn)
            .await?
            .ok_or_else(|| DbError::not_found("Product", product_id))
    }

    /// Decrements stock by `quantity` if and only if enough is available.
    pub async fn try_reserve(&self, product_id: &str, quantity: i64) -> DbResult<ReserveOutcome> {
        let mut conn = self.pool.acquire().await?;
        Self::try_reserve_on(&mut conn, product_id, quantity).await
    }

    /// Connection form of [`try_reserve`](Self::try_reserve).
    ///
    /// Inside a transaction the decrement is undone by rollback.
    pub async fn try_reserve_on(
        conn: &mut SqliteConnection,
        product_id: &str,
        quantity: i64,
    ) -> DbResult<ReserveOutcome> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET current_stock = current_stock - ?2,
                updated_at = ?3
            WHERE id = ?1 AND is_active = 1 AND current_stock >= ?2
            "#,
        )
        .bind(product_id)
        .bind(quantity)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 1 {
            debug!(product_id = %product_id, quantity, "Stock reserved");
            return Ok(ReserveOutcome::Reserved);
        }

        // Nothing matched: find out which condition failed.
        let row: Option<(i64, bool)> =
            sqlx::query_as("SELECT current_stock, is_active FROM products WHERE id = ?1")
                .bind(product_id)
                .fetch_optional(&mut *conn)
                .await?;

        let outcome = match row {
            None => ReserveOutcome::NotFound,
            Some((_, false)) => ReserveOutcome::Inactive,
            Some((available, true)) => ReserveOutcome::InsufficientStock { available },
        };

        debug!(product_id = %product_id, quantity, ?outcome, "Stock reservation refused");
        Ok(outcome)
    }

    /// Adds `quantity` back to a product's stock.
    ///
    /// Works on inactive products too: returned goods go back on the shelf
    /// whether or not the product is still sold.
    pub async fn restore(&self, product_id: &str, quantity: i64) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        Self::restore_on(&mut conn, product_id, quantity).await
    }

    pub async fn restore_on(
        conn: &mut SqliteConnection,
        product_id: &str,
        quantity: i64,
    ) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE products SET current_stock = current_stock + ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(product_id)
        .bind(quantity)
        .bind(Utc::now())
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", product_id));
        }

        debug!(product_id = %product_id, quantity, "Stock restored");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
