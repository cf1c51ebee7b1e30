//! # Sale Engine
//!
//! Creates sales and moves them through their lifecycle, keeping inventory
//! in step with both.
//!
//! ## Creating a Sale
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        create_sale(actor, cart)                         │
//! │                                                                         │
//! │  validate ──✗──► Validation / InvalidPaymentMethod   (nothing touched)  │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  BEGIN                                                                  │
//! │     │                                                                   │
//! │     ├── for each line, by product id:                                   │
//! │     │     try_reserve_on ──✗──► InsufficientStock / ProductNotFound /   │
//! │     │                           ProductInactive          (ROLLBACK)     │
//! │     ├── snapshot name + price of every line                             │
//! │     ├── compute_totals ──✗──► DiscountExceedsTotal       (ROLLBACK)     │
//! │     ├── next invoice number                                             │
//! │     └── insert sale + items ──✗──► DuplicateInvoice      (ROLLBACK)     │
//! │     │                                                                   │
//! │  COMMIT            (outside the operation timeout)                      │
//! │     │                                                                   │
//! │     └── spawn: credit loyalty points (failures only logged)             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Changing Status
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     update_status(sale, new)                            │
//! │                                                                         │
//! │  load sale ──✗──► NotFound                                              │
//! │  plan_transition(current, new) ──✗──► InvalidTransition                 │
//! │  BEGIN                                                                  │
//! │     UPDATE sales SET status = new WHERE id = ? AND status = current     │
//! │        0 rows → someone else moved it first → InvalidTransition         │
//! │        1 row  → restore every line's quantity if the edge restores      │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only the request that wins the status update restores stock, so a
//! cancellation or refund puts each unit back exactly once.
//!
//! Every transaction starts with a write. SQLite then hands out the write
//! lock up front and concurrent writers queue on the busy timeout instead
//! of failing on a stale read snapshot.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use sqlx::{Sqlite, Transaction};
use tracing::{debug, info, warn};
use uuid::Uuid;

use tally_core::validation::{
    validate_cart_size, validate_discount_cents, validate_id, validate_notes, validate_quantity,
};
use tally_core::{
    compute_totals, plan_transition, InvoiceGenerator, Money, PaymentMethod, Sale, SaleItem,
    SaleStatus, SequenceInvoiceGenerator, Transition, ValidationError,
};
use tally_db::{
    Database, DbError, InventoryStore, ProductRepository, ReserveOutcome, SaleQuery,
    SaleRepository,
};

use crate::config::EngineConfig;
use crate::dto::{CreateSaleRequest, Pagination, SaleDto, SaleFilter, SaleLineRequest};
use crate::error::{SaleError, SaleResult};

/// The sale transaction engine.
///
/// Cheap to clone; clones share the database pool, configuration and
/// invoice generator.
///
/// ## Usage
/// ```rust,ignore
/// let engine = SaleEngine::new(db, EngineConfig::default())?;
///
/// let sale = engine.create_sale("cashier-1", request).await?;
/// let sale = engine.update_status(&sale.id, SaleStatus::Refunded).await?;
/// ```
#[derive(Clone)]
pub struct SaleEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    db: Database,
    config: EngineConfig,
    invoices: Arc<dyn InvoiceGenerator>,
}

/// A sale written inside an open transaction, waiting for commit.
struct StagedSale {
    tx: Transaction<'static, Sqlite>,
    record: Sale,
    items: Vec<SaleItem>,
}

/// A status change applied inside an open transaction, waiting for commit.
struct StagedTransition {
    tx: Transaction<'static, Sqlite>,
    sale: Sale,
    items: Vec<SaleItem>,
    transition: Transition,
}

/// A create request that passed validation.
struct ValidatedSale {
    user_id: String,
    customer_id: Option<String>,
    payment_method: PaymentMethod,
    discount: Money,
    notes: Option<String>,
    status: SaleStatus,
    lines: Vec<SaleLineRequest>,
}

impl SaleEngine {
    /// Creates an engine with the default invoice generator.
    pub fn new(db: Database, config: EngineConfig) -> SaleResult<Self> {
        Self::with_invoice_generator(db, config, Arc::new(SequenceInvoiceGenerator::new()))
    }

    /// Creates an engine that draws invoice numbers from `invoices`.
    pub fn with_invoice_generator(
        db: Database,
        config: EngineConfig,
        invoices: Arc<dyn InvoiceGenerator>,
    ) -> SaleResult<Self> {
        config.validate()?;
        Ok(SaleEngine {
            inner: Arc::new(EngineInner {
                db,
                config,
                invoices,
            }),
        })
    }

    pub fn database(&self) -> &Database {
        &self.inner.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    // =========================================================================
    // Public Operations
    // =========================================================================

    /// Records a sale for `actor_id` and takes its items out of stock.
    ///
    /// Either every line is reserved and the sale is stored, or nothing
    /// changes.
    ///
    /// The operation timeout covers everything before the commit. A commit
    /// that has started is awaited to its end, so `Timeout` always means
    /// nothing was written and a retry cannot sell twice.
    pub async fn create_sale(&self, actor_id: &str, request: CreateSaleRequest) -> SaleResult<SaleDto> {
        let staged = self
            .bounded("create_sale", self.stage_sale(actor_id, request))
            .await?;
        self.commit_sale(staged).await
    }

    /// Moves a sale to `new_status`, restoring stock on cancel and refund.
    ///
    /// Bounded like [`create_sale`](Self::create_sale): the commit runs
    /// outside the timeout.
    pub async fn update_status(&self, sale_id: &str, new_status: SaleStatus) -> SaleResult<SaleDto> {
        let staged = self
            .bounded("update_status", self.stage_transition(sale_id, new_status))
            .await?;
        self.commit_transition(staged).await
    }

    pub async fn get_sale(&self, sale_id: &str) -> SaleResult<SaleDto> {
        self.bounded("get_sale", async {
            let sales = self.inner.db.sales();
            let sale = sales
                .get_by_id(sale_id)
                .await
                .map_err(|e| SaleError::storage(format!("sale {sale_id}"), e))?
                .ok_or_else(|| SaleError::NotFound(sale_id.to_string()))?;
            self.with_items(sale).await
        })
        .await
    }

    pub async fn get_sale_by_invoice(&self, invoice_number: &str) -> SaleResult<SaleDto> {
        self.bounded("get_sale_by_invoice", async {
            let sale = self
                .inner
                .db
                .sales()
                .get_by_invoice_number(invoice_number)
                .await
                .map_err(|e| SaleError::storage(format!("invoice {invoice_number}"), e))?
                .ok_or_else(|| SaleError::NotFound(invoice_number.to_string()))?;
            self.with_items(sale).await
        })
        .await
    }

    /// One page of sales matching `filter`, plus the total number of matches.
    pub async fn list_sales(
        &self,
        filter: &SaleFilter,
        pagination: Pagination,
    ) -> SaleResult<(Vec<SaleDto>, i64)> {
        self.bounded("list_sales", async {
            let sales_repo = self.inner.db.sales();
            let (sales, total) = sales_repo
                .list(&SaleQuery::from(filter), &pagination.to_page())
                .await
                .map_err(|e| SaleError::storage("sale list", e))?;

            let ids: Vec<String> = sales.iter().map(|s| s.id.clone()).collect();
            let mut items = sales_repo
                .get_items_for(&ids)
                .await
                .map_err(|e| SaleError::storage("sale list items", e))?;

            let dtos = sales
                .into_iter()
                .map(|sale| {
                    let lines = items.remove(&sale.id).unwrap_or_default();
                    SaleDto::from_parts(sale, lines)
                })
                .collect();

            Ok((dtos, total))
        })
        .await
    }

    // =========================================================================
    // Create
    // =========================================================================

    async fn stage_sale(&self, actor_id: &str, request: CreateSaleRequest) -> SaleResult<StagedSale> {
        let sale = validate_request(actor_id, request)?;
        let sale_id = Uuid::new_v4().to_string();
        let context = format!("sale {sale_id}");

        debug!(sale_id = %sale_id, lines = sale.lines.len(), "Creating sale");

        let mut tx = self
            .inner
            .db
            .begin()
            .await
            .map_err(|e| SaleError::storage(&context, e))?;

        // Reserve in product id order, equal ids in cart order.
        let mut order: Vec<usize> = (0..sale.lines.len()).collect();
        order.sort_by(|&a, &b| sale.lines[a].product_id.cmp(&sale.lines[b].product_id));

        for &index in &order {
            let line = &sale.lines[index];
            let outcome = InventoryStore::try_reserve_on(&mut tx, &line.product_id, line.quantity)
                .await
                .map_err(|e| SaleError::storage(format!("product {}", line.product_id), e))?;

            match outcome {
                ReserveOutcome::Reserved => {}
                ReserveOutcome::InsufficientStock { available } => {
                    return Err(SaleError::InsufficientStock {
                        product_id: line.product_id.clone(),
                        available,
                        requested: line.quantity,
                    });
                }
                ReserveOutcome::NotFound => {
                    return Err(SaleError::ProductNotFound(line.product_id.clone()));
                }
                ReserveOutcome::Inactive => {
                    return Err(SaleError::ProductInactive(line.product_id.clone()));
                }
            }
        }

        let mut priced = Vec::with_capacity(sale.lines.len());
        let mut names = Vec::with_capacity(sale.lines.len());
        for line in &sale.lines {
            let product = ProductRepository::get_by_id_on(&mut tx, &line.product_id)
                .await
                .map_err(|e| SaleError::storage(format!("product {}", line.product_id), e))?
                .ok_or_else(|| SaleError::ProductNotFound(line.product_id.clone()))?;
            priced.push((product.price(), line.quantity));
            names.push(product.name);
        }

        let totals = compute_totals(&priced, self.inner.config.tax_rate, sale.discount)?;

        let now = Utc::now();
        let invoice_number = self.inner.invoices.next_invoice_number(now);

        let mut items = Vec::with_capacity(sale.lines.len());
        for (line_no, ((line, (price, quantity)), name)) in
            sale.lines.iter().zip(&priced).zip(names).enumerate()
        {
            let subtotal = price.checked_mul_quantity(*quantity).ok_or_else(|| {
                SaleError::Validation(ValidationError::InvalidFormat {
                    field: "items".to_string(),
                    reason: "amount overflow".to_string(),
                })
            })?;
            items.push(SaleItem {
                id: Uuid::new_v4().to_string(),
                sale_id: sale_id.clone(),
                product_id: line.product_id.clone(),
                product_name: name,
                unit_price_cents: price.cents(),
                quantity: *quantity,
                subtotal_cents: subtotal.cents(),
                line_no: line_no as i64,
                created_at: now,
            });
        }

        let record = Sale {
            id: sale_id.clone(),
            user_id: sale.user_id,
            customer_id: sale.customer_id,
            invoice_number: invoice_number.clone(),
            subtotal_cents: totals.subtotal.cents(),
            tax_cents: totals.tax.cents(),
            discount_cents: totals.discount.cents(),
            total_cents: totals.total.cents(),
            payment_method: sale.payment_method,
            status: sale.status,
            notes: sale.notes,
            created_at: now,
            updated_at: now,
        };

        SaleRepository::insert_with_items_on(&mut tx, &record, &items)
            .await
            .map_err(|e| {
                if e.is_unique_violation_on("sales.invoice_number") {
                    warn!(invoice_number = %invoice_number, "Invoice number collision");
                    SaleError::DuplicateInvoice(invoice_number.clone())
                } else {
                    SaleError::storage(&context, e)
                }
            })?;

        Ok(StagedSale { tx, record, items })
    }

    async fn commit_sale(&self, staged: StagedSale) -> SaleResult<SaleDto> {
        let StagedSale { tx, record, items } = staged;
        tx.commit()
            .await
            .map_err(|e| SaleError::storage(format!("sale {}", record.id), DbError::from(e)))?;

        info!(
            sale_id = %record.id,
            invoice_number = %record.invoice_number,
            status = %record.status,
            total_cents = record.total_cents,
            items = items.len(),
            "Sale created"
        );

        if let Some(customer_id) = &record.customer_id {
            self.spawn_loyalty_credit(customer_id.clone(), record.id.clone());
        }

        Ok(SaleDto::from_parts(record, items))
    }

    /// Credits loyalty points in the background. The sale is already
    /// committed; a failure here is logged and dropped.
    fn spawn_loyalty_credit(&self, customer_id: String, sale_id: String) {
        let points = self.inner.config.loyalty_points_per_sale;
        if points == 0 {
            return;
        }

        let customers = self.inner.db.customers();
        tokio::spawn(async move {
            match customers.add_loyalty_points(&customer_id, points).await {
                Ok(()) => debug!(customer_id = %customer_id, sale_id = %sale_id, points, "Loyalty points credited"),
                Err(e) => warn!(
                    customer_id = %customer_id,
                    sale_id = %sale_id,
                    error = %e,
                    "Failed to credit loyalty points"
                ),
            }
        });
    }

    // =========================================================================
    // Status
    // =========================================================================

    async fn stage_transition(
        &self,
        sale_id: &str,
        new_status: SaleStatus,
    ) -> SaleResult<StagedTransition> {
        let context = format!("sale {sale_id}");

        let sale = self
            .inner
            .db
            .sales()
            .get_by_id(sale_id)
            .await
            .map_err(|e| SaleError::storage(&context, e))?
            .ok_or_else(|| SaleError::NotFound(sale_id.to_string()))?;

        let transition = plan_transition(sale.status, new_status).map_err(|_| {
            warn!(sale_id = %sale_id, from = %sale.status, to = %new_status, "Rejected status change");
            SaleError::InvalidTransition {
                sale_id: sale_id.to_string(),
                from: sale.status,
                to: new_status,
            }
        })?;

        let now = Utc::now();
        let mut tx = self
            .inner
            .db
            .begin()
            .await
            .map_err(|e| SaleError::storage(&context, e))?;

        let won = SaleRepository::transition_status_on(&mut tx, sale_id, transition.from, transition.to, now)
            .await
            .map_err(|e| SaleError::storage(&context, e))?;

        if !won {
            let current = SaleRepository::get_status_on(&mut tx, sale_id)
                .await
                .map_err(|e| SaleError::storage(&context, e))?
                .ok_or_else(|| SaleError::NotFound(sale_id.to_string()))?;
            warn!(sale_id = %sale_id, current = %current, to = %new_status, "Lost status race");
            return Err(SaleError::InvalidTransition {
                sale_id: sale_id.to_string(),
                from: current,
                to: new_status,
            });
        }

        let items = SaleRepository::get_items_on(&mut tx, sale_id)
            .await
            .map_err(|e| SaleError::storage(&context, e))?;

        if transition.restores_stock {
            let mut restores: Vec<&SaleItem> = items.iter().collect();
            restores.sort_by(|a, b| a.product_id.cmp(&b.product_id));
            for item in restores {
                InventoryStore::restore_on(&mut tx, &item.product_id, item.quantity)
                    .await
                    .map_err(|e| SaleError::storage(format!("product {}", item.product_id), e))?;
            }
        }

        Ok(StagedTransition {
            tx,
            sale: Sale {
                status: transition.to,
                updated_at: now,
                ..sale
            },
            items,
            transition,
        })
    }

    async fn commit_transition(&self, staged: StagedTransition) -> SaleResult<SaleDto> {
        let StagedTransition {
            tx,
            sale,
            items,
            transition,
        } = staged;
        tx.commit()
            .await
            .map_err(|e| SaleError::storage(format!("sale {}", sale.id), DbError::from(e)))?;

        info!(
            sale_id = %sale.id,
            from = %transition.from,
            to = %transition.to,
            restored = transition.restores_stock,
            "Sale status changed"
        );

        Ok(SaleDto::from_parts(sale, items))
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn with_items(&self, sale: Sale) -> SaleResult<SaleDto> {
        let items = self
            .inner
            .db
            .sales()
            .get_items(&sale.id)
            .await
            .map_err(|e| SaleError::storage(format!("sale {}", sale.id), e))?;
        Ok(SaleDto::from_parts(sale, items))
    }

    /// Runs `operation` under the configured timeout. An expired operation
    /// is dropped, which rolls back any open transaction.
    async fn bounded<T>(
        &self,
        name: &'static str,
        operation: impl Future<Output = SaleResult<T>>,
    ) -> SaleResult<T> {
        let limit = self.inner.config.operation_timeout;
        match tokio::time::timeout(limit, operation).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation = name, timeout_ms = limit.as_millis() as u64, "Operation timed out");
                Err(SaleError::Timeout(limit))
            }
        }
    }
}

impl std::fmt::Debug for SaleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaleEngine")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Validation
// =============================================================================

fn validate_request(actor_id: &str, request: CreateSaleRequest) -> SaleResult<ValidatedSale> {
    validate_cart_size(request.items.len())?;
    for line in &request.items {
        validate_quantity(line.quantity)?;
        validate_id("product_id", &line.product_id)?;
    }

    let payment_method: PaymentMethod = request
        .payment_method
        .parse()
        .map_err(|_| SaleError::InvalidPaymentMethod(request.payment_method.clone()))?;

    let discount = Money::from_decimal(request.discount_amount).ok_or_else(|| {
        ValidationError::InvalidFormat {
            field: "discount_amount".to_string(),
            reason: "amount out of range".to_string(),
        }
    })?;
    validate_discount_cents(discount.cents())?;

    let notes = request.notes.filter(|n| !n.trim().is_empty());
    if let Some(notes) = &notes {
        validate_notes(notes)?;
    }

    validate_id("user_id", actor_id)?;

    let customer_id = request.customer_id.filter(|c| !c.trim().is_empty());
    if let Some(customer_id) = &customer_id {
        validate_id("customer_id", customer_id)?;
    }

    let status = match request.initial_status {
        None => SaleStatus::Completed,
        Some(status @ (SaleStatus::Pending | SaleStatus::Completed)) => status,
        Some(_) => {
            return Err(ValidationError::NotAllowed {
                field: "initial_status".to_string(),
                allowed: vec!["pending".to_string(), "completed".to_string()],
            }
            .into())
        }
    };

    Ok(ValidatedSale {
        user_id: actor_id.to_string(),
        customer_id,
        payment_method,
        discount,
        notes,
        status,
        lines: request.items,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::{SortField, SortOrder};
    use crate::error::ErrorKind;
    use crate::test_support::*;
    use chrono::DateTime;
    use rust_decimal::Decimal;
    use std::collections::HashSet;
    use std::time::Duration;

    // -------------------------------------------------------------------------
    // Create
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_create_sale_totals_and_snapshots() {
        let engine = memory_engine().await;
        seed_product(engine.database(), "p-1", 10_000, 10).await;
        seed_product(engine.database(), "p-2", 5_000, 10).await;

        let sale = engine
            .create_sale("cashier-1", request(&[("p-2", 3), ("p-1", 2)]))
            .await
            .unwrap();

        assert_eq!(sale.subtotal, Decimal::new(35_000, 2));
        assert_eq!(sale.tax_amount, Decimal::new(3_500, 2));
        assert_eq!(sale.discount_amount, Decimal::ZERO);
        assert_eq!(sale.total_amount, Decimal::new(38_500, 2));
        assert_eq!(sale.status, SaleStatus::Completed);
        assert_eq!(sale.user_id, "cashier-1");
        assert!(tally_core::invoice::is_invoice_number(&sale.invoice_number));

        // Items come back in cart order, not reservation order.
        let products: Vec<&str> = sale.items.iter().map(|i| i.product_id.as_str()).collect();
        assert_eq!(products, ["p-2", "p-1"]);
        assert_eq!(sale.items[0].product_name, "Product p-2");
        assert_eq!(sale.items[0].unit_price, Decimal::new(5_000, 2));
        assert_eq!(sale.items[0].subtotal, Decimal::new(15_000, 2));

        assert_eq!(stock(engine.database(), "p-1").await, 8);
        assert_eq!(stock(engine.database(), "p-2").await, 7);

        let stored = engine.get_sale(&sale.id).await.unwrap();
        assert_eq!(stored.invoice_number, sale.invoice_number);
        assert_eq!(stored.total_amount, sale.total_amount);
        assert_eq!(stored.items, sale.items);
        let by_invoice = engine.get_sale_by_invoice(&sale.invoice_number).await.unwrap();
        assert_eq!(by_invoice.id, sale.id);
    }

    #[tokio::test]
    async fn test_snapshot_survives_price_change() {
        let engine = memory_engine().await;
        seed_product(engine.database(), "p-1", 1_000, 10).await;

        let sale = engine.create_sale("cashier-1", request(&[("p-1", 1)])).await.unwrap();
        sqlx::query("UPDATE products SET price_cents = 9999, name = 'Renamed' WHERE id = 'p-1'")
            .execute(engine.database().pool())
            .await
            .unwrap();

        let stored = engine.get_sale(&sale.id).await.unwrap();
        assert_eq!(stored.items[0].unit_price, Decimal::new(1_000, 2));
        assert_eq!(stored.items[0].product_name, "Product p-1");
    }

    #[tokio::test]
    async fn test_discount_is_applied_and_bounded() {
        let engine = memory_engine().await;
        seed_product(engine.database(), "p-1", 10_000, 10).await;

        let mut req = request(&[("p-1", 1)]);
        req.discount_amount = Decimal::new(55, 1);
        let sale = engine.create_sale("cashier-1", req).await.unwrap();
        assert_eq!(sale.discount_amount, Decimal::new(550, 2));
        assert_eq!(sale.total_amount, Decimal::new(10_450, 2));

        let mut req = request(&[("p-1", 1)]);
        req.discount_amount = Decimal::new(11_001, 2);
        let err = engine.create_sale("cashier-1", req).await.unwrap_err();
        assert!(matches!(err, SaleError::DiscountExceedsTotal { .. }), "{err:?}");
        assert_eq!(err.kind(), ErrorKind::Validation);

        // Only the first sale took stock.
        assert_eq!(stock(engine.database(), "p-1").await, 9);
    }

    #[tokio::test]
    async fn test_failure_on_second_of_three_rolls_back() {
        let engine = memory_engine().await;
        seed_product(engine.database(), "p-a", 100, 10).await;
        seed_product(engine.database(), "p-b", 100, 1).await;
        seed_product(engine.database(), "p-c", 100, 10).await;

        let err = engine
            .create_sale("cashier-1", request(&[("p-c", 2), ("p-b", 5), ("p-a", 3)]))
            .await
            .unwrap_err();

        match err {
            SaleError::InsufficientStock {
                product_id,
                available,
                requested,
            } => {
                assert_eq!(product_id, "p-b");
                assert_eq!(available, 1);
                assert_eq!(requested, 5);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert_eq!(stock(engine.database(), "p-a").await, 10);
        assert_eq!(stock(engine.database(), "p-b").await, 1);
        assert_eq!(stock(engine.database(), "p-c").await, 10);

        let (sales, total) = engine
            .list_sales(&SaleFilter::default(), Pagination::default())
            .await
            .unwrap();
        assert!(sales.is_empty());
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_unknown_and_inactive_products() {
        let engine = memory_engine().await;
        seed_product(engine.database(), "p-1", 100, 10).await;
        seed_product(engine.database(), "p-off", 100, 10).await;
        engine.database().products().set_active("p-off", false).await.unwrap();

        let err = engine
            .create_sale("cashier-1", request(&[("p-1", 1), ("p-ghost", 1)]))
            .await
            .unwrap_err();
        assert!(matches!(&err, SaleError::ProductNotFound(id) if id == "p-ghost"), "{err:?}");
        assert_eq!(err.kind(), ErrorKind::InventoryConflict);

        let err = engine
            .create_sale("cashier-1", request(&[("p-off", 1)]))
            .await
            .unwrap_err();
        assert!(matches!(&err, SaleError::ProductInactive(id) if id == "p-off"), "{err:?}");

        assert_eq!(stock(engine.database(), "p-1").await, 10);
        assert_eq!(stock(engine.database(), "p-off").await, 10);
    }

    #[tokio::test]
    async fn test_validation_happens_before_storage() {
        let engine = memory_engine().await;
        seed_product(engine.database(), "p-1", 100, 10).await;

        let err = engine.create_sale("cashier-1", request(&[])).await.unwrap_err();
        assert!(matches!(err, SaleError::Validation(ValidationError::Required { .. })));

        let err = engine.create_sale("cashier-1", request(&[("p-1", 0)])).await.unwrap_err();
        assert!(matches!(err, SaleError::Validation(ValidationError::MustBePositive { .. })));

        let err = engine.create_sale("cashier-1", request(&[(" ", 1)])).await.unwrap_err();
        assert!(matches!(err, SaleError::Validation(ValidationError::Required { .. })));

        let mut req = request(&[("p-1", 1)]);
        req.payment_method = "bitcoin".to_string();
        let err = engine.create_sale("cashier-1", req).await.unwrap_err();
        assert!(matches!(&err, SaleError::InvalidPaymentMethod(m) if m == "bitcoin"));

        let mut req = request(&[("p-1", 1)]);
        req.discount_amount = Decimal::new(-1, 0);
        let err = engine.create_sale("cashier-1", req).await.unwrap_err();
        assert!(matches!(err, SaleError::Validation(ValidationError::Negative { .. })));

        let mut req = request(&[("p-1", 1)]);
        req.notes = Some("x".repeat(501));
        let err = engine.create_sale("cashier-1", req).await.unwrap_err();
        assert!(matches!(err, SaleError::Validation(ValidationError::TooLong { .. })));

        let mut req = request(&[("p-1", 1)]);
        req.initial_status = Some(SaleStatus::Refunded);
        let err = engine.create_sale("cashier-1", req).await.unwrap_err();
        assert!(matches!(err, SaleError::Validation(ValidationError::NotAllowed { .. })));

        let err = engine.create_sale("", request(&[("p-1", 1)])).await.unwrap_err();
        assert!(matches!(err, SaleError::Validation(ValidationError::Required { .. })));

        assert_eq!(stock(engine.database(), "p-1").await, 10);
    }

    #[tokio::test]
    async fn test_large_quantities_and_long_carts_are_sold() {
        let engine = memory_engine().await;
        seed_product(engine.database(), "bulk", 25, 5_000).await;
        seed_product(engine.database(), "loose", 10, 200).await;

        let sale = engine
            .create_sale("cashier-1", request(&[("bulk", 1_000)]))
            .await
            .unwrap();
        assert_eq!(sale.items[0].quantity, 1_000);
        assert_eq!(sale.subtotal, Decimal::new(25_000, 2));
        assert_eq!(stock(engine.database(), "bulk").await, 4_000);

        let long_cart: Vec<(&str, i64)> = vec![("loose", 1); 101];
        let sale = engine.create_sale("cashier-1", request(&long_cart)).await.unwrap();
        assert_eq!(sale.items.len(), 101);
        assert_eq!(stock(engine.database(), "loose").await, 99);

        // Stock, not a fixed cap, is what limits a line.
        let err = engine
            .create_sale("cashier-1", request(&[("bulk", 4_001)]))
            .await
            .unwrap_err();
        assert!(
            matches!(err, SaleError::InsufficientStock { available: 4_000, requested: 4_001, .. }),
            "{err:?}"
        );
        assert_eq!(stock(engine.database(), "bulk").await, 4_000);
    }

    #[tokio::test]
    async fn test_duplicate_invoice_rolls_back() {
        let db = memory_db().await;
        seed_product(&db, "p-1", 100, 10).await;
        let engine = SaleEngine::with_invoice_generator(
            db,
            EngineConfig::default(),
            Arc::new(FixedInvoice("INV-20250101-00000001")),
        )
        .unwrap();

        engine.create_sale("cashier-1", request(&[("p-1", 2)])).await.unwrap();
        let err = engine
            .create_sale("cashier-1", request(&[("p-1", 3)]))
            .await
            .unwrap_err();

        assert!(matches!(&err, SaleError::DuplicateInvoice(n) if n == "INV-20250101-00000001"));
        assert!(err.is_retryable());
        assert_eq!(stock(engine.database(), "p-1").await, 8);
    }

    #[tokio::test]
    async fn test_invoice_numbers_distinct_across_batch() {
        let engine = memory_engine().await;
        seed_product(engine.database(), "p-1", 100, 1_000).await;

        let mut seen = HashSet::new();
        for _ in 0..50 {
            let sale = engine.create_sale("cashier-1", request(&[("p-1", 1)])).await.unwrap();
            assert!(seen.insert(sale.invoice_number));
        }
        assert_eq!(stock(engine.database(), "p-1").await, 950);
    }

    // -------------------------------------------------------------------------
    // Loyalty
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_loyalty_points_credited_after_sale() {
        let engine = memory_engine().await;
        seed_product(engine.database(), "p-1", 100, 10).await;
        seed_customer(engine.database(), "c-1").await;

        let mut req = request(&[("p-1", 1)]);
        req.customer_id = Some("c-1".to_string());
        let sale = engine.create_sale("cashier-1", req).await.unwrap();
        assert_eq!(sale.customer_id.as_deref(), Some("c-1"));

        assert!(wait_for_points(engine.database(), "c-1", 10).await);
    }

    #[tokio::test]
    async fn test_unknown_customer_does_not_fail_sale() {
        let engine = memory_engine().await;
        seed_product(engine.database(), "p-1", 100, 10).await;

        let mut req = request(&[("p-1", 1)]);
        req.customer_id = Some("ghost".to_string());
        let sale = engine.create_sale("cashier-1", req).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(engine.get_sale(&sale.id).await.unwrap().customer_id.as_deref(), Some("ghost"));
    }

    // -------------------------------------------------------------------------
    // Status
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_cancel_pending_restores_stock_once() {
        let engine = memory_engine().await;
        seed_product(engine.database(), "p-1", 100, 100).await;
        seed_product(engine.database(), "p-2", 100, 100).await;

        let sale = engine
            .create_sale("cashier-1", pending(&[("p-1", 3), ("p-2", 4), ("p-1", 2)]))
            .await
            .unwrap();
        assert_eq!(sale.status, SaleStatus::Pending);
        assert_eq!(stock(engine.database(), "p-1").await, 95);
        assert_eq!(stock(engine.database(), "p-2").await, 96);

        let cancelled = engine.update_status(&sale.id, SaleStatus::Cancelled).await.unwrap();
        assert_eq!(cancelled.status, SaleStatus::Cancelled);
        assert_eq!(cancelled.items.len(), 3);
        assert_eq!(stock(engine.database(), "p-1").await, 100);
        assert_eq!(stock(engine.database(), "p-2").await, 100);

        let err = engine
            .update_status(&sale.id, SaleStatus::Cancelled)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SaleError::InvalidTransition {
                from: SaleStatus::Cancelled,
                to: SaleStatus::Cancelled,
                ..
            }
        ));
        assert_eq!(err.kind(), ErrorKind::StateMachine);
        assert_eq!(stock(engine.database(), "p-1").await, 100);
    }

    #[tokio::test]
    async fn test_refund_completed_restores_stock() {
        let engine = memory_engine().await;
        seed_product(engine.database(), "p-1", 250, 20).await;

        let sale = engine.create_sale("cashier-1", request(&[("p-1", 5)])).await.unwrap();
        assert_eq!(stock(engine.database(), "p-1").await, 15);

        let refunded = engine.update_status(&sale.id, SaleStatus::Refunded).await.unwrap();
        assert_eq!(refunded.status, SaleStatus::Refunded);
        assert_eq!(refunded.total_amount, sale.total_amount);
        assert_eq!(stock(engine.database(), "p-1").await, 20);

        let stored = engine.get_sale(&sale.id).await.unwrap();
        assert_eq!(stored.status, SaleStatus::Refunded);
    }

    #[tokio::test]
    async fn test_completing_pending_keeps_stock_out() {
        let engine = memory_engine().await;
        seed_product(engine.database(), "p-1", 250, 20).await;

        let sale = engine.create_sale("cashier-1", pending(&[("p-1", 5)])).await.unwrap();
        let completed = engine.update_status(&sale.id, SaleStatus::Completed).await.unwrap();
        assert_eq!(completed.status, SaleStatus::Completed);
        assert_eq!(stock(engine.database(), "p-1").await, 15);

        // A completed sale is refunded, not cancelled.
        let err = engine
            .update_status(&sale.id, SaleStatus::Cancelled)
            .await
            .unwrap_err();
        assert!(matches!(err, SaleError::InvalidTransition { .. }));
        assert_eq!(stock(engine.database(), "p-1").await, 15);
    }

    #[tokio::test]
    async fn test_illegal_transitions_change_nothing() {
        let engine = memory_engine().await;
        seed_product(engine.database(), "p-1", 100, 10).await;

        let sale = engine.create_sale("cashier-1", pending(&[("p-1", 1)])).await.unwrap();
        for to in [SaleStatus::Refunded, SaleStatus::Pending] {
            let err = engine.update_status(&sale.id, to).await.unwrap_err();
            assert!(matches!(err, SaleError::InvalidTransition { .. }), "{to}: {err:?}");
        }
        assert_eq!(engine.get_sale(&sale.id).await.unwrap().status, SaleStatus::Pending);
        assert_eq!(stock(engine.database(), "p-1").await, 9);

        let err = engine
            .update_status("missing", SaleStatus::Cancelled)
            .await
            .unwrap_err();
        assert!(matches!(err, SaleError::NotFound(_)));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    // -------------------------------------------------------------------------
    // Concurrency
    // -------------------------------------------------------------------------

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_never_oversell() {
        let (engine, path) = file_engine(8, EngineConfig::default()).await;
        seed_product(engine.database(), "p-1", 100, 10).await;

        let handles: Vec<_> = (0..30)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.create_sale("cashier-1", request(&[("p-1", 1)])).await })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(SaleError::InsufficientStock { .. }) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(created, 10);
        assert_eq!(stock(engine.database(), "p-1").await, 0);
        let (_, total) = engine
            .list_sales(&SaleFilter::default(), Pagination::default())
            .await
            .unwrap();
        assert_eq!(total, 10);

        engine.database().close().await;
        remove_db_files(&path);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_cancels_restore_exactly_once() {
        let (engine, path) = file_engine(8, EngineConfig::default()).await;
        seed_product(engine.database(), "p-1", 100, 100).await;

        let sale = engine.create_sale("cashier-1", pending(&[("p-1", 7)])).await.unwrap();
        assert_eq!(stock(engine.database(), "p-1").await, 93);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                let id = sale.id.clone();
                tokio::spawn(async move { engine.update_status(&id, SaleStatus::Cancelled).await })
            })
            .collect();

        let mut won = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => won += 1,
                Err(SaleError::InvalidTransition { .. }) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(won, 1);
        assert_eq!(stock(engine.database(), "p-1").await, 100);

        engine.database().close().await;
        remove_db_files(&path);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_timed_out_creates_never_commit() {
        let config = EngineConfig::default().operation_timeout(Duration::from_millis(5));
        let (engine, path) = file_engine(4, config).await;
        seed_product(engine.database(), "p-1", 100, 1_000).await;

        let handles: Vec<_> = (0..40)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.create_sale("cashier-1", request(&[("p-1", 2)])).await })
            })
            .collect();

        let mut reported: i64 = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                reported += 1;
            }
        }

        // Every stored sale was reported to its caller, and only those took stock.
        let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
            .fetch_one(engine.database().pool())
            .await
            .unwrap();
        assert_eq!(stored, reported);
        assert_eq!(stock(engine.database(), "p-1").await, 1_000 - 2 * reported);

        engine.database().close().await;
        remove_db_files(&path);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_lock_wait_past_timeout_is_retryable() {
        let config = EngineConfig::default().operation_timeout(Duration::from_millis(200));
        let (engine, path) = file_engine(2, config).await;
        seed_product(engine.database(), "p-1", 100, 10).await;

        // Hold the write lock from another connection.
        let mut blocker = engine.database().begin().await.unwrap();
        sqlx::query("UPDATE products SET name = name WHERE id = 'p-1'")
            .execute(&mut *blocker)
            .await
            .unwrap();

        let err = engine
            .create_sale("cashier-1", request(&[("p-1", 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, SaleError::Timeout(_)), "{err:?}");
        assert!(err.is_retryable());

        blocker.rollback().await.unwrap();
        assert_eq!(stock(engine.database(), "p-1").await, 10);

        engine.database().close().await;
        remove_db_files(&path);
    }

    // -------------------------------------------------------------------------
    // Listing
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_list_filters_and_pages() {
        let engine = memory_engine().await;
        seed_product(engine.database(), "p-1", 100, 100).await;

        for n in 1..=5 {
            engine.create_sale("cashier-1", request(&[("p-1", n)])).await.unwrap();
        }
        let mut req = request(&[("p-1", 1)]);
        req.payment_method = "card".to_string();
        let by_card = engine.create_sale("cashier-2", req).await.unwrap();
        let held = engine.create_sale("cashier-2", pending(&[("p-1", 1)])).await.unwrap();

        let (all, total) = engine
            .list_sales(&SaleFilter::default(), Pagination::new(1, 3))
            .await
            .unwrap();
        assert_eq!(total, 7);
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|s| !s.items.is_empty()));

        let filter = SaleFilter {
            user_id: Some("cashier-2".to_string()),
            ..Default::default()
        };
        let (mine, total) = engine.list_sales(&filter, Pagination::default()).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(mine.len(), 2);

        let filter = SaleFilter {
            payment_method: Some(PaymentMethod::Card),
            ..Default::default()
        };
        let (cards, _) = engine.list_sales(&filter, Pagination::default()).await.unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].id, by_card.id);

        let filter = SaleFilter {
            status: Some(SaleStatus::Pending),
            ..Default::default()
        };
        let (open, _) = engine.list_sales(&filter, Pagination::default()).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, held.id);

        let pagination = Pagination::new(1, 100).sorted_by(SortField::TotalAmount, SortOrder::Asc);
        let (sorted, _) = engine
            .list_sales(&SaleFilter::default(), pagination)
            .await
            .unwrap();
        let totals: Vec<Decimal> = sorted.iter().map(|s| s.total_amount).collect();
        let mut expected = totals.clone();
        expected.sort();
        assert_eq!(totals, expected);

        let future: DateTime<Utc> = Utc::now() + chrono::Duration::days(1);
        let filter = SaleFilter {
            date_from: Some(future),
            ..Default::default()
        };
        let (none, total) = engine.list_sales(&filter, Pagination::default()).await.unwrap();
        assert!(none.is_empty());
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_get_missing_sale() {
        let engine = memory_engine().await;
        assert!(matches!(
            engine.get_sale("nope").await,
            Err(SaleError::NotFound(_))
        ));
        assert!(matches!(
            engine.get_sale_by_invoice("INV-20250101-00000000").await,
            Err(SaleError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let db = memory_db().await;
        let config = EngineConfig::default().tax_rate(tally_core::TaxRate::from_bps(20_000));
        assert!(matches!(
            SaleEngine::new(db, config),
            Err(SaleError::Validation(_))
        ));
    }
}
