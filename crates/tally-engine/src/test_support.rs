//! Fixtures shared by this crate's tests.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use tally_core::{Customer, InvoiceGenerator, Product, SaleStatus};
use tally_db::{Database, DbConfig};

use crate::config::EngineConfig;
use crate::dto::{CreateSaleRequest, SaleLineRequest};
use crate::engine::SaleEngine;

pub async fn memory_db() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

pub async fn memory_engine() -> SaleEngine {
    SaleEngine::new(memory_db().await, EngineConfig::default()).unwrap()
}

/// An engine over a fresh temp-file database, for tests that need real
/// concurrent connections.
pub async fn file_engine(max_connections: u32, config: EngineConfig) -> (SaleEngine, PathBuf) {
    let path = std::env::temp_dir().join(format!("tally-engine-test-{}.db", Uuid::new_v4()));
    let db = Database::new(DbConfig::new(path.clone()).max_connections(max_connections))
        .await
        .unwrap();
    (SaleEngine::new(db, config).unwrap(), path)
}

pub fn remove_db_files(path: &Path) {
    for suffix in ["", "-wal", "-shm"] {
        let mut file = path.as_os_str().to_owned();
        file.push(suffix);
        let _ = std::fs::remove_file(file);
    }
}

pub async fn seed_product(db: &Database, id: &str, price_cents: i64, stock: i64) {
    let now = Utc::now();
    db.products()
        .insert(&Product {
            id: id.to_string(),
            sku: format!("SKU-{id}"),
            name: format!("Product {id}"),
            price_cents,
            current_stock: stock,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
}

pub async fn seed_customer(db: &Database, id: &str) {
    let now = Utc::now();
    db.customers()
        .insert(&Customer {
            id: id.to_string(),
            name: format!("Customer {id}"),
            email: None,
            phone: None,
            loyalty_points: 0,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
}

pub async fn stock(db: &Database, product_id: &str) -> i64 {
    db.inventory().get_available(product_id).await.unwrap()
}

/// Polls until the detached loyalty task has landed, or gives up.
pub async fn wait_for_points(db: &Database, customer_id: &str, expected: i64) -> bool {
    for _ in 0..100 {
        let points = db
            .customers()
            .get_by_id(customer_id)
            .await
            .unwrap()
            .map(|c| c.loyalty_points);
        if points == Some(expected) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// A cash sale request with no discount.
pub fn request(lines: &[(&str, i64)]) -> CreateSaleRequest {
    CreateSaleRequest {
        customer_id: None,
        payment_method: "cash".to_string(),
        discount_amount: Decimal::ZERO,
        notes: None,
        initial_status: None,
        items: lines
            .iter()
            .map(|(product_id, quantity)| SaleLineRequest {
                product_id: product_id.to_string(),
                quantity: *quantity,
            })
            .collect(),
    }
}

/// Same as [`request`], opened as a held sale.
pub fn pending(lines: &[(&str, i64)]) -> CreateSaleRequest {
    CreateSaleRequest {
        initial_status: Some(SaleStatus::Pending),
        ..request(lines)
    }
}

/// Hands out the same invoice number every time.
pub struct FixedInvoice(pub &'static str);

impl InvoiceGenerator for FixedInvoice {
    fn next_invoice_number(&self, _now: DateTime<Utc>) -> String {
        self.0.to_string()
    }
}
