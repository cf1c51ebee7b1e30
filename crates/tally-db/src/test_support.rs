//! Fixtures shared by this crate's tests.

use chrono::Utc;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::{Database, DbConfig};
use tally_core::{Customer, PaymentMethod, Product, Sale, SaleItem, SaleStatus};

pub async fn memory_db() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

/// A fresh file-backed database that allows real concurrent connections.
pub async fn file_db(max_connections: u32) -> (Database, PathBuf) {
    let path = std::env::temp_dir().join(format!("tally-db-test-{}.db", Uuid::new_v4()));
    let db = Database::new(DbConfig::new(path.clone()).max_connections(max_connections))
        .await
        .unwrap();
    (db, path)
}

pub fn remove_db_files(path: &Path) {
    for suffix in ["", "-wal", "-shm"] {
        let mut file = path.as_os_str().to_owned();
        file.push(suffix);
        let _ = std::fs::remove_file(file);
    }
}

pub fn product(id: &str, sku: &str, price_cents: i64, stock: i64) -> Product {
    let now = Utc::now();
    Product {
        id: id.to_string(),
        sku: sku.to_string(),
        name: format!("Product {sku}"),
        price_cents,
        current_stock: stock,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

pub fn customer(id: &str) -> Customer {
    let now = Utc::now();
    Customer {
        id: id.to_string(),
        name: format!("Customer {id}"),
        email: None,
        phone: None,
        loyalty_points: 0,
        created_at: now,
        updated_at: now,
    }
}

/// A completed cash sale; every line is priced at 100 cents.
pub fn sale_with_items(id: &str, invoice_number: &str, lines: &[(&str, i64)]) -> (Sale, Vec<SaleItem>) {
    let now = Utc::now();
    let items: Vec<SaleItem> = lines
        .iter()
        .enumerate()
        .map(|(line_no, (product_id, quantity))| SaleItem {
            id: Uuid::new_v4().to_string(),
            sale_id: id.to_string(),
            product_id: product_id.to_string(),
            product_name: format!("Product {product_id}"),
            unit_price_cents: 100,
            quantity: *quantity,
            subtotal_cents: 100 * quantity,
            line_no: line_no as i64,
            created_at: now,
        })
        .collect();

    let subtotal: i64 = items.iter().map(|i| i.subtotal_cents).sum();
    let tax = subtotal / 10;
    let sale = Sale {
        id: id.to_string(),
        user_id: "cashier-1".to_string(),
        customer_id: None,
        invoice_number: invoice_number.to_string(),
        subtotal_cents: subtotal,
        tax_cents: tax,
        discount_cents: 0,
        total_cents: subtotal + tax,
        payment_method: PaymentMethod::Cash,
        status: SaleStatus::Completed,
        notes: None,
        created_at: now,
        updated_at: now,
    };

    (sale, items)
}
