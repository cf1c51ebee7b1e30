//! # Seed Data Generator
//!
//! Populates a development database with products and customers.
//!
//! ## Usage
//! ```bash
//! # 200 products, 20 customers (default)
//! cargo run -p tally-db --bin seed
//!
//! # Custom amounts and path
//! cargo run -p tally-db --bin seed -- --count 1000 --customers 50 --db ./data/tally.db
//! ```
//!
//! Each product has:
//! - Unique SKU: `{CATEGORY}-{NAME}-{INDEX}`
//! - Price: $1.99 - $9.99 plus a size add-on
//! - Stock: 0 - 100

use anyhow::{bail, Context};
use chrono::Utc;
use std::env;
use tally_core::validation::{validate_price_cents, validate_product_name, validate_sku};
use tally_core::{Customer, Product};
use tally_db::{Database, DbConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Product categories for realistic test data
const CATEGORIES: &[(&str, &[&str])] = &[
    (
        "BEV",
        &["Coca-Cola", "Sprite", "Iced Tea", "Orange Juice", "Mineral Water", "Coffee"],
    ),
    (
        "SNK",
        &["Potato Chips", "Chocolate Bar", "Peanuts", "Cookies", "Crackers", "Gummy Bears"],
    ),
    (
        "DRY",
        &["Whole Milk", "Cheddar Cheese", "Butter", "Greek Yogurt", "Eggs Dozen"],
    ),
    (
        "GRO",
        &["White Bread", "Pasta Penne", "Rice White", "Canned Soup", "Peanut Butter", "Sugar"],
    ),
];

/// Size variants and their price add-on in cents
const SIZES: &[(&str, i64)] = &[
    ("Small", 0),
    ("Medium", 100),
    ("Large", 200),
    ("6-Pack", 300),
    ("12-Pack", 500),
];

const CUSTOMER_NAMES: &[&str] = &[
    "Ayu", "Budi", "Citra", "Dewi", "Eko", "Fajar", "Gita", "Hadi", "Indah", "Joko",
];

struct Args {
    count: usize,
    customers: usize,
    db_path: String,
}

fn parse_args() -> anyhow::Result<Option<Args>> {
    let mut args = Args {
        count: 200,
        customers: 20,
        db_path: String::from("./data/tally.db"),
    };

    let mut iter = env::args().skip(1);
    while let Some(flag) = iter.next() {
        match flag.as_str() {
            "--count" | "-c" => {
                let value = iter.next().context("--count needs a value")?;
                args.count = value.parse().context("--count must be a number")?;
            }
            "--customers" => {
                let value = iter.next().context("--customers needs a value")?;
                args.customers = value.parse().context("--customers must be a number")?;
            }
            "--db" | "-d" => {
                args.db_path = iter.next().context("--db needs a path")?;
            }
            "--help" | "-h" => {
                println!("Tally POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>      Products to generate (default: 200)");
                println!("      --customers <N>  Customers to generate (default: 20)");
                println!("  -d, --db <PATH>      Database file path (default: ./data/tally.db)");
                println!("  -h, --help           Show this help message");
                return Ok(None);
            }
            other => bail!("unknown argument: {other}"),
        }
    }

    Ok(Some(args))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")),
        )
        .init();

    let Some(args) = parse_args()? else {
        return Ok(());
    };

    if let Some(parent) = std::path::Path::new(&args.db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }

    let db = Database::new(DbConfig::new(&args.db_path))
        .await
        .context("opening database")?;
    info!(path = %args.db_path, "Connected, migrations applied");

    let products = db.products();
    let start = std::time::Instant::now();
    let mut index = 0;
    let mut generated = 0;
    let mut skipped = 0;

    'outer: for (category_code, names) in CATEGORIES {
        for name in names.iter() {
            for (size_name, price_addon) in SIZES {
                if index >= args.count {
                    break 'outer;
                }

                let product = generate_product(category_code, name, size_name, *price_addon, index)?;
                index += 1;

                // SKUs are deterministic, so a rerun only fills the gaps.
                if products.get_by_sku(&product.sku).await?.is_some() {
                    skipped += 1;
                    continue;
                }
                if let Err(e) = products.insert(&product).await {
                    warn!(sku = %product.sku, error = %e, "Failed to insert product");
                    continue;
                }
                generated += 1;
            }
        }
    }

    info!(
        generated,
        skipped,
        total = products.count().await?,
        elapsed = ?start.elapsed(),
        "Products generated"
    );

    if skipped > 0 {
        info!("Existing catalogue found, not adding customers");
        db.close().await;
        return Ok(());
    }

    for n in 0..args.customers {
        let customer = generate_customer(n);
        db.customers()
            .insert(&customer)
            .await
            .with_context(|| format!("inserting customer {}", customer.name))?;
    }

    info!(customers = args.customers, "Customers generated");

    db.close().await;
    Ok(())
}

/// Generates a single product with deterministic pseudo-random data.
fn generate_product(
    category: &str,
    name: &str,
    size: &str,
    price_addon: i64,
    seed: usize,
) -> anyhow::Result<Product> {
    let now = Utc::now();

    let code: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(3)
        .collect::<String>()
        .to_uppercase();
    let sku = format!("{category}-{code}-{seed:04}");
    let full_name = format!("{name} {size}");
    let price_cents = 199 + ((seed * 17) % 800) as i64 + price_addon;

    validate_sku(&sku)?;
    validate_product_name(&full_name)?;
    validate_price_cents(price_cents)?;

    Ok(Product {
        id: Uuid::new_v4().to_string(),
        sku,
        name: full_name,
        price_cents,
        current_stock: (seed % 101) as i64,
        is_active: true,
        created_at: now,
        updated_at: now,
    })
}

fn generate_customer(n: usize) -> Customer {
    let now = Utc::now();
    let first = CUSTOMER_NAMES[n % CUSTOMER_NAMES.len()];
    let name = format!("{first} {}", n / CUSTOMER_NAMES.len() + 1);

    Customer {
        id: Uuid::new_v4().to_string(),
        email: Some(format!("{}.{n}@example.com", first.to_lowercase())),
        phone: None,
        name,
        loyalty_points: 0,
        created_at: now,
        updated_at: now,
    }
}
