//! # Repository Module
//!
//! Database repository implementations for Tally POS.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SaleEngine                                                            │
//! │       │                                                                 │
//! │       │  pool form:        db.sales().get_by_id(id)                    │
//! │       │  connection form:  SaleRepository::get_by_id_on(&mut tx, id)   │
//! │       ▼                                                                 │
//! │  Repositories (SQL lives here and nowhere else)                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `_on` associated functions take a `&mut SqliteConnection` so several
//! repository calls can share one transaction.
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`](product::ProductRepository) - Product lookup and administration
//! - [`InventoryStore`](inventory::InventoryStore) - Conditional stock decrement / restore
//! - [`SaleRepository`](sale::SaleRepository) - Sale and sale item persistence
//! - [`CustomerRepository`](customer::CustomerRepository) - Loyalty points

pub mod customer;
pub mod inventory;
pub mod product;
pub mod sale;
