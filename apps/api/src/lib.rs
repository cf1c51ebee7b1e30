//! # tally-api: HTTP Surface for the Tally Sale Engine
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              tally-api                                  │
//! │                                                                         │
//! │  request ──► TraceLayer ──► Caller (X-User-Id / X-User-Role)            │
//! │                                 │                                       │
//! │                                 ▼                                       │
//! │                        routes::sales / routes::health                   │
//! │                                 │                                       │
//! │                                 ▼                                       │
//! │                    SaleEngine (tally-engine) ──► SQLite                 │
//! │                                 │                                       │
//! │                                 ▼                                       │
//! │              ApiResponse { success, message, data, meta }               │
//! │              ApiError    { success: false, code, message }              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use axum::routing::{get, patch};
use axum::Router;
use tower_http::trace::TraceLayer;

use tally_engine::SaleEngine;

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub engine: SaleEngine,
}

impl AppState {
    pub fn new(engine: SaleEngine) -> Self {
        AppState { engine }
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    let sales = Router::new()
        .route(
            "/sales",
            get(routes::sales::list_sales).post(routes::sales::create_sale),
        )
        .route("/sales/{id}", get(routes::sales::get_sale))
        .route(
            "/sales/invoice/{invoice_number}",
            get(routes::sales::get_sale_by_invoice),
        )
        .route("/sales/{id}/status", patch(routes::sales::update_status));

    Router::new()
        .route("/health", get(routes::health::health))
        .nest("/api/v1", sales)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
