//! Liveness and readiness.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub database: bool,
    pub migrations_applied: usize,
    pub migrations_total: usize,
    pub version: &'static str,
}

/// `GET /health`: 200 when the database answers and every migration is
/// applied, 503 otherwise.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let db = state.engine.database();
    let database = db.health_check().await;
    let (migrations_total, migrations_applied) = tally_db::migrations::migration_status(db.pool())
        .await
        .unwrap_or((0, 0));

    let healthy = database && migrations_applied == migrations_total;
    let status = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        status,
        Json(HealthReport {
            status: if healthy { "ok" } else { "degraded" },
            database,
            migrations_applied,
            migrations_total,
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}
