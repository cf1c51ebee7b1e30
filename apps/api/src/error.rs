//! # API Error Type
//!
//! Unified error type for HTTP handlers.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Tally API                              │
//! │                                                                         │
//! │  Client                      Rust Backend                               │
//! │  ──────                      ────────────                               │
//! │                                                                         │
//! │  POST /api/v1/sales                                                     │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  Handler  Result<T, ApiError>                                    │  │
//! │  │         │                                                        │  │
//! │  │         ▼                                                        │  │
//! │  │  SaleError::InsufficientStock ──► 409 INSUFFICIENT_STOCK ───────►│  │
//! │  │  SaleError::Validation        ──► 400 VALIDATION_ERROR  ───────►│  │
//! │  │  SaleError::Storage(Busy)     ──► 503 DATABASE_BUSY     ───────►│  │
//! │  │         │                                                        │  │
//! │  │         ▼                                                        │  │
//! │  │  Success ──────────────────────────────────────────────────────►│  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  {                                                                      │
//! │    "success": false,                                                    │
//! │    "code": "INSUFFICIENT_STOCK",                                        │
//! │    "message": "Insufficient stock for product p-1: 0 available, ..."   │
//! │  }                                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use tally_db::DbError;
use tally_engine::SaleError;

/// API error returned from handlers.
///
/// ## Serialization
/// ```json
/// {
///   "success": false,
///   "code": "VALIDATION_ERROR",
///   "message": "Validation error: quantity must be positive",
///   "errors": [{ "field": "quantity", "message": "quantity must be positive" }]
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,

    /// Machine-readable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,

    /// Per-field details for validation failures
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

/// One invalid field.
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed body, path or query (400)
    BadRequest,

    /// Input validation failed (400)
    ValidationError,

    /// No caller identity (401)
    Unauthorized,

    /// Caller's role may not do this (403)
    Forbidden,

    /// Sale not found (404)
    NotFound,

    /// Not enough stock for a line (409)
    InsufficientStock,

    /// Cart references an unknown product (422)
    ProductNotFound,

    /// Cart references a deactivated product (422)
    ProductInactive,

    /// Status change not allowed from the current status (409)
    InvalidTransition,

    /// Generated invoice number collided; retry (503)
    DuplicateInvoice,

    /// Operation exceeded its time budget; retry (503)
    Timeout,

    /// Database is locked or out of connections; retry (503)
    DatabaseBusy,

    /// Database operation failed (500)
    DatabaseError,

    /// Internal server error (500)
    Internal,
}

impl ApiError {
    /// Creates a new API error.
    pub fn new(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            status,
            code,
            message: message.into(),
            errors: Vec::new(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::new(StatusCode::BAD_REQUEST, ErrorCode::BadRequest, message)
    }

    /// Creates a validation error pointing at one field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        ApiError {
            errors: vec![FieldError {
                field: field.into(),
                message: message.clone(),
            }],
            ..ApiError::new(StatusCode::BAD_REQUEST, ErrorCode::ValidationError, message)
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::new(StatusCode::UNAUTHORIZED, ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::new(StatusCode::FORBIDDEN, ErrorCode::Forbidden, message)
    }
}

/// Converts engine errors to API errors.
impl From<SaleError> for ApiError {
    fn from(err: SaleError) -> Self {
        let message = err.to_string();
        match &err {
            SaleError::Validation(v) => ApiError::validation(v.field(), v.to_string()),
            SaleError::InvalidPaymentMethod(_) => ApiError::validation("payment_method", message),
            SaleError::DiscountExceedsTotal { .. } => {
                ApiError::validation("discount_amount", message)
            }
            SaleError::InsufficientStock { .. } => {
                ApiError::new(StatusCode::CONFLICT, ErrorCode::InsufficientStock, message)
            }
            SaleError::ProductNotFound(_) => ApiError::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorCode::ProductNotFound,
                message,
            ),
            SaleError::ProductInactive(_) => ApiError::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorCode::ProductInactive,
                message,
            ),
            SaleError::InvalidTransition { .. } => {
                ApiError::new(StatusCode::CONFLICT, ErrorCode::InvalidTransition, message)
            }
            SaleError::NotFound(_) => ApiError::new(StatusCode::NOT_FOUND, ErrorCode::NotFound, message),
            SaleError::DuplicateInvoice(_) => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorCode::DuplicateInvoice,
                "Invoice number collision, please retry",
            ),
            SaleError::Timeout(_) => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorCode::Timeout,
                "Operation timed out, please retry",
            ),
            SaleError::Storage { context, source } => {
                // Log the actual error but return a generic message
                tracing::error!(context = %context, error = %source, "Storage error");
                storage_error(source)
            }
        }
    }
}

fn storage_error(source: &DbError) -> ApiError {
    if source.is_transient() {
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::DatabaseBusy,
            "Database is busy, please retry",
        )
    } else {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::DatabaseError,
            "Database operation failed",
        )
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    #[serde(flatten)]
    error: &'a ApiError,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            success: false,
            error: &self,
        });
        (self.status, body).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tally_core::{SaleStatus, ValidationError};

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                SaleError::Validation(ValidationError::Required { field: "items".into() }),
                StatusCode::BAD_REQUEST,
                ErrorCode::ValidationError,
            ),
            (
                SaleError::InsufficientStock {
                    product_id: "p-1".into(),
                    available: 0,
                    requested: 1,
                },
                StatusCode::CONFLICT,
                ErrorCode::InsufficientStock,
            ),
            (
                SaleError::ProductNotFound("p-1".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorCode::ProductNotFound,
            ),
            (
                SaleError::InvalidTransition {
                    sale_id: "s-1".into(),
                    from: SaleStatus::Refunded,
                    to: SaleStatus::Cancelled,
                },
                StatusCode::CONFLICT,
                ErrorCode::InvalidTransition,
            ),
            (
                SaleError::NotFound("s-1".into()),
                StatusCode::NOT_FOUND,
                ErrorCode::NotFound,
            ),
            (
                SaleError::Timeout(Duration::from_secs(5)),
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorCode::Timeout,
            ),
            (
                SaleError::storage("sale s-1", DbError::Busy),
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorCode::DatabaseBusy,
            ),
            (
                SaleError::storage("sale s-1", DbError::QueryFailed("boom".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::DatabaseError,
            ),
        ];

        for (err, status, code) in cases {
            let api = ApiError::from(err);
            assert_eq!(api.status, status, "{api}");
            assert_eq!(api.code, code, "{api}");
        }
    }

    #[test]
    fn test_validation_error_names_field() {
        let api = ApiError::from(SaleError::Validation(ValidationError::MustBePositive {
            field: "quantity".into(),
        }));
        assert_eq!(api.errors.len(), 1);
        assert_eq!(api.errors[0].field, "quantity");

        let json = serde_json::to_value(&api).unwrap();
        assert_eq!(json["code"], "VALIDATION_ERROR");
        assert!(json.get("status").is_none());
    }

    #[test]
    fn test_storage_message_is_generic() {
        let api = ApiError::from(SaleError::storage(
            "sale s-1",
            DbError::QueryFailed("no such column: secret".into()),
        ));
        assert!(!api.message.contains("secret"));
    }
}
