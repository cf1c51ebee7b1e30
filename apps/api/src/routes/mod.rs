//! HTTP handlers and the response envelope they share.
//!
//! Every body has the same outer shape:
//! ```json
//! { "success": true, "message": "...", "data": { ... }, "meta": { ... } }
//! ```
//! `meta` is only present on paginated listings. Failures use
//! [`ApiError`](crate::error::ApiError) with `success: false`.

pub mod health;
pub mod sales;

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

/// Successful response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<PageMeta>,
}

/// Pagination details of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
    pub total_pages: u32,
}

pub fn ok<T>(message: &str, data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        message: message.to_string(),
        data: Some(data),
        meta: None,
    })
}

pub fn ok_with_meta<T>(message: &str, data: T, meta: PageMeta) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        message: message.to_string(),
        data: Some(data),
        meta: Some(meta),
    })
}

pub fn created<T>(message: &str, data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::CREATED, ok(message, data))
}
