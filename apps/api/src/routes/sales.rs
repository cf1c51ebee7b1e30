//! # Sale Endpoints
//!
//! ```text
//! GET    /api/v1/sales                          list (filters + pagination)
//! POST   /api/v1/sales                          create
//! GET    /api/v1/sales/{id}                     one sale
//! GET    /api/v1/sales/invoice/{invoice_number} one sale by invoice
//! PATCH  /api/v1/sales/{id}/status              cancel / complete / refund
//!                                               (admin or manager only)
//! ```
//!
//! Handlers only translate HTTP to engine calls; every rule lives in the
//! engine.

use std::str::FromStr;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tracing::debug;

use tally_core::{PaymentMethod, SaleStatus};
use tally_engine::dto::DEFAULT_PER_PAGE;
use tally_engine::{
    CreateSaleRequest, Pagination, SaleDto, SaleFilter, SortField, SortOrder, UpdateStatusRequest,
};

use super::{created, ok, ok_with_meta, ApiResponse, PageMeta};
use crate::auth::Caller;
use crate::error::ApiError;
use crate::AppState;

type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// Handlers
// =============================================================================

pub async fn list_sales(
    State(state): State<AppState>,
    _caller: Caller,
    Query(params): Query<ListSalesParams>,
) -> ApiResult<Json<ApiResponse<Vec<SaleDto>>>> {
    let filter = params.filter()?;
    let pagination = params.pagination();
    debug!(?filter, ?pagination, "list_sales");

    let (sales, total) = state.engine.list_sales(&filter, pagination).await?;
    let meta = PageMeta {
        page: pagination.page,
        per_page: pagination.per_page,
        total,
        total_pages: pagination.total_pages(total),
    };

    Ok(ok_with_meta("Sales retrieved successfully", sales, meta))
}

pub async fn create_sale(
    State(state): State<AppState>,
    caller: Caller,
    body: Result<Json<CreateSaleRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ApiResponse<SaleDto>>)> {
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let sale = state.engine.create_sale(&caller.user_id, request).await?;
    Ok(created("Sale created successfully", sale))
}

pub async fn get_sale(
    State(state): State<AppState>,
    _caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<SaleDto>>> {
    let sale = state.engine.get_sale(&id).await?;
    Ok(ok("Sale retrieved successfully", sale))
}

pub async fn get_sale_by_invoice(
    State(state): State<AppState>,
    _caller: Caller,
    Path(invoice_number): Path<String>,
) -> ApiResult<Json<ApiResponse<SaleDto>>> {
    let sale = state.engine.get_sale_by_invoice(&invoice_number).await?;
    Ok(ok("Sale retrieved successfully", sale))
}

pub async fn update_status(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    body: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<SaleDto>>> {
    caller.require_status_change()?;
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;

    debug!(sale_id = %id, to = %request.status, user_id = %caller.user_id, "update_status");
    let sale = state.engine.update_status(&id, request.status).await?;
    Ok(ok("Sale status updated successfully", sale))
}

// =============================================================================
// Query Parameters
// =============================================================================

/// Raw list query. Pagination values that do not parse fall back to their
/// defaults; filter values that do not parse are rejected.
#[derive(Debug, Default, Deserialize)]
pub struct ListSalesParams {
    pub page: Option<String>,
    pub per_page: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub user_id: Option<String>,
    pub customer_id: Option<String>,
    pub status: Option<String>,
    pub payment_method: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

impl ListSalesParams {
    pub fn pagination(&self) -> Pagination {
        let positive = |raw: &Option<String>| {
            non_empty(raw)
                .and_then(|v| v.parse::<u32>().ok())
                .filter(|n| *n > 0)
        };

        Pagination {
            page: positive(&self.page).unwrap_or(1),
            per_page: positive(&self.per_page).unwrap_or(DEFAULT_PER_PAGE),
            sort: non_empty(&self.sort)
                .and_then(SortField::from_param)
                .unwrap_or_default(),
            order: non_empty(&self.order)
                .and_then(SortOrder::from_param)
                .unwrap_or_default(),
        }
        .normalized()
    }

    pub fn filter(&self) -> ApiResult<SaleFilter> {
        let status = non_empty(&self.status)
            .map(|raw| {
                SaleStatus::from_str(raw).map_err(|_| {
                    ApiError::validation(
                        "status",
                        "status must be one of: pending, completed, cancelled, refunded",
                    )
                })
            })
            .transpose()?;

        let payment_method = non_empty(&self.payment_method)
            .map(|raw| {
                PaymentMethod::from_str(raw).map_err(|_| {
                    ApiError::validation(
                        "payment_method",
                        "payment_method must be one of: cash, card, ewallet, other",
                    )
                })
            })
            .transpose()?;

        Ok(SaleFilter {
            user_id: non_empty(&self.user_id).map(str::to_string),
            customer_id: non_empty(&self.customer_id).map(str::to_string),
            status,
            payment_method,
            date_from: non_empty(&self.date_from)
                .map(|raw| parse_date_param("date_from", raw, false))
                .transpose()?,
            date_to: non_empty(&self.date_to)
                .map(|raw| parse_date_param("date_to", raw, true))
                .transpose()?,
        })
    }
}

fn non_empty(raw: &Option<String>) -> Option<&str> {
    raw.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates. A plain date is
/// the start of that day (UTC), or its last instant when `end_of_day`.
fn parse_date_param(field: &str, raw: &str, end_of_day: bool) -> ApiResult<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    let invalid = || ApiError::validation(field, format!("{field} must be YYYY-MM-DD or RFC 3339"));
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| invalid())?;
    let at = if end_of_day {
        date.and_hms_nano_opt(23, 59, 59, 999_999_999)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    at.map(|naive| naive.and_utc()).ok_or_else(invalid)
}

// =============================================================================
// Unit Tests
// =============================================================================
