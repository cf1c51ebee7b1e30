//! Caller identity.
//!
//! Authentication happens upstream (gateway or auth proxy), which forwards
//! the verified identity in two headers:
//!
//! - `X-User-Id`: required, the acting user recorded on each sale
//! - `X-User-Role`: `admin`, `manager` or `cashier` (default `cashier`)

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Manager,
    Cashier,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "manager" => Some(Role::Manager),
            "cashier" => Some(Role::Cashier),
            _ => None,
        }
    }

    /// May cancel and refund sales.
    pub fn can_change_status(&self) -> bool {
        matches!(self, Role::Admin | Role::Manager)
    }
}

/// The authenticated user making the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub role: Role,
}

impl Caller {
    pub fn require_status_change(&self) -> Result<(), ApiError> {
        if self.role.can_change_status() {
            Ok(())
        } else {
            Err(ApiError::forbidden("Only admins and managers can change sale status"))
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(parts, USER_ID_HEADER)
            .ok_or_else(|| ApiError::unauthorized("User not authenticated"))?
            .to_string();

        let role = match header(parts, USER_ROLE_HEADER) {
            None => Role::Cashier,
            Some(raw) => Role::parse(raw).ok_or_else(|| ApiError::unauthorized("Unknown user role"))?,
        };

        Ok(Caller { user_id, role })
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
