//! Caller resolution.
//!
//! Authentication happens upstream; by the time a request reaches the relay
//! the caller's id is carried in a trusted header whose name is configured
//! through `AUTH_HEADER`.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::errors::AppError;
use crate::state::AppState;

/// Identity of the caller owning the conversations a request touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub id: String,
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(state.auth_header.as_ref())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::Unauthorized("No caller id on request".to_string()))?;

        Ok(Self { id: id.to_string() })
    }
}
