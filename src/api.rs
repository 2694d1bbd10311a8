//! API response envelope and error codes
//!
//! Every response body carries a `success` flag. Errors carry a structured
//! `error` object with a code from the shared taxonomy, so clients and the
//! coordinator's participant client can branch on `error.code` instead of
//! parsing messages.

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Shared error code taxonomy
pub mod error_codes {
    /// Malformed or self-referential transfer; rejected before side effects
    pub const INVALID_ARGUMENT: &str = "INVALID_ARGUMENT";
    /// Account or transaction unknown
    pub const NOT_FOUND: &str = "NOT_FOUND";
    /// Prepare-time debit check failed
    pub const INSUFFICIENT_FUNDS: &str = "INSUFFICIENT_FUNDS";
    /// Lock collision on prepare; lock mismatch on commit/abort
    pub const CONFLICT: &str = "CONFLICT";
    /// Timeout or connection failure in the 2PC channel
    pub const TRANSPORT: &str = "TRANSPORT";
    /// Post-decision inconsistency (some commit succeeded, some did not)
    pub const CRITICAL: &str = "CRITICAL";
    /// Bearer token missing, malformed, or expired
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    /// Unclassified server-side failure
    pub const INTERNAL: &str = "INTERNAL";
}

/// Structured error object carried in every failure body
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    #[schema(example = "CONFLICT")]
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub details: Option<serde_json::Value>,
}

/// Generic failure envelope: `{ "success": false, "error": { ... } }`
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: ErrorBody,
}

/// Unified API error with automatic IntoResponse
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// 400 with INVALID_ARGUMENT
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            error_codes::INVALID_ARGUMENT,
            msg,
        )
    }

    /// 404 with NOT_FOUND
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, error_codes::NOT_FOUND, msg)
    }

    /// 409 with CONFLICT
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, error_codes::CONFLICT, msg)
    }

    /// 401 with UNAUTHORIZED
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, error_codes::UNAUTHORIZED, msg)
    }

    /// 500 with INTERNAL
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error_codes::INTERNAL, msg)
    }

    pub fn body(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            success: false,
            error: ErrorBody {
                code: self.code.to_string(),
                message: self.message.clone(),
                details: self.details.clone(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_envelope_shape() {
        let err = ApiError::conflict("account is locked")
            .with_details(serde_json::json!({"account_id": "x"}));
        let body = serde_json::to_value(err.body()).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "CONFLICT");
        assert_eq!(body["error"]["details"]["account_id"], "x");
    }

    #[test]
    fn test_details_omitted_when_absent() {
        let body = serde_json::to_value(ApiError::not_found("no such account").body()).unwrap();
        assert!(body["error"].get("details").is_none());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::invalid_argument("x").status, StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::not_found("x").status, StatusCode::NOT_FOUND);
        assert_eq!(ApiError::conflict("x").status, StatusCode::CONFLICT);
        assert_eq!(ApiError::unauthorized("x").status, StatusCode::UNAUTHORIZED);
    }
}
