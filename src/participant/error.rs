//! Participant error types

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::api::error_codes;

/// Failures of the 2PC verbs and account queries.
///
/// `code()` values come from the shared taxonomy; `http_status()` matches the
/// wire contract (409 for lock collisions and failed debit checks, 404 for
/// unknown accounts).
#[derive(Error, Debug, Clone)]
pub enum ParticipantError {
    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),

    #[error("Account {account_id} is locked by another transaction")]
    LockConflict { account_id: Uuid },

    #[error("Account {account_id} is not locked by transaction {transaction_id}")]
    LockMismatch {
        account_id: Uuid,
        transaction_id: Uuid,
    },

    #[error("Re-prepare delta does not match the held reservation")]
    DeltaMismatch {
        account_id: Uuid,
        held: Decimal,
        requested: Decimal,
    },

    #[error("Insufficient funds on account {account_id}")]
    InsufficientFunds {
        account_id: Uuid,
        current_balance: Decimal,
    },

    #[error("Amount sign does not match operation: {0}")]
    InvalidDelta(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl ParticipantError {
    /// Error code for response bodies
    pub fn code(&self) -> &'static str {
        match self {
            ParticipantError::AccountNotFound(_) => error_codes::NOT_FOUND,
            ParticipantError::LockConflict { .. }
            | ParticipantError::LockMismatch { .. }
            | ParticipantError::DeltaMismatch { .. } => error_codes::CONFLICT,
            ParticipantError::InsufficientFunds { .. } => error_codes::INSUFFICIENT_FUNDS,
            ParticipantError::InvalidDelta(_) => error_codes::INVALID_ARGUMENT,
            ParticipantError::Database(_) => error_codes::INTERNAL,
        }
    }

    /// HTTP status for the wire response
    pub fn http_status(&self) -> u16 {
        match self {
            ParticipantError::AccountNotFound(_) => 404,
            ParticipantError::LockConflict { .. }
            | ParticipantError::LockMismatch { .. }
            | ParticipantError::DeltaMismatch { .. }
            | ParticipantError::InsufficientFunds { .. } => 409,
            ParticipantError::InvalidDelta(_) => 400,
            ParticipantError::Database(_) => 500,
        }
    }

    /// Structured context for the `error.details` field
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            ParticipantError::InsufficientFunds {
                account_id,
                current_balance,
            } => Some(serde_json::json!({
                "account_id": account_id,
                "current_balance": current_balance,
            })),
            ParticipantError::LockConflict { account_id }
            | ParticipantError::LockMismatch { account_id, .. } => Some(serde_json::json!({
                "account_id": account_id,
            })),
            ParticipantError::DeltaMismatch {
                account_id,
                held,
                requested,
            } => Some(serde_json::json!({
                "account_id": account_id,
                "held": held,
                "requested": requested,
            })),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for ParticipantError {
    fn from(e: sqlx::Error) -> Self {
        ParticipantError::Database(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        let id = Uuid::nil();
        assert_eq!(ParticipantError::AccountNotFound(id).code(), "NOT_FOUND");
        assert_eq!(
            ParticipantError::LockConflict { account_id: id }.code(),
            "CONFLICT"
        );
        assert_eq!(
            ParticipantError::InsufficientFunds {
                account_id: id,
                current_balance: Decimal::ZERO,
            }
            .code(),
            "INSUFFICIENT_FUNDS"
        );
    }

    #[test]
    fn test_http_status() {
        let id = Uuid::nil();
        assert_eq!(ParticipantError::AccountNotFound(id).http_status(), 404);
        assert_eq!(
            ParticipantError::LockConflict { account_id: id }.http_status(),
            409
        );
        assert_eq!(
            ParticipantError::InsufficientFunds {
                account_id: id,
                current_balance: Decimal::ZERO,
            }
            .http_status(),
            409
        );
        assert_eq!(
            ParticipantError::InvalidDelta("x".into()).http_status(),
            400
        );
    }

    #[test]
    fn test_insufficient_funds_details() {
        let id = Uuid::nil();
        let details = ParticipantError::InsufficientFunds {
            account_id: id,
            current_balance: Decimal::new(10_000_000, 4),
        }
        .details()
        .unwrap();
        assert_eq!(details["current_balance"], "1000.0000");
    }
}
