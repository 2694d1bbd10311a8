//! 2PC wire types
//!
//! Request/response bodies for the prepare/commit/abort verbs. The
//! coordinator's participant client deserializes the same structs, so the two
//! sides cannot drift apart.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::ErrorBody;
use crate::money::SignedAmount;

/// Direction of a prepared balance change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Debit,
    Credit,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Debit => "debit",
            Operation::Credit => "credit",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A participant's answer to a prepare request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Vote {
    Commit,
    Abort,
}

/// POST /2pc/prepare request body
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PrepareRequest {
    pub transaction_id: Uuid,
    pub account_id: Uuid,
    /// Signed delta: negative for debits, positive for credits
    #[schema(value_type = String, example = "-50.0000")]
    pub amount: SignedAmount,
    pub operation: Operation,
}

/// Reservation state reported with a commit vote
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PrepareDetails {
    pub account_id: Uuid,
    #[schema(value_type = String)]
    pub current_balance: Decimal,
    #[schema(value_type = String)]
    pub pending_change: Decimal,
    pub operation: Operation,
}

/// POST /2pc/prepare response body
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PrepareResponse {
    pub success: bool,
    pub vote: Vote,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<PrepareDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// POST /2pc/commit and /2pc/abort request body
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DecisionRequest {
    pub transaction_id: Uuid,
    pub account_id: Uuid,
}

/// Applied balance reported by a successful commit
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CommitDetails {
    pub account_id: Uuid,
    #[schema(value_type = String)]
    pub new_balance: Decimal,
}

/// POST /2pc/commit response body
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CommitResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<CommitDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// POST /2pc/abort response body (idempotent acknowledgement)
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AbortResponse {
    pub success: bool,
}

/// GET /2pc/locks/{transaction_id} response body
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LockStatusResponse {
    pub success: bool,
    pub details: LockStatusDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LockStatusDetails {
    /// Whether any account still holds a lock for the transaction
    pub held: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<Uuid>,
}

/// One account row as stored by the participant
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccountState {
    pub account_id: Uuid,
    pub owner_id: Uuid,
    #[schema(value_type = String)]
    pub balance: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_holder: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub pending_delta: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccountState {
    /// The balance this account would present if the held reservation
    /// committed
    pub fn effective_balance(&self) -> Decimal {
        self.balance + self.pending_delta.unwrap_or(Decimal::ZERO)
    }
}

/// GET /accounts/{account_id}/balance response body
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    pub success: bool,
    pub data: AccountState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_serde() {
        assert_eq!(serde_json::to_string(&Operation::Debit).unwrap(), "\"debit\"");
        let op: Operation = serde_json::from_str("\"credit\"").unwrap();
        assert_eq!(op, Operation::Credit);
    }

    #[test]
    fn test_prepare_request_roundtrip() {
        let body = r#"{
            "transaction_id": "5f1f87aa-5b30-4f9f-9a91-2f3c4ac9d683",
            "account_id": "e3b0c442-98fc-4c14-b39f-92d1282048c0",
            "amount": "-50.0000",
            "operation": "debit"
        }"#;
        let req: PrepareRequest = serde_json::from_str(body).unwrap();
        assert_eq!(req.operation, Operation::Debit);
        assert!(req.amount.is_negative());
    }

    #[test]
    fn test_prepare_request_accepts_numeric_amount() {
        let body = r#"{
            "transaction_id": "5f1f87aa-5b30-4f9f-9a91-2f3c4ac9d683",
            "account_id": "e3b0c442-98fc-4c14-b39f-92d1282048c0",
            "amount": 50.25,
            "operation": "credit"
        }"#;
        let req: PrepareRequest = serde_json::from_str(body).unwrap();
        assert!(!req.amount.is_negative());
    }

    #[test]
    fn test_vote_commit_body_shape() {
        let resp = PrepareResponse {
            success: true,
            vote: Vote::Commit,
            details: None,
            error: None,
        };
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["vote"], "commit");
        assert!(v.get("error").is_none());
    }

    #[test]
    fn test_effective_balance() {
        let now = Utc::now();
        let acct = AccountState {
            account_id: Uuid::nil(),
            owner_id: Uuid::nil(),
            balance: Decimal::new(1_000_0000, 4),
            lock_holder: Some(Uuid::nil()),
            pending_delta: Some(Decimal::new(-50_0000, 4)),
            created_at: now,
            updated_at: now,
        };
        assert_eq!(acct.effective_balance(), Decimal::new(950_0000, 4));
    }
}
