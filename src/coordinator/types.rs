//! Coordinator core types
//!
//! Status IDs are stored as SMALLINT; the status column is a sink automaton:
//! once a row reaches COMMITTED or ABORTED it never changes again.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::money::Amount;

/// Transaction row status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum TxStatus {
    /// Row inserted, outcome not yet decided
    Pending = 0,
    /// Terminal: both participants applied their deltas
    Committed = 1,
    /// Terminal: no balance changed
    Aborted = 2,
}

impl TxStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxStatus::Committed | TxStatus::Aborted)
    }

    /// Numeric ID for SMALLINT storage
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(TxStatus::Pending),
            1 => Some(TxStatus::Committed),
            2 => Some(TxStatus::Aborted),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Committed => "committed",
            TxStatus::Aborted => "aborted",
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coordinator-side view of one transfer as it moves through the protocol.
/// Used for tracing; durable state is only ever the row status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    Preparing,
    Committing,
    Aborting,
}

impl TransferPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferPhase::Preparing => "PREPARING",
            TransferPhase::Committing => "COMMITTING",
            TransferPhase::Aborting => "ABORTING",
        }
    }
}

impl fmt::Display for TransferPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row of the transaction log
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransactionRecord {
    pub transaction_id: Uuid,
    pub source_account_id: Uuid,
    pub destination_account_id: Uuid,
    #[schema(value_type = String)]
    pub amount: Decimal,
    pub status: TxStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A validated transfer request as the coordinator works with it
#[derive(Debug, Clone)]
pub struct TransferSpec {
    pub source_account_id: Uuid,
    pub destination_account_id: Uuid,
    pub amount: Amount,
    /// Client-supplied identifier for end-to-end idempotent retry
    pub transaction_id: Option<Uuid>,
}

impl TransferSpec {
    /// Reject self-referential transfers before any side effect. Amount
    /// positivity is already enforced by the `Amount` type.
    pub fn validate(&self) -> Result<(), super::error::CoordinatorError> {
        if self.source_account_id == self.destination_account_id {
            return Err(super::error::CoordinatorError::InvalidArgument(
                "source and destination accounts must differ".to_string(),
            ));
        }
        Ok(())
    }
}

/// Terminal result of a transfer attempt
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub transaction_id: Uuid,
    pub status: TxStatus,
    pub source_account_id: Uuid,
    pub destination_account_id: Uuid,
    pub amount: Decimal,
    /// Originating error code when aborted, CRITICAL when a commit decision
    /// could not be fully delivered
    pub code: Option<String>,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl TransferOutcome {
    pub fn is_committed(&self) -> bool {
        self.status == TxStatus::Committed
    }
}

/// Outcome of `transfer_with_retry`, with attempt accounting
#[derive(Debug, Clone)]
pub struct RetriedOutcome {
    pub outcome: TransferOutcome,
    /// 1-based attempt that produced the outcome
    pub retry_attempt: u32,
    pub total_attempts: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_id_roundtrip() {
        for status in [TxStatus::Pending, TxStatus::Committed, TxStatus::Aborted] {
            assert_eq!(TxStatus::from_id(status.id()), Some(status));
        }
        assert_eq!(TxStatus::from_id(3), None);
        assert_eq!(TxStatus::from_id(-1), None);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!TxStatus::Pending.is_terminal());
        assert!(TxStatus::Committed.is_terminal());
        assert!(TxStatus::Aborted.is_terminal());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&TxStatus::Committed).unwrap(),
            "\"committed\""
        );
    }

    #[test]
    fn test_spec_rejects_self_transfer() {
        let id = Uuid::new_v4();
        let spec = TransferSpec {
            source_account_id: id,
            destination_account_id: id,
            amount: "10".parse().unwrap(),
            transaction_id: None,
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_spec_accepts_distinct_accounts() {
        let spec = TransferSpec {
            source_account_id: Uuid::new_v4(),
            destination_account_id: Uuid::new_v4(),
            amount: "10".parse().unwrap(),
            transaction_id: None,
        };
        assert!(spec.validate().is_ok());
    }
}
