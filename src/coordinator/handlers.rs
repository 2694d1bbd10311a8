//! Coordinator HTTP handlers: transfer submission, status, history, and the
//! operator reconcile endpoint.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::CoordinatorState;
use super::coordinator::ReconcileReport;
use super::error::CoordinatorError;
use super::types::{RetriedOutcome, TransactionRecord, TransferSpec, TxStatus};
use crate::api::ApiError;
use crate::money::Amount;

const HISTORY_DEFAULT_LIMIT: i64 = 50;
const HISTORY_MAX_LIMIT: i64 = 200;

/// POST /transfers request body
#[derive(Debug, Deserialize, ToSchema)]
pub struct TransferApiRequest {
    pub source_account_id: Uuid,
    pub destination_account_id: Uuid,
    /// Positive amount, at most 4 decimal places; accepted as number or
    /// string
    #[schema(value_type = String, example = "50.0000")]
    pub amount: Decimal,
    /// Supply to make end-to-end retries idempotent
    pub transaction_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TransferData {
    pub transaction_id: Uuid,
    pub status: TxStatus,
    pub source_account_id: Uuid,
    pub destination_account_id: Uuid,
    #[schema(value_type = String)]
    pub amount: Decimal,
    pub retry_attempt: u32,
    pub total_attempts: u32,
}

/// POST /transfers response body
#[derive(Debug, Serialize, ToSchema)]
pub struct TransferReply {
    pub success: bool,
    pub data: TransferData,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusReply {
    pub success: bool,
    pub data: TransactionRecord,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HistoryReply {
    pub success: bool,
    pub data: Vec<TransactionRecord>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReconcileReply {
    pub success: bool,
    pub data: ReconcileReport,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn map_error(e: CoordinatorError) -> ApiError {
    ApiError::new(
        StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        e.code(),
        e.to_string(),
    )
}

impl TransferReply {
    fn from_retried(retried: RetriedOutcome) -> (StatusCode, Json<Self>) {
        let outcome = retried.outcome;
        let committed = outcome.is_committed();
        let status = if committed {
            StatusCode::OK
        } else {
            StatusCode::CONFLICT
        };

        let mut details = outcome.details;
        if let Some(code) = outcome.code {
            let entry = details.get_or_insert_with(|| serde_json::json!({}));
            if let Some(map) = entry.as_object_mut() {
                map.insert("code".to_string(), serde_json::json!(code));
            }
        }

        (
            status,
            Json(Self {
                success: committed,
                data: TransferData {
                    transaction_id: outcome.transaction_id,
                    status: outcome.status,
                    source_account_id: outcome.source_account_id,
                    destination_account_id: outcome.destination_account_id,
                    amount: outcome.amount,
                    retry_attempt: retried.retry_attempt,
                    total_attempts: retried.total_attempts,
                },
                message: outcome.message,
                details,
            }),
        )
    }
}

/// POST /transfers
///
/// Runs the transfer with retry. 200 on committed, 409 on aborted; the
/// originating error code rides in `details.code`.
#[utoipa::path(
    post,
    path = "/transfers",
    request_body = TransferApiRequest,
    responses(
        (status = 200, description = "Transfer committed", body = TransferReply),
        (status = 400, description = "Invalid arguments"),
        (status = 409, description = "Transfer aborted", body = TransferReply)
    ),
    security(("bearer_auth" = [])),
    tag = "transfers"
)]
pub async fn create_transfer(
    State(state): State<Arc<CoordinatorState>>,
    Json(req): Json<TransferApiRequest>,
) -> Result<(StatusCode, Json<TransferReply>), ApiError> {
    let amount = Amount::new(req.amount)
        .map_err(|e| ApiError::invalid_argument(e.to_string()))?;

    let spec = TransferSpec {
        source_account_id: req.source_account_id,
        destination_account_id: req.destination_account_id,
        amount,
        transaction_id: req.transaction_id,
    };

    let retried = state
        .coordinator
        .transfer_with_retry(spec)
        .await
        .map_err(map_error)?;

    Ok(TransferReply::from_retried(retried))
}

/// GET /transfers/status/{transaction_id}
#[utoipa::path(
    get,
    path = "/transfers/status/{transaction_id}",
    params(("transaction_id" = Uuid, Path, description = "Transaction identifier")),
    responses(
        (status = 200, description = "Coordinator view of the transaction", body = StatusReply),
        (status = 404, description = "Unknown transaction")
    ),
    security(("bearer_auth" = [])),
    tag = "transfers"
)]
pub async fn get_status(
    State(state): State<Arc<CoordinatorState>>,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<StatusReply>, ApiError> {
    let record = state
        .coordinator
        .status(transaction_id)
        .await
        .map_err(map_error)?
        .ok_or_else(|| {
            ApiError::not_found(format!("Transaction not found: {}", transaction_id))
        })?;

    Ok(Json(StatusReply {
        success: true,
        data: record,
    }))
}

/// GET /transfers/history/{account_id}?limit&offset
#[utoipa::path(
    get,
    path = "/transfers/history/{account_id}",
    params(
        ("account_id" = Uuid, Path, description = "Account identifier"),
        ("limit" = Option<i64>, Query, description = "Page size (max 200)"),
        ("offset" = Option<i64>, Query, description = "Page offset")
    ),
    responses(
        (status = 200, description = "Transfers touching the account, newest first", body = HistoryReply)
    ),
    security(("bearer_auth" = [])),
    tag = "transfers"
)]
pub async fn get_history(
    State(state): State<Arc<CoordinatorState>>,
    Path(account_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryReply>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(HISTORY_DEFAULT_LIMIT)
        .clamp(1, HISTORY_MAX_LIMIT);
    let offset = query.offset.unwrap_or(0).max(0);

    let records = state
        .coordinator
        .log()
        .history(account_id, limit, offset)
        .await
        .map_err(map_error)?;

    Ok(Json(HistoryReply {
        success: true,
        data: records,
    }))
}

/// POST /transfers/{transaction_id}/reconcile
///
/// Re-delivers the commit decision of a committed transaction and reports
/// each side's answer. Service-token only.
#[utoipa::path(
    post,
    path = "/transfers/{transaction_id}/reconcile",
    params(("transaction_id" = Uuid, Path, description = "Transaction identifier")),
    responses(
        (status = 200, description = "Per-side reconcile results", body = ReconcileReply),
        (status = 400, description = "Transaction is not committed"),
        (status = 404, description = "Unknown transaction")
    ),
    security(("bearer_auth" = [])),
    tag = "transfers"
)]
pub async fn reconcile(
    State(state): State<Arc<CoordinatorState>>,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<ReconcileReply>, ApiError> {
    let report = state
        .coordinator
        .reconcile(transaction_id)
        .await
        .map_err(map_error)?;

    Ok(Json(ReconcileReply {
        success: true,
        data: report,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error_codes;
    use crate::coordinator::types::TransferOutcome;

    fn outcome(status: TxStatus, code: Option<&str>) -> RetriedOutcome {
        RetriedOutcome {
            outcome: TransferOutcome {
                transaction_id: Uuid::new_v4(),
                status,
                source_account_id: Uuid::new_v4(),
                destination_account_id: Uuid::new_v4(),
                amount: Decimal::new(50_0000, 4),
                code: code.map(|c| c.to_string()),
                message: "m".to_string(),
                details: None,
            },
            retry_attempt: 1,
            total_attempts: 3,
        }
    }

    #[test]
    fn test_committed_reply_is_200() {
        let (status, Json(reply)) =
            TransferReply::from_retried(outcome(TxStatus::Committed, None));
        assert_eq!(status, StatusCode::OK);
        assert!(reply.success);
        assert!(reply.details.is_none());
    }

    #[test]
    fn test_aborted_reply_is_409_with_code() {
        let (status, Json(reply)) = TransferReply::from_retried(outcome(
            TxStatus::Aborted,
            Some(error_codes::INSUFFICIENT_FUNDS),
        ));
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(!reply.success);
        assert_eq!(
            reply.details.unwrap()["code"],
            error_codes::INSUFFICIENT_FUNDS
        );
    }

    #[test]
    fn test_critical_commit_keeps_200() {
        let (status, Json(reply)) = TransferReply::from_retried(outcome(
            TxStatus::Committed,
            Some(error_codes::CRITICAL),
        ));
        assert_eq!(status, StatusCode::OK);
        assert!(reply.success);
        assert_eq!(reply.details.unwrap()["code"], error_codes::CRITICAL);
    }
}
