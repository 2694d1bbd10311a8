//! Participant HTTP handlers: the three 2PC verbs plus lock and balance
//! queries.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use super::ParticipantState;
use super::error::ParticipantError;
use super::types::{
    AbortResponse, BalanceResponse, CommitResponse, DecisionRequest, LockStatusDetails,
    LockStatusResponse, PrepareRequest, PrepareResponse, Vote,
};
use crate::api::{ApiError, ErrorBody};

fn error_body(e: &ParticipantError) -> ErrorBody {
    ErrorBody {
        code: e.code().to_string(),
        message: e.to_string(),
        details: e.details(),
    }
}

fn status_of(e: &ParticipantError) -> StatusCode {
    StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// POST /2pc/prepare
///
/// Votes commit and reserves the balance change, or votes abort with the
/// reason in `error.code`.
#[utoipa::path(
    post,
    path = "/2pc/prepare",
    request_body = PrepareRequest,
    responses(
        (status = 200, description = "Vote commit; reservation held", body = PrepareResponse),
        (status = 404, description = "Unknown account; vote abort", body = PrepareResponse),
        (status = 409, description = "Lock collision or insufficient funds; vote abort", body = PrepareResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "2pc"
)]
pub async fn prepare(
    State(state): State<Arc<ParticipantState>>,
    Json(req): Json<PrepareRequest>,
) -> (StatusCode, Json<PrepareResponse>) {
    match state
        .ledger
        .prepare(req.transaction_id, req.account_id, req.amount, req.operation)
        .await
    {
        Ok(details) => (
            StatusCode::OK,
            Json(PrepareResponse {
                success: true,
                vote: Vote::Commit,
                details: Some(details),
                error: None,
            }),
        ),
        Err(e) => {
            tracing::info!(
                transaction_id = %req.transaction_id,
                account_id = %req.account_id,
                code = e.code(),
                "Prepare voted abort: {}",
                e
            );
            (
                status_of(&e),
                Json(PrepareResponse {
                    success: false,
                    vote: Vote::Abort,
                    details: None,
                    error: Some(error_body(&e)),
                }),
            )
        }
    }
}

/// POST /2pc/commit
///
/// Applies the reserved delta. Fails with CONFLICT when the lock does not
/// match, which is the coordinator's cue to investigate.
#[utoipa::path(
    post,
    path = "/2pc/commit",
    request_body = DecisionRequest,
    responses(
        (status = 200, description = "Delta applied", body = CommitResponse),
        (status = 409, description = "Lock mismatch", body = CommitResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "2pc"
)]
pub async fn commit(
    State(state): State<Arc<ParticipantState>>,
    Json(req): Json<DecisionRequest>,
) -> (StatusCode, Json<CommitResponse>) {
    match state
        .ledger
        .commit(req.transaction_id, req.account_id)
        .await
    {
        Ok(details) => (
            StatusCode::OK,
            Json(CommitResponse {
                success: true,
                details: Some(details),
                error: None,
            }),
        ),
        Err(e) => {
            tracing::warn!(
                transaction_id = %req.transaction_id,
                account_id = %req.account_id,
                code = e.code(),
                "Commit rejected: {}",
                e
            );
            (
                status_of(&e),
                Json(CommitResponse {
                    success: false,
                    details: None,
                    error: Some(error_body(&e)),
                }),
            )
        }
    }
}

/// POST /2pc/abort
///
/// Releases the reservation if held; succeeds silently otherwise.
#[utoipa::path(
    post,
    path = "/2pc/abort",
    request_body = DecisionRequest,
    responses(
        (status = 200, description = "Reservation released (or was not held)", body = AbortResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "2pc"
)]
pub async fn abort(
    State(state): State<Arc<ParticipantState>>,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<AbortResponse>, ApiError> {
    state
        .ledger
        .abort(req.transaction_id, req.account_id)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(AbortResponse { success: true }))
}

/// GET /2pc/locks/{transaction_id}
///
/// Reports whether any account still holds a lock for the transaction; used
/// by the coordinator's sweeper before reclaiming a stale pending row.
#[utoipa::path(
    get,
    path = "/2pc/locks/{transaction_id}",
    params(("transaction_id" = Uuid, Path, description = "Transaction identifier")),
    responses(
        (status = 200, description = "Lock state", body = LockStatusResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "2pc"
)]
pub async fn lock_status(
    State(state): State<Arc<ParticipantState>>,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<LockStatusResponse>, ApiError> {
    let held_by = state
        .ledger
        .lock_status(transaction_id)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(LockStatusResponse {
        success: true,
        details: LockStatusDetails {
            held: held_by.is_some(),
            account_id: held_by,
        },
    }))
}

/// GET /accounts/{account_id}/balance
#[utoipa::path(
    get,
    path = "/accounts/{account_id}/balance",
    params(("account_id" = Uuid, Path, description = "Account identifier")),
    responses(
        (status = 200, description = "Account state", body = BalanceResponse),
        (status = 404, description = "Unknown account")
    ),
    security(("bearer_auth" = [])),
    tag = "accounts"
)]
pub async fn balance(
    State(state): State<Arc<ParticipantState>>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let account = state
        .ledger
        .get(account_id)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?
        .ok_or_else(|| ApiError::not_found(format!("Account not found: {}", account_id)))?;

    Ok(Json(BalanceResponse {
        success: true,
        data: account,
    }))
}
