//! Transfer coordinator
//!
//! Drives the two-phase commit for one transfer: persist the pending row,
//! prepare both sides concurrently, collect votes, deliver the decision, and
//! finalize the row exactly once. The coordinator keeps no in-memory transfer
//! state between requests; everything it needs to recover is the row.

use std::sync::Arc;

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::client::{AbortReason, ParticipantClient, PrepareOutcome, credit_request, debit_request};
use super::error::CoordinatorError;
use super::txlog::{BeginOutcome, TransactionLog};
use super::types::{
    RetriedOutcome, TransactionRecord, TransferOutcome, TransferPhase, TransferSpec, TxStatus,
};
use crate::api::error_codes;
use crate::config::TwoPhaseConfig;
use crate::participant::types::CommitDetails;

/// Global decision after the voting phase
#[derive(Debug)]
enum Decision {
    Commit,
    Abort(AbortReason),
}

/// Fold the two votes into a decision.
///
/// Both must vote commit; otherwise the most informative abort reason wins:
/// a business refusal (insufficient funds, lock conflict) over a silent
/// channel, so the client sees why the transfer itself could not happen.
fn decide(debit: &PrepareOutcome, credit: &PrepareOutcome) -> Decision {
    let mut reasons = Vec::new();
    for outcome in [debit, credit] {
        if let PrepareOutcome::Abort(reason) = outcome {
            reasons.push(reason.clone());
        }
    }
    if reasons.is_empty() {
        return Decision::Commit;
    }
    let business = reasons
        .iter()
        .find(|r| r.code != error_codes::TRANSPORT)
        .cloned();
    Decision::Abort(business.unwrap_or_else(|| reasons[0].clone()))
}

struct Attempt {
    outcome: TransferOutcome,
    /// The row was already terminal before this attempt ran any phase
    row_already_terminal: bool,
}

/// Per-side result of a reconcile pass
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReconcileSide {
    pub account_id: Uuid,
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub new_balance: Option<rust_decimal::Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of re-driving the commit decision of a committed transaction
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReconcileReport {
    pub transaction_id: Uuid,
    pub source: ReconcileSide,
    pub destination: ReconcileSide,
}

pub struct TransferCoordinator {
    log: Arc<TransactionLog>,
    participant: Arc<dyn ParticipantClient>,
    config: TwoPhaseConfig,
}

impl TransferCoordinator {
    pub fn new(
        log: Arc<TransactionLog>,
        participant: Arc<dyn ParticipantClient>,
        config: TwoPhaseConfig,
    ) -> Self {
        Self {
            log,
            participant,
            config,
        }
    }

    /// Access to the log for handlers and the sweeper
    pub fn log(&self) -> &Arc<TransactionLog> {
        &self.log
    }

    /// Run one full protocol attempt. Aborted outcomes finalize the row.
    pub async fn transfer(
        &self,
        spec: TransferSpec,
    ) -> Result<TransferOutcome, CoordinatorError> {
        let transaction_id = spec.transaction_id.unwrap_or_else(Uuid::new_v4);
        Ok(self.attempt(transaction_id, &spec, true).await?.outcome)
    }

    /// Re-attempt the full protocol up to `max_retries` times with a fixed
    /// delay, reusing the transaction id so participants recognize the same
    /// transaction on re-prepare. Stops on the first committed outcome.
    ///
    /// Intermediate aborted attempts release participant locks but leave the
    /// row pending; only the final attempt finalizes an abort, so the status
    /// column stays a sink.
    pub async fn transfer_with_retry(
        &self,
        spec: TransferSpec,
    ) -> Result<RetriedOutcome, CoordinatorError> {
        let transaction_id = spec.transaction_id.unwrap_or_else(Uuid::new_v4);
        let total_attempts = self.config.max_retries.max(1);

        let mut attempt_no = 1;
        loop {
            let last = attempt_no >= total_attempts;
            let attempt = self.attempt(transaction_id, &spec, last).await?;

            if attempt.outcome.is_committed() || attempt.row_already_terminal || last {
                return Ok(RetriedOutcome {
                    outcome: attempt.outcome,
                    retry_attempt: attempt_no,
                    total_attempts,
                });
            }

            tracing::info!(
                transaction_id = %transaction_id,
                attempt = attempt_no,
                "Transfer attempt aborted; retrying after {:?}",
                self.config.retry_delay()
            );
            tokio::time::sleep(self.config.retry_delay()).await;
            attempt_no += 1;
        }
    }

    async fn attempt(
        &self,
        transaction_id: Uuid,
        spec: &TransferSpec,
        finalize_abort: bool,
    ) -> Result<Attempt, CoordinatorError> {
        spec.validate()?;
        let amount = spec.amount.as_decimal();

        match self
            .log
            .begin(
                transaction_id,
                spec.source_account_id,
                spec.destination_account_id,
                amount,
            )
            .await?
        {
            BeginOutcome::Existing(record) if record.status == TxStatus::Committed => {
                tracing::info!(
                    transaction_id = %transaction_id,
                    "Transfer already committed; answering from the log"
                );
                return Ok(Attempt {
                    outcome: self.outcome(
                        transaction_id,
                        spec,
                        TxStatus::Committed,
                        None,
                        "Transfer committed".to_string(),
                        None,
                    ),
                    row_already_terminal: true,
                });
            }
            BeginOutcome::Existing(record) if record.status == TxStatus::Aborted => {
                return Ok(Attempt {
                    outcome: self.outcome(
                        transaction_id,
                        spec,
                        TxStatus::Aborted,
                        Some(error_codes::CONFLICT.to_string()),
                        "Transfer was already aborted".to_string(),
                        None,
                    ),
                    row_already_terminal: true,
                });
            }
            _ => {}
        }

        tracing::debug!(
            transaction_id = %transaction_id,
            phase = %TransferPhase::Preparing,
            source = %spec.source_account_id,
            destination = %spec.destination_account_id,
            amount = %amount,
            "Dispatching prepares"
        );

        let debit = debit_request(transaction_id, spec.source_account_id, spec.amount);
        let credit = credit_request(transaction_id, spec.destination_account_id, spec.amount);
        let (debit_vote, credit_vote) = tokio::join!(
            self.participant.prepare(debit),
            self.participant.prepare(credit)
        );

        match decide(&debit_vote, &credit_vote) {
            Decision::Commit => Ok(Attempt {
                outcome: self.run_commit_phase(transaction_id, spec).await,
                row_already_terminal: false,
            }),
            Decision::Abort(reason) => Ok(Attempt {
                outcome: self
                    .run_abort_phase(transaction_id, spec, reason, finalize_abort)
                    .await,
                row_already_terminal: false,
            }),
        }
    }

    /// Both sides voted commit: deliver the decision. Commit is expected to
    /// succeed; a failed delivery does not demote the outcome, because the
    /// other side may already have applied its delta. It is reported as a
    /// critical diagnostic for operator reconciliation instead.
    async fn run_commit_phase(&self, transaction_id: Uuid, spec: &TransferSpec) -> TransferOutcome {
        tracing::debug!(
            transaction_id = %transaction_id,
            phase = %TransferPhase::Committing,
            "Both votes commit; delivering decision"
        );

        let (source_result, destination_result) = tokio::join!(
            self.participant.commit(transaction_id, spec.source_account_id),
            self.participant
                .commit(transaction_id, spec.destination_account_id)
        );

        let mut failures = Vec::new();
        for (account_id, result) in [
            (spec.source_account_id, &source_result),
            (spec.destination_account_id, &destination_result),
        ] {
            if let Err(e) = result {
                tracing::error!(
                    critical = true,
                    transaction_id = %transaction_id,
                    account_id = %account_id,
                    code = e.code(),
                    "Commit delivery failed after global commit decision: {}",
                    e
                );
                failures.push(serde_json::json!({
                    "account_id": account_id,
                    "code": e.code(),
                    "message": e.to_string(),
                }));
            }
        }

        match self.log.finalize(transaction_id, TxStatus::Committed).await {
            Ok(true) => {}
            Ok(false) => {
                // Row left pending by us, so someone else finalized it. If
                // the sweeper aborted it while commits were in flight, the
                // participants hold the truth; flag it.
                tracing::error!(
                    critical = true,
                    transaction_id = %transaction_id,
                    "Transaction row was finalized concurrently during commit delivery"
                );
            }
            Err(e) => {
                tracing::error!(
                    critical = true,
                    transaction_id = %transaction_id,
                    "Failed to finalize committed transaction: {}",
                    e
                );
            }
        }

        if failures.is_empty() {
            self.outcome(
                transaction_id,
                spec,
                TxStatus::Committed,
                None,
                "Transfer committed".to_string(),
                None,
            )
        } else {
            self.outcome(
                transaction_id,
                spec,
                TxStatus::Committed,
                Some(error_codes::CRITICAL.to_string()),
                "Transfer committed; a commit delivery failed and needs reconciliation"
                    .to_string(),
                Some(serde_json::json!({ "failed_commits": failures })),
            )
        }
    }

    /// The decision is abort: release any reservation on both sides. Abort
    /// delivery failures only get logged; the participant's verb is
    /// idempotent and the sweeper retries later.
    async fn run_abort_phase(
        &self,
        transaction_id: Uuid,
        spec: &TransferSpec,
        reason: AbortReason,
        finalize: bool,
    ) -> TransferOutcome {
        tracing::info!(
            transaction_id = %transaction_id,
            phase = %TransferPhase::Aborting,
            code = %reason.code,
            "Aborting transfer: {}",
            reason.message
        );

        let (source_result, destination_result) = tokio::join!(
            self.participant.abort(transaction_id, spec.source_account_id),
            self.participant
                .abort(transaction_id, spec.destination_account_id)
        );
        for (account_id, result) in [
            (spec.source_account_id, source_result),
            (spec.destination_account_id, destination_result),
        ] {
            if let Err(e) = result {
                tracing::warn!(
                    transaction_id = %transaction_id,
                    account_id = %account_id,
                    "Abort delivery failed (sweeper will retry): {}",
                    e
                );
            }
        }

        if finalize {
            match self.log.finalize(transaction_id, TxStatus::Aborted).await {
                Ok(_) => {}
                Err(e) => tracing::warn!(
                    transaction_id = %transaction_id,
                    "Failed to finalize aborted transaction (sweeper will retry): {}",
                    e
                ),
            }
        }

        self.outcome(
            transaction_id,
            spec,
            TxStatus::Aborted,
            Some(reason.code),
            reason.message,
            reason.details,
        )
    }

    /// Re-drive the commit decision of a committed transaction and report
    /// what each side answered. The participant's recent-commit table makes
    /// replayed deliveries safe.
    pub async fn reconcile(
        &self,
        transaction_id: Uuid,
    ) -> Result<ReconcileReport, CoordinatorError> {
        let record = self
            .log
            .get(transaction_id)
            .await?
            .ok_or_else(|| CoordinatorError::NotFound(transaction_id.to_string()))?;

        if record.status != TxStatus::Committed {
            return Err(CoordinatorError::InvalidArgument(format!(
                "transaction {} is {}, only committed transactions can be reconciled",
                transaction_id, record.status
            )));
        }

        let (source_result, destination_result) = tokio::join!(
            self.participant
                .commit(transaction_id, record.source_account_id),
            self.participant
                .commit(transaction_id, record.destination_account_id)
        );

        Ok(ReconcileReport {
            transaction_id,
            source: side_report(record.source_account_id, source_result),
            destination: side_report(record.destination_account_id, destination_result),
        })
    }

    /// Fetch the coordinator's view of one transaction
    pub async fn status(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<TransactionRecord>, CoordinatorError> {
        self.log.get(transaction_id).await
    }

    fn outcome(
        &self,
        transaction_id: Uuid,
        spec: &TransferSpec,
        status: TxStatus,
        code: Option<String>,
        message: String,
        details: Option<serde_json::Value>,
    ) -> TransferOutcome {
        TransferOutcome {
            transaction_id,
            status,
            source_account_id: spec.source_account_id,
            destination_account_id: spec.destination_account_id,
            amount: spec.amount.as_decimal(),
            code,
            message,
            details,
        }
    }
}

fn side_report(
    account_id: Uuid,
    result: Result<CommitDetails, CoordinatorError>,
) -> ReconcileSide {
    match result {
        Ok(details) => ReconcileSide {
            account_id,
            applied: true,
            new_balance: Some(details.new_balance),
            error: None,
        },
        Err(e) => ReconcileSide {
            account_id,
            applied: false,
            new_balance: None,
            error: Some(e.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::participant::types::{Operation, PrepareDetails};
    use rust_decimal::Decimal;

    fn commit_vote() -> PrepareOutcome {
        PrepareOutcome::Commit(PrepareDetails {
            account_id: Uuid::new_v4(),
            current_balance: Decimal::new(1_000_0000, 4),
            pending_change: Decimal::new(-50_0000, 4),
            operation: Operation::Debit,
        })
    }

    fn abort_vote(code: &str) -> PrepareOutcome {
        PrepareOutcome::Abort(AbortReason {
            code: code.to_string(),
            message: "nope".to_string(),
            details: None,
        })
    }

    #[test]
    fn test_decide_commit_requires_both_votes() {
        assert!(matches!(
            decide(&commit_vote(), &commit_vote()),
            Decision::Commit
        ));
        assert!(matches!(
            decide(&commit_vote(), &abort_vote("CONFLICT")),
            Decision::Abort(_)
        ));
        assert!(matches!(
            decide(&abort_vote("CONFLICT"), &commit_vote()),
            Decision::Abort(_)
        ));
    }

    #[test]
    fn test_decide_prefers_business_reason_over_transport() {
        let decision = decide(
            &abort_vote("TRANSPORT"),
            &abort_vote("INSUFFICIENT_FUNDS"),
        );
        match decision {
            Decision::Abort(reason) => assert_eq!(reason.code, "INSUFFICIENT_FUNDS"),
            other => panic!("expected abort, got {:?}", other),
        }
    }

    #[test]
    fn test_decide_transport_only_keeps_transport_code() {
        let decision = decide(&abort_vote("TRANSPORT"), &commit_vote());
        match decision {
            Decision::Abort(reason) => assert_eq!(reason.code, "TRANSPORT"),
            other => panic!("expected abort, got {:?}", other),
        }
    }
}
