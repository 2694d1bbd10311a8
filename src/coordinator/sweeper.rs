//! Pending-transaction sweeper
//!
//! A coordinator that dies between inserting the pending row and finalizing
//! leaves a dangling *pending* row and possibly a participant lock. This
//! background task reclaims both: it asks the participant whether a lock for
//! the stale transaction is still held, releases it, and finalizes the row as
//! aborted.

use std::sync::Arc;
use std::time::Duration;

use super::client::ParticipantClient;
use super::error::CoordinatorError;
use super::txlog::TransactionLog;
use super::types::TxStatus;
use crate::config::TwoPhaseConfig;

/// Upper bound of rows reclaimed per sweep cycle
const SWEEP_BATCH: i64 = 100;

pub struct PendingSweeper {
    log: Arc<TransactionLog>,
    participant: Arc<dyn ParticipantClient>,
    config: TwoPhaseConfig,
}

impl PendingSweeper {
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

    /// Run the sweep loop forever. Interval is half the transaction timeout
    /// so a dangling row waits at most 1.5 timeouts before reclamation.
    pub async fn run(self) {
        let interval = Duration::from_millis((self.config.transaction_timeout_ms / 2).max(1000));
        tracing::info!("Pending sweeper started (interval {:?})", interval);

        loop {
            tokio::time::sleep(interval).await;
            match self.sweep_once().await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Sweeper reclaimed {} stale transactions", n),
                Err(e) => tracing::warn!("Sweep cycle failed: {}", e),
            }
        }
    }

    /// One sweep pass; returns how many rows were finalized.
    pub async fn sweep_once(&self) -> Result<usize, CoordinatorError> {
        let stale = self
            .log
            .find_stale_pending(self.config.transaction_timeout(), SWEEP_BATCH)
            .await?;

        let mut reclaimed = 0;
        for record in stale {
            let transaction_id = record.transaction_id;

            let held_by = match self.participant.lock_status(transaction_id).await {
                Ok(held_by) => held_by,
                Err(e) => {
                    // Participant unreachable; leave the row for the next pass
                    tracing::warn!(
                        transaction_id = %transaction_id,
                        "Sweeper cannot query lock status: {}",
                        e
                    );
                    continue;
                }
            };

            if let Some(account_id) = held_by {
                tracing::info!(
                    transaction_id = %transaction_id,
                    account_id = %account_id,
                    "Stale transaction still holds a lock; releasing"
                );
            }

            // Abort both sides regardless: the verb succeeds silently when no
            // lock is held, and a lock acquired between the query and here is
            // still released.
            let (source_result, destination_result) = tokio::join!(
                self.participant
                    .abort(transaction_id, record.source_account_id),
                self.participant
                    .abort(transaction_id, record.destination_account_id)
            );
            if source_result.is_err() || destination_result.is_err() {
                tracing::warn!(
                    transaction_id = %transaction_id,
                    "Sweeper abort delivery failed; retrying next cycle"
                );
                continue;
            }

            if self.log.finalize(transaction_id, TxStatus::Aborted).await? {
                tracing::info!(
                    transaction_id = %transaction_id,
                    "Stale pending transaction finalized as aborted"
                );
                reclaimed += 1;
            }
        }

        Ok(reclaimed)
    }
}
