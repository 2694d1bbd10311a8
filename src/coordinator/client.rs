//! Participant channel
//!
//! The coordinator talks to the accounts participant through this trait. The
//! HTTP implementation enforces the per-call timeouts; the mock implements
//! the same per-account semantics in memory for protocol tests and supports
//! transport-fault injection.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

use super::error::CoordinatorError;
use crate::api::error_codes;
use crate::auth::TokenService;
use crate::config::TwoPhaseConfig;
use crate::participant::types::{
    CommitDetails, CommitResponse, DecisionRequest, LockStatusResponse, Operation,
    PrepareDetails, PrepareRequest, PrepareResponse, Vote,
};

/// Why a prepare did not vote commit
#[derive(Debug, Clone)]
pub struct AbortReason {
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl AbortReason {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            code: error_codes::TRANSPORT.to_string(),
            message: message.into(),
            details: None,
        }
    }
}

/// A participant's answer to prepare, with transport failures already folded
/// into the abort arm: the coordinator treats a silent channel exactly like
/// an abort vote.
#[derive(Debug, Clone)]
pub enum PrepareOutcome {
    Commit(PrepareDetails),
    Abort(AbortReason),
}

impl PrepareOutcome {
    pub fn is_commit(&self) -> bool {
        matches!(self, PrepareOutcome::Commit(_))
    }
}

#[async_trait]
pub trait ParticipantClient: Send + Sync {
    async fn prepare(&self, req: PrepareRequest) -> PrepareOutcome;

    async fn commit(
        &self,
        transaction_id: Uuid,
        account_id: Uuid,
    ) -> Result<CommitDetails, CoordinatorError>;

    async fn abort(
        &self,
        transaction_id: Uuid,
        account_id: Uuid,
    ) -> Result<(), CoordinatorError>;

    async fn lock_status(&self, transaction_id: Uuid) -> Result<Option<Uuid>, CoordinatorError>;
}

// ============================================================================
// HTTP implementation
// ============================================================================

pub struct HttpParticipantClient {
    http: reqwest::Client,
    base_url: String,
    tokens: std::sync::Arc<TokenService>,
    config: TwoPhaseConfig,
}

impl HttpParticipantClient {
    pub fn new(
        config: TwoPhaseConfig,
        tokens: std::sync::Arc<TokenService>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.participant_url.trim_end_matches('/').to_string(),
            tokens,
            config,
        }
    }

    fn service_token(&self) -> Result<String, CoordinatorError> {
        self.tokens
            .mint_service_token()
            .map_err(|e| CoordinatorError::Transport(format!("cannot mint service token: {}", e)))
    }
}

#[async_trait]
impl ParticipantClient for HttpParticipantClient {
    async fn prepare(&self, req: PrepareRequest) -> PrepareOutcome {
        let token = match self.service_token() {
            Ok(t) => t,
            Err(e) => return PrepareOutcome::Abort(AbortReason::transport(e.to_string())),
        };

        let response = self
            .http
            .post(format!("{}/2pc/prepare", self.base_url))
            .timeout(self.config.prepare_timeout())
            .bearer_auth(token)
            .json(&req)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(
                    transaction_id = %req.transaction_id,
                    account_id = %req.account_id,
                    "Prepare transport failure: {}",
                    e
                );
                return PrepareOutcome::Abort(AbortReason::transport(e.to_string()));
            }
        };

        // Abort votes ride on 4xx statuses, so the body is parsed regardless
        // of the status code.
        match response.json::<PrepareResponse>().await {
            Ok(body) => match (body.vote, body.details) {
                (Vote::Commit, Some(details)) => PrepareOutcome::Commit(details),
                (Vote::Commit, None) => PrepareOutcome::Abort(AbortReason::transport(
                    "commit vote without reservation details",
                )),
                (Vote::Abort, _) => {
                    let reason = match body.error {
                        Some(err) => AbortReason {
                            code: err.code,
                            message: err.message,
                            details: err.details,
                        },
                        None => AbortReason::transport("abort vote without error body"),
                    };
                    PrepareOutcome::Abort(reason)
                }
            },
            Err(e) => PrepareOutcome::Abort(AbortReason::transport(format!(
                "unparseable prepare response: {}",
                e
            ))),
        }
    }

    async fn commit(
        &self,
        transaction_id: Uuid,
        account_id: Uuid,
    ) -> Result<CommitDetails, CoordinatorError> {
        let token = self.service_token()?;

        let response = self
            .http
            .post(format!("{}/2pc/commit", self.base_url))
            .timeout(self.config.commit_timeout())
            .bearer_auth(token)
            .json(&DecisionRequest {
                transaction_id,
                account_id,
            })
            .send()
            .await
            .map_err(|e| CoordinatorError::Transport(e.to_string()))?;

        let body: CommitResponse = response
            .json()
            .await
            .map_err(|e| CoordinatorError::Transport(format!("unparseable commit response: {}", e)))?;

        match (body.success, body.details, body.error) {
            (true, Some(details), _) => Ok(details),
            (_, _, Some(err)) if err.code == error_codes::CONFLICT => {
                Err(CoordinatorError::Conflict(err.message))
            }
            (_, _, Some(err)) => Err(CoordinatorError::Transport(err.message)),
            _ => Err(CoordinatorError::Transport(
                "commit response missing details".to_string(),
            )),
        }
    }

    async fn abort(
        &self,
        transaction_id: Uuid,
        account_id: Uuid,
    ) -> Result<(), CoordinatorError> {
        let token = self.service_token()?;

        let response = self
            .http
            .post(format!("{}/2pc/abort", self.base_url))
            .timeout(self.config.commit_timeout())
            .bearer_auth(token)
            .json(&DecisionRequest {
                transaction_id,
                account_id,
            })
            .send()
            .await
            .map_err(|e| CoordinatorError::Transport(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(CoordinatorError::Transport(format!(
                "abort returned HTTP {}",
                response.status()
            )))
        }
    }

    async fn lock_status(&self, transaction_id: Uuid) -> Result<Option<Uuid>, CoordinatorError> {
        let token = self.service_token()?;

        let response = self
            .http
            .get(format!("{}/2pc/locks/{}", self.base_url, transaction_id))
            .timeout(self.config.commit_timeout())
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| CoordinatorError::Transport(e.to_string()))?;

        let body: LockStatusResponse = response
            .json()
            .await
            .map_err(|e| CoordinatorError::Transport(format!("unparseable lock response: {}", e)))?;

        Ok(body.details.account_id.filter(|_| body.details.held))
    }
}

// ============================================================================
// In-memory mock (protocol tests and fault injection)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Prepare,
    Commit,
    Abort,
}

#[derive(Debug, Clone)]
struct MockAccount {
    balance: Decimal,
    lock: Option<(Uuid, Decimal)>,
}

/// In-memory participant with the same per-account semantics as the real
/// ledger, plus one-shot transport-fault injection per (operation, account).
#[derive(Default)]
pub struct MockParticipant {
    accounts: Mutex<HashMap<Uuid, MockAccount>>,
    recent_commits: Mutex<HashMap<(Uuid, Uuid), Decimal>>,
    transport_failures: Mutex<HashSet<(MockOp, Uuid)>>,
    prepare_calls: AtomicUsize,
    commit_calls: AtomicUsize,
    abort_calls: AtomicUsize,
}

impl MockParticipant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_account(&self, account_id: Uuid, balance: Decimal) {
        // Mirror the NUMERIC(19,4) storage scale of the real ledger
        let mut balance = balance;
        balance.rescale(crate::money::MONEY_SCALE);
        self.accounts.lock().unwrap().insert(
            account_id,
            MockAccount {
                balance,
                lock: None,
            },
        );
    }

    pub fn balance_of(&self, account_id: Uuid) -> Option<Decimal> {
        self.accounts
            .lock()
            .unwrap()
            .get(&account_id)
            .map(|a| a.balance)
    }

    pub fn lock_of(&self, account_id: Uuid) -> Option<Uuid> {
        self.accounts
            .lock()
            .unwrap()
            .get(&account_id)
            .and_then(|a| a.lock.map(|(tx, _)| tx))
    }

    /// Make the next call of `op` against `account_id` fail as a transport
    /// error (consumed once). The operation does not reach the ledger, which
    /// models a response lost on the wire before the request was applied.
    pub fn fail_next(&self, op: MockOp, account_id: Uuid) {
        self.transport_failures
            .lock()
            .unwrap()
            .insert((op, account_id));
    }

    /// Drop the lock as if the participant restarted without durable lock
    /// state.
    pub fn crash_lock(&self, account_id: Uuid) {
        if let Some(acct) = self.accounts.lock().unwrap().get_mut(&account_id) {
            acct.lock = None;
        }
    }

    pub fn prepare_count(&self) -> usize {
        self.prepare_calls.load(Ordering::SeqCst)
    }

    pub fn commit_count(&self) -> usize {
        self.commit_calls.load(Ordering::SeqCst)
    }

    pub fn abort_count(&self) -> usize {
        self.abort_calls.load(Ordering::SeqCst)
    }

    fn take_failure(&self, op: MockOp, account_id: Uuid) -> bool {
        self.transport_failures
            .lock()
            .unwrap()
            .remove(&(op, account_id))
    }
}

#[async_trait]
impl ParticipantClient for MockParticipant {
    async fn prepare(&self, req: PrepareRequest) -> PrepareOutcome {
        self.prepare_calls.fetch_add(1, Ordering::SeqCst);

        if self.take_failure(MockOp::Prepare, req.account_id) {
            return PrepareOutcome::Abort(AbortReason::transport("injected prepare failure"));
        }

        let delta = req.amount.as_decimal();
        let mut accounts = self.accounts.lock().unwrap();
        let Some(acct) = accounts.get_mut(&req.account_id) else {
            return PrepareOutcome::Abort(AbortReason {
                code: error_codes::NOT_FOUND.to_string(),
                message: format!("Account not found: {}", req.account_id),
                details: None,
            });
        };

        match acct.lock {
            Some((holder, held)) if holder == req.transaction_id => {
                if held == delta {
                    PrepareOutcome::Commit(PrepareDetails {
                        account_id: req.account_id,
                        current_balance: acct.balance,
                        pending_change: held,
                        operation: req.operation,
                    })
                } else {
                    PrepareOutcome::Abort(AbortReason {
                        code: error_codes::CONFLICT.to_string(),
                        message: "re-prepare delta does not match held reservation".to_string(),
                        details: None,
                    })
                }
            }
            Some(_) => PrepareOutcome::Abort(AbortReason {
                code: error_codes::CONFLICT.to_string(),
                message: format!("Account {} is locked by another transaction", req.account_id),
                details: None,
            }),
            None => {
                if req.operation == Operation::Debit && acct.balance < delta.abs() {
                    return PrepareOutcome::Abort(AbortReason {
                        code: error_codes::INSUFFICIENT_FUNDS.to_string(),
                        message: format!("Insufficient funds on account {}", req.account_id),
                        details: Some(serde_json::json!({
                            "account_id": req.account_id,
                            "current_balance": acct.balance,
                        })),
                    });
                }
                acct.lock = Some((req.transaction_id, delta));
                PrepareOutcome::Commit(PrepareDetails {
                    account_id: req.account_id,
                    current_balance: acct.balance,
                    pending_change: delta,
                    operation: req.operation,
                })
            }
        }
    }

    async fn commit(
        &self,
        transaction_id: Uuid,
        account_id: Uuid,
    ) -> Result<CommitDetails, CoordinatorError> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);

        if self.take_failure(MockOp::Commit, account_id) {
            return Err(CoordinatorError::Transport("injected commit failure".to_string()));
        }

        let mut accounts = self.accounts.lock().unwrap();
        let Some(acct) = accounts.get_mut(&account_id) else {
            return Err(CoordinatorError::Conflict(format!(
                "Account not found: {}",
                account_id
            )));
        };

        match acct.lock {
            Some((holder, delta)) if holder == transaction_id => {
                acct.balance += delta;
                acct.lock = None;
                let new_balance = acct.balance;
                self.recent_commits
                    .lock()
                    .unwrap()
                    .insert((transaction_id, account_id), new_balance);
                Ok(CommitDetails {
                    account_id,
                    new_balance,
                })
            }
            _ => {
                let replay = self
                    .recent_commits
                    .lock()
                    .unwrap()
                    .get(&(transaction_id, account_id))
                    .copied();
                match replay {
                    Some(new_balance) => Ok(CommitDetails {
                        account_id,
                        new_balance,
                    }),
                    None => Err(CoordinatorError::Conflict(format!(
                        "Account {} is not locked by transaction {}",
                        account_id, transaction_id
                    ))),
                }
            }
        }
    }

    async fn abort(
        &self,
        transaction_id: Uuid,
        account_id: Uuid,
    ) -> Result<(), CoordinatorError> {
        self.abort_calls.fetch_add(1, Ordering::SeqCst);

        if self.take_failure(MockOp::Abort, account_id) {
            return Err(CoordinatorError::Transport("injected abort failure".to_string()));
        }

        let mut accounts = self.accounts.lock().unwrap();
        if let Some(acct) = accounts.get_mut(&account_id)
            && let Some((holder, _)) = acct.lock
            && holder == transaction_id
        {
            acct.lock = None;
        }
        Ok(())
    }

    async fn lock_status(&self, transaction_id: Uuid) -> Result<Option<Uuid>, CoordinatorError> {
        let accounts = self.accounts.lock().unwrap();
        Ok(accounts
            .iter()
            .find(|(_, a)| matches!(a.lock, Some((holder, _)) if holder == transaction_id))
            .map(|(id, _)| *id))
    }
}

/// Build a debit-side prepare request
pub fn debit_request(transaction_id: Uuid, account_id: Uuid, amount: crate::money::Amount) -> PrepareRequest {
    PrepareRequest {
        transaction_id,
        account_id,
        amount: amount.debit_delta(),
        operation: Operation::Debit,
    }
}

/// Build a credit-side prepare request
pub fn credit_request(transaction_id: Uuid, account_id: Uuid, amount: crate::money::Amount) -> PrepareRequest {
    PrepareRequest {
        transaction_id,
        account_id,
        amount: amount.credit_delta(),
        operation: Operation::Credit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Amount;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn amount(s: &str) -> Amount {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_mock_prepare_locks_account() {
        let mock = MockParticipant::new();
        let acct = Uuid::new_v4();
        mock.add_account(acct, dec("100"));
        let tx = Uuid::new_v4();

        let outcome = mock.prepare(debit_request(tx, acct, amount("40"))).await;
        assert!(outcome.is_commit());
        assert_eq!(mock.lock_of(acct), Some(tx));

        // Second transaction conflicts
        let second = mock
            .prepare(debit_request(Uuid::new_v4(), acct, amount("10")))
            .await;
        match second {
            PrepareOutcome::Abort(reason) => assert_eq!(reason.code, "CONFLICT"),
            other => panic!("expected abort, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mock_prepare_idempotent_replay() {
        let mock = MockParticipant::new();
        let acct = Uuid::new_v4();
        mock.add_account(acct, dec("100"));
        let tx = Uuid::new_v4();

        let first = mock.prepare(debit_request(tx, acct, amount("40"))).await;
        let replay = mock.prepare(debit_request(tx, acct, amount("40"))).await;
        assert!(first.is_commit());
        assert!(replay.is_commit());
        assert_eq!(mock.lock_of(acct), Some(tx));

        // Changed delta is refused
        let changed = mock.prepare(debit_request(tx, acct, amount("41"))).await;
        assert!(!changed.is_commit());
    }

    #[tokio::test]
    async fn test_mock_insufficient_funds() {
        let mock = MockParticipant::new();
        let acct = Uuid::new_v4();
        mock.add_account(acct, dec("100"));

        let outcome = mock
            .prepare(debit_request(Uuid::new_v4(), acct, amount("100.0001")))
            .await;
        match outcome {
            PrepareOutcome::Abort(reason) => {
                assert_eq!(reason.code, "INSUFFICIENT_FUNDS");
                assert!(reason.details.is_some());
            }
            other => panic!("expected abort, got {:?}", other),
        }
        assert_eq!(mock.lock_of(acct), None);
    }

    #[tokio::test]
    async fn test_mock_commit_applies_and_replays() {
        let mock = MockParticipant::new();
        let acct = Uuid::new_v4();
        mock.add_account(acct, dec("100"));
        let tx = Uuid::new_v4();

        mock.prepare(debit_request(tx, acct, amount("40"))).await;
        let applied = mock.commit(tx, acct).await.unwrap();
        assert_eq!(applied.new_balance, dec("60.0000"));

        let replay = mock.commit(tx, acct).await.unwrap();
        assert_eq!(replay.new_balance, dec("60.0000"));
        assert_eq!(mock.balance_of(acct), Some(dec("60.0000")));
    }

    #[tokio::test]
    async fn test_mock_abort_is_idempotent() {
        let mock = MockParticipant::new();
        let acct = Uuid::new_v4();
        mock.add_account(acct, dec("100"));
        let tx = Uuid::new_v4();

        mock.prepare(credit_request(tx, acct, amount("40"))).await;
        mock.abort(tx, acct).await.unwrap();
        mock.abort(tx, acct).await.unwrap();
        assert_eq!(mock.balance_of(acct), Some(dec("100")));
        assert_eq!(mock.lock_of(acct), None);
    }

    #[tokio::test]
    async fn test_mock_fault_injection_is_one_shot() {
        let mock = MockParticipant::new();
        let acct = Uuid::new_v4();
        mock.add_account(acct, dec("100"));
        let tx = Uuid::new_v4();

        mock.fail_next(MockOp::Prepare, acct);
        let failed = mock.prepare(debit_request(tx, acct, amount("40"))).await;
        match failed {
            PrepareOutcome::Abort(reason) => assert_eq!(reason.code, "TRANSPORT"),
            other => panic!("expected transport abort, got {:?}", other),
        }
        // The injected failure never reached the ledger
        assert_eq!(mock.lock_of(acct), None);

        let retried = mock.prepare(debit_request(tx, acct, amount("40"))).await;
        assert!(retried.is_commit());
    }

    #[tokio::test]
    async fn test_mock_lock_status() {
        let mock = MockParticipant::new();
        let acct = Uuid::new_v4();
        mock.add_account(acct, dec("100"));
        let tx = Uuid::new_v4();

        assert_eq!(mock.lock_status(tx).await.unwrap(), None);
        mock.prepare(credit_request(tx, acct, amount("5"))).await;
        assert_eq!(mock.lock_status(tx).await.unwrap(), Some(acct));
    }
}
