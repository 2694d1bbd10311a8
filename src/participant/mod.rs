//! Account participant
//!
//! Owns per-account balance and the lock slot, and serializes every modifying
//! operation on one account through a predicate-guarded reservation. Exposes
//! the three 2PC verbs to the coordinator.

pub mod error;
pub mod handlers;
pub mod ledger;
pub mod types;

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::auth::{TokenService, service_auth_middleware};
pub use error::ParticipantError;
pub use ledger::AccountLedger;

/// Shared participant service state
pub struct ParticipantState {
    pub ledger: Arc<AccountLedger>,
}

/// Build the participant router. All routes require the coordinator's
/// service token.
pub fn router(state: Arc<ParticipantState>, tokens: Arc<TokenService>) -> Router {
    Router::new()
        .route("/2pc/prepare", post(handlers::prepare))
        .route("/2pc/commit", post(handlers::commit))
        .route("/2pc/abort", post(handlers::abort))
        .route("/2pc/locks/{transaction_id}", get(handlers::lock_status))
        .route("/accounts/{account_id}/balance", get(handlers::balance))
        .layer(middleware::from_fn_with_state(
            tokens,
            service_auth_middleware,
        ))
        .with_state(state)
}
