//! Transfer coordinator service
//!
//! Accepts transfer requests, drives the two-phase commit against the
//! accounts participant, and owns the durable transaction log.

pub mod client;
pub mod coordinator;
pub mod error;
pub mod handlers;
pub mod sweeper;
pub mod txlog;
pub mod types;

#[cfg(test)]
mod integration_tests;

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::auth::{TokenService, bearer_auth_middleware, service_auth_middleware};
pub use client::{HttpParticipantClient, MockParticipant, ParticipantClient};
pub use coordinator::TransferCoordinator;
pub use error::CoordinatorError;
pub use sweeper::PendingSweeper;
pub use txlog::TransactionLog;
pub use types::{TransferOutcome, TransferSpec, TxStatus};

/// Shared coordinator service state
pub struct CoordinatorState {
    pub coordinator: Arc<TransferCoordinator>,
}

/// Build the coordinator router: client-facing transfer routes behind bearer
/// auth, the reconcile route behind the service token.
pub fn router(state: Arc<CoordinatorState>, tokens: Arc<TokenService>) -> Router {
    let client_routes = Router::new()
        .route("/transfers", post(handlers::create_transfer))
        .route(
            "/transfers/status/{transaction_id}",
            get(handlers::get_status),
        )
        .route(
            "/transfers/history/{account_id}",
            get(handlers::get_history),
        )
        .layer(middleware::from_fn_with_state(
            tokens.clone(),
            bearer_auth_middleware,
        ));

    let operator_routes = Router::new()
        .route(
            "/transfers/{transaction_id}/reconcile",
            post(handlers::reconcile),
        )
        .layer(middleware::from_fn_with_state(
            tokens,
            service_auth_middleware,
        ));

    client_routes.merge(operator_routes).with_state(state)
}
