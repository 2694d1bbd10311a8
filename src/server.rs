//! Service assembly
//!
//! Builds the two axum applications (coordinator gateway and participant)
//! from the loaded configuration and a connection pool, and serves them.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Json, Router, routing::get};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use utoipa::{Modify, OpenApi};

use crate::auth::TokenService;
use crate::config::AppConfig;
use crate::coordinator::{
    self, CoordinatorState, HttpParticipantClient, PendingSweeper, TransactionLog,
    TransferCoordinator,
};
use crate::participant::{self, AccountLedger, ParticipantState};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::coordinator::handlers::create_transfer,
        crate::coordinator::handlers::get_status,
        crate::coordinator::handlers::get_history,
        crate::coordinator::handlers::reconcile,
        crate::participant::handlers::prepare,
        crate::participant::handlers::commit,
        crate::participant::handlers::abort,
        crate::participant::handlers::lock_status,
        crate::participant::handlers::balance,
    ),
    components(schemas(
        crate::api::ErrorBody,
        crate::api::ErrorEnvelope,
        crate::coordinator::handlers::TransferApiRequest,
        crate::coordinator::handlers::TransferReply,
        crate::coordinator::handlers::TransferData,
        crate::coordinator::handlers::StatusReply,
        crate::coordinator::handlers::HistoryReply,
        crate::coordinator::handlers::ReconcileReply,
        crate::coordinator::coordinator::ReconcileReport,
        crate::coordinator::coordinator::ReconcileSide,
        crate::coordinator::types::TransactionRecord,
        crate::coordinator::types::TxStatus,
        crate::participant::types::PrepareRequest,
        crate::participant::types::PrepareResponse,
        crate::participant::types::PrepareDetails,
        crate::participant::types::Operation,
        crate::participant::types::Vote,
        crate::participant::types::DecisionRequest,
        crate::participant::types::CommitResponse,
        crate::participant::types::CommitDetails,
        crate::participant::types::AbortResponse,
        crate::participant::types::LockStatusResponse,
        crate::participant::types::LockStatusDetails,
        crate::participant::types::AccountState,
        crate::participant::types::BalanceResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "transfers", description = "Client-facing transfer operations"),
        (name = "2pc", description = "Coordinator ↔ participant protocol"),
        (name = "accounts", description = "Account state queries")
    )
)]
struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Connect the shared PostgreSQL pool.
///
/// The acquire timeout is tied to the prepare timeout: a participant that
/// cannot get a connection inside the prepare window misses its vote anyway,
/// and the coordinator has already counted it as abort. Pool size comes from
/// FF_PG_POOL_SIZE (default 10).
pub async fn connect_pool(config: &AppConfig) -> Result<PgPool> {
    let max_connections = std::env::var("FF_PG_POOL_SIZE")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(10);

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(config.two_phase.prepare_timeout())
        .connect(&config.postgres_url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    tracing::info!("PostgreSQL pool ready (max {} connections)", max_connections);
    Ok(pool)
}

/// Build the coordinator application and its background sweeper
pub fn coordinator_app(config: &AppConfig, pool: PgPool) -> (Router, PendingSweeper) {
    let tokens = Arc::new(TokenService::new(
        config.auth.token_secret.clone(),
        config.auth.service_token_ttl_secs,
    ));

    let log = Arc::new(TransactionLog::new(pool));
    let client = Arc::new(HttpParticipantClient::new(
        config.two_phase.clone(),
        tokens.clone(),
    ));
    let transfer_coordinator = Arc::new(TransferCoordinator::new(
        log.clone(),
        client.clone(),
        config.two_phase.clone(),
    ));

    let state = Arc::new(CoordinatorState {
        coordinator: transfer_coordinator,
    });

    let router = coordinator::router(state, tokens)
        .route("/openapi.json", get(openapi_json));

    let sweeper = PendingSweeper::new(log, client, config.two_phase.clone());

    (router, sweeper)
}

/// Build the participant application
pub fn participant_app(config: &AppConfig, pool: PgPool) -> Router {
    let tokens = Arc::new(TokenService::new(
        config.auth.token_secret.clone(),
        config.auth.service_token_ttl_secs,
    ));

    let state = Arc::new(ParticipantState {
        ledger: Arc::new(AccountLedger::new(pool)),
    });

    participant::router(state, tokens)
}

/// Bind and serve one application until the process exits
pub async fn serve(router: Router, host: &str, port: u16, name: &str) -> Result<()> {
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {} on {}", name, addr))?;

    tracing::info!("{} listening on {}", name, addr);
    axum::serve(listener, router)
        .await
        .with_context(|| format!("{} server error", name))
}
