//! Idempotent schema bootstrap
//!
//! Both tables are created on startup if missing. The `accounts` table lives
//! on the participant side, `transactions` and `recent_commits` support the
//! coordinator log and the participant's commit idempotence respectively.

use anyhow::{Context, Result};
use sqlx::PgPool;

pub async fn init_schema(pool: &PgPool) -> Result<()> {
    tracing::info!("Initializing PostgreSQL schema...");

    sqlx::query(CREATE_ACCOUNTS_TABLE)
        .execute(pool)
        .await
        .context("Failed to create accounts table")?;

    sqlx::query(CREATE_TRANSACTIONS_TABLE)
        .execute(pool)
        .await
        .context("Failed to create transactions table")?;

    for stmt in CREATE_TRANSACTIONS_INDEXES {
        sqlx::query(stmt)
            .execute(pool)
            .await
            .context("Failed to create transactions index")?;
    }

    sqlx::query(CREATE_RECENT_COMMITS_TABLE)
        .execute(pool)
        .await
        .context("Failed to create recent_commits table")?;

    tracing::info!("PostgreSQL schema initialized");
    Ok(())
}

const CREATE_ACCOUNTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    account_id    UUID PRIMARY KEY,
    owner_id      UUID NOT NULL,
    balance       NUMERIC(19,4) NOT NULL CHECK (balance >= 0),
    lock_holder   UUID UNIQUE,
    pending_delta NUMERIC(19,4),
    created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CHECK ((lock_holder IS NULL) = (pending_delta IS NULL))
)
"#;

const CREATE_TRANSACTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS transactions (
    transaction_id         UUID PRIMARY KEY,
    source_account_id      UUID NOT NULL,
    destination_account_id UUID NOT NULL,
    amount                 NUMERIC(19,4) NOT NULL CHECK (amount > 0),
    status                 SMALLINT NOT NULL,
    created_at             TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at             TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CHECK (source_account_id <> destination_account_id)
)
"#;

const CREATE_TRANSACTIONS_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_transactions_status ON transactions (status)",
    "CREATE INDEX IF NOT EXISTS idx_transactions_source ON transactions (source_account_id)",
    "CREATE INDEX IF NOT EXISTS idx_transactions_destination ON transactions (destination_account_id)",
];

const CREATE_RECENT_COMMITS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS recent_commits (
    transaction_id UUID NOT NULL,
    account_id     UUID NOT NULL,
    new_balance    NUMERIC(19,4) NOT NULL,
    committed_at   TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (transaction_id, account_id)
)
"#;
