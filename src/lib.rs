//! fundflow: atomic fund transfers via two-phase commit
//!
//! Three cooperating parts:
//!
//! - [`coordinator`] - transfer orchestration, transaction log, retry, sweeper
//! - [`participant`] - account ledger with the 2PC verbs and lock slot
//! - [`server`] - axum service assembly for both roles
//!
//! Ambient concerns:
//!
//! - [`config`] - YAML configuration with env overrides
//! - [`logging`] - tracing setup (non-blocking file + stdout)
//! - [`money`] - fixed-point scale-4 monetary newtypes
//! - [`auth`] - bearer-token verification and service-token minting
//! - [`api`] - response envelope and the shared error-code taxonomy

pub mod api;
pub mod auth;
pub mod config;
pub mod coordinator;
pub mod logging;
pub mod money;
pub mod participant;
pub mod schema;
pub mod server;

// Convenient re-exports at crate root
pub use config::AppConfig;
pub use coordinator::{TransferCoordinator, TransferSpec, TxStatus};
pub use money::{Amount, SignedAmount};
pub use participant::AccountLedger;
