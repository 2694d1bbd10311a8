//! Coordinator error types

use thiserror::Error;

use crate::api::error_codes;

/// Failures raised while driving a transfer.
///
/// Prepare-phase participant refusals are not errors here; they fold into an
/// aborted outcome. These variants cover input rejection, the transaction
/// log, and the 2PC channel itself.
#[derive(Error, Debug, Clone)]
pub enum CoordinatorError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("Transaction not found: {0}")]
    NotFound(String),

    #[error("Participant rejected decision: {0}")]
    Conflict(String),

    #[error("2PC channel failure: {0}")]
    Transport(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl CoordinatorError {
    pub fn code(&self) -> &'static str {
        match self {
            CoordinatorError::InvalidArgument(_) => error_codes::INVALID_ARGUMENT,
            CoordinatorError::NotFound(_) => error_codes::NOT_FOUND,
            CoordinatorError::Conflict(_) => error_codes::CONFLICT,
            CoordinatorError::Transport(_) => error_codes::TRANSPORT,
            CoordinatorError::Database(_) => error_codes::INTERNAL,
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            CoordinatorError::InvalidArgument(_) => 400,
            CoordinatorError::NotFound(_) => 404,
            CoordinatorError::Conflict(_) => 409,
            CoordinatorError::Transport(_) => 502,
            CoordinatorError::Database(_) => 500,
        }
    }
}

impl From<sqlx::Error> for CoordinatorError {
    fn from(e: sqlx::Error) -> Self {
        CoordinatorError::Database(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_status() {
        assert_eq!(
            CoordinatorError::InvalidArgument("x".into()).code(),
            "INVALID_ARGUMENT"
        );
        assert_eq!(CoordinatorError::InvalidArgument("x".into()).http_status(), 400);
        assert_eq!(CoordinatorError::NotFound("x".into()).http_status(), 404);
        assert_eq!(CoordinatorError::Conflict("x".into()).http_status(), 409);
        assert_eq!(CoordinatorError::Transport("x".into()).code(), "TRANSPORT");
    }
}
