//! Logging setup
//!
//! One subscriber per process. The binary can run as coordinator,
//! participant, or both, so the role lands in the log file name; co-located
//! services on one host never interleave their files.

use crate::config::AppConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub fn init_logging(config: &AppConfig, role: &str) -> WorkerGuard {
    let file_name = log_file_for_role(&config.log_file, role);

    let file_appender = match config.rotation.as_str() {
        "hourly" => tracing_appender::rolling::hourly(&config.log_dir, &file_name),
        "daily" => tracing_appender::rolling::daily(&config.log_dir, &file_name),
        _ => tracing_appender::rolling::never(&config.log_dir, &file_name),
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| protocol_filter(&config.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if config.use_json {
        let file_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_writer(non_blocking)
            .with_ansi(false);
        registry.with(file_layer).init();
    } else {
        let file_layer = fmt::layer()
            .with_target(false)
            .with_writer(non_blocking)
            .with_ansi(false);
        let stdout_layer = fmt::layer().with_target(false).with_ansi(true);
        registry.with(file_layer).with(stdout_layer).init();
    }

    guard
}

/// Insert the role before the extension: `fundflow.log` run as `participant`
/// becomes `fundflow-participant.log`.
fn log_file_for_role(base: &str, role: &str) -> String {
    match base.rsplit_once('.') {
        Some((stem, ext)) => format!("{}-{}.{}", stem, role, ext),
        None => format!("{}-{}", base, role),
    }
}

/// Default filter when RUST_LOG is unset: the configured level applies to
/// fundflow's own spans, while the HTTP and database crates are capped at
/// warn so prepare/commit/abort traces stay readable at debug.
fn protocol_filter(level: &str) -> EnvFilter {
    EnvFilter::new(format!(
        "{level},sqlx=warn,hyper=warn,reqwest=warn,tower=warn"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_for_role_with_extension() {
        assert_eq!(
            log_file_for_role("fundflow.log", "coordinator"),
            "fundflow-coordinator.log"
        );
        assert_eq!(
            log_file_for_role("fundflow.log", "participant"),
            "fundflow-participant.log"
        );
    }

    #[test]
    fn test_log_file_for_role_without_extension() {
        assert_eq!(log_file_for_role("fundflow", "all"), "fundflow-all");
    }

    #[test]
    fn test_protocol_filter_parses() {
        // EnvFilter::new panics on malformed directives; building one from
        // every accepted level must not
        for level in ["trace", "debug", "info", "warn", "error"] {
            let _ = protocol_filter(level);
        }
    }
}
