use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use anyhow::{Context, Result};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: ListenConfig,
    pub participant: ListenConfig,
    #[serde(default)]
    pub two_phase: TwoPhaseConfig,
    pub auth: AuthConfig,
    /// PostgreSQL connection URL (both services share one database in
    /// single-binary deployments; point them at separate databases otherwise)
    pub postgres_url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ListenConfig {
    pub host: String,
    pub port: u16,
}

/// Two-phase commit protocol tuning
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TwoPhaseConfig {
    /// Per-prepare network timeout; exceeding it counts as an abort vote
    pub prepare_timeout_ms: u64,
    /// Per-commit/abort network timeout
    pub commit_timeout_ms: u64,
    /// Advisory upper bound on a transfer; the sweeper reclaims pending
    /// rows older than this
    pub transaction_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Base URL of the accounts participant
    pub participant_url: String,
}

impl Default for TwoPhaseConfig {
    fn default() -> Self {
        Self {
            prepare_timeout_ms: 5000,
            commit_timeout_ms: 5000,
            transaction_timeout_ms: 30_000,
            max_retries: 3,
            retry_delay_ms: 1000,
            participant_url: "http://127.0.0.1:8081".to_string(),
        }
    }
}

impl TwoPhaseConfig {
    pub fn prepare_timeout(&self) -> Duration {
        Duration::from_millis(self.prepare_timeout_ms)
    }

    pub fn commit_timeout(&self) -> Duration {
        Duration::from_millis(self.commit_timeout_ms)
    }

    pub fn transaction_timeout(&self) -> Duration {
        Duration::from_millis(self.transaction_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthConfig {
    /// Symmetric secret used to validate bearer tokens and mint service tokens
    pub token_secret: String,
    #[serde(default = "default_service_token_ttl")]
    pub service_token_ttl_secs: u64,
}

fn default_service_token_ttl() -> u64 {
    300
}

impl AppConfig {
    /// Load config from YAML file based on environment
    pub fn load(env: &str) -> Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        let mut config: Self =
            serde_yaml::from_str(&content).context("Failed to parse config yaml")?;

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Environment variables take precedence over YAML config.
    ///
    /// Supported overrides:
    /// - FF_GATEWAY_PORT: Coordinator gateway port (u16)
    /// - FF_PARTICIPANT_PORT: Participant service port (u16)
    /// - FF_PARTICIPANT_URL: Participant base URL
    /// - FF_POSTGRES_URL: PostgreSQL connection URL
    /// - FF_TOKEN_SECRET: Bearer/service token secret
    /// - FF_LOG_LEVEL: Log level (trace/debug/info/warn/error)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("FF_GATEWAY_PORT")
            && let Ok(p) = port.parse::<u16>()
        {
            tracing::info!("Config override: gateway.port = {} (from FF_GATEWAY_PORT)", p);
            self.gateway.port = p;
        }
        if let Ok(port) = std::env::var("FF_PARTICIPANT_PORT")
            && let Ok(p) = port.parse::<u16>()
        {
            tracing::info!(
                "Config override: participant.port = {} (from FF_PARTICIPANT_PORT)",
                p
            );
            self.participant.port = p;
        }
        if let Ok(url) = std::env::var("FF_PARTICIPANT_URL") {
            tracing::info!(
                "Config override: two_phase.participant_url = {} (from FF_PARTICIPANT_URL)",
                url
            );
            self.two_phase.participant_url = url;
        }
        if let Ok(url) = std::env::var("FF_POSTGRES_URL") {
            tracing::info!("Config override: postgres_url = [REDACTED] (from FF_POSTGRES_URL)");
            self.postgres_url = url;
        }
        if let Ok(secret) = std::env::var("FF_TOKEN_SECRET") {
            tracing::info!(
                "Config override: auth.token_secret = [REDACTED] (from FF_TOKEN_SECRET)"
            );
            self.auth.token_secret = secret;
        }
        if let Ok(level) = std::env::var("FF_LOG_LEVEL") {
            tracing::info!("Config override: log_level = {} (from FF_LOG_LEVEL)", level);
            self.log_level = level;
        }
    }

    /// Validate configuration at startup
    ///
    /// Returns an error if any critical configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.gateway.port == 0 {
            anyhow::bail!("Invalid gateway.port: must be > 0");
        }
        if self.participant.port == 0 {
            anyhow::bail!("Invalid participant.port: must be > 0");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log_level '{}': must be one of {:?}",
                self.log_level,
                valid_levels
            );
        }

        if self.two_phase.prepare_timeout_ms == 0 || self.two_phase.commit_timeout_ms == 0 {
            anyhow::bail!("Invalid two_phase timeouts: must be > 0");
        }
        if self.two_phase.max_retries == 0 {
            anyhow::bail!("Invalid two_phase.max_retries: must be > 0");
        }
        if self.two_phase.participant_url.is_empty() {
            anyhow::bail!("Invalid two_phase.participant_url: must not be empty");
        }
        if self.auth.token_secret.is_empty() {
            anyhow::bail!("Invalid auth.token_secret: must not be empty");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            log_level: "info".to_string(),
            log_dir: "./logs".to_string(),
            log_file: "fundflow.log".to_string(),
            use_json: false,
            rotation: "daily".to_string(),
            gateway: ListenConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            participant: ListenConfig {
                host: "0.0.0.0".to_string(),
                port: 8081,
            },
            two_phase: TwoPhaseConfig::default(),
            auth: AuthConfig {
                token_secret: "secret".to_string(),
                service_token_ttl_secs: 300,
            },
            postgres_url: "postgres://localhost/fundflow".to_string(),
        }
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_port() {
        let mut config = base_config();
        config.gateway.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = base_config();
        config.log_level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_secret() {
        let mut config = base_config();
        config.auth.token_secret = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = base_config();
        config.two_phase.prepare_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_two_phase_defaults() {
        let tp = TwoPhaseConfig::default();
        assert_eq!(tp.prepare_timeout(), Duration::from_secs(5));
        assert_eq!(tp.commit_timeout(), Duration::from_secs(5));
        assert_eq!(tp.transaction_timeout(), Duration::from_secs(30));
        assert_eq!(tp.max_retries, 3);
        assert_eq!(tp.retry_delay(), Duration::from_secs(1));
    }
}
