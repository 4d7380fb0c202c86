//! Application configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! All configuration is loaded from environment variables with sensible defaults
//! for development. In production, configure via environment variables or a `.env` file.
//!
//! # Rate Limiting
//!
//! - `LIMITER_ENABLED`: Per-client rate limiting switch (default: true)
//! - `LIMITER_RPS`: Sustained requests per second per client (default: 2)
//! - `LIMITER_BURST`: Token bucket size per client (default: 4)
//! - `LIMITER_SWEEP_INTERVAL_SECS` / `LIMITER_RETENTION_SECS`: idle client eviction
//!
//! # Token Lifetimes
//!
//! - `TOKEN_TTL_AUTHENTICATION_SECS` (default: 24h)
//! - `TOKEN_TTL_ACTIVATION_SECS` (default: 72h)
//! - `TOKEN_TTL_PASSWORD_RESET_SECS` (default: 30m)
//!
//! # Security Configuration
//!
//! - `CORS_TRUSTED_ORIGINS`: Space or comma separated list of trusted origins (default: none)
//! - `TRUSTED_PROXIES`: CIDR ranges allowed to set `X-Forwarded-For` (default: none)

use std::env;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Application configuration loaded from environment variables.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.server_addr());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 4000)
    pub port: u16,

    /// Environment name: development, staging or production
    pub environment: String,

    /// Upper bound on draining background tasks at shutdown (default: 30s)
    pub shutdown_timeout: Duration,

    // =========================================================================
    // Rate Limiting Configuration
    // =========================================================================
    /// Whether per-client rate limiting is applied (default: true)
    pub limiter_enabled: bool,

    /// Sustained requests per second per client (default: 2)
    pub limiter_rps: f64,

    /// Bucket capacity per client (default: 4)
    pub limiter_burst: u32,

    /// How often idle clients are swept from the registry (default: 60s)
    pub limiter_sweep_interval: Duration,

    /// Idle time after which a client entry is evicted (default: 180s)
    pub limiter_retention: Duration,

    /// Trusted proxy CIDR ranges for IP spoofing mitigation.
    /// `X-Forwarded-For` / `X-Real-IP` are only honored when the TCP peer
    /// falls inside one of these networks.
    ///
    /// Format: Comma-separated CIDR notation (e.g., "10.0.0.0/8,172.16.0.0/12")
    pub trusted_proxies: Vec<String>,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Origins echoed in `Access-Control-Allow-Origin`
    pub cors_trusted_origins: Vec<String>,

    // =========================================================================
    // Token Configuration
    // =========================================================================
    pub authentication_token_ttl: Duration,
    pub activation_token_ttl: Duration,
    pub password_reset_token_ttl: Duration,

    // =========================================================================
    // Storage Configuration
    // =========================================================================
    /// Bound on every individual store call (default: 5s)
    pub store_timeout: Duration,

    // =========================================================================
    // Mail Configuration
    // =========================================================================
    /// HTTP mail relay endpoint; when unset, mails are only logged
    pub mail_relay_url: Option<String>,

    /// Sender address placed on outbound mail
    pub mail_sender: String,

    /// Timeout for a single relay request (default: 5s)
    pub mail_timeout: Duration,

    /// Delivery attempts before giving up (default: 3)
    pub mail_max_attempts: u32,

    /// Fixed delay between delivery attempts (default: 500ms)
    pub mail_retry_delay: Duration,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Port for Prometheus metrics endpoint (default: 9090, 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if any configuration value is invalid
    /// (e.g., non-numeric PORT value, zero burst).
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 4000)?,
            environment: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            shutdown_timeout: Duration::from_secs(Self::parse_env("SHUTDOWN_TIMEOUT_SECS", 30)?),

            // Rate limiting
            limiter_enabled: Self::parse_env("LIMITER_ENABLED", true)?,
            limiter_rps: Self::parse_env("LIMITER_RPS", 2.0)?,
            limiter_burst: Self::parse_env("LIMITER_BURST", 4)?,
            limiter_sweep_interval: Duration::from_secs(Self::parse_env(
                "LIMITER_SWEEP_INTERVAL_SECS",
                60,
            )?),
            limiter_retention: Duration::from_secs(Self::parse_env(
                "LIMITER_RETENTION_SECS",
                180,
            )?),
            trusted_proxies: Self::parse_list("TRUSTED_PROXIES"),

            // CORS
            cors_trusted_origins: Self::parse_list("CORS_TRUSTED_ORIGINS"),

            // Tokens
            authentication_token_ttl: Duration::from_secs(Self::parse_env(
                "TOKEN_TTL_AUTHENTICATION_SECS",
                24 * 60 * 60,
            )?),
            activation_token_ttl: Duration::from_secs(Self::parse_env(
                "TOKEN_TTL_ACTIVATION_SECS",
                3 * 24 * 60 * 60,
            )?),
            password_reset_token_ttl: Duration::from_secs(Self::parse_env(
                "TOKEN_TTL_PASSWORD_RESET_SECS",
                30 * 60,
            )?),

            // Storage
            store_timeout: Duration::from_millis(Self::parse_env("STORE_TIMEOUT_MS", 5000)?),

            // Mail
            mail_relay_url: env::var("MAIL_RELAY_URL").ok().filter(|u| !u.is_empty()),
            mail_sender: env::var("MAIL_SENDER")
                .unwrap_or_else(|_| "Greenlight <no-reply@greenlight.local>".to_string()),
            mail_timeout: Duration::from_millis(Self::parse_env("MAIL_TIMEOUT_MS", 5000)?),
            mail_max_attempts: Self::parse_env("MAIL_MAX_ATTEMPTS", 3)?,
            mail_retry_delay: Duration::from_millis(Self::parse_env("MAIL_RETRY_DELAY_MS", 500)?),

            // Observability
            metrics_port: Self::parse_env("METRICS_PORT", 9090)?,
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if validation fails.
    pub fn validate(&self) -> AppResult<()> {
        if !matches!(
            self.environment.as_str(),
            "development" | "staging" | "production"
        ) {
            return Err(AppError::ConfigError(format!(
                "APP_ENV must be one of development, staging, production (got {:?})",
                self.environment
            )));
        }

        if self.limiter_enabled {
            if !(self.limiter_rps.is_finite() && self.limiter_rps > 0.0)
                || Duration::try_from_secs_f64(1.0 / self.limiter_rps).is_err()
            {
                return Err(AppError::ConfigError(
                    "LIMITER_RPS must be a positive number when the limiter is enabled"
                        .to_string(),
                ));
            }
            if self.limiter_burst == 0 {
                return Err(AppError::ConfigError(
                    "LIMITER_BURST must be greater than 0 when the limiter is enabled".to_string(),
                ));
            }
            if self.limiter_sweep_interval.is_zero() {
                return Err(AppError::ConfigError(
                    "LIMITER_SWEEP_INTERVAL_SECS must be greater than 0".to_string(),
                ));
            }
        }

        for (name, ttl) in [
            ("TOKEN_TTL_AUTHENTICATION_SECS", self.authentication_token_ttl),
            ("TOKEN_TTL_ACTIVATION_SECS", self.activation_token_ttl),
            ("TOKEN_TTL_PASSWORD_RESET_SECS", self.password_reset_token_ttl),
        ] {
            if ttl.is_zero() {
                return Err(AppError::ConfigError(format!(
                    "{name} must be greater than 0"
                )));
            }
        }

        if self.store_timeout.is_zero() {
            return Err(AppError::ConfigError(
                "STORE_TIMEOUT_MS must be greater than 0".to_string(),
            ));
        }

        if self.mail_max_attempts == 0 {
            return Err(AppError::ConfigError(
                "MAIL_MAX_ATTEMPTS must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        if self.metrics_enabled() {
            Some(std::net::SocketAddr::from((
                [0, 0, 0, 0],
                self.metrics_port,
            )))
        } else {
            None
        }
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .trim()
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Parse a space or comma separated list from an environment variable.
    fn parse_list(name: &str) -> Vec<String> {
        env::var(name)
            .map(|raw| split_list(&raw))
            .unwrap_or_default()
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Server
            host: "0.0.0.0".to_string(),
            port: 4000,
            environment: "development".to_string(),
            shutdown_timeout: Duration::from_secs(30),
            // Rate limiting
            limiter_enabled: true,
            limiter_rps: 2.0,
            limiter_burst: 4,
            limiter_sweep_interval: Duration::from_secs(60),
            limiter_retention: Duration::from_secs(180),
            trusted_proxies: vec![],
            // CORS
            cors_trusted_origins: vec![],
            // Tokens
            authentication_token_ttl: Duration::from_secs(24 * 60 * 60),
            activation_token_ttl: Duration::from_secs(3 * 24 * 60 * 60),
            password_reset_token_ttl: Duration::from_secs(30 * 60),
            // Storage
            store_timeout: Duration::from_secs(5),
            // Mail
            mail_relay_url: None,
            mail_sender: "Greenlight <no-reply@greenlight.local>".to_string(),
            mail_timeout: Duration::from_secs(5),
            mail_max_attempts: 3,
            mail_retry_delay: Duration::from_millis(500),
            // Observability
            metrics_port: 9090,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert_eq!(config.port, 4000);
        assert!(config.limiter_enabled);
        assert_eq!(config.limiter_rps, 2.0);
        assert_eq!(config.limiter_burst, 4);
        assert_eq!(config.limiter_retention, Duration::from_secs(180));
        assert_eq!(config.authentication_token_ttl, Duration::from_secs(86_400));
        assert_eq!(config.activation_token_ttl, Duration::from_secs(259_200));
        assert_eq!(config.password_reset_token_ttl, Duration::from_secs(1_800));
        assert!(config.cors_trusted_origins.is_empty());
    }

    #[test]
    fn test_server_addr_format() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };

        assert_eq!(config.server_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_split_list_accepts_spaces_and_commas() {
        assert_eq!(
            split_list("https://a.example  https://b.example,https://c.example"),
            vec![
                "https://a.example".to_string(),
                "https://b.example".to_string(),
                "https://c.example".to_string()
            ]
        );
        assert!(split_list("  ").is_empty());
    }

    #[test]
    fn test_validate_rejects_zero_rps_when_enabled() {
        let config = Config {
            limiter_rps: 0.0,
            ..Config::default()
        };

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("LIMITER_RPS"));
    }

    #[test]
    fn test_validate_rejects_rps_with_unrepresentable_period() {
        let config = Config {
            limiter_rps: 1e-30,
            ..Config::default()
        };

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("LIMITER_RPS"));
    }

    #[test]
    fn test_validate_allows_zero_rps_when_disabled() {
        let config = Config {
            limiter_enabled: false,
            limiter_rps: 0.0,
            limiter_burst: 0,
            ..Config::default()
        };

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_burst() {
        let config = Config {
            limiter_burst: 0,
            ..Config::default()
        };

        assert!(config.validate().unwrap_err().to_string().contains("LIMITER_BURST"));
    }

    #[test]
    fn test_validate_rejects_unknown_environment() {
        let config = Config {
            environment: "qa".to_string(),
            ..Config::default()
        };

        assert!(config.validate().unwrap_err().to_string().contains("APP_ENV"));
    }

    #[test]
    fn test_metrics_addr_disabled_on_zero_port() {
        let config = Config {
            metrics_port: 0,
            ..Config::default()
        };
        assert!(config.metrics_addr().is_none());
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }
}
