//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `BOXLANE_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `BOXLANE_BASE_URL` - Public URL for the storefront
//!
//! ## Optional
//! - `BOXLANE_HOST` - Bind address (default: 127.0.0.1)
//! - `BOXLANE_PORT` - Listen port (default: 3000)
//! - `BOXLANE_RECEIPT_DIR` - Where receipt images are written (default: data/receipts)
//! - `BOXLANE_RECEIPT_MAX_BYTES` - Receipt size limit (default: 5242880)
//! - `BOXLANE_CODE_TTL_SECONDS` - Verification code lifetime (default: 600)
//! - `BOXLANE_CODE_COOLDOWN_SECONDS` - Minimum gap between codes (default: 60)
//! - `BOXLANE_CODE_MAX_ATTEMPTS` - Wrong guesses before a code locks (default: 3)
//! - `BOXLANE_LOG_JSON` - Emit JSON logs when set
//! - `SMTP_HOST`, `SMTP_PORT`, `SMTP_USERNAME`, `SMTP_PASSWORD`, `EMAIL_FROM` -
//!   Outbound email; set all of them or none (codes are then only logged)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Trace sample rate (default: 0.1)

use std::collections::HashMap;
use std::fmt::Display;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use boxlane_core::{CodePolicy, MAX_RECEIPT_BYTES};
use secrecy::SecretString;
use thiserror::Error;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Receipt storage and size limit
    pub receipts: ReceiptConfig,
    /// Verification code timing and attempt limits
    pub codes: CodePolicy,
    /// SMTP delivery for verification codes (optional)
    pub email: Option<EmailConfig>,
    /// Emit JSON-formatted logs
    pub log_json: bool,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "staging", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate for performance monitoring (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
}

/// Receipt upload configuration.
#[derive(Debug, Clone)]
pub struct ReceiptConfig {
    /// Directory receipt images are written to
    pub dir: PathBuf,
    /// Largest accepted upload in bytes
    pub max_bytes: usize,
}

/// SMTP configuration.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct EmailConfig {
    /// SMTP server hostname
    pub smtp_host: String,
    /// SMTP server port
    pub smtp_port: u16,
    /// SMTP authentication username
    pub smtp_username: String,
    /// SMTP authentication password
    pub smtp_password: SecretString,
    /// Email sender address (From header)
    pub from_address: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("BOXLANE_DATABASE_URL")?;
        let host: IpAddr = get_parsed_or_default("BOXLANE_HOST", "127.0.0.1")?;
        let port: u16 = get_parsed_or_default("BOXLANE_PORT", "3000")?;
        let base_url = get_required_env("BOXLANE_BASE_URL")?;
        url::Url::parse(&base_url).map_err(|e| {
            ConfigError::InvalidEnvVar("BOXLANE_BASE_URL".to_string(), e.to_string())
        })?;

        let receipts = ReceiptConfig::from_env()?;
        let codes = code_policy_from_env()?;
        let email = EmailConfig::from_env()?;
        let log_json = get_optional_env("BOXLANE_LOG_JSON").is_some_and(|v| v != "0" && v != "false");

        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.1);

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            receipts,
            codes,
            email,
            log_json,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether session cookies should be marked `Secure`.
    #[must_use]
    pub fn is_https(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

impl ReceiptConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let dir = PathBuf::from(get_env_or_default("BOXLANE_RECEIPT_DIR", "data/receipts"));
        let max_bytes: usize = get_parsed_or_default(
            "BOXLANE_RECEIPT_MAX_BYTES",
            &MAX_RECEIPT_BYTES.to_string(),
        )?;
        if max_bytes == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "BOXLANE_RECEIPT_MAX_BYTES".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        Ok(Self { dir, max_bytes })
    }
}

impl Default for ReceiptConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/receipts"),
            max_bytes: MAX_RECEIPT_BYTES,
        }
    }
}

impl EmailConfig {
    /// Load SMTP configuration from environment.
    ///
    /// Returns `None` if no SMTP variables are set (codes are logged instead).
    /// Host, username, password, and sender must be set together.
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let host = get_optional_env("SMTP_HOST");
        let username = get_optional_env("SMTP_USERNAME");
        let password = get_optional_env("SMTP_PASSWORD");
        let from = get_optional_env("EMAIL_FROM");

        match (host, username, password, from) {
            (Some(smtp_host), Some(smtp_username), Some(password), Some(from_address)) => {
                validate_secret_strength(&password, "SMTP_PASSWORD")?;
                let smtp_port: u16 = get_parsed_or_default("SMTP_PORT", "587")?;
                Ok(Some(Self {
                    smtp_host,
                    smtp_port,
                    smtp_username,
                    smtp_password: SecretString::from(password),
                    from_address,
                }))
            }
            (None, None, None, None) => Ok(None),
            _ => Err(ConfigError::InvalidEnvVar(
                "SMTP_*".to_string(),
                "SMTP_HOST, SMTP_USERNAME, SMTP_PASSWORD and EMAIL_FROM must be set together"
                    .to_string(),
            )),
        }
    }
}

fn code_policy_from_env() -> Result<CodePolicy, ConfigError> {
    let ttl: i64 = get_parsed_or_default("BOXLANE_CODE_TTL_SECONDS", "600")?;
    let cooldown: i64 = get_parsed_or_default("BOXLANE_CODE_COOLDOWN_SECONDS", "60")?;
    let max_attempts: u32 = get_parsed_or_default("BOXLANE_CODE_MAX_ATTEMPTS", "3")?;
    validate_code_policy(ttl, cooldown, max_attempts)?;
    Ok(CodePolicy::from_seconds(ttl, cooldown, max_attempts))
}

fn validate_code_policy(ttl: i64, cooldown: i64, max_attempts: u32) -> Result<(), ConfigError> {
    if !(1..=86_400).contains(&ttl) {
        return Err(ConfigError::InvalidEnvVar(
            "BOXLANE_CODE_TTL_SECONDS".to_string(),
            "must be between 1 and 86400".to_string(),
        ));
    }
    if !(0..=86_400).contains(&cooldown) {
        return Err(ConfigError::InvalidEnvVar(
            "BOXLANE_CODE_COOLDOWN_SECONDS".to_string(),
            "must be between 0 and 86400".to_string(),
        ));
    }
    if max_attempts == 0 {
        return Err(ConfigError::InvalidEnvVar(
            "BOXLANE_CODE_MAX_ATTEMPTS".to_string(),
            "must be at least 1".to_string(),
        ));
    }
    Ok(())
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL` (used by Fly.io postgres attach).
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get an environment variable (or default) parsed into `T`.
fn get_parsed_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}
