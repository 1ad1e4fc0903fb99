//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `STOREFRONT_BASE_URL` - Public URL for the storefront
//! - `STOREFRONT_SESSION_SECRET` - Session signing secret (min 32 chars, high entropy)
//! - `BILLING_SECRET_KEY` - Billing provider API key
//! - `BILLING_WEBHOOK_SECRET` - Webhook signing secret
//! - `SWEEP_BEARER_TOKEN` - Bearer token guarding `POST /subscriptions/sweep-expired`
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `STOREFRONT_DB_MAX_CONNECTIONS` - Pool size (default: 20, at least 2)
//! - `BILLING_API_BASE` - Provider API base URL (default: <https://api.stripe.com/v1>)
//! - `BILLING_TIMEOUT_SECS` - Upper bound on any provider call (default: 10)
//! - `STORE_COUNTRY` - Country written on checkout addresses (default: US)
//! - `STORE_CURRENCY` - Currency of orders and plans (default: USD)
//! - `PRO_MONTHLY_PRICE` / `PRO_ANNUAL_PRICE` - Plan prices (default: 9.99 / 99.99)
//! - `SWEEP_INTERVAL_SECS` - Run the expiry sweep in-process at this interval (default: off)
//! - `SWEEP_BATCH_SIZE` - Users expired per sweep batch (default: 500)
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use aurora_core::{CountryCode, CurrencyCode, ProPlan};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

const MIN_SESSION_SECRET_LENGTH: usize = 32;
const MIN_POOL_SIZE: u32 = 2;
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
    /// Maximum pooled database connections.
    ///
    /// Cancel and reactivate hold a connection across one provider call, so
    /// this bounds how many may wait on the provider at once.
    pub db_max_connections: u32,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Session signing secret
    pub session_secret: SecretString,
    /// Billing provider configuration
    pub billing: BillingConfig,
    /// Deployment-wide store settings
    pub store: StoreConfig,
    /// Expiry sweep settings
    pub sweep: SweepConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag (e.g. `production`)
    pub sentry_environment: Option<String>,
    /// Fraction of error events sent to Sentry
    pub sentry_sample_rate: f32,
    /// Fraction of transactions traced
    pub sentry_traces_sample_rate: f32,
}

/// Billing provider configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct BillingConfig {
    /// API base URL, without trailing slash
    pub api_base: Url,
    /// Secret API key (server-side only)
    pub secret_key: SecretString,
    /// Webhook signing secret
    pub webhook_secret: SecretString,
    /// Upper bound for every provider call
    pub timeout: Duration,
}

impl std::fmt::Debug for BillingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BillingConfig")
            .field("api_base", &self.api_base.as_str())
            .field("secret_key", &"[REDACTED]")
            .field("webhook_secret", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Settings fixed per deployment.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Country code written on checkout addresses
    pub country: CountryCode,
    /// Currency of orders and plans
    pub currency: CurrencyCode,
    /// Price of the monthly Aurora Pro plan
    pub pro_monthly_price: Decimal,
    /// Price of the annual Aurora Pro plan
    pub pro_annual_price: Decimal,
}

impl StoreConfig {
    /// Catalog price for a Pro plan.
    #[must_use]
    pub const fn plan_price(&self, plan: ProPlan) -> Decimal {
        match plan {
            ProPlan::Monthly => self.pro_monthly_price,
            ProPlan::Annual => self.pro_annual_price,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            country: CountryCode::default(),
            currency: CurrencyCode::default(),
            pro_monthly_price: Decimal::new(999, 2),
            pro_annual_price: Decimal::new(9999, 2),
        }
    }
}

/// Expiry sweep settings.
#[derive(Clone)]
pub struct SweepConfig {
    /// Bearer token for the HTTP sweep trigger
    pub bearer_token: SecretString,
    /// Interval of the in-process sweeper, if enabled
    pub interval: Option<Duration>,
    /// Users expired per batch
    pub batch_size: i64,
}

impl std::fmt::Debug for SweepConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SweepConfig")
            .field("bearer_token", &"[REDACTED]")
            .field("interval", &self.interval)
            .field("batch_size", &self.batch_size)
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

        let database_url = get_database_url("STOREFRONT_DATABASE_URL")?;
        let host = parse_env_or_default::<IpAddr>("STOREFRONT_HOST", "127.0.0.1")?;
        let port = parse_env_or_default::<u16>("STOREFRONT_PORT", "3000")?;
        let db_max_connections = validate_pool_size(
            parse_env_or_default::<u32>("STOREFRONT_DB_MAX_CONNECTIONS", "20")?,
            "STOREFRONT_DB_MAX_CONNECTIONS",
        )?;
        let base_url = get_required_env("STOREFRONT_BASE_URL")?;
        let session_secret = get_validated_secret("STOREFRONT_SESSION_SECRET")?;
        validate_session_secret(&session_secret, "STOREFRONT_SESSION_SECRET")?;

        Ok(Self {
            database_url,
            host,
            port,
            db_max_connections,
            base_url,
            session_secret,
            billing: BillingConfig::from_env()?,
            store: StoreConfig::from_env()?,
            sweep: SweepConfig::from_env()?,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: parse_env_or_default("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: parse_env_or_default("SENTRY_TRACES_SAMPLE_RATE", "0.1")?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl BillingConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let raw_base = get_env_or_default("BILLING_API_BASE", "https://api.stripe.com/v1");
        let api_base = Url::parse(raw_base.trim_end_matches('/'))
            .map_err(|e| ConfigError::InvalidEnvVar("BILLING_API_BASE".to_string(), e.to_string()))?;
        let timeout_secs = parse_env_or_default::<u64>("BILLING_TIMEOUT_SECS", "10")?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "BILLING_TIMEOUT_SECS".to_string(),
                "must be positive".to_string(),
            ));
        }

        Ok(Self {
            api_base,
            secret_key: get_validated_secret("BILLING_SECRET_KEY")?,
            webhook_secret: get_validated_secret("BILLING_WEBHOOK_SECRET")?,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

impl StoreConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let country = CountryCode::parse(&get_env_or_default("STORE_COUNTRY", "US"))
            .map_err(|e| ConfigError::InvalidEnvVar("STORE_COUNTRY".to_string(), e.to_string()))?;
        let currency = CurrencyCode::parse(&get_env_or_default("STORE_CURRENCY", "USD"))
            .map_err(|e| ConfigError::InvalidEnvVar("STORE_CURRENCY".to_string(), e.to_string()))?;

        Ok(Self {
            country,
            currency,
            pro_monthly_price: parse_price("PRO_MONTHLY_PRICE", "9.99")?,
            pro_annual_price: parse_price("PRO_ANNUAL_PRICE", "99.99")?,
        })
    }
}

impl SweepConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let interval = match get_optional_env("SWEEP_INTERVAL_SECS") {
            Some(raw) => {
                let secs = raw.parse::<u64>().map_err(|e| {
                    ConfigError::InvalidEnvVar("SWEEP_INTERVAL_SECS".to_string(), e.to_string())
                })?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
            None => None,
        };
        let batch_size = parse_env_or_default::<i64>("SWEEP_BATCH_SIZE", "500")?;
        if batch_size <= 0 {
            return Err(ConfigError::InvalidEnvVar(
                "SWEEP_BATCH_SIZE".to_string(),
                "must be positive".to_string(),
            ));
        }

        Ok(Self {
            bearer_token: get_validated_secret("SWEEP_BEARER_TOKEN")?,
            interval,
            batch_size,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Reject pools too small to serve a request while another waits on the
/// provider.
fn validate_pool_size(size: u32, var_name: &str) -> Result<u32, ConfigError> {
    if size < MIN_POOL_SIZE {
        return Err(ConfigError::InvalidEnvVar(
            var_name.to_string(),
            format!("must be at least {MIN_POOL_SIZE}"),
        ));
    }
    Ok(size)
}

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
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
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default` when unset.
fn parse_env_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Parse a non-negative price with at most two decimal places.
fn parse_price(key: &str, default: &str) -> Result<Decimal, ConfigError> {
    let price = parse_env_or_default::<Decimal>(key, default)?;
    aurora_core::validate_amount(price)
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Validate that a session secret meets minimum length requirements.
fn validate_session_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SESSION_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
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

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn billing() -> BillingConfig {
        BillingConfig {
            api_base: Url::parse("https://api.stripe.com/v1").unwrap(),
            secret_key: SecretString::from("sk_live_9fQ2xLm4Zr7Tb1Kc"),
            webhook_secret: SecretString::from("whsec_Hn3Vq8Wd5Ys0Pj6G"),
            timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let err = validate_secret_strength("your-api-key-here", "TEST_VAR").unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let err = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR").unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_validate_secret_strength_accepts_provider_keys() {
        assert!(validate_secret_strength("sk_live_9fQ2xLm4Zr7Tb1Kc", "BILLING_SECRET_KEY").is_ok());
        assert!(validate_secret_strength("whsec_Hn3Vq8Wd5Ys0Pj6G", "BILLING_WEBHOOK_SECRET").is_ok());
    }

    #[test]
    fn test_validate_session_secret_too_short() {
        let secret = SecretString::from("short");
        assert!(validate_session_secret(&secret, "TEST_SESSION").is_err());
    }

    #[test]
    fn test_validate_pool_size() {
        assert_eq!(validate_pool_size(20, "POOL").unwrap(), 20);
        assert_eq!(validate_pool_size(2, "POOL").unwrap(), 2);
        assert!(matches!(
            validate_pool_size(1, "POOL"),
            Err(ConfigError::InvalidEnvVar(name, _)) if name == "POOL"
        ));
    }

    #[test]
    fn test_plan_price_lookup() {
        let store = StoreConfig::default();
        assert_eq!(store.plan_price(ProPlan::Monthly), Decimal::new(999, 2));
        assert_eq!(store.plan_price(ProPlan::Annual), Decimal::new(9999, 2));
        assert_eq!(store.currency.as_str(), "USD");
        assert_eq!(store.country.as_str(), "US");
    }

    #[test]
    fn test_billing_config_debug_redacts_secrets() {
        let debug_output = format!("{:?}", billing());

        assert!(debug_output.contains("api.stripe.com"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("sk_live_9fQ2xLm4Zr7Tb1Kc"));
        assert!(!debug_output.contains("whsec_Hn3Vq8Wd5Ys0Pj6G"));
    }

    #[test]
    fn test_sweep_config_debug_redacts_token() {
        let sweep = SweepConfig {
            bearer_token: SecretString::from("tok_Zp4Rw7Jx2Nq9Bv"),
            interval: None,
            batch_size: 500,
        };
        let debug_output = format!("{sweep:?}");
        assert!(!debug_output.contains("tok_Zp4Rw7Jx2Nq9Bv"));
        assert!(debug_output.contains("500"));
    }
}
