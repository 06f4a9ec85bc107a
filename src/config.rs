//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment
//! variables into a type-safe struct; an optional `.env` file is loaded
//! first via `dotenvy` for local development.
//!
//! Only `DATABASE_URL` and `WEBHOOK_SECRET` are required; every tuning knob
//! has a production-reasonable default.

use serde::Deserialize;

use crate::models::account::Currency;

/// Application configuration.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `WEBHOOK_SECRET` (required): shared HMAC secret for provider callbacks
/// - `FX_SPREAD_PCT`: spread applied to mid-market rates, defaults to 0.005
/// - `TX_LIMIT_USD` / `TX_LIMIT_EUR` / `TX_LIMIT_GBP`: per-currency transfer
///   ceilings in minor units
/// - `PROVIDER_URL` / `WEBHOOK_CALLBACK_URL`: external payout provider
/// - `PORT`, `DB_MAX_CONNECTIONS`, `IDEMPOTENCY_TTL_HOURS`,
///   `WEBHOOK_POLL_INTERVAL_MS`, `WEBHOOK_BATCH_SIZE`,
///   `SHUTDOWN_TIMEOUT_SECS`: tuning knobs with sensible defaults
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    pub webhook_secret: String,

    #[serde(default = "default_fx_spread_pct")]
    pub fx_spread_pct: f64,

    #[serde(default = "default_tx_limit_usd")]
    pub tx_limit_usd: i64,

    #[serde(default = "default_tx_limit_eur")]
    pub tx_limit_eur: i64,

    #[serde(default = "default_tx_limit_gbp")]
    pub tx_limit_gbp: i64,

    #[serde(default = "default_provider_url")]
    pub provider_url: String,

    #[serde(default = "default_webhook_callback_url")]
    pub webhook_callback_url: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    #[serde(default = "default_idempotency_ttl_hours")]
    pub idempotency_ttl_hours: i64,

    #[serde(default = "default_webhook_poll_interval_ms")]
    pub webhook_poll_interval_ms: u64,

    #[serde(default = "default_webhook_batch_size")]
    pub webhook_batch_size: i64,

    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_fx_spread_pct() -> f64 {
    0.005
}

fn default_tx_limit_usd() -> i64 {
    10_000_000
}

fn default_tx_limit_eur() -> i64 {
    9_000_000
}

fn default_tx_limit_gbp() -> i64 {
    8_000_000
}

fn default_provider_url() -> String {
    "http://localhost:8081".to_string()
}

fn default_webhook_callback_url() -> String {
    "http://localhost:8080/api/v1/webhooks/provider".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_db_max_connections() -> u32 {
    25
}

fn default_idempotency_ttl_hours() -> i64 {
    24
}

fn default_webhook_poll_interval_ms() -> u64 {
    1000
}

fn default_webhook_batch_size() -> i64 {
    10
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config
    /// struct. Field names are automatically converted:
    /// `database_url` -> `DATABASE_URL`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - A value cannot be parsed into its expected type
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Parse environment variables into the Config struct
        envy::from_env::<Config>()
    }

    /// Per-currency transfer ceiling in minor units.
    pub fn tx_limit(&self, currency: Currency) -> i64 {
        match currency {
            Currency::Usd => self.tx_limit_usd,
            Currency::Eur => self.tx_limit_eur,
            Currency::Gbp => self.tx_limit_gbp,
        }
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        database_url: "postgres://localhost/test".to_string(),
        webhook_secret: "test-secret".to_string(),
        fx_spread_pct: default_fx_spread_pct(),
        tx_limit_usd: default_tx_limit_usd(),
        tx_limit_eur: default_tx_limit_eur(),
        tx_limit_gbp: default_tx_limit_gbp(),
        provider_url: default_provider_url(),
        webhook_callback_url: default_webhook_callback_url(),
        port: default_port(),
        db_max_connections: default_db_max_connections(),
        idempotency_ttl_hours: default_idempotency_ttl_hours(),
        webhook_poll_interval_ms: default_webhook_poll_interval_ms(),
        webhook_batch_size: default_webhook_batch_size(),
        shutdown_timeout_secs: default_shutdown_timeout_secs(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_limit_is_per_currency() {
        let cfg = test_config();
        assert_eq!(cfg.tx_limit(Currency::Usd), 10_000_000);
        assert_eq!(cfg.tx_limit(Currency::Eur), 9_000_000);
        assert_eq!(cfg.tx_limit(Currency::Gbp), 8_000_000);
    }
}
