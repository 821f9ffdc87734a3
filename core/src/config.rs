//! Engine configuration.
//!
//! Every tunable can come from the environment; [`EngineConfig::from_env`]
//! reads the `ESCADA_*` variables and falls back to the defaults below.
//! Venue credentials are read per exchange
//! (`ESCADA_<EXCHANGE>_API_KEY/API_SECRET/PASSPHRASE`) and base-URL
//! overrides per exchange (`ESCADA_<EXCHANGE>_BASE_URL`).

use escada_exchange::ApiCredentials;
use escada_markets::{parse_decimal, ExchangeId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Worst-case headroom applied to the unit-leverage exposure, percent.
    pub headroom_percentage: Decimal,
    /// Scheduler tick interval.
    pub scheduler_tick: Duration,
    /// Maximum concurrently running steps per account.
    pub per_account_concurrency: usize,
    /// Workflow-level budget per atomic job.
    pub job_budget: Duration,
    /// Request-level budget per adapter call.
    pub request_timeout: Duration,
    /// A position closed faster than this is flagged `was_fast_traded`.
    pub fast_trade_max_secs: i64,
    /// ApiSnapshot freshness window, seconds.
    pub snapshot_ttl_secs: i64,
    /// Venue request weight budget per account per minute.
    pub account_weight_per_minute: u32,
    /// Delivery group tag for exception notifications.
    pub exceptions_group: String,
    /// Delivery group tag for high-profit notifications.
    pub high_profit_group: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            headroom_percentage: Decimal::new(3, 1), // 0.3%
            scheduler_tick: Duration::from_secs(10),
            per_account_concurrency: 4,
            job_budget: Duration::from_secs(120),
            request_timeout: Duration::from_secs(10),
            fast_trade_max_secs: 120,
            snapshot_ttl_secs: 5,
            account_weight_per_minute: 1200,
            exceptions_group: "exceptions".to_string(),
            high_profit_group: "high-profit".to_string(),
        }
    }
}

impl EngineConfig {
    /// Headroom as a fraction (0.3% -> 0.003) for the planner.
    pub fn headroom_fraction(&self) -> Decimal {
        self.headroom_percentage / Decimal::ONE_HUNDRED
    }

    /// Read tunables from `ESCADA_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(value) = env_decimal("ESCADA_HEADROOM_PERCENTAGE") {
            config.headroom_percentage = value;
        }
        if let Some(value) = env_u64("ESCADA_SCHEDULER_TICK_MS") {
            config.scheduler_tick = Duration::from_millis(value);
        }
        if let Some(value) = env_u64("ESCADA_ACCOUNT_CONCURRENCY") {
            config.per_account_concurrency = value.max(1) as usize;
        }
        if let Some(value) = env_u64("ESCADA_JOB_BUDGET_SECS") {
            config.job_budget = Duration::from_secs(value);
        }
        if let Some(value) = env_u64("ESCADA_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(value);
        }
        if let Some(value) = env_u64("ESCADA_FAST_TRADE_SECS") {
            config.fast_trade_max_secs = value as i64;
        }
        if let Some(value) = env_u64("ESCADA_SNAPSHOT_TTL_SECS") {
            config.snapshot_ttl_secs = value as i64;
        }
        if let Some(value) = env_u64("ESCADA_ACCOUNT_WEIGHT_PER_MINUTE") {
            config.account_weight_per_minute = value as u32;
        }
        if let Ok(value) = std::env::var("ESCADA_EXCEPTIONS_GROUP") {
            config.exceptions_group = value;
        }
        if let Ok(value) = std::env::var("ESCADA_HIGH_PROFIT_GROUP") {
            config.high_profit_group = value;
        }
        config
    }

    /// Credentials for one venue from the environment, when present.
    pub fn credentials_from_env(exchange: ExchangeId) -> Option<ApiCredentials> {
        let prefix = format!("ESCADA_{}", exchange.as_str());
        let api_key = std::env::var(format!("{prefix}_API_KEY")).ok()?;
        let api_secret = std::env::var(format!("{prefix}_API_SECRET")).ok()?;
        let mut credentials = ApiCredentials::new(api_key, api_secret);
        if let Ok(passphrase) = std::env::var(format!("{prefix}_PASSPHRASE")) {
            credentials = credentials.with_passphrase(passphrase);
        }
        Some(credentials)
    }

    /// Base-URL override for one venue from the environment.
    pub fn base_url_from_env(exchange: ExchangeId) -> Option<url::Url> {
        let value = std::env::var(format!("ESCADA_{}_BASE_URL", exchange.as_str())).ok()?;
        url::Url::parse(&value).ok()
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.parse().ok()
}

fn env_decimal(name: &str) -> Option<Decimal> {
    parse_decimal(&std::env::var(name).ok()?).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_budgets() {
        let config = EngineConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.job_budget, Duration::from_secs(120));
        assert_eq!(config.headroom_fraction(), Decimal::new(3, 3));
    }
}
