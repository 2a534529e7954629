//! Process configuration
//!
//! Everything comes from environment variables (via `.env` in development).
//! Missing exchange credentials are tolerated at startup: the bot warns and
//! the first live gateway call fails instead.

use tracing::warn;

/// Runtime configuration for the trading loop
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Futures symbol traded, exchange notation (e.g. "BTCUSDT")
    pub symbol: String,
    /// Query string sent to the news feed
    pub news_query: String,
    /// Oracle model identifier
    pub oracle_model: String,
    /// SQLite ledger location
    pub database_url: String,

    pub binance_api_key: String,
    pub binance_secret_key: String,
    pub openai_api_key: String,
    pub serpapi_key: String,

    /// Wait after a terminal cycle outcome (trade, no-trade or skip)
    pub cooldown_secs: u64,
    /// Poll interval while a position is open
    pub position_poll_secs: u64,
    /// Backoff after an uncaught cycle error
    pub error_backoff_secs: u64,
    /// Settle pause between cancelling stale orders and analyzing
    pub order_settle_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            news_query: "bitcoin".to_string(),
            oracle_model: "gpt-4o".to_string(),
            database_url: "sqlite://data/trading_history.db".to_string(),
            binance_api_key: String::new(),
            binance_secret_key: String::new(),
            openai_api_key: String::new(),
            serpapi_key: String::new(),
            cooldown_secs: 180,
            position_poll_secs: 1,
            error_backoff_secs: 5,
            order_settle_secs: 5,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything absent or invalid
    pub fn from_env() -> AppConfig {
        let mut config = AppConfig::default();

        if let Ok(symbol) = std::env::var("TRADING_SYMBOL") {
            if !symbol.trim().is_empty() {
                config.symbol = symbol.trim().to_uppercase();
            }
        }

        if let Ok(query) = std::env::var("NEWS_QUERY") {
            if !query.trim().is_empty() {
                config.news_query = query.trim().to_string();
            }
        }

        if let Ok(model) = std::env::var("ORACLE_MODEL") {
            if !model.trim().is_empty() {
                config.oracle_model = model.trim().to_string();
            }
        }

        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.trim().is_empty() {
                config.database_url = url.trim().to_string();
            }
        }

        config.binance_api_key = std::env::var("BINANCE_API_KEY").unwrap_or_default();
        config.binance_secret_key = std::env::var("BINANCE_SECRET_KEY").unwrap_or_default();
        config.openai_api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        config.serpapi_key = std::env::var("SERPAPI_KEY").unwrap_or_default();

        if let Ok(cooldown) = std::env::var("COOLDOWN_SECONDS") {
            match cooldown.parse::<u64>() {
                Ok(value) if (10..=3600).contains(&value) => config.cooldown_secs = value,
                Ok(value) => warn!(
                    "Invalid COOLDOWN_SECONDS value: {} (must be 10-3600), using default: {}",
                    value, config.cooldown_secs
                ),
                Err(e) => warn!(
                    "Failed to parse COOLDOWN_SECONDS '{}': {}, using default: {}",
                    cooldown, e, config.cooldown_secs
                ),
            }
        }

        if let Ok(poll) = std::env::var("POSITION_POLL_SECONDS") {
            if let Ok(value) = poll.parse::<u64>() {
                if (1..=60).contains(&value) {
                    config.position_poll_secs = value;
                }
            }
        }

        config
    }

    /// Whether both exchange credentials are present
    pub fn has_exchange_credentials(&self) -> bool {
        !self.binance_api_key.is_empty() && !self.binance_secret_key.is_empty()
    }
}
