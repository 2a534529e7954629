use sibyl::config::AppConfig;
use sibyl::cycle::ExecutionCycle;
use sibyl::domain::plan::{MAX_LEVERAGE, MIN_NOTIONAL_USDT};
use sibyl::infrastructure::binance::BinanceFutures;
use sibyl::infrastructure::news::SerpApiNews;
use sibyl::infrastructure::oracle::OpenAiOracle;
use sibyl::persistence::repository::TradeLedger;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Best-effort lookup of the public egress IP, so operators can verify the
/// exchange API whitelist before the first signed request fails
async fn log_public_ip() {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
    {
        Ok(client) => client,
        Err(_) => return,
    };
    match client.get("https://api.ipify.org").send().await {
        Ok(response) => match response.text().await {
            Ok(ip) => info!("Public IP: {} (whitelist this on the exchange)", ip.trim()),
            Err(e) => warn!("Could not read public IP response: {}", e),
        },
        Err(e) => warn!("Could not determine public IP: {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sibyl=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();

    info!("Sibyl automated trading starting");
    info!(
        "Symbol: {} | max leverage: {}x | minimum position: {} USDT",
        config.symbol, MAX_LEVERAGE, MIN_NOTIONAL_USDT
    );
    info!("Ledger: {}", config.database_url);

    log_public_ip().await;

    if !config.has_exchange_credentials() {
        warn!("BINANCE_API_KEY / BINANCE_SECRET_KEY not set; exchange calls will fail");
    }
    if config.openai_api_key.is_empty() {
        warn!("OPENAI_API_KEY not set; oracle calls will fail");
    }
    if config.serpapi_key.is_empty() {
        warn!("SERPAPI_KEY not set; running without news sentiment");
    }

    let pool = sibyl::persistence::init_database(&config.database_url).await?;
    let ledger = TradeLedger::new(pool);

    match ledger.statistics().await {
        Ok(stats) if stats.total_trades > 0 => info!(
            "Resuming with {} past trades ({} long / {} short)",
            stats.total_trades, stats.long_trades, stats.short_trades
        ),
        Ok(_) => info!("Fresh ledger, no trading history yet"),
        Err(e) => warn!("Could not read ledger statistics: {}", e),
    }

    let gateway = BinanceFutures::new(
        config.binance_api_key.clone(),
        config.binance_secret_key.clone(),
    )?;
    let oracle = OpenAiOracle::new(config.openai_api_key.clone(), config.oracle_model.clone());
    let news = SerpApiNews::new(config.serpapi_key.clone())?;

    let cycle = ExecutionCycle::new(gateway, oracle, news, ledger, config);
    cycle.run().await;

    Ok(())
}
