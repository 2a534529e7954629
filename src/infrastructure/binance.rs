//! # Binance USDT-M Futures Client
//!
//! REST client for the Binance futures API implementing the
//! [`ExchangeGateway`] trait.
//!
//! ## Authentication
//!
//! Private endpoints take an HMAC-SHA256 signature of the query string,
//! computed with the API secret, plus the `X-MBX-APIKEY` header. Public
//! market-data endpoints (ticker, klines) are unsigned.
//!
//! ## References
//!
//! - https://binance-docs.github.io/apidocs/futures/en/

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::domain::gateway::{
    Candle, ExchangeGateway, ExitKind, GatewayError, OpenOrder, OrderSide,
};

/// Binance futures API base URL
const BINANCE_FAPI_BASE: &str = "https://fapi.binance.com";

/// Window the exchange accepts a signed request within, in milliseconds
const RECV_WINDOW_MS: u64 = 5_000;

/// Per-call HTTP timeout
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

type HmacSha256 = Hmac<Sha256>;

/// Binance USDT-M futures REST client
pub struct BinanceFutures {
    http: Client,
    base: String,
    api_key: String,
    api_secret: Zeroizing<String>,
}

impl std::fmt::Debug for BinanceFutures {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceFutures")
            .field("base", &self.base)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<REDACTED>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

#[derive(Debug, Deserialize)]
struct AssetBalance {
    asset: String,
    #[serde(rename = "availableBalance")]
    available_balance: String,
}

#[derive(Debug, Deserialize)]
struct PositionRisk {
    symbol: String,
    #[serde(rename = "positionAmt")]
    position_amt: String,
}

#[derive(Debug, Deserialize)]
struct OpenOrderInfo {
    #[serde(rename = "orderId")]
    order_id: i64,
    symbol: String,
}

fn parse_f64(value: &str, field: &str) -> Result<f64, GatewayError> {
    value.parse::<f64>().map_err(|e| {
        GatewayError::MalformedResponse(format!("bad numeric field {}: {}", field, e))
    })
}

/// Compute the hex HMAC-SHA256 signature Binance expects over the query
/// string
fn sign_query(secret: &str, query: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(query.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

impl BinanceFutures {
    /// Create a client with the default API base. Empty credentials are
    /// accepted; signed calls will then fail with an auth error from the
    /// exchange.
    pub fn new(api_key: String, api_secret: String) -> Result<Self, GatewayError> {
        Self::with_base(api_key, api_secret, BINANCE_FAPI_BASE.to_string())
    }

    /// Create a client against a specific base URL (testing)
    pub fn with_base(
        api_key: String,
        api_secret: String,
        base: String,
    ) -> Result<Self, GatewayError> {
        let http = Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            http,
            base,
            api_key,
            api_secret: Zeroizing::new(api_secret),
        })
    }

    fn encode_params(params: &[(&str, String)]) -> String {
        params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(GatewayError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// Unsigned GET against a public market-data endpoint
    async fn get_public<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, GatewayError> {
        let url = format!("{}{}?{}", self.base, path, Self::encode_params(params));
        let response = self.http.get(&url).send().await?;
        let response = Self::check_status(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Signed request against a private endpoint. Appends timestamp,
    /// recvWindow and the HMAC signature to the query string.
    async fn send_signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, GatewayError> {
        let mut query = Self::encode_params(params);
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(&format!(
            "recvWindow={}&timestamp={}",
            RECV_WINDOW_MS,
            Utc::now().timestamp_millis()
        ));
        let signature = sign_query(&self.api_secret, &query);
        let url = format!("{}{}?{}&signature={}", self.base, path, query, signature);

        debug!("{} {}{}", method, self.base, path);
        let response = self
            .http
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        Ok(response.json::<T>().await?)
    }

    fn parse_kline_row(row: &[serde_json::Value]) -> Result<Candle, GatewayError> {
        let open_time = row
            .first()
            .and_then(|v| v.as_i64())
            .ok_or_else(|| GatewayError::MalformedResponse("kline missing open time".into()))?;
        let timestamp = Utc
            .timestamp_millis_opt(open_time)
            .single()
            .ok_or_else(|| GatewayError::MalformedResponse("kline open time out of range".into()))?;

        let field = |idx: usize, name: &str| -> Result<f64, GatewayError> {
            let s = row
                .get(idx)
                .and_then(|v| v.as_str())
                .ok_or_else(|| GatewayError::MalformedResponse(format!("kline missing {}", name)))?;
            parse_f64(s, name)
        };

        Ok(Candle {
            timestamp,
            open: field(1, "open")?,
            high: field(2, "high")?,
            low: field(3, "low")?,
            close: field(4, "close")?,
            volume: field(5, "volume")?,
        })
    }
}

#[async_trait]
impl ExchangeGateway for BinanceFutures {
    async fn ticker_price(&self, symbol: &str) -> Result<f64, GatewayError> {
        let ticker: TickerPrice = self
            .get_public("/fapi/v1/ticker/price", &[("symbol", symbol.to_string())])
            .await?;
        parse_f64(&ticker.price, "price")
    }

    async fn available_balance(&self) -> Result<f64, GatewayError> {
        let balances: Vec<AssetBalance> = self
            .send_signed(Method::GET, "/fapi/v2/balance", &[])
            .await?;
        match balances.iter().find(|b| b.asset == "USDT") {
            Some(balance) => parse_f64(&balance.available_balance, "availableBalance"),
            None => Ok(0.0),
        }
    }

    async fn position_amount(&self, symbol: &str) -> Result<f64, GatewayError> {
        let positions: Vec<PositionRisk> = self
            .send_signed(
                Method::GET,
                "/fapi/v2/positionRisk",
                &[("symbol", symbol.to_string())],
            )
            .await?;
        match positions.iter().find(|p| p.symbol == symbol) {
            Some(position) => parse_f64(&position.position_amt, "positionAmt"),
            None => Ok(0.0),
        }
    }

    async fn open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>, GatewayError> {
        let orders: Vec<OpenOrderInfo> = self
            .send_signed(
                Method::GET,
                "/fapi/v1/openOrders",
                &[("symbol", symbol.to_string())],
            )
            .await?;
        Ok(orders
            .into_iter()
            .map(|o| OpenOrder {
                order_id: o.order_id,
                symbol: o.symbol,
            })
            .collect())
    }

    async fn cancel_order(&self, order_id: i64, symbol: &str) -> Result<(), GatewayError> {
        let _: serde_json::Value = self
            .send_signed(
                Method::DELETE,
                "/fapi/v1/order",
                &[
                    ("symbol", symbol.to_string()),
                    ("orderId", order_id.to_string()),
                ],
            )
            .await?;
        info!("Cancelled order {} on {}", order_id, symbol);
        Ok(())
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>, GatewayError> {
        let rows: Vec<Vec<serde_json::Value>> = self
            .get_public(
                "/fapi/v1/klines",
                &[
                    ("symbol", symbol.to_string()),
                    ("interval", interval.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        rows.iter().map(|row| Self::parse_kline_row(row)).collect()
    }

    async fn set_leverage(&self, leverage: i32, symbol: &str) -> Result<(), GatewayError> {
        let _: serde_json::Value = self
            .send_signed(
                Method::POST,
                "/fapi/v1/leverage",
                &[
                    ("symbol", symbol.to_string()),
                    ("leverage", leverage.to_string()),
                ],
            )
            .await?;
        info!("Leverage set to {}x on {}", leverage, symbol);
        Ok(())
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
    ) -> Result<(), GatewayError> {
        let _: serde_json::Value = self
            .send_signed(
                Method::POST,
                "/fapi/v1/order",
                &[
                    ("symbol", symbol.to_string()),
                    ("side", side.to_string()),
                    ("type", "MARKET".to_string()),
                    ("quantity", format!("{:.3}", quantity)),
                ],
            )
            .await?;
        info!("Market {} {} {:.3}", side, symbol, quantity);
        Ok(())
    }

    async fn place_exit_order(
        &self,
        symbol: &str,
        kind: ExitKind,
        side: OrderSide,
        quantity: f64,
        stop_price: f64,
    ) -> Result<(), GatewayError> {
        let order_type = match kind {
            ExitKind::StopLoss => "STOP_MARKET",
            ExitKind::TakeProfit => "TAKE_PROFIT_MARKET",
        };
        let _: serde_json::Value = self
            .send_signed(
                Method::POST,
                "/fapi/v1/order",
                &[
                    ("symbol", symbol.to_string()),
                    ("side", side.to_string()),
                    ("type", order_type.to_string()),
                    ("quantity", format!("{:.3}", quantity)),
                    ("stopPrice", format!("{:.2}", stop_price)),
                    ("reduceOnly", "true".to_string()),
                ],
            )
            .await?;
        info!(
            "{} {} {} {:.3} @ {:.2}",
            order_type, side, symbol, quantity, stop_price
        );
        Ok(())
    }
}
