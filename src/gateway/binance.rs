// =============================================================================
// Binance.US Live Gateway — HMAC-SHA256 signed REST orders
// =============================================================================
//
// SECURITY: the secret key is used only to sign query strings and is never
// logged or serialized. Every signed request carries X-MBX-APIKEY as a header
// and a recvWindow of 5000 ms to tolerate minor clock drift.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{fetch_ticker_price, round_qty, GatewayError, OrderFill, OrderGateway};

type HmacSha256 = Hmac<Sha256>;

const BASE_URL: &str = "https://api.binance.us";
const RECV_WINDOW: u64 = 5000;

pub struct BinanceGateway {
    api_key: String,
    secret_key: String,
    /// Asset whose free balance is flattened on sell, e.g. "BTC".
    base_asset: String,
    base_url: String,
    client: reqwest::Client,
}

impl BinanceGateway {
    pub fn new(
        api_key: impl Into<String>,
        secret_key: impl Into<String>,
        base_asset: impl Into<String>,
    ) -> Self {
        let api_key = api_key.into();

        let mut headers = HeaderMap::new();
        if let Ok(v) = HeaderValue::from_str(&api_key) {
            headers.insert("X-MBX-APIKEY", v);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("reqwest client construction is infallible with static options");

        Self {
            api_key,
            secret_key: secret_key.into(),
            base_asset: base_asset.into(),
            base_url: BASE_URL.to_string(),
            client,
        }
    }

    fn timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before unix epoch")
            .as_millis() as u64
    }

    fn sign(&self, query: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .expect("hmac accepts keys of any length");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Append timestamp, recvWindow and signature to a parameter string.
    fn signed_query(&self, params: &str) -> String {
        let stamped = if params.is_empty() {
            format!("timestamp={}&recvWindow={}", Self::timestamp_ms(), RECV_WINDOW)
        } else {
            format!(
                "{params}&timestamp={}&recvWindow={}",
                Self::timestamp_ms(),
                RECV_WINDOW
            )
        };
        let signature = self.sign(&stamped);
        format!("{stamped}&signature={signature}")
    }

    /// Free (unlocked) balance of one asset from GET /api/v3/account.
    async fn free_balance(&self, asset: &str) -> Result<f64, GatewayError> {
        let url = format!("{}/api/v3/account?{}", self.base_url, self.signed_query(""));

        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        let body: serde_json::Value = resp.json().await?;

        if !status.is_success() {
            return Err(GatewayError::Rejected(format!(
                "account query returned {status}: {body}"
            )));
        }

        let balances = body["balances"]
            .as_array()
            .ok_or_else(|| GatewayError::Malformed("account response missing 'balances'".into()))?;

        for entry in balances {
            if entry["asset"].as_str() == Some(asset) {
                let free = entry["free"]
                    .as_str()
                    .and_then(|s| s.parse::<f64>().ok())
                    .unwrap_or(0.0);
                debug!(asset, free, "balance retrieved");
                return Ok(free);
            }
        }

        warn!(asset, "asset absent from account balances");
        Ok(0.0)
    }

    async fn market_order(
        &self,
        symbol: &str,
        side: &str,
        quantity: f64,
    ) -> Result<OrderFill, GatewayError> {
        let client_order_id = format!("riptide-{}", Uuid::new_v4());
        let params = format!(
            "symbol={symbol}&side={side}&type=MARKET&quantity={quantity}&newClientOrderId={client_order_id}"
        );
        let url = format!("{}/api/v3/order?{}", self.base_url, self.signed_query(&params));

        debug!(symbol, side, quantity, client_order_id, "submitting market order");

        let resp = self.client.post(&url).send().await?;
        let status = resp.status();
        let body: serde_json::Value = resp.json().await?;

        if !status.is_success() {
            return Err(GatewayError::Rejected(format!(
                "order returned {status}: {body}"
            )));
        }

        Ok(parse_fill(&body))
    }
}

/// Extract quantity and average price from an order response. Price is the
/// volume-weighted average across partial fills, falling back to the flat
/// `price` field, then 0.0 (the engine substitutes the trigger close).
fn parse_fill(body: &serde_json::Value) -> OrderFill {
    let quantity = body["executedQty"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);

    let price = match body["fills"].as_array() {
        Some(fills) if !fills.is_empty() => {
            let mut notional = 0.0;
            let mut filled = 0.0;
            for fill in fills {
                let p = fill["price"]
                    .as_str()
                    .and_then(|s| s.parse::<f64>().ok())
                    .unwrap_or(0.0);
                let q = fill["qty"]
                    .as_str()
                    .and_then(|s| s.parse::<f64>().ok())
                    .unwrap_or(0.0);
                notional += p * q;
                filled += q;
            }
            if filled > 0.0 {
                notional / filled
            } else {
                0.0
            }
        }
        _ => body["price"]
            .as_str()
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(0.0),
    };

    OrderFill { price, quantity }
}

#[async_trait]
impl OrderGateway for BinanceGateway {
    #[instrument(skip(self), name = "gateway::buy")]
    async fn buy(&self, symbol: &str, notional: f64) -> Result<OrderFill, GatewayError> {
        let price = fetch_ticker_price(&self.client, &self.base_url, symbol).await?;
        let quantity = round_qty(notional / price);
        if quantity <= 0.0 {
            return Err(GatewayError::Rejected(format!(
                "notional {notional} too small at price {price}"
            )));
        }

        let fill = self.market_order(symbol, "BUY", quantity).await?;
        info!(symbol, quantity, fill_price = fill.price, "market buy filled");
        Ok(fill)
    }

    #[instrument(skip(self), name = "gateway::sell")]
    async fn sell(&self, symbol: &str) -> Result<OrderFill, GatewayError> {
        let held = round_qty(self.free_balance(&self.base_asset).await?);
        if held <= 0.0 {
            return Err(GatewayError::NoPosition {
                symbol: symbol.to_string(),
            });
        }

        let fill = self.market_order(symbol, "SELL", held).await?;
        info!(symbol, quantity = held, fill_price = fill.price, "market sell filled");
        Ok(fill)
    }
}

// Manual Debug: never leak credentials into logs.
impl std::fmt::Debug for BinanceGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceGateway")
            .field("api_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .field("base_asset", &self.base_asset)
            .field("base_url", &self.base_url)
            .finish()
    }
}
