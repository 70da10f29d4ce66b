// =============================================================================
// Order Execution Gateway
// =============================================================================
//
// The trading engine only ever sees this trait: market-buy a notional amount,
// market-sell the full held quantity. The live implementation signs requests
// against Binance.US; the paper implementation simulates fills at real ticker
// prices and is the default. Gateway failures are reported to the engine,
// which alerts and carries on — they are never fatal to the ingestion loop.

use async_trait::async_trait;
use thiserror::Error;

pub mod binance;
pub mod paper;

pub use binance::BinanceGateway;
pub use paper::PaperGateway;

/// A confirmed (or simulated) market-order fill.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderFill {
    /// Average fill price; 0.0 when the venue did not report one, in which
    /// case the engine falls back to the trigger close.
    pub price: f64,
    pub quantity: f64,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no open {symbol} position to sell")]
    NoPosition { symbol: String },
    #[error("order rejected: {0}")]
    Rejected(String),
    #[error("exchange request failed: {0}")]
    Transport(String),
    #[error("malformed exchange response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Market-buy `notional` quote-currency units of `symbol`.
    async fn buy(&self, symbol: &str, notional: f64) -> Result<OrderFill, GatewayError>;

    /// Market-sell the full held base quantity of `symbol`.
    async fn sell(&self, symbol: &str) -> Result<OrderFill, GatewayError>;
}

/// GET /api/v3/ticker/price — public last-price lookup shared by both
/// gateway implementations.
pub(crate) async fn fetch_ticker_price(
    client: &reqwest::Client,
    base_url: &str,
    symbol: &str,
) -> Result<f64, GatewayError> {
    let url = format!("{base_url}/api/v3/ticker/price?symbol={symbol}");

    let resp = client.get(&url).send().await?;
    let status = resp.status();
    let body: serde_json::Value = resp.json().await?;

    if !status.is_success() {
        return Err(GatewayError::Transport(format!(
            "ticker price returned {status}: {body}"
        )));
    }

    match body["price"].as_str().and_then(|s| s.parse::<f64>().ok()) {
        Some(p) if p > 0.0 => Ok(p),
        _ => Err(GatewayError::Malformed(format!(
            "ticker response missing price: {body}"
        ))),
    }
}

/// Round a base-asset quantity to the 8 decimal places the exchange accepts.
pub(crate) fn round_qty(qty: f64) -> f64 {
    (qty * 1e8).round() / 1e8
}
