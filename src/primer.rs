// =============================================================================
// Window Primer — one-shot historical backfill
// =============================================================================
//
// Before the live stream starts, fetch the most recent 1-minute klines so
// the first decisions see a warm statistical window instead of an empty one.
// The fetch happens exactly once at startup; a failure leaves the bot running
// with a cold window that fills from the live feed.

use anyhow::{anyhow, Context, Result};
use tracing::{instrument, warn};

use crate::feed::json_f64;
use crate::market_data::Candle;

const BASE_URL: &str = "https://api.binance.us";

pub struct WindowPrimer {
    base_url: String,
    client: reqwest::Client,
}

impl WindowPrimer {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("reqwest client construction is infallible with static options");

        Self {
            base_url: BASE_URL.to_string(),
            client,
        }
    }

    /// Fetch up to `limit` most-recent 1m klines for `symbol`, oldest first.
    #[instrument(skip(self), name = "primer::fetch")]
    pub async fn fetch(&self, symbol: &str, limit: u32) -> Result<Vec<Candle>> {
        let url = format!(
            "{}/api/v3/klines?symbol={symbol}&interval=1m&limit={limit}",
            self.base_url
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("requesting historical klines")?;
        let status = resp.status();
        let body: serde_json::Value = resp.json().await.context("decoding klines response")?;

        if !status.is_success() {
            return Err(anyhow!("klines request returned {status}: {body}"));
        }

        parse_klines(&body, symbol)
    }
}

impl Default for WindowPrimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse the REST kline array-of-arrays. Row layout: index 0 is the open
/// time in ms, 1-5 are open/high/low/close/volume. Malformed rows are
/// skipped with a warning rather than failing the whole fetch.
pub(crate) fn parse_klines(body: &serde_json::Value, symbol: &str) -> Result<Vec<Candle>> {
    let rows = body
        .as_array()
        .ok_or_else(|| anyhow!("klines response is not an array: {body}"))?;

    let mut candles = Vec::with_capacity(rows.len());
    for row in rows {
        match parse_kline_row(row, symbol) {
            Some(candle) => candles.push(candle),
            None => warn!(%row, "skipping malformed kline row"),
        }
    }
    Ok(candles)
}

fn parse_kline_row(row: &serde_json::Value, symbol: &str) -> Option<Candle> {
    let fields = row.as_array()?;
    let open_time = fields.first()?.as_i64()?;
    let open = json_f64(fields.get(1)?)?;
    let high = json_f64(fields.get(2)?)?;
    let low = json_f64(fields.get(3)?)?;
    let close = json_f64(fields.get(4)?)?;
    let volume = json_f64(fields.get(5)?)?;

    Some(Candle::new(symbol, open_time, open, high, low, close, volume))
}
