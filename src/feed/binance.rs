// =============================================================================
// Binance.US Kline Feed
// =============================================================================
//
// Single-stream kline subscription, no handshake: the stream name in the URL
// is the subscription. Binance pushes an update for the in-progress candle
// every couple of seconds, so the same minute bucket is yielded repeatedly
// with a fresher close until the minute rolls over.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use super::{json_f64, Feed, FeedError, WsStream};
use crate::market_data::Candle;

pub struct BinanceKlineFeed {
    symbol: String,
    stream: Option<WsStream>,
}

impl BinanceKlineFeed {
    pub fn new(base_asset: &str, quote_asset: &str) -> Self {
        Self {
            symbol: format!("{base_asset}{quote_asset}").to_uppercase(),
            stream: None,
        }
    }
}

#[async_trait]
impl Feed for BinanceKlineFeed {
    async fn connect(&mut self) -> Result<(), FeedError> {
        let lower = self.symbol.to_lowercase();
        let url = format!("wss://stream.binance.us:9443/ws/{lower}@kline_1m");
        info!(url = %url, symbol = %self.symbol, "connecting to kline WebSocket");

        let (stream, _response) = connect_async(&url)
            .await
            .map_err(|e| FeedError::Connect(e.to_string()))?;

        info!(symbol = %self.symbol, "kline WebSocket connected");
        self.stream = Some(stream);
        Ok(())
    }

    async fn next_candle(&mut self) -> Result<Candle, FeedError> {
        let stream = self.stream.as_mut().ok_or(FeedError::NotConnected)?;

        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => match parse_kline(&text, &self.symbol) {
                    Ok(candle) => return Ok(candle),
                    Err(e) => warn!(error = %e, "failed to parse kline message"),
                },
                // Pings are answered by tungstenite while we poll.
                Some(Ok(
                    Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_),
                )) => {}
                Some(Ok(Message::Close(frame))) => {
                    warn!(symbol = %self.symbol, ?frame, "kline WebSocket closed by server");
                    self.stream = None;
                    return Err(FeedError::Closed);
                }
                Some(Err(e)) => {
                    self.stream = None;
                    return Err(FeedError::Transport(e.to_string()));
                }
                None => {
                    self.stream = None;
                    return Err(FeedError::Closed);
                }
            }
        }
    }
}

/// Parse a kline stream message into a candle tagged with our own symbol.
///
/// Expected shape:
/// ```json
/// { "e": "kline", "s": "BTCUSDC",
///   "k": { "t": 1700000000000, "o": "100.0", "h": "101.0", "l": "99.5",
///          "c": "100.5", "v": "12.5", "x": false } }
/// ```
fn parse_kline(text: &str, symbol: &str) -> Result<Candle> {
    let root: serde_json::Value =
        serde_json::from_str(text).context("failed to parse kline JSON")?;

    let k = root.get("k").context("missing field k")?;

    let open_time = k
        .get("t")
        .and_then(serde_json::Value::as_i64)
        .context("missing field t")?;
    let open = k.get("o").and_then(json_f64).context("missing field o")?;
    let high = k.get("h").and_then(json_f64).context("missing field h")?;
    let low = k.get("l").and_then(json_f64).context("missing field l")?;
    let close = k.get("c").and_then(json_f64).context("missing field c")?;
    let volume = k.get("v").and_then(json_f64).context("missing field v")?;

    Ok(Candle::new(symbol, open_time, open, high, low, close, volume))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KLINE_MSG: &str = r#"{
        "e": "kline", "E": 1700000031000, "s": "BTCUSDC",
        "k": {
            "t": 1700000000000, "T": 1700000059999, "s": "BTCUSDC",
            "i": "1m", "o": "100.0", "c": "100.5", "h": "101.0",
            "l": "99.5", "v": "12.5", "n": 42, "x": false
        }
    }"#;

    #[test]
    fn parses_kline_payload() {
        let candle = parse_kline(KLINE_MSG, "BTCUSDC").unwrap();
        assert_eq!(candle.open_time, 1_700_000_000_000 - 1_700_000_000_000 % 60_000);
        assert!((candle.open - 100.0).abs() < f64::EPSILON);
        assert!((candle.high - 101.0).abs() < f64::EPSILON);
        assert!((candle.low - 99.5).abs() < f64::EPSILON);
        assert!((candle.close - 100.5).abs() < f64::EPSILON);
        assert!((candle.volume - 12.5).abs() < f64::EPSILON);
    }

    #[test]
    fn candle_carries_our_symbol_not_the_payloads() {
        let candle = parse_kline(KLINE_MSG, "OVERRIDE").unwrap();
        assert_eq!(candle.symbol, "OVERRIDE");
    }

    #[test]
    fn non_kline_events_are_rejected() {
        let err = parse_kline(r#"{"e":"ping"}"#, "BTCUSDC");
        assert!(err.is_err());

        let err = parse_kline("not json at all", "BTCUSDC");
        assert!(err.is_err());
    }

    #[test]
    fn feed_symbol_is_uppercased_concat() {
        let feed = BinanceKlineFeed::new("btc", "usdc");
        assert_eq!(feed.symbol, "BTCUSDC");
    }
}
