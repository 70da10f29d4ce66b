// =============================================================================
// Alpaca Crypto Trade Feed
// =============================================================================
//
// Authenticated trade stream. The handshake is three phases: the server
// greeting, an auth exchange, then a trade subscription, each acknowledged
// with a control frame. After that every text frame is a JSON array of
// trades that get folded into running one-minute candles.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::json;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use super::{expect_ack, json_f64, send_json, Control, Feed, FeedError, TickAggregator, WsStream};
use crate::market_data::Candle;

const STREAM_URL: &str = "wss://stream.data.alpaca.markets/v1beta3/crypto/us";

pub struct AlpacaTradeFeed {
    /// Symbol stamped on emitted candles, e.g. "BTCUSD".
    symbol: String,
    /// Venue pair used on the wire, e.g. "BTC/USD".
    pair: String,
    key: String,
    secret: String,
    aggregator: TickAggregator,
    /// Candles parsed but not yet handed out, one per trade in frame order.
    pending: VecDeque<Candle>,
    stream: Option<WsStream>,
}

impl AlpacaTradeFeed {
    pub fn new(base_asset: &str, quote_asset: &str, key: String, secret: String) -> Self {
        let base = base_asset.to_uppercase();
        let quote = quote_asset.to_uppercase();
        let symbol = format!("{base}{quote}");

        Self {
            aggregator: TickAggregator::new(&symbol),
            symbol,
            pair: format!("{base}/{quote}"),
            key,
            secret,
            pending: VecDeque::new(),
            stream: None,
        }
    }

    /// Fold one data frame's trades into the aggregator, queueing the candle
    /// state after each trade. A frame whose trades straddle a minute
    /// boundary queues the earlier minute's final shape ahead of the new
    /// minute's opening one.
    fn enqueue_trades(&mut self, text: &str) {
        for (ts_ms, price, size) in parse_trades(text) {
            let candle = self.aggregator.apply(ts_ms, price, size);
            self.pending.push_back(candle);
        }
    }
}

#[async_trait]
impl Feed for AlpacaTradeFeed {
    async fn connect(&mut self) -> Result<(), FeedError> {
        info!(url = STREAM_URL, pair = %self.pair, "connecting to Alpaca trade WebSocket");

        let (mut stream, _response) = connect_async(STREAM_URL)
            .await
            .map_err(|e| FeedError::Connect(e.to_string()))?;

        // Server greets with [{"T":"success","msg":"connected"}] before auth.
        expect_ack(&mut stream, "connection greeting", classify_control).await?;

        let auth = json!({ "action": "auth", "key": self.key, "secret": self.secret });
        send_json(&mut stream, &auth).await?;
        expect_ack(&mut stream, "authentication", classify_control).await?;

        let subscribe = json!({ "action": "subscribe", "trades": [self.pair] });
        send_json(&mut stream, &subscribe).await?;
        expect_ack(&mut stream, "trade subscription", classify_control).await?;

        info!(pair = %self.pair, "Alpaca trade stream subscribed");
        self.stream = Some(stream);
        Ok(())
    }

    async fn next_candle(&mut self) -> Result<Candle, FeedError> {
        loop {
            // Drain queued candles before touching the wire.
            if let Some(candle) = self.pending.pop_front() {
                return Ok(candle);
            }

            let stream = self.stream.as_mut().ok_or(FeedError::NotConnected)?;
            match stream.next().await {
                Some(Ok(Message::Text(text))) => self.enqueue_trades(&text),
                Some(Ok(
                    Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_),
                )) => {}
                Some(Ok(Message::Close(frame))) => {
                    warn!(pair = %self.pair, ?frame, "Alpaca WebSocket closed by server");
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

/// Classify one handshake frame.
///
/// Expected shapes:
/// ```json
/// [{"T":"success","msg":"authenticated"}]
/// [{"T":"error","code":402,"msg":"auth failed"}]
/// [{"T":"subscription","trades":["BTC/USD"]}]
/// ```
fn classify_control(text: &str) -> Control {
    let Ok(root) = serde_json::from_str::<serde_json::Value>(text) else {
        return Control::Other;
    };
    let Some(items) = root.as_array() else {
        return Control::Other;
    };

    for item in items {
        match item["T"].as_str() {
            Some("error") => {
                let msg = item["msg"].as_str().unwrap_or("unspecified error");
                return Control::Error(format!("{msg} (code {})", item["code"]));
            }
            Some("success") | Some("subscription") => return Control::Ack,
            _ => {}
        }
    }
    Control::Other
}

/// Extract `(timestamp_ms, price, size)` triples from a data frame, skipping
/// non-trade entries such as quotes and bars.
fn parse_trades(text: &str) -> Vec<(i64, f64, f64)> {
    let Ok(root) = serde_json::from_str::<serde_json::Value>(text) else {
        return Vec::new();
    };
    let Some(items) = root.as_array() else {
        return Vec::new();
    };
    items.iter().filter_map(parse_trade).collect()
}

fn parse_trade(item: &serde_json::Value) -> Option<(i64, f64, f64)> {
    if item["T"].as_str()? != "t" {
        return None;
    }
    let price = item.get("p").and_then(json_f64)?;
    let size = item.get("s").and_then(json_f64)?;
    let ts_ms = parse_timestamp(item.get("t")?)?;
    Some((ts_ms, price, size))
}

/// Trade timestamps arrive as RFC 3339 strings on the current API and as
/// integer nanoseconds on older ones.
fn parse_timestamp(v: &serde_json::Value) -> Option<i64> {
    match v {
        serde_json::Value::String(s) => chrono::DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.timestamp_millis()),
        serde_json::Value::Number(n) => n.as_i64().map(|ns| ns / 1_000_000),
        _ => None,
    }
}

// Manual Debug: never leak credentials into logs.
impl std::fmt::Debug for AlpacaTradeFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlpacaTradeFeed")
            .field("symbol", &self.symbol)
            .field("pair", &self.pair)
            .field("key", &"<redacted>")
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_frames_classify() {
        assert_eq!(
            classify_control(r#"[{"T":"success","msg":"connected"}]"#),
            Control::Ack
        );
        assert_eq!(
            classify_control(r#"[{"T":"subscription","trades":["BTC/USD"]}]"#),
            Control::Ack
        );
        assert_eq!(
            classify_control(r#"[{"T":"error","code":402,"msg":"auth failed"}]"#),
            Control::Error("auth failed (code 402)".into())
        );
        assert_eq!(classify_control(r#"[{"T":"t","p":1.0}]"#), Control::Other);
        assert_eq!(classify_control("garbage"), Control::Other);
    }

    #[test]
    fn trade_frames_parse_and_skip_other_entries() {
        let frame = r#"[
            {"T":"t","S":"BTC/USD","p":64000.5,"s":0.002,"t":"2023-11-14T22:13:20.5Z","i":1,"tks":"B"},
            {"T":"q","S":"BTC/USD","bp":63999.0,"ap":64001.0},
            {"T":"t","S":"BTC/USD","p":"64010.0","s":"0.001","t":"2023-11-14T22:13:21Z","i":2,"tks":"S"}
        ]"#;

        let trades = parse_trades(frame);
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].0, 1_700_000_000_500);
        assert!((trades[0].1 - 64000.5).abs() < f64::EPSILON);
        assert!((trades[0].2 - 0.002).abs() < f64::EPSILON);
        assert!((trades[1].1 - 64010.0).abs() < f64::EPSILON);
    }

    #[test]
    fn nanosecond_timestamps_are_accepted() {
        let v = serde_json::json!(1_700_000_000_500_000_000_i64);
        assert_eq!(parse_timestamp(&v), Some(1_700_000_000_500));
    }

    #[test]
    fn straddling_frame_queues_both_minutes() {
        let mut feed = AlpacaTradeFeed::new("btc", "usd", "k".into(), "s".into());
        let frame = r#"[
            {"T":"t","S":"BTC/USD","p":64000.0,"s":0.002,"t":"2023-11-14T22:13:20Z","i":1,"tks":"B"},
            {"T":"t","S":"BTC/USD","p":64050.0,"s":0.001,"t":"2023-11-14T22:13:40Z","i":2,"tks":"S"},
            {"T":"t","S":"BTC/USD","p":64100.0,"s":0.003,"t":"2023-11-14T22:14:05Z","i":3,"tks":"B"}
        ]"#;

        feed.enqueue_trades(frame);
        assert_eq!(feed.pending.len(), 3);

        let first = feed.pending.pop_front().unwrap();
        let second = feed.pending.pop_front().unwrap();
        let third = feed.pending.pop_front().unwrap();

        // Both 22:13 trades land in the same candle before 22:14 opens, so
        // the earlier minute's final shape is still handed out.
        assert_eq!(first.open_time, second.open_time);
        assert!((second.close - 64050.0).abs() < f64::EPSILON);
        assert!((second.high - 64050.0).abs() < f64::EPSILON);
        assert!((second.volume - 0.003).abs() < 1e-12);

        assert_eq!(third.open_time - second.open_time, 60_000);
        assert!((third.open - 64100.0).abs() < f64::EPSILON);
        assert!((third.volume - 0.003).abs() < f64::EPSILON);
    }

    #[test]
    fn symbol_and_pair_derive_from_assets() {
        let feed = AlpacaTradeFeed::new("btc", "usd", "k".into(), "s".into());
        assert_eq!(feed.symbol, "BTCUSD");
        assert_eq!(feed.pair, "BTC/USD");
    }

    #[test]
    fn debug_output_redacts_credentials() {
        let feed = AlpacaTradeFeed::new("BTC", "USD", "real-key".into(), "real-secret".into());
        let rendered = format!("{feed:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("real-key"));
        assert!(!rendered.contains("real-secret"));
    }
}
