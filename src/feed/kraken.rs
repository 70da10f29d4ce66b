// =============================================================================
// Kraken Trade Feed
// =============================================================================
//
// Public trade channel, no auth. One subscribe exchange, then data frames
// arrive as positional JSON arrays interleaved with heartbeat objects.
// Trades are folded into running one-minute candles.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::json;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use super::{expect_ack, json_f64, send_json, Control, Feed, FeedError, TickAggregator, WsStream};
use crate::market_data::Candle;

const STREAM_URL: &str = "wss://ws.kraken.com";

#[derive(Debug)]
pub struct KrakenTradeFeed {
    /// Symbol stamped on emitted candles, e.g. "BTCUSD".
    symbol: String,
    /// Venue pair used on the wire, e.g. "XBT/USD".
    pair: String,
    aggregator: TickAggregator,
    /// Candles parsed but not yet handed out, one per trade in frame order.
    pending: VecDeque<Candle>,
    stream: Option<WsStream>,
}

impl KrakenTradeFeed {
    pub fn new(base_asset: &str, quote_asset: &str) -> Self {
        let base = base_asset.to_uppercase();
        let quote = quote_asset.to_uppercase();
        let symbol = format!("{base}{quote}");

        Self {
            aggregator: TickAggregator::new(&symbol),
            symbol,
            pair: format!("{}/{}", kraken_asset(&base), kraken_asset(&quote)),
            pending: VecDeque::new(),
            stream: None,
        }
    }

    /// Fold one data frame's trades into the aggregator, queueing the candle
    /// state after each trade. A batch whose trades straddle a minute
    /// boundary queues the earlier minute's final shape ahead of the new
    /// minute's opening one.
    fn enqueue_trades(&mut self, text: &str) {
        for (ts_ms, price, volume) in parse_trades(text) {
            let candle = self.aggregator.apply(ts_ms, price, volume);
            self.pending.push_back(candle);
        }
    }
}

/// Kraken's websocket pairs use XBT for bitcoin.
fn kraken_asset(asset: &str) -> &str {
    match asset {
        "BTC" => "XBT",
        other => other,
    }
}

#[async_trait]
impl Feed for KrakenTradeFeed {
    async fn connect(&mut self) -> Result<(), FeedError> {
        info!(url = STREAM_URL, pair = %self.pair, "connecting to Kraken trade WebSocket");

        let (mut stream, _response) = connect_async(STREAM_URL)
            .await
            .map_err(|e| FeedError::Connect(e.to_string()))?;

        let subscribe = json!({
            "event": "subscribe",
            "pair": [self.pair],
            "subscription": { "name": "trade" }
        });
        send_json(&mut stream, &subscribe).await?;
        expect_ack(&mut stream, "trade subscription", classify_control).await?;

        info!(pair = %self.pair, "Kraken trade stream subscribed");
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
                    warn!(pair = %self.pair, ?frame, "Kraken WebSocket closed by server");
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
/// {"event":"systemStatus","status":"online","version":"1.9.0"}
/// {"event":"subscriptionStatus","status":"subscribed","pair":"XBT/USD"}
/// {"event":"subscriptionStatus","status":"error","errorMessage":"..."}
/// ```
fn classify_control(text: &str) -> Control {
    let Ok(root) = serde_json::from_str::<serde_json::Value>(text) else {
        return Control::Other;
    };

    if root["event"].as_str() != Some("subscriptionStatus") {
        return Control::Other;
    }
    match root["status"].as_str() {
        Some("subscribed") => Control::Ack,
        Some("error") => Control::Error(
            root["errorMessage"]
                .as_str()
                .unwrap_or("unspecified error")
                .to_string(),
        ),
        _ => Control::Other,
    }
}

/// Extract `(timestamp_ms, price, volume)` triples from a data frame.
///
/// Expected shape:
/// ```json
/// [42, [["64000.5","0.002","1700000000.123456","b","m",""]], "trade", "XBT/USD"]
/// ```
fn parse_trades(text: &str) -> Vec<(i64, f64, f64)> {
    let Ok(root) = serde_json::from_str::<serde_json::Value>(text) else {
        return Vec::new();
    };
    let Some(items) = root.as_array() else {
        return Vec::new();
    };
    if items.len() < 4 || items[2].as_str() != Some("trade") {
        return Vec::new();
    }
    let Some(trades) = items[1].as_array() else {
        return Vec::new();
    };
    trades.iter().filter_map(parse_trade).collect()
}

fn parse_trade(entry: &serde_json::Value) -> Option<(i64, f64, f64)> {
    let fields = entry.as_array()?;
    let price = fields.first().and_then(json_f64)?;
    let volume = fields.get(1).and_then(json_f64)?;
    // Trade time is decimal seconds, usually string-encoded.
    let secs = fields.get(2).and_then(json_f64)?;
    Some(((secs * 1000.0).round() as i64, price, volume))
}
