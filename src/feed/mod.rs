// =============================================================================
// Market Data Feeds
// =============================================================================
//
// Each venue adapter speaks its own websocket dialect and hands the rest of
// the bot the same thing: a stream of one-minute candles for one symbol.
// Binance delivers ready-made klines; Alpaca and Kraken deliver raw trades
// that the `TickAggregator` folds into running candles. The outer loop
// reconnects forever with a fixed five-second delay.

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{error, warn};

use crate::alerts::Notifier;
use crate::config::BotConfig;
use crate::engine::TradingEngine;
use crate::market_data::{minute_bucket, Candle};
use crate::types::FeedKind;

pub mod alpaca;
pub mod binance;
pub mod kraken;

pub use alpaca::AlpacaTradeFeed;
pub use binance::BinanceKlineFeed;
pub use kraken::KrakenTradeFeed;

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECONNECT_DELAY: std::time::Duration = std::time::Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("stream not connected")]
    NotConnected,
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("stream closed by server")]
    Closed,
    #[error("transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Feed: Send {
    /// Open the websocket and complete any auth/subscribe handshake.
    async fn connect(&mut self) -> Result<(), FeedError>;

    /// Next normalized candle. For tick venues this is the running candle
    /// updated by the latest trade, so the same minute bucket is yielded
    /// repeatedly with fresher values.
    async fn next_candle(&mut self) -> Result<Candle, FeedError>;
}

/// Build the configured feed. Credentialed venues read their keys from the
/// environment here so a bad setup fails at startup, not mid-stream.
pub fn build_feed(config: &BotConfig) -> anyhow::Result<Box<dyn Feed>> {
    use anyhow::Context;

    match config.feed {
        FeedKind::BinanceKlines => Ok(Box::new(BinanceKlineFeed::new(
            &config.base_asset,
            &config.quote_asset,
        ))),
        FeedKind::AlpacaTrades => {
            let key = std::env::var("ALPACA_API_KEY")
                .context("ALPACA_API_KEY is required for the alpaca_trades feed")?;
            let secret = std::env::var("ALPACA_API_SECRET")
                .context("ALPACA_API_SECRET is required for the alpaca_trades feed")?;
            Ok(Box::new(AlpacaTradeFeed::new(
                &config.base_asset,
                &config.quote_asset,
                key,
                secret,
            )))
        }
        FeedKind::KrakenTrades => Ok(Box::new(KrakenTradeFeed::new(
            &config.base_asset,
            &config.quote_asset,
        ))),
    }
}

/// Drive ingestion forever: connect, consume candles into the engine, and on
/// any stream failure wait out the delay and start over. Connection loss is
/// routine here, not an error state.
pub async fn run_feed_loop(
    mut feed: Box<dyn Feed>,
    engine: &mut TradingEngine,
    notifier: Notifier,
) {
    loop {
        match feed.connect().await {
            Ok(()) => {
                notifier.stream_connected();
                loop {
                    match feed.next_candle().await {
                        Ok(candle) => engine.ingest(candle).await,
                        Err(e) => {
                            warn!(error = %e, "price stream interrupted");
                            break;
                        }
                    }
                }
                notifier.stream_disconnected();
            }
            Err(e) => {
                error!(error = %e, "feed connect failed");
            }
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

/// Folds raw trade ticks into running one-minute candles.
#[derive(Debug)]
pub struct TickAggregator {
    symbol: String,
    current: Option<Candle>,
}

impl TickAggregator {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            current: None,
        }
    }

    /// Fold one trade in and return the candle for its minute bucket.
    ///
    /// # Edge cases
    /// - First tick of a new minute opens a fresh candle at the tick price.
    /// - A tick older than the running candle's bucket is ignored; the
    ///   running candle is returned untouched.
    pub fn apply(&mut self, ts_ms: i64, price: f64, quantity: f64) -> Candle {
        let bucket = minute_bucket(ts_ms);

        match self.current.as_mut() {
            Some(candle) if bucket < candle.open_time => {
                warn!(
                    tick_bucket = bucket,
                    current_bucket = candle.open_time,
                    "stale tick ignored"
                );
                candle.clone()
            }
            Some(candle) if bucket == candle.open_time => {
                candle.high = candle.high.max(price);
                candle.low = candle.low.min(price);
                candle.close = price;
                candle.volume += quantity;
                candle.clone()
            }
            _ => {
                let candle = Candle::new(&self.symbol, ts_ms, price, price, price, price, quantity);
                self.current = Some(candle.clone());
                candle
            }
        }
    }
}

/// Handshake-phase classification of a single control frame.
#[derive(Debug, PartialEq)]
pub(crate) enum Control {
    Ack,
    Error(String),
    Other,
}

/// Control frames tolerated before giving up on an acknowledgement.
const HANDSHAKE_FRAME_LIMIT: usize = 5;

/// Wait for a venue acknowledgement, classifying each text frame with the
/// venue's own rules.
pub(crate) async fn expect_ack(
    stream: &mut WsStream,
    phase: &str,
    classify: fn(&str) -> Control,
) -> Result<(), FeedError> {
    for _ in 0..HANDSHAKE_FRAME_LIMIT {
        let text = next_text(stream).await?;
        match classify(&text) {
            Control::Ack => return Ok(()),
            Control::Error(msg) => return Err(FeedError::Handshake(format!("{phase}: {msg}"))),
            Control::Other => {}
        }
    }
    Err(FeedError::Handshake(format!("no acknowledgement for {phase}")))
}

/// Send one JSON payload as a text frame.
pub(crate) async fn send_json(
    stream: &mut WsStream,
    payload: &serde_json::Value,
) -> Result<(), FeedError> {
    use futures_util::SinkExt;
    use tokio_tungstenite::tungstenite::Message;

    stream
        .send(Message::Text(payload.to_string()))
        .await
        .map_err(|e| FeedError::Transport(e.to_string()))
}

/// Read frames until the next text payload. Used by the handshake phases,
/// where anything other than text (or a clean close) is unexpected.
pub(crate) async fn next_text(stream: &mut WsStream) -> Result<String, FeedError> {
    use futures_util::StreamExt;
    use tokio_tungstenite::tungstenite::Message;

    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => return Ok(text),
            Some(Ok(
                Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_),
            )) => {}
            Some(Ok(Message::Close(_))) | None => return Err(FeedError::Closed),
            Some(Err(e)) => return Err(FeedError::Transport(e.to_string())),
        }
    }
}

/// Tolerant f64 extraction: venues mix string and numeric encodings for the
/// same fields.
pub(crate) fn json_f64(v: &serde_json::Value) -> Option<f64> {
    match v {
        serde_json::Value::String(s) => s.parse().ok(),
        serde_json::Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_700_000_000_000;

    #[test]
    fn first_tick_opens_a_candle_on_the_minute() {
        let mut agg = TickAggregator::new("BTCUSDC");
        let c = agg.apply(T0 + 31_000, 100.0, 0.5);

        assert_eq!(c.open_time, minute_bucket(T0 + 31_000));
        assert!((c.open - 100.0).abs() < f64::EPSILON);
        assert!((c.high - 100.0).abs() < f64::EPSILON);
        assert!((c.low - 100.0).abs() < f64::EPSILON);
        assert!((c.close - 100.0).abs() < f64::EPSILON);
        assert!((c.volume - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn same_minute_ticks_update_running_candle() {
        let mut agg = TickAggregator::new("BTCUSDC");
        agg.apply(T0, 100.0, 0.5);
        agg.apply(T0 + 10_000, 103.0, 0.2);
        let c = agg.apply(T0 + 20_000, 99.0, 0.3);

        assert!((c.open - 100.0).abs() < f64::EPSILON);
        assert!((c.high - 103.0).abs() < f64::EPSILON);
        assert!((c.low - 99.0).abs() < f64::EPSILON);
        assert!((c.close - 99.0).abs() < f64::EPSILON);
        assert!((c.volume - 1.0).abs() < 1e-12);
    }

    #[test]
    fn next_minute_rolls_a_fresh_candle() {
        let mut agg = TickAggregator::new("BTCUSDC");
        agg.apply(T0, 100.0, 0.5);
        let c = agg.apply(T0 + 61_000, 104.0, 0.1);

        assert_eq!(c.open_time, minute_bucket(T0 + 61_000));
        assert!((c.open - 104.0).abs() < f64::EPSILON);
        assert!((c.volume - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn stale_tick_leaves_running_candle_untouched() {
        let mut agg = TickAggregator::new("BTCUSDC");
        agg.apply(T0 + 60_000, 100.0, 0.5);
        let c = agg.apply(T0, 90.0, 9.9);

        assert_eq!(c.open_time, minute_bucket(T0 + 60_000));
        assert!((c.low - 100.0).abs() < f64::EPSILON);
        assert!((c.volume - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn json_f64_accepts_both_encodings() {
        assert_eq!(json_f64(&serde_json::json!("42.5")), Some(42.5));
        assert_eq!(json_f64(&serde_json::json!(42.5)), Some(42.5));
        assert_eq!(json_f64(&serde_json::json!(null)), None);
        assert_eq!(json_f64(&serde_json::json!("not a number")), None);
    }

    // Sole test touching the ALPACA_* variables; process-global env, so the
    // missing and present cases run in one body.
    #[test]
    fn alpaca_credentials_are_checked_at_build_time() {
        let mut config = BotConfig::default();
        config.feed = FeedKind::AlpacaTrades;

        std::env::remove_var("ALPACA_API_KEY");
        std::env::remove_var("ALPACA_API_SECRET");
        let err = match build_feed(&config) {
            Err(e) => e.to_string(),
            Ok(_) => String::from("built without credentials"),
        };
        assert!(err.contains("ALPACA_API_KEY"), "unexpected error: {err}");

        std::env::set_var("ALPACA_API_KEY", "k");
        std::env::set_var("ALPACA_API_SECRET", "s");
        let built = build_feed(&config);
        std::env::remove_var("ALPACA_API_KEY");
        std::env::remove_var("ALPACA_API_SECRET");
        assert!(built.is_ok());
    }

    #[test]
    fn uncredentialed_feeds_build_without_env() {
        assert!(build_feed(&BotConfig::default()).is_ok());

        let mut config = BotConfig::default();
        config.feed = FeedKind::KrakenTrades;
        assert!(build_feed(&config).is_ok());
    }
}
