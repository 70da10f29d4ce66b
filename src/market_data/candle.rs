// =============================================================================
// Candle — canonical OHLCV record for one minute bucket
// =============================================================================
//
// Every feed variant (kline bars, raw trade ticks) normalizes into this shape
// before touching the window. `open_time` is epoch milliseconds aligned to the
// start of the minute; `buy_line`/`sell_line` are attached by the window once
// the indicator snapshot for that candle is known.

use serde::{Deserialize, Serialize};

/// Milliseconds in one minute bucket.
pub const MINUTE_MS: i64 = 60_000;

/// A single OHLCV candle for one symbol and one minute bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    /// Epoch milliseconds, aligned to the start of the minute.
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Entry threshold computed from the window containing this candle.
    pub buy_line: Option<f64>,
    /// Exit threshold computed from the window containing this candle.
    pub sell_line: Option<f64>,
}

impl Candle {
    /// Build a candle with band lines unset. `open_time` is snapped to its
    /// minute bucket.
    pub fn new(
        symbol: impl Into<String>,
        open_time: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            open_time: minute_bucket(open_time),
            open,
            high,
            low,
            close,
            volume,
            buy_line: None,
            sell_line: None,
        }
    }

    /// The minute bucket this candle belongs to.
    pub fn bucket(&self) -> i64 {
        minute_bucket(self.open_time)
    }
}

/// Snap an epoch-millisecond timestamp to the start of its minute.
pub fn minute_bucket(ts_ms: i64) -> i64 {
    ts_ms - ts_ms.rem_euclid(MINUTE_MS)
}
