// =============================================================================
// PriceWindow — trailing time-bounded candle store
// =============================================================================
//
// An ordered sequence of candles, ascending by open time, holding at most the
// trailing retention horizon (60 minutes by default) relative to the newest
// observed timestamp. One writer (the ingestion path) and one reader (the
// indicator/decision path) run synchronously in sequence, so no locking.
//
// Ingestion contract, per candle `c`:
//   1. Evict from the front while older than `newest_observed - horizon`
//      (newest observed includes `c` itself).
//   2. Replace the last entry when it shares `c`'s minute bucket, otherwise
//      append. A candle whose bucket precedes the last entry's is dropped —
//      the feed promises non-decreasing timestamps.

use std::collections::VecDeque;

use tracing::warn;

use crate::market_data::candle::{Candle, MINUTE_MS};

pub struct PriceWindow {
    candles: VecDeque<Candle>,
    retention_ms: i64,
}

impl PriceWindow {
    /// Create an empty window retaining `retention_minutes` of candles.
    pub fn new(retention_minutes: i64) -> Self {
        Self {
            candles: VecDeque::with_capacity(retention_minutes as usize + 2),
            retention_ms: retention_minutes * MINUTE_MS,
        }
    }

    /// Ingest one candle: evict expired entries, then merge or append.
    ///
    /// Returns `true` when the candle was stored (appended or replaced the
    /// same-bucket tail), `false` when it was dropped as out of order.
    pub fn apply(&mut self, candle: Candle) -> bool {
        let newest = match self.candles.back() {
            Some(last) => last.open_time.max(candle.open_time),
            None => candle.open_time,
        };
        let cutoff = newest - self.retention_ms;

        while let Some(front) = self.candles.front() {
            if front.open_time < cutoff {
                self.candles.pop_front();
            } else {
                break;
            }
        }

        match self.candles.back_mut() {
            Some(last) if last.bucket() == candle.bucket() => {
                *last = candle;
                true
            }
            Some(last) if candle.bucket() < last.bucket() => {
                warn!(
                    symbol = %candle.symbol,
                    bucket = candle.bucket(),
                    last_bucket = last.bucket(),
                    "out-of-order candle dropped"
                );
                false
            }
            _ => {
                self.candles.push_back(candle);
                true
            }
        }
    }

    /// Attach the freshly computed band lines to the latest entry.
    pub fn set_latest_bands(&mut self, buy_line: f64, sell_line: f64) {
        if let Some(last) = self.candles.back_mut() {
            last.buy_line = Some(buy_line);
            last.sell_line = Some(sell_line);
        }
    }

    /// All close prices, oldest first.
    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn latest(&self) -> Option<&Candle> {
        self.candles.back()
    }

    pub fn oldest(&self) -> Option<&Candle> {
        self.candles.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candle> {
        self.candles.iter()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn sample_candle(minute: i64, close: f64) -> Candle {
        Candle::new(
            "BTCUSDC",
            minute * MINUTE_MS,
            close,
            close + 1.0,
            close - 1.0,
            close,
            100.0,
        )
    }

    #[test]
    fn consecutive_minutes_fill_the_horizon() {
        let mut w = PriceWindow::new(60);
        for m in 0..=70 {
            assert!(w.apply(sample_candle(m, 100.0)));
        }
        // Cutoff at minute 70 is minute 10, inclusive.
        assert_eq!(w.len(), 61);
        assert_eq!(w.oldest().unwrap().open_time, 10 * MINUTE_MS);
        assert_eq!(w.latest().unwrap().open_time, 70 * MINUTE_MS);
    }

    #[test]
    fn gap_evicts_everything_stale() {
        let mut w = PriceWindow::new(60);
        for m in 0..6 {
            w.apply(sample_candle(m, 100.0));
        }
        // Jump far ahead: every earlier entry is now past the horizon.
        w.apply(sample_candle(90, 105.0));
        assert_eq!(w.len(), 1);
        assert_eq!(w.latest().unwrap().open_time, 90 * MINUTE_MS);
    }

    #[test]
    fn every_entry_stays_within_horizon_of_latest() {
        // Mixed sequence with repeats and gaps; after each ingest the window
        // must hold only entries within 60 minutes of the incoming candle and
        // never two entries in one bucket.
        let minutes = [0, 1, 1, 2, 5, 5, 30, 61, 62, 62, 130, 131];
        let mut w = PriceWindow::new(60);
        for &m in &minutes {
            w.apply(sample_candle(m, 100.0 + m as f64));
            let latest = w.latest().unwrap().open_time;
            let mut seen = HashSet::new();
            for c in w.iter() {
                assert!(latest - c.open_time <= 60 * MINUTE_MS);
                assert!(seen.insert(c.bucket()), "duplicate bucket {}", c.bucket());
            }
        }
    }

    #[test]
    fn same_bucket_replaces_last_entry() {
        let mut w = PriceWindow::new(60);
        w.apply(sample_candle(0, 100.0));
        w.apply(sample_candle(1, 101.0));
        assert_eq!(w.len(), 2);

        // Second update for minute 1 replaces, length unchanged.
        assert!(w.apply(sample_candle(1, 102.5)));
        assert_eq!(w.len(), 2);
        assert!((w.latest().unwrap().close - 102.5).abs() < f64::EPSILON);
    }

    #[test]
    fn unaligned_timestamps_share_a_bucket() {
        let mut w = PriceWindow::new(60);
        let mut a = sample_candle(0, 100.0);
        a.open_time = 12_000; // mid-minute tick
        let mut b = sample_candle(0, 101.0);
        b.open_time = 48_000;
        w.apply(a);
        w.apply(b);
        assert_eq!(w.len(), 1);
        assert!((w.latest().unwrap().close - 101.0).abs() < f64::EPSILON);
    }

    #[test]
    fn out_of_order_candle_is_dropped() {
        let mut w = PriceWindow::new(60);
        w.apply(sample_candle(2, 100.0));
        assert!(!w.apply(sample_candle(1, 99.0)));
        assert_eq!(w.len(), 1);
        assert_eq!(w.latest().unwrap().open_time, 2 * MINUTE_MS);
    }

    #[test]
    fn bands_attach_to_latest_only() {
        let mut w = PriceWindow::new(60);
        w.apply(sample_candle(0, 100.0));
        w.apply(sample_candle(1, 101.0));
        w.set_latest_bands(95.0, 105.0);

        assert_eq!(w.latest().unwrap().buy_line, Some(95.0));
        assert_eq!(w.latest().unwrap().sell_line, Some(105.0));
        assert!(w.oldest().unwrap().buy_line.is_none());
    }

    #[test]
    fn empty_window_is_harmless() {
        let mut w = PriceWindow::new(60);
        assert!(w.is_empty());
        assert!(w.latest().is_none());
        w.set_latest_bands(1.0, 2.0); // no-op
        assert!(w.closes().is_empty());
    }
}
