// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free functions over the window's close prices (ascending
// by time). The period-gated indicators return `Option<f64>` so callers are
// forced to handle short windows; the Bollinger statistics are always defined
// once the window holds at least one close.

pub mod directional;
pub mod macd;
pub mod rsi;

/// Wilder look-back for the RSI.
pub const RSI_PERIOD: usize = 14;

/// Minimum closes before the MACD histogram is reported.
pub const MACD_MIN_CLOSES: usize = 14;

/// Everything derived from the current window in one pass.
#[derive(Debug, Clone)]
pub struct IndicatorSnapshot {
    pub mean: f64,
    pub std_dev: f64,
    pub buy_line: f64,
    pub sell_line: f64,
    pub rsi: Option<f64>,
    pub di_plus: Option<f64>,
    pub di_minus: Option<f64>,
    pub macd: Option<f64>,
}

/// Sample mean of `values`; 0.0 for an empty slice.
pub fn sample_mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Bessel-corrected sample standard deviation (divide by N−1).
///
/// Fewer than two values carry no spread information; 0.0 keeps the band
/// lines pinned to the mean so no entry can trigger off a single close.
pub fn sample_std(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>()
        / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Recompute the full snapshot from the window closes.
///
/// `buy_width` and `sell_width` are the configured Bollinger multipliers:
/// `buy_line = mean − std × buy_width`, `sell_line = mean + std × sell_width`.
pub fn compute_snapshot(closes: &[f64], buy_width: f64, sell_width: f64) -> IndicatorSnapshot {
    let mean = sample_mean(closes);
    let std_dev = sample_std(closes, mean);
    let di = directional::directional_indexes(closes);

    IndicatorSnapshot {
        mean,
        std_dev,
        buy_line: mean - std_dev * buy_width,
        sell_line: mean + std_dev * sell_width,
        rsi: rsi::latest_rsi(closes, RSI_PERIOD),
        di_plus: di.map(|(plus, _)| plus),
        di_minus: di.map(|(_, minus)| minus),
        macd: macd::latest_macd(closes, MACD_MIN_CLOSES),
    }
}
