// =============================================================================
// MACD Histogram — latest value only
// =============================================================================
//
// Standard 12/26/9 construction:
//   macd line  = EMA(closes, 12) - EMA(closes, 26)
//   signal     = EMA(macd line, 9)
//   histogram  = macd line - signal
//
// The EMAs are recursive with alpha = 2/(span+1), seeded at the first element
// of their input series. The macd line only becomes meaningful once the slow
// EMA has a full period behind it (index 25), and the signal needs another
// eight values on top of that, so the first reported histogram requires 34
// closes. Anything earlier is undefined, the same region where a
// dataframe-based reference produces NaN.

const FAST_SPAN: usize = 12;
const SLOW_SPAN: usize = 26;
const SIGNAL_SPAN: usize = 9;

/// Most recent MACD histogram value.
///
/// # Edge cases
/// - `closes.len() < min_closes` => `None` (caller-configured floor)
/// - `closes.len() < 34` => `None` (slow EMA + signal warm-up)
/// - non-finite result => `None`
pub fn latest_macd(closes: &[f64], min_closes: usize) -> Option<f64> {
    if closes.len() < min_closes {
        return None;
    }
    if closes.len() < SLOW_SPAN + SIGNAL_SPAN - 1 {
        return None;
    }

    let fast = ewm(closes, FAST_SPAN);
    let slow = ewm(closes, SLOW_SPAN);

    // The macd line, from the first index where the slow EMA is warm.
    let macd_line: Vec<f64> = (SLOW_SPAN - 1..closes.len())
        .map(|i| fast[i] - slow[i])
        .collect();

    let signal = ewm(&macd_line, SIGNAL_SPAN);

    let histogram = macd_line.last()? - signal.last()?;
    histogram.is_finite().then_some(histogram)
}

/// Recursive exponential moving average over the whole series, seeded at the
/// first element: `ema_0 = x_0`, `ema_t = alpha*x_t + (1-alpha)*ema_{t-1}`.
fn ewm(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());

    let mut prev = match values.first() {
        Some(&v) => v,
        None => return out,
    };
    out.push(prev);

    for &v in &values[1..] {
        prev = alpha * v + (1.0 - alpha) * prev;
        out.push(prev);
    }
    out
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    /// Independent reference: the closed-form weighted sum for the same EMA,
    /// `ema_t = (1-a)^t x_0 + a * sum_{i=1..t} (1-a)^{t-i} x_i`.
    fn ewm_closed_form(values: &[f64], span: usize) -> Vec<f64> {
        let alpha = 2.0 / (span as f64 + 1.0);
        (0..values.len())
            .map(|t| {
                let mut acc = (1.0 - alpha).powi(t as i32) * values[0];
                for i in 1..=t {
                    acc += alpha * (1.0 - alpha).powi((t - i) as i32) * values[i];
                }
                acc
            })
            .collect()
    }

    fn reference_histogram(closes: &[f64]) -> f64 {
        let fast = ewm_closed_form(closes, FAST_SPAN);
        let slow = ewm_closed_form(closes, SLOW_SPAN);
        let macd_line: Vec<f64> = (SLOW_SPAN - 1..closes.len())
            .map(|i| fast[i] - slow[i])
            .collect();
        let signal = ewm_closed_form(&macd_line, SIGNAL_SPAN);
        macd_line.last().unwrap() - signal.last().unwrap()
    }

    #[test]
    fn macd_respects_min_closes_floor() {
        let closes: Vec<f64> = (1..=40).map(|x| x as f64).collect();
        assert!(latest_macd(&closes[..10], 14).is_none());
        assert!(latest_macd(&closes, 50).is_none());
    }

    #[test]
    fn macd_needs_full_warmup() {
        let closes: Vec<f64> = (1..=33).map(|x| x as f64).collect();
        assert!(latest_macd(&closes, 14).is_none());

        let closes: Vec<f64> = (1..=34).map(|x| x as f64).collect();
        assert!(latest_macd(&closes, 14).is_some());
    }

    #[test]
    fn macd_flat_series_is_zero() {
        let closes = vec![100.0; 40];
        let v = latest_macd(&closes, 14).unwrap();
        assert!(v.abs() < 1e-12, "expected 0.0, got {v}");
    }

    #[test]
    fn macd_sign_follows_the_trend() {
        let rising: Vec<f64> = (1..=40).map(|x| 100.0 + x as f64).collect();
        assert!(latest_macd(&rising, 14).unwrap() > 0.0);

        let falling: Vec<f64> = (1..=40).map(|x| 200.0 - x as f64).collect();
        assert!(latest_macd(&falling, 14).unwrap() < 0.0);
    }

    #[test]
    fn macd_matches_reference_within_tolerance() {
        // A wavy but deterministic series exercises both EMA formulations.
        let closes: Vec<f64> = (0..45)
            .map(|i| 100.0 + 5.0 * (i as f64 * 0.7).sin())
            .collect();

        let got = latest_macd(&closes, 14).unwrap();
        let expected = reference_histogram(&closes);
        assert!(
            (got - expected).abs() < 1e-6,
            "got {got}, reference {expected}"
        );
    }
}
