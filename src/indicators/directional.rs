// =============================================================================
// Directional Indexes (DI+ / DI−) — close-to-close variant
// =============================================================================
//
// The feed only guarantees close prices once candles are bucket-merged, so
// directional movement is measured from consecutive close differences rather
// than true highs and lows:
//
//   diff_i = close_{i+1} - close_i
//   +DM    = max(diff_i, 0)        (net upward movement)
//   −DM    = max(−diff_i, 0)       (net downward movement)
//   TR     = |diff_i|
//   DI±    = 100 × Σ DM± / Σ TR
//
// A perfectly flat series (Σ TR == 0) reports (0, 0) — defined, not missing.

/// DI+ and DI− over the close series, or `None` below 3 closes.
pub fn directional_indexes(closes: &[f64]) -> Option<(f64, f64)> {
    if closes.len() < 3 {
        return None;
    }

    let mut dm_plus = 0.0_f64;
    let mut dm_minus = 0.0_f64;
    let mut tr_sum = 0.0_f64;

    for w in closes.windows(2) {
        let diff = w[1] - w[0];
        dm_plus += diff.max(0.0);
        dm_minus += (-diff).max(0.0);
        tr_sum += diff.abs();
    }

    if tr_sum == 0.0 {
        return Some((0.0, 0.0));
    }

    let di_plus = 100.0 * dm_plus / tr_sum;
    let di_minus = 100.0 * dm_minus / tr_sum;

    if di_plus.is_finite() && di_minus.is_finite() {
        Some((di_plus, di_minus))
    } else {
        None
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn di_needs_three_closes() {
        assert!(directional_indexes(&[]).is_none());
        assert!(directional_indexes(&[1.0]).is_none());
        assert!(directional_indexes(&[1.0, 2.0]).is_none());
        assert!(directional_indexes(&[1.0, 2.0, 3.0]).is_some());
    }

    #[test]
    fn di_flat_series_is_zero_zero() {
        let (plus, minus) = directional_indexes(&[100.0; 10]).unwrap();
        assert!((plus - 0.0).abs() < f64::EPSILON);
        assert!((minus - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn di_all_up_moves() {
        let closes = [1.0, 2.0, 3.0, 4.0];
        let (plus, minus) = directional_indexes(&closes).unwrap();
        assert!((plus - 100.0).abs() < 1e-10);
        assert!(minus.abs() < 1e-10);
    }

    #[test]
    fn di_all_down_moves() {
        let closes = [4.0, 3.0, 2.0, 1.0];
        let (plus, minus) = directional_indexes(&closes).unwrap();
        assert!(plus.abs() < 1e-10);
        assert!((minus - 100.0).abs() < 1e-10);
    }

    #[test]
    fn di_hand_computed_mixed() {
        // diffs [2, -1, 4]: +DM = 6, −DM = 1, TR = 7.
        let closes = [10.0, 12.0, 11.0, 15.0];
        let (plus, minus) = directional_indexes(&closes).unwrap();
        assert!((plus - 600.0 / 7.0).abs() < 1e-10);
        assert!((minus - 100.0 / 7.0).abs() < 1e-10);
    }

    #[test]
    fn di_components_sum_to_100_when_moving() {
        // |diff| = max(diff,0) + max(-diff,0), so DI+ + DI− == 100 whenever
        // there is any movement at all.
        let closes = [
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84,
        ];
        let (plus, minus) = directional_indexes(&closes).unwrap();
        assert!((plus + minus - 100.0).abs() < 1e-9);
    }
}
