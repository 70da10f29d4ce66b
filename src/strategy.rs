// =============================================================================
// Strategy — mean-reversion entry/exit rules
// =============================================================================
//
// The decision step is a pure function of the phase, the latest close, and
// the indicator snapshot computed from the window that already contains that
// close. The state machine in engine.rs applies the resulting action; nothing
// here touches state or I/O.
//
// Rules:
//   FLAT        -> enter when close < buy_line
//   IN_POSITION -> exit at target when close > sell_line, else stop out when
//                  close < loss_threshold * buy_price
//
// Exits are checked target-first and at most one action is produced per
// candle, so a close that satisfies both exit rules sells exactly once, as a
// target.

use crate::indicators::IndicatorSnapshot;
use crate::types::{ExitReason, Phase};

/// What the state machine should do with the latest candle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Hold,
    Enter,
    Exit(ExitReason),
}

/// Evaluate the entry/exit rules for one ingested candle.
///
/// `buy_price` is only meaningful while `phase == Phase::InPosition`.
pub fn decide(
    phase: Phase,
    close: f64,
    snapshot: &IndicatorSnapshot,
    buy_price: f64,
    loss_threshold: f64,
) -> Action {
    match phase {
        Phase::Flat => {
            if close < snapshot.buy_line {
                Action::Enter
            } else {
                Action::Hold
            }
        }
        Phase::InPosition => {
            if close > snapshot.sell_line {
                Action::Exit(ExitReason::Target)
            } else if close < loss_threshold * buy_price {
                Action::Exit(ExitReason::StopLoss)
            } else {
                Action::Hold
            }
        }
    }
}
