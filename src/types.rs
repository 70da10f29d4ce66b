// =============================================================================
// Shared types used across the Riptide trading bot
// =============================================================================

use serde::{Deserialize, Serialize};

/// The two trading states: no open position vs. one open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Flat,
    InPosition,
}

impl Default for Phase {
    fn default() -> Self {
        Self::Flat
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Flat => write!(f, "FLAT"),
            Self::InPosition => write!(f, "IN_POSITION"),
        }
    }
}

/// Why an open position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Close rose above the sell line.
    Target,
    /// Close fell below the loss threshold of the entry price.
    StopLoss,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Target => write!(f, "target reached"),
            Self::StopLoss => write!(f, "stop loss"),
        }
    }
}

/// Which market-data stream the bot listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    /// Binance.US pre-aggregated 1m kline bars.
    BinanceKlines,
    /// Alpaca raw crypto trade ticks (authenticated).
    AlpacaTrades,
    /// Kraken raw trade ticks.
    KrakenTrades,
}

impl Default for FeedKind {
    fn default() -> Self {
        Self::BinanceKlines
    }
}

impl std::fmt::Display for FeedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BinanceKlines => write!(f, "binance_klines"),
            Self::AlpacaTrades => write!(f, "alpaca_trades"),
            Self::KrakenTrades => write!(f, "kraken_trades"),
        }
    }
}

/// Whether orders hit the real exchange or are simulated locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayMode {
    Paper,
    Live,
}

impl Default for GatewayMode {
    fn default() -> Self {
        Self::Paper
    }
}

impl std::fmt::Display for GatewayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Paper => write!(f, "Paper"),
            Self::Live => write!(f, "Live"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_defaults_to_flat() {
        assert_eq!(Phase::default(), Phase::Flat);
        assert_eq!(Phase::Flat.to_string(), "FLAT");
        assert_eq!(Phase::InPosition.to_string(), "IN_POSITION");
    }

    #[test]
    fn feed_kind_serde_round_trip() {
        let json = serde_json::to_string(&FeedKind::AlpacaTrades).unwrap();
        assert_eq!(json, "\"alpaca_trades\"");
        let back: FeedKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, FeedKind::AlpacaTrades);
    }

    #[test]
    fn gateway_mode_defaults_to_paper() {
        assert_eq!(GatewayMode::default(), GatewayMode::Paper);
        let m: GatewayMode = serde_json::from_str("\"live\"").unwrap();
        assert_eq!(m, GatewayMode::Live);
    }
}
