// =============================================================================
// Bot Configuration — strategy parameters and wiring
// =============================================================================
//
// Loaded once at startup from `riptide.json`. Every field carries a serde
// default so a partial (or absent) file still produces a runnable paper-mode
// setup; an absent file is a warning, a value that cannot trade safely is a
// fatal validation error. Secrets never live here, they come from the
// environment.

use std::path::Path;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::{FeedKind, GatewayMode};

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_base_asset() -> String {
    "BTC".to_string()
}

fn default_quote_asset() -> String {
    "USDC".to_string()
}

fn default_notional() -> f64 {
    10.0
}

fn default_bollinger_width() -> f64 {
    2.0
}

fn default_sell_width() -> f64 {
    2.0
}

fn default_loss_threshold() -> f64 {
    0.95
}

fn default_retention_minutes() -> i64 {
    60
}

fn default_primer_limit() -> u32 {
    60
}

fn default_trade_log_path() -> String {
    "riptide_trades.db".to_string()
}

// =============================================================================
// BotConfig
// =============================================================================

/// Top-level configuration for one bot instance trading one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    // --- Instrument ---------------------------------------------------------
    /// Asset being accumulated and flattened, e.g. "BTC".
    #[serde(default = "default_base_asset")]
    pub base_asset: String,

    /// Asset the notional is denominated in, e.g. "USDC".
    #[serde(default = "default_quote_asset")]
    pub quote_asset: String,

    // --- Strategy -----------------------------------------------------------
    /// Quote-currency amount committed per entry.
    #[serde(default = "default_notional")]
    pub notional: f64,

    /// Standard-deviation multiplier for the buy line (mean - width * std).
    #[serde(default = "default_bollinger_width")]
    pub bollinger_width: f64,

    /// Standard-deviation multiplier for the sell line (mean + width * std).
    #[serde(default = "default_sell_width")]
    pub sell_width: f64,

    /// Stop-loss trigger as a fraction of the entry price. 0.95 exits once
    /// the close drops more than 5% below the buy.
    #[serde(default = "default_loss_threshold")]
    pub loss_threshold: f64,

    /// Rolling window horizon in minutes.
    #[serde(default = "default_retention_minutes")]
    pub retention_minutes: i64,

    /// Historical candles fetched once at startup to warm the window.
    #[serde(default = "default_primer_limit")]
    pub primer_limit: u32,

    // --- Wiring -------------------------------------------------------------
    /// Which market-data stream to consume.
    #[serde(default)]
    pub feed: FeedKind,

    /// Paper (default) or live order execution.
    #[serde(default)]
    pub gateway: GatewayMode,

    /// SQLite file receiving one record per ingested candle.
    #[serde(default = "default_trade_log_path")]
    pub trade_log_path: String,

    /// Optional alert webhook; `RIPTIDE_WEBHOOK_URL` overrides it.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            base_asset: default_base_asset(),
            quote_asset: default_quote_asset(),
            notional: default_notional(),
            bollinger_width: default_bollinger_width(),
            sell_width: default_sell_width(),
            loss_threshold: default_loss_threshold(),
            retention_minutes: default_retention_minutes(),
            primer_limit: default_primer_limit(),
            feed: FeedKind::default(),
            gateway: GatewayMode::default(),
            trade_log_path: default_trade_log_path(),
            webhook_url: None,
        }
    }
}

impl BotConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read bot config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse bot config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbol = %config.symbol(),
            feed = %config.feed,
            gateway = %config.gateway,
            "bot config loaded"
        );

        Ok(config)
    }

    /// The exchange symbol traded, e.g. "BTCUSDC".
    pub fn symbol(&self) -> String {
        format!("{}{}", self.base_asset, self.quote_asset).to_uppercase()
    }

    /// Reject configurations that cannot trade safely. Called once at
    /// startup; failures are fatal.
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.base_asset.is_empty(), "base_asset must not be empty");
        ensure!(!self.quote_asset.is_empty(), "quote_asset must not be empty");
        ensure!(
            self.notional > 0.0,
            "notional must be positive, got {}",
            self.notional
        );
        ensure!(
            self.bollinger_width > 0.0,
            "bollinger_width must be positive, got {}",
            self.bollinger_width
        );
        ensure!(
            self.sell_width > 0.0,
            "sell_width must be positive, got {}",
            self.sell_width
        );
        ensure!(
            self.loss_threshold > 0.0 && self.loss_threshold < 1.0,
            "loss_threshold must be inside (0, 1), got {}",
            self.loss_threshold
        );
        ensure!(
            self.retention_minutes > 0,
            "retention_minutes must be positive, got {}",
            self.retention_minutes
        );
        Ok(())
    }
}
