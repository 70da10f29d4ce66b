// =============================================================================
// Trading Engine — window updates, decisions, execution, bookkeeping
// =============================================================================
//
// One `ingest` call per feed candle does everything in order: update the
// rolling window, recompute indicators, decide, execute through the gateway,
// and append exactly one record to the trade log. Position state changes only
// on a confirmed fill; a failed order keeps the current phase and raises an
// alert. Primed (historical) candles take the same path minus the decision.

use chrono::DateTime;
use tracing::{info, warn};

use crate::alerts::Notifier;
use crate::config::BotConfig;
use crate::gateway::OrderGateway;
use crate::indicators::{compute_snapshot, IndicatorSnapshot};
use crate::market_data::{Candle, PriceWindow};
use crate::persistence::{TradeLog, TradeRecord};
use crate::strategy::{decide, Action};
use crate::types::{ExitReason, Phase};

/// Current position, mutated only on confirmed fills.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionState {
    pub phase: Phase,
    /// Entry fill price; 0.0 while flat.
    pub buy_price: f64,
}

pub struct TradingEngine {
    symbol: String,
    notional: f64,
    buy_width: f64,
    sell_width: f64,
    loss_threshold: f64,
    window: PriceWindow,
    position: PositionState,
    gateway: Box<dyn OrderGateway>,
    log: TradeLog,
    notifier: Notifier,
}

impl TradingEngine {
    pub fn new(
        config: &BotConfig,
        gateway: Box<dyn OrderGateway>,
        log: TradeLog,
        notifier: Notifier,
    ) -> Self {
        Self {
            symbol: config.symbol(),
            notional: config.notional,
            buy_width: config.bollinger_width,
            sell_width: config.sell_width,
            loss_threshold: config.loss_threshold,
            window: PriceWindow::new(config.retention_minutes),
            position: PositionState::default(),
            gateway,
            log,
            notifier,
        }
    }

    pub fn position(&self) -> PositionState {
        self.position
    }

    pub fn trade_log(&self) -> &TradeLog {
        &self.log
    }

    /// Replay one historical candle: window and log updates, no trading.
    pub async fn prime(&mut self, candle: Candle) {
        let Some(snapshot) = self.apply_candle(&candle) else {
            return;
        };
        let record = self.build_record(&candle, &snapshot, false, false, 0.0);
        self.persist(record).await;
    }

    /// Ingest one live candle end to end. Out-of-order candles are dropped
    /// by the window and produce no decision and no record.
    pub async fn ingest(&mut self, candle: Candle) {
        let Some(snapshot) = self.apply_candle(&candle) else {
            return;
        };

        info!(
            symbol = %self.symbol,
            close = candle.close,
            buy_line = snapshot.buy_line,
            sell_line = snapshot.sell_line,
            phase = %self.position.phase,
            window = self.window.len(),
            "status"
        );

        let action = decide(
            self.position.phase,
            candle.close,
            &snapshot,
            self.position.buy_price,
            self.loss_threshold,
        );

        let (buy, sell, quantity) = match action {
            Action::Hold => (false, false, 0.0),
            Action::Enter => (true, false, self.execute_buy(candle.close).await),
            Action::Exit(reason) => (false, true, self.execute_sell(candle.close, reason).await),
        };

        let record = self.build_record(&candle, &snapshot, buy, sell, quantity);
        self.persist(record).await;
    }

    /// Update the window and recompute indicators. `None` means the candle
    /// was rejected (out of order) and nothing downstream should run.
    fn apply_candle(&mut self, candle: &Candle) -> Option<IndicatorSnapshot> {
        if !self.window.apply(candle.clone()) {
            return None;
        }

        let closes = self.window.closes();
        let snapshot = compute_snapshot(&closes, self.buy_width, self.sell_width);
        self.window
            .set_latest_bands(snapshot.buy_line, snapshot.sell_line);
        Some(snapshot)
    }

    /// Returns the confirmed fill quantity, 0.0 when the order failed.
    async fn execute_buy(&mut self, trigger_close: f64) -> f64 {
        match self.gateway.buy(&self.symbol, self.notional).await {
            Ok(fill) => {
                let entry_price = if fill.price > 0.0 {
                    fill.price
                } else {
                    trigger_close
                };
                self.position.phase = Phase::InPosition;
                self.position.buy_price = entry_price;
                self.notifier
                    .buy_filled(&self.symbol, fill.quantity, entry_price);
                fill.quantity
            }
            Err(e) => {
                warn!(symbol = %self.symbol, error = %e, "buy failed, staying flat");
                self.notifier.buy_failed(&self.symbol, &e.to_string());
                0.0
            }
        }
    }

    /// Returns the confirmed fill quantity, 0.0 when the order failed.
    async fn execute_sell(&mut self, trigger_close: f64, reason: ExitReason) -> f64 {
        match self.gateway.sell(&self.symbol).await {
            Ok(fill) => {
                let exit_price = if fill.price > 0.0 {
                    fill.price
                } else {
                    trigger_close
                };
                self.position.phase = Phase::Flat;
                self.position.buy_price = 0.0;
                self.notifier
                    .sell_filled(&self.symbol, fill.quantity, exit_price, reason);
                fill.quantity
            }
            Err(e) => {
                warn!(symbol = %self.symbol, error = %e, "sell failed, holding position");
                self.notifier.sell_failed(&self.symbol, &e.to_string());
                0.0
            }
        }
    }

    fn build_record(
        &self,
        candle: &Candle,
        snapshot: &IndicatorSnapshot,
        buy: bool,
        sell: bool,
        quantity: f64,
    ) -> TradeRecord {
        TradeRecord {
            timestamp: DateTime::from_timestamp_millis(candle.open_time).unwrap_or_default(),
            symbol: self.symbol.clone(),
            buy,
            sell,
            position: self.position.phase,
            quantity,
            price: candle.close,
            volume: candle.volume,
            mean: snapshot.mean,
            std_dev: snapshot.std_dev,
            buy_line: snapshot.buy_line,
            sell_line: snapshot.sell_line,
            rsi: snapshot.rsi,
            di_plus: snapshot.di_plus,
            di_minus: snapshot.di_minus,
            macd: snapshot.macd,
        }
    }

    /// Append failure loses one observation row; trading goes on.
    async fn persist(&self, record: TradeRecord) {
        if let Err(e) = self.log.append(&record).await {
            warn!(symbol = %self.symbol, error = %e, "trade log append failed");
        }
    }
}
