// =============================================================================
// Alerting — human-readable trade and stream notifications
// =============================================================================
//
// Every event is logged. When a webhook URL is configured, the same message
// is POSTed as {"text": ...} from a detached task: delivery is best-effort
// and never blocks or fails the trading path.

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{info, warn};

use crate::types::ExitReason;

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

#[derive(Clone)]
pub struct Notifier {
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl Notifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .expect("reqwest client construction is infallible with static options");

        if webhook_url.is_some() {
            info!("webhook alerting enabled");
        }

        Self {
            webhook_url,
            client,
        }
    }

    pub fn stream_connected(&self) {
        self.dispatch(stream_connected_message(Utc::now()));
    }

    pub fn stream_disconnected(&self) {
        self.dispatch("Live price stream has been disconnected.".to_string());
    }

    pub fn buy_filled(&self, symbol: &str, quantity: f64, price: f64) {
        self.dispatch(buy_filled_message(symbol, quantity, price, Utc::now()));
    }

    pub fn buy_failed(&self, symbol: &str, reason: &str) {
        self.dispatch(format!("FAILED BUY {symbol}. {reason}"));
    }

    pub fn sell_filled(&self, symbol: &str, quantity: f64, price: f64, reason: ExitReason) {
        self.dispatch(sell_filled_message(symbol, quantity, price, reason, Utc::now()));
    }

    pub fn sell_failed(&self, symbol: &str, reason: &str) {
        self.dispatch(format!("FAILED SELL {symbol}. {reason}"));
    }

    fn dispatch(&self, message: String) {
        info!(%message, "alert");

        let Some(url) = self.webhook_url.clone() else {
            return;
        };
        let client = self.client.clone();
        tokio::spawn(async move {
            let payload = json!({ "text": message });
            if let Err(e) = client.post(&url).json(&payload).send().await {
                warn!(error = %e, "webhook delivery failed");
            }
        });
    }
}

fn stream_connected_message(at: DateTime<Utc>) -> String {
    format!("Live price stream connected at {}", at.format(TS_FORMAT))
}

fn buy_filled_message(symbol: &str, quantity: f64, price: f64, at: DateTime<Utc>) -> String {
    format!("BUY {quantity} {symbol} @ {price} | {}", at.format(TS_FORMAT))
}

fn sell_filled_message(
    symbol: &str,
    quantity: f64,
    price: f64,
    reason: ExitReason,
    at: DateTime<Utc>,
) -> String {
    format!(
        "SELL {quantity} {symbol} @ {price} ({reason}) | {}",
        at.format(TS_FORMAT)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_time() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
    }

    #[test]
    fn buy_message_format() {
        let msg = buy_filled_message("BTCUSDC", 0.00025, 40123.5, fixed_time());
        assert_eq!(msg, "BUY 0.00025 BTCUSDC @ 40123.5 | 2023-11-14 22:13:20 UTC");
    }

    #[test]
    fn sell_message_names_the_exit_reason() {
        let msg = sell_filled_message("BTCUSDC", 0.00025, 41000.0, ExitReason::Target, fixed_time());
        assert_eq!(
            msg,
            "SELL 0.00025 BTCUSDC @ 41000 (target reached) | 2023-11-14 22:13:20 UTC"
        );

        let msg = sell_filled_message("BTCUSDC", 0.00025, 38000.0, ExitReason::StopLoss, fixed_time());
        assert!(msg.contains("(stop loss)"));
    }

    #[test]
    fn connected_message_carries_a_timestamp() {
        let msg = stream_connected_message(fixed_time());
        assert_eq!(msg, "Live price stream connected at 2023-11-14 22:13:20 UTC");
    }
}
