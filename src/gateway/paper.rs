// =============================================================================
// Paper Gateway — simulated fills at live ticker prices
// =============================================================================
//
// The default execution mode. No order ever reaches an exchange: buys are
// sized from the public Binance.US ticker and tracked locally, sells flatten
// the tracked position. Prices are real, quantities are pretend.

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::info;
use uuid::Uuid;

use super::{fetch_ticker_price, round_qty, GatewayError, OrderFill, OrderGateway};

const BASE_URL: &str = "https://api.binance.us";

#[derive(Debug)]
pub struct PaperGateway {
    base_url: String,
    client: reqwest::Client,
    /// Simulated base-asset quantity currently held.
    held: RwLock<f64>,
}

impl PaperGateway {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("reqwest client construction is infallible with static options");

        Self {
            base_url: BASE_URL.to_string(),
            client,
            held: RwLock::new(0.0),
        }
    }
}

impl Default for PaperGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderGateway for PaperGateway {
    async fn buy(&self, symbol: &str, notional: f64) -> Result<OrderFill, GatewayError> {
        let price = fetch_ticker_price(&self.client, &self.base_url, symbol).await?;
        let quantity = round_qty(notional / price);
        if quantity <= 0.0 {
            return Err(GatewayError::Rejected(format!(
                "notional {notional} too small at price {price}"
            )));
        }

        *self.held.write() += quantity;

        let sim_order_id = Uuid::new_v4();
        info!(symbol, quantity, price, %sim_order_id, "paper buy filled");
        Ok(OrderFill { price, quantity })
    }

    async fn sell(&self, symbol: &str) -> Result<OrderFill, GatewayError> {
        let quantity = *self.held.read();
        if quantity <= 0.0 {
            return Err(GatewayError::NoPosition {
                symbol: symbol.to_string(),
            });
        }

        let price = fetch_ticker_price(&self.client, &self.base_url, symbol).await?;
        *self.held.write() = 0.0;

        let sim_order_id = Uuid::new_v4();
        info!(symbol, quantity, price, %sim_order_id, "paper sell filled");
        Ok(OrderFill { price, quantity })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Selling with nothing held fails before any network call is made.
    #[tokio::test]
    async fn sell_with_no_position_is_rejected() {
        let gw = PaperGateway::new();
        let err = gw.sell("BTCUSDC").await.unwrap_err();
        assert!(matches!(err, GatewayError::NoPosition { .. }));
    }
}
