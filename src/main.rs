// =============================================================================
// Riptide — Main Entry Point
// =============================================================================
//
// Single-symbol mean-reversion bot. Orders are simulated (paper mode) unless
// the config explicitly selects the live gateway.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod alerts;
mod config;
mod engine;
mod feed;
mod gateway;
mod indicators;
mod market_data;
mod persistence;
mod primer;
mod strategy;
mod types;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::alerts::Notifier;
use crate::config::BotConfig;
use crate::engine::TradingEngine;
use crate::gateway::{BinanceGateway, OrderGateway, PaperGateway};
use crate::persistence::TradeLog;
use crate::primer::WindowPrimer;
use crate::types::GatewayMode;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Riptide Mean-Reversion Bot — Starting Up          ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let mut config = BotConfig::load("riptide.json").unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        BotConfig::default()
    });

    // Env wins over file for the webhook so deployments can rotate it
    // without editing config.
    if let Ok(url) = std::env::var("RIPTIDE_WEBHOOK_URL") {
        if !url.is_empty() {
            config.webhook_url = Some(url);
        }
    }

    config.validate().context("invalid configuration")?;

    let symbol = config.symbol();
    info!(
        symbol = %symbol,
        feed = %config.feed,
        gateway = %config.gateway,
        notional = config.notional,
        "Configured instrument"
    );

    // ── 2. Collaborators ─────────────────────────────────────────────────
    let log = TradeLog::open(&config.trade_log_path)
        .await
        .context("opening trade log")?;

    let notifier = Notifier::new(config.webhook_url.clone());

    let order_gateway: Box<dyn OrderGateway> = match config.gateway {
        GatewayMode::Paper => {
            info!("Paper gateway active, orders are simulated");
            Box::new(PaperGateway::new())
        }
        GatewayMode::Live => {
            let api_key = std::env::var("BINANCE_API_KEY")
                .context("BINANCE_API_KEY is required for the live gateway")?;
            let api_secret = std::env::var("BINANCE_API_SECRET")
                .context("BINANCE_API_SECRET is required for the live gateway")?;
            warn!("LIVE gateway active, orders will reach the exchange");
            Box::new(BinanceGateway::new(
                api_key,
                api_secret,
                config.base_asset.clone(),
            ))
        }
    };

    // Feed construction reads venue credentials, so a bad setup is fatal
    // here, before any connection is opened.
    let market_feed = feed::build_feed(&config).context("building market data feed")?;

    let mut engine = TradingEngine::new(&config, order_gateway, log, notifier.clone());

    // ── 3. Prime the window from historical klines ───────────────────────
    if config.primer_limit > 0 {
        match WindowPrimer::new().fetch(&symbol, config.primer_limit).await {
            Ok(candles) => {
                let count = candles.len();
                for candle in candles {
                    engine.prime(candle).await;
                }
                info!(count, "Window primed from historical klines");
            }
            Err(e) => {
                warn!(error = %e, "Priming failed, starting with a cold window");
            }
        }
    }

    // ── 4. Live feed loop until shutdown ─────────────────────────────────
    tokio::select! {
        _ = feed::run_feed_loop(market_feed, &mut engine, notifier) => {}
        _ = tokio::signal::ctrl_c() => {
            warn!("Shutdown signal received");
        }
    }

    info!("Riptide stopped");
    Ok(())
}
