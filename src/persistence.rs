// =============================================================================
// Trade Log — append-only SQLite persistence
// =============================================================================
//
// One row per ingested candle, trade or not: the log doubles as an
// observation history for offline analysis. Indicator columns keep the
// legacy on-disk encoding so existing tooling can read new files: RSI and
// MACD are NULL while undefined, the directional indexes use a -1.0
// sentinel instead.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::info;

use crate::types::Phase;

const CREATE_TRADES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS trades (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT    NOT NULL,
    symbol    TEXT    NOT NULL,
    buy       INTEGER NOT NULL,
    sell      INTEGER NOT NULL,
    position  INTEGER NOT NULL,
    quantity  REAL    NOT NULL,
    price     REAL    NOT NULL,
    volume    REAL    NOT NULL,
    mean      REAL    NOT NULL,
    std       REAL    NOT NULL,
    buy_line  REAL    NOT NULL,
    sell_line REAL    NOT NULL,
    rsi       REAL,
    di_plus   REAL    NOT NULL,
    di_minus  REAL    NOT NULL,
    macd      REAL
)
"#;

/// One observation row. `buy`/`sell` flag an order attempt on this candle;
/// `position` is the phase after any transition; `quantity` is the confirmed
/// fill size, 0.0 when no order was placed or the order failed.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub buy: bool,
    pub sell: bool,
    pub position: Phase,
    pub quantity: f64,
    pub price: f64,
    pub volume: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub buy_line: f64,
    pub sell_line: f64,
    pub rsi: Option<f64>,
    pub di_plus: Option<f64>,
    pub di_minus: Option<f64>,
    pub macd: Option<f64>,
}

pub struct TradeLog {
    pool: SqlitePool,
}

impl TradeLog {
    /// Open (or create) the log file at `path`.
    pub async fn open(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let log = Self::with_options(options).await?;
        info!(path, "trade log open");
        Ok(log)
    }

    /// In-memory log for tests and dry runs.
    pub async fn open_in_memory() -> Result<Self> {
        let options =
            SqliteConnectOptions::from_str("sqlite::memory:").context("in-memory sqlite options")?;
        Self::with_options(options).await
    }

    async fn with_options(options: SqliteConnectOptions) -> Result<Self> {
        // Single connection kept alive forever: an in-memory database lives
        // and dies with its connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("opening trade log database")?;

        sqlx::query(CREATE_TRADES_TABLE)
            .execute(&pool)
            .await
            .context("creating trades table")?;

        Ok(Self { pool })
    }

    /// Append one record. Undefined RSI/MACD are stored as NULL; undefined
    /// directional indexes as -1.0.
    pub async fn append(&self, record: &TradeRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trades (
                timestamp, symbol, buy, sell, position, quantity, price,
                volume, mean, std, buy_line, sell_line, rsi, di_plus,
                di_minus, macd
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.timestamp)
        .bind(&record.symbol)
        .bind(record.buy as i32)
        .bind(record.sell as i32)
        .bind((record.position == Phase::InPosition) as i32)
        .bind(record.quantity)
        .bind(record.price)
        .bind(record.volume)
        .bind(record.mean)
        .bind(record.std_dev)
        .bind(record.buy_line)
        .bind(record.sell_line)
        .bind(record.rsi)
        .bind(record.di_plus.unwrap_or(-1.0))
        .bind(record.di_minus.unwrap_or(-1.0))
        .bind(record.macd)
        .execute(&self.pool)
        .await
        .context("inserting trade record")?;

        Ok(())
    }

    /// The most recent `limit` records in chronological order.
    pub async fn recent(&self, limit: u32) -> Result<Vec<TradeRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT timestamp, symbol, buy, sell, position, quantity, price,
                   volume, mean, std, buy_line, sell_line, rsi, di_plus,
                   di_minus, macd
            FROM trades
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("reading trade records")?;

        let mut records: Vec<TradeRecord> = rows.iter().map(record_from_row).collect();
        records.reverse();
        Ok(records)
    }
}

fn record_from_row(row: &SqliteRow) -> TradeRecord {
    let decode_di = |v: f64| if v < 0.0 { None } else { Some(v) };

    TradeRecord {
        timestamp: row.get("timestamp"),
        symbol: row.get("symbol"),
        buy: row.get::<i64, _>("buy") != 0,
        sell: row.get::<i64, _>("sell") != 0,
        position: if row.get::<i64, _>("position") != 0 {
            Phase::InPosition
        } else {
            Phase::Flat
        },
        quantity: row.get("quantity"),
        price: row.get("price"),
        volume: row.get("volume"),
        mean: row.get("mean"),
        std_dev: row.get("std"),
        buy_line: row.get("buy_line"),
        sell_line: row.get("sell_line"),
        rsi: row.get::<Option<f64>, _>("rsi"),
        di_plus: decode_di(row.get("di_plus")),
        di_minus: decode_di(row.get("di_minus")),
        macd: row.get::<Option<f64>, _>("macd"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(ts_ms: i64) -> TradeRecord {
        TradeRecord {
            timestamp: DateTime::from_timestamp_millis(ts_ms).unwrap(),
            symbol: "BTCUSDC".into(),
            buy: false,
            sell: false,
            position: Phase::Flat,
            quantity: 0.0,
            price: 101.5,
            volume: 3.25,
            mean: 100.0,
            std_dev: 1.2,
            buy_line: 97.6,
            sell_line: 102.4,
            rsi: Some(55.0),
            di_plus: Some(60.0),
            di_minus: Some(40.0),
            macd: Some(0.8),
        }
    }

    #[tokio::test]
    async fn records_round_trip() {
        let log = TradeLog::open_in_memory().await.unwrap();

        let mut rec = sample_record(1_700_000_000_000);
        rec.buy = true;
        rec.position = Phase::InPosition;
        rec.quantity = 0.0001;
        log.append(&rec).await.unwrap();

        let back = log.recent(10).await.unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0], rec);
    }

    #[tokio::test]
    async fn recent_returns_chronological_tail() {
        let log = TradeLog::open_in_memory().await.unwrap();

        for i in 0..5 {
            let rec = sample_record(1_700_000_000_000 + i * 60_000);
            log.append(&rec).await.unwrap();
        }

        let back = log.recent(3).await.unwrap();
        assert_eq!(back.len(), 3);
        assert!(back[0].timestamp < back[1].timestamp);
        assert!(back[1].timestamp < back[2].timestamp);
        assert_eq!(
            back[2].timestamp,
            DateTime::from_timestamp_millis(1_700_000_000_000 + 4 * 60_000).unwrap()
        );
    }

    #[tokio::test]
    async fn undefined_indicators_use_legacy_encoding() {
        let log = TradeLog::open_in_memory().await.unwrap();

        let mut rec = sample_record(1_700_000_000_000);
        rec.rsi = None;
        rec.di_plus = None;
        rec.di_minus = None;
        rec.macd = None;
        log.append(&rec).await.unwrap();

        // Raw row: NULL for rsi/macd, -1.0 sentinel for the DI columns.
        let row = sqlx::query("SELECT rsi, di_plus, di_minus, macd FROM trades")
            .fetch_one(&log.pool)
            .await
            .unwrap();
        assert_eq!(row.get::<Option<f64>, _>("rsi"), None);
        assert_eq!(row.get::<f64, _>("di_plus"), -1.0);
        assert_eq!(row.get::<f64, _>("di_minus"), -1.0);
        assert_eq!(row.get::<Option<f64>, _>("macd"), None);

        // Typed read-back decodes the sentinel again.
        let back = log.recent(1).await.unwrap();
        assert_eq!(back[0].rsi, None);
        assert_eq!(back[0].di_plus, None);
        assert_eq!(back[0].di_minus, None);
        assert_eq!(back[0].macd, None);
    }

    #[tokio::test]
    async fn phase_flags_survive_storage() {
        let log = TradeLog::open_in_memory().await.unwrap();

        let mut rec = sample_record(1_700_000_000_000);
        rec.sell = true;
        rec.position = Phase::Flat;
        rec.quantity = 0.002;
        log.append(&rec).await.unwrap();

        let back = log.recent(1).await.unwrap();
        assert!(back[0].sell);
        assert!(!back[0].buy);
        assert_eq!(back[0].position, Phase::Flat);
        assert!((back[0].quantity - 0.002).abs() < 1e-12);
    }
}
