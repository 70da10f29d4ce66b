pub mod candle;
pub mod window;

// Re-export the core types for convenient access (e.g. `use crate::market_data::Candle`).
pub use candle::{minute_bucket, Candle, MINUTE_MS};
pub use window::PriceWindow;
