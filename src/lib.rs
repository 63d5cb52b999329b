//! Tradelab: trading bot research platform
//!
//! This is the root crate that provides benchmark and integration-test access to
//! the member crates. For actual functionality, use the individual crates directly:
//!
//! - `market-core`: time frames, windowed series, market series with gap tracking
//! - `indicators`: incremental indicators and indicator series
//! - `history`: on-disk chunk cache and the cache-first historical data provider
//! - `backtester`: bot trait, simulated account, bar-by-bar simulation, statistics
//! - `bot-runner`: command-line runner

// Re-export for benchmarks
pub use backtester as backtest;
pub use history;
pub use indicators;
pub use market_core as core;
