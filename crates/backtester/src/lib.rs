//! Backtester
//!
//! Bar-by-bar simulation of trading bots over cached historical data.
//!
//! # Features
//!
//! - **Bot trait**: indicator updates and a per-bar handler that sees no future bars
//! - **Typed parameters**: per-bot key enums bound from dotted `key=value` pairs
//! - **Simulated account**: next-open fills, stop-loss/take-profit, fee and slippage models
//! - **Journal and statistics**: closed trades, equity curve, drawdown, Sharpe, win rate
//! - **Run status**: completed, cancelled or failed, with process exit codes
//!
//! # Example
//!
//! ```ignore
//! use backtester::{create_bot, BacktestSimulator, RunRequest, SimulatorConfig};
//!
//! let simulator = BacktestSimulator::new(provider, SimulatorConfig::default());
//! let mut bot = create_bot("atr-trail", &params)?;
//! let report = simulator.run(bot.as_mut(), &request, &cancel).await;
//! std::process::exit(report.exit_code());
//! ```

pub mod account;
pub mod bot;
pub mod bots;
pub mod config;
pub mod error;
pub mod journal;
pub mod params;
pub mod simulator;
pub mod statistics;
pub mod status;

// Re-exports
pub use account::{CloseReason, Direction, Position, PositionState, SimulatedAccount, StopUpdate};
pub use bot::{Bot, BotContext};
pub use bots::{create_bot, AtrTrailBot, AtrTrailParams, BOT_NAMES};
pub use config::{FeeModel, SimulatorConfig, SlippageModel};
pub use error::{BacktestError, OrderRejection, Result};
pub use journal::{Journal, TradeRecord};
pub use params::{BotParameters, ParameterKey, ParameterMap};
pub use simulator::{BacktestReport, BacktestSimulator, RunRequest, StatusUpdate};
pub use statistics::BacktestStatistics;
pub use status::RunStatus;
