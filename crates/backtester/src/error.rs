//! Error types for simulation runs.

use thiserror::Error;

use history::HistoryError;

/// Reasons the simulated account refuses a bot request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrderRejection {
    #[error("a position is already open or pending")]
    AlreadyInPosition,

    #[error("no open position")]
    NoPosition,

    #[error("insufficient funds: {available} available")]
    InsufficientFunds { available: String },

    #[error("stop update from {current} to {requested} would loosen protection")]
    WouldLoosen { current: f64, requested: f64 },

    #[error("invalid price {0}")]
    InvalidPrice(f64),
}

#[derive(Error, Debug, Clone)]
pub enum BacktestError {
    #[error("Unknown bot: {0}")]
    UnknownBot(String),

    #[error("Unknown parameter '{key}' for bot {bot}")]
    UnknownParameter { bot: String, key: String },

    #[error("Invalid value '{value}' for parameter '{key}': {message}")]
    InvalidParameter {
        key: String,
        value: String,
        message: String,
    },

    #[error("Bot {bot} faulted at {time}: {message}")]
    BotFault {
        bot: String,
        time: String,
        message: String,
    },

    #[error("Order rejected: {0}")]
    Rejected(#[from] OrderRejection),

    #[error("No data for {series} between {start} and {end}")]
    NoData {
        series: String,
        start: String,
        end: String,
    },

    #[error("History error: {0}")]
    History(#[from] HistoryError),

    #[error(transparent)]
    Market(#[from] market_core::Error),

    #[error("Run cancelled")]
    Cancelled,
}

impl BacktestError {
    pub fn is_cancelled(&self) -> bool {
        match self {
            BacktestError::Cancelled => true,
            BacktestError::History(e) => e.is_cancelled(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, BacktestError>;
