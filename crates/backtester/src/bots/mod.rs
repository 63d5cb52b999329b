//! Bundled bots, constructed by name.

pub mod atr_trail;

pub use atr_trail::{AtrTrailBot, AtrTrailParam, AtrTrailParams};

use crate::bot::Bot;
use crate::error::{BacktestError, Result};
use crate::params::{BotParameters, ParameterMap};

/// Names accepted by [`create_bot`].
pub const BOT_NAMES: &[&str] = &[atr_trail::NAME];

/// Build the bot registered as `name` with `params` applied over its defaults.
pub fn create_bot(name: &str, params: &ParameterMap) -> Result<Box<dyn Bot>> {
    match name.trim().to_ascii_lowercase().as_str() {
        atr_trail::NAME => Ok(Box::new(AtrTrailBot::new(AtrTrailParams::bind(atr_trail::NAME, params)?))),
        _ => Err(BacktestError::UnknownBot(name.to_string())),
    }
}
