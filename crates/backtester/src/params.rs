//! Typed bot parameters bound from dotted `key=value` pairs.
//!
//! Each bot declares a key enum listing its parameter paths (`atr.period`) and a
//! parameter struct that converts raw strings into typed fields per key.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use crate::error::{BacktestError, Result};

/// Raw parameters as supplied by presets, config files or the command line.
pub type ParameterMap = BTreeMap<String, String>;

pub trait ParameterKey: Copy + Sized + 'static {
    const ALL: &'static [Self];

    /// Dotted path, e.g. `atr.period`.
    fn path(&self) -> &'static str;

    fn from_path(path: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.path().eq_ignore_ascii_case(path.trim()))
    }
}

pub trait BotParameters: Default + Clone + Send {
    type Key: ParameterKey;

    fn set(&mut self, key: Self::Key, raw: &str) -> std::result::Result<(), String>;

    fn get(&self, key: Self::Key) -> String;

    /// Defaults overridden by `values`. Unknown keys and unparsable values fail.
    fn bind(bot: &str, values: &ParameterMap) -> Result<Self> {
        let mut params = Self::default();
        for (path, raw) in values {
            let key = Self::Key::from_path(path).ok_or_else(|| BacktestError::UnknownParameter {
                bot: bot.to_string(),
                key: path.clone(),
            })?;
            params
                .set(key, raw)
                .map_err(|message| BacktestError::InvalidParameter {
                    key: path.clone(),
                    value: raw.clone(),
                    message,
                })?;
        }
        Ok(params)
    }

    fn to_map(&self) -> ParameterMap {
        Self::Key::ALL
            .iter()
            .map(|k| (k.path().to_string(), self.get(*k)))
            .collect()
    }
}

/// Parse one raw value, reporting the parser's message on failure.
pub fn parse_value<T>(raw: &str) -> std::result::Result<T, String>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim().parse::<T>().map_err(|e| e.to_string())
}

/// Like [`parse_value`], rejecting zero.
pub fn parse_period(raw: &str) -> std::result::Result<usize, String> {
    match parse_value::<usize>(raw)? {
        0 => Err("period must be at least 1".to_string()),
        n => Ok(n),
    }
}

/// Like [`parse_value`], rejecting non-finite and negative numbers.
pub fn parse_non_negative(raw: &str) -> std::result::Result<f64, String> {
    let value = parse_value::<f64>(raw)?;
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(format!("{} is not a non-negative number", value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Key {
        Period,
        Factor,
    }

    impl ParameterKey for Key {
        const ALL: &'static [Self] = &[Key::Period, Key::Factor];

        fn path(&self) -> &'static str {
            match self {
                Key::Period => "window.period",
                Key::Factor => "window.factor",
            }
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Params {
        period: usize,
        factor: f64,
    }

    impl Default for Params {
        fn default() -> Self {
            Self { period: 5, factor: 1.5 }
        }
    }

    impl BotParameters for Params {
        type Key = Key;

        fn set(&mut self, key: Key, raw: &str) -> std::result::Result<(), String> {
            match key {
                Key::Period => self.period = parse_period(raw)?,
                Key::Factor => self.factor = parse_non_negative(raw)?,
            }
            Ok(())
        }

        fn get(&self, key: Key) -> String {
            match key {
                Key::Period => self.period.to_string(),
                Key::Factor => self.factor.to_string(),
            }
        }
    }

    fn map(pairs: &[(&str, &str)]) -> ParameterMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_bind_overrides_defaults() {
        let params = Params::bind("test", &map(&[("Window.Period", " 20 ")])).unwrap();
        assert_eq!(params, Params { period: 20, factor: 1.5 });
        assert_eq!(params.to_map().get("window.period").map(String::as_str), Some("20"));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = Params::bind("test", &map(&[("window.size", "3")])).unwrap_err();
        assert!(matches!(err, BacktestError::UnknownParameter { .. }));
    }

    #[test]
    fn test_bad_values_are_rejected() {
        for (key, value) in [("window.period", "0"), ("window.period", "x"), ("window.factor", "-1")] {
            let err = Params::bind("test", &map(&[(key, value)])).unwrap_err();
            assert!(matches!(err, BacktestError::InvalidParameter { .. }), "{key}={value}");
        }
    }
}
