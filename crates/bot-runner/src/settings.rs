//! Run settings layered from defaults, a named preset, a config file and the
//! command line, later layers winning.

use anyhow::{bail, Context, Result};
use backtester::{ParameterMap, SimulatorConfig};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use config::{Config, File};
use market_core::TimeFrame;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

use crate::cli::Cli;

const DEFAULT_EXCHANGE: &str = "synthetic";
const DEFAULT_TIMEFRAME: &str = "h1";
const DEFAULT_SEED: u64 = 42;

/// Fully resolved settings of one run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub bot: String,
    pub symbol: String,
    pub exchange: String,
    pub area: Option<String>,
    pub timeframe: TimeFrame,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub json: bool,
    pub quiet: bool,
    pub parameters: ParameterMap,
    pub simulator: SimulatorConfig,
    pub seed: u64,
    pub source_url: Option<String>,
}

/// One layer as read from a file or the command line. Absent fields fall
/// through to the layer below.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct SettingsLayer {
    bot: Option<String>,
    symbol: Option<String>,
    exchange: Option<String>,
    area: Option<String>,
    timeframe: Option<String>,
    #[serde(alias = "start")]
    from: Option<String>,
    #[serde(alias = "end")]
    to: Option<String>,
    json: Option<bool>,
    quiet: Option<bool>,
    parameters: Option<Value>,
    simulator: Option<SimulatorConfig>,
    seed: Option<u64>,
    source_url: Option<String>,
}

impl SettingsLayer {
    fn from_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            bail!("Config file not found: {}", path.display());
        }
        Config::builder()
            .add_source(File::from(path).required(true))
            .build()
            .and_then(|c| c.try_deserialize())
            .with_context(|| format!("Failed to read config file {}", path.display()))
    }

    fn from_cli(cli: &Cli) -> Self {
        Self {
            bot: cli.bot.clone(),
            symbol: cli.symbol.clone(),
            exchange: cli.exchange.clone(),
            area: cli.area.clone(),
            timeframe: cli.timeframe.clone(),
            from: cli.from.clone(),
            to: cli.to.clone(),
            json: cli.json.then_some(true),
            quiet: cli.quiet.then_some(true),
            parameters: None,
            simulator: None,
            seed: cli.seed,
            source_url: cli.source_url.clone(),
        }
    }

    /// `self` over `lower`. Parameter maps merge key by key.
    fn over(self, lower: SettingsLayer, parameters: &mut ParameterMap) -> Result<Self> {
        if let Some(value) = &self.parameters {
            flatten_parameters("", value, parameters)?;
        }
        Ok(Self {
            bot: self.bot.or(lower.bot),
            symbol: self.symbol.or(lower.symbol),
            exchange: self.exchange.or(lower.exchange),
            area: self.area.or(lower.area),
            timeframe: self.timeframe.or(lower.timeframe),
            from: self.from.or(lower.from),
            to: self.to.or(lower.to),
            json: self.json.or(lower.json),
            quiet: self.quiet.or(lower.quiet),
            parameters: None,
            simulator: self.simulator.or(lower.simulator),
            seed: self.seed.or(lower.seed),
            source_url: self.source_url.or(lower.source_url),
        })
    }
}

impl RunSettings {
    /// Resolve settings for `cli`. A missing preset or config file is an error.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut layers = Vec::new();
        if let Some(preset) = &cli.preset {
            let path = cli.preset_dir.join(format!("{}.json", preset));
            if !path.is_file() {
                bail!("Preset not found: {} ({})", preset, path.display());
            }
            layers.push(SettingsLayer::from_file(&path)?);
        }
        if let Some(path) = &cli.config {
            layers.push(SettingsLayer::from_file(path)?);
        }
        layers.push(SettingsLayer::from_cli(cli));

        // Lowest layer first, so parameters from higher layers overwrite.
        let mut parameters = ParameterMap::new();
        let mut merged = SettingsLayer::default();
        for layer in layers {
            merged = layer.over(merged, &mut parameters)?;
        }
        for raw in &cli.params {
            let (key, value) = raw
                .split_once('=')
                .with_context(|| format!("Expected KEY=VALUE, got '{}'", raw))?;
            parameters.insert(key.trim().to_string(), value.trim().to_string());
        }

        Self::resolve(merged, parameters)
    }

    fn resolve(layer: SettingsLayer, parameters: ParameterMap) -> Result<Self> {
        let bot = layer.bot.context("No bot given (--bot)")?;
        let symbol = layer.symbol.context("No symbol given (--symbol)")?;
        let timeframe: TimeFrame = layer
            .timeframe
            .as_deref()
            .unwrap_or(DEFAULT_TIMEFRAME)
            .parse()
            .context("Invalid time frame")?;
        let from = parse_date(layer.from.as_deref().context("No start date given (--from)")?)?;
        let to = match layer.to.as_deref() {
            Some(s) => parse_date(s)?,
            None => Utc::now(),
        };
        if from >= to {
            bail!("Start {} is not before end {}", from, to);
        }

        Ok(Self {
            bot,
            symbol,
            exchange: layer.exchange.unwrap_or_else(|| DEFAULT_EXCHANGE.to_string()),
            area: layer.area,
            timeframe,
            from,
            to,
            json: layer.json.unwrap_or(false),
            quiet: layer.quiet.unwrap_or(false),
            parameters,
            simulator: layer.simulator.unwrap_or_default(),
            seed: layer.seed.unwrap_or(DEFAULT_SEED),
            source_url: layer.source_url,
        })
    }
}

/// `YYYY-MM-DD` (midnight UTC) or RFC 3339.
pub fn parse_date(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("Invalid date '{}'", s))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .with_context(|| format!("Invalid date '{}'", s))?;
    Ok(Utc.from_utc_datetime(&midnight))
}

/// Nested objects become dotted keys: `{"atr": {"period": 14}}` sets `atr.period`.
fn flatten_parameters(prefix: &str, value: &Value, out: &mut ParameterMap) -> Result<()> {
    let key = |k: &str| {
        if prefix.is_empty() {
            k.to_string()
        } else {
            format!("{}.{}", prefix, k)
        }
    };
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                flatten_parameters(&key(k), v, out)?;
            }
        }
        Value::Null => {}
        Value::String(s) if !prefix.is_empty() => {
            out.insert(prefix.to_string(), s.clone());
        }
        Value::Bool(_) | Value::Number(_) if !prefix.is_empty() => {
            out.insert(prefix.to_string(), value.to_string());
        }
        other => bail!("Unsupported parameter value at '{}': {}", prefix, other),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::fs;
    use tempfile::TempDir;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["bot-runner"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    fn write(dir: &TempDir, name: &str, body: &str) -> String {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_command_line_only() {
        let settings = RunSettings::load(&cli(&[
            "--bot",
            "atr-trail",
            "--symbol",
            "BTCUSD",
            "--from",
            "2024-01-01",
            "--to",
            "2024-02-01T12:00:00Z",
        ]))
        .unwrap();
        assert_eq!(settings.exchange, "synthetic");
        assert_eq!(settings.timeframe, TimeFrame::H1);
        assert_eq!(settings.from, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(settings.to, Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap());
        assert_eq!(settings.seed, DEFAULT_SEED);
        assert!(settings.parameters.is_empty());
    }

    #[test]
    fn test_precedence_preset_config_cli() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "btc.json",
            r#"{ "bot": "atr-trail", "symbol": "BTCUSD", "timeframe": "m15",
                 "start": "2024-01-01", "end": "2024-03-01",
                 "parameters": { "atr": { "period": 10, "multiplier": 2.5 } } }"#,
        );
        let config = write(
            &dir,
            "run.json",
            r#"{ "timeframe": "h4", "parameters": { "atr.period": 20 } }"#,
        );
        let preset_dir = dir.path().to_string_lossy().into_owned();

        let settings = RunSettings::load(&cli(&[
            "--preset",
            "btc",
            "--preset-dir",
            &preset_dir,
            "--config",
            &config,
            "--symbol",
            "ETHUSD",
            "--param",
            "trade.allow-short=false",
        ]))
        .unwrap();

        assert_eq!(settings.bot, "atr-trail");
        assert_eq!(settings.symbol, "ETHUSD");
        assert_eq!(settings.timeframe, TimeFrame::H4);
        assert_eq!(settings.to, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(settings.parameters.get("atr.period").map(String::as_str), Some("20"));
        assert_eq!(settings.parameters.get("atr.multiplier").map(String::as_str), Some("2.5"));
        assert_eq!(
            settings.parameters.get("trade.allow-short").map(String::as_str),
            Some("false")
        );
    }

    #[test]
    fn test_missing_preset_is_an_error() {
        let dir = TempDir::new().unwrap();
        let preset_dir = dir.path().to_string_lossy().into_owned();
        let err = RunSettings::load(&cli(&["--preset", "nope", "--preset-dir", &preset_dir])).unwrap_err();
        assert!(err.to_string().contains("Preset not found"));
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let err = RunSettings::load(&cli(&["--config", "/definitely/not/here.json"])).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_start_must_precede_end() {
        let result = RunSettings::load(&cli(&[
            "--bot", "atr-trail", "--symbol", "X", "--from", "2024-02-01", "--to", "2024-01-01",
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_malformed_param() {
        let result = RunSettings::load(&cli(&[
            "--bot", "atr-trail", "--symbol", "X", "--from", "2024-01-01", "--param", "atr.period",
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_flatten_rejects_arrays() {
        let mut out = ParameterMap::new();
        let value: Value = serde_json::json!({ "atr": { "period": [1, 2] } });
        assert!(flatten_parameters("", &value, &mut out).is_err());
    }
}
