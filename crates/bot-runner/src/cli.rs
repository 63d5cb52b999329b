use clap::Parser;
use std::path::PathBuf;

/// Run a bot over historical data and report its performance.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "bot-runner", version, about)]
pub struct Cli {
    /// Bot to run (e.g. atr-trail)
    #[arg(long)]
    pub bot: Option<String>,

    /// Symbol code, e.g. BTCUSD
    #[arg(long)]
    pub symbol: Option<String>,

    /// Data source: synthetic or rest
    #[arg(long)]
    pub exchange: Option<String>,

    /// Source subtype, e.g. spot or futures
    #[arg(long)]
    pub area: Option<String>,

    /// Time frame: t1, s1, m1, m5, m15, h1, h4, d1
    #[arg(long)]
    pub timeframe: Option<String>,

    /// Start date (YYYY-MM-DD or RFC 3339)
    #[arg(long, alias = "start")]
    pub from: Option<String>,

    /// End date (YYYY-MM-DD or RFC 3339)
    #[arg(long, alias = "end")]
    pub to: Option<String>,

    /// Emit status lines and the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Only print the final report
    #[arg(long)]
    pub quiet: bool,

    /// Config file (JSON or TOML) layered over the preset
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Named preset loaded from the preset directory
    #[arg(long)]
    pub preset: Option<String>,

    /// Directory holding `<preset>.json` files
    #[arg(long, default_value = "presets")]
    pub preset_dir: PathBuf,

    /// Bot parameter override, repeatable: --param atr.period=14
    #[arg(long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Seed of the synthetic source
    #[arg(long)]
    pub seed: Option<u64>,

    /// Base URL of the REST bars endpoint (exchange `rest`)
    #[arg(long)]
    pub source_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_command_line() {
        let cli = Cli::try_parse_from([
            "bot-runner",
            "--bot",
            "atr-trail",
            "--symbol",
            "BTCUSD",
            "--start",
            "2024-01-01",
            "--to",
            "2024-03-01",
            "--json",
            "--param",
            "atr.period=10",
            "--param",
            "trend.fast=5",
        ])
        .unwrap();
        assert_eq!(cli.bot.as_deref(), Some("atr-trail"));
        assert_eq!(cli.from.as_deref(), Some("2024-01-01"));
        assert!(cli.json);
        assert!(!cli.quiet);
        assert_eq!(cli.params, vec!["atr.period=10", "trend.fast=5"]);
        assert_eq!(cli.preset_dir, PathBuf::from("presets"));
    }
}
