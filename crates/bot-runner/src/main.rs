//! Bot Runner
//!
//! Runs one bot over historical data, printing status lines while it runs and
//! a report at the end. Exits 0 when the run completed, 130 when it was
//! cancelled and 1 otherwise.

mod cli;
mod output;
mod settings;

use anyhow::{bail, Result};
use backtester::{create_bot, BacktestReport, BacktestSimulator, RunRequest};
use clap::Parser;
use history::{HistoricalDataProvider, HistoricalSource, ProviderMode, RestSource, SourceId, SyntheticSource};
use market_core::{Bar, CancelToken, HistoryConfig};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::Cli;
use settings::RunSettings;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let settings = match RunSettings::load(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            println!("{}", output::error_line(&format!("{:#}", e), cli.json));
            std::process::exit(1);
        }
    };

    init_tracing(&settings);

    let code = match run(&settings).await {
        Ok(report) => {
            println!("{}", output::report(&report, settings.json));
            report.exit_code()
        }
        Err(e) => {
            error!(error = %e, "Run setup failed");
            println!("{}", output::error_line(&format!("{:#}", e), settings.json));
            1
        }
    };
    std::process::exit(code);
}

fn init_tracing(settings: &RunSettings) {
    let default_filter = if settings.quiet {
        "warn"
    } else {
        "bot_runner=info,backtester=info,history=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    // Stdout carries status lines and the report.
    tracing_subscriber::registry()
        .with(filter)
        .with(
            settings
                .json
                .then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)),
        )
        .with(
            (!settings.json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
        )
        .init();
}

fn build_source(settings: &RunSettings) -> Result<Arc<dyn HistoricalSource<Bar>>> {
    let exchange = settings.exchange.trim().to_ascii_lowercase();
    match (exchange.as_str(), &settings.source_url) {
        ("synthetic", _) => Ok(Arc::new(SyntheticSource::new(settings.seed))),
        (name, Some(url)) => {
            let mut id = SourceId::new(name);
            if let Some(area) = &settings.area {
                id = id.with_subtype(area.clone());
            }
            Ok(Arc::new(RestSource::new(id, url.clone())?))
        }
        (name, None) => bail!("Exchange '{}' needs a bars endpoint (--source-url)", name),
    }
}

async fn run(settings: &RunSettings) -> Result<BacktestReport> {
    let history_config = HistoryConfig::from_env()?;
    let source = build_source(settings)?;
    info!(
        source = %source.id().dir_name(),
        cache_dir = %history_config.cache_dir.display(),
        cache_only = history_config.cache_only,
        "Using historical data source"
    );

    let provider = Arc::new(HistoricalDataProvider::from_config(
        source,
        &history_config,
        ProviderMode::Backtest { end: settings.to },
    ));
    let mut bot = create_bot(&settings.bot, &settings.parameters)?;

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling run");
                cancel.cancel();
            }
        });
    }

    let (status_tx, mut status_rx) = mpsc::unbounded_channel();
    let json = settings.json;
    let quiet = settings.quiet;
    let printer = tokio::spawn(async move {
        while let Some(update) = status_rx.recv().await {
            if !quiet {
                println!("{}", output::status_line(&update, json));
            }
        }
    });

    let simulator = BacktestSimulator::new(provider, settings.simulator.clone()).with_status_channel(status_tx);
    let request = RunRequest {
        symbol: settings.symbol.clone(),
        timeframe: settings.timeframe,
        start: settings.from,
        end: settings.to,
    };
    let report = simulator.run(bot.as_mut(), &request, &cancel).await;

    // Closes the status channel so the printer drains and stops.
    drop(simulator);
    let _ = printer.await;

    Ok(report)
}
