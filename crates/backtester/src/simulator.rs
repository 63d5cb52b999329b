//! The bar-by-bar backtest loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use history::{DataRequest, HistoricalDataProvider};
use market_core::{Bar, CancelToken, DataSeries, SeriesKey, TimeFrame};

use crate::account::SimulatedAccount;
use crate::bot::{Bot, BotContext};
use crate::config::SimulatorConfig;
use crate::error::{BacktestError, Result};
use crate::journal::TradeRecord;
use crate::params::ParameterMap;
use crate::statistics::BacktestStatistics;
use crate::status::RunStatus;

/// Bars retained in the window handed to bots, beyond their lookback.
const MIN_BAR_WINDOW: usize = 256;
/// Bars processed between cooperative yields.
const YIELD_EVERY: usize = 1024;

/// What to simulate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub symbol: String,
    pub timeframe: TimeFrame,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Status change of one run, sent to an optional listener.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusUpdate {
    pub bot: String,
    pub symbol: String,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Outcome of one run.
#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    pub status: RunStatus,
    pub bot: String,
    pub parameters: ParameterMap,
    pub symbol: String,
    pub timeframe: TimeFrame,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Present for completed runs.
    pub statistics: Option<BacktestStatistics>,
    /// Trades closed before the run ended, however it ended.
    pub trades: Vec<TradeRecord>,
    pub error: Option<String>,
}

impl BacktestReport {
    fn new(bot: &dyn Bot, request: &RunRequest) -> Self {
        Self {
            status: RunStatus::Starting,
            bot: bot.name().to_string(),
            parameters: bot.parameters(),
            symbol: request.symbol.clone(),
            timeframe: request.timeframe,
            start: request.start,
            end: request.end,
            statistics: None,
            trades: Vec::new(),
            error: None,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }
}

/// The backtest simulator engine.
pub struct BacktestSimulator {
    config: SimulatorConfig,
    provider: Arc<HistoricalDataProvider<Bar>>,
    status_tx: Option<mpsc::UnboundedSender<StatusUpdate>>,
}

impl BacktestSimulator {
    pub fn new(provider: Arc<HistoricalDataProvider<Bar>>, config: SimulatorConfig) -> Self {
        Self {
            config,
            provider,
            status_tx: None,
        }
    }

    /// Report status changes of every run on `tx`.
    pub fn with_status_channel(mut self, tx: mpsc::UnboundedSender<StatusUpdate>) -> Self {
        self.status_tx = Some(tx);
        self
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<HistoricalDataProvider<Bar>> {
        &self.provider
    }

    fn notify(&self, report: &BacktestReport) {
        if let Some(tx) = &self.status_tx {
            let _ = tx.send(StatusUpdate {
                bot: report.bot.clone(),
                symbol: report.symbol.clone(),
                status: report.status,
                message: report.error.clone(),
            });
        }
    }

    /// Run `bot` over `request`. Never fails: faults end up in the report's status.
    pub async fn run(&self, bot: &mut dyn Bot, request: &RunRequest, cancel: &CancelToken) -> BacktestReport {
        let mut report = BacktestReport::new(bot, request);
        info!(
            bot = %report.bot,
            symbol = %request.symbol,
            timeframe = %request.timeframe,
            start = %request.start,
            end = %request.end,
            "Starting backtest"
        );
        self.notify(&report);

        let mut account = SimulatedAccount::new(self.config.clone());
        let outcome = self.simulate(bot, request, cancel, &mut account, &mut report).await;
        report.trades = account.journal().trades().to_vec();

        match outcome {
            Ok(statistics) => {
                info!(
                    bot = %report.bot,
                    final_balance = %statistics.final_balance,
                    return_pct = statistics.return_pct,
                    trades = statistics.total_trades,
                    "Backtest completed"
                );
                report.status = RunStatus::Completed;
                report.statistics = Some(statistics);
            }
            Err(e) if e.is_cancelled() => {
                warn!(bot = %report.bot, "Backtest cancelled");
                report.status = RunStatus::Cancelled;
            }
            Err(e) => {
                error!(bot = %report.bot, error = %e, "Backtest failed");
                report.status = RunStatus::Failed;
                report.error = Some(e.to_string());
            }
        }
        self.notify(&report);
        report
    }

    /// Run every job concurrently. One job failing does not affect the others.
    pub async fn run_batch(
        &self,
        jobs: Vec<(Box<dyn Bot>, RunRequest)>,
        cancel: &CancelToken,
    ) -> Vec<BacktestReport> {
        let runs = jobs
            .into_iter()
            .map(|(mut bot, request)| async move { self.run(bot.as_mut(), &request, cancel).await });
        futures_util::future::join_all(runs).await
    }

    async fn simulate(
        &self,
        bot: &mut dyn Bot,
        request: &RunRequest,
        cancel: &CancelToken,
        account: &mut SimulatedAccount,
        report: &mut BacktestReport,
    ) -> Result<BacktestStatistics> {
        if request.end < request.start {
            return Err(market_core::Error::InvalidRange {
                start: request.start,
                end: request.end,
            }
            .into());
        }

        let warmup = bot.lookback();
        let (bars, trading_from) = self.load_bars(request, warmup, cancel).await?;
        let bot_name = report.bot.clone();

        report.status = RunStatus::Running;
        self.notify(report);

        guarded(&bot_name, request.start, || bot.on_start())?;

        let mut window = DataSeries::with_capacity((warmup + 1).max(MIN_BAR_WINDOW));
        for (i, bar) in bars.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(BacktestError::Cancelled);
            }
            if i > 0 && i % YIELD_EVERY == 0 {
                tokio::task::yield_now().await;
            }

            let trading = i >= trading_from;
            if trading {
                account.fill_pending(bar);
                account.check_exits(bar);
            }

            window.add(*bar);
            guarded(&bot_name, bar.open_time, || {
                bot.update_indicators(bar);
                Ok(())
            })?;

            if trading {
                account.mark(bar);
                let mut ctx = BotContext::new(&request.symbol, request.timeframe, &window, account);
                guarded(&bot_name, bar.open_time, || bot.on_bar(&mut ctx))?;
            }
        }

        // Bars exist past trading_from, checked by load_bars.
        let last = bars[bars.len() - 1];
        if self.config.close_at_end {
            account.close_at_end(&last);
        }
        let mut ctx = BotContext::new(&request.symbol, request.timeframe, &window, account);
        guarded(&bot_name, last.open_time, || bot.on_stop(&mut ctx))?;

        Ok(BacktestStatistics::compute(
            account.journal(),
            self.config.initial_capital,
            account.equity(),
            request.timeframe,
            request.start,
            request.end,
            bars.len() - trading_from,
        ))
    }

    /// Bars from `warmup` bars before `start` through `end`, and the index of the
    /// first bar at or after `start`.
    async fn load_bars(
        &self,
        request: &RunRequest,
        warmup: usize,
        cancel: &CancelToken,
    ) -> Result<(Vec<Bar>, usize)> {
        let in_range = request.timeframe.bars_between(request.start, request.end).max(0) as usize;
        let data_request = DataRequest::new(request.start)
            .with_end(request.end)
            .with_desired_bars(in_range + warmup + 1);
        let (series, _summary) = self
            .provider
            .ensure_data_available(&request.symbol, request.timeframe, data_request, cancel)
            .await?;

        let data = series.read().await;
        let first = data.lower_bound(request.start);
        let from = first.saturating_sub(warmup);
        let bars: Vec<Bar> = data
            .iter()
            .skip(from)
            .take_while(|b| b.open_time <= request.end)
            .copied()
            .collect();
        drop(data);

        let trading_from = first - from;
        if bars.len() <= trading_from {
            return Err(BacktestError::NoData {
                series: SeriesKey::new(request.symbol.as_str(), request.timeframe).to_string(),
                start: request.start.to_rfc3339(),
                end: request.end.to_rfc3339(),
            });
        }
        if trading_from < warmup {
            warn!(
                symbol = %request.symbol,
                available = trading_from,
                warmup,
                "Not enough history before start to warm up indicators"
            );
        }
        Ok((bars, trading_from))
    }
}

/// Run bot code, turning errors and panics into a bot fault.
fn guarded<R>(bot: &str, time: DateTime<Utc>, f: impl FnOnce() -> Result<R>) -> Result<R> {
    let message = match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => return Ok(value),
        Ok(Err(e)) if e.is_cancelled() => return Err(e),
        Ok(Err(e)) => e.to_string(),
        Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
    };
    Err(BacktestError::BotFault {
        bot: bot.to_string(),
        time: time.to_rfc3339(),
        message,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
