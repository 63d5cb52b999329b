//! Status lines and the final report on stdout. Logs go to stderr.

use backtester::{BacktestReport, RunStatus, StatusUpdate};
use serde_json::json;

pub fn status_line(update: &StatusUpdate, json: bool) -> String {
    if json {
        return serde_json::to_string(update).unwrap_or_default();
    }
    let mut line = format!(
        "status={} bot={} symbol={}",
        update.status, update.bot, update.symbol
    );
    if let Some(message) = &update.message {
        line.push_str(&format!(" message=\"{}\"", message));
    }
    line
}

/// Setup failures, before any run exists.
pub fn error_line(message: &str, json: bool) -> String {
    if json {
        json!({ "status": RunStatus::Error, "message": message }).to_string()
    } else {
        format!("status={} message=\"{}\"", RunStatus::Error, message)
    }
}

pub fn report(report: &BacktestReport, json: bool) -> String {
    if json {
        return serde_json::to_string_pretty(report).unwrap_or_default();
    }

    let mut out = format!(
        "{} {} {} {} .. {}: {}\n",
        report.bot, report.symbol, report.timeframe, report.start, report.end, report.status
    );
    if let Some(error) = &report.error {
        out.push_str(&format!("  error: {}\n", error));
    }
    if let Some(s) = &report.statistics {
        out.push_str(&format!(
            "  final balance  {} (return {:.2}%, annualized {:.2}%)\n",
            s.final_balance.round_dp(2),
            s.return_pct * 100.0,
            s.annualized_return * 100.0
        ));
        out.push_str(&format!(
            "  trades         {} ({} won, {} lost, win rate {:.1}%)\n",
            s.total_trades,
            s.winning_trades,
            s.losing_trades,
            s.win_rate * 100.0
        ));
        out.push_str(&format!(
            "  max drawdown   {:.2}%  sharpe {:.2}  sortino {:.2}  profit factor {:.2}\n",
            s.max_drawdown * 100.0,
            s.sharpe_ratio,
            s.sortino_ratio,
            s.profit_factor
        ));
        out.push_str(&format!(
            "  costs          fees {} slippage {}  bars {}\n",
            s.total_fees.round_dp(2),
            s.total_slippage.round_dp(2),
            s.bars_processed
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(status: RunStatus, message: Option<&str>) -> StatusUpdate {
        StatusUpdate {
            bot: "atr-trail".to_string(),
            symbol: "BTCUSD".to_string(),
            status,
            message: message.map(str::to_string),
        }
    }

    #[test]
    fn test_human_status_line() {
        assert_eq!(
            status_line(&update(RunStatus::Running, None), false),
            "status=running bot=atr-trail symbol=BTCUSD"
        );
        assert!(status_line(&update(RunStatus::Failed, Some("boom")), false).ends_with("message=\"boom\""));
    }

    #[test]
    fn test_json_status_line() {
        let line = status_line(&update(RunStatus::Cancelled, None), true);
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["status"], "cancelled");
        assert_eq!(value["bot"], "atr-trail");
    }

    #[test]
    fn test_error_line() {
        let value: serde_json::Value = serde_json::from_str(&error_line("Preset not found", true)).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(error_line("x", false), "status=error message=\"x\"");
    }
}
