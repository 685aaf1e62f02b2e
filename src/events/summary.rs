//! Backtest summary statistics

use serde::{Deserialize, Serialize};

use crate::types::{ExitReason, SignalSource, Trade};

/// Aggregate performance of a trade ledger. Percent fields are in percent units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestSummary {
    pub signal_source: SignalSource,
    pub trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate_pct: f64,
    pub avg_return_pct: f64,
    pub avg_market_return_pct: f64,
    pub avg_alpha_pct: f64,
    pub total_alpha_pct: f64,
    /// Share of trades that beat the market
    pub alpha_win_rate_pct: f64,
    /// Per-trade mean over sample standard deviation of return_pct
    pub sharpe: f64,
    pub stop_losses: usize,
    pub top_trades: Vec<Trade>,
}

impl BacktestSummary {
    pub fn from_trades(source: SignalSource, trades: &[Trade], top_n: usize) -> Self {
        let n = trades.len();
        let wins = trades.iter().filter(|t| t.return_pct > 0.0).count();
        let alpha_wins = trades.iter().filter(|t| t.alpha_pct > 0.0).count();
        let stop_losses = trades
            .iter()
            .filter(|t| t.exit_reason == ExitReason::StopLoss)
            .count();

        let returns: Vec<f64> = trades.iter().map(|t| t.return_pct).collect();
        let total_alpha: f64 = trades.iter().map(|t| t.alpha_pct).sum();

        let mut ranked: Vec<Trade> = trades.to_vec();
        ranked.sort_by(|a, b| b.alpha_pct.total_cmp(&a.alpha_pct));
        ranked.truncate(top_n);

        Self {
            signal_source: source,
            trades: n,
            wins,
            losses: n - wins,
            win_rate_pct: ratio_pct(wins, n),
            avg_return_pct: mean(&returns),
            avg_market_return_pct: mean(
                &trades.iter().map(|t| t.market_return_pct).collect::<Vec<_>>(),
            ),
            avg_alpha_pct: if n == 0 { 0.0 } else { total_alpha / n as f64 },
            total_alpha_pct: total_alpha,
            alpha_win_rate_pct: ratio_pct(alpha_wins, n),
            sharpe: sharpe(&returns),
            stop_losses,
            top_trades: ranked,
        }
    }

    /// Multi-line report for terminal output
    pub fn render(&self) -> String {
        let mut out = format!(
            r#"Backtest ({} signal)
  Trades:            {}
  Wins / Losses:     {} / {}
  Win Rate:          {:.2}%
  Stop Losses:       {}
  Avg Return:        {:.2}%
  Avg Market Return: {:.2}%
  Avg Alpha:         {:.2}%
  Total Alpha:       {:.2}%
  Alpha Win Rate:    {:.2}%
  Sharpe (trade):    {:.2}
"#,
            self.signal_source,
            self.trades,
            self.wins,
            self.losses,
            self.win_rate_pct,
            self.stop_losses,
            self.avg_return_pct,
            self.avg_market_return_pct,
            self.avg_alpha_pct,
            self.total_alpha_pct,
            self.alpha_win_rate_pct,
            self.sharpe,
        );

        if !self.top_trades.is_empty() {
            out.push_str("  Top trades by alpha:\n");
            for t in &self.top_trades {
                out.push_str(&format!(
                    "    {} {}  return {:>7.2}%  market {:>6.2}%  alpha {:>7.2}%  ({})\n",
                    t.stock_id,
                    t.announcement_date,
                    t.return_pct,
                    t.market_return_pct,
                    t.alpha_pct,
                    t.exit_reason
                ));
            }
        }
        out
    }
}

fn ratio_pct(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// 0 with fewer than two trades or no dispersion
fn sharpe(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let m = mean(returns);
    let var = returns.iter().map(|r| (r - m).powi(2)).sum::<f64>() / (returns.len() - 1) as f64;
    let std = var.sqrt();
    if std == 0.0 {
        0.0
    } else {
        m / std
    }
}
