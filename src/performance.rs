use crate::models::*;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Closing trades grouped the way reports show them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseKind {
    /// A long lot sold.
    Sell,
    /// A short lot bought back.
    Cover,
}

impl CloseKind {
    pub fn side(self) -> Side {
        match self {
            CloseKind::Sell => Side::Long,
            CloseKind::Cover => Side::Short,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CloseKind::Sell => "Sell",
            CloseKind::Cover => "Cover",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeStats {
    pub total_trades: usize,
    pub total_profit_loss: f64,
    pub best_trade: f64,
    pub worst_trade: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyPerformance {
    pub total_return: f64,
    pub total_return_percent: f64,
    pub max_drawdown: f64,
    pub max_drawdown_percent: f64,
    pub mean_step_return: f64,
    pub step_return_std_dev: f64,
    pub sharpe_ratio: f64,
    pub win_rate: f64,
    pub open_lots: usize,
    pub sell: TradeStats,
    pub cover: TradeStats,
}

struct DrawdownInfo {
    max_drawdown: f64,
    max_drawdown_percent: f64,
}

pub struct PerformanceCalculator;

impl PerformanceCalculator {
    pub fn calculate_performance(result: &BacktestResult) -> StrategyPerformance {
        let total_return = result.final_portfolio_value - result.initial_capital;
        let total_return_percent = if result.initial_capital > 0.0 {
            total_return / result.initial_capital * 100.0
        } else {
            0.0
        };

        let returns = Self::step_returns(&result.portfolio_values);
        let (mean_step_return, step_return_std_dev) = if returns.len() >= 2 {
            (returns.iter().mean(), returns.iter().std_dev())
        } else {
            (returns.first().copied().unwrap_or(0.0), 0.0)
        };
        let drawdown = Self::calculate_max_drawdown(&result.portfolio_values);

        let realized: Vec<f64> = result
            .trades
            .iter()
            .filter_map(|trade| trade.realized_pnl)
            .collect();
        let win_rate = if realized.is_empty() {
            0.0
        } else {
            realized.iter().filter(|&&pnl| pnl > 0.0).count() as f64 / realized.len() as f64
        };

        StrategyPerformance {
            total_return,
            total_return_percent,
            max_drawdown: drawdown.max_drawdown,
            max_drawdown_percent: drawdown.max_drawdown_percent,
            mean_step_return,
            step_return_std_dev,
            sharpe_ratio: Self::calculate_sharpe_ratio(&returns),
            win_rate,
            open_lots: result.trades.iter().filter(|trade| trade.is_open()).count(),
            sell: Self::trade_stats(&result.trades, CloseKind::Sell),
            cover: Self::trade_stats(&result.trades, CloseKind::Cover),
        }
    }

    /// Totals over closed trades of one kind; all zeros when there are none.
    pub fn trade_stats(trades: &[TradeRecord], kind: CloseKind) -> TradeStats {
        let pnls: Vec<f64> = trades
            .iter()
            .filter(|trade| trade.action == TradeAction::ClosedByExit && trade.side == kind.side())
            .filter_map(|trade| trade.realized_pnl)
            .collect();

        if pnls.is_empty() {
            return TradeStats::default();
        }

        TradeStats {
            total_trades: pnls.len(),
            total_profit_loss: pnls.iter().sum(),
            best_trade: pnls.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            worst_trade: pnls.iter().copied().fold(f64::INFINITY, f64::min),
        }
    }

    fn step_returns(values: &[f64]) -> Vec<f64> {
        values
            .windows(2)
            .map(|window| {
                if window[0] > 0.0 {
                    (window[1] - window[0]) / window[0]
                } else {
                    0.0
                }
            })
            .collect()
    }

    fn calculate_sharpe_ratio(returns: &[f64]) -> f64 {
        if returns.len() < 2 {
            return 0.0;
        }

        let mean_return = returns.iter().mean();
        let std_dev = returns.iter().std_dev();
        if std_dev == 0.0 || !std_dev.is_finite() {
            return 0.0;
        }

        // Steps are treated as trading days
        let annualized_return = mean_return * 252.0;
        let annualized_volatility = std_dev * (252.0_f64).sqrt();
        let risk_free_rate = 0.02;

        (annualized_return - risk_free_rate) / annualized_volatility
    }

    fn calculate_max_drawdown(values: &[f64]) -> DrawdownInfo {
        let mut max_drawdown = 0.0;
        let mut max_drawdown_percent = 0.0;
        let Some(&first) = values.first() else {
            return DrawdownInfo {
                max_drawdown,
                max_drawdown_percent,
            };
        };

        let mut peak_value = first;
        for &value in values {
            if value > peak_value {
                peak_value = value;
                continue;
            }
            let drawdown = peak_value - value;
            let drawdown_percent = if peak_value > 0.0 {
                (drawdown / peak_value) * 100.0
            } else {
                0.0
            };
            if drawdown > max_drawdown {
                max_drawdown = drawdown;
            }
            if drawdown_percent > max_drawdown_percent {
                max_drawdown_percent = drawdown_percent;
            }
        }

        DrawdownInfo {
            max_drawdown,
            max_drawdown_percent,
        }
    }
}
