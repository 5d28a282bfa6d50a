pub mod compare;
pub mod export_prices;
pub mod run;
pub mod stats;

use crate::models::{BacktestResult, PortfolioSnapshot};
use crate::performance::{PerformanceCalculator, StrategyPerformance};
use serde::Serialize;

/// What the CLI prints for a finished backtest.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub template_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub steps: usize,
    pub completed: bool,
    pub initial_capital: f64,
    pub final_portfolio_value: f64,
    pub final_snapshot: PortfolioSnapshot,
    pub trade_records: usize,
    pub performance: StrategyPerformance,
}

impl RunSummary {
    pub fn from_result(result: &BacktestResult, run_id: Option<String>) -> Self {
        Self {
            template_id: result.template_id.clone(),
            run_id,
            steps: result.steps(),
            completed: result.completed,
            initial_capital: result.initial_capital,
            final_portfolio_value: result.final_portfolio_value,
            final_snapshot: result.final_snapshot,
            trade_records: result.trades.len(),
            performance: PerformanceCalculator::calculate_performance(result),
        }
    }
}
