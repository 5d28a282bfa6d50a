use crate::models::*;
use crate::param_utils::{get_param_f64_positive, get_usize_param_min};
use crate::strategy_utils::{barbell_exit_runs, trailing_mean};
use std::collections::HashMap;

/// Mean-reversion breakout: buy when the price clears the rolling mean by
/// `buy_percent`, short when it falls under `short_percent` of it.
pub struct RollingMeanStrategy {
    pub template_id: String,
    buy_percent: f64,
    short_percent: f64,
    window_length: usize,
    sell_high: f64,
    sell_low: f64,
}

impl RollingMeanStrategy {
    pub fn new(parameters: HashMap<String, f64>) -> Self {
        let buy_percent = get_param_f64_positive(&parameters, "buyPercent", 1.03);
        let short_percent = get_param_f64_positive(&parameters, "shortPercent", 0.90);
        let window_length = get_usize_param_min(&parameters, "windowLength", 50, 1);
        let sell_high = get_param_f64_positive(&parameters, "sellHigh", 2.50);
        let sell_low = get_param_f64_positive(&parameters, "sellLow", 0.90);
        Self {
            template_id: "rolling_mean".to_string(),
            buy_percent,
            short_percent,
            window_length,
            sell_high,
            sell_low,
        }
    }
}

impl super::Strategy for RollingMeanStrategy {
    fn get_template_id(&self) -> &str {
        &self.template_id
    }

    fn buying_strategy(&self, price_history: &[f64]) -> SignalAction {
        let Some(&price) = price_history.last() else {
            return SignalAction::Hold;
        };
        let Some(mean) = trailing_mean(price_history, self.window_length) else {
            return SignalAction::Hold;
        };

        if price > self.buy_percent * mean {
            SignalAction::Buy
        } else if price < self.short_percent * mean {
            SignalAction::Short
        } else {
            SignalAction::Hold
        }
    }

    fn selling_strategy(&self, price_history: &[f64], open_lots: &[f64], side: Side) -> ExitRuns {
        match price_history.last() {
            Some(&price) => barbell_exit_runs(price, open_lots, side, self.sell_high, self.sell_low),
            None => ExitRuns::default(),
        }
    }

    fn get_min_data_points(&self) -> usize {
        self.window_length
    }
}
