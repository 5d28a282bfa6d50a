use crate::error::BacktestError;
use crate::models::*;
use std::collections::HashMap;

/// Entry and exit decisions over the observed price history.
///
/// Both calls are pure: the history is ascending by step with the current price
/// last, and `open_lots` is a sorted read-only view of one side of the book.
pub trait Strategy {
    fn get_template_id(&self) -> &str;
    fn buying_strategy(&self, price_history: &[f64]) -> SignalAction;
    fn selling_strategy(&self, price_history: &[f64], open_lots: &[f64], side: Side) -> ExitRuns;
    fn get_min_data_points(&self) -> usize {
        0
    }
}

#[path = "strategies/buy_and_hold.rs"]
pub mod buy_and_hold;

pub use buy_and_hold::BuyAndHoldStrategy;

#[path = "strategies/rolling_mean.rs"]
pub mod rolling_mean;

pub use rolling_mean::RollingMeanStrategy;

pub const TEMPLATE_IDS: [&str; 2] = ["buy_and_hold", "rolling_mean"];

pub fn create_strategy(
    template_id: &str,
    parameters: HashMap<String, f64>,
) -> Result<Box<dyn Strategy + Send + Sync>, BacktestError> {
    match template_id {
        "buy_and_hold" => Ok(Box::new(BuyAndHoldStrategy::new(parameters))),
        "rolling_mean" => Ok(Box::new(RollingMeanStrategy::new(parameters))),
        _ => Err(BacktestError::UnknownStrategy(template_id.to_string())),
    }
}
