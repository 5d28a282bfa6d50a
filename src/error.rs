use thiserror::Error;

/// Errors that abort a backtest run.
///
/// Exit-run overlap, unmatched ledger closes and buys without enough cash are
/// not errors; the engine recovers from them inside the step.
#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("price series is empty")]
    EmptyPriceSeries,

    /// A price that is not a positive finite number; `step` is 1-based.
    #[error("invalid price {value} at step {step}: prices must be positive and finite")]
    InvalidPrice { step: usize, value: f64 },

    #[error("unknown strategy template: {0}")]
    UnknownStrategy(String),

    /// Failure reported by a price source or persistence adapter.
    #[error("collaborator failure: {0:#}")]
    Collaborator(#[from] anyhow::Error),
}
