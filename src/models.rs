use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub const ALL: [Side; 2] = [Side::Long, Side::Short];

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "long",
            Side::Short => "short",
        }
    }

    /// Profit booked when a lot opened at `entry_price` is closed at `closing_price`.
    pub fn realized_pnl(&self, entry_price: f64, closing_price: f64) -> f64 {
        match self {
            Side::Long => closing_price - entry_price,
            Side::Short => entry_price - closing_price,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "long" | "buy" => Ok(Side::Long),
            "short" => Ok(Side::Short),
            other => Err(anyhow!("Unknown position side '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SignalAction {
    Buy,
    Short,
    Hold,
}

impl SignalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalAction::Buy => "buy",
            SignalAction::Short => "short",
            SignalAction::Hold => "hold",
        }
    }
}

impl FromStr for SignalAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "buy" => Ok(SignalAction::Buy),
            "short" => Ok(SignalAction::Short),
            "hold" => Ok(SignalAction::Hold),
            other => Err(anyhow!("Unknown signal action '{}'", other)),
        }
    }
}

/// Lots a strategy wants closed on one side: a leading run of the sorted book
/// (`front`) and a trailing run (`back`, listed from the highest price down).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExitRuns {
    pub front: Vec<f64>,
    pub back: Vec<f64>,
}

impl ExitRuns {
    pub fn is_empty(&self) -> bool {
        self.front.is_empty() && self.back.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TradeAction {
    Open,
    ClosedByExit,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Open => "open",
            TradeAction::ClosedByExit => "closed_by_exit",
        }
    }
}

impl FromStr for TradeAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "open" => Ok(TradeAction::Open),
            "closed_by_exit" | "closed" => Ok(TradeAction::ClosedByExit),
            other => Err(anyhow!("Unknown trade action '{}'", other)),
        }
    }
}

/// An open position unit as handed to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lot {
    pub entry_price: f64,
    pub side: Side,
    pub opened_at_step: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: u64,
    pub entry_price: f64,
    pub side: Side,
    pub opened_at_step: usize,
    pub action: TradeAction,
    pub closed_at_step: Option<usize>,
    pub closing_price: Option<f64>,
    pub realized_pnl: Option<f64>,
}

impl TradeRecord {
    pub fn is_open(&self) -> bool {
        self.action == TradeAction::Open
    }
}

/// Closing fields written once when a lot leaves the book.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeClose {
    pub closed_at_step: usize,
    pub closing_price: f64,
    pub realized_pnl: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestDataPoint {
    pub step: usize,
    pub price: f64,
    pub portfolio_value: f64,
    pub cash: f64,
    pub long_count: usize,
    pub short_count: usize,
    pub realized_pnl: f64,
    pub signal: SignalAction,
    pub missed_entry_due_to_cash: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub cash: f64,
    pub long_count: usize,
    pub long_value: f64,
    pub short_count: usize,
    pub short_value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub template_id: String,
    pub initial_capital: f64,
    pub final_portfolio_value: f64,
    pub portfolio_values: Vec<f64>,
    pub daily_snapshots: Vec<BacktestDataPoint>,
    pub final_snapshot: PortfolioSnapshot,
    pub trades: Vec<TradeRecord>,
    pub completed: bool,
}

impl BacktestResult {
    pub fn steps(&self) -> usize {
        self.portfolio_values.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_realized_pnl_sign_by_side() {
        assert_eq!(Side::Long.realized_pnl(100.0, 110.0), 10.0);
        assert_eq!(Side::Short.realized_pnl(100.0, 110.0), -10.0);
    }

    #[test]
    fn test_parse_side_and_signal() {
        assert_eq!("Buy".parse::<Side>().unwrap(), Side::Long);
        assert_eq!(" short ".parse::<SignalAction>().unwrap(), SignalAction::Short);
        assert!("cover".parse::<SignalAction>().is_err());
        assert_eq!(
            "closed".parse::<TradeAction>().unwrap(),
            TradeAction::ClosedByExit
        );
    }
}
