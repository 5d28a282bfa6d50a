use crate::config::{EngineConfig, ShortSettlement};
use crate::error::BacktestError;
use crate::ledger::TradeLedger;
use crate::models::*;
use crate::position_book::PositionBook;
use crate::strategy::Strategy;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};

/// Mutable per-run state owned by a [`Simulation`].
#[derive(Debug, Clone)]
pub struct EngineState {
    pub step: usize,
    pub cash: f64,
    pub price_history: Vec<f64>,
    pub portfolio_values: Vec<f64>,
}

impl EngineState {
    fn new(initial_capital: f64) -> Self {
        Self {
            step: 0,
            cash: initial_capital,
            price_history: Vec::new(),
            portfolio_values: Vec::new(),
        }
    }
}

/// Everything that happened during one step, in the order it happened.
#[derive(Debug, Clone)]
pub struct StepReport {
    pub step: usize,
    pub price: f64,
    pub closed: Vec<TradeRecord>,
    pub signal: SignalAction,
    pub opened: Option<TradeRecord>,
    pub missed_entry_due_to_cash: bool,
    pub realized_pnl: f64,
    pub portfolio_value: f64,
}

pub struct Engine {
    pub config: EngineConfig,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Reject the whole series before any step runs.
    pub fn validate_prices(prices: &[f64]) -> Result<(), BacktestError> {
        if prices.is_empty() {
            return Err(BacktestError::EmptyPriceSeries);
        }
        match prices
            .iter()
            .position(|&price| !Self::price_is_valid(price))
        {
            Some(index) => Err(BacktestError::InvalidPrice {
                step: index + 1,
                value: prices[index],
            }),
            None => Ok(()),
        }
    }

    fn price_is_valid(price: f64) -> bool {
        price.is_finite() && price > 0.0
    }

    pub fn simulation<'s>(&self, strategy: &'s dyn Strategy) -> Simulation<'s> {
        Simulation::new(strategy, self.config.clone())
    }

    pub fn backtest(
        &self,
        strategy: &dyn Strategy,
        prices: &[f64],
    ) -> Result<BacktestResult, BacktestError> {
        let never = AtomicBool::new(false);
        self.backtest_with_abort(strategy, prices, &never)
    }

    /// Run until the prices are exhausted or `abort` is raised. An aborted run
    /// returns the steps completed so far with `completed == false`.
    pub fn backtest_with_abort(
        &self,
        strategy: &dyn Strategy,
        prices: &[f64],
        abort: &AtomicBool,
    ) -> Result<BacktestResult, BacktestError> {
        Self::validate_prices(prices)?;

        info!(
            "Backtesting {} over {} prices with initial capital {:.2}",
            strategy.get_template_id(),
            prices.len(),
            self.config.initial_capital
        );

        let mut simulation = self.simulation(strategy);
        for &price in prices {
            if abort.load(Ordering::Relaxed) {
                warn!(
                    "Backtest of {} aborted after {} of {} steps",
                    strategy.get_template_id(),
                    simulation.state().step,
                    prices.len()
                );
                return Ok(simulation.finish(false));
            }
            simulation.step(price)?;
        }

        let result = simulation.finish(true);
        info!(
            "Backtest of {} finished: final value {:.2}, {} trade record(s)",
            result.template_id,
            result.final_portfolio_value,
            result.trades.len()
        );
        Ok(result)
    }
}

/// One run of a strategy over a price sequence, advanced a step at a time.
pub struct Simulation<'s> {
    strategy: &'s dyn Strategy,
    config: EngineConfig,
    state: EngineState,
    long_book: PositionBook,
    short_book: PositionBook,
    ledger: TradeLedger,
    daily_snapshots: Vec<BacktestDataPoint>,
}

impl<'s> Simulation<'s> {
    pub fn new(strategy: &'s dyn Strategy, config: EngineConfig) -> Self {
        let state = EngineState::new(config.initial_capital);
        Self {
            strategy,
            config,
            state,
            long_book: PositionBook::new(),
            short_book: PositionBook::new(),
            ledger: TradeLedger::new(),
            daily_snapshots: Vec::new(),
        }
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn book(&self, side: Side) -> &PositionBook {
        match side {
            Side::Long => &self.long_book,
            Side::Short => &self.short_book,
        }
    }

    pub fn ledger(&self) -> &TradeLedger {
        &self.ledger
    }

    /// Consume one price: exits on both sides, at most one entry, then mark to
    /// market. An invalid price leaves the simulation untouched.
    pub fn step(&mut self, price: f64) -> Result<StepReport, BacktestError> {
        if !Engine::price_is_valid(price) {
            return Err(BacktestError::InvalidPrice {
                step: self.state.step + 1,
                value: price,
            });
        }

        self.state.price_history.push(price);
        self.state.step += 1;
        let step = self.state.step;

        let mut closed = Vec::new();
        let mut realized_pnl = 0.0;
        for side in Side::ALL {
            realized_pnl += self.exit_side(side, price, step, &mut closed);
        }

        let signal = self.strategy.buying_strategy(&self.state.price_history);
        let (opened, missed_entry_due_to_cash) = self.enter(signal, price, step);

        let portfolio_value = self.mark_to_market(price);
        self.state.portfolio_values.push(portfolio_value);
        self.daily_snapshots.push(BacktestDataPoint {
            step,
            price,
            portfolio_value,
            cash: self.state.cash,
            long_count: self.long_book.len(),
            short_count: self.short_book.len(),
            realized_pnl,
            signal,
            missed_entry_due_to_cash,
        });

        debug!(
            "step {} price {:.4}: closed {}, signal {}, value {:.2}",
            step,
            price,
            closed.len(),
            signal.as_str(),
            portfolio_value
        );

        Ok(StepReport {
            step,
            price,
            closed,
            signal,
            opened,
            missed_entry_due_to_cash,
            realized_pnl,
            portfolio_value,
        })
    }

    fn exit_side(
        &mut self,
        side: Side,
        price: f64,
        step: usize,
        closed: &mut Vec<TradeRecord>,
    ) -> f64 {
        let book = match side {
            Side::Long => &mut self.long_book,
            Side::Short => &mut self.short_book,
        };
        if book.is_empty() {
            return 0.0;
        }

        let snapshot = book.snapshot();
        let runs = self
            .strategy
            .selling_strategy(&self.state.price_history, &snapshot, side);
        if runs.is_empty() {
            return 0.0;
        }

        let (front_count, back_count) = clamp_exit_counts(&runs, snapshot.len());
        if front_count + back_count < runs.front.len() + runs.back.len() {
            warn!(
                "Step {}: {} exit runs ({} front, {} back) exceed {} open lots; clamped to {} + {}",
                step,
                side,
                runs.front.len(),
                runs.back.len(),
                snapshot.len(),
                front_count,
                back_count
            );
        }

        let mut exiting = book.remove_prefix(front_count);
        exiting.extend(book.remove_suffix(back_count));

        let mut realized = 0.0;
        for entry_price in exiting {
            let pnl = side.realized_pnl(entry_price, price);
            self.state.cash += match (side, self.config.short_settlement) {
                (Side::Long, _) => price,
                (Side::Short, ShortSettlement::PriceDelta) => entry_price - price,
                (Side::Short, ShortSettlement::BuyToCover) => -price,
            };
            realized += pnl;
            if let Some(record) = self.ledger.record_close(entry_price, side, step, price, pnl) {
                closed.push(record.clone());
            }
        }
        realized
    }

    fn enter(&mut self, signal: SignalAction, price: f64, step: usize) -> (Option<TradeRecord>, bool) {
        let side = match signal {
            SignalAction::Buy if self.state.cash < price => {
                debug!(
                    "Step {}: buy at {:.4} skipped, cash {:.2} is insufficient",
                    step, price, self.state.cash
                );
                return (None, true);
            }
            SignalAction::Buy => {
                self.state.cash -= price;
                self.long_book.insert(price);
                Side::Long
            }
            SignalAction::Short => {
                self.state.cash += price;
                self.short_book.insert(price);
                Side::Short
            }
            SignalAction::Hold => return (None, false),
        };

        let record = self.ledger.record_open(Lot {
            entry_price: price,
            side,
            opened_at_step: step,
        });
        (Some(record.clone()), false)
    }

    fn mark_to_market(&self, price: f64) -> f64 {
        let snapshot = self.snapshot_at(price);
        let short_liability = match self.config.short_settlement {
            ShortSettlement::PriceDelta => 0.0,
            ShortSettlement::BuyToCover => self.short_book.total_entry_value(),
        };
        snapshot.cash + snapshot.long_value + snapshot.short_value - short_liability
    }

    fn snapshot_at(&self, price: f64) -> PortfolioSnapshot {
        let long_count = self.long_book.len();
        let short_count = self.short_book.len();
        let short_value = self
            .short_book
            .mean_entry_price()
            .map(|mean| (mean - price) * short_count as f64)
            .unwrap_or(0.0);
        PortfolioSnapshot {
            cash: self.state.cash,
            long_count,
            long_value: long_count as f64 * price,
            short_count,
            short_value,
        }
    }

    /// Holdings marked at the latest observed price.
    pub fn snapshot(&self) -> PortfolioSnapshot {
        let price = self.state.price_history.last().copied().unwrap_or(0.0);
        self.snapshot_at(price)
    }

    pub fn finish(self, completed: bool) -> BacktestResult {
        let final_snapshot = self.snapshot();
        let final_portfolio_value = self
            .state
            .portfolio_values
            .last()
            .copied()
            .unwrap_or(self.config.initial_capital);
        BacktestResult {
            template_id: self.strategy.get_template_id().to_string(),
            initial_capital: self.config.initial_capital,
            final_portfolio_value,
            portfolio_values: self.state.portfolio_values,
            daily_snapshots: self.daily_snapshots,
            final_snapshot,
            trades: self.ledger.into_records(),
            completed,
        }
    }
}

/// Front and back counts that together never exceed the book; the back run
/// gives way when both runs claim the same lots.
pub fn clamp_exit_counts(runs: &ExitRuns, book_len: usize) -> (usize, usize) {
    let front_count = runs.front.len().min(book_len);
    let back_count = runs.back.len().min(book_len - front_count);
    (front_count, back_count)
}
