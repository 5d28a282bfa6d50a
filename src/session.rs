use crate::engine::{Engine, Simulation, StepReport};
use crate::error::BacktestError;
use crate::models::*;
use crate::store::Store;
use crate::strategy::Strategy;
use anyhow::{anyhow, Context};
use log::{info, warn};

/// A simulation whose book and trade records are mirrored into a [`Store`]
/// after every step.
pub struct Session<'s, S: Store> {
    simulation: Simulation<'s>,
    store: S,
}

impl<'s, S: Store> Session<'s, S> {
    /// Clears whatever the store holds for this run and starts a fresh
    /// simulation.
    pub async fn start(
        engine: &Engine,
        strategy: &'s dyn Strategy,
        mut store: S,
    ) -> Result<Self, BacktestError> {
        store
            .reset()
            .await
            .context("failed to reset position store")?;
        Ok(Self {
            simulation: engine.simulation(strategy),
            store,
        })
    }

    pub fn simulation(&self) -> &Simulation<'s> {
        &self.simulation
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn step(&mut self, price: f64) -> Result<StepReport, BacktestError> {
        let report = self.simulation.step(price)?;
        self.persist(&report)
            .await
            .with_context(|| format!("failed to persist step {}", report.step))?;
        Ok(report)
    }

    async fn persist(&mut self, report: &StepReport) -> anyhow::Result<()> {
        for record in &report.closed {
            let close = TradeClose {
                closed_at_step: record.closed_at_step.unwrap_or(report.step),
                closing_price: record.closing_price.unwrap_or(report.price),
                realized_pnl: record.realized_pnl.unwrap_or(0.0),
            };
            self.store.update_trade(record.id, &close).await?;
        }
        if let Some(record) = &report.opened {
            self.store.append_trade(record).await?;
        }

        let snapshot = self.simulation.snapshot();
        for side in Side::ALL {
            let value = match side {
                Side::Long => snapshot.long_value,
                Side::Short => snapshot.short_value,
            };
            let book = self.simulation.book(side);
            self.store
                .save_positions(side, book.as_slice(), book.len(), value)
                .await?;
        }
        Ok(())
    }

    /// Compare the persisted books against the in-memory ones, then hand back
    /// the result and the store.
    pub async fn finish(self, completed: bool) -> Result<(BacktestResult, S), BacktestError> {
        for side in Side::ALL {
            let stored = self
                .store
                .load_positions(side)
                .await
                .with_context(|| format!("failed to load {} positions", side))?;
            let book = self.simulation.book(side);
            if stored.as_slice() != book.as_slice() {
                return Err(BacktestError::Collaborator(anyhow!(
                    "stored {} positions ({} lots) diverged from the book ({} lots)",
                    side,
                    stored.len(),
                    book.len()
                )));
            }
        }
        let unmatched = self.simulation.ledger().unmatched_closes();
        if unmatched > 0 {
            warn!("{} close(s) had no open trade record", unmatched);
        }
        Ok((self.simulation.finish(completed), self.store))
    }
}

/// Backtest with every step persisted. The series is validated before the
/// store is touched.
pub async fn run_persisted<S: Store>(
    engine: &Engine,
    strategy: &dyn Strategy,
    prices: &[f64],
    store: S,
) -> Result<(BacktestResult, S), BacktestError> {
    Engine::validate_prices(prices)?;
    info!(
        "Running {} over {} prices with persistence",
        strategy.get_template_id(),
        prices.len()
    );

    let mut session = Session::start(engine, strategy, store).await?;
    for &price in prices {
        session.step(price).await?;
    }
    session.finish(true).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::store::MemoryStore;
    use crate::strategy::{BuyAndHoldStrategy, RollingMeanStrategy};
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_persisted_run_matches_plain_backtest() {
        let engine = Engine::new(EngineConfig::default().with_initial_capital(1000.0));
        let params: HashMap<String, f64> = [
            ("windowLength".to_string(), 2.0),
            ("sellHigh".to_string(), 1.1),
            ("sellLow".to_string(), 0.95),
        ]
        .into_iter()
        .collect();
        let strategy = RollingMeanStrategy::new(params);
        let prices = [100.0, 110.0, 125.0, 90.0, 70.0, 95.0, 120.0];

        let plain = engine.backtest(&strategy, &prices).unwrap();
        let (persisted, store) = run_persisted(&engine, &strategy, &prices, MemoryStore::new())
            .await
            .unwrap();

        assert_eq!(plain.portfolio_values, persisted.portfolio_values);
        assert_eq!(store.trades(), persisted.trades.as_slice());
        assert!(persisted.completed);
    }

    #[tokio::test]
    async fn test_store_mirrors_holdings_each_step() {
        let engine = Engine::new(EngineConfig::default().with_initial_capital(1000.0));
        let strategy = BuyAndHoldStrategy::new(HashMap::new());
        let mut session = Session::start(&engine, &strategy, MemoryStore::new())
            .await
            .unwrap();

        session.step(300.0).await.unwrap();
        session.step(310.0).await.unwrap();
        let holdings = session.store().holdings(Side::Long).cloned().unwrap();
        assert_eq!(holdings.prices, vec![300.0, 310.0]);
        assert_eq!(holdings.count, 2);
        assert!((holdings.total_value - 620.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_invalid_series_leaves_store_untouched() {
        let engine = Engine::new(EngineConfig::default());
        let strategy = BuyAndHoldStrategy::new(HashMap::new());
        let err = run_persisted(&engine, &strategy, &[10.0, f64::NAN], MemoryStore::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BacktestError::InvalidPrice { step: 2, .. }));
    }
}
