use lotbook::config::{EngineConfig, ShortSettlement};
use lotbook::engine::{clamp_exit_counts, Engine};
use lotbook::models::{BacktestResult, Side, SignalAction, TradeAction, TradeRecord};
use lotbook::price_source::{PriceSnapshot, PriceSource, SnapshotPriceSource};
use lotbook::session::{run_persisted, Session};
use lotbook::store::{MemoryStore, Store};
use lotbook::strategy::{create_strategy, BuyAndHoldStrategy, RollingMeanStrategy, Strategy};
use lotbook::strategy_utils::barbell_exit_runs;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

const SELL_HIGH: f64 = 1.04;
const SELL_LOW: f64 = 0.97;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn params(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), *value))
        .collect()
}

fn active_rolling_mean() -> RollingMeanStrategy {
    RollingMeanStrategy::new(params(&[
        ("windowLength", 3.0),
        ("buyPercent", 1.0),
        ("shortPercent", 1.0),
        ("sellHigh", SELL_HIGH),
        ("sellLow", SELL_LOW),
    ]))
}

fn random_walk(rng: &mut StdRng, len: usize) -> Vec<f64> {
    let mut price = 100.0;
    (0..len)
        .map(|_| {
            price *= 1.0 + rng.gen_range(-0.05..0.05);
            price
        })
        .collect()
}

fn is_sorted(prices: &[f64]) -> bool {
    prices.windows(2).all(|pair| pair[0] <= pair[1])
}

fn sorted_copy(mut prices: Vec<f64>) -> Vec<f64> {
    prices.sort_by(f64::total_cmp);
    prices
}

/// `initial + realized + unrealized`, plus the proceeds of every short ever
/// opened when shorts settle by price delta.
fn expected_value(
    initial_capital: f64,
    trades: &[TradeRecord],
    price: f64,
    settlement: ShortSettlement,
) -> f64 {
    let mut value = initial_capital;
    for trade in trades {
        value += match trade.realized_pnl {
            Some(pnl) => pnl,
            None => trade.side.realized_pnl(trade.entry_price, price),
        };
        if trade.side == Side::Short && settlement == ShortSettlement::PriceDelta {
            value += trade.entry_price;
        }
    }
    value
}

#[test]
fn test_buy_and_hold_scenario() {
    init_logger();
    let engine = Engine::new(EngineConfig::default().with_initial_capital(1000.0));
    let strategy = create_strategy("buy_and_hold", HashMap::new()).unwrap();
    let result = engine
        .backtest(strategy.as_ref(), &[100.0, 105.0, 102.0])
        .unwrap();

    let expected = [1000.0, 1005.0, 999.0];
    for (value, expected) in result.portfolio_values.iter().zip(expected) {
        assert!((value - expected).abs() < 1e-9);
    }
    assert!((result.final_snapshot.cash - 693.0).abs() < 1e-9);
    assert_eq!(result.final_snapshot.long_count, 3);
    assert!(result.trades.iter().all(TradeRecord::is_open));
    let opened: Vec<usize> = result.trades.iter().map(|t| t.opened_at_step).collect();
    assert_eq!(opened, vec![1, 2, 3]);
}

#[test]
fn test_rolling_mean_waits_for_history() {
    init_logger();
    let engine = Engine::new(EngineConfig::default().with_initial_capital(1000.0));
    let strategy = RollingMeanStrategy::new(params(&[("windowLength", 3.0), ("buyPercent", 1.0)]));
    let result = engine
        .backtest(&strategy, &[10.0, 10.0, 10.0, 15.0])
        .unwrap();

    let signals: Vec<SignalAction> = result.daily_snapshots.iter().map(|p| p.signal).collect();
    assert_eq!(
        signals,
        vec![
            SignalAction::Hold,
            SignalAction::Hold,
            SignalAction::Hold,
            SignalAction::Buy
        ]
    );
    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].entry_price, 15.0);
    assert_eq!(result.trades[0].opened_at_step, 4);
}

#[test]
fn test_buys_stop_when_cash_runs_out() {
    let engine = Engine::new(EngineConfig::default().with_initial_capital(250.0));
    let strategy = BuyAndHoldStrategy::new(HashMap::new());
    let result = engine
        .backtest(&strategy, &[100.0, 100.0, 100.0, 100.0])
        .unwrap();

    let missed: Vec<bool> = result
        .daily_snapshots
        .iter()
        .map(|p| p.missed_entry_due_to_cash)
        .collect();
    assert_eq!(missed, vec![false, false, true, true]);
    assert_eq!(result.final_snapshot.long_count, 2);
    assert!((result.final_snapshot.cash - 50.0).abs() < 1e-9);
    assert!(result.portfolio_values.iter().all(|v| (v - 250.0).abs() < 1e-9));
}

#[test]
fn test_aborted_run_is_partial() {
    let engine = Engine::new(EngineConfig::default());
    let strategy = BuyAndHoldStrategy::new(HashMap::new());
    let abort = AtomicBool::new(false);
    abort.store(true, Ordering::Relaxed);
    let result = engine
        .backtest_with_abort(&strategy, &[10.0, 11.0, 12.0], &abort)
        .unwrap();
    assert!(!result.completed);
    assert_eq!(result.steps(), 0);
    assert_eq!(result.final_portfolio_value, result.initial_capital);
}

fn check_random_run(seed: u64, settlement: ShortSettlement) {
    let mut rng = StdRng::seed_from_u64(seed);
    let prices = random_walk(&mut rng, 300);
    let initial_capital = 2_000.0;
    let engine = Engine::new(
        EngineConfig::default()
            .with_initial_capital(initial_capital)
            .with_short_settlement(settlement),
    );
    let strategy = active_rolling_mean();
    let mut simulation = engine.simulation(&strategy);

    for &price in &prices {
        let before: HashMap<Side, Vec<f64>> = Side::ALL
            .iter()
            .map(|&side| (side, simulation.book(side).snapshot()))
            .collect();

        let report = simulation.step(price).unwrap();

        for side in Side::ALL {
            let lots = &before[&side];
            let runs = barbell_exit_runs(price, lots, side, SELL_HIGH, SELL_LOW);
            let (front, back) = clamp_exit_counts(&runs, lots.len());
            let mut expected: Vec<f64> = runs.front[..front].to_vec();
            expected.extend_from_slice(&runs.back[..back]);

            let closed: Vec<f64> = report
                .closed
                .iter()
                .filter(|record| record.side == side)
                .map(|record| record.entry_price)
                .collect();
            assert_eq!(sorted_copy(closed), sorted_copy(expected));

            let book = simulation.book(side);
            assert!(is_sorted(book.as_slice()));
            assert_eq!(book.len(), simulation.ledger().open_count(side));
        }

        for record in &report.closed {
            assert_eq!(record.closed_at_step, Some(report.step));
            assert_eq!(record.closing_price, Some(price));
            let pnl = record.side.realized_pnl(record.entry_price, price);
            assert!((record.realized_pnl.unwrap_or(f64::NAN) - pnl).abs() < 1e-9);
        }

        let expected = expected_value(
            initial_capital,
            simulation.ledger().all_records(),
            price,
            settlement,
        );
        assert!(
            (report.portfolio_value - expected).abs() < 1e-6,
            "seed {} step {}: value {} != {}",
            seed,
            report.step,
            report.portfolio_value,
            expected
        );
    }

    assert_eq!(simulation.ledger().unmatched_closes(), 0);
    let result = simulation.finish(true);
    assert_eq!(result.portfolio_values.len(), prices.len());

    let ids: HashSet<u64> = result.trades.iter().map(|t| t.id).collect();
    assert_eq!(ids.len(), result.trades.len());
    let closed = result
        .trades
        .iter()
        .filter(|t| t.action == TradeAction::ClosedByExit)
        .count();
    assert!(closed > 0, "seed {} never closed a lot", seed);
}

#[test]
fn test_random_walks_keep_books_and_ledger_consistent() {
    init_logger();
    for seed in [7, 42, 1234] {
        check_random_run(seed, ShortSettlement::PriceDelta);
        check_random_run(seed, ShortSettlement::BuyToCover);
    }
}

#[test]
fn test_comparison_runs_are_independent() {
    let mut rng = StdRng::seed_from_u64(99);
    let prices = random_walk(&mut rng, 120);
    let engine = Engine::new(EngineConfig::default().with_initial_capital(10_000.0));
    let results = lotbook::commands::compare::compare_in_memory(
        &engine,
        &params(&[("windowLength", 5.0)]),
        &prices,
    )
    .unwrap();

    let baseline: BacktestResult = engine
        .backtest(&BuyAndHoldStrategy::new(HashMap::new()), &prices)
        .unwrap();
    assert_eq!(results[0].portfolio_values, baseline.portfolio_values);
    assert_eq!(results[1].template_id, "rolling_mean");
    assert_eq!(results[1].steps(), prices.len());
}

#[tokio::test]
async fn test_session_persists_every_step() {
    init_logger();
    let mut rng = StdRng::seed_from_u64(5);
    let prices = random_walk(&mut rng, 80);
    let engine = Engine::new(EngineConfig::default().with_initial_capital(5_000.0));
    let strategy = active_rolling_mean();

    let mut session = Session::start(&engine, &strategy, MemoryStore::new())
        .await
        .unwrap();
    for &price in &prices {
        session.step(price).await.unwrap();
        for side in Side::ALL {
            let stored = session.store().load_positions(side).await.unwrap();
            assert_eq!(stored.as_slice(), session.simulation().book(side).as_slice());
        }
    }
    let (result, store) = session.finish(true).await.unwrap();
    assert_eq!(store.load_trades().await.unwrap(), result.trades);

    let plain = engine.backtest(&strategy, &prices).unwrap();
    assert_eq!(plain.portfolio_values, result.portfolio_values);
}

#[tokio::test]
async fn test_snapshot_prices_drive_a_persisted_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("aapl.bin");
    PriceSnapshot::new("AAPL", vec![100.0, 105.0, 102.0, 98.0])
        .save_to_file(&path)
        .unwrap();

    let prices = SnapshotPriceSource::new(&path)
        .fetch("AAPL", 3)
        .await
        .unwrap();
    assert_eq!(prices, vec![100.0, 105.0, 102.0]);

    let engine = Engine::new(EngineConfig::default().with_initial_capital(1000.0));
    let strategy = BuyAndHoldStrategy::new(HashMap::new());
    let (result, store) = run_persisted(&engine, &strategy, &prices, MemoryStore::new())
        .await
        .unwrap();
    assert!((result.final_portfolio_value - 999.0).abs() < 1e-9);
    let holdings = store.holdings(Side::Long).cloned().unwrap();
    assert_eq!(holdings.prices, vec![100.0, 102.0, 105.0]);
    assert_eq!(strategy.get_template_id(), result.template_id);
}
