use super::RunSummary;
use crate::context::AppContext;
use crate::engine::Engine;
use crate::error::BacktestError;
use crate::models::BacktestResult;
use crate::param_utils::parse_param_pairs;
use crate::session::run_persisted;
use crate::strategy::{create_strategy, TEMPLATE_IDS};
use anyhow::{Context, Result};
use futures::future::try_join_all;
use log::info;
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CompareOptions {
    pub symbol: String,
    pub lookback: usize,
    pub data_file: Option<PathBuf>,
    pub initial_capital: Option<f64>,
    pub params: Vec<String>,
    pub persist: bool,
}

/// Run every known template over the same prices and report them side by side.
pub async fn run(app: &AppContext, options: CompareOptions) -> Result<()> {
    let parameters = parse_param_pairs(&options.params)?;
    let engine = Engine::new(app.engine_config(options.initial_capital, &parameters)?);
    let prices = app
        .load_prices(&options.symbol, options.lookback, options.data_file.as_deref())
        .await?;

    let summaries = if options.persist {
        compare_persisted(app, &engine, &parameters, &prices).await?
    } else {
        compare_in_memory(&engine, &parameters, &prices)?
            .iter()
            .map(|result| RunSummary::from_result(result, None))
            .collect()
    };

    for summary in &summaries {
        info!(
            "{}: final value {:.2} ({:+.2}%), {} sells, {} covers",
            summary.template_id,
            summary.final_portfolio_value,
            summary.performance.total_return_percent,
            summary.performance.sell.total_trades,
            summary.performance.cover.total_trades
        );
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&summaries).context("failed to encode comparison")?
    );
    Ok(())
}

/// Backtests of every template, run in parallel and returned in
/// `TEMPLATE_IDS` order.
pub fn compare_in_memory(
    engine: &Engine,
    parameters: &HashMap<String, f64>,
    prices: &[f64],
) -> Result<Vec<BacktestResult>, BacktestError> {
    TEMPLATE_IDS
        .par_iter()
        .map(|template_id| {
            let strategy = create_strategy(template_id, parameters.clone())?;
            engine.backtest(strategy.as_ref(), prices)
        })
        .collect()
}

async fn compare_persisted(
    app: &AppContext,
    engine: &Engine,
    parameters: &HashMap<String, f64>,
    prices: &[f64],
) -> Result<Vec<RunSummary>> {
    let runs = TEMPLATE_IDS.iter().map(|template_id| async move {
        let strategy = create_strategy(template_id, parameters.clone())?;
        let run_id = Uuid::new_v4();
        let store = app.postgres_store(run_id).await?;
        info!("Persisting {} as run {}", template_id, run_id);
        let (result, _) = run_persisted(engine, strategy.as_ref(), prices, store).await?;
        Ok::<_, anyhow::Error>(RunSummary::from_result(&result, Some(run_id.to_string())))
    });
    try_join_all(runs).await
}
