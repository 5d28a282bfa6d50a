use super::RunSummary;
use crate::context::AppContext;
use crate::engine::Engine;
use crate::models::BacktestResult;
use crate::param_utils::parse_param_pairs;
use crate::session::run_persisted;
use crate::store::MemoryStore;
use crate::strategy::create_strategy;
use anyhow::{Context, Result};
use log::info;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub template_id: String,
    pub symbol: String,
    pub lookback: usize,
    pub data_file: Option<PathBuf>,
    pub initial_capital: Option<f64>,
    pub params: Vec<String>,
    pub persist: bool,
}

pub async fn run(app: &AppContext, options: RunOptions) -> Result<()> {
    let parameters = parse_param_pairs(&options.params)?;
    let engine = Engine::new(app.engine_config(options.initial_capital, &parameters)?);
    let prices = app
        .load_prices(&options.symbol, options.lookback, options.data_file.as_deref())
        .await?;
    let strategy = create_strategy(&options.template_id, parameters)?;

    let (result, run_id) = if options.persist {
        let run_id = Uuid::new_v4();
        let store = app.postgres_store(run_id).await?;
        info!("Persisting run {} to PostgreSQL", run_id);
        let (result, _) = run_persisted(&engine, strategy.as_ref(), &prices, store).await?;
        (result, Some(run_id.to_string()))
    } else {
        let (result, _) =
            run_persisted(&engine, strategy.as_ref(), &prices, MemoryStore::new()).await?;
        (result, None)
    };

    log_result(&options.symbol, &result);
    let summary = RunSummary::from_result(&result, run_id);
    println!(
        "{}",
        serde_json::to_string_pretty(&summary).context("failed to encode run summary")?
    );
    Ok(())
}

fn log_result(symbol: &str, result: &BacktestResult) {
    let snapshot = &result.final_snapshot;
    info!(
        "{} on {}: total funds {:.2}, buy holdings value {:.2} ({} lots), short holdings value {:.2} ({} lots)",
        result.template_id,
        symbol,
        result.final_portfolio_value,
        snapshot.long_value,
        snapshot.long_count,
        snapshot.short_value,
        snapshot.short_count
    );
}
