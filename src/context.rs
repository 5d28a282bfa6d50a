use crate::config::{resolve_backtest_initial_capital, EngineConfig, RuntimeSettings};
use crate::price_source::{HttpPriceSource, PriceSource, SnapshotPriceSource};
use crate::retry::retry_collaborator_call;
use crate::store::PostgresStore;
use anyhow::{anyhow, Result};
use log::info;
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

/// Process-wide settings plus constructors for the collaborators commands need.
#[derive(Clone, Debug)]
pub struct AppContext {
    settings: RuntimeSettings,
}

impl AppContext {
    pub fn initialize(settings: RuntimeSettings) -> Self {
        Self { settings }
    }

    /// Engine config from strategy parameters, with the CLI capital and the
    /// environment layered on top.
    pub fn engine_config(
        &self,
        cli_initial_capital: Option<f64>,
        parameters: &HashMap<String, f64>,
    ) -> Result<EngineConfig> {
        let mut config = EngineConfig::from_parameters(parameters)?;
        if !parameters.contains_key("initialCapital") || cli_initial_capital.is_some() {
            config = config.with_initial_capital(resolve_backtest_initial_capital(
                cli_initial_capital,
                &self.settings,
            )?);
        }
        if !parameters.contains_key("shortSettlement") {
            if let Some(short_settlement) = self.settings.short_settlement {
                config = config.with_short_settlement(short_settlement);
            }
        }
        Ok(config)
    }

    pub async fn postgres_store(&self, run_id: Uuid) -> Result<PostgresStore> {
        let Some(database_url) = self.settings.database_url.as_deref() else {
            return Err(anyhow!(
                "DATABASE_URL must be set to persist positions and trades."
            ));
        };
        retry_collaborator_call!(
            format!("connect store for run {}", run_id),
            PostgresStore::connect(database_url, run_id)
        )
    }

    pub fn http_price_source(&self) -> Result<HttpPriceSource> {
        HttpPriceSource::new(self.settings.price_source_url.as_deref())
    }

    /// Prices from a snapshot file when one is given, otherwise from the
    /// HTTP chart endpoint.
    pub async fn load_prices(
        &self,
        symbol: &str,
        lookback: usize,
        data_file: Option<&Path>,
    ) -> Result<Vec<f64>> {
        let prices = match data_file {
            Some(path) => {
                info!("Reading {} prices from {}", symbol, path.display());
                SnapshotPriceSource::new(path).fetch(symbol, lookback).await?
            }
            None => {
                let source = self.http_price_source()?;
                retry_collaborator_call!(
                    format!("fetch {} prices", symbol),
                    source.fetch(symbol, lookback)
                )?
            }
        };
        if prices.is_empty() {
            return Err(anyhow!("No prices available for {}", symbol));
        }
        Ok(prices)
    }
}
