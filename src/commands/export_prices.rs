use crate::context::AppContext;
use crate::price_source::{PriceSnapshot, PriceSource};
use crate::retry::retry_collaborator_call;
use anyhow::{anyhow, Result};
use log::info;
use std::path::Path;

/// Fetch prices over HTTP and write them to a snapshot for offline runs.
pub async fn run(app: &AppContext, symbol: &str, lookback: usize, output_path: &Path) -> Result<()> {
    info!(
        "Generating {} price snapshot at {}",
        symbol,
        output_path.display()
    );

    let source = app.http_price_source()?;
    let prices = retry_collaborator_call!(
        format!("fetch {} prices", symbol),
        source.fetch(symbol, lookback)
    )?;
    if prices.is_empty() {
        return Err(anyhow!("No prices returned for {}", symbol));
    }

    let snapshot = PriceSnapshot::new(symbol, prices);
    snapshot.save_to_file(output_path)?;
    info!(
        "Price snapshot with {} prices written to {}",
        snapshot.prices.len(),
        output_path.display()
    );

    Ok(())
}
