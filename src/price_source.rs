use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

const PRICE_SNAPSHOT_VERSION: u32 = 1;
pub const DEFAULT_CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const DEFAULT_RANGE: &str = "5y";
const HTTP_TIMEOUT_SECS: u64 = 30;

/// Supplies the ordered price sequence a backtest consumes.
#[allow(async_fn_in_trait)]
pub trait PriceSource {
    /// Up to `lookback` prices in chronological order; `0` means all of them.
    async fn fetch(&self, symbol: &str, lookback: usize) -> Result<Vec<f64>>;
}

fn take_lookback(prices: Vec<f64>, lookback: usize) -> Vec<f64> {
    let mut prices = prices;
    if lookback > 0 && prices.len() > lookback {
        prices.truncate(lookback);
    }
    prices
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub version: u32,
    pub symbol: String,
    pub generated_at: DateTime<Utc>,
    pub prices: Vec<f64>,
}

impl PriceSnapshot {
    pub fn new(symbol: &str, prices: Vec<f64>) -> Self {
        Self {
            version: PRICE_SNAPSHOT_VERSION,
            symbol: symbol.to_uppercase(),
            generated_at: Utc::now(),
            prices,
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open price snapshot at {}", path.display()))?;
        let reader = BufReader::new(file);
        let snapshot: PriceSnapshot =
            bincode::deserialize_from(reader).context("Snapshot decode failed")?;

        if snapshot.version != PRICE_SNAPSHOT_VERSION {
            return Err(anyhow!(
                "Price snapshot version mismatch (found {}, expected {})",
                snapshot.version,
                PRICE_SNAPSHOT_VERSION
            ));
        }
        Ok(snapshot)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create snapshot directory {}", parent.display())
                })?;
            }
        }

        let file = File::create(path)
            .with_context(|| format!("Unable to create price snapshot at {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, self)
            .context("Failed to serialize price snapshot")?;
        writer
            .flush()
            .context("Failed to flush price snapshot to disk")?;
        Ok(())
    }
}

/// Prices read from a snapshot written by `export-prices`.
pub struct SnapshotPriceSource {
    path: PathBuf,
}

impl SnapshotPriceSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl PriceSource for SnapshotPriceSource {
    async fn fetch(&self, symbol: &str, lookback: usize) -> Result<Vec<f64>> {
        let snapshot = PriceSnapshot::load_from_file(&self.path)?;
        if !snapshot.symbol.eq_ignore_ascii_case(symbol) {
            return Err(anyhow!(
                "Snapshot {} holds {} prices, not {}",
                self.path.display(),
                snapshot.symbol,
                symbol
            ));
        }
        info!(
            "Loaded {} {} prices from snapshot generated at {}",
            snapshot.prices.len(),
            snapshot.symbol,
            snapshot.generated_at
        );
        Ok(take_lookback(snapshot.prices, lookback))
    }
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
}

/// Daily opening prices from a chart endpoint in the Yahoo Finance v8 shape.
pub struct HttpPriceSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPriceSource {
    pub fn new(base_url: Option<&str>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .user_agent(concat!("lotbook/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url
                .unwrap_or(DEFAULT_CHART_URL)
                .trim_end_matches('/')
                .to_string(),
        })
    }

    fn opening_prices(response: ChartResponse, symbol: &str) -> Result<Vec<f64>> {
        if let Some(error) = response.chart.error {
            return Err(anyhow!(
                "Chart request for {} failed: {} {}",
                symbol,
                error.code.unwrap_or_default(),
                error.description.unwrap_or_default()
            ));
        }
        let quote = response
            .chart
            .result
            .and_then(|results| results.into_iter().next())
            .and_then(|result| result.indicators.quote.into_iter().next())
            .ok_or_else(|| anyhow!("Chart response for {} has no quotes", symbol))?;

        let total = quote.open.len();
        let prices: Vec<f64> = quote
            .open
            .into_iter()
            .flatten()
            .filter(|price| price.is_finite())
            .collect();
        if prices.len() < total {
            warn!(
                "Dropped {} missing {} opening prices",
                total - prices.len(),
                symbol
            );
        }
        Ok(prices)
    }
}

impl PriceSource for HttpPriceSource {
    async fn fetch(&self, symbol: &str, lookback: usize) -> Result<Vec<f64>> {
        let url = format!("{}/{}", self.base_url, symbol);
        let response = self
            .client
            .get(&url)
            .query(&[("range", DEFAULT_RANGE), ("interval", "1d")])
            .send()
            .await
            .with_context(|| format!("failed to request prices from {}", url))?
            .error_for_status()
            .with_context(|| format!("price request for {} was rejected", symbol))?
            .json::<ChartResponse>()
            .await
            .with_context(|| format!("failed to decode chart response for {}", symbol))?;

        let prices = Self::opening_prices(response, symbol)?;
        info!("Fetched {} {} opening prices", prices.len(), symbol);
        Ok(take_lookback(prices, lookback))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookback_keeps_earliest_prices() {
        assert_eq!(take_lookback(vec![1.0, 2.0, 3.0], 2), vec![1.0, 2.0]);
        assert_eq!(take_lookback(vec![1.0, 2.0], 5), vec![1.0, 2.0]);
        assert_eq!(take_lookback(vec![1.0, 2.0], 0), vec![1.0, 2.0]);
    }

    #[test]
    fn test_chart_response_drops_missing_opens() {
        let body = r#"{
            "chart": {
                "result": [{
                    "timestamp": [1, 2, 3],
                    "indicators": { "quote": [{ "open": [10.5, null, 11.25], "close": [1, 2, 3] }] }
                }],
                "error": null
            }
        }"#;
        let response: ChartResponse = serde_json::from_str(body).unwrap();
        let prices = HttpPriceSource::opening_prices(response, "AAPL").unwrap();
        assert_eq!(prices, vec![10.5, 11.25]);
    }

    #[test]
    fn test_chart_error_is_reported() {
        let body = r#"{
            "chart": {
                "result": null,
                "error": { "code": "Not Found", "description": "No data found" }
            }
        }"#;
        let response: ChartResponse = serde_json::from_str(body).unwrap();
        let err = HttpPriceSource::opening_prices(response, "NOPE").unwrap_err();
        assert!(err.to_string().contains("Not Found"));
    }

    #[tokio::test]
    async fn test_snapshot_source_checks_symbol() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prices.bin");
        PriceSnapshot::new("aapl", vec![1.0, 2.0, 3.0])
            .save_to_file(&path)
            .unwrap();

        let source = SnapshotPriceSource::new(&path);
        assert_eq!(source.fetch("AAPL", 2).await.unwrap(), vec![1.0, 2.0]);
        assert!(source.fetch("MSFT", 2).await.is_err());
    }
}
