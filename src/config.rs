use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_INITIAL_CAPITAL: f64 = 100_000.0;
pub const DEFAULT_SYMBOL: &str = "AAPL";
pub const DEFAULT_LOOKBACK: usize = 200;

/// How cash moves when a short lot is opened and closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ShortSettlement {
    /// Open credits the sale price; close adds `entry - price`; the mark adds
    /// `(mean_entry - price) * count`.
    #[default]
    PriceDelta,
    /// Open credits the sale price; close debits the buy-back price; the mark
    /// carries the `count * price` liability.
    BuyToCover,
}

impl ShortSettlement {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "price_delta" | "delta" => Ok(Self::PriceDelta),
            "buy_to_cover" | "cover" => Ok(Self::BuyToCover),
            other => Err(anyhow!(
                "Short settlement must be price_delta or buy_to_cover (value: {})",
                other
            )),
        }
    }

    fn from_code(code: i32) -> Self {
        if code == 1 {
            Self::BuyToCover
        } else {
            Self::PriceDelta
        }
    }
}

/// Main engine configuration struct
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub initial_capital: f64,
    pub short_settlement: ShortSettlement,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_capital: DEFAULT_INITIAL_CAPITAL,
            short_settlement: ShortSettlement::default(),
        }
    }
}

impl EngineConfig {
    /// Create a new EngineConfig from a parameter map
    pub fn from_parameters(parameters: &HashMap<String, f64>) -> Result<Self> {
        use crate::param_utils::*;

        let initial_capital = match parameters.get("initialCapital") {
            Some(&value) => validate_initial_capital("parameter initialCapital", value)?,
            None => DEFAULT_INITIAL_CAPITAL,
        };
        Ok(Self {
            initial_capital,
            short_settlement: ShortSettlement::from_code(get_rounded_param(
                parameters,
                "shortSettlement",
                0,
            )),
        })
    }

    pub fn with_initial_capital(mut self, initial_capital: f64) -> Self {
        self.initial_capital = initial_capital;
        self
    }

    pub fn with_short_settlement(mut self, short_settlement: ShortSettlement) -> Self {
        self.short_settlement = short_settlement;
        self
    }
}

/// Settings read from the process environment.
#[derive(Debug, Clone, Default)]
pub struct RuntimeSettings {
    pub initial_capital: Option<f64>,
    pub short_settlement: Option<ShortSettlement>,
    pub price_source_url: Option<String>,
    pub database_url: Option<String>,
}

impl RuntimeSettings {
    pub fn from_env() -> Result<Self> {
        let settings: HashMap<String, String> = std::env::vars().collect();
        Self::from_settings_map(&settings)
    }

    pub fn from_settings_map(settings: &HashMap<String, String>) -> Result<Self> {
        let initial_capital = match optional_setting(settings, "BACKTEST_INITIAL_CAPITAL") {
            Some(_) => Some(require_setting_f64(
                settings,
                "BACKTEST_INITIAL_CAPITAL",
                Some(0.0),
                None,
            )?),
            None => None,
        };
        let short_settlement = optional_setting(settings, "BACKTEST_SHORT_SETTLEMENT")
            .map(ShortSettlement::parse)
            .transpose()?;

        Ok(Self {
            initial_capital,
            short_settlement,
            price_source_url: optional_setting(settings, "PRICE_SOURCE_URL").map(str::to_string),
            database_url: optional_setting(settings, "DATABASE_URL").map(str::to_string),
        })
    }
}

/// Starting cash must be a finite, non-negative amount.
pub fn validate_initial_capital(source: &str, value: f64) -> Result<f64> {
    if !value.is_finite() {
        return Err(anyhow!("Initial capital from {} must be finite (value: {})", source, value));
    }
    if value < 0.0 {
        return Err(anyhow!("Initial capital from {} must be >= 0 (value: {})", source, value));
    }
    Ok(value)
}

/// Pick the initial capital: explicit CLI value, then environment, then default.
pub fn resolve_backtest_initial_capital(
    cli_value: Option<f64>,
    settings: &RuntimeSettings,
) -> Result<f64> {
    match cli_value {
        Some(value) => validate_initial_capital("--initial-capital", value),
        None => Ok(settings.initial_capital.unwrap_or(DEFAULT_INITIAL_CAPITAL)),
    }
}

fn optional_setting<'a>(settings: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    settings
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn require_setting<'a>(settings: &'a HashMap<String, String>, key: &str) -> Result<&'a str> {
    optional_setting(settings, key).ok_or_else(|| anyhow!("Missing required setting {}", key))
}

fn require_setting_f64(
    settings: &HashMap<String, String>,
    key: &str,
    min: Option<f64>,
    max: Option<f64>,
) -> Result<f64> {
    let raw = require_setting(settings, key)?;
    let value = raw
        .parse::<f64>()
        .map_err(|_| anyhow!("Setting {} must be a number (value: {})", key, raw))?;
    if !value.is_finite() {
        return Err(anyhow!("Setting {} must be finite (value: {})", key, raw));
    }
    if let Some(min_value) = min {
        if value < min_value {
            return Err(anyhow!(
                "Setting {} must be >= {} (value: {})",
                key,
                min_value,
                raw
            ));
        }
    }
    if let Some(max_value) = max {
        if value > max_value {
            return Err(anyhow!(
                "Setting {} must be <= {} (value: {})",
                key,
                max_value,
                raw
            ));
        }
    }
    Ok(value)
}
