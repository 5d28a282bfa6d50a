use anyhow::{anyhow, Result};
use std::collections::HashMap;

/// Extract a positive, finite parameter; anything else falls back to the default
pub fn get_param_f64_positive(params: &HashMap<String, f64>, key: &str, default: f64) -> f64 {
    params
        .get(key)
        .copied()
        .filter(|v| v.is_finite() && *v > 0.0)
        .unwrap_or(default)
}

/// Get a parameter as usize with a minimum value
pub fn get_usize_param_min(
    params: &HashMap<String, f64>,
    key: &str,
    default: usize,
    min: usize,
) -> usize {
    params
        .get(key)
        .copied()
        .filter(|v| v.is_finite())
        .map(|v| v.round().max(min as f64) as usize)
        .unwrap_or(default)
}

/// Get a parameter rounded to an i32
pub fn get_rounded_param(params: &HashMap<String, f64>, key: &str, default: i32) -> i32 {
    params
        .get(key)
        .copied()
        .filter(|v| v.is_finite())
        .map(|v| v.round() as i32)
        .unwrap_or(default)
}

/// Parse `key=value` pairs as given on the command line.
pub fn parse_param_pairs<S: AsRef<str>>(pairs: &[S]) -> Result<HashMap<String, f64>> {
    let mut params = HashMap::with_capacity(pairs.len());
    for pair in pairs {
        let raw = pair.as_ref();
        let (key, value) = raw
            .split_once('=')
            .ok_or_else(|| anyhow!("Parameter '{}' must look like key=value", raw))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(anyhow!("Parameter '{}' has an empty key", raw));
        }
        let value = value
            .trim()
            .parse::<f64>()
            .map_err(|_| anyhow!("Parameter {} must be a number (value: {})", key, value))?;
        params.insert(key.to_string(), value);
    }
    Ok(params)
}
