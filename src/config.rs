//! TOML configuration loading and validation.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::latency::LatencyConfig;

/// One hour; latencies beyond this are config typos, not simulations.
const MAX_LATENCY_NS: u64 = 3_600_000_000_000;

/// Top-level configuration.
///
/// Every key has a default, so an empty file (or an empty TOML table) is a
/// valid configuration.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub latency: LatencyConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Strategy-specific keys, forwarded opaquely to the selected strategy.
    #[serde(default)]
    pub strategy: toml::Table,
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct SimulationConfig {
    /// Rebuild the book from raw events (queue mode) instead of replaying
    /// pre-computed top/fill snapshots.
    #[serde(default)]
    pub use_queue_simulation: bool,
}

impl Config {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Config> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.latency.strategy_md_latency_ns > MAX_LATENCY_NS {
            return Err(Error::Config(format!(
                "latency.strategy_md_latency_ns {} exceeds {} ns",
                self.latency.strategy_md_latency_ns, MAX_LATENCY_NS
            )));
        }
        if self.latency.exchange_latency_ns > MAX_LATENCY_NS {
            return Err(Error::Config(format!(
                "latency.exchange_latency_ns {} exceeds {} ns",
                self.latency.exchange_latency_ns, MAX_LATENCY_NS
            )));
        }
        Ok(())
    }

    // === Opaque strategy-key accessors ===

    /// Float strategy key, or `default` when absent. A key of the wrong
    /// type is a config error, not a silent default.
    pub fn strategy_f64(&self, key: &str, default: f64) -> Result<f64> {
        match self.strategy.get(key) {
            None => Ok(default),
            Some(toml::Value::Float(v)) => Ok(*v),
            Some(toml::Value::Integer(v)) => Ok(*v as f64),
            Some(other) => Err(Error::Config(format!(
                "strategy.{key}: expected a number, got {}",
                other.type_str()
            ))),
        }
    }

    /// Unsigned integer strategy key, or `default` when absent.
    pub fn strategy_u64(&self, key: &str, default: u64) -> Result<u64> {
        match self.strategy.get(key) {
            None => Ok(default),
            Some(toml::Value::Integer(v)) if *v >= 0 => Ok(*v as u64),
            Some(other) => Err(Error::Config(format!(
                "strategy.{key}: expected a non-negative integer, got {other}"
            ))),
        }
    }

    /// Quantity-sized strategy key, or `default` when absent.
    pub fn strategy_u32(&self, key: &str, default: u32) -> Result<u32> {
        let v = self.strategy_u64(key, default as u64)?;
        u32::try_from(v)
            .map_err(|_| Error::Config(format!("strategy.{key}: {v} does not fit in 32 bits")))
    }
}
