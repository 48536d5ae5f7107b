//! Configuration structures for the price statistics system.

use crate::error::{Error, Result};
use crate::types::PriceBasis;
use serde::{Deserialize, Serialize};

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Per-series tracker settings.
    #[serde(default)]
    pub series: SeriesSettings,
    /// Rolling period histogram job settings.
    #[serde(default)]
    pub rolling_periods: RollingPeriodConfig,
}

impl Config {
    /// Parse and validate a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section for values the trackers cannot work with.
    pub fn validate(&self) -> Result<()> {
        self.series.validate()?;
        self.rolling_periods.validate()
    }
}

/// Settings for one tracked time series.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeriesSettings {
    /// Display name of the series.
    pub series_name: String,
    /// Number of observations in the low/high moving-average window.
    pub moving_average_window_days: usize,
    /// Calendar-day span required before volatility is reported.
    pub volatility_window_days: i64,
    /// Calendar-day span of the gain/loss window.
    pub gain_loss_window_days: i64,
    /// Price basis the incremental trackers read.
    pub price_basis: PriceBasis,
    /// Trading periods per year used to annualize volatility.
    pub annualization_factor: f64,
}

impl Default for SeriesSettings {
    fn default() -> Self {
        Self {
            series_name: "default".to_string(),
            moving_average_window_days: 200,
            volatility_window_days: 365,
            gain_loss_window_days: 30,
            price_basis: PriceBasis::Adjusted,
            annualization_factor: 252.0,
        }
    }
}

impl SeriesSettings {
    /// Create settings with the given name and default windows.
    pub fn named(series_name: impl Into<String>) -> Self {
        Self {
            series_name: series_name.into(),
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if self.moving_average_window_days < 2 {
            return Err(Error::config(format!(
                "moving_average_window_days must be at least 2, got {}",
                self.moving_average_window_days
            )));
        }
        if self.volatility_window_days < 1 {
            return Err(Error::config("volatility_window_days must be positive"));
        }
        if self.gain_loss_window_days < 1 {
            return Err(Error::config("gain_loss_window_days must be positive"));
        }
        if self.annualization_factor.is_nan() || self.annualization_factor <= 0.0 {
            return Err(Error::config("annualization_factor must be positive"));
        }
        Ok(())
    }
}

/// Rolling N-year return histogram configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RollingPeriodConfig {
    /// Horizons in years.
    pub periods_years: Vec<u32>,
    /// Histogram bucket width for compound returns (e.g., 0.01 for 1%).
    pub bucket_width: f64,
}

impl Default for RollingPeriodConfig {
    fn default() -> Self {
        Self {
            periods_years: vec![1, 3, 5, 10],
            bucket_width: 0.01,
        }
    }
}

impl RollingPeriodConfig {
    fn validate(&self) -> Result<()> {
        if self.periods_years.iter().any(|&p| p == 0) {
            return Err(Error::config("rolling periods must be at least one year"));
        }
        if self.bucket_width.is_nan() || self.bucket_width <= 0.0 {
            return Err(Error::config("bucket_width must be positive"));
        }
        Ok(())
    }
}
