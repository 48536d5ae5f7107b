//! Rolling N-year return statistics.
//!
//! For every observation that has a full N-year horizon ahead of it, the
//! return to the last observation at or before the horizon end is computed
//! and folded into a per-horizon histogram.

use crate::histogram::ReturnHistogram;
use chrono::{Months, NaiveDate};
use pricestats_core::{Error, PriceBasis, PricePoint, Result};
use pricestats_trackers::price_return;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Start dates processed between cancellation checks.
const CANCEL_CHECK_INTERVAL: usize = 64;

/// Return over one (start date, horizon) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RollingPeriodResult {
    /// Horizon in years.
    pub period_years: u32,
    /// `end / start - 1`.
    pub absolute_return: f64,
    /// Annualized `(1 + absolute)^(1 / years) - 1`.
    pub compound_return: f64,
    /// Start observation date.
    pub from_date: NaiveDate,
    /// End observation date.
    pub to_date: NaiveDate,
}

/// Distribution summary of compound returns for one horizon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodSummary {
    /// Worst compound return.
    pub min: f64,
    /// Best compound return.
    pub max: f64,
    /// Mean compound return.
    pub mean: f64,
    /// Sample standard deviation; NaN with a single result.
    pub std_dev: f64,
    /// Lower edge of the most populated histogram bucket.
    pub mode: f64,
    /// Fraction of start dates whose compound return bucketed below zero.
    pub loss_fraction: f64,
}

/// All results for one horizon.
#[derive(Debug, Clone)]
pub struct RollingPeriodReport {
    /// Horizon in years.
    pub period_years: u32,
    /// One result per eligible start date, in date order.
    pub results: Vec<RollingPeriodResult>,
    /// Histogram of compound returns.
    pub histogram: ReturnHistogram,
    /// `None` when the history is shorter than the horizon.
    pub summary: Option<PeriodSummary>,
}

/// Cooperative cancellation flag shared with a running job.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create an unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Annualize an absolute return over `years`.
fn compound(absolute_return: f64, years: u32) -> f64 {
    let growth = 1.0 + absolute_return;
    if growth <= 0.0 {
        return -1.0;
    }
    growth.powf(1.0 / years as f64) - 1.0
}

/// Batch rolling-period calculator.
#[derive(Debug, Clone, Copy)]
pub struct RollingPeriodStatistics {
    basis: PriceBasis,
    bucket_width: f64,
}

impl RollingPeriodStatistics {
    /// Create a calculator.
    pub fn new(basis: PriceBasis, bucket_width: f64) -> Self {
        Self {
            basis,
            bucket_width,
        }
    }

    /// Compute one report per horizon over date-ordered `points`.
    ///
    /// Fails with `Error::Cancelled` once `cancel` is set.
    pub fn compute(
        &self,
        points: &[PricePoint],
        periods_years: &[u32],
        cancel: &CancelFlag,
    ) -> Result<Vec<RollingPeriodReport>> {
        periods_years
            .iter()
            .map(|&years| self.compute_period(points, years, cancel))
            .collect()
    }

    fn compute_period(
        &self,
        points: &[PricePoint],
        years: u32,
        cancel: &CancelFlag,
    ) -> Result<RollingPeriodReport> {
        if years == 0 {
            return Err(Error::config("rolling period must be at least one year"));
        }

        let mut results = Vec::new();
        let mut histogram = ReturnHistogram::new(self.bucket_width);
        let last_date = points.last().map(|p| p.date);

        for (i, start) in points.iter().enumerate() {
            if i % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                return Err(Error::cancelled(format!("{years}-year rolling periods")));
            }

            let Some(horizon) = start.date.checked_add_months(Months::new(12 * years)) else {
                break;
            };
            if last_date.map_or(true, |last| horizon > last) {
                break;
            }

            // Nearest observation at or before the horizon end.
            let end_index = points.partition_point(|p| p.date <= horizon) - 1;
            let end = points[end_index];
            let absolute_return =
                price_return(start.price_for(self.basis), end.price_for(self.basis));
            let compound_return = compound(absolute_return, years);

            histogram.add(compound_return);
            results.push(RollingPeriodResult {
                period_years: years,
                absolute_return,
                compound_return,
                from_date: start.date,
                to_date: end.date,
            });
        }

        let summary = histogram.mode().map(|mode| {
            let values: Vec<f64> = results.iter().map(|r| r.compound_return).collect();
            PeriodSummary {
                min: values.iter().copied().fold(f64::INFINITY, f64::min),
                max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                mean: values.iter().mean(),
                std_dev: values.iter().std_dev(),
                mode,
                loss_fraction: histogram.fraction_below(0.0),
            }
        });

        Ok(RollingPeriodReport {
            period_years: years,
            results,
            histogram,
            summary,
        })
    }
}
