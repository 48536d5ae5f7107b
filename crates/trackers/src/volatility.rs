//! Rolling volatility computation.
//!
//! Computes mean and sample variance of daily returns over a trailing window.
//! The window is sized during bootstrap: returns accumulate until they cover
//! the configured calendar span, and the count reached at that point stays
//! fixed as the window slides.

use crate::sorted::SortedSeries;
use chrono::NaiveDate;
use pricestats_core::{DailyReturnInfo, Error, MissResolution, Result};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::VecDeque;
use tracing::debug;

/// Volatility snapshot for one date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolatilityState {
    /// Date of the newest return in the window.
    pub date: NaiveDate,
    /// Mean daily return over the window.
    pub average_return: f64,
    /// Sample (Bessel-corrected) variance of daily returns.
    pub variance: f64,
    /// Standard deviation of daily returns.
    pub daily_volatility: f64,
    /// `daily_volatility * sqrt(annualization_factor)`.
    pub annualized_volatility: f64,
    /// Number of returns in the window.
    pub sample_count: usize,
}

/// Rolling volatility tracker over daily returns.
#[derive(Debug, Clone)]
pub struct RollingVolatilityTracker {
    /// Calendar span required to finish bootstrap.
    window_days: i64,
    annualization_factor: f64,
    /// Returns currently in the window.
    returns: VecDeque<DailyReturnInfo>,
    /// Window length, fixed once bootstrap completes.
    window: Option<usize>,
    /// Running mean.
    mean: f64,
    /// Running sum of squared deviations from the mean.
    m2: f64,
    /// Sliding updates since the last full recomputation.
    updates_since_recompute: usize,
    states: SortedSeries<NaiveDate, VolatilityState>,
}

impl RollingVolatilityTracker {
    /// Create a new tracker.
    pub fn new(window_days: i64, annualization_factor: f64) -> Self {
        Self {
            window_days,
            annualization_factor,
            returns: VecDeque::new(),
            window: None,
            mean: 0.0,
            m2: 0.0,
            updates_since_recompute: 0,
            states: SortedSeries::new(),
        }
    }

    /// Feed the next daily return.
    ///
    /// Returns the new state, or `None` while bootstrapping. Returns must
    /// arrive in strictly increasing date order.
    pub fn update(&mut self, info: &DailyReturnInfo) -> Result<Option<VolatilityState>> {
        if let Some(last) = self.returns.back() {
            if last.date() >= info.date() {
                return Err(Error::invariant(format!(
                    "volatility update for {} after {}",
                    info.date(),
                    last.date()
                )));
            }
        }
        self.returns.push_back(*info);

        match self.window {
            None => {
                let span = self
                    .returns
                    .front()
                    .map_or(0, |oldest| (info.date() - oldest.from.date).num_days());
                if span < self.window_days || self.returns.len() < 2 {
                    return Ok(None);
                }
                self.window = Some(self.returns.len());
                self.recompute();
                debug!(
                    window = self.returns.len(),
                    date = %info.date(),
                    "volatility bootstrap complete"
                );
            }
            Some(n) => {
                let Some(oldest) = self.returns.pop_front() else {
                    return Err(Error::invariant("volatility window empty after push"));
                };
                self.slide(n, oldest.absolute_return, info.absolute_return);
            }
        }

        let state = self.snapshot(info.date());
        self.states.add(state.date, state);
        Ok(Some(state))
    }

    /// Exact sliding update: `newest` replaces `oldest` in a window of `n`.
    fn slide(&mut self, n: usize, oldest: f64, newest: f64) {
        let delta = newest - oldest;
        let mean = self.mean + delta / n as f64;
        self.m2 += delta * (newest - mean + oldest - self.mean);
        self.mean = mean;
        self.updates_since_recompute += 1;

        if self.updates_since_recompute >= n {
            self.recompute();
        }
    }

    /// Full pass over the window, clearing accumulated rounding error.
    fn recompute(&mut self) {
        let values: Vec<f64> = self.returns.iter().map(|r| r.absolute_return).collect();
        self.mean = values.iter().mean();
        self.m2 = values.iter().variance() * (values.len() as f64 - 1.0);
        self.updates_since_recompute = 0;
    }

    fn snapshot(&self, date: NaiveDate) -> VolatilityState {
        let n = self.returns.len();
        let variance = (self.m2 / (n as f64 - 1.0)).max(0.0);
        let daily_volatility = variance.sqrt();
        VolatilityState {
            date,
            average_return: self.mean,
            variance,
            daily_volatility,
            annualized_volatility: daily_volatility * self.annualization_factor.sqrt(),
            sample_count: n,
        }
    }

    /// State at `date`, or the most recent one before it.
    pub fn as_of(&self, date: NaiveDate) -> Option<VolatilityState> {
        self.states
            .get(date, MissResolution::Preceding)
            .ok()
            .flatten()
            .map(|e| e.value)
    }

    /// Most recent state.
    pub fn latest(&self) -> Option<VolatilityState> {
        self.states.last().map(|e| e.value)
    }

    /// Whether bootstrap has completed.
    pub fn is_ready(&self) -> bool {
        self.window.is_some()
    }

    /// Window length once bootstrapped.
    pub fn window_len(&self) -> Option<usize> {
        self.window
    }

    /// Returns currently in the window, oldest first.
    pub fn window_returns(&self) -> impl Iterator<Item = &DailyReturnInfo> {
        self.returns.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use pricestats_core::PricePoint;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2000, 1, 3).unwrap()
    }

    /// Chain of daily returns one calendar day apart.
    fn returns(values: &[f64]) -> Vec<DailyReturnInfo> {
        values
            .iter()
            .enumerate()
            .map(|(i, &r)| {
                let from = start() + chrono::Duration::days(i as i64);
                let to = from + chrono::Duration::days(1);
                DailyReturnInfo {
                    from: PricePoint::new(from, 100.0, 100.0),
                    to: PricePoint::new(to, 100.0 * (1.0 + r), 100.0 * (1.0 + r)),
                    absolute_return: r,
                }
            })
            .collect()
    }

    fn lcg_returns(n: usize, seed: u64) -> Vec<f64> {
        let mut state = seed;
        (0..n)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                ((state >> 11) as f64 / (1u64 << 53) as f64 - 0.5) * 0.06
            })
            .collect()
    }

    #[test]
    fn test_absent_before_bootstrap() {
        let mut vol = RollingVolatilityTracker::new(10, 252.0);
        for info in returns(&[0.01; 9]) {
            assert!(vol.update(&info).unwrap().is_none());
        }
        assert!(!vol.is_ready());
        assert!(vol.latest().is_none());
    }

    #[test]
    fn test_bootstrap_fixes_window() {
        let mut vol = RollingVolatilityTracker::new(10, 252.0);
        for info in returns(&[0.01; 15]) {
            vol.update(&info).unwrap();
        }
        assert_eq!(vol.window_len(), Some(10));
        assert_eq!(vol.latest().unwrap().sample_count, 10);
    }

    #[test]
    fn test_constant_returns() {
        let mut vol = RollingVolatilityTracker::new(5, 252.0);
        for info in returns(&[0.002; 20]) {
            vol.update(&info).unwrap();
        }
        let state = vol.latest().unwrap();
        assert_abs_diff_eq!(state.average_return, 0.002, epsilon = 1e-12);
        assert_abs_diff_eq!(state.daily_volatility, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_known_volatility() {
        // Returns 0.01, 0.02, 0.03: mean 0.02, sample variance 0.0001.
        let mut vol = RollingVolatilityTracker::new(3, 252.0);
        let mut state = None;
        for info in returns(&[0.01, 0.02, 0.03]) {
            state = vol.update(&info).unwrap();
        }
        let state = state.unwrap();
        assert_abs_diff_eq!(state.average_return, 0.02, epsilon = 1e-12);
        assert_abs_diff_eq!(state.variance, 0.0001, epsilon = 1e-12);
        assert_abs_diff_eq!(state.daily_volatility, 0.01, epsilon = 1e-10);
        assert_abs_diff_eq!(state.annualized_volatility, 0.01 * 252f64.sqrt(), epsilon = 1e-10);
    }

    #[test]
    fn test_matches_full_recomputation() {
        let values = lcg_returns(600, 17);
        let infos = returns(&values);
        let mut vol = RollingVolatilityTracker::new(60, 252.0);

        for (i, info) in infos.iter().enumerate() {
            let Some(state) = vol.update(info).unwrap() else {
                continue;
            };
            let n = state.sample_count;
            let window = &values[i + 1 - n..=i];
            assert_abs_diff_eq!(state.average_return, window.iter().mean(), epsilon = 1e-12);
            assert_abs_diff_eq!(state.variance, window.iter().variance(), epsilon = 1e-12);
        }
        assert_eq!(vol.window_len(), Some(60));
    }

    #[test]
    fn test_out_of_order_update_rejected() {
        let infos = returns(&[0.01, 0.02]);
        let mut vol = RollingVolatilityTracker::new(5, 252.0);
        vol.update(&infos[1]).unwrap();
        let err = vol.update(&infos[0]).unwrap_err();
        assert!(matches!(err, Error::Invariant(_)));
    }

    #[test]
    fn test_as_of_resolves_preceding() {
        let infos = returns(&lcg_returns(30, 3));
        let mut vol = RollingVolatilityTracker::new(10, 252.0);
        for info in &infos {
            vol.update(info).unwrap();
        }
        let last = infos.last().unwrap().date();
        assert_eq!(vol.as_of(last + chrono::Duration::days(10)).unwrap().date, last);
        assert!(vol.as_of(start()).is_none());
    }
}
