//! Sliding low/high window tracking.
//!
//! Maintains the low, high, moving average and trend flags of the trailing
//! window of the most recent N observations. Each new observation either
//! shifts the previous window in O(1) (fast path) or rescans the window in
//! O(N) (slow path). Both paths must yield the same state for a given date;
//! [`SlidingLowHighTracker::recompute`] exposes the from-scratch result so
//! callers can check that.
//!
//! Observations live in an append-only arena owned by the tracker, and each
//! [`WindowState`] refers to its records by `[start, start + len)`. Older
//! snapshots therefore stay valid as the window moves on.

use crate::sorted::SortedSeries;
use chrono::NaiveDate;
use pricestats_core::{Error, MissResolution, PriceBasis, PricePoint, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

/// Observations between the two prices compared for `can_advance_risk_step`.
pub const RISK_STEP_LOOKBACK: usize = 16;

/// Trailing window snapshot ending at `last`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowState {
    /// Oldest observation in the window.
    pub first: PricePoint,
    /// Lowest observation (earliest on ties).
    pub low: PricePoint,
    /// Highest observation (latest on ties).
    pub high: PricePoint,
    /// Newest observation.
    pub last: PricePoint,
    /// Arena index of `first`.
    pub start: usize,
    /// Number of observations in the window.
    pub len: usize,
    /// Mean price over the window.
    pub moving_average: f64,
    /// Change of the moving average against the previous window.
    pub moving_average_delta: f64,
    /// The newest observation is the window low.
    pub has_new_low: bool,
    /// The newest price is at least the price `RISK_STEP_LOOKBACK` positions back.
    pub can_advance_risk_step: bool,
    /// Observations strictly above every later one in the window; the front is `high`.
    pub new_highs: Vec<PricePoint>,
}

/// Which update path produced a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePath {
    /// O(1) shift of the previous window.
    Fast,
    /// Full rescan of the window.
    Slow,
}

/// Low/high window tracker over one price basis.
#[derive(Debug, Clone)]
pub struct SlidingLowHighTracker {
    window: usize,
    basis: PriceBasis,
    /// Every observation pushed, in date order.
    arena: Vec<PricePoint>,
    /// Live new-highs queue as arena indices.
    highs: VecDeque<usize>,
    /// Arena index of the current low.
    low_index: usize,
    current: Option<WindowState>,
    states: SortedSeries<NaiveDate, WindowState>,
    fast_updates: usize,
    slow_updates: usize,
}

/// Result of a full scan over `arena[start..=end]`.
struct Scan {
    low_index: usize,
    highs: VecDeque<usize>,
    moving_average: f64,
}

impl SlidingLowHighTracker {
    /// Create a tracker over windows of `window` observations.
    pub fn new(window: usize, basis: PriceBasis) -> Self {
        let window = window.max(1);
        Self {
            window,
            basis,
            arena: Vec::new(),
            highs: VecDeque::with_capacity(window),
            low_index: 0,
            current: None,
            states: SortedSeries::new(),
            fast_updates: 0,
            slow_updates: 0,
        }
    }

    #[inline]
    fn price(&self, index: usize) -> f64 {
        self.arena[index].price_for(self.basis)
    }

    fn scan(&self, start: usize, end: usize) -> Scan {
        let mut low_index = start;
        let mut sum = 0.0;
        for i in start..=end {
            let price = self.price(i);
            sum += price;
            if price < self.price(low_index) {
                low_index = i;
            }
        }

        let mut highs = VecDeque::new();
        let mut later_max = f64::NEG_INFINITY;
        for i in (start..=end).rev() {
            let price = self.price(i);
            if price > later_max {
                highs.push_front(i);
                later_max = price;
            }
        }

        Scan {
            low_index,
            highs,
            moving_average: sum / (end + 1 - start) as f64,
        }
    }

    /// Push the next observation.
    ///
    /// Returns the window ending at `point`, or `None` until `window`
    /// observations have been seen.
    pub fn push(&mut self, point: PricePoint) -> Result<Option<WindowState>> {
        if let Some(last) = self.arena.last() {
            if last.date >= point.date {
                return Err(Error::invariant(format!(
                    "low/high window push for {} after {}",
                    point.date, last.date
                )));
            }
        }
        self.arena.push(point);

        let end = self.arena.len() - 1;
        if self.arena.len() < self.window {
            return Ok(None);
        }
        let start = end + 1 - self.window;
        let price = self.price(end);

        let fast = match &self.current {
            Some(prev) => price >= prev.low.price_for(self.basis) && self.low_index >= start,
            None => false,
        };

        let (moving_average, has_new_low) = match (&self.current, fast) {
            (Some(prev), true) => {
                let leaving = self.price(start - 1);
                while self.highs.front().is_some_and(|&i| i < start) {
                    self.highs.pop_front();
                }
                while self.highs.back().is_some_and(|&i| self.price(i) <= price) {
                    self.highs.pop_back();
                }
                self.highs.push_back(end);
                self.fast_updates += 1;
                (prev.moving_average + (price - leaving) / self.window as f64, false)
            }
            _ => {
                let scan = self.scan(start, end);
                self.low_index = scan.low_index;
                self.highs = scan.highs;
                self.slow_updates += 1;
                debug!(date = %point.date, "low/high window rescanned");
                (scan.moving_average, scan.low_index == end)
            }
        };

        let moving_average_delta = self
            .current
            .as_ref()
            .map_or(0.0, |prev| moving_average - prev.moving_average);
        let high_index = self.highs.front().copied().unwrap_or(end);

        let state = WindowState {
            first: self.arena[start],
            low: self.arena[self.low_index],
            high: self.arena[high_index],
            last: point,
            start,
            len: self.window,
            moving_average,
            moving_average_delta,
            has_new_low,
            can_advance_risk_step: self.can_advance_risk_step(end),
            new_highs: self.highs.iter().map(|&i| self.arena[i]).collect(),
        };

        self.states.add(point.date, state.clone());
        self.current = Some(state.clone());
        Ok(Some(state))
    }

    fn can_advance_risk_step(&self, end: usize) -> bool {
        self.window > RISK_STEP_LOOKBACK
            && self.price(end) >= self.price(end - RISK_STEP_LOOKBACK)
    }

    /// Window ending at `date` rebuilt from scratch.
    ///
    /// `None` if `date` was never pushed or fewer than `window` observations
    /// end there.
    pub fn recompute(&self, date: NaiveDate) -> Option<WindowState> {
        let end = self.arena.binary_search_by(|p| p.date.cmp(&date)).ok()?;
        let start = (end + 1).checked_sub(self.window)?;
        let scan = self.scan(start, end);

        let moving_average_delta = match start.checked_sub(1) {
            Some(prev_start) => scan.moving_average - self.scan(prev_start, end - 1).moving_average,
            None => 0.0,
        };

        Some(WindowState {
            first: self.arena[start],
            low: self.arena[scan.low_index],
            high: self.arena[scan.highs.front().copied().unwrap_or(end)],
            last: self.arena[end],
            start,
            len: self.window,
            moving_average: scan.moving_average,
            moving_average_delta,
            has_new_low: scan.low_index == end,
            can_advance_risk_step: self.can_advance_risk_step(end),
            new_highs: scan.highs.iter().map(|&i| self.arena[i]).collect(),
        })
    }

    /// Window at `date`, or the most recent one before it.
    pub fn as_of(&self, date: NaiveDate) -> Option<WindowState> {
        self.states
            .get(date, MissResolution::Preceding)
            .ok()
            .flatten()
            .map(|e| e.value)
    }

    /// Most recent window.
    pub fn latest(&self) -> Option<&WindowState> {
        self.current.as_ref()
    }

    /// Observations covered by `state`, oldest first.
    pub fn window_records(&self, state: &WindowState) -> &[PricePoint] {
        let end = (state.start + state.len).min(self.arena.len());
        &self.arena[state.start.min(end)..end]
    }

    /// Window length in observations.
    pub fn window_len(&self) -> usize {
        self.window
    }

    /// Number of updates taken by `path`.
    pub fn updates_via(&self, path: UpdatePath) -> usize {
        match path {
            UpdatePath::Fast => self.fast_updates,
            UpdatePath::Slow => self.slow_updates,
        }
    }
}
