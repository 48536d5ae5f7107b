//! Partition of trailing daily returns into gains and losses.
//!
//! Returns are kept in an append-only arena and each [`GainLossState`]
//! refers to its window by `[start, start + return_count)`, so historical
//! snapshots can still list the returns they were built from.

use crate::sorted::SortedSeries;
use chrono::{Duration, NaiveDate};
use pricestats_core::{DailyReturnInfo, Error, MissResolution, Result};
use serde::{Deserialize, Serialize};

/// Gain/loss snapshot for one date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GainLossState {
    /// Date of the newest return in the window.
    pub date: NaiveDate,
    /// Sum of positive returns in the window (>= 0).
    pub absolute_gain: f64,
    /// Sum of non-positive returns in the window (<= 0).
    pub absolute_loss: f64,
    /// Number of returns in the window.
    pub return_count: usize,
    /// Arena index of the oldest return in the window.
    pub start: usize,
    /// Date of the oldest return in the window.
    pub window_start: NaiveDate,
    /// Calendar length of the window.
    pub window_length_days: i64,
}

impl GainLossState {
    /// Sum of all returns in the window.
    #[inline]
    pub fn net(&self) -> f64 {
        self.absolute_gain + self.absolute_loss
    }

    /// Gains as a fraction of total movement, `None` for a flat window.
    pub fn gain_ratio(&self) -> Option<f64> {
        let total = self.absolute_gain - self.absolute_loss;
        (total > 0.0).then(|| self.absolute_gain / total)
    }
}

/// Bucket a return contributes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bucket {
    Gain,
    Loss,
}

impl Bucket {
    fn of(ret: f64) -> Self {
        if ret > 0.0 {
            Bucket::Gain
        } else {
            Bucket::Loss
        }
    }
}

/// Incremental gain/loss accumulator over a calendar-day window.
#[derive(Debug, Clone)]
pub struct GainLossAccumulator {
    window_length_days: i64,
    /// Every return fed, in date order.
    arena: Vec<DailyReturnInfo>,
    /// Arena index of the oldest return still in the window.
    start: usize,
    gain: f64,
    loss: f64,
    gain_count: usize,
    loss_count: usize,
    states: SortedSeries<NaiveDate, GainLossState>,
}

impl GainLossAccumulator {
    /// Create an accumulator over `window_length_days` calendar days.
    pub fn new(window_length_days: i64) -> Self {
        Self {
            window_length_days,
            arena: Vec::new(),
            start: 0,
            gain: 0.0,
            loss: 0.0,
            gain_count: 0,
            loss_count: 0,
            states: SortedSeries::new(),
        }
    }

    /// Add the newest return and slide the window.
    pub fn update(&mut self, info: &DailyReturnInfo) -> Result<GainLossState> {
        if let Some(last) = self.arena.last() {
            if last.date() >= info.date() {
                return Err(Error::invariant(format!(
                    "gain/loss update for {} after {}",
                    info.date(),
                    last.date()
                )));
            }
        }

        let cutoff = info.date() - Duration::days(self.window_length_days);
        while let Some(oldest) = self.arena.get(self.start).copied() {
            if oldest.date() > cutoff {
                break;
            }
            self.remove(oldest.absolute_return);
            self.start += 1;
        }

        self.add(info.absolute_return);
        self.arena.push(*info);

        let state = GainLossState {
            date: info.date(),
            absolute_gain: self.gain,
            absolute_loss: self.loss,
            return_count: self.arena.len() - self.start,
            start: self.start,
            window_start: self.arena[self.start].date(),
            window_length_days: self.window_length_days,
        };
        self.states.add(state.date, state);
        Ok(state)
    }

    fn add(&mut self, ret: f64) {
        match Bucket::of(ret) {
            Bucket::Gain => {
                self.gain += ret;
                self.gain_count += 1;
            }
            Bucket::Loss => {
                self.loss += ret;
                self.loss_count += 1;
            }
        }
    }

    /// Reverse a contribution from the bucket it was added to.
    fn remove(&mut self, ret: f64) {
        match Bucket::of(ret) {
            Bucket::Gain => {
                self.gain_count -= 1;
                self.gain = if self.gain_count == 0 {
                    0.0
                } else {
                    (self.gain - ret).max(0.0)
                };
            }
            Bucket::Loss => {
                self.loss_count -= 1;
                self.loss = if self.loss_count == 0 {
                    0.0
                } else {
                    (self.loss - ret).min(0.0)
                };
            }
        }
    }

    /// State at `date`, or the most recent one before it.
    pub fn as_of(&self, date: NaiveDate) -> Option<GainLossState> {
        self.states
            .get(date, MissResolution::Preceding)
            .ok()
            .flatten()
            .map(|e| e.value)
    }

    /// Most recent state.
    pub fn latest(&self) -> Option<GainLossState> {
        self.states.last().map(|e| e.value)
    }

    /// Returns currently retained, oldest first.
    pub fn window_returns(&self) -> impl Iterator<Item = &DailyReturnInfo> {
        self.arena[self.start..].iter()
    }

    /// Returns covered by `state`, oldest first.
    pub fn window_records(&self, state: &GainLossState) -> &[DailyReturnInfo] {
        let end = (state.start + state.return_count).min(self.arena.len());
        &self.arena[state.start.min(end)..end]
    }
}
