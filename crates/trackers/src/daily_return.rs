//! Daily return tracking.
//!
//! Records the return between consecutive observations, keyed by the later
//! observation's date.

use crate::sorted::SortedSeries;
use chrono::NaiveDate;
use pricestats_core::{DailyReturnInfo, Error, MissResolution, PriceBasis, PricePoint, Result};
use tracing::warn;

/// Simple return `to / from - 1`.
///
/// A zero `from` price yields a zero return instead of an infinity; the
/// occurrence is logged.
pub fn price_return(from: f64, to: f64) -> f64 {
    if from == 0.0 {
        warn!(to, "zero base price in return computation, treating as zero return");
        return 0.0;
    }
    to / from - 1.0
}

/// Tracker of daily returns on one price basis.
#[derive(Debug, Clone)]
pub struct DailyReturnTracker {
    basis: PriceBasis,
    returns: SortedSeries<NaiveDate, DailyReturnInfo>,
    /// Entry with the largest date seen so far.
    latest: Option<DailyReturnInfo>,
}

impl DailyReturnTracker {
    /// Create a new tracker reading `basis` prices.
    pub fn new(basis: PriceBasis) -> Self {
        Self {
            basis,
            returns: SortedSeries::new(),
            latest: None,
        }
    }

    /// Price basis the returns are computed on.
    pub fn basis(&self) -> PriceBasis {
        self.basis
    }

    /// Record the return from `from` to `to`.
    ///
    /// Re-recording a date returns the stored entry unchanged.
    pub fn record(&mut self, from: PricePoint, to: PricePoint) -> Result<DailyReturnInfo> {
        if from.date >= to.date {
            return Err(Error::invariant(format!(
                "daily return must span forward in time, got {} -> {}",
                from.date, to.date
            )));
        }

        if let Some(existing) = self.lookup_exact(to.date) {
            return Ok(existing);
        }

        let info = DailyReturnInfo {
            from,
            to,
            absolute_return: price_return(from.price_for(self.basis), to.price_for(self.basis)),
        };
        self.returns.add(to.date, info);

        if self.latest.map_or(true, |latest| latest.date() < to.date) {
            self.latest = Some(info);
        }
        Ok(info)
    }

    fn lookup_exact(&self, date: NaiveDate) -> Option<DailyReturnInfo> {
        match self.latest {
            Some(latest) if latest.date() == date => Some(latest),
            Some(latest) if latest.date() < date => None,
            _ => self.returns.get_exact(date),
        }
    }

    /// Return for `date`, or the most recent one before it.
    pub fn lookup_as_of(&self, date: NaiveDate) -> Option<DailyReturnInfo> {
        match self.latest {
            // Sequential-in-time reads right after an insert land here.
            Some(latest) if latest.date() <= date => Some(latest),
            None => None,
            _ => self
                .returns
                .get(date, MissResolution::Preceding)
                .ok()
                .flatten()
                .map(|e| e.value),
        }
    }

    /// Most recently dated return.
    pub fn latest(&self) -> Option<DailyReturnInfo> {
        self.latest
    }

    /// Number of recorded returns.
    pub fn len(&self) -> usize {
        self.returns.len()
    }

    /// Whether no return has been recorded.
    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }

    /// All returns in date order.
    pub fn all(&self) -> Vec<DailyReturnInfo> {
        self.returns.values()
    }

    /// Returns dated between `from` and `to` (inclusive).
    pub fn range(&self, from: NaiveDate, to: NaiveDate) -> Vec<DailyReturnInfo> {
        self.returns.with_range(from, to, |entries| entries.iter().map(|e| e.value).collect())
    }
}
