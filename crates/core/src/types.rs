//! Core data types for the price statistics system.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Calendar days per year used for annualizing returns.
pub const DAYS_PER_YEAR: f64 = 365.25;

/// Calendar days per average month.
pub const DAYS_PER_MONTH: f64 = DAYS_PER_YEAR / 12.0;

/// One dated price record for a security, as delivered by ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Security identifier.
    pub security_id: String,
    /// Trading date.
    pub date: NaiveDate,
    /// Raw close price.
    pub price: f64,
    /// Split/dividend adjusted close price.
    pub adjusted_price: f64,
}

impl Observation {
    /// Create a new observation.
    pub fn new(
        security_id: impl Into<String>,
        date: NaiveDate,
        price: f64,
        adjusted_price: f64,
    ) -> Self {
        Self {
            security_id: security_id.into(),
            date,
            price,
            adjusted_price,
        }
    }

    /// Project to the copyable price point stored by the trackers.
    #[inline]
    pub fn point(&self) -> PricePoint {
        PricePoint {
            date: self.date,
            price: self.price,
            adjusted_price: self.adjusted_price,
        }
    }
}

/// Dated price pair without the security id.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Trading date.
    pub date: NaiveDate,
    /// Raw close price.
    pub price: f64,
    /// Adjusted close price.
    pub adjusted_price: f64,
}

impl PricePoint {
    /// Create a new price point.
    pub fn new(date: NaiveDate, price: f64, adjusted_price: f64) -> Self {
        Self {
            date,
            price,
            adjusted_price,
        }
    }

    /// Price for the requested basis.
    #[inline]
    pub fn price_for(&self, basis: PriceBasis) -> f64 {
        match basis {
            PriceBasis::Raw => self.price,
            PriceBasis::Adjusted => self.adjusted_price,
        }
    }

    /// (year, month) bucket of this point.
    #[inline]
    pub fn month_key(&self) -> (i32, u32) {
        (self.date.year(), self.date.month())
    }
}

impl From<&Observation> for PricePoint {
    fn from(obs: &Observation) -> Self {
        obs.point()
    }
}

/// Which price series a computation reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PriceBasis {
    /// Raw close prices.
    Raw,
    /// Adjusted close prices.
    #[default]
    Adjusted,
}

/// Rule applied by a keyed lookup when the exact key is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissResolution {
    /// Return nothing.
    Invalid,
    /// Return the nearest entry before the key.
    Preceding,
    /// Return the nearest entry after the key.
    Following,
    /// Fail with `Error::NotFound`.
    Raise,
}

/// Period a compound average return is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnPeriod {
    /// Per year.
    Annual,
    /// Per month.
    Monthly,
}

impl ReturnPeriod {
    /// Calendar days in one period.
    #[inline]
    pub fn days(self) -> f64 {
        match self {
            ReturnPeriod::Annual => DAYS_PER_YEAR,
            ReturnPeriod::Monthly => DAYS_PER_MONTH,
        }
    }
}

/// Daily return between two consecutive observations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyReturnInfo {
    /// Earlier observation.
    pub from: PricePoint,
    /// Later observation; the entry is keyed by its date.
    pub to: PricePoint,
    /// `to / from - 1` on the tracker's price basis.
    pub absolute_return: f64,
}

impl DailyReturnInfo {
    /// Date this return is keyed by.
    #[inline]
    pub fn date(&self) -> NaiveDate {
        self.to.date
    }
}

/// Return between two month-end observations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonthlyReturn {
    /// Observation closing the previous month (or the first observation).
    pub from: PricePoint,
    /// Last observation of the month.
    pub to: PricePoint,
    /// `to / from - 1`.
    pub absolute_return: f64,
}

/// One peak-to-trough decline found by a drawdown scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrawdownEpisode {
    /// Running peak the decline started from.
    pub peak: PricePoint,
    /// Lowest observation reached within the episode.
    pub trough: PricePoint,
    /// `trough / peak - 1` (non-positive).
    pub drawdown_return: f64,
}
