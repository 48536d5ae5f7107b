//! Per-series calculation context and batch statistics.
//!
//! This crate handles:
//! - The insert pipeline that feeds every tracker in a fixed order
//! - Point-in-time return, volatility and drawdown queries
//! - Rolling N-year return histograms computed off the insert path

pub mod context;
pub mod histogram;
pub mod rolling_period;
pub mod job;

pub use context::{CalculationContext, InsertOutcome};
pub use histogram::ReturnHistogram;
pub use rolling_period::{
    CancelFlag, PeriodSummary, RollingPeriodReport, RollingPeriodResult, RollingPeriodStatistics,
};
pub use job::RollingPeriodJob;
