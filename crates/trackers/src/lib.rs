//! Incremental statistics over a daily price series.
//!
//! This crate handles:
//! - Date-keyed sorted storage with lazy sort and miss-resolution lookups
//! - Daily returns between consecutive observations
//! - Rolling volatility of daily returns
//! - Gain/loss partition of trailing returns
//! - Sliding low/high/moving-average windows
//! - Maximum drawdown scans

pub mod sorted;
pub mod daily_return;
pub mod volatility;
pub mod gain_loss;
pub mod low_high;
pub mod drawdown;

pub use sorted::{SortState, SortedEntry, SortedSeries};
pub use daily_return::{price_return, DailyReturnTracker};
pub use volatility::{RollingVolatilityTracker, VolatilityState};
pub use gain_loss::{GainLossAccumulator, GainLossState};
pub use low_high::{SlidingLowHighTracker, UpdatePath, WindowState, RISK_STEP_LOOKBACK};
pub use drawdown::DrawdownCalculator;
