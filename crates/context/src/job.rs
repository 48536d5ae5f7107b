//! Background execution of the rolling-period job.

use crate::rolling_period::{CancelFlag, RollingPeriodReport, RollingPeriodStatistics};
use pricestats_core::{Error, PricePoint, Result};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::info;

/// Handle to a rolling-period job running on the blocking pool.
#[derive(Debug)]
pub struct RollingPeriodJob {
    cancel: CancelFlag,
    handle: JoinHandle<Result<Vec<RollingPeriodReport>>>,
}

impl RollingPeriodJob {
    /// Start computing over an owned copy of the history.
    ///
    /// Fails with `Error::Job` when called outside a Tokio runtime.
    pub fn spawn(
        series_name: String,
        stats: RollingPeriodStatistics,
        points: Vec<PricePoint>,
        periods_years: Vec<u32>,
    ) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::job(format!("rolling period job needs a Tokio runtime: {e}")))?;
        let cancel = CancelFlag::new();
        let flag = cancel.clone();
        let handle = runtime.spawn_blocking(move || {
            info!(series = %series_name, points = points.len(), ?periods_years, "rolling period job started");
            let reports = stats.compute(&points, &periods_years, &flag)?;
            info!(series = %series_name, "rolling period job finished");
            Ok(reports)
        });
        Ok(Self { cancel, handle })
    }

    /// Ask the job to stop at its next checkpoint.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the job has stopped running.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the reports.
    pub async fn join(self) -> Result<Vec<RollingPeriodReport>> {
        self.handle
            .await
            .map_err(|e| Error::job(format!("rolling period task failed: {e}")))?
    }
}
