//! Per-series calculation context.
//!
//! Owns one instance of every tracker for a time series, runs the per-insert
//! pipeline in its fixed order and answers point-in-time queries.

use crate::job::RollingPeriodJob;
use crate::rolling_period::RollingPeriodStatistics;
use chrono::NaiveDate;
use pricestats_core::{
    Config, DailyReturnInfo, DrawdownEpisode, Error, MissResolution, MonthlyReturn, Observation, PriceBasis,
    PricePoint, Result, ReturnPeriod, RollingPeriodConfig, SeriesSettings,
};
use pricestats_trackers::{
    price_return, DailyReturnTracker, DrawdownCalculator, GainLossAccumulator, GainLossState,
    RollingVolatilityTracker, SlidingLowHighTracker, SortedSeries, VolatilityState, WindowState,
};
use statrs::statistics::Statistics;
use tracing::{debug, warn};

/// Observations examined when stepping back over unusable prices.
const MAX_RESOLUTION_TRIES: usize = 5;

/// Months per year, for annualizing monthly volatility.
const MONTHS_PER_YEAR: f64 = 12.0;

/// What an insert did to the series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Appended after the latest observation and run through the pipeline.
    Appended,
    /// Same date as the latest observation; ignored.
    Duplicate,
    /// Earlier than the latest observation; derived state was rebuilt.
    Replayed,
}

/// Calculation context for one time series.
#[derive(Debug)]
pub struct CalculationContext {
    settings: SeriesSettings,
    rolling_periods: RollingPeriodConfig,
    security_id: Option<String>,
    observations: SortedSeries<NaiveDate, PricePoint>,
    daily_returns: DailyReturnTracker,
    gain_loss: GainLossAccumulator,
    volatility: RollingVolatilityTracker,
    low_high: SlidingLowHighTracker,
    /// Newest observation fed through the pipeline.
    latest: Option<PricePoint>,
}

impl CalculationContext {
    /// Create a context for a series.
    pub fn new(settings: SeriesSettings) -> Result<Self> {
        Self::from_config(&Config {
            series: settings,
            rolling_periods: RollingPeriodConfig::default(),
        })
    }

    /// Create a context from a full configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let settings = config.series.clone();

        Ok(Self {
            daily_returns: DailyReturnTracker::new(settings.price_basis),
            gain_loss: GainLossAccumulator::new(settings.gain_loss_window_days),
            volatility: RollingVolatilityTracker::new(
                settings.volatility_window_days,
                settings.annualization_factor,
            ),
            low_high: SlidingLowHighTracker::new(
                settings.moving_average_window_days,
                settings.price_basis,
            ),
            observations: SortedSeries::new(),
            security_id: None,
            latest: None,
            rolling_periods: config.rolling_periods.clone(),
            settings,
        })
    }

    /// Series settings.
    pub fn settings(&self) -> &SeriesSettings {
        &self.settings
    }

    /// Insert the next observation.
    pub fn insert(&mut self, observation: &Observation) -> Result<InsertOutcome> {
        if let Some(id) = &self.security_id {
            if *id != observation.security_id {
                return Err(Error::invariant(format!(
                    "observation for {} inserted into series of {}",
                    observation.security_id, id
                )));
            }
        } else {
            self.security_id = Some(observation.security_id.clone());
        }

        let point = observation.point();
        match self.latest {
            Some(latest) if latest.date == point.date => {
                debug!(date = %point.date, series = %self.settings.series_name, "duplicate observation ignored");
                Ok(InsertOutcome::Duplicate)
            }
            Some(latest) if point.date < latest.date => {
                if self.observations.contains_key(point.date) {
                    debug!(date = %point.date, series = %self.settings.series_name, "duplicate observation ignored");
                    return Ok(InsertOutcome::Duplicate);
                }
                warn!(
                    date = %point.date,
                    latest = %latest.date,
                    series = %self.settings.series_name,
                    "out-of-order observation, rebuilding derived state"
                );
                self.observations.add(point.date, point);
                self.replay()?;
                Ok(InsertOutcome::Replayed)
            }
            previous => {
                self.observations.add(point.date, point);
                self.run_pipeline(previous, point)?;
                Ok(InsertOutcome::Appended)
            }
        }
    }

    /// Insert observations in order, stopping at the first error.
    pub fn insert_all<'a>(
        &mut self,
        observations: impl IntoIterator<Item = &'a Observation>,
    ) -> Result<()> {
        for observation in observations {
            self.insert(observation)?;
        }
        Ok(())
    }

    /// Daily return, then gain/loss, then volatility, then low/high window.
    ///
    /// Later steps read what earlier steps just wrote.
    fn run_pipeline(&mut self, previous: Option<PricePoint>, point: PricePoint) -> Result<()> {
        if let Some(previous) = previous {
            let info = self.daily_returns.record(previous, point)?;
            self.gain_loss.update(&info)?;

            let recorded = self
                .daily_returns
                .lookup_as_of(point.date)
                .filter(|r| r.date() == point.date)
                .ok_or_else(|| {
                    Error::invariant(format!("no daily return recorded for {}", point.date))
                })?;
            self.volatility.update(&recorded)?;
        }
        self.low_high.push(point)?;
        self.latest = Some(point);
        Ok(())
    }

    /// Rebuild every tracker from the sorted observation history.
    fn replay(&mut self) -> Result<()> {
        let settings = &self.settings;
        self.daily_returns = DailyReturnTracker::new(settings.price_basis);
        self.gain_loss = GainLossAccumulator::new(settings.gain_loss_window_days);
        self.volatility = RollingVolatilityTracker::new(
            settings.volatility_window_days,
            settings.annualization_factor,
        );
        self.low_high =
            SlidingLowHighTracker::new(settings.moving_average_window_days, settings.price_basis);
        self.latest = None;

        for point in self.observations.values() {
            let previous = self.latest;
            self.run_pipeline(previous, point)?;
        }
        Ok(())
    }

    /// Number of stored observations.
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// Whether no observation has been inserted.
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Date of the earliest observation.
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.observations.first().map(|e| e.key)
    }

    /// Date of the latest observation.
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.latest.map(|p| p.date)
    }

    /// Observation for `date` resolved under `policy`.
    ///
    /// With [`MissResolution::Preceding`], observations whose `basis` price
    /// is zero are stepped over, up to a bounded number of tries.
    pub fn observation(
        &self,
        date: NaiveDate,
        basis: PriceBasis,
        policy: MissResolution,
    ) -> Result<Option<PricePoint>> {
        if policy == MissResolution::Preceding {
            return Ok(self
                .observations
                .find_back(date, MAX_RESOLUTION_TRIES, |e| e.value.price_for(basis) != 0.0)
                .map(|e| e.value));
        }
        Ok(self.observations.get(date, policy)?.map(|e| e.value))
    }

    /// Observations between `from` and `to`, defaulting to the full history.
    pub fn observations(&self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Vec<PricePoint> {
        let (Some(first), Some(last)) = (self.first_date(), self.last_date()) else {
            return Vec::new();
        };
        self.observations.with_range(from.unwrap_or(first), to.unwrap_or(last), |entries| {
            entries.iter().map(|e| e.value).collect()
        })
    }

    /// Resolve both ends of a return query, earliest first.
    fn resolve_span(
        &self,
        from: NaiveDate,
        to: Option<NaiveDate>,
        basis: PriceBasis,
        policy: MissResolution,
    ) -> Result<Option<(PricePoint, PricePoint)>> {
        let Some(start) = self.observation(from, basis, policy)? else {
            return Ok(None);
        };
        let end = match to {
            Some(to) => self.observation(to, basis, policy)?,
            None => self.latest,
        };
        Ok(end.map(|end| {
            if end.date < start.date {
                (end, start)
            } else {
                (start, end)
            }
        }))
    }

    /// Absolute return between `from` and `to` (latest when `None`).
    ///
    /// Missing dates are resolved under `policy`; `None` when either end
    /// cannot be resolved.
    pub fn absolute_return(
        &self,
        from: NaiveDate,
        to: Option<NaiveDate>,
        basis: PriceBasis,
        policy: MissResolution,
    ) -> Result<Option<f64>> {
        Ok(self
            .resolve_span(from, to, basis, policy)?
            .map(|(start, end)| price_return(start.price_for(basis), end.price_for(basis))))
    }

    /// Compound average return per `period` between `from` and `to`.
    ///
    /// Bounds may be given in either order. The earlier one resolves to the
    /// next available observation and the later one to the previous one.
    /// `None` if the resolved span covers no time.
    pub fn average_return(
        &self,
        from: NaiveDate,
        to: Option<NaiveDate>,
        basis: PriceBasis,
        period: ReturnPeriod,
    ) -> Result<Option<f64>> {
        let (from, to) = match to {
            Some(to) if to < from => (to, Some(from)),
            _ => (from, to),
        };
        let Some(start) = self.observation(from, basis, MissResolution::Following)? else {
            return Ok(None);
        };
        let end = match to {
            Some(to) => self.observation(to, basis, MissResolution::Preceding)?,
            None => self.latest,
        };
        let Some(end) = end else {
            return Ok(None);
        };

        let days = (end.date - start.date).num_days();
        if days <= 0 {
            return Ok(None);
        }
        let growth = 1.0 + price_return(start.price_for(basis), end.price_for(basis));
        if growth <= 0.0 {
            return Ok(Some(-1.0));
        }
        Ok(Some(growth.powf(period.days() / days as f64) - 1.0))
    }

    /// Returns between consecutive month-end observations.
    ///
    /// The first month is measured from the first observation in range.
    pub fn monthly_returns(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        basis: PriceBasis,
    ) -> Vec<MonthlyReturn> {
        let points = self.observations(from, to);
        let Some(&first) = points.first() else {
            return Vec::new();
        };

        let month_ends = points
            .windows(2)
            .filter(|w| w[0].month_key() != w[1].month_key())
            .map(|w| w[0])
            .chain(points.last().copied());

        let mut anchor = first;
        let mut returns = Vec::new();
        for month_end in month_ends {
            if month_end.date == anchor.date {
                continue;
            }
            returns.push(MonthlyReturn {
                from: anchor,
                to: month_end,
                absolute_return: price_return(anchor.price_for(basis), month_end.price_for(basis)),
            });
            anchor = month_end;
        }
        returns
    }

    /// Annualized volatility of monthly returns.
    ///
    /// `None` with fewer than two monthly returns.
    pub fn monthly_volatility(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        basis: PriceBasis,
    ) -> Option<f64> {
        let returns: Vec<f64> = self
            .monthly_returns(from, to, basis)
            .iter()
            .map(|r| r.absolute_return)
            .collect();
        if returns.len() < 2 {
            return None;
        }
        Some(returns.iter().std_dev() * MONTHS_PER_YEAR.sqrt())
    }

    /// Worst peak-to-trough episode between `from` and `to`.
    pub fn maximum_drawdown_detail(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        basis: PriceBasis,
    ) -> Option<DrawdownEpisode> {
        DrawdownCalculator::new(basis).max_drawdown(&self.observations(from, to))
    }

    /// Maximum drawdown return between `from` and `to`.
    ///
    /// `Some(0.0)` for a range that never declines, `None` for fewer than
    /// two observations.
    pub fn maximum_drawdown(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        basis: PriceBasis,
    ) -> Option<f64> {
        let points = self.observations(from, to);
        if points.len() < 2 {
            return None;
        }
        Some(
            DrawdownCalculator::new(basis)
                .max_drawdown(&points)
                .map_or(0.0, |episode| episode.drawdown_return),
        )
    }

    /// Annualized daily-return volatility at or before `date`.
    pub fn volatility_as_of(&self, date: NaiveDate) -> Option<f64> {
        self.volatility.as_of(date).map(|s| s.annualized_volatility)
    }

    /// Full volatility snapshot at or before `date`.
    pub fn volatility_state_as_of(&self, date: NaiveDate) -> Option<VolatilityState> {
        self.volatility.as_of(date)
    }

    /// Low/high window at or before `date`.
    pub fn low_high_window_as_of(&self, date: NaiveDate) -> Option<WindowState> {
        self.low_high.as_of(date)
    }

    /// Observations covered by a window returned from this context.
    pub fn window_records(&self, state: &WindowState) -> &[PricePoint] {
        self.low_high.window_records(state)
    }

    /// Gain/loss snapshot at or before `date`.
    pub fn gain_loss_as_of(&self, date: NaiveDate) -> Option<GainLossState> {
        self.gain_loss.as_of(date)
    }

    /// Daily returns making up a gain/loss snapshot from this context.
    pub fn gain_loss_records(&self, state: &GainLossState) -> &[DailyReturnInfo] {
        self.gain_loss.window_records(state)
    }

    /// Daily returns on the series' price basis, in date order.
    pub fn enumerate_daily_returns(&self) -> impl Iterator<Item = f64> {
        self.daily_returns
            .all()
            .into_iter()
            .map(|info| info.absolute_return)
    }

    /// Monthly returns on the series' price basis, in date order.
    pub fn enumerate_monthly_returns(&self) -> impl Iterator<Item = f64> {
        self.monthly_returns(None, None, self.settings.price_basis)
            .into_iter()
            .map(|r| r.absolute_return)
    }

    /// Start the rolling N-year histogram job for `periods_years`.
    ///
    /// The job works on a copy of the history taken now; later inserts are
    /// not seen by it. Fails with `Error::Job` outside a Tokio runtime.
    pub fn run_rolling_period_histograms(&self, periods_years: &[u32]) -> Result<RollingPeriodJob> {
        let points = match (self.first_date(), self.last_date()) {
            (Some(first), Some(last)) => self.observations.clone_range(first, last).values(),
            _ => Vec::new(),
        };
        RollingPeriodJob::spawn(
            self.settings.series_name.clone(),
            RollingPeriodStatistics::new(self.settings.price_basis, self.rolling_periods.bucket_width),
            points,
            periods_years.to_vec(),
        )
    }

    /// Start the job for the configured horizons.
    pub fn run_configured_rolling_periods(&self) -> Result<RollingPeriodJob> {
        self.run_rolling_period_histograms(&self.rolling_periods.periods_years)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::{Datelike, Duration, Weekday};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn is_weekday(d: NaiveDate) -> bool {
        !matches!(d.weekday(), Weekday::Sat | Weekday::Sun)
    }

    /// Trading days between `anchors`, log-linear in price between them.
    fn anchored_series(anchors: &[(NaiveDate, f64)]) -> Vec<Observation> {
        let mut out = Vec::new();
        for pair in anchors.windows(2) {
            let ((d0, p0), (d1, p1)) = (pair[0], pair[1]);
            let span = (d1 - d0).num_days() as f64;
            let mut d = d0;
            while d < d1 {
                if is_weekday(d) {
                    let t = (d - d0).num_days() as f64 / span;
                    let price = p0 * (p1 / p0).powf(t);
                    out.push(Observation::new("ADS", d, price * 3.0, price));
                }
                d += Duration::days(1);
            }
        }
        if let Some(&(d, p)) = anchors.last() {
            out.push(Observation::new("ADS", d, p * 3.0, p));
        }
        out
    }

    /// Stand-in for the reference history: 1995-11-17 to 2018-03-08 with
    /// an 18.1024x gain and a 71.54% crash in between.
    fn reference_series() -> Vec<Observation> {
        anchored_series(&[
            (date(1995, 11, 17), 10.0),
            (date(1998, 7, 1), 30.0),
            (date(2003, 3, 12), 30.0 * (1.0 - 0.7154)),
            (date(2018, 3, 8), 181.024),
        ])
    }

    fn small_settings() -> SeriesSettings {
        SeriesSettings {
            series_name: "test".to_string(),
            moving_average_window_days: 20,
            volatility_window_days: 30,
            gain_loss_window_days: 10,
            price_basis: PriceBasis::Adjusted,
            annualization_factor: 252.0,
        }
    }

    fn loaded(settings: SeriesSettings, series: &[Observation]) -> CalculationContext {
        let mut ctx = CalculationContext::new(settings).unwrap();
        ctx.insert_all(series).unwrap();
        ctx
    }

    #[test]
    fn test_reference_scenario() {
        let series = reference_series();
        let ctx = loaded(SeriesSettings::named("AdidasHistory"), &series);

        assert_eq!(ctx.first_date(), Some(date(1995, 11, 17)));
        assert_eq!(ctx.last_date(), Some(date(2018, 3, 8)));

        let first = ctx.first_date().unwrap();
        let compound = ctx
            .absolute_return(first, None, PriceBasis::Adjusted, MissResolution::Raise)
            .unwrap()
            .unwrap();
        assert_abs_diff_eq!(compound, 17.1024, epsilon = 1e-6);

        let annual = ctx
            .average_return(first, None, PriceBasis::Adjusted, ReturnPeriod::Annual)
            .unwrap()
            .unwrap();
        assert_abs_diff_eq!(annual, 0.1385, epsilon = 0.01);

        let drawdown = ctx.maximum_drawdown(None, None, PriceBasis::Adjusted).unwrap();
        assert_abs_diff_eq!(drawdown, -0.7154, epsilon = 0.01);

        let detail = ctx.maximum_drawdown_detail(None, None, PriceBasis::Adjusted).unwrap();
        assert_eq!(detail.peak.date, date(1998, 7, 1));
        assert_eq!(detail.trough.date, date(2003, 3, 12));
    }

    #[test]
    fn test_monthly_volatility_of_alternating_months() {
        // Flat within each month, alternating 100 / 110 between months.
        let mut series = Vec::new();
        let mut d = date(2010, 1, 1);
        while d < date(2012, 1, 1) {
            if is_weekday(d) {
                let price = if d.month() % 2 == 1 { 100.0 } else { 110.0 };
                series.push(Observation::new("X", d, price, price));
            }
            d += Duration::days(1);
        }
        let ctx = loaded(small_settings(), &series);

        let monthly = ctx.monthly_returns(None, None, PriceBasis::Adjusted);
        // January is flat from its first observation, then 23 month changes.
        assert_eq!(monthly.len(), 24);
        assert_abs_diff_eq!(monthly[0].absolute_return, 0.0);

        let values: Vec<f64> = monthly.iter().map(|r| r.absolute_return).collect();
        let expected = values.iter().std_dev() * 12f64.sqrt();
        let vol = ctx.monthly_volatility(None, None, PriceBasis::Adjusted).unwrap();
        assert_abs_diff_eq!(vol, expected, epsilon = 1e-12);
        assert!(vol > 0.3);
        assert_eq!(ctx.enumerate_monthly_returns().count(), 24);
    }

    #[test]
    fn test_date_resolution_policies() {
        let series = vec![
            Observation::new("X", date(2020, 1, 6), 10.0, 10.0),
            Observation::new("X", date(2020, 1, 8), 12.0, 12.0),
            Observation::new("X", date(2020, 1, 10), 15.0, 15.0),
        ];
        let ctx = loaded(small_settings(), &series);
        let missing = date(2020, 1, 7);
        let basis = PriceBasis::Adjusted;

        let prev = ctx
            .absolute_return(missing, None, basis, MissResolution::Preceding)
            .unwrap()
            .unwrap();
        assert_abs_diff_eq!(prev, 0.5, epsilon = 1e-12);

        let next = ctx
            .absolute_return(missing, None, basis, MissResolution::Following)
            .unwrap()
            .unwrap();
        assert_abs_diff_eq!(next, 0.25, epsilon = 1e-12);

        assert!(ctx.absolute_return(missing, None, basis, MissResolution::Invalid).unwrap().is_none());
        assert!(ctx
            .absolute_return(missing, None, basis, MissResolution::Raise)
            .unwrap_err()
            .is_not_found());

        // Reversed bounds measure the same span.
        let reversed = ctx
            .absolute_return(date(2020, 1, 10), Some(date(2020, 1, 6)), basis, MissResolution::Raise)
            .unwrap()
            .unwrap();
        assert_abs_diff_eq!(reversed, 0.5, epsilon = 1e-12);

        let forward = ctx
            .average_return(date(2020, 1, 6), Some(date(2020, 1, 10)), basis, ReturnPeriod::Monthly)
            .unwrap()
            .unwrap();
        let backward = ctx
            .average_return(date(2020, 1, 10), Some(date(2020, 1, 6)), basis, ReturnPeriod::Monthly)
            .unwrap()
            .unwrap();
        let month = ReturnPeriod::Monthly.days();
        assert_abs_diff_eq!(forward, 1.5f64.powf(month / 4.0) - 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(backward, forward, epsilon = 1e-12);

        // Reversed bounds that both miss still resolve inward.
        let inward = ctx
            .average_return(date(2020, 1, 10), Some(date(2020, 1, 7)), basis, ReturnPeriod::Monthly)
            .unwrap()
            .unwrap();
        assert_abs_diff_eq!(inward, 1.25f64.powf(month / 2.0) - 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_preceding_skips_zero_prices() {
        let series = vec![
            Observation::new("X", date(2020, 1, 6), 10.0, 10.0),
            Observation::new("X", date(2020, 1, 7), 0.0, 0.0),
            Observation::new("X", date(2020, 1, 8), 20.0, 20.0),
        ];
        let ctx = loaded(small_settings(), &series);

        let resolved = ctx
            .observation(date(2020, 1, 7), PriceBasis::Adjusted, MissResolution::Preceding)
            .unwrap()
            .unwrap();
        assert_eq!(resolved.date, date(2020, 1, 6));

        // The return measured from the zero price is zero, not infinite.
        let returns: Vec<f64> = ctx.enumerate_daily_returns().collect();
        assert_eq!(returns.len(), 2);
        assert_abs_diff_eq!(returns[0], -1.0);
        assert_eq!(returns[1], 0.0);
    }

    #[test]
    fn test_trackers_absent_before_bootstrap() {
        let series = anchored_series(&[(date(2020, 1, 1), 10.0), (date(2020, 1, 20), 12.0)]);
        let ctx = loaded(small_settings(), &series);
        let last = ctx.last_date().unwrap();

        assert!(ctx.volatility_as_of(last).is_none());
        assert!(ctx.low_high_window_as_of(last).is_none());
        assert!(ctx.gain_loss_as_of(last).is_some());
    }

    #[test]
    fn test_as_of_queries() {
        let series = reference_series();
        let ctx = loaded(small_settings(), &series[..400]);
        let d = series[300].date;

        let vol = ctx.volatility_state_as_of(d).unwrap();
        assert_eq!(vol.date, d);
        assert_abs_diff_eq!(ctx.volatility_as_of(d).unwrap(), vol.annualized_volatility);

        let window = ctx.low_high_window_as_of(d).unwrap();
        assert_eq!(window.last.date, d);
        let records = ctx.window_records(&window);
        assert_eq!(records.len(), 20);
        assert_eq!(records.last().unwrap().date, d);

        let gl = ctx.gain_loss_as_of(d).unwrap();
        assert_eq!(gl.date, d);
        let gl_records = ctx.gain_loss_records(&gl);
        assert_eq!(gl_records.len(), gl.return_count);
        assert_eq!(gl_records.last().unwrap().date(), d);
        let sum: f64 = gl_records.iter().map(|r| r.absolute_return).sum();
        assert_abs_diff_eq!(gl.net(), sum, epsilon = 1e-10);

        // A weekend resolves to the Friday before it.
        let friday = series[300..]
            .iter()
            .map(|o| o.date)
            .find(|d| d.weekday() == Weekday::Fri)
            .unwrap();
        let saturday = friday + Duration::days(1);
        assert_eq!(ctx.gain_loss_as_of(saturday).unwrap().date, friday);
        assert_eq!(ctx.volatility_state_as_of(saturday).unwrap().date, friday);
        assert_eq!(ctx.low_high_window_as_of(saturday).unwrap().last.date, friday);
    }

    #[test]
    fn test_duplicate_and_out_of_order_inserts() {
        let series = reference_series();
        // Odd length, so the last even index is also the latest date.
        let head = &series[..201];

        let in_order = loaded(small_settings(), head);

        let mut shuffled = CalculationContext::new(small_settings()).unwrap();
        for obs in head.iter().step_by(2) {
            assert_eq!(shuffled.insert(obs).unwrap(), InsertOutcome::Appended);
        }
        for obs in head.iter().skip(1).step_by(2) {
            assert_eq!(shuffled.insert(obs).unwrap(), InsertOutcome::Replayed);
        }
        assert_eq!(shuffled.insert(&head[10]).unwrap(), InsertOutcome::Duplicate);
        assert_eq!(shuffled.insert(&head[200]).unwrap(), InsertOutcome::Duplicate);

        let last = in_order.last_date().unwrap();
        assert_eq!(shuffled.len(), in_order.len());
        assert_eq!(shuffled.low_high_window_as_of(last), in_order.low_high_window_as_of(last));
        assert_eq!(shuffled.gain_loss_as_of(last), in_order.gain_loss_as_of(last));
        assert_abs_diff_eq!(
            shuffled.volatility_as_of(last).unwrap(),
            in_order.volatility_as_of(last).unwrap(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_foreign_security_rejected() {
        let mut ctx = CalculationContext::new(small_settings()).unwrap();
        ctx.insert(&Observation::new("A", date(2020, 1, 6), 1.0, 1.0)).unwrap();
        let err = ctx.insert(&Observation::new("B", date(2020, 1, 7), 1.0, 1.0)).unwrap_err();
        assert!(matches!(err, Error::Invariant(_)));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut settings = small_settings();
        settings.moving_average_window_days = 0;
        assert!(matches!(CalculationContext::new(settings), Err(Error::Config(_))));
    }

    #[test]
    fn test_empty_context_queries() {
        let ctx = CalculationContext::new(small_settings()).unwrap();
        let d = date(2020, 1, 1);
        assert!(ctx.is_empty());
        assert!(ctx.maximum_drawdown(None, None, PriceBasis::Adjusted).is_none());
        assert!(ctx.monthly_volatility(None, None, PriceBasis::Adjusted).is_none());
        assert!(ctx.absolute_return(d, None, PriceBasis::Adjusted, MissResolution::Preceding).unwrap().is_none());
        assert_eq!(ctx.enumerate_daily_returns().count(), 0);
    }

    #[test]
    fn test_rolling_period_job_needs_runtime() {
        let series = reference_series();
        let ctx = loaded(small_settings(), &series[..300]);

        let err = ctx.run_rolling_period_histograms(&[1]).unwrap_err();
        assert!(matches!(err, Error::Job(_)));
        assert!(matches!(ctx.run_configured_rolling_periods(), Err(Error::Job(_))));
    }

    #[tokio::test]
    async fn test_rolling_period_job() {
        let series = reference_series();
        let ctx = loaded(small_settings(), &series);

        let reports = ctx.run_rolling_period_histograms(&[1, 10]).unwrap().join().await.unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].period_years, 1);
        assert!(reports[0].results.len() > reports[1].results.len());
        for report in &reports {
            assert!(report.results.iter().all(|r| r.compound_return.is_finite()));
            assert_eq!(report.histogram.total_count(), report.results.len());
            assert_eq!(report.histogram.bucket_width(), 0.01);
            let summary = report.summary.unwrap();
            assert!(summary.min - 0.01 < summary.mode && summary.mode <= summary.max);
        }
    }

    #[tokio::test]
    async fn test_configured_rolling_periods() {
        let config = Config::from_json(
            r#"{ "series": { "series_name": "cfg" }, "rolling_periods": { "periods_years": [2, 4] } }"#,
        )
        .unwrap();
        let mut ctx = CalculationContext::from_config(&config).unwrap();
        ctx.insert_all(&reference_series()[..1600]).unwrap();

        let job = ctx.run_configured_rolling_periods().unwrap();
        // Inserts after the job starts are not part of its snapshot.
        ctx.insert_all(&reference_series()[1600..1700]).unwrap();
        let reports = job.join().await.unwrap();

        let years: Vec<u32> = reports.iter().map(|r| r.period_years).collect();
        assert_eq!(years, vec![2, 4]);
        let last_seen = reference_series()[1599].date;
        assert!(reports[0].results.iter().all(|r| r.to_date <= last_seen));
    }

    #[tokio::test]
    async fn test_rolling_period_job_cancel() {
        let series = reference_series();
        let ctx = loaded(small_settings(), &series);

        let job = ctx.run_rolling_period_histograms(&[1, 2, 3, 5, 10, 15, 20]).unwrap();
        job.cancel();
        match job.join().await {
            // The job may finish before it sees the flag.
            Ok(reports) => assert_eq!(reports.len(), 7),
            Err(err) => assert!(matches!(err, Error::Cancelled(_))),
        }
    }
}
