//! # Observation Series
//!
//! Immutable (time, log-price) series on an ordinal day axis, plus the
//! acquisition seam used to build one from daily bars.
//!
//! Ordinal days follow the proleptic Gregorian count where 0001-01-01 is day 1,
//! so 1970-01-01 is day 719163.

use crate::errors::{validate_all_finite, validate_data_length, LpplError, LpplResult};
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Minimum number of points for a fit: four linear coefficients plus slack.
pub const MIN_OBSERVATIONS: usize = 5;

/// Ordinal day of 1970-01-01.
pub const UNIX_EPOCH_ORDINAL: i64 = 719_163;

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Convert a millisecond Unix timestamp to its ordinal day number.
pub fn unix_millis_to_ordinal(millis: i64) -> i64 {
    millis.div_euclid(MILLIS_PER_DAY) + UNIX_EPOCH_ORDINAL
}

/// Ordered, validated series of (time, log-price) observations.
///
/// Cloning is cheap; the data is shared.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationSeries {
    times: Arc<[f64]>,
    log_prices: Arc<[f64]>,
}

impl ObservationSeries {
    /// Build from parallel time and log-price vectors.
    ///
    /// Times must be finite and strictly increasing.
    pub fn new(times: Vec<f64>, log_prices: Vec<f64>) -> LpplResult<Self> {
        if times.len() != log_prices.len() {
            return Err(LpplError::InvalidObservations {
                reason: format!(
                    "time axis has {} points but price axis has {}",
                    times.len(),
                    log_prices.len()
                ),
            });
        }
        validate_data_length(times.len(), MIN_OBSERVATIONS)?;
        validate_all_finite(&times, "times")?;
        validate_all_finite(&log_prices, "log_prices")?;

        if let Some(i) = times.windows(2).position(|w| w[1] <= w[0]) {
            return Err(LpplError::InvalidObservations {
                reason: format!(
                    "times must be strictly increasing: t[{}] = {} is followed by t[{}] = {}",
                    i,
                    times[i],
                    i + 1,
                    times[i + 1]
                ),
            });
        }

        Ok(Self {
            times: times.into(),
            log_prices: log_prices.into(),
        })
    }

    /// Build from (time, log-price) pairs.
    pub fn from_pairs(pairs: &[(f64, f64)]) -> LpplResult<Self> {
        let (times, log_prices) = pairs.iter().copied().unzip();
        Self::new(times, log_prices)
    }

    /// Build from (time, price) pairs, log-transforming strictly positive prices.
    pub fn from_prices(times: Vec<f64>, prices: &[f64]) -> LpplResult<Self> {
        if let Some((i, &p)) = prices.iter().enumerate().find(|(_, p)| !(**p > 0.0)) {
            return Err(LpplError::InvalidObservations {
                reason: format!("price at index {} must be positive, got {}", i, p),
            });
        }
        Self::new(times, prices.iter().map(|p| p.ln()).collect())
    }

    /// Build from daily bars: ordinal day of the open time, log of the close.
    pub fn from_daily_bars(bars: &[DailyBar]) -> LpplResult<Self> {
        let times = bars
            .iter()
            .map(|b| unix_millis_to_ordinal(b.open_time_ms) as f64)
            .collect();
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        Self::from_prices(times, &closes)
    }

    /// Number of observations.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// Always false for a validated series; kept for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Time axis.
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Observed log-prices.
    pub fn log_prices(&self) -> &[f64] {
        &self.log_prices
    }

    /// First observed time.
    pub fn first_time(&self) -> f64 {
        self.times[0]
    }

    /// Last observed time.
    pub fn last_time(&self) -> f64 {
        self.times[self.times.len() - 1]
    }

    /// Distance between the first and last observation.
    pub fn span(&self) -> f64 {
        self.last_time() - self.first_time()
    }

    /// Sub-series of the half-open index range `[start, end)`.
    pub fn window(&self, start: usize, end: usize) -> LpplResult<Self> {
        if start >= end || end > self.len() {
            return Err(LpplError::InvalidObservations {
                reason: format!(
                    "window [{}, {}) is outside a series of {} points",
                    start,
                    end,
                    self.len()
                ),
            });
        }
        validate_data_length(end - start, MIN_OBSERVATIONS)?;
        Ok(Self {
            times: self.times[start..end].into(),
            log_prices: self.log_prices[start..end].into(),
        })
    }

    /// Iterator over (time, log-price) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.times.iter().copied().zip(self.log_prices.iter().copied())
    }
}

/// One daily bar as handed over by a data source.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DailyBar {
    /// Open time in milliseconds since the Unix epoch
    pub open_time_ms: i64,
    /// Close price
    pub close: f64,
}

/// Source of daily bars for a time range.
///
/// Downloading and file handling live behind this trait, outside the crate.
pub trait DailyBarSource {
    /// Bars whose open time lies in `[start_ms, end_ms]`, ordered by open time.
    fn fetch_daily_bars(&self, start_ms: i64, end_ms: i64) -> LpplResult<Vec<DailyBar>>;
}

/// In-memory bar source.
#[derive(Debug, Clone, Default)]
pub struct VecBarSource {
    bars: Vec<DailyBar>,
}

impl VecBarSource {
    /// Wrap bars, sorting them by open time.
    pub fn new(mut bars: Vec<DailyBar>) -> Self {
        bars.sort_by_key(|b| b.open_time_ms);
        Self { bars }
    }
}

impl DailyBarSource for VecBarSource {
    fn fetch_daily_bars(&self, start_ms: i64, end_ms: i64) -> LpplResult<Vec<DailyBar>> {
        Ok(self
            .bars
            .iter()
            .filter(|b| (start_ms..=end_ms).contains(&b.open_time_ms))
            .copied()
            .collect())
    }
}

impl ObservationSeries {
    /// Fetch a range from a source and build the series.
    pub fn from_source<S: DailyBarSource + ?Sized>(
        source: &S,
        start_ms: i64,
        end_ms: i64,
    ) -> LpplResult<Self> {
        let bars = source.fetch_daily_bars(start_ms, end_ms)?;
        log::debug!("fetched {} daily bars for [{}, {}]", bars.len(), start_ms, end_ms);
        Self::from_daily_bars(&bars)
    }
}
