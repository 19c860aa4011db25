//! # Nested Window Fits
//!
//! Slides an analysis window over the series and, for each window end-point,
//! shrinks the window start inward. Every (outer, inner) grid point gets its own
//! multi-start search. The results keep the grid enumeration order: outer
//! end-points from the most recent observation backward, and within each
//! end-point the inner windows from longest to shortest.
//!
//! Grid points are independent and run on a fixed-size rayon pool when the
//! `parallel` feature is enabled. A failed grid point is kept as an entry
//! without a fit; only a run where no grid point converged is an error.

use crate::config::NestedFitConfig;
use crate::errors::{validate_data_length, LpplError, LpplResult};
use crate::fitter::FitResult;
use crate::observations::ObservationSeries;
use crate::search::search;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Location of one sub-window in the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WindowPosition {
    /// Index of the end-point, 0 = most recent
    pub outer_index: usize,
    /// Index of the shrink step, 0 = full window
    pub inner_index: usize,
    /// First observation index (inclusive)
    pub start: usize,
    /// Last observation index (exclusive)
    pub end: usize,
}

impl WindowPosition {
    /// Number of observations in the window.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Never true for grid positions.
    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// The (outer, inner) window grid over a series of `n` observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowGrid {
    n: usize,
    window_size: usize,
    smallest_window_size: usize,
    outer_increment: usize,
    inner_increment: usize,
}

impl WindowGrid {
    /// Grid for `n` observations; the series must hold at least one full window.
    pub fn new(n: usize, config: &NestedFitConfig) -> LpplResult<Self> {
        config.validate()?;
        validate_data_length(n, config.window_size)?;
        Ok(Self {
            n,
            window_size: config.window_size,
            smallest_window_size: config.smallest_window_size,
            outer_increment: config.outer_increment,
            inner_increment: config.inner_increment,
        })
    }

    /// Number of window end-points.
    pub fn outer_count(&self) -> usize {
        (self.n - self.window_size) / self.outer_increment + 1
    }

    /// Number of shrink steps per end-point.
    pub fn inner_count(&self) -> usize {
        (self.window_size - self.smallest_window_size) / self.inner_increment + 1
    }

    /// Total grid points.
    pub fn len(&self) -> usize {
        self.outer_count() * self.inner_count()
    }

    /// Never true for a constructed grid.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All positions in enumeration order.
    pub fn positions(&self) -> Vec<WindowPosition> {
        let inner = self.inner_count();
        (0..self.outer_count())
            .flat_map(|outer_index| {
                let end = self.n - outer_index * self.outer_increment;
                let full_start = end - self.window_size;
                (0..inner).map(move |inner_index| WindowPosition {
                    outer_index,
                    inner_index,
                    start: full_start + inner_index * self.inner_increment,
                    end,
                })
            })
            .collect()
    }
}

/// Shared cancellation flag for a windowed run.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Fresh, not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; grid points not yet started are abandoned.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Outcome of one grid point.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WindowResult {
    /// Grid location
    pub position: WindowPosition,
    /// Time of the first observation in the window
    pub window_start: f64,
    /// Time of the last observation in the window
    pub window_end: f64,
    /// Best converged fit, `None` when the window failed
    pub best_fit: Option<FitResult>,
    /// Why the window has no fit
    pub failure: Option<String>,
}

impl WindowResult {
    /// Whether the window produced a fit.
    pub fn is_converged(&self) -> bool {
        self.best_fit.is_some()
    }

    /// Span of the window on the time axis.
    pub fn span(&self) -> f64 {
        self.window_end - self.window_start
    }
}

/// All grid results of a nested run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NestedFitReport {
    /// Results in grid enumeration order
    pub windows: Vec<WindowResult>,
    /// Number of end-points
    pub outer_count: usize,
    /// Number of shrink steps per end-point
    pub inner_count: usize,
}

impl NestedFitReport {
    /// Grid points with a fit.
    pub fn converged_count(&self) -> usize {
        self.windows.iter().filter(|w| w.is_converged()).count()
    }

    /// Grid points without a fit.
    pub fn failed_count(&self) -> usize {
        self.windows.len() - self.converged_count()
    }

    /// Results of one end-point, longest window first.
    pub fn outer_group(&self, outer_index: usize) -> &[WindowResult] {
        let start = (outer_index * self.inner_count).min(self.windows.len());
        let end = (start + self.inner_count).min(self.windows.len());
        &self.windows[start..end]
    }
}

/// Fit one grid point, turning recoverable failures into a missing entry.
fn fit_window(
    observations: &ObservationSeries,
    config: &NestedFitConfig,
    grid_index: usize,
    position: WindowPosition,
    cancel: &CancellationToken,
) -> LpplResult<WindowResult> {
    if cancel.is_cancelled() {
        return Err(LpplError::Cancelled);
    }

    let times = observations.times();
    let mut result = WindowResult {
        position,
        window_start: times[position.start],
        window_end: times[position.end - 1],
        best_fit: None,
        failure: None,
    };

    let outcome = observations
        .window(position.start, position.end)
        .and_then(|window| {
            search(
                &window,
                &config.bounds,
                &config.search_config_for(grid_index),
                &config.fit,
            )
        });

    match outcome {
        Ok(outcome) => result.best_fit = Some(outcome.best),
        Err(e) if e.is_recoverable() => {
            log::debug!(
                "window {:?} ({} points) has no fit: {}",
                position,
                position.len(),
                e
            );
            result.failure = Some(e.to_string());
        }
        Err(e) => return Err(e),
    }
    Ok(result)
}

#[cfg(feature = "parallel")]
fn run_grid(
    observations: &ObservationSeries,
    config: &NestedFitConfig,
    positions: Vec<WindowPosition>,
    cancel: &CancellationToken,
) -> LpplResult<Vec<WindowResult>> {
    use rayon::prelude::*;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers)
        .build()
        .map_err(|e| LpplError::NumericalError {
            reason: format!("failed to build worker pool: {}", e),
        })?;

    pool.install(|| {
        positions
            .into_par_iter()
            .enumerate()
            .map(|(i, position)| fit_window(observations, config, i, position, cancel))
            .collect()
    })
}

#[cfg(not(feature = "parallel"))]
fn run_grid(
    observations: &ObservationSeries,
    config: &NestedFitConfig,
    positions: Vec<WindowPosition>,
    cancel: &CancellationToken,
) -> LpplResult<Vec<WindowResult>> {
    positions
        .into_iter()
        .enumerate()
        .map(|(i, position)| fit_window(observations, config, i, position, cancel))
        .collect()
}

/// Run the nested window grid over `observations`.
pub fn run_windows(
    observations: &ObservationSeries,
    config: &NestedFitConfig,
) -> LpplResult<NestedFitReport> {
    run_windows_with_cancel(observations, config, &CancellationToken::new())
}

/// Run the nested window grid, abandoning it when `cancel` fires.
///
/// A cancelled run returns [`LpplError::Cancelled`] and no partial report.
pub fn run_windows_with_cancel(
    observations: &ObservationSeries,
    config: &NestedFitConfig,
    cancel: &CancellationToken,
) -> LpplResult<NestedFitReport> {
    let grid = WindowGrid::new(observations.len(), config)?;
    let positions = grid.positions();
    let total = positions.len();

    log::info!(
        "nested fit over {} points: {} end-points x {} windows, {} attempts each",
        observations.len(),
        grid.outer_count(),
        grid.inner_count(),
        config.max_attempts
    );

    let windows = run_grid(observations, config, positions, cancel)?;
    let report = NestedFitReport {
        windows,
        outer_count: grid.outer_count(),
        inner_count: grid.inner_count(),
    };

    let converged = report.converged_count();
    if converged == 0 {
        return Err(LpplError::NoWindowConverged { windows: total });
    }
    if converged < total {
        log::warn!(
            "{} of {} windows produced no fit and are excluded from indicators",
            total - converged,
            total
        );
    } else {
        log::info!("all {} windows converged", total);
    }
    Ok(report)
}
