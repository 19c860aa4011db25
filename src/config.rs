//! # Fitting Configuration
//!
//! Configuration structures for the single-start solver, the search bounds,
//! the multi-start search and the nested window run. Each structure has a
//! `Default` and a `validate()` that rejects values the algorithms cannot use.

use crate::errors::{validate_parameter, validate_positive, LpplError, LpplResult};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Solver settings for the bounded Levenberg-Marquardt fit.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FitConfig {
    /// Maximum outer iterations before the attempt is declared non-converged
    pub max_iterations: usize,
    /// Convergence when the gradient infinity-norm falls below this
    pub gradient_tolerance: f64,
    /// Convergence when the relative cost reduction of a step falls below this
    pub cost_tolerance: f64,
    /// Convergence when the relative step length falls below this
    pub step_tolerance: f64,
    /// Starting damping factor
    pub initial_damping: f64,
    /// Damping above which no descent direction is considered to exist
    pub max_damping: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            gradient_tolerance: 1e-10,
            cost_tolerance: 1e-12,
            step_tolerance: 1e-10,
            initial_damping: 1e-3,
            max_damping: 1e12,
        }
    }
}

impl FitConfig {
    /// Tighter tolerances and a larger iteration budget.
    pub fn strict() -> Self {
        Self {
            max_iterations: 1000,
            gradient_tolerance: 1e-12,
            cost_tolerance: 1e-14,
            step_tolerance: 1e-12,
            ..Self::default()
        }
    }

    /// Looser tolerances for wide window sweeps.
    pub fn fast() -> Self {
        Self {
            max_iterations: 100,
            gradient_tolerance: 1e-8,
            cost_tolerance: 1e-9,
            step_tolerance: 1e-8,
            ..Self::default()
        }
    }

    /// Check that every setting is usable.
    pub fn validate(&self) -> LpplResult<()> {
        validate_positive(self.max_iterations, "max_iterations")?;
        for (name, value) in [
            ("gradient_tolerance", self.gradient_tolerance),
            ("cost_tolerance", self.cost_tolerance),
            ("step_tolerance", self.step_tolerance),
            ("initial_damping", self.initial_damping),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(LpplError::InvalidParameter {
                    parameter: name.to_string(),
                    value,
                    constraint: "must be finite and > 0".to_string(),
                });
            }
        }
        if !(self.max_damping > self.initial_damping) {
            return Err(LpplError::InvalidParameter {
                parameter: "max_damping".to_string(),
                value: self.max_damping,
                constraint: format!("must be > initial_damping ({})", self.initial_damping),
            });
        }
        Ok(())
    }
}

/// How the nonlinear search box is derived from a window.
///
/// The critical time is searched in
/// `[t_last + tc_margin, t_last + tc_horizon_factor * (t_last - t_first)]`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BoundsConfig {
    /// Horizon beyond the last observation, as a fraction of the window span
    pub tc_horizon_factor: f64,
    /// Minimum distance (in days) between the last observation and tc
    pub tc_margin: f64,
    /// Exponent range, inside (0, 1)
    pub m_range: (f64, f64),
    /// Angular log-frequency range
    pub w_range: (f64, f64),
}

impl Default for BoundsConfig {
    fn default() -> Self {
        Self {
            tc_horizon_factor: 0.5,
            tc_margin: 1e-3,
            m_range: (0.01, 0.99),
            w_range: (4.0, 25.0),
        }
    }
}

impl BoundsConfig {
    /// Check that every range is well formed.
    pub fn validate(&self) -> LpplResult<()> {
        validate_parameter(self.tc_horizon_factor, f64::MIN_POSITIVE, 10.0, "tc_horizon_factor")?;
        validate_parameter(self.tc_margin, f64::MIN_POSITIVE, f64::MAX, "tc_margin")?;

        let (m_lo, m_hi) = self.m_range;
        if !(m_lo > 0.0 && m_hi < 1.0 && m_lo < m_hi) {
            return Err(LpplError::InvalidParameter {
                parameter: "m_range".to_string(),
                value: if m_lo <= 0.0 { m_lo } else { m_hi },
                constraint: "must satisfy 0 < min < max < 1".to_string(),
            });
        }

        let (w_lo, w_hi) = self.w_range;
        if !(w_lo > 0.0 && w_lo < w_hi && w_hi.is_finite()) {
            return Err(LpplError::InvalidParameter {
                parameter: "w_range".to_string(),
                value: w_lo,
                constraint: "must satisfy 0 < min < max".to_string(),
            });
        }
        Ok(())
    }
}

/// Settings for one multi-start search.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SearchConfig {
    /// Restart budget
    pub max_attempts: usize,
    /// Seed for the initial-guess stream; `None` draws from OS entropy
    pub seed: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 25,
            seed: None,
        }
    }
}

impl SearchConfig {
    /// Deterministic search with the given budget and seed.
    pub fn seeded(max_attempts: usize, seed: u64) -> Self {
        Self {
            max_attempts,
            seed: Some(seed),
        }
    }

    /// Check that the restart budget is positive.
    pub fn validate(&self) -> LpplResult<()> {
        validate_positive(self.max_attempts, "max_attempts")
    }
}

/// Settings for the nested sliding-window run.
///
/// Sizes and increments are counted in observations.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NestedFitConfig {
    /// Largest window length
    pub window_size: usize,
    /// Smallest window length of the inner shrink
    pub smallest_window_size: usize,
    /// Step between successive window end-points
    pub outer_increment: usize,
    /// Step of the inward-moving window start
    pub inner_increment: usize,
    /// Restart budget per window
    pub max_attempts: usize,
    /// Worker threads; 0 lets the pool pick
    pub workers: usize,
    /// Base seed; each window derives its own stream from it
    pub seed: Option<u64>,
    /// Search box derivation
    pub bounds: BoundsConfig,
    /// Solver settings
    pub fit: FitConfig,
}

impl Default for NestedFitConfig {
    fn default() -> Self {
        Self {
            window_size: 60,
            smallest_window_size: 15,
            outer_increment: 5,
            inner_increment: 10,
            max_attempts: 10,
            workers: 4,
            seed: None,
            bounds: BoundsConfig::default(),
            fit: FitConfig::fast(),
        }
    }
}

impl NestedFitConfig {
    /// Check sizes, increments and nested configs.
    pub fn validate(&self) -> LpplResult<()> {
        validate_positive(self.window_size, "window_size")?;
        validate_positive(self.smallest_window_size, "smallest_window_size")?;
        validate_positive(self.outer_increment, "outer_increment")?;
        validate_positive(self.inner_increment, "inner_increment")?;
        validate_positive(self.max_attempts, "max_attempts")?;

        if self.smallest_window_size > self.window_size {
            return Err(LpplError::InvalidParameter {
                parameter: "smallest_window_size".to_string(),
                value: self.smallest_window_size as f64,
                constraint: format!("must be <= window_size ({})", self.window_size),
            });
        }

        self.bounds.validate()?;
        self.fit.validate()
    }

    /// Search settings for one window, seeded from the base seed and the grid index.
    pub fn search_config_for(&self, grid_index: usize) -> SearchConfig {
        SearchConfig {
            max_attempts: self.max_attempts,
            seed: self
                .seed
                .map(|s| crate::rng::derive_seed(s, grid_index as u64)),
        }
    }
}
