//! # Single-Start LPPL Fit
//!
//! Bounded nonlinear least squares over the three nonlinear LPPL parameters
//! `(tc, m, w)`. For every trial triple the four linear coefficients
//! `(a, b, c1, c2)` are solved in closed form (variable projection), so the
//! nonlinear search only ever sees a three-dimensional residual surface.
//!
//! The search itself is Levenberg-Marquardt with Marquardt diagonal scaling,
//! a finite-difference Jacobian of the projected residuals and steps projected
//! back onto the search box.
//!
//! An attempt stops with success when
//! - the scaled gradient is below `gradient_tolerance`, or
//! - an accepted step reduces the cost by less than `cost_tolerance` (relative), or
//! - an accepted step is shorter than `step_tolerance` (relative to the parameter scale), or
//! - no damping level up to `max_damping` reduces the cost.
//!
//! It fails with [`LpplError::ConvergenceError`] when the iteration budget runs
//! out or the linear sub-solve is singular at the initial guess.

use crate::config::{BoundsConfig, FitConfig};
use crate::errors::{LpplError, LpplResult};
use crate::linear_algebra::{lppl_normal_equations, solve_damped_step};
use crate::lppl_model::{FitDiagnostics, ParameterVector};
use crate::observations::ObservationSeries;
use nalgebra::{Matrix3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Relative finite-difference step, roughly the cube root of machine epsilon.
const FD_STEP: f64 = 6.0e-6;

/// Smallest damping factor kept after successful steps.
const MIN_DAMPING: f64 = 1e-15;

/// The three nonlinear search variables.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NonlinearParams {
    /// Critical time
    pub tc: f64,
    /// Power-law exponent
    pub m: f64,
    /// Angular log-frequency
    pub w: f64,
}

impl NonlinearParams {
    /// Triple from its components.
    pub fn new(tc: f64, m: f64, w: f64) -> Self {
        Self { tc, m, w }
    }

    fn to_array(self) -> [f64; 3] {
        [self.tc, self.m, self.w]
    }
}

impl From<ParameterVector> for NonlinearParams {
    fn from(p: ParameterVector) -> Self {
        Self::new(p.tc, p.m, p.w)
    }
}

/// Box constraints on `(tc, m, w)` for one window.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SearchBounds {
    /// Critical time range; the lower end lies strictly after the last observation
    pub tc: (f64, f64),
    /// Exponent range
    pub m: (f64, f64),
    /// Angular log-frequency range
    pub w: (f64, f64),
}

impl SearchBounds {
    /// Search box for a window under the given configuration.
    pub fn for_window(observations: &ObservationSeries, config: &BoundsConfig) -> LpplResult<Self> {
        config.validate()?;

        let last = observations.last_time();
        let tc_min = last + config.tc_margin;
        let tc_max = last + config.tc_horizon_factor * observations.span();
        if !(tc_max > tc_min) {
            return Err(LpplError::InvalidParameter {
                parameter: "tc_horizon_factor".to_string(),
                value: config.tc_horizon_factor,
                constraint: format!(
                    "horizon end {} must exceed last time plus margin {}",
                    tc_max, tc_min
                ),
            });
        }

        Ok(Self {
            tc: (tc_min, tc_max),
            m: config.m_range,
            w: config.w_range,
        })
    }

    fn lower(&self) -> [f64; 3] {
        [self.tc.0, self.m.0, self.w.0]
    }

    fn upper(&self) -> [f64; 3] {
        [self.tc.1, self.m.1, self.w.1]
    }

    /// True when every component lies inside its range.
    pub fn contains(&self, params: &NonlinearParams) -> bool {
        let (lo, hi) = (self.lower(), self.upper());
        params
            .to_array()
            .iter()
            .enumerate()
            .all(|(j, x)| (lo[j]..=hi[j]).contains(x))
    }

    /// Reject a guess outside the box, naming the first offending component.
    pub fn check(&self, params: &NonlinearParams) -> LpplResult<()> {
        const NAMES: [&str; 3] = ["tc", "m", "w"];
        let (lo, hi) = (self.lower(), self.upper());
        for (j, &x) in params.to_array().iter().enumerate() {
            if !(lo[j]..=hi[j]).contains(&x) {
                return Err(LpplError::InvalidParameter {
                    parameter: NAMES[j].to_string(),
                    value: x,
                    constraint: format!("[{}, {}]", lo[j], hi[j]),
                });
            }
        }
        Ok(())
    }

    fn clamp(&self, x: [f64; 3]) -> [f64; 3] {
        let (lo, hi) = (self.lower(), self.upper());
        [
            x[0].clamp(lo[0], hi[0]),
            x[1].clamp(lo[1], hi[1]),
            x[2].clamp(lo[2], hi[2]),
        ]
    }
}

/// Outcome of one fit attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FitResult {
    /// Fitted parameter vector
    pub parameters: ParameterVector,
    /// Sum of squared residuals
    pub residual: f64,
    /// Whether the solver met a convergence criterion; `fit` reports a miss as an error
    pub converged: bool,
    /// Outer iterations performed
    pub iterations: usize,
}

impl FitResult {
    /// Qualification statistics over the window the fit was made on.
    pub fn diagnostics(&self, observations: &ObservationSeries) -> FitDiagnostics {
        FitDiagnostics::compute(observations, &self.parameters, self.residual)
    }
}

/// Residuals and linear coefficients at one nonlinear point.
struct Projection {
    residuals: Vec<f64>,
    linear: [f64; 4],
    cost: f64,
}

/// Solve the linear coefficients at `(tc, m, w)` and return the residuals.
///
/// A singular regression surfaces as `NumericalError`; `tc` at or before the last
/// observation is a `DomainError`.
fn project(observations: &ObservationSeries, x: [f64; 3]) -> LpplResult<Projection> {
    let [tc, m, w] = x;
    let last = observations.last_time();
    if !(tc > last) {
        return Err(LpplError::DomainError { t: last, tc });
    }

    let rows: Vec<[f64; 4]> = observations
        .times()
        .iter()
        .map(|&t| {
            let dt = tc - t;
            let f = dt.powf(m);
            let phase = w * dt.ln();
            [1.0, f, f * phase.cos(), f * phase.sin()]
        })
        .collect();

    let linear = lppl_normal_equations(
        rows.iter()
            .copied()
            .zip(observations.log_prices().iter().copied()),
    )?;

    let residuals: Vec<f64> = rows
        .iter()
        .zip(observations.log_prices())
        .map(|(row, y)| y - row.iter().zip(&linear).map(|(r, c)| r * c).sum::<f64>())
        .collect();
    let cost = residuals.iter().map(|r| r * r).sum();

    Ok(Projection {
        residuals,
        linear,
        cost,
    })
}

/// Finite-difference Jacobian of the projected residuals, one column per variable.
///
/// Central differences where both sides stay in the box, one-sided otherwise.
fn jacobian(
    observations: &ObservationSeries,
    x: [f64; 3],
    base: &Projection,
    bounds: &SearchBounds,
) -> LpplResult<[Vec<f64>; 3]> {
    let (lo, hi) = (bounds.lower(), bounds.upper());
    let last = observations.last_time();
    let scales = [(x[0] - last).max(1e-3), x[1].abs().max(1.0), x[2].abs().max(1.0)];

    let mut columns: [Vec<f64>; 3] = Default::default();
    for j in 0..3 {
        let h = FD_STEP * scales[j];
        let mut plus = x;
        let mut minus = x;
        plus[j] += h;
        minus[j] -= h;

        columns[j] = if minus[j] >= lo[j] && plus[j] <= hi[j] {
            let rp = project(observations, plus)?;
            let rm = project(observations, minus)?;
            rp.residuals
                .iter()
                .zip(&rm.residuals)
                .map(|(a, b)| (a - b) / (2.0 * h))
                .collect()
        } else if plus[j] <= hi[j] {
            let rp = project(observations, plus)?;
            rp.residuals
                .iter()
                .zip(&base.residuals)
                .map(|(a, b)| (a - b) / h)
                .collect()
        } else {
            let rm = project(observations, minus)?;
            base.residuals
                .iter()
                .zip(&rm.residuals)
                .map(|(a, b)| (a - b) / h)
                .collect()
        };
    }
    Ok(columns)
}

fn convergence_error(reason: impl Into<String>, iterations: usize) -> LpplError {
    LpplError::ConvergenceError {
        reason: reason.into(),
        iterations,
    }
}

fn finish(x: [f64; 3], projection: &Projection, iterations: usize) -> FitResult {
    FitResult {
        parameters: ParameterVector::from_parts(x[0], x[1], x[2], projection.linear),
        residual: projection.cost,
        converged: true,
        iterations,
    }
}

/// Fit the LPPL model to `observations` starting from `initial_guess`.
///
/// The guess must lie inside `bounds`; otherwise the attempt is rejected with
/// [`LpplError::InvalidParameter`] before any work is done.
pub fn fit(
    observations: &ObservationSeries,
    initial_guess: NonlinearParams,
    bounds: &SearchBounds,
    config: &FitConfig,
) -> LpplResult<FitResult> {
    config.validate()?;
    bounds.check(&initial_guess)?;

    let step_scales = [observations.span().max(1.0), 1.0, 1.0];
    let mut x = initial_guess.to_array();
    let mut current = project(observations, x).map_err(|e| match e {
        LpplError::NumericalError { reason } => convergence_error(reason, 0),
        other => other,
    })?;
    let mut lambda = config.initial_damping;

    for iteration in 1..=config.max_iterations {
        if current.cost == 0.0 {
            return Ok(finish(x, &current, iteration - 1));
        }

        let columns = match jacobian(observations, x, &current, bounds) {
            Ok(c) => c,
            Err(LpplError::NumericalError { reason }) => {
                return Err(convergence_error(reason, iteration))
            }
            Err(e) => return Err(e),
        };

        let mut jtj = Matrix3::<f64>::zeros();
        let mut gradient = Vector3::<f64>::zeros();
        for a in 0..3 {
            gradient[a] = columns[a]
                .iter()
                .zip(&current.residuals)
                .map(|(j, r)| j * r)
                .sum();
            for b in a..3 {
                let v: f64 = columns[a].iter().zip(&columns[b]).map(|(p, q)| p * q).sum();
                jtj[(a, b)] = v;
                jtj[(b, a)] = v;
            }
        }

        // Largest cosine between the residual vector and a Jacobian column.
        let residual_norm = current.cost.sqrt();
        let scaled_gradient = (0..3)
            .filter(|&a| jtj[(a, a)] > 0.0)
            .map(|a| gradient[a].abs() / (jtj[(a, a)].sqrt() * residual_norm))
            .fold(0.0_f64, f64::max);
        if scaled_gradient <= config.gradient_tolerance {
            return Ok(finish(x, &current, iteration - 1));
        }

        loop {
            let trial = solve_damped_step(&jtj, &gradient, lambda)
                .ok()
                .map(|delta| bounds.clamp([x[0] + delta[0], x[1] + delta[1], x[2] + delta[2]]))
                .filter(|candidate| *candidate != x)
                .and_then(|candidate| {
                    project(observations, candidate)
                        .ok()
                        .filter(|p| p.cost.is_finite() && p.cost < current.cost)
                        .map(|p| (candidate, p))
                });

            match trial {
                Some((candidate, next)) => {
                    let reduction = (current.cost - next.cost) / current.cost;
                    let step = (0..3)
                        .map(|j| (candidate[j] - x[j]).abs() / step_scales[j])
                        .fold(0.0_f64, f64::max);

                    x = candidate;
                    current = next;
                    lambda = (lambda / 10.0).max(MIN_DAMPING);

                    if reduction <= config.cost_tolerance || step <= config.step_tolerance {
                        return Ok(finish(x, &current, iteration));
                    }
                    break;
                }
                None => {
                    lambda *= 10.0;
                    if lambda > config.max_damping {
                        // No damping level improves the cost: stationary in the box.
                        return Ok(finish(x, &current, iteration));
                    }
                }
            }
        }
    }

    Err(convergence_error(
        format!(
            "iteration limit reached at tc={:.4}, m={:.4}, w={:.4}, sse={:.6e}",
            x[0], x[1], x[2], current.cost
        ),
        config.max_iterations,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lppl_model::evaluate_series;

    fn truth() -> ParameterVector {
        ParameterVector {
            tc: 120.0,
            m: 0.5,
            w: 10.0,
            a: 1.0,
            b: -1.0,
            c1: 0.1,
            c2: 0.1,
        }
    }

    fn exact_series(n: usize) -> ObservationSeries {
        let times: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let prices = evaluate_series(&times, &truth()).unwrap();
        ObservationSeries::new(times, prices).unwrap()
    }

    #[test]
    fn test_bounds_for_window() {
        let obs = exact_series(100);
        let bounds = SearchBounds::for_window(&obs, &BoundsConfig::default()).unwrap();
        assert!(bounds.tc.0 > obs.last_time());
        assert!((bounds.tc.1 - (99.0 + 0.5 * 99.0)).abs() < 1e-12);
        assert_eq!(bounds.m, (0.01, 0.99));
        assert_eq!(bounds.w, (4.0, 25.0));
        assert!(bounds.contains(&NonlinearParams::new(120.0, 0.5, 10.0)));
        assert!(!bounds.contains(&NonlinearParams::new(99.0, 0.5, 10.0)));
    }

    #[test]
    fn test_guess_outside_bounds_is_rejected() {
        let obs = exact_series(100);
        let bounds = SearchBounds::for_window(&obs, &BoundsConfig::default()).unwrap();
        let result = fit(
            &obs,
            NonlinearParams::new(120.0, 1.5, 10.0),
            &bounds,
            &FitConfig::default(),
        );
        match result {
            Err(LpplError::InvalidParameter { parameter, .. }) => assert_eq!(parameter, "m"),
            other => panic!("Expected InvalidParameter, got {:?}", other),
        }
    }

    #[test]
    fn test_exact_data_recovered_from_nearby_guess() {
        let obs = exact_series(100);
        let bounds = SearchBounds::for_window(&obs, &BoundsConfig::default()).unwrap();
        let result = fit(
            &obs,
            NonlinearParams::new(118.0, 0.45, 9.8),
            &bounds,
            &FitConfig::default(),
        )
        .unwrap();

        assert!(result.converged);
        assert!(result.residual < 1e-10, "residual {}", result.residual);
        let p = result.parameters;
        assert!((p.tc - 120.0).abs() < 0.1);
        assert!((p.m - 0.5).abs() < 0.01);
        assert!((p.w - 10.0).abs() < 0.05);
    }

    #[test]
    fn test_iteration_limit_is_a_convergence_error() {
        let obs = exact_series(100);
        let bounds = SearchBounds::for_window(&obs, &BoundsConfig::default()).unwrap();
        let config = FitConfig {
            max_iterations: 1,
            gradient_tolerance: 1e-300,
            cost_tolerance: 1e-300,
            step_tolerance: 1e-300,
            ..FitConfig::default()
        };
        let result = fit(&obs, NonlinearParams::new(140.0, 0.2, 20.0), &bounds, &config);
        assert!(matches!(
            result,
            Err(LpplError::ConvergenceError { iterations: 1, .. })
        ));
    }

    #[test]
    fn test_singular_projection_is_a_convergence_error() {
        // Constant prices and a flat time axis make the oscillatory regressors
        // collinear with the power law once w * ln(dt) is numerically constant.
        let times: Vec<f64> = (0..10).map(|i| 1e6 + i as f64 * 1e-9).collect();
        let obs = ObservationSeries::new(times, vec![1.0; 10]).unwrap();
        let bounds = SearchBounds {
            tc: (obs.last_time() + 1.0, obs.last_time() + 2.0),
            m: (0.01, 0.99),
            w: (4.0, 25.0),
        };
        let result = fit(
            &obs,
            NonlinearParams::new(obs.last_time() + 1.5, 0.5, 10.0),
            &bounds,
            &FitConfig::default(),
        );
        assert!(matches!(
            result,
            Err(LpplError::ConvergenceError { iterations: 0, .. })
        ));
    }
}
