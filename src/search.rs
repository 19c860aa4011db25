//! # Multi-Start Search
//!
//! Runs the single-start fit from randomized initial guesses and keeps the best
//! converged attempt. Guesses are drawn uniformly from the window's search box:
//! `tc` between the last observation and the configured horizon, `m` and `w`
//! from their configured ranges.
//!
//! The search is query-only: the same observations, configuration and seed
//! always give the same result.

use crate::config::{BoundsConfig, FitConfig, SearchConfig};
use crate::errors::{LpplError, LpplResult};
use crate::fitter::{fit, FitResult, NonlinearParams, SearchBounds};
use crate::observations::ObservationSeries;
use crate::rng::SearchRng;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Best fit of a search together with attempt bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SearchOutcome {
    /// Lowest-residual converged attempt
    pub best: FitResult,
    /// Attempts made
    pub attempts: usize,
    /// Attempts that converged
    pub converged_attempts: usize,
}

/// Draw one initial guess uniformly inside the box.
pub fn draw_initial_guess(rng: &mut SearchRng, bounds: &SearchBounds) -> NonlinearParams {
    let tc = rng.uniform(bounds.tc.0, bounds.tc.1);
    let m = rng.uniform(bounds.m.0, bounds.m.1);
    let w = rng.uniform(bounds.w.0, bounds.w.1);
    NonlinearParams::new(tc, m, w)
}

/// Run up to `search_config.max_attempts` fits and return the best converged one.
///
/// Attempts failing with a convergence error are discarded. A domain error
/// aborts the search. Ties on the residual keep the earliest attempt.
pub fn search(
    observations: &ObservationSeries,
    bounds_config: &BoundsConfig,
    search_config: &SearchConfig,
    fit_config: &FitConfig,
) -> LpplResult<SearchOutcome> {
    search_config.validate()?;
    let bounds = SearchBounds::for_window(observations, bounds_config)?;
    let mut rng = SearchRng::from_option(search_config.seed);

    let mut best: Option<FitResult> = None;
    let mut converged_attempts = 0;

    for attempt in 0..search_config.max_attempts {
        let guess = draw_initial_guess(&mut rng, &bounds);

        match fit(observations, guess, &bounds, fit_config) {
            Ok(result) => {
                converged_attempts += 1;
                if best.map_or(true, |b| result.residual < b.residual) {
                    best = Some(result);
                }
            }
            Err(LpplError::ConvergenceError { reason, iterations }) => {
                log::debug!(
                    "attempt {} from tc={:.3}, m={:.3}, w={:.3} discarded after {} iterations: {}",
                    attempt,
                    guess.tc,
                    guess.m,
                    guess.w,
                    iterations,
                    reason
                );
            }
            Err(e) => return Err(e),
        }
    }

    match best {
        Some(best) => {
            log::debug!(
                "search over {} points: {}/{} attempts converged, best sse={:.6e}",
                observations.len(),
                converged_attempts,
                search_config.max_attempts,
                best.residual
            );
            Ok(SearchOutcome {
                best,
                attempts: search_config.max_attempts,
                converged_attempts,
            })
        }
        None => Err(LpplError::NoConvergence {
            attempts: search_config.max_attempts,
        }),
    }
}

/// Multi-start search with default bounds and solver settings.
pub fn fit_with_restarts(
    observations: &ObservationSeries,
    max_attempts: usize,
    seed: Option<u64>,
) -> LpplResult<FitResult> {
    let config = SearchConfig { max_attempts, seed };
    search(
        observations,
        &BoundsConfig::default(),
        &config,
        &FitConfig::default(),
    )
    .map(|outcome| outcome.best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lppl_model::{evaluate_series, ParameterVector};

    fn series() -> ObservationSeries {
        let p = ParameterVector {
            tc: 120.0,
            m: 0.5,
            w: 10.0,
            a: 1.0,
            b: -1.0,
            c1: 0.1,
            c2: 0.1,
        };
        let times: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let prices = evaluate_series(&times, &p).unwrap();
        ObservationSeries::new(times, prices).unwrap()
    }

    #[test]
    fn test_guesses_stay_inside_bounds() {
        let obs = series();
        let bounds = SearchBounds::for_window(&obs, &BoundsConfig::default()).unwrap();
        let mut rng = SearchRng::with_seed(3);
        for _ in 0..500 {
            assert!(bounds.contains(&draw_initial_guess(&mut rng, &bounds)));
        }
    }

    #[test]
    fn test_seeded_search_is_deterministic() {
        let obs = series();
        let config = SearchConfig::seeded(8, 2024);
        let bounds = BoundsConfig::default();
        let first = search(&obs, &bounds, &config, &FitConfig::default()).unwrap();
        let second = search(&obs, &bounds, &config, &FitConfig::default()).unwrap();
        assert_eq!(first, second);
        assert!(first.converged_attempts >= 1);
        assert!(first.converged_attempts <= first.attempts);
    }

    #[test]
    fn test_zero_converged_attempts_is_an_error() {
        let obs = series();
        let config = SearchConfig::seeded(3, 1);
        let strangled = FitConfig {
            max_iterations: 1,
            gradient_tolerance: 1e-300,
            cost_tolerance: 1e-300,
            step_tolerance: 1e-300,
            ..FitConfig::default()
        };
        let result = search(&obs, &BoundsConfig::default(), &config, &strangled);
        assert!(matches!(result, Err(LpplError::NoConvergence { attempts: 3 })));
    }

    #[test]
    fn test_zero_attempts_is_rejected() {
        let obs = series();
        let config = SearchConfig::seeded(0, 1);
        assert!(matches!(
            search(&obs, &BoundsConfig::default(), &config, &FitConfig::default()),
            Err(LpplError::InvalidParameter { .. })
        ));
    }
}
