//! # LPPL Model Evaluation
//!
//! The log-periodic power law describes the log-price ahead of a critical time `tc`:
//!
//! ```text
//! ln p(t) = a + (tc - t)^m * (b + c1 * cos(w * ln(tc - t)) + c2 * sin(w * ln(tc - t)))
//! ```
//!
//! The model is undefined for `t >= tc`. Besides evaluation this module derives
//! the usual qualification statistics of a fit: oscillation amplitude `c`,
//! number of oscillations `O` and damping `D`.

use crate::errors::{LpplError, LpplResult};
use crate::observations::ObservationSeries;
use std::f64::consts::PI;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Full LPPL parameter vector.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParameterVector {
    /// Critical time
    pub tc: f64,
    /// Power-law exponent
    pub m: f64,
    /// Angular log-frequency
    pub w: f64,
    /// Log-price at the critical time
    pub a: f64,
    /// Power-law amplitude; negative for a positive bubble
    pub b: f64,
    /// Cosine amplitude
    pub c1: f64,
    /// Sine amplitude
    pub c2: f64,
}

impl ParameterVector {
    /// Assemble from the nonlinear triple and the linear coefficients `[a, b, c1, c2]`.
    pub fn from_parts(tc: f64, m: f64, w: f64, linear: [f64; 4]) -> Self {
        let [a, b, c1, c2] = linear;
        Self {
            tc,
            m,
            w,
            a,
            b,
            c1,
            c2,
        }
    }

    /// Nonlinear search variables `[tc, m, w]`.
    pub fn nonlinear(&self) -> [f64; 3] {
        [self.tc, self.m, self.w]
    }

    /// Linear coefficients `[a, b, c1, c2]`.
    pub fn linear(&self) -> [f64; 4] {
        [self.a, self.b, self.c1, self.c2]
    }

    /// Oscillation amplitude `sqrt(c1^2 + c2^2)`.
    pub fn amplitude(&self) -> f64 {
        self.c1.hypot(self.c2)
    }

    /// Predicted log-price at `t`.
    pub fn evaluate(&self, t: f64) -> LpplResult<f64> {
        evaluate(t, self)
    }
}

/// Predicted log-price at `t`.
///
/// Fails with [`LpplError::DomainError`] when `t >= tc` or any input is not finite.
///
/// # Example
/// ```rust
/// use lppl_finance::lppl_model::{evaluate, ParameterVector};
///
/// let p = ParameterVector { tc: 120.0, m: 0.5, w: 10.0, a: 1.0, b: -1.0, c1: 0.1, c2: 0.1 };
/// assert!(evaluate(50.0, &p).unwrap().is_finite());
/// assert!(evaluate(120.0, &p).is_err());
/// ```
#[inline]
pub fn evaluate(t: f64, params: &ParameterVector) -> LpplResult<f64> {
    let dt = params.tc - t;
    if !(dt > 0.0) || !dt.is_finite() {
        return Err(LpplError::DomainError { t, tc: params.tc });
    }

    let f = dt.powf(params.m);
    let phase = params.w * dt.ln();
    let value = params.a + f * (params.b + params.c1 * phase.cos() + params.c2 * phase.sin());

    if value.is_finite() {
        Ok(value)
    } else {
        Err(LpplError::DomainError { t, tc: params.tc })
    }
}

/// Evaluate over a slice of times; the first out-of-domain time fails the call.
pub fn evaluate_series(times: &[f64], params: &ParameterVector) -> LpplResult<Vec<f64>> {
    times.iter().map(|&t| evaluate(t, params)).collect()
}

/// Predicted log-prices aligned with the observations.
pub fn predict(observations: &ObservationSeries, params: &ParameterVector) -> LpplResult<Vec<f64>> {
    evaluate_series(observations.times(), params)
}

/// Predicted prices (exponentiated log-prices) aligned with the observations.
pub fn predict_prices(
    observations: &ObservationSeries,
    params: &ParameterVector,
) -> LpplResult<Vec<f64>> {
    Ok(predict(observations, params)?.into_iter().map(f64::exp).collect())
}

/// Sum of squared differences between the model and the observations.
pub fn sum_squared_residuals(
    observations: &ObservationSeries,
    params: &ParameterVector,
) -> LpplResult<f64> {
    observations.iter().try_fold(0.0, |acc, (t, y)| {
        let r = y - evaluate(t, params)?;
        Ok(acc + r * r)
    })
}

/// Qualification statistics of a fitted parameter vector over its window.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FitDiagnostics {
    /// Oscillation amplitude `sqrt(c1^2 + c2^2)`
    pub c: f64,
    /// Number of oscillations between the window start and end
    pub oscillations: f64,
    /// Damping `m * |b| / (w * c)`
    pub damping: f64,
    /// Root mean squared residual
    pub rmse: f64,
}

/// Number of log-periodic oscillations over `[t_first, t_last]`.
///
/// `w / (2 pi) * ln((tc - t_first) / (tc - t_last))`
pub fn oscillations(params: &ParameterVector, t_first: f64, t_last: f64) -> f64 {
    params.w / (2.0 * PI) * ((params.tc - t_first) / (params.tc - t_last)).ln()
}

/// Damping `m * |b| / (w * c)`; infinite when there is no oscillation.
pub fn damping(params: &ParameterVector) -> f64 {
    let c = params.amplitude();
    if c == 0.0 {
        f64::INFINITY
    } else {
        params.m * params.b.abs() / (params.w * c)
    }
}

impl FitDiagnostics {
    /// Diagnostics of `params` over the window it was fitted on.
    pub fn compute(
        observations: &ObservationSeries,
        params: &ParameterVector,
        residual: f64,
    ) -> Self {
        Self {
            c: params.amplitude(),
            oscillations: oscillations(params, observations.first_time(), observations.last_time()),
            damping: damping(params),
            rmse: (residual / observations.len() as f64).sqrt(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> ParameterVector {
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

    #[test]
    fn test_evaluate_matches_formula() {
        let p = reference();
        let t: f64 = 20.0;
        let dt: f64 = 100.0;
        let expected = 1.0
            + dt.sqrt() * (-1.0 + 0.1 * (10.0 * dt.ln()).cos() + 0.1 * (10.0 * dt.ln()).sin());
        assert!((evaluate(t, &p).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_finite_before_critical_time() {
        let base = reference();
        for &m in &[0.01, 0.3, 0.99] {
            for &w in &[4.0, 12.5, 25.0] {
                let p = ParameterVector { m, w, ..base };
                for i in 0..120 {
                    let value = evaluate(i as f64, &p).unwrap();
                    assert!(value.is_finite(), "m={} w={} t={}", m, w, i);
                }
                let near = evaluate(p.tc - 1e-9, &p).unwrap();
                assert!(near.is_finite());
            }
        }
    }

    #[test]
    fn test_domain_error_at_and_after_critical_time() {
        for &m in &[0.1, 0.5, 0.9] {
            let p = ParameterVector { m, ..reference() };
            assert!(matches!(
                evaluate(p.tc, &p),
                Err(LpplError::DomainError { .. })
            ));
            assert!(matches!(
                evaluate(p.tc + 5.0, &p),
                Err(LpplError::DomainError { .. })
            ));
        }
        assert!(evaluate(f64::NAN, &reference()).is_err());
    }

    #[test]
    fn test_evaluate_series_fails_on_any_bad_time() {
        let p = reference();
        assert_eq!(evaluate_series(&[0.0, 10.0, 50.0], &p).unwrap().len(), 3);
        assert!(evaluate_series(&[0.0, 130.0, 50.0], &p).is_err());
    }

    #[test]
    fn test_predict_prices_exponentiates() {
        let p = reference();
        let times: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let logs = evaluate_series(&times, &p).unwrap();
        let obs = ObservationSeries::new(times, logs.clone()).unwrap();

        let prices = predict_prices(&obs, &p).unwrap();
        for (price, log) in prices.iter().zip(&logs) {
            assert!((price.ln() - log).abs() < 1e-12);
        }
        assert!(sum_squared_residuals(&obs, &p).unwrap() < 1e-20);
    }

    #[test]
    fn test_diagnostics() {
        let p = reference();
        let c = p.amplitude();
        assert!((c - 0.02_f64.sqrt()).abs() < 1e-12);

        let o = oscillations(&p, 0.0, 99.0);
        let expected = 10.0 / (2.0 * PI) * (120.0_f64 / 21.0).ln();
        assert!((o - expected).abs() < 1e-12);

        let d = damping(&p);
        assert!((d - 0.5 / (10.0 * c)).abs() < 1e-12);

        let flat = ParameterVector { c1: 0.0, c2: 0.0, ..p };
        assert!(damping(&flat).is_infinite());
    }
}
