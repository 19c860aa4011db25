//! # LPPL Bubble Analysis
//!
//! Log-periodic power law (LPPL) fitting for financial bubble detection.
//!
//! The crate fits the LPPL model
//!
//! ```text
//! ln p(t) = a + (tc - t)^m * (b + c1 * cos(w * ln(tc - t)) + c2 * sin(w * ln(tc - t)))
//! ```
//!
//! to a log-price series by bounded nonlinear least squares over `(tc, m, w)`,
//! with the linear coefficients `(a, b, c1, c2)` solved in closed form at every
//! step. A multi-start search draws random initial guesses and keeps the best
//! converged fit, and a nested window run repeats that search over a grid of
//! sub-windows to build bubble confidence indicators.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lppl_finance::{
//!     confidence_indicators, generate_lppl_series, run_windows, search, BoundsConfig,
//!     FitConfig, GeneratorConfig, NestedFitConfig, ParameterVector, QualificationFilter,
//!     SearchConfig,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let truth = ParameterVector { tc: 220.0, m: 0.5, w: 10.0, a: 1.0, b: -1.0, c1: 0.1, c2: 0.1 };
//!     let config = GeneratorConfig { length: 200, noise_std: 0.005, seed: Some(7), ..Default::default() };
//!     let observations = generate_lppl_series(&config, &truth)?;
//!
//!     // Single multi-start fit over the whole series
//!     let outcome = search(
//!         &observations,
//!         &BoundsConfig::default(),
//!         &SearchConfig::seeded(25, 42),
//!         &FitConfig::default(),
//!     )?;
//!     let fit = outcome.best;
//!     let diagnostics = fit.diagnostics(&observations);
//!     println!("tc = {:.2}, m = {:.3}, w = {:.3}", fit.parameters.tc, fit.parameters.m, fit.parameters.w);
//!     println!("O = {:.2}, D = {:.2}", diagnostics.oscillations, diagnostics.damping);
//!
//!     // Nested windows and confidence indicators
//!     let nested = NestedFitConfig { seed: Some(42), ..Default::default() };
//!     let report = run_windows(&observations, &nested)?;
//!     for indicator in confidence_indicators(&report, &QualificationFilter::default())? {
//!         println!("{:.0}: {:?}", indicator.end_time, indicator.positive_confidence);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `parallel` (default): nested window grids run on a rayon worker pool
//! - `serde`: `Serialize`/`Deserialize` for configurations and results

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod errors;
pub mod fitter;
pub mod generators;
pub mod indicators;
pub mod linear_algebra;
pub mod lppl_model;
pub mod nested;
pub mod observations;
pub mod rng;
pub mod search;

pub use config::{BoundsConfig, FitConfig, NestedFitConfig, SearchConfig};
pub use errors::{LpplError, LpplResult};

pub use fitter::{fit, FitResult, NonlinearParams, SearchBounds};
pub use generators::{generate_lppl_series, GeneratorConfig};
pub use indicators::{confidence_indicators, ConfidenceIndicator, QualificationFilter};
pub use lppl_model::{
    evaluate, evaluate_series, predict, predict_prices, FitDiagnostics, ParameterVector,
};
pub use nested::{
    run_windows, run_windows_with_cancel, CancellationToken, NestedFitReport, WindowGrid,
    WindowPosition, WindowResult,
};
pub use observations::{DailyBar, DailyBarSource, ObservationSeries, VecBarSource};
pub use search::{fit_with_restarts, search, SearchOutcome};
