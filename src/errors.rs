//! Error types and validation functions for LPPL fitting.
//!
//! The taxonomy follows the recovery level of each failure: a domain error is a
//! programming error and is never recovered, a convergence error discards one
//! fit attempt, a no-convergence error marks one window as missing, and only a
//! run where no window converged is surfaced as a run-level failure.

use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Error types for LPPL model evaluation, fitting and windowed search.
#[derive(Error, Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[non_exhaustive]
pub enum LpplError {
    /// The model was evaluated outside its domain (t >= tc or non-finite input).
    #[error("LPPL model undefined at t = {t} for tc = {tc}")]
    DomainError {
        /// Evaluation time
        t: f64,
        /// Critical time of the parameter vector
        tc: f64,
    },

    /// A single fit attempt did not converge.
    #[error("Fit did not converge after {iterations} iterations: {reason}")]
    ConvergenceError {
        /// Why the attempt was abandoned
        reason: String,
        /// Iterations performed before giving up
        iterations: usize,
    },

    /// Every attempt of a multi-start search failed to converge.
    #[error("No converged fit among {attempts} attempts")]
    NoConvergence {
        /// Number of attempts made
        attempts: usize,
    },

    /// Every window of a nested run failed.
    #[error("No window converged out of {windows} windows")]
    NoWindowConverged {
        /// Number of windows in the grid
        windows: usize,
    },

    /// Insufficient data for the requested operation.
    #[error("Insufficient data: need at least {required} points, got {actual}")]
    InsufficientData {
        /// Minimum required data points
        required: usize,
        /// Actual number of data points provided
        actual: usize,
    },

    /// Invalid parameter value for configuration or an initial guess.
    #[error("Invalid parameter: {parameter} = {value}, expected {constraint}")]
    InvalidParameter {
        /// Parameter name
        parameter: String,
        /// Invalid value provided
        value: f64,
        /// Valid range or constraint description
        constraint: String,
    },

    /// Observation series failed validation.
    #[error("Invalid observations: {reason}")]
    InvalidObservations {
        /// What was wrong with the series
        reason: String,
    },

    /// Numerical computation error outside the fit loop.
    #[error("Numerical computation failed: {reason}")]
    NumericalError {
        /// Detailed reason for numerical failure
        reason: String,
    },

    /// The windowed run was cancelled before completion.
    #[error("Windowed run cancelled")]
    Cancelled,
}

/// Result type for LPPL operations.
pub type LpplResult<T> = Result<T, LpplError>;

/// Validates that data has sufficient length for an operation.
///
/// # Example
/// ```rust
/// use lppl_finance::errors::validate_data_length;
///
/// assert!(validate_data_length(3, 2).is_ok());
/// assert!(validate_data_length(3, 5).is_err());
/// ```
pub fn validate_data_length(actual: usize, min_required: usize) -> LpplResult<()> {
    if actual < min_required {
        Err(LpplError::InsufficientData {
            required: min_required,
            actual,
        })
    } else {
        Ok(())
    }
}

/// Validates that a parameter is within `[min, max]`.
///
/// # Example
/// ```rust
/// use lppl_finance::errors::validate_parameter;
///
/// assert!(validate_parameter(0.5, 0.0, 1.0, "m").is_ok());
/// assert!(validate_parameter(1.5, 0.0, 1.0, "m").is_err());
/// ```
pub fn validate_parameter(value: f64, min: f64, max: f64, name: &str) -> LpplResult<()> {
    if value.is_nan() {
        return Err(LpplError::InvalidParameter {
            parameter: name.to_string(),
            value,
            constraint: "must not be NaN".to_string(),
        });
    }

    if min.is_nan() || max.is_nan() || min > max {
        return Err(LpplError::NumericalError {
            reason: format!(
                "Invalid bounds for parameter {}: min={}, max={}",
                name, min, max
            ),
        });
    }

    if value < min || value > max {
        Err(LpplError::InvalidParameter {
            parameter: name.to_string(),
            value,
            constraint: format!("[{}, {}]", min, max),
        })
    } else {
        Ok(())
    }
}

/// Validates that a count-like setting is strictly positive.
pub fn validate_positive(value: usize, name: &str) -> LpplResult<()> {
    if value == 0 {
        Err(LpplError::InvalidParameter {
            parameter: name.to_string(),
            value: 0.0,
            constraint: "must be > 0".to_string(),
        })
    } else {
        Ok(())
    }
}

/// Validates that a value is finite and not NaN.
///
/// # Example
/// ```rust
/// use lppl_finance::errors::validate_finite;
///
/// assert!(validate_finite(1.0, "x").is_ok());
/// assert!(validate_finite(f64::NAN, "x").is_err());
/// ```
pub fn validate_finite(value: f64, name: &str) -> LpplResult<()> {
    if !value.is_finite() {
        Err(LpplError::NumericalError {
            reason: format!("{} is not finite: {}", name, value),
        })
    } else {
        Ok(())
    }
}

/// Validates that all values in a slice are finite.
///
/// Returns on the first non-finite value, naming its index.
pub fn validate_all_finite(data: &[f64], name: &str) -> LpplResult<()> {
    if let Some((i, &value)) = data.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        let value_desc = if value.is_nan() {
            "NaN".to_string()
        } else if value.is_sign_positive() {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        };

        return Err(LpplError::NumericalError {
            reason: format!(
                "{} contains non-finite value at index {}: {}",
                name, i, value_desc
            ),
        });
    }

    Ok(())
}

impl LpplError {
    /// True for failures that discard a single attempt or window rather than a run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LpplError::ConvergenceError { .. }
                | LpplError::NoConvergence { .. }
                | LpplError::InsufficientData { .. }
                | LpplError::InvalidParameter { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_data_length() {
        assert!(validate_data_length(5, 5).is_ok());

        match validate_data_length(2, 5) {
            Err(LpplError::InsufficientData { required, actual }) => {
                assert_eq!(required, 5);
                assert_eq!(actual, 2);
            }
            other => panic!("Expected InsufficientData error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_parameter_out_of_range() {
        match validate_parameter(1.5, 0.0, 1.0, "m") {
            Err(LpplError::InvalidParameter {
                parameter,
                value,
                constraint,
            }) => {
                assert_eq!(parameter, "m");
                assert_eq!(value, 1.5);
                assert_eq!(constraint, "[0, 1]");
            }
            other => panic!("Expected InvalidParameter error, got {:?}", other),
        }

        assert!(validate_parameter(0.0, 0.0, 1.0, "m").is_ok());
        assert!(validate_parameter(1.0, 0.0, 1.0, "m").is_ok());
    }

    #[test]
    fn test_validate_parameter_bad_bounds() {
        assert!(matches!(
            validate_parameter(f64::NAN, 0.0, 1.0, "w"),
            Err(LpplError::InvalidParameter { .. })
        ));
        assert!(matches!(
            validate_parameter(0.5, 1.0, 0.0, "w"),
            Err(LpplError::NumericalError { .. })
        ));
        assert!(matches!(
            validate_parameter(0.5, f64::NAN, 1.0, "w"),
            Err(LpplError::NumericalError { .. })
        ));
    }

    #[test]
    fn test_validate_positive() {
        assert!(validate_positive(1, "max_attempts").is_ok());
        assert!(matches!(
            validate_positive(0, "max_attempts"),
            Err(LpplError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_validate_all_finite_reports_index() {
        assert!(validate_all_finite(&[], "empty").is_ok());
        assert!(validate_all_finite(&[1.0, -2.0, 3.0], "ok").is_ok());

        match validate_all_finite(&[1.0, 2.0, f64::NEG_INFINITY], "prices") {
            Err(LpplError::NumericalError { reason }) => {
                assert!(reason.contains("prices"));
                assert!(reason.contains("index 2"));
                assert!(reason.contains("-Infinity"));
            }
            other => panic!("Expected NumericalError, got {:?}", other),
        }

        assert!(validate_finite(f64::INFINITY, "x").is_err());
    }

    #[test]
    fn test_error_display_formatting() {
        let err = LpplError::DomainError { t: 10.0, tc: 9.5 };
        let msg = format!("{}", err);
        assert!(msg.contains("t = 10"));
        assert!(msg.contains("tc = 9.5"));

        let err = LpplError::NoConvergence { attempts: 25 };
        assert!(format!("{}", err).contains("25 attempts"));
    }

    #[test]
    fn test_recoverability() {
        assert!(LpplError::NoConvergence { attempts: 3 }.is_recoverable());
        assert!(LpplError::ConvergenceError {
            reason: "singular".to_string(),
            iterations: 0
        }
        .is_recoverable());
        assert!(!LpplError::DomainError { t: 1.0, tc: 1.0 }.is_recoverable());
        assert!(!LpplError::Cancelled.is_recoverable());
        assert!(!LpplError::NoWindowConverged { windows: 4 }.is_recoverable());
    }
}
