//! # Bubble Confidence Indicators
//!
//! Aggregates a nested run into one indicator per window end-point. A fit
//! "qualifies" when its parameters fall in the ranges usually accepted for a
//! genuine LPPL signature (exponent, frequency, number of oscillations, damping)
//! and its critical time lies near the end of its window. The positive-bubble
//! confidence is the fraction of converged fits at an end-point that qualify with
//! `b < 0` (accelerating growth); the negative-bubble confidence counts `b > 0`.
//!
//! Windows without a fit are excluded from both numerator and denominator.

use crate::errors::{LpplError, LpplResult};
use crate::lppl_model::{damping, oscillations};
use crate::nested::{NestedFitReport, WindowResult};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Ranges a fit must satisfy to count towards the confidence indicators.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct QualificationFilter {
    /// Accepted exponent range
    pub m_range: (f64, f64),
    /// Accepted angular log-frequency range
    pub w_range: (f64, f64),
    /// Minimum number of oscillations over the window
    pub min_oscillations: f64,
    /// Minimum damping
    pub min_damping: f64,
    /// How far before the window end tc may lie, as a fraction of the window span
    pub tc_before_fraction: f64,
    /// How far after the window end tc may lie, as a fraction of the window span
    pub tc_after_fraction: f64,
}

impl Default for QualificationFilter {
    fn default() -> Self {
        Self {
            m_range: (0.01, 0.99),
            w_range: (2.0, 25.0),
            min_oscillations: 2.5,
            min_damping: 0.5,
            tc_before_fraction: 0.05,
            tc_after_fraction: 0.1,
        }
    }
}

impl QualificationFilter {
    /// Check that every range is well formed.
    pub fn validate(&self) -> LpplResult<()> {
        for (name, (lo, hi)) in [("m_range", self.m_range), ("w_range", self.w_range)] {
            if !(lo <= hi) {
                return Err(LpplError::InvalidParameter {
                    parameter: name.to_string(),
                    value: lo,
                    constraint: format!("min must not exceed max ({})", hi),
                });
            }
        }
        for (name, value) in [
            ("tc_before_fraction", self.tc_before_fraction),
            ("tc_after_fraction", self.tc_after_fraction),
        ] {
            if !(value >= 0.0) {
                return Err(LpplError::InvalidParameter {
                    parameter: name.to_string(),
                    value,
                    constraint: "must be >= 0".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Whether a window's fit qualifies; windows without a fit never do.
    pub fn qualifies(&self, window: &WindowResult) -> bool {
        let Some(fit) = window.best_fit else {
            return false;
        };
        let p = fit.parameters;
        let span = window.span();

        let tc_lo = window.window_end - self.tc_before_fraction * span;
        let tc_hi = window.window_end + self.tc_after_fraction * span;
        let o = oscillations(&p, window.window_start, window.window_end);
        let d = damping(&p);

        (tc_lo..=tc_hi).contains(&p.tc)
            && (self.m_range.0..=self.m_range.1).contains(&p.m)
            && (self.w_range.0..=self.w_range.1).contains(&p.w)
            && o >= self.min_oscillations
            && d >= self.min_damping
    }
}

/// Confidence indicator of one window end-point.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConfidenceIndicator {
    /// End-point index, 0 = most recent
    pub outer_index: usize,
    /// Time of the last observation of the end-point's windows
    pub end_time: f64,
    /// Windows at this end-point that produced a fit
    pub converged: usize,
    /// Qualifying fits with `b < 0`
    pub qualified_positive: usize,
    /// Qualifying fits with `b > 0`
    pub qualified_negative: usize,
    /// `qualified_positive / converged`, `None` without any converged window
    pub positive_confidence: Option<f64>,
    /// `qualified_negative / converged`, `None` without any converged window
    pub negative_confidence: Option<f64>,
}

/// One indicator per end-point, in the report's outer order.
pub fn confidence_indicators(
    report: &NestedFitReport,
    filter: &QualificationFilter,
) -> LpplResult<Vec<ConfidenceIndicator>> {
    filter.validate()?;

    Ok((0..report.outer_count)
        .filter_map(|outer_index| {
            let group = report.outer_group(outer_index);
            let end_time = group.first()?.window_end;

            let converged = group.iter().filter(|w| w.is_converged()).count();
            let (mut positive, mut negative) = (0, 0);
            for window in group.iter().filter(|w| filter.qualifies(w)) {
                if let Some(fit) = window.best_fit {
                    if fit.parameters.b < 0.0 {
                        positive += 1;
                    } else if fit.parameters.b > 0.0 {
                        negative += 1;
                    }
                }
            }

            let fraction = |count: usize| (converged > 0).then(|| count as f64 / converged as f64);
            Some(ConfidenceIndicator {
                outer_index,
                end_time,
                converged,
                qualified_positive: positive,
                qualified_negative: negative,
                positive_confidence: fraction(positive),
                negative_confidence: fraction(negative),
            })
        })
        .collect())
}
