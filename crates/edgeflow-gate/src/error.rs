//! Gate error types.
//!
//! Fetch failures ("we couldn't check") and SLO violations ("we checked and
//! it failed") are separate variants so callers can tell them apart.

use thiserror::Error;

use crate::evaluate::Violation;

/// Errors from parsing a threshold expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid SLO format: empty expression")]
    Empty,

    #[error("invalid SLO format: no valid constraints found")]
    NoConstraints,

    #[error("invalid SLO format: {0:?}")]
    InvalidClause(String),

    #[error("invalid SLO format: threshold {value:?} in {clause:?} is not a finite number")]
    InvalidThreshold { clause: String, value: String },
}

#[derive(Debug, Error)]
pub enum GateError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("required metric {metric:?} not found in metrics data (available: {available})")]
    MissingMetric { metric: String, available: String },

    #[error("failed to fetch metrics from {url}: {reason}")]
    MetricsFetch { url: String, reason: String },

    #[error("SLO violations: {}", describe(.violations))]
    SloViolation { violations: Vec<Violation> },
}

impl GateError {
    pub(crate) fn fetch(url: &str, reason: impl std::fmt::Display) -> Self {
        Self::MetricsFetch {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Short machine-readable tag for logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse(_) => "parse_error",
            Self::MissingMetric { .. } => "missing_metric",
            Self::MetricsFetch { .. } => "metrics_fetch_error",
            Self::SloViolation { .. } => "slo_violation",
        }
    }

    /// Whether the check itself could not run, as opposed to observing a
    /// regression.
    pub fn is_check_failure(&self) -> bool {
        !matches!(self, Self::SloViolation { .. })
    }
}

fn describe(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
