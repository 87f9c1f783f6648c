use tracing::{error, info, warn};

use crate::constraint::ConstraintSet;
use crate::error::GateError;
use crate::evaluate::{GateResult, MetricSnapshot, evaluate};
use crate::fetch::MetricsSource;

/// A parsed threshold expression ready to be checked against targets.
#[derive(Debug, Clone)]
pub struct SloGate {
    expr: String,
    constraints: ConstraintSet,
}

impl SloGate {
    pub fn new(expr: &str) -> Result<Self, GateError> {
        Ok(Self {
            expr: expr.trim().to_string(),
            constraints: ConstraintSet::parse(expr)?,
        })
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }

    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    pub fn evaluate(&self, metrics: &MetricSnapshot) -> Result<GateResult, GateError> {
        evaluate(&self.constraints, metrics)
    }

    /// Fetch `target`'s metrics from `source` and evaluate them.
    ///
    /// Returns `Ok` only when every constraint holds; violations come back
    /// as [`GateError::SloViolation`].
    pub async fn check(&self, source: &dyn MetricsSource, target: &str) -> Result<GateResult, GateError> {
        info!(%target, slo = %self.expr, "evaluating SLO gate");
        match source.fetch(target).await {
            Ok(metrics) => self.check_snapshot(target, &metrics),
            Err(e) => {
                warn!(%target, kind = e.kind(), error = %e, "SLO gate could not be evaluated");
                Err(e)
            }
        }
    }

    /// Evaluate an already fetched snapshot with the same logging and
    /// verdict as [`check`](Self::check).
    pub fn check_snapshot(&self, target: &str, metrics: &MetricSnapshot) -> Result<GateResult, GateError> {
        let result = self.evaluate(metrics).and_then(GateResult::into_result);
        match &result {
            Ok(_) => info!(%target, constraints = self.constraints.len(), "SLO gate passed"),
            Err(e @ GateError::SloViolation { .. }) => error!(%target, error = %e, "SLO gate failed"),
            Err(e) => warn!(%target, kind = e.kind(), error = %e, "SLO gate could not be evaluated"),
        }
        result
    }
}
