//! Constraint evaluation against a metric snapshot.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::constraint::{ConstraintSet, Operator};
use crate::error::GateError;

/// Flat `metric -> value` map taken from one metrics endpoint response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricSnapshot(BTreeMap<String, f64>);

impl MetricSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract numeric fields from a JSON object. Non-numeric fields such
    /// as a `timestamp` string are skipped.
    pub fn from_json(value: &Value) -> Result<Self, String> {
        let object = value
            .as_object()
            .ok_or_else(|| format!("expected a JSON object, got {value}"))?;
        let mut metrics = BTreeMap::new();
        for (key, value) in object {
            match value.as_f64() {
                Some(number) => {
                    metrics.insert(key.clone(), number);
                }
                None => debug!(metric = %key, "skipping non-numeric field"),
            }
        }
        Ok(Self(metrics))
    }

    pub fn get(&self, metric: &str) -> Option<f64> {
        self.0.get(metric).copied()
    }

    pub fn insert(&mut self, metric: impl Into<String>, value: f64) {
        self.0.insert(metric.into(), value);
    }

    pub fn names(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for MetricSnapshot {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// One constraint that did not hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub metric: String,
    pub operator: Operator,
    pub threshold: f64,
    pub actual: f64,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} (actual: {})",
            self.metric, self.operator, self.threshold, self.actual
        )
    }
}

/// Outcome of evaluating a constraint set against one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    pub passed: bool,
    pub violations: Vec<Violation>,
}

impl GateResult {
    /// Turn a failing result into [`GateError::SloViolation`].
    pub fn into_result(self) -> Result<GateResult, GateError> {
        if self.passed {
            Ok(self)
        } else {
            Err(GateError::SloViolation {
                violations: self.violations,
            })
        }
    }
}

/// Evaluate every constraint and collect all violations.
///
/// Every referenced metric must be present; a missing one is an error and
/// never counts as a pass or a fail.
pub fn evaluate(constraints: &ConstraintSet, metrics: &MetricSnapshot) -> Result<GateResult, GateError> {
    if let Some(missing) = constraints.iter().find(|c| metrics.get(&c.metric).is_none()) {
        return Err(GateError::MissingMetric {
            metric: missing.metric.clone(),
            available: metrics.names().join(", "),
        });
    }

    let violations: Vec<Violation> = constraints
        .iter()
        .filter_map(|c| {
            let actual = metrics.get(&c.metric)?;
            (!c.operator.holds(actual, c.threshold)).then(|| Violation {
                metric: c.metric.clone(),
                operator: c.operator,
                threshold: c.threshold,
                actual,
            })
        })
        .collect();

    Ok(GateResult {
        passed: violations.is_empty(),
        violations,
    })
}

/// Parse `expr` and evaluate it against `metrics`.
pub fn evaluate_expr(expr: &str, metrics: &MetricSnapshot) -> Result<GateResult, GateError> {
    let constraints = ConstraintSet::parse(expr)?;
    evaluate(&constraints, metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(pairs: &[(&str, f64)]) -> MetricSnapshot {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    #[test]
    fn one_violation_out_of_two() {
        let result = evaluate_expr(
            "latency<=15,success_rate>=0.995",
            &snapshot(&[("latency", 10.0), ("success_rate", 0.99)]),
        )
        .unwrap();
        assert!(!result.passed);
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].metric, "success_rate");
        assert_eq!(result.violations[0].actual, 0.99);
    }

    #[test]
    fn all_pass() {
        let result = evaluate_expr(
            "latency_p95_ms<=15,success_rate>=0.995,throughput_p95_mbps>=200",
            &snapshot(&[
                ("latency_p95_ms", 12.0),
                ("success_rate", 0.997),
                ("throughput_p95_mbps", 220.0),
            ]),
        )
        .unwrap();
        assert!(result.passed);
        assert!(result.violations.is_empty());
        assert!(result.into_result().is_ok());
    }

    #[test]
    fn violations_are_not_short_circuited() {
        let result = evaluate_expr(
            "latency_p95_ms<=15,success_rate>=0.995,throughput_p95_mbps>=200",
            &snapshot(&[
                ("latency_p95_ms", 18.0),
                ("success_rate", 0.997),
                ("throughput_p95_mbps", 180.0),
            ]),
        )
        .unwrap();
        let failed: Vec<_> = result.violations.iter().map(|v| v.metric.as_str()).collect();
        assert_eq!(failed, vec!["latency_p95_ms", "throughput_p95_mbps"]);

        let err = result.into_result().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("latency_p95_ms <= 15 (actual: 18)"), "{msg}");
        assert!(!msg.contains("success_rate"));
        assert!(!err.is_check_failure());
    }

    #[test]
    fn missing_metric_is_an_error() {
        let err = evaluate_expr("latency<=15,throughput>=100", &snapshot(&[("latency", 1.0)]))
            .unwrap_err();
        match &err {
            GateError::MissingMetric { metric, available } => {
                assert_eq!(metric, "throughput");
                assert_eq!(available, "latency");
            }
            other => panic!("expected MissingMetric, got {other:?}"),
        }
        assert!(err.is_check_failure());
    }

    #[test]
    fn duplicate_constraints_evaluate_independently() {
        let result = evaluate_expr("latency<=20,latency<=5", &snapshot(&[("latency", 10.0)])).unwrap();
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].threshold, 5.0);
    }

    #[test]
    fn parse_errors_propagate() {
        let err = evaluate_expr("", &MetricSnapshot::new()).unwrap_err();
        assert_eq!(err.kind(), "parse_error");
    }

    #[test]
    fn snapshot_from_json_skips_non_numeric() {
        let snap = MetricSnapshot::from_json(&json!({
            "latency_p95_ms": 12,
            "success_rate": 0.998,
            "timestamp": "2025-09-01T00:00:00Z",
        }))
        .unwrap();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.get("latency_p95_ms"), Some(12.0));
        assert!(MetricSnapshot::from_json(&json!([1, 2])).is_err());
    }

    #[test]
    fn result_serializes_with_symbols() {
        let result = evaluate_expr("latency<=5", &snapshot(&[("latency", 20.0)])).unwrap();
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "passed": false,
                "violations": [{ "metric": "latency", "operator": "<=", "threshold": 5.0, "actual": 20.0 }],
            })
        );
    }
}
