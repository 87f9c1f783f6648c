//! edgeflow-gate: SLO threshold gate for deployment targets.
//!
//! A gate expression such as `latency_p95_ms<=15,success_rate>=0.995` is
//! parsed into a [`ConstraintSet`], evaluated against a [`MetricSnapshot`]
//! fetched from a target's metrics endpoint, and yields a [`GateResult`].
//!
//! ```text
//! SloGate::check(source, target)
//!   ├── MetricsSource::fetch(target) → MetricSnapshot
//!   ├── evaluate(constraints, snapshot) → GateResult
//!   └── GateResult::into_result() → Ok | SloViolation
//! ```
//!
//! A target whose metrics cannot be read fails with `MetricsFetch` or
//! `MissingMetric`, never with a pass.

pub mod constraint;
pub mod error;
pub mod evaluate;
pub mod fetch;
pub mod gate;

pub use constraint::{Constraint, ConstraintSet, Operator};
pub use error::{GateError, ParseError};
pub use evaluate::{GateResult, MetricSnapshot, Violation, evaluate, evaluate_expr};
pub use fetch::{
    BoxFuture, DEFAULT_TIMEOUT, HttpMetricsSource, MetricsSource, StaticMetricsSource, fetch_json,
    fetch_metrics,
};
pub use gate::SloGate;
