use std::path::PathBuf;

use edgeflow_compiler::CompileError;
use edgeflow_core::{ConfigError, IntentError};
use edgeflow_gate::GateError;
use thiserror::Error;

pub type DeliveryResult<T> = Result<T, DeliveryError>;
pub type RolloutResult<T> = Result<T, RolloutError>;

/// Failures talking to the version-controlled delivery tree.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("delivery directory not found: {0}")]
    MissingSiteDir(PathBuf),

    #[error("`{command}` failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("delivery task aborted: {0}")]
    Task(String),
}

impl DeliveryError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether another attempt could succeed. A missing site directory or a
    /// failed write will fail the same way again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Command { .. } | Self::Spawn { .. } | Self::Task(_))
    }
}

/// Errors that end a rollout attempt. Each maps to the phase that raised it
/// in the execution report.
#[derive(Debug, Error)]
pub enum RolloutError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid intent: {0}")]
    Intent(#[from] IntentError),

    #[error("intent is missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("unknown target {target:?} (configured: {known})")]
    UnknownTarget { target: String, known: String },

    #[error("render failed: {0}")]
    Render(#[from] CompileError),

    #[error("delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("{target} did not converge: {reason}")]
    Verify { target: String, reason: String },

    #[error("gate failed for {target}: {source}")]
    Gate {
        target: String,
        #[source]
        source: GateError,
    },

    #[error("rollback impossible: no snapshot was captured")]
    NoSnapshot,

    #[error("failed to write report to {path}: {source}")]
    Report {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode report: {0}")]
    Json(#[from] serde_json::Error),
}
