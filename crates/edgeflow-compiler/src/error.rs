//! Compiler error and warning types.

use std::fmt;
use std::path::PathBuf;

use edgeflow_core::{IntentError, ServiceType};
use thiserror::Error;

pub type CompileResult<T> = Result<T, CompileError>;

/// Fatal compilation failures. Any of these aborts the whole translation;
/// no bundle is returned for any site.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("malformed intent: {0}")]
    MalformedIntent(#[from] IntentError),

    #[error("unknown site {site:?} (configured: {known})")]
    UnknownSite { site: String, known: String },

    #[error("no resource profile configured for service type {0}")]
    MissingProfile(&'static str),

    #[error("failed to render {name}: {source}")]
    Render {
        name: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CompileError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Non-fatal conditions reported alongside a successful compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileWarning {
    /// `serviceType` did not match any known type; `fallback` was used.
    UnknownServiceType { given: String, fallback: ServiceType },
}

impl fmt::Display for CompileWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownServiceType { given, fallback } => write!(
                f,
                "unknown service type {given:?}, using the {} profile",
                fallback.key()
            ),
        }
    }
}
