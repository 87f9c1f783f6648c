//! Execution log and the per-attempt report directory.
//!
//! ```text
//! <report_dir>/<YYYYmmdd_HHMMSS>/
//!   execution_report.json
//!   execution.log
//!   intent.json          (once the intent was read)
//!   checksums.json       (once rendering succeeded)
//!   rendered/            (bundles and manifest.json, once rendering succeeded)
//! ```

use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use edgeflow_compiler::Compilation;
use edgeflow_gate::{GateError, GateResult, Violation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::delivery::SnapshotRef;
use crate::error::{RolloutError, RolloutResult};
use crate::options::Mode;

pub const REPORT_FILE: &str = "execution_report.json";
pub const LOG_FILE: &str = "execution.log";

/// Timestamped log lines kept for the report, mirrored into `tracing`.
#[derive(Debug, Clone, Default)]
pub struct ExecutionLog {
    entries: Vec<String>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, message: impl Display) {
        info!("{message}");
        self.push("INFO", message);
    }

    pub fn warn(&mut self, message: impl Display) {
        warn!("{message}");
        self.push("WARN", message);
    }

    pub fn error(&mut self, message: impl Display) {
        error!("{message}");
        self.push("ERROR", message);
    }

    fn push(&mut self, level: &str, message: impl Display) {
        let ts = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        self.entries.push(format!("[{ts}] [{level}] {message}"));
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<String> {
        self.entries
    }
}

/// Gate result for one target as recorded in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateRecord {
    pub passed: bool,
    pub violations: Vec<Violation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GateRecord {
    pub fn from_outcome(outcome: &Result<GateResult, GateError>) -> Self {
        match outcome {
            Ok(result) => Self {
                passed: result.passed,
                violations: result.violations.clone(),
                error_kind: None,
                error: None,
            },
            Err(GateError::SloViolation { violations }) => Self {
                passed: false,
                violations: violations.clone(),
                error_kind: Some("slo_violation".to_string()),
                error: None,
            },
            Err(e) => Self {
                passed: false,
                violations: Vec::new(),
                error_kind: Some(e.kind().to_string()),
                error: Some(e.to_string()),
            },
        }
    }

    pub fn skipped() -> Self {
        Self {
            passed: true,
            violations: Vec::new(),
            error_kind: Some("dry_run".to_string()),
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRecord {
    pub target: String,
    /// `None` when nothing changed or on a dry run.
    pub revision: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackRecord {
    pub performed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReportDetails {
    /// Phase that ended a failed attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub targets: Vec<String>,
    pub published: Vec<PublishRecord>,
    pub gates: BTreeMap<String, GateRecord>,
    /// Violations of the gate that failed, if any.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,
    pub checksums: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackRecord>,
}

/// Permanent audit record of one rollout attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub timestamp: String,
    pub success: bool,
    pub mode: Mode,
    pub dry_run: bool,
    pub rollback_point: Option<SnapshotRef>,
    pub execution_log: Vec<String>,
    pub details: ReportDetails,
}

impl ExecutionReport {
    pub fn load(path: &Path) -> RolloutResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| RolloutError::Report {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write the report directory for this attempt under `report_root` and
    /// return its path.
    pub fn write(
        &self,
        report_root: &Path,
        intent: Option<&Value>,
        compilation: Option<&Compilation>,
    ) -> RolloutResult<PathBuf> {
        let dir = unique_dir(report_root, &self.timestamp);
        create_dir(&dir)?;

        write_file(&dir.join(REPORT_FILE), serde_json::to_string_pretty(self)?)?;
        write_file(&dir.join(LOG_FILE), self.execution_log.join("\n"))?;
        if let Some(intent) = intent {
            write_file(&dir.join("intent.json"), serde_json::to_string_pretty(intent)?)?;
        }
        if let Some(compilation) = compilation {
            write_file(
                &dir.join("checksums.json"),
                serde_json::to_string_pretty(&self.details.checksums)?,
            )?;
            compilation.save(&dir.join("rendered"), false)?;
        }
        Ok(dir)
    }
}

fn unique_dir(root: &Path, stamp: &str) -> PathBuf {
    let mut dir = root.join(stamp);
    let mut n = 1;
    while dir.exists() {
        dir = root.join(format!("{stamp}-{n}"));
        n += 1;
    }
    dir
}

fn create_dir(path: &Path) -> RolloutResult<()> {
    fs::create_dir_all(path).map_err(|source| RolloutError::Report {
        path: path.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, contents: String) -> RolloutResult<()> {
    fs::write(path, contents).map_err(|source| RolloutError::Report {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report(success: bool) -> ExecutionReport {
        let mut log = ExecutionLog::new();
        log.info("starting");
        log.error("gate failed");
        ExecutionReport {
            timestamp: "20250901_120000".into(),
            success,
            mode: Mode::Headless,
            dry_run: false,
            rollback_point: Some(SnapshotRef::new("abc123")),
            execution_log: log.into_entries(),
            details: ReportDetails::default(),
        }
    }

    #[test]
    fn log_lines_carry_level() {
        let mut log = ExecutionLog::new();
        log.warn("executing rollback");
        assert!(log.entries()[0].ends_with("] [WARN] executing rollback"));
        assert!(log.entries()[0].starts_with('['));
    }

    #[test]
    fn report_uses_camel_case_fields() {
        let value = serde_json::to_value(report(false)).unwrap();
        assert_eq!(value["rollbackPoint"], "abc123");
        assert_eq!(value["dryRun"], false);
        assert_eq!(value["mode"], "headless");
        assert_eq!(value["executionLog"].as_array().unwrap().len(), 2);
        assert!(value["details"].get("phase").is_none());
    }

    #[test]
    fn writes_report_directory() {
        let dir = tempfile::tempdir().unwrap();
        let report = report(true);
        let path = report.write(dir.path(), Some(&json!({ "intentId": "x" })), None).unwrap();

        assert_eq!(path, dir.path().join("20250901_120000"));
        assert_eq!(ExecutionReport::load(&path.join(REPORT_FILE)).unwrap(), report);
        let log = fs::read_to_string(path.join(LOG_FILE)).unwrap();
        assert_eq!(log.lines().count(), 2);
        assert!(path.join("intent.json").is_file());
        assert!(!path.join("checksums.json").exists());

        let second = report.write(dir.path(), None, None).unwrap();
        assert_eq!(second, dir.path().join("20250901_120000-1"));
    }

    #[test]
    fn gate_records_distinguish_fetch_errors() {
        let fetch = GateRecord::from_outcome(&Err(GateError::MetricsFetch {
            url: "http://x".into(),
            reason: "refused".into(),
        }));
        assert_eq!(fetch.error_kind.as_deref(), Some("metrics_fetch_error"));
        assert!(fetch.violations.is_empty());
        assert!(!fetch.passed);
    }
}
