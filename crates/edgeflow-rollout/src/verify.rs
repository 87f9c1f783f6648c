//! Convergence wait between PUBLISH and GATE.
//!
//! Targets with a sync-status endpoint are polled until the reconciliation
//! agent reports the published revision; the others get a fixed grace
//! period. Either wait ends early on shutdown.

use std::collections::BTreeMap;
use std::time::Duration;

use edgeflow_core::EdgeflowConfig;
use edgeflow_gate::{BoxFuture, fetch_json};
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::options::VerifySettings;

/// Reconciliation state reported for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    /// The expected revision has been applied.
    Synced,
    Pending,
    Failed(String),
}

/// Queries a target's reconciliation status.
pub trait SyncSource: Send + Sync {
    /// Whether `target` has a status resource to poll.
    fn watches(&self, target: &str) -> bool;

    fn status<'a>(&'a self, target: &'a str, revision: Option<&'a str>) -> BoxFuture<'a, Result<SyncState, String>>;
}

/// Reads `sync_status_url` of each configured site.
///
/// The endpoint returns a JSON object. A `lastAppliedRevision` (or
/// `revision`) equal to the published commit counts as synced; otherwise a
/// `syncState` (or `status`) of `SYNCED` does, and `ERROR`/`FAILED` is a
/// failure.
#[derive(Debug, Clone)]
pub struct HttpSyncSource {
    endpoints: BTreeMap<String, String>,
    timeout: Duration,
}

impl HttpSyncSource {
    pub fn new(endpoints: BTreeMap<String, String>, timeout: Duration) -> Self {
        Self { endpoints, timeout }
    }

    pub fn from_config(config: &EdgeflowConfig, timeout: Duration) -> Self {
        let endpoints = config
            .sites
            .iter()
            .filter_map(|(site, c)| c.sync_status_url.clone().map(|url| (site.clone(), url)))
            .collect();
        Self::new(endpoints, timeout)
    }
}

impl SyncSource for HttpSyncSource {
    fn watches(&self, target: &str) -> bool {
        self.endpoints.contains_key(target)
    }

    fn status<'a>(&'a self, target: &'a str, revision: Option<&'a str>) -> BoxFuture<'a, Result<SyncState, String>> {
        Box::pin(async move {
            let url = self
                .endpoints
                .get(target)
                .ok_or_else(|| format!("no sync status endpoint for {target}"))?;
            let body = fetch_json(url, self.timeout).await.map_err(|e| e.to_string())?;
            Ok(interpret_status(&body, revision))
        })
    }
}

fn interpret_status(body: &Value, revision: Option<&str>) -> SyncState {
    let applied = body
        .get("lastAppliedRevision")
        .or_else(|| body.get("revision"))
        .and_then(Value::as_str);
    if let (Some(applied), Some(expected)) = (applied, revision) {
        if applied == expected {
            return SyncState::Synced;
        }
    }

    let state = body
        .get("syncState")
        .or_else(|| body.get("status"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_ascii_uppercase();
    match state.as_str() {
        "ERROR" | "FAILED" => SyncState::Failed(
            body.get("message")
                .and_then(Value::as_str)
                .unwrap_or("reconciliation failed")
                .to_string(),
        ),
        // A bare SYNCED only counts when no revision can be compared.
        "SYNCED" if applied.is_none() || revision.is_none() => SyncState::Synced,
        _ => SyncState::Pending,
    }
}

/// How a VERIFY wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Convergence {
    Synced,
    /// The grace period elapsed without a status resource to check.
    GracePeriodElapsed,
    TimedOut,
    Failed(String),
    Cancelled,
}

impl Convergence {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Synced | Self::GracePeriodElapsed)
    }
}

/// Wait for `target` to pick up `revision`.
pub async fn wait_for_convergence(
    source: Option<&dyn SyncSource>,
    target: &str,
    revision: Option<&str>,
    settings: &VerifySettings,
    shutdown: &mut watch::Receiver<bool>,
) -> Convergence {
    let Some(source) = source.filter(|p| p.watches(target)) else {
        info!(%target, grace_ms = settings.grace_period.as_millis() as u64, "waiting for reconciliation grace period");
        return if sleep_or_cancel(settings.grace_period, shutdown).await {
            Convergence::Cancelled
        } else {
            Convergence::GracePeriodElapsed
        };
    };

    let deadline = Instant::now() + settings.timeout;
    info!(%target, ?revision, timeout_ms = settings.timeout.as_millis() as u64, "polling sync status");
    loop {
        match source.status(target, revision).await {
            Ok(SyncState::Synced) => {
                info!(%target, "target converged");
                return Convergence::Synced;
            }
            Ok(SyncState::Failed(reason)) => {
                warn!(%target, %reason, "reconciliation failed");
                return Convergence::Failed(reason);
            }
            Ok(SyncState::Pending) => debug!(%target, "sync pending"),
            Err(e) => warn!(%target, error = %e, "sync status query failed"),
        }

        let now = Instant::now();
        if now >= deadline {
            warn!(%target, "timed out waiting for convergence");
            return Convergence::TimedOut;
        }
        let wait = settings.poll_interval.min(deadline - now);
        if sleep_or_cancel(wait, shutdown).await {
            return Convergence::Cancelled;
        }
    }
}

/// Whether shutdown has been requested.
pub fn is_cancelled(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// Sleep for `duration`; returns `true` if shutdown was requested first.
pub async fn sleep_or_cancel(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if is_cancelled(shutdown) {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        cancelled = wait_for_shutdown(shutdown) => cancelled,
    }
}

pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) -> bool {
    loop {
        if shutdown.changed().await.is_err() {
            // Sender gone: shutdown can no longer be requested.
            std::future::pending::<()>().await;
        }
        if *shutdown.borrow() {
            return true;
        }
    }
}
