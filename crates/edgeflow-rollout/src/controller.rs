//! Rollout controller: drives one attempt through the phase sequence.
//!
//! Phases run strictly in order. Targets are processed one at a time and
//! the first failing target ends the attempt. Any failure after the
//! delivery tree was touched resets it to the snapshot. Every attempt
//! leaves an execution report unless it is declined before anything changed.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use edgeflow_compiler::{Compilation, CompileError, IntentCompiler};
use edgeflow_core::{EdgeflowConfig, Intent};
use edgeflow_gate::{GateError, HttpMetricsSource, MetricsSource, SloGate};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::confirm::{AutoConfirm, ConfirmationPolicy};
use crate::delivery::{DeliveryTarget, GitDeliveryTarget, SnapshotRef};
use crate::error::{DeliveryError, DeliveryResult, RolloutError, RolloutResult};
use crate::options::{Mode, RolloutOptions};
use crate::phase::RolloutPhase;
use crate::report::{
    ExecutionLog, ExecutionReport, GateRecord, PublishRecord, ReportDetails, RollbackRecord,
};
use crate::verify::{
    Convergence, HttpSyncSource, SyncSource, is_cancelled, wait_for_convergence, wait_for_shutdown,
};

/// Where the orchestrator reads the intent from.
#[derive(Debug, Clone)]
pub enum IntentSource {
    File(PathBuf),
    Document(Value),
}

impl From<PathBuf> for IntentSource {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

impl From<Value> for IntentSource {
    fn from(document: Value) -> Self {
        Self::Document(document)
    }
}

/// How a rollout attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Failed,
    /// A checkpoint was declined.
    Declined,
    /// Shutdown was requested mid-run.
    Cancelled,
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Succeeded => 0,
            Self::Failed | Self::Declined => 1,
            Self::Cancelled => 130,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RolloutRun {
    pub outcome: Outcome,
    /// Absent only when the attempt was declined before touching anything.
    pub report: Option<ExecutionReport>,
    pub report_dir: Option<PathBuf>,
}

/// Sequences SNAPSHOT → VALIDATE → RENDER → (PUBLISH → VERIFY → GATE)* →
/// REPORT, with ROLLBACK on failure.
pub struct Orchestrator {
    config: EdgeflowConfig,
    options: RolloutOptions,
    delivery: Arc<dyn DeliveryTarget>,
    metrics: Arc<dyn MetricsSource>,
    sync: Option<Arc<dyn SyncSource>>,
    confirm: Arc<dyn ConfirmationPolicy>,
}

impl Orchestrator {
    pub fn new(
        config: EdgeflowConfig,
        options: RolloutOptions,
        delivery: Arc<dyn DeliveryTarget>,
        metrics: Arc<dyn MetricsSource>,
    ) -> Self {
        Self {
            config,
            options,
            delivery,
            metrics,
            sync: None,
            confirm: Arc::new(AutoConfirm),
        }
    }

    /// Git delivery under `rollout.delivery_root`, HTTP metrics and sync
    /// status from each site's configured URLs. Metrics fetches use
    /// `options.retry`.
    pub fn from_config(config: EdgeflowConfig, options: RolloutOptions) -> RolloutResult<Self> {
        let rollout = &config.rollout;
        let delivery = GitDeliveryTarget::new(rollout.delivery_root.clone(), rollout.site_dir.clone());
        let metrics = HttpMetricsSource::from_config(&config)?.with_retry(options.retry);
        let sync = HttpSyncSource::from_config(&config, edgeflow_core::parse_duration(&rollout.gate_timeout)?);
        Ok(Self::new(config, options, Arc::new(delivery), Arc::new(metrics)).with_sync_source(Arc::new(sync)))
    }

    pub fn with_sync_source(mut self, source: Arc<dyn SyncSource>) -> Self {
        self.sync = Some(source);
        self
    }

    /// Policy asked before each checkpoint in safe mode.
    pub fn with_confirmation(mut self, policy: Arc<dyn ConfirmationPolicy>) -> Self {
        self.confirm = policy;
        self
    }

    pub fn options(&self) -> &RolloutOptions {
        &self.options
    }

    /// Run a delivery operation on the blocking pool, retrying transient
    /// failures with `options.retry`.
    async fn deliver<T, F>(&self, what: &str, op: F) -> DeliveryResult<T>
    where
        T: Send + 'static,
        F: Fn(&dyn DeliveryTarget) -> DeliveryResult<T> + Clone + Send + 'static,
    {
        self.options
            .retry
            .run_if(
                what,
                |_| {
                    let delivery = Arc::clone(&self.delivery);
                    let op = op.clone();
                    async move {
                        tokio::task::spawn_blocking(move || op(delivery.as_ref()))
                            .await
                            .map_err(|e| DeliveryError::Task(e.to_string()))?
                    }
                },
                DeliveryError::is_transient,
            )
            .await
    }

    /// Run one attempt for `targets`. An empty list uses the intent's own
    /// `targetSite`.
    ///
    /// Only a failure to write the report is returned as `Err`; every other
    /// failure is an [`Outcome`] with a report.
    pub async fn run(
        &self,
        intent: impl Into<IntentSource>,
        targets: &[String],
        shutdown: watch::Receiver<bool>,
    ) -> RolloutResult<RolloutRun> {
        self.run_at(intent.into(), targets, shutdown, Utc::now()).await
    }

    /// Like [`run`](Self::run) with an injected start time, which names the
    /// report directory and stamps the rendered resources.
    pub async fn run_at(
        &self,
        intent: IntentSource,
        targets: &[String],
        shutdown: watch::Receiver<bool>,
        started: DateTime<Utc>,
    ) -> RolloutResult<RolloutRun> {
        let mut attempt = Attempt {
            orch: self,
            started,
            log: ExecutionLog::new(),
            phase: RolloutPhase::Init,
            shutdown,
            snapshot: None,
            document: None,
            compilation: None,
            mutated: false,
            details: ReportDetails::default(),
        };

        attempt.log.info("edgeflow rollout starting");
        attempt.log.info(format!(
            "Mode: {}, Targets: {}, Dry run: {}",
            self.options.mode,
            if targets.is_empty() { "(from intent)".to_string() } else { targets.join(", ") },
            self.options.dry_run
        ));

        match attempt.drive(intent, targets).await {
            Ok(()) => {
                attempt.log.info("Rollout completed successfully");
                attempt.finish(Outcome::Succeeded)
            }
            Err(Halt::Fail(phase, error)) => attempt.fail(phase, error).await,
            Err(Halt::Declined) => attempt.declined().await,
            Err(Halt::Cancelled) => attempt.cancelled().await,
        }
    }
}

enum Halt {
    Fail(RolloutPhase, RolloutError),
    Declined,
    Cancelled,
}

/// Mutable state of one rollout attempt.
struct Attempt<'a> {
    orch: &'a Orchestrator,
    started: DateTime<Utc>,
    log: ExecutionLog,
    phase: RolloutPhase,
    shutdown: watch::Receiver<bool>,
    snapshot: Option<SnapshotRef>,
    document: Option<Value>,
    compilation: Option<Compilation>,
    /// Set once a publish was attempted against the delivery tree.
    mutated: bool,
    details: ReportDetails,
}

impl Attempt<'_> {
    async fn drive(&mut self, source: IntentSource, requested: &[String]) -> Result<(), Halt> {
        self.enter(RolloutPhase::Snapshot).await?;
        self.log.info("Creating snapshot for rollback");
        let snapshot = self
            .orch
            .deliver("snapshot", |delivery| delivery.snapshot())
            .await
            .map_err(|e| Halt::Fail(RolloutPhase::Snapshot, e.into()))?;
        self.log.info(format!("Snapshot created: {snapshot}"));
        self.snapshot = Some(snapshot);

        self.enter(RolloutPhase::Validate).await?;
        let (intent, targets, gate) = self
            .validate(source, requested)
            .map_err(|e| Halt::Fail(RolloutPhase::Validate, e))?;
        self.details.targets = targets.clone();

        self.enter(RolloutPhase::Render).await?;
        self.render(&intent, &targets)
            .map_err(|e| Halt::Fail(RolloutPhase::Render, e))?;

        for target in &targets {
            self.log.info(format!("Processing target: {target}"));
            let revision = self.publish(&intent, target).await?;
            self.verify(target, revision.as_deref()).await?;
            self.gate(&gate, target).await?;
        }
        Ok(())
    }

    /// Transition into `phase`, honoring shutdown and the checkpoint policy.
    ///
    /// The policy may block on a terminal, so it is asked off the runtime.
    async fn enter(&mut self, phase: RolloutPhase) -> Result<(), Halt> {
        self.phase = phase.clone();
        if is_cancelled(&self.shutdown) {
            return Err(Halt::Cancelled);
        }
        let options = &self.orch.options;
        if phase.is_checkpoint() && options.mode == Mode::Safe && !options.dry_run {
            let policy = Arc::clone(&self.orch.confirm);
            let asked = phase.clone();
            let confirmed = tokio::task::spawn_blocking(move || policy.confirm(&asked))
                .await
                .unwrap_or(false);
            if !confirmed {
                self.log.warn(format!("Checkpoint {phase} declined"));
                return Err(Halt::Declined);
            }
            if is_cancelled(&self.shutdown) {
                return Err(Halt::Cancelled);
            }
        }
        debug!(%phase, "entering phase");
        Ok(())
    }

    fn validate(
        &mut self,
        source: IntentSource,
        requested: &[String],
    ) -> RolloutResult<(Intent, Vec<String>, SloGate)> {
        let orch = self.orch;
        let document = match source {
            IntentSource::File(path) => {
                self.log.info(format!("Validating intent: {}", path.display()));
                Intent::read_document(&path)?
            }
            IntentSource::Document(document) => {
                self.log.info("Validating intent document");
                document
            }
        };
        self.document = Some(document.clone());
        let intent = Intent::from_value(document)?;

        let missing: Vec<String> = intent
            .missing_fields(&orch.options.required_fields)
            .into_iter()
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(RolloutError::MissingFields(missing));
        }

        let compiler = IntentCompiler::with_timestamp(orch.config.clone(), self.started);
        let unknown = |target: &str| RolloutError::UnknownTarget {
            target: target.to_string(),
            known: orch.config.site_names().join(", "),
        };
        let mut targets: Vec<String> = Vec::new();
        if requested.is_empty() {
            targets = compiler.intent_targets(&intent).map_err(|e| match e {
                CompileError::UnknownSite { site, .. } => unknown(&site),
                other => RolloutError::Render(other),
            })?;
        } else {
            for target in requested {
                for site in compiler.resolve_target(target).map_err(|_| unknown(target))? {
                    if !targets.contains(&site) {
                        targets.push(site);
                    }
                }
            }
        }

        let gate = SloGate::new(&orch.options.slo).map_err(|e| RolloutError::Gate {
            target: targets.join(","),
            source: e,
        })?;
        self.log.info(format!("Intent {} is valid; targets: {}", intent.id, targets.join(", ")));
        Ok((intent, targets, gate))
    }

    fn render(&mut self, intent: &Intent, targets: &[String]) -> RolloutResult<()> {
        self.log.info("Rendering intent to resource bundles");
        let compiler = IntentCompiler::with_timestamp(self.orch.config.clone(), self.started);
        let compilation = compiler.translate_for(intent, targets)?;
        for warning in &compilation.warnings {
            self.log.warn(warning);
        }
        let checksums = compilation.checksums()?;
        self.log.info(format!(
            "Rendered {} resources for {} site(s); {} checksums recorded",
            compilation.resource_count(),
            compilation.bundles.len(),
            checksums.len()
        ));
        self.details.checksums = checksums;
        self.compilation = Some(compilation);
        Ok(())
    }

    async fn publish(&mut self, intent: &Intent, target: &str) -> Result<Option<String>, Halt> {
        let phase = RolloutPhase::Publish {
            target: target.to_string(),
        };
        self.enter(phase.clone()).await?;
        self.log.info(format!("Publishing to delivery tree: {target}"));

        let files = self
            .compilation
            .as_ref()
            .and_then(|c| c.bundles.get(target))
            .map(|bundle| bundle.render())
            .transpose()
            .map_err(|e| Halt::Fail(phase.clone(), e.into()))?
            .unwrap_or_default();

        if self.orch.options.dry_run {
            self.log.info(format!("DRY RUN: would publish {} file(s) to {target}", files.len()));
            self.details.published.push(PublishRecord {
                target: target.to_string(),
                revision: None,
            });
            return Ok(None);
        }

        self.mutated = true;
        let message = format!(
            "deploy intent {} to {target} ({})",
            intent.id,
            self.started.format("%Y%m%d_%H%M%S")
        );
        let site = target.to_string();
        let revision = self
            .orch
            .deliver("publish", move |delivery| delivery.publish(&site, &files, &message))
            .await
            .map_err(|e| Halt::Fail(phase, e.into()))?;
        match &revision {
            Some(rev) => self.log.info(format!("Committed {rev} for {target}")),
            None => self.log.info(format!("No changes for {target}; nothing committed")),
        }
        self.details.published.push(PublishRecord {
            target: target.to_string(),
            revision: revision.clone(),
        });
        Ok(revision)
    }

    async fn verify(&mut self, target: &str, revision: Option<&str>) -> Result<(), Halt> {
        let phase = RolloutPhase::Verify {
            target: target.to_string(),
        };
        self.enter(phase.clone()).await?;
        if self.orch.options.dry_run {
            self.log.info(format!("DRY RUN: would wait for {target} to converge"));
            return Ok(());
        }

        self.log.info(format!("Waiting for deployment verification on {target}"));
        let convergence = wait_for_convergence(
            self.orch.sync.as_deref(),
            target,
            revision,
            &self.orch.options.verify,
            &mut self.shutdown,
        )
        .await;

        match convergence {
            c if c.is_success() => {
                self.log.info(format!("{target} verified ({c:?})"));
                Ok(())
            }
            Convergence::Cancelled => Err(Halt::Cancelled),
            other => Err(Halt::Fail(
                phase,
                RolloutError::Verify {
                    target: target.to_string(),
                    reason: format!("{other:?}"),
                },
            )),
        }
    }

    async fn gate(&mut self, gate: &SloGate, target: &str) -> Result<(), Halt> {
        let phase = RolloutPhase::Gate {
            target: target.to_string(),
        };
        self.enter(phase.clone()).await?;
        self.log.info(format!("Checking SLO gate for {target}"));

        if self.orch.options.dry_run {
            self.log.info(format!("DRY RUN: would evaluate SLO gate for {target}"));
            self.details.gates.insert(target.to_string(), GateRecord::skipped());
            return Ok(());
        }

        let metrics = self.orch.metrics.as_ref();
        let outcome = tokio::select! {
            outcome = gate.check(metrics, target) => outcome,
            _ = wait_for_shutdown(&mut self.shutdown) => return Err(Halt::Cancelled),
        };

        self.details.gates.insert(target.to_string(), GateRecord::from_outcome(&outcome));
        match outcome {
            Ok(_) => {
                self.log.info(format!("SLO gate passed for {target}"));
                Ok(())
            }
            Err(e) => {
                if let GateError::SloViolation { violations } = &e {
                    self.log.error(format!("SLO gate failed for {target}: {e}"));
                    self.details.violations = violations.clone();
                } else {
                    self.log.warn(format!("SLO gate could not be evaluated for {target}: {e}"));
                }
                Err(Halt::Fail(
                    phase,
                    RolloutError::Gate {
                        target: target.to_string(),
                        source: e,
                    },
                ))
            }
        }
    }

    /// Reset the delivery tree to the snapshot. Never gated by confirmation.
    async fn rollback(&mut self) {
        self.phase = RolloutPhase::Rollback;
        self.log.warn("Executing rollback");

        let Some(snapshot) = self.snapshot.clone() else {
            let error = RolloutError::NoSnapshot;
            self.log.error(&error);
            self.details.rollback = Some(RollbackRecord {
                performed: false,
                error: Some(error.to_string()),
            });
            return;
        };

        if self.orch.options.dry_run {
            self.log.info(format!("DRY RUN: would roll back to {snapshot}"));
            self.details.rollback = Some(RollbackRecord {
                performed: false,
                error: None,
            });
            return;
        }

        let target = snapshot.clone();
        match self.orch.deliver("reset", move |delivery| delivery.reset(&target)).await {
            Ok(()) => {
                self.log.info(format!("Rolled back to {snapshot}"));
                self.details.rollback = Some(RollbackRecord {
                    performed: true,
                    error: None,
                });
            }
            Err(e) => {
                self.log.error(format!("Rollback to {snapshot} failed: {e}"));
                self.details.rollback = Some(RollbackRecord {
                    performed: false,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    async fn rollback_if_mutated(&mut self) {
        if self.mutated {
            self.rollback().await;
        } else {
            self.log.info("Delivery tree untouched; no rollback needed");
        }
    }

    async fn fail(mut self, phase: RolloutPhase, error: RolloutError) -> RolloutResult<RolloutRun> {
        self.log.error(format!("{} failed: {error}", phase.name()));
        self.details.phase = Some(phase.name().to_string());
        self.details.target = phase.target().map(str::to_string);
        self.details.error = Some(error.to_string());
        self.rollback_if_mutated().await;
        self.finish(Outcome::Failed)
    }

    async fn declined(mut self) -> RolloutResult<RolloutRun> {
        if !self.mutated {
            info!(phase = %self.phase, "rollout declined before any change");
            return Ok(RolloutRun {
                outcome: Outcome::Declined,
                report: None,
                report_dir: None,
            });
        }
        self.log.warn(format!("Rollout cancelled at {}", self.phase));
        self.details.target = self.phase.target().map(str::to_string);
        self.details.phase = Some("CANCELLED".to_string());
        self.details.error = Some(format!("checkpoint {} declined", self.phase));
        self.rollback().await;
        self.finish(Outcome::Declined)
    }

    async fn cancelled(mut self) -> RolloutResult<RolloutRun> {
        self.log.warn(format!("Rollout interrupted during {}", self.phase));
        self.details.target = self.phase.target().map(str::to_string);
        self.details.phase = Some("CANCELLED".to_string());
        self.details.error = Some(format!("interrupted during {}", self.phase));
        self.rollback_if_mutated().await;
        self.finish(Outcome::Cancelled)
    }

    fn finish(mut self, outcome: Outcome) -> RolloutResult<RolloutRun> {
        self.phase = RolloutPhase::Report;
        let options = &self.orch.options;
        let report = ExecutionReport {
            timestamp: self.started.format("%Y%m%d_%H%M%S").to_string(),
            success: outcome == Outcome::Succeeded,
            mode: options.mode,
            dry_run: options.dry_run,
            rollback_point: self.snapshot.clone(),
            execution_log: self.log.into_entries(),
            details: self.details,
        };
        let dir = report.write(&options.report_dir, self.document.as_ref(), self.compilation.as_ref())?;
        info!(path = %dir.display(), success = report.success, "report generated");
        Ok(RolloutRun {
            outcome,
            report: Some(report),
            report_dir: Some(dir),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        assert_eq!(Outcome::Succeeded.exit_code(), 0);
        assert_eq!(Outcome::Failed.exit_code(), 1);
        assert_eq!(Outcome::Declined.exit_code(), 1);
        assert_eq!(Outcome::Cancelled.exit_code(), 130);
    }

    #[test]
    fn intent_source_conversions() {
        assert!(matches!(IntentSource::from(PathBuf::from("i.json")), IntentSource::File(_)));
        assert!(matches!(IntentSource::from(serde_json::json!({})), IntentSource::Document(_)));
    }
}
