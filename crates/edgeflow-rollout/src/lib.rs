//! edgeflow-rollout: SLO-gated rollout of compiled intents.
//!
//! This crate drives one rollout attempt: snapshot the delivery tree,
//! validate and render the intent, then publish, verify and gate each
//! target in turn. A failure after publishing resets the tree to the
//! snapshot. Every attempt is recorded in an execution report.
//!
//! # Components
//!
//! - **`controller`**: the [`Orchestrator`] state machine
//! - **`delivery`**: git-backed [`DeliveryTarget`] and [`SnapshotRef`]
//! - **`verify`**: convergence wait after publishing
//! - **`confirm`**: checkpoint [`ConfirmationPolicy`] implementations
//! - **`report`**: execution log and report directory

pub mod confirm;
pub mod controller;
pub mod delivery;
pub mod error;
pub mod options;
pub mod phase;
pub mod report;
pub mod verify;

pub use confirm::{AutoConfirm, ConfirmationPolicy, DeclineAt, ScriptedConfirm};
pub use controller::{IntentSource, Orchestrator, Outcome, RolloutRun};
pub use delivery::{DeliveryTarget, GitDeliveryTarget, SnapshotRef};
pub use error::{DeliveryError, DeliveryResult, RolloutError, RolloutResult};
pub use options::{Mode, RolloutOptions, VerifySettings};
pub use phase::RolloutPhase;
pub use report::{ExecutionLog, ExecutionReport, GateRecord, ReportDetails};
pub use verify::{Convergence, HttpSyncSource, SyncSource, SyncState, wait_for_convergence};
