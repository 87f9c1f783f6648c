//! Rollout phases.
//!
//! ```text
//! INIT → SNAPSHOT → VALIDATE → RENDER → (per target: PUBLISH → VERIFY → GATE) → REPORT
//!                      │          │            │                       │
//!                      └──────────┴────────────┴──────── ROLLBACK ─────┘
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Current phase of a rollout attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RolloutPhase {
    Init,
    /// Capture the delivery tree's head for rollback.
    Snapshot,
    /// Structural check of the intent and targets.
    Validate,
    /// Compile the intent for every target at once.
    Render,
    Publish { target: String },
    /// Wait for the reconciliation agent to apply the commit.
    Verify { target: String },
    Gate { target: String },
    Rollback,
    Report,
}

impl RolloutPhase {
    /// Upper-case phase name as it appears in reports.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Snapshot => "SNAPSHOT",
            Self::Validate => "VALIDATE",
            Self::Render => "RENDER",
            Self::Publish { .. } => "PUBLISH",
            Self::Verify { .. } => "VERIFY",
            Self::Gate { .. } => "GATE",
            Self::Rollback => "ROLLBACK",
            Self::Report => "REPORT",
        }
    }

    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Publish { target } | Self::Verify { target } | Self::Gate { target } => {
                Some(target)
            }
            _ => None,
        }
    }

    /// Whether entering this phase asks the confirmation policy first.
    ///
    /// `ROLLBACK` never does: it is the cleanup path.
    pub fn is_checkpoint(&self) -> bool {
        matches!(
            self,
            Self::Snapshot | Self::Validate | Self::Render | Self::Publish { .. } | Self::Gate { .. }
        )
    }
}

impl fmt::Display for RolloutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target() {
            Some(target) => write!(f, "{} {target}", self.name()),
            None => f.write_str(self.name()),
        }
    }
}
