//! Confirmation policies consulted before each checkpointed phase.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::phase::RolloutPhase;

/// Decides whether the orchestrator may enter `phase`.
pub trait ConfirmationPolicy: Send + Sync {
    fn confirm(&self, phase: &RolloutPhase) -> bool;
}

/// Always proceeds. Used in headless mode and for dry runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm;

impl ConfirmationPolicy for AutoConfirm {
    fn confirm(&self, _phase: &RolloutPhase) -> bool {
        true
    }
}

/// Answers from a fixed list, then proceeds once it runs out.
#[derive(Debug, Default)]
pub struct ScriptedConfirm {
    answers: Mutex<VecDeque<bool>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedConfirm {
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Decline the first checkpoint whose display form equals `phase`.
    pub fn decline_at(phase: &str) -> DeclineAt {
        DeclineAt(phase.to_string())
    }

    /// Phases asked about so far.
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

impl ConfirmationPolicy for ScriptedConfirm {
    fn confirm(&self, phase: &RolloutPhase) -> bool {
        if let Ok(mut asked) = self.asked.lock() {
            asked.push(phase.to_string());
        }
        self.answers
            .lock()
            .ok()
            .and_then(|mut answers| answers.pop_front())
            .unwrap_or(true)
    }
}

/// Declines exactly one named phase, confirming everything else.
#[derive(Debug, Clone)]
pub struct DeclineAt(String);

impl ConfirmationPolicy for DeclineAt {
    fn confirm(&self, phase: &RolloutPhase) -> bool {
        phase.to_string() != self.0
    }
}
