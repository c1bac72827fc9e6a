//! Per-module release state machine
//!
//! `PENDING → BUILT → SIGNED → PUBLISHING → DONE | FAILED`. Transitions only
//! move forward; any non-terminal state may fail, and a pending module may be
//! cancelled before it starts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::error::ReleaseError;

/// Release state of one module
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModuleState {
    Pending,
    Built,
    Signed,
    Publishing,
    Done,
    Failed,
    Cancelled,
}

impl ModuleState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ModuleState::Done | ModuleState::Failed | ModuleState::Cancelled
        )
    }

    /// Whether `self → to` is a legal transition
    pub fn can_transition_to(&self, to: ModuleState) -> bool {
        use ModuleState::*;

        match (self, to) {
            (Pending, Built) | (Built, Signed) | (Signed, Publishing) | (Publishing, Done) => true,
            (Pending, Cancelled) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// State transition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateTransition {
    pub from: ModuleState,
    pub to: ModuleState,
    pub timestamp: DateTime<Utc>,
}

/// State machine for one module's release pipeline
#[derive(Debug, Clone)]
pub struct ModuleStateMachine {
    module: String,
    current_state: ModuleState,
    transitions: Vec<StateTransition>,
}

impl ModuleStateMachine {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            current_state: ModuleState::Pending,
            transitions: Vec::new(),
        }
    }

    /// Transition to a new state
    ///
    /// Backward moves and moves out of a terminal state are rejected.
    pub fn transition(&mut self, to: ModuleState) -> Result<(), ReleaseError> {
        let from = self.current_state;
        if !from.can_transition_to(to) {
            return Err(ReleaseError::InvalidTransition {
                module: self.module.clone(),
                from,
                to,
            });
        }

        tracing::debug!(module = %self.module, ?from, ?to, "state transition");
        self.transitions.push(StateTransition {
            from,
            to,
            timestamp: Utc::now(),
        });
        self.current_state = to;

        Ok(())
    }

    pub fn state(&self) -> ModuleState {
        self.current_state
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    /// Milliseconds between the first and the last transition
    pub fn elapsed_ms(&self) -> i64 {
        match (self.transitions.first(), self.transitions.last()) {
            (Some(first), Some(last)) => (last.timestamp - first.timestamp).num_milliseconds(),
            _ => 0,
        }
    }

    /// Get transition history as human-readable string
    pub fn history(&self) -> String {
        self.transitions
            .iter()
            .map(|t| format!("{}: {:?} → {:?}", t.timestamp.to_rfc3339(), t.from, t.to))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
