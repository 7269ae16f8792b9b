//! Session state machine with legal-transition guards.
//!
//! The retry loop calls [`SessionMachine::advance`] for every step so that an
//! illegal jump (say, remediating after success) surfaces as an error rather
//! than silently corrupting the result, and the transition log can be
//! replayed afterwards.

use crate::types::SessionOutcome;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    /// A build is running.
    Attempting,
    /// Turning a failed build's output into typed errors.
    Classifying,
    /// Planning and applying one remediation.
    Remediating,
    /// Build succeeded. Terminal.
    Success,
    /// No viable remediation. Terminal.
    Unfixable,
    /// Attempt or time budget spent. Terminal.
    Exhausted,
    /// Caller cancelled. Terminal.
    Cancelled,
    /// Hard failure (tool missing, timeout, I/O). Terminal.
    Aborted,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Success | Self::Unfixable | Self::Exhausted | Self::Cancelled | Self::Aborted
        )
    }

    /// Reported outcome for a state; non-terminal states map to `Pending`.
    pub fn outcome(self) -> SessionOutcome {
        match self {
            Self::Success => SessionOutcome::Success,
            Self::Unfixable => SessionOutcome::Unfixable,
            Self::Exhausted => SessionOutcome::Exhausted,
            Self::Cancelled => SessionOutcome::Cancelled,
            Self::Aborted => SessionOutcome::Aborted,
            Self::Idle | Self::Attempting | Self::Classifying | Self::Remediating => {
                SessionOutcome::Pending
            }
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "Idle",
            Self::Attempting => "Attempting",
            Self::Classifying => "Classifying",
            Self::Remediating => "Remediating",
            Self::Success => "Success",
            Self::Unfixable => "Unfixable",
            Self::Exhausted => "Exhausted",
            Self::Cancelled => "Cancelled",
            Self::Aborted => "Aborted",
        };
        f.write_str(name)
    }
}

/// Legal edges:
/// ```text
/// Idle        → Attempting
/// Attempting  → Success | Classifying
/// Classifying → Remediating | Unfixable
/// Remediating → Attempting | Exhausted | Unfixable
/// (any non-terminal) → Cancelled | Aborted
/// ```
fn is_legal_transition(from: SessionState, to: SessionState) -> bool {
    use SessionState::*;

    if matches!(to, Cancelled | Aborted) && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (Idle, Attempting)
            | (Attempting, Success)
            | (Attempting, Classifying)
            | (Classifying, Remediating)
            | (Classifying, Unfixable)
            | (Remediating, Attempting)
            | (Remediating, Exhausted)
            | (Remediating, Unfixable)
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: SessionState,
    pub to: SessionState,
    /// Attempt counter when the transition happened
    pub attempt: u32,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("illegal session transition: {from} -> {to}")]
pub struct IllegalTransition {
    pub from: SessionState,
    pub to: SessionState,
}

pub struct SessionMachine {
    current: SessionState,
    attempt: u32,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl SessionMachine {
    pub fn new() -> Self {
        Self {
            current: SessionState::Idle,
            attempt: 0,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> SessionState {
        self.current
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn set_attempt(&mut self, attempt: u32) {
        self.attempt = attempt;
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    pub fn advance(
        &mut self,
        to: SessionState,
        reason: Option<&str>,
    ) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        tracing::debug!(
            from = %self.current,
            to = %to,
            attempt = self.attempt,
            "session transition"
        );
        self.transitions.push(TransitionRecord {
            from: self.current,
            to,
            attempt: self.attempt,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        });
        self.current = to;
        Ok(())
    }

    /// `Idle → Attempting → ... → current`, e.g. for a debug log line.
    pub fn path(&self) -> String {
        let mut states = vec![SessionState::Idle.to_string()];
        states.extend(self.transitions.iter().map(|t| t.to.to_string()));
        states.join(" -> ")
    }
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}
