//! Refinement loop state machine with explicit states and legal transition guards.
//!
//! The driver (which owns the model calls) reports what happened; this type
//! decides what happens next and enforces the loop invariants:
//! 1. Attempts are append-only with strictly increasing indices.
//! 2. At most `max_iterations` attempts are ever recorded.
//! 3. Every run ends in exactly one of `Succeeded` or `Exhausted`.
//!
//! ```text
//! Generating → Verifying
//! Verifying  → Succeeded | Refining | Exhausted
//! Refining   → Verifying
//! ```

use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::error_parser::Diagnostic;

/// Attempts allowed when the caller does not say otherwise.
pub const DEFAULT_MAX_ITERATIONS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinementState {
    /// Waiting for the first draft.
    Generating,
    /// A candidate has been submitted and awaits a verdict.
    Verifying,
    /// Waiting for a repaired candidate.
    Refining,
    /// A candidate compiled; terminal.
    Succeeded,
    /// Budget used up without a compiling candidate; terminal.
    Exhausted,
}

impl RefinementState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Exhausted)
    }
}

impl fmt::Display for RefinementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generating => write!(f, "Generating"),
            Self::Verifying => write!(f, "Verifying"),
            Self::Refining => write!(f, "Refining"),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Exhausted => write!(f, "Exhausted"),
        }
    }
}

fn is_legal_transition(from: RefinementState, to: RefinementState) -> bool {
    use RefinementState::*;

    matches!(
        (from, to),
        (Generating, Verifying)
            | (Verifying, Succeeded)
            | (Verifying, Refining)
            | (Verifying, Exhausted)
            | (Refining, Verifying)
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefinementError {
    #[error("illegal refinement transition: {from} → {to}")]
    IllegalTransition {
        from: RefinementState,
        to: RefinementState,
    },

    #[error("max_iterations must be at least 1")]
    ZeroBudget,

    #[error("refinement loop has not reached a terminal state (currently {0})")]
    NotFinished(RefinementState),
}

/// One generated candidate and its verdict. Never mutated once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationAttempt {
    /// 0-based
    pub iteration_index: u32,
    pub generated_code: String,
    pub diagnostics: Vec<Diagnostic>,
    pub compiled: bool,
    /// The model reply held no usable code; compilation was skipped.
    #[serde(default)]
    pub malformed: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: RefinementState,
    pub to: RefinementState,
    /// Attempts recorded at the time of the transition.
    pub iteration: u32,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Terminal result of a refinement run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementOutcome {
    pub state: RefinementState,
    pub success: bool,
    /// Code of the compiling attempt, or of the last attempt when exhausted.
    pub final_code: String,
    pub attempts: Vec<TranslationAttempt>,
    pub transitions: Vec<TransitionRecord>,
}

pub struct RefinementLoop {
    current: RefinementState,
    max_iterations: u32,
    pending: Option<String>,
    attempts: Vec<TranslationAttempt>,
    transitions: Vec<TransitionRecord>,
    created_at: Instant,
}

impl RefinementLoop {
    pub fn new(max_iterations: u32) -> Result<Self, RefinementError> {
        if max_iterations == 0 {
            return Err(RefinementError::ZeroBudget);
        }
        Ok(Self {
            current: RefinementState::Generating,
            max_iterations,
            pending: None,
            attempts: Vec::new(),
            transitions: Vec::new(),
            created_at: Instant::now(),
        })
    }

    pub fn current(&self) -> RefinementState {
        self.current
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn attempts(&self) -> &[TranslationAttempt] {
        &self.attempts
    }

    pub fn last_attempt(&self) -> Option<&TranslationAttempt> {
        self.attempts.last()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// Index the next recorded attempt will get.
    pub fn next_index(&self) -> u32 {
        self.attempts.len() as u32
    }

    fn advance(&mut self, to: RefinementState, reason: Option<&str>) -> Result<(), RefinementError> {
        if !is_legal_transition(self.current, to) {
            return Err(RefinementError::IllegalTransition {
                from: self.current,
                to,
            });
        }

        tracing::debug!(
            from = %self.current,
            to = %to,
            iteration = self.attempts.len(),
            "Refinement transition"
        );

        self.transitions.push(TransitionRecord {
            from: self.current,
            to,
            iteration: self.attempts.len() as u32,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        });
        self.current = to;
        Ok(())
    }

    /// Hand over a candidate (first draft or repair) for verification.
    pub fn submit(&mut self, code: String) -> Result<(), RefinementError> {
        let reason = if self.current == RefinementState::Generating {
            "draft"
        } else {
            "repair"
        };
        self.advance(RefinementState::Verifying, Some(reason))?;
        self.pending = Some(code);
        Ok(())
    }

    /// Record the verdict for the submitted candidate and move on.
    ///
    /// Returns the new state: `Succeeded`, `Refining` (budget left) or `Exhausted`.
    pub fn record(
        &mut self,
        compiled: bool,
        diagnostics: Vec<Diagnostic>,
        malformed: bool,
    ) -> Result<RefinementState, RefinementError> {
        if self.current != RefinementState::Verifying {
            let to = if compiled {
                RefinementState::Succeeded
            } else {
                RefinementState::Refining
            };
            return Err(RefinementError::IllegalTransition {
                from: self.current,
                to,
            });
        }

        let attempt = TranslationAttempt {
            iteration_index: self.next_index(),
            generated_code: self.pending.take().unwrap_or_default(),
            diagnostics,
            compiled,
            malformed,
            timestamp: Utc::now(),
        };
        let error_count = attempt.diagnostics.len();
        self.attempts.push(attempt);

        let (next, reason) = if compiled {
            (RefinementState::Succeeded, "compiled".to_string())
        } else if self.next_index() < self.max_iterations {
            (
                RefinementState::Refining,
                if malformed {
                    "malformed output".to_string()
                } else {
                    format!("{error_count} error(s)")
                },
            )
        } else {
            (
                RefinementState::Exhausted,
                format!("budget of {} used", self.max_iterations),
            )
        };
        self.advance(next, Some(&reason))?;
        Ok(next)
    }

    /// Consume the loop once terminal.
    pub fn finish(self) -> Result<RefinementOutcome, RefinementError> {
        if !self.is_terminal() {
            return Err(RefinementError::NotFinished(self.current));
        }
        let final_code = self
            .attempts
            .last()
            .map(|a| a.generated_code.clone())
            .unwrap_or_default();
        Ok(RefinementOutcome {
            state: self.current,
            success: self.current == RefinementState::Succeeded,
            final_code,
            attempts: self.attempts,
            transitions: self.transitions,
        })
    }

    pub fn summary(&self) -> String {
        let states: Vec<String> = self.transitions.iter().map(|t| t.to.to_string()).collect();
        format!(
            "{} → {} ({} attempt(s) of {}, {}ms) [{}]",
            RefinementState::Generating,
            self.current,
            self.attempts.len(),
            self.max_iterations,
            self.created_at.elapsed().as_millis(),
            states.join(" → ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err(msg: &str) -> Vec<Diagnostic> {
        vec![Diagnostic::error(msg)]
    }

    #[test]
    fn test_zero_budget_rejected() {
        assert!(matches!(RefinementLoop::new(0), Err(RefinementError::ZeroBudget)));
    }

    #[test]
    fn test_first_attempt_compiles() {
        let mut sm = RefinementLoop::new(3).unwrap();
        sm.submit("fn main() {}".into()).unwrap();
        assert_eq!(sm.record(true, vec![], false).unwrap(), RefinementState::Succeeded);

        let outcome = sm.finish().unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(outcome.final_code, "fn main() {}");
        assert_eq!(outcome.transitions.len(), 2);
    }

    #[test]
    fn test_exhaustion_after_budget() {
        let mut sm = RefinementLoop::new(3).unwrap();
        for i in 0..3 {
            sm.submit(format!("attempt {i}")).unwrap();
            let next = sm.record(false, err("boom"), false).unwrap();
            if i < 2 {
                assert_eq!(next, RefinementState::Refining);
            } else {
                assert_eq!(next, RefinementState::Exhausted);
            }
        }
        // no fourth candidate
        assert!(sm.submit("attempt 3".into()).is_err());

        let outcome = sm.finish().unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.attempts.len(), 3);
        assert_eq!(outcome.final_code, "attempt 2");
        let indices: Vec<u32> = outcome.attempts.iter().map(|a| a.iteration_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_budget_of_one() {
        let mut sm = RefinementLoop::new(1).unwrap();
        sm.submit("x".into()).unwrap();
        assert_eq!(sm.record(false, err("e"), false).unwrap(), RefinementState::Exhausted);
    }

    #[test]
    fn test_fail_fail_succeed() {
        let mut sm = RefinementLoop::new(3).unwrap();
        sm.submit("a".into()).unwrap();
        sm.record(false, err("E0381"), false).unwrap();
        sm.submit("b".into()).unwrap();
        sm.record(false, err("E0381"), false).unwrap();
        sm.submit("c".into()).unwrap();
        assert_eq!(sm.record(true, vec![], false).unwrap(), RefinementState::Succeeded);

        let outcome = sm.finish().unwrap();
        assert_eq!(outcome.attempts.len(), 3);
        assert!(!outcome.attempts[0].diagnostics.is_empty());
        assert!(!outcome.attempts[1].diagnostics.is_empty());
        assert!(outcome.attempts[2].diagnostics.is_empty());
        assert_eq!(outcome.final_code, "c");
    }

    #[test]
    fn test_malformed_consumes_iteration() {
        let mut sm = RefinementLoop::new(2).unwrap();
        sm.submit("I'm sorry".into()).unwrap();
        sm.record(false, err("no code"), true).unwrap();
        assert_eq!(sm.transitions().last().unwrap().reason.as_deref(), Some("malformed output"));
        assert_eq!(sm.next_index(), 1);
    }

    #[test]
    fn test_illegal_transitions() {
        let mut sm = RefinementLoop::new(3).unwrap();
        // verdict without a candidate
        assert!(sm.record(true, vec![], false).is_err());
        sm.submit("a".into()).unwrap();
        // double submit
        assert!(sm.submit("b".into()).is_err());
        sm.record(true, vec![], false).unwrap();
        // terminal
        assert!(sm.submit("c".into()).is_err());
        assert!(sm.record(false, vec![], false).is_err());
    }

    #[test]
    fn test_finish_before_terminal() {
        let sm = RefinementLoop::new(2).unwrap();
        assert!(matches!(
            sm.finish(),
            Err(RefinementError::NotFinished(RefinementState::Generating))
        ));
    }
}
