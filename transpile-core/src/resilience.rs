//! Resilience primitives: degraded-mode levels and bounded transport retry.
//!
//! ```text
//! Analysis
//!   ├─ AST parse clean        → Full
//!   └─ parse errors, regex    → Partial
//!
//! Model call
//!   ├─ ok                     → return
//!   ├─ transport error, n < max_retries → back off, retry
//!   └─ transport error, n = max_retries → give up
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How much of a component's capability was available for a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationLevel {
    /// Primary path succeeded.
    Full,
    /// A lower-fidelity fallback produced the result.
    Partial,
    /// Nothing usable was produced.
    Unavailable,
}

impl std::fmt::Display for DegradationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Partial => write!(f, "partial"),
            Self::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Bounded retry with linear back-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Total attempts = `max_retries + 1`.
    pub max_retries: u32,
    /// Delay before retry `n` is `backoff_ms * n`.
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_ms: 500,
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff_ms: 0,
        }
    }

    /// Delay before the given retry (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(u64::from(retry)))
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}
