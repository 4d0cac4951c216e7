//! Pipeline error taxonomy with retry classification.
//!
//! Every error that can abort a translation request is represented here.
//! Callers can query `is_retriable()` / `retry_category()` without string
//! matching. Failed compilations are not errors: they drive the refinement
//! loop and end in an `Exhausted` result at worst.
//!
//! ## Retry categories
//!
//! | Category      | Retriable | Raised by                              |
//! |---------------|-----------|----------------------------------------|
//! | Transient     | yes       | connection errors, 429 / 5xx, empty reply |
//! | Timeout       | yes       | model call or compiler over its deadline |
//! | Fatal         | no        | missing toolchain, 4xx, broken state    |
//! | Configuration | no        | invalid settings, unreadable corpus     |
//! | Cancelled     | no        | run-wide cancellation                  |

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use transpile_core::feedback::{RefinementError, VerifierError};
use transpile_core::project::ScanError;
use transpile_core::retrieval::CorpusError;

use crate::model::Template;

/// Classification used by the retry wrapper and the project runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCategory {
    /// Network / backend hiccup, safe to retry.
    Transient,
    /// Deadline exceeded.
    Timeout,
    /// Retrying cannot help.
    Fatal,
    /// The run is misconfigured.
    Configuration,
    /// Explicitly cancelled by the caller.
    Cancelled,
}

impl RetryCategory {
    pub fn is_retriable(self) -> bool {
        matches!(self, Self::Transient | Self::Timeout)
    }
}

impl fmt::Display for RetryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Timeout => write!(f, "timeout"),
            Self::Fatal => write!(f, "fatal"),
            Self::Configuration => write!(f, "configuration"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Failure of a single model call at the HTTP boundary.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("model call timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("response had no choices")]
    EmptyResponse,

    #[error("undecodable response: {0}")]
    Decode(String),
}

impl ModelError {
    pub fn retry_category(&self) -> RetryCategory {
        match self {
            Self::Transport(_) | Self::EmptyResponse | Self::Decode(_) => RetryCategory::Transient,
            Self::Status { status, .. } if *status == 429 || *status >= 500 => {
                RetryCategory::Transient
            }
            Self::Status { status, .. } if *status == 401 || *status == 403 => {
                RetryCategory::Configuration
            }
            Self::Status { .. } => RetryCategory::Fatal,
            Self::Timeout(_) => RetryCategory::Timeout,
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.retry_category().is_retriable()
    }
}

impl From<reqwest::Error> for ModelError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Unified error type for a translation request.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Model call failed after the transparent retries were used up.
    #[error("{template} call failed after {attempts} attempt(s): {source}")]
    ModelCall {
        template: Template,
        attempts: u32,
        #[source]
        source: ModelError,
    },

    /// The compiler could not be run; the unit cannot be judged.
    #[error("toolchain: {0}")]
    Toolchain(#[from] VerifierError),

    #[error("refinement state: {0}")]
    Refinement(#[from] RefinementError),

    #[error("corpus: {0}")]
    Corpus(#[from] CorpusError),

    #[error("project scan: {0}")]
    Scan(#[from] ScanError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl PipelineError {
    /// Classify this error for retry logic.
    pub fn retry_category(&self) -> RetryCategory {
        match self {
            Self::ModelCall { source, .. } => source.retry_category(),
            Self::Toolchain(VerifierError::Timeout(_)) => RetryCategory::Timeout,
            Self::Toolchain(VerifierError::Scratch(_)) => RetryCategory::Transient,
            Self::Toolchain(VerifierError::ToolchainUnavailable { .. }) => RetryCategory::Fatal,
            Self::Refinement(_) | Self::Internal(_) => RetryCategory::Fatal,
            Self::Corpus(_) | Self::Scan(_) | Self::Configuration(_) => {
                RetryCategory::Configuration
            }
            Self::Cancelled(_) => RetryCategory::Cancelled,
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.retry_category().is_retriable()
    }

    /// Errors that stop the unit outright (as opposed to transient infrastructure noise).
    pub fn is_toolchain(&self) -> bool {
        matches!(self, Self::Toolchain(_))
    }
}
