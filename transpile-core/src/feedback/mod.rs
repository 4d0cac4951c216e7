//! Compilation Feedback Module
//!
//! Provides the verification half of the translation loop:
//! - Extract a candidate program from raw model output
//! - Run rustc on it and parse the diagnostics
//! - Track attempts through the bounded refinement state machine
//! - Keep accepted translations so dependents compile against them
//!
//! # Architecture
//!
//! ```text
//! model reply → candidate → RustcVerifier → error_parser → RefinementLoop
//!                                                               |
//!             refine prompt ←───────────────────────────────────┘
//! ```

pub mod candidate;
pub mod compiler;
pub mod error_parser;
pub mod refinement;
pub mod workspace;

pub use candidate::{extract_candidate, MalformedOutput};
pub use compiler::{
    CandidateVerifier, CrateType, RustcVerifier, Verification, VerifierConfig, VerifierError,
};
pub use error_parser::{Diagnostic, ErrorCategory, Location, Severity};
pub use refinement::{
    RefinementError, RefinementLoop, RefinementOutcome, RefinementState, TranslationAttempt,
    DEFAULT_MAX_ITERATIONS,
};
pub use workspace::{Workspace, WorkspacePart};
