//! Deterministic building blocks for compiler-guided C to Rust translation.
//!
//! This library provides everything in the pipeline that does not talk to a
//! language model:
//! - Pattern detection over C source (tree-sitter-c with a regex fallback)
//! - A BM25-ranked corpus of precedent translations
//! - rustc-based candidate verification and diagnostic parsing
//! - The bounded refinement state machine
//! - Dependency ordering (SCC condensation) and multi-file project scanning
//!
//! # Flow
//!
//! ```text
//! C source → Detector → ExampleIndex → (model) → RustcVerifier → RefinementLoop
//!                                                    ↑                  |
//!                                                    └──── refine ──────┘
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod analysis;
pub mod feedback;
pub mod ordering;
pub mod project;
pub mod resilience;
pub mod retrieval;

// Re-export pattern detection types
pub use analysis::{format_hints, AnalysisReport, Category, Detector, PatternChecker, RuleHint};

// Re-export retrieval types
pub use retrieval::{
    format_examples, Corpus, CorpusError, Example, ExampleIndex, RetrievalResult,
    RetrievedExample, DEFAULT_TOP_K,
};

// Re-export verification and refinement types
pub use feedback::{
    extract_candidate, CandidateVerifier, Diagnostic, ErrorCategory, MalformedOutput,
    RefinementError, RefinementLoop, RefinementOutcome, RefinementState, RustcVerifier,
    TranslationAttempt, Verification, VerifierConfig, VerifierError, Workspace,
    DEFAULT_MAX_ITERATIONS,
};

// Re-export ordering types
pub use ordering::{DependencyGraph, DependencyOrder, EdgeReason, Scc, SccStatus, Schedule};

// Re-export project scanning types
pub use project::{ProjectScan, ProjectScanner, ScanError, SourceLocation, Unit, UnitKind};

// Re-export resilience types
pub use resilience::{DegradationLevel, RetryPolicy};
