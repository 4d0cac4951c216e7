//! Model-driven C to Rust translation.
//!
//! Wires the deterministic parts from `transpile_core` to a language model:
//! - [`model`]: capability trait, OpenAI-compatible client, timeout + retry
//! - [`summarizer`] / [`generator`]: the three model calls
//! - [`pipeline`]: one request through detect, retrieve, summarize, generate, refine
//! - [`project_runner`]: SCC-ordered multi-file runs on a worker pool
//! - [`suite`] / [`report`]: built-in cases and result rendering

pub mod config;
pub mod errors;
pub mod generator;
pub mod model;
pub mod pipeline;
pub mod project_runner;
pub mod prompts;
pub mod report;
pub mod suite;
pub mod summarizer;

pub use config::{CliOverrides, ConfigError, TranslatorConfig};
pub use errors::{ModelError, PipelineError, RetryCategory};
pub use model::{ModelClient, ModelRequest, OpenAiCompatClient, RetryingModel, Template};
pub use pipeline::{PipelineResult, TranslationPipeline, TranslationRequest};
pub use project_runner::{ProjectReport, ProjectRunner};
pub use summarizer::CodeSummary;
