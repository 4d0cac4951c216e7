//! Per-request translation pipeline.
//!
//! ```text
//! detect → retrieve → summarize → generate → verify ─┬─ compiled  → Succeeded
//!                                               ↑     ├─ budget left → refine ─┐
//!                                               │     └─ budget used → Exhausted
//!                                               └──────────────────────────────┘
//! ```
//!
//! Stages run strictly in sequence. Model transport failures (after the
//! transparent retries) and compiler invocation failures abort the request
//! with a [`PipelineError`]; they never consume refinement budget.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, Instrument};
use uuid::Uuid;

use transpile_core::analysis::{format_hints, Category, Detector, RuleHint};
use transpile_core::feedback::error_parser::format_for_prompt;
use transpile_core::feedback::{
    CandidateVerifier, Diagnostic, RefinementLoop, RefinementState, TranslationAttempt, Workspace,
};
use transpile_core::resilience::DegradationLevel;
use transpile_core::retrieval::{format_examples, ExampleIndex};

use crate::config::TranslatorConfig;
use crate::errors::PipelineError;
use crate::generator::{Candidate, Generator};
use crate::model::{ModelClient, RetryingModel};
use crate::prompts::{translation_constraints, GenerateInputs, RefineInputs, PROMPT_VERSION};
use crate::summarizer::{CodeSummary, Summarizer};

/// One unit of work: C source plus optional context from the caller.
#[derive(Debug, Clone, Default)]
pub struct TranslationRequest {
    pub label: String,
    pub source: String,
    /// e.g. "kind: scc, name: SCC 2: foo, bar"
    pub declaration_context: Option<String>,
    /// Upstream translations the model may reuse (project mode).
    pub dependency_context: Option<String>,
    /// Compiled upstream code each candidate is verified against.
    pub workspace: Workspace,
    /// C type names the output must rename to UpperCamelCase.
    pub type_names: Vec<String>,
    /// Precomputed hints; detection is skipped when set.
    pub hints: Option<Vec<RuleHint>>,
    /// Precomputed summary; the summarize call is skipped when set.
    pub summary: Option<CodeSummary>,
}

impl TranslationRequest {
    pub fn new(label: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            source: source.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExampleRef {
    pub description: String,
    pub score: f64,
    pub rank: usize,
}

/// Intermediate products kept for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineArtifacts {
    pub hints: Vec<RuleHint>,
    pub categories: Vec<Category>,
    pub analysis: DegradationLevel,
    pub examples: Vec<ExampleRef>,
    pub retrieval_fell_back: bool,
    pub summary: CodeSummary,
    pub prompt_version: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub request_id: Uuid,
    pub label: String,
    pub final_code: String,
    pub success: bool,
    /// `Succeeded` or `Exhausted`.
    pub outcome: RefinementState,
    pub attempts: Vec<TranslationAttempt>,
    pub artifacts: PipelineArtifacts,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl PipelineResult {
    pub fn refine_calls(&self) -> usize {
        self.attempts.len().saturating_sub(1)
    }
}

fn distinct_categories(hints: &[RuleHint]) -> Vec<Category> {
    let mut out: Vec<Category> = Vec::new();
    for hint in hints {
        if !out.contains(&hint.category) {
            out.push(hint.category.clone());
        }
    }
    out
}

pub struct TranslationPipeline {
    detector: Detector,
    index: Arc<ExampleIndex>,
    summarizer: Summarizer,
    generator: Generator,
    verifier: Arc<dyn CandidateVerifier>,
    max_iterations: u32,
    top_k: usize,
}

impl TranslationPipeline {
    pub fn new(
        model: Arc<dyn ModelClient>,
        verifier: Arc<dyn CandidateVerifier>,
        index: Arc<ExampleIndex>,
        config: &TranslatorConfig,
    ) -> Self {
        let model = RetryingModel::new(model, config.retry_policy(), config.model_timeout());
        Self {
            detector: Detector::new(),
            index,
            summarizer: Summarizer::new(model.clone()),
            generator: Generator::new(model),
            verifier,
            max_iterations: config.max_iterations,
            top_k: config.top_k,
        }
    }

    /// Replace the built-in checker registry.
    pub fn with_detector(mut self, detector: Detector) -> Self {
        self.detector = detector;
        self
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub async fn translate(&self, request: &TranslationRequest) -> Result<PipelineResult, PipelineError> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("translate", request_id = %request_id, label = %request.label);
        self.run(request_id, request).instrument(span).await
    }

    async fn run(
        &self,
        request_id: Uuid,
        request: &TranslationRequest,
    ) -> Result<PipelineResult, PipelineError> {
        let started_at = Utc::now();
        let start = Instant::now();
        let source = request.source.as_str();

        let (hints, analysis) = match &request.hints {
            Some(hints) => (hints.clone(), DegradationLevel::Full),
            None => {
                let report = self.detector.detect(source);
                (report.hints, report.degradation)
            }
        };
        let categories = distinct_categories(&hints);
        info!(hints = hints.len(), categories = ?categories, analysis = %analysis, "Patterns detected");

        let retrieval = self.index.retrieve(source, &categories, self.top_k);
        info!(examples = retrieval.len(), fell_back = retrieval.fell_back, "Examples retrieved");

        let summary = match &request.summary {
            Some(summary) => summary.clone(),
            None => {
                self.summarizer
                    .summarize(source, request.declaration_context.as_deref())
                    .await?
            }
        };

        let type_names: Vec<&str> = request.type_names.iter().map(String::as_str).collect();
        let constraints = translation_constraints(&type_names);
        let hints_text = format_hints(&hints);
        let examples_text = format_examples(retrieval.examples());
        let summary_text = summary.format();

        let mut state = RefinementLoop::new(self.max_iterations)?;
        let mut candidate = self
            .generator
            .generate(&GenerateInputs {
                source,
                hints: &hints_text,
                examples: &examples_text,
                summary: &summary_text,
                declaration_context: request.declaration_context.as_deref(),
                dependency_context: request.dependency_context.as_deref(),
                constraints: &constraints,
            })
            .await?;

        loop {
            let iteration = state.next_index();
            let (compiled, diagnostics, malformed) =
                self.judge(&candidate, &request.workspace).await?;
            info!(
                iteration,
                compiled,
                malformed,
                errors = diagnostics.len(),
                "Attempt verified"
            );
            state.submit(candidate.text().to_string())?;
            if state.record(compiled, diagnostics, malformed)? != RefinementState::Refining {
                break;
            }

            let (previous, diagnostics) = match state.last_attempt() {
                Some(last) => (last.generated_code.clone(), format_for_prompt(&last.diagnostics)),
                None => (String::new(), String::new()),
            };
            candidate = self
                .generator
                .refine(&RefineInputs {
                    original: source,
                    previous: &previous,
                    diagnostics: &diagnostics,
                    declaration_context: request.declaration_context.as_deref(),
                    dependency_context: request.dependency_context.as_deref(),
                    constraints: &constraints,
                })
                .await?;
        }

        info!(summary = %state.summary(), "Refinement finished");
        let outcome = state.finish()?;

        Ok(PipelineResult {
            request_id,
            label: request.label.clone(),
            final_code: outcome.final_code,
            success: outcome.success,
            outcome: outcome.state,
            attempts: outcome.attempts,
            artifacts: PipelineArtifacts {
                hints,
                categories,
                analysis,
                examples: retrieval
                    .hits
                    .iter()
                    .map(|h| ExampleRef {
                        description: h.example.description.clone(),
                        score: h.score,
                        rank: h.rank,
                    })
                    .collect(),
                retrieval_fell_back: retrieval.fell_back,
                summary,
                prompt_version: PROMPT_VERSION,
            },
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Compile a candidate together with the workspace, or fail it without
    /// compiling when the reply held no code.
    async fn judge(
        &self,
        candidate: &Candidate,
        workspace: &Workspace,
    ) -> Result<(bool, Vec<Diagnostic>, bool), PipelineError> {
        match &candidate.code {
            Ok(code) if workspace.is_empty() => {
                let verification = self.verifier.verify(code).await?;
                Ok((verification.compiled, verification.diagnostics, false))
            }
            Ok(code) => {
                let verification = self.verifier.verify(&workspace.with_candidate(code)).await?;
                Ok((verification.compiled, verification.diagnostics, false))
            }
            Err(reason) => Ok((
                false,
                vec![Diagnostic::error(format!("no usable Rust code in model output: {reason}"))],
                true,
            )),
        }
    }
}
