//! End-to-end pipeline behavior against a scripted model and verifier.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use transpile_agents::config::TranslatorConfig;
use transpile_agents::errors::{ModelError, PipelineError};
use transpile_agents::model::{ModelClient, ModelRequest, Template};
use transpile_agents::pipeline::{TranslationPipeline, TranslationRequest};
use transpile_agents::project_runner::ProjectRunner;
use transpile_core::feedback::{
    CandidateVerifier, CrateType, Diagnostic, RefinementState, RustcVerifier, Verification,
    VerifierConfig, VerifierError,
};
use transpile_core::ordering::SccStatus;
use transpile_core::project::ProjectScanner;
use transpile_core::retrieval::{Corpus, ExampleIndex};

const GOOD: &str = "```rust\nfn main() {\n    println!(\"{}\", 1 + 2);\n}\n```";
const SUMMARY_JSON: &str =
    r#"{"parameters": "none", "return_type": "int", "functional_description": "adds two numbers"}"#;
const SCANF: &str = "#include <stdio.h>\nint main() { int a, b; scanf(\"%d%d\", &a, &b); printf(\"%d\\n\", a + b); return 0; }\n";

/// Replies per template. Summarize falls back to a fixed JSON summary and
/// the code templates fall back to `GOOD` once their script runs out.
/// `code_for` answers code requests whose prompt contains the marker.
#[derive(Default)]
struct ScriptedModel {
    summarize: Mutex<VecDeque<Result<String, ModelError>>>,
    generate: Mutex<VecDeque<Result<String, ModelError>>>,
    refine: Mutex<VecDeque<Result<String, ModelError>>>,
    calls: Mutex<Vec<ModelRequest>>,
    fail_when_user_contains: Option<&'static str>,
    code_for: Vec<(&'static str, &'static str)>,
}

impl ScriptedModel {
    fn with_generate(mut self, replies: Vec<Result<String, ModelError>>) -> Self {
        self.generate = Mutex::new(replies.into());
        self
    }

    fn with_refine(mut self, replies: Vec<Result<String, ModelError>>) -> Self {
        self.refine = Mutex::new(replies.into());
        self
    }

    fn with_summarize(mut self, replies: Vec<Result<String, ModelError>>) -> Self {
        self.summarize = Mutex::new(replies.into());
        self
    }

    fn calls_for(&self, template: Template) -> Vec<ModelRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.template == template)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError> {
        self.calls.lock().unwrap().push(request.clone());
        if let Some(marker) = self.fail_when_user_contains {
            if request.user.contains(marker) {
                return Err(ModelError::Status {
                    status: 401,
                    body: "invalid api key".into(),
                });
            }
        }
        if request.template != Template::Summarize {
            if let Some((_, code)) = self.code_for.iter().find(|(m, _)| request.user.contains(m)) {
                return Ok(format!("```rust\n{code}\n```"));
            }
        }
        let (queue, fallback) = match request.template {
            Template::Summarize => (&self.summarize, SUMMARY_JSON),
            Template::Generate => (&self.generate, GOOD),
            Template::Refine => (&self.refine, GOOD),
        };
        queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(fallback.to_string()))
    }
}

enum Verdict {
    Pass,
    Fail(&'static str),
    Unavailable,
}

#[derive(Default)]
struct ScriptedVerifier {
    verdicts: Mutex<VecDeque<Verdict>>,
    seen: Mutex<Vec<String>>,
}

impl ScriptedVerifier {
    fn new(verdicts: Vec<Verdict>) -> Self {
        Self {
            verdicts: Mutex::new(verdicts.into()),
            seen: Mutex::default(),
        }
    }

    fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl CandidateVerifier for ScriptedVerifier {
    async fn verify(&self, candidate: &str) -> Result<Verification, VerifierError> {
        self.seen.lock().unwrap().push(candidate.to_string());
        let verdict = self.verdicts.lock().unwrap().pop_front().unwrap_or(Verdict::Pass);
        let (compiled, diagnostics) = match verdict {
            Verdict::Pass => (true, Vec::new()),
            Verdict::Fail(message) => (false, vec![Diagnostic::error(message)]),
            Verdict::Unavailable => {
                return Err(VerifierError::ToolchainUnavailable {
                    program: "rustc".into(),
                    reason: "not found".into(),
                })
            }
        };
        Ok(Verification {
            compiled,
            diagnostics,
            warnings: Vec::new(),
            exit_code: Some(if compiled { 0 } else { 1 }),
            crate_type: CrateType::for_candidate(candidate),
            duration_ms: 1,
        })
    }
}

fn config(max_iterations: u32) -> TranslatorConfig {
    TranslatorConfig {
        max_iterations,
        retry_backoff_ms: 0,
        ..TranslatorConfig::default()
    }
}

fn pipeline(
    model: Arc<ScriptedModel>,
    verifier: Arc<ScriptedVerifier>,
    max_iterations: u32,
) -> TranslationPipeline {
    let index = Arc::new(ExampleIndex::build(Corpus::builtin().unwrap()));
    TranslationPipeline::new(model, verifier, index, &config(max_iterations))
}

#[tokio::test]
async fn test_first_candidate_compiles() {
    let model = Arc::new(ScriptedModel::default());
    let verifier = Arc::new(ScriptedVerifier::new(vec![Verdict::Pass]));
    let pipeline = pipeline(model.clone(), verifier.clone(), 3);

    let result = pipeline
        .translate(&TranslationRequest::new("scanf", SCANF))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.outcome, RefinementState::Succeeded);
    assert_eq!(result.attempts.len(), 1);
    assert_eq!(result.refine_calls(), 0);
    assert!(model.calls_for(Template::Refine).is_empty());
    assert!(result.final_code.contains("fn main()"));
    assert!(!result.final_code.contains("```"));
    assert_eq!(result.artifacts.summary.functional_description, "adds two numbers");
}

#[tokio::test]
async fn test_generate_prompt_carries_hints_and_examples() {
    let model = Arc::new(ScriptedModel::default());
    let verifier = Arc::new(ScriptedVerifier::default());
    let pipeline = pipeline(model.clone(), verifier, 3);

    let result = pipeline
        .translate(&TranslationRequest::new("scanf", SCANF))
        .await
        .unwrap();

    let generate = model.calls_for(Template::Generate);
    assert_eq!(generate.len(), 1);
    assert!(!result.artifacts.hints.is_empty());
    assert!(!result.artifacts.examples.is_empty());
    assert!(generate[0].user.contains("scanf"));
    assert!(generate[0].user.contains("adds two numbers"));
}

#[tokio::test]
async fn test_exhausts_budget() {
    let model = Arc::new(ScriptedModel::default());
    let verifier = Arc::new(ScriptedVerifier::new(vec![
        Verdict::Fail("mismatched types"),
        Verdict::Fail("mismatched types"),
        Verdict::Fail("mismatched types"),
    ]));
    let pipeline = pipeline(model.clone(), verifier.clone(), 3);

    let result = pipeline
        .translate(&TranslationRequest::new("scanf", SCANF))
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.outcome, RefinementState::Exhausted);
    assert_eq!(result.attempts.len(), 3);
    assert_eq!(verifier.calls(), 3);
    assert_eq!(model.calls_for(Template::Refine).len(), 2);
    assert_eq!(result.final_code, result.attempts[2].generated_code);
}

#[tokio::test]
async fn test_fail_fail_succeed() {
    let model = Arc::new(ScriptedModel::default());
    let verifier = Arc::new(ScriptedVerifier::new(vec![
        Verdict::Fail("cannot find value `x` in this scope"),
        Verdict::Fail("mismatched types"),
        Verdict::Pass,
    ]));
    let pipeline = pipeline(model.clone(), verifier, 3);

    let result = pipeline
        .translate(&TranslationRequest::new("scanf", SCANF))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.attempts.len(), 3);
    assert!(!result.attempts[0].diagnostics.is_empty());
    assert!(!result.attempts[1].diagnostics.is_empty());
    assert!(result.attempts[2].diagnostics.is_empty());
    let indices: Vec<u32> = result.attempts.iter().map(|a| a.iteration_index).collect();
    assert_eq!(indices, vec![0, 1, 2]);

    let refines = model.calls_for(Template::Refine);
    assert_eq!(refines.len(), 2);
    assert!(refines[0].user.contains("cannot find value `x`"));
    assert!(refines[1].user.contains("mismatched types"));
}

#[tokio::test]
async fn test_transport_retry_does_not_consume_budget() {
    let model = Arc::new(ScriptedModel::default().with_generate(vec![
        Err(ModelError::Status {
            status: 503,
            body: "overloaded".into(),
        }),
        Ok(GOOD.to_string()),
    ]));
    let verifier = Arc::new(ScriptedVerifier::default());
    let pipeline = pipeline(model.clone(), verifier, 3);

    let result = pipeline
        .translate(&TranslationRequest::new("scanf", SCANF))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.attempts.len(), 1);
    assert_eq!(model.calls_for(Template::Generate).len(), 2);
}

#[tokio::test]
async fn test_fatal_model_error_aborts() {
    let model = Arc::new(ScriptedModel::default().with_generate(vec![Err(ModelError::Status {
        status: 400,
        body: "bad request".into(),
    })]));
    let verifier = Arc::new(ScriptedVerifier::default());
    let pipeline = pipeline(model.clone(), verifier.clone(), 3);

    let err = pipeline
        .translate(&TranslationRequest::new("scanf", SCANF))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::ModelCall {
            template: Template::Generate,
            attempts: 1,
            ..
        }
    ));
    assert_eq!(verifier.calls(), 0);
}

#[tokio::test]
async fn test_toolchain_unavailable_is_not_a_failed_attempt() {
    let model = Arc::new(ScriptedModel::default());
    let verifier = Arc::new(ScriptedVerifier::new(vec![Verdict::Unavailable]));
    let pipeline = pipeline(model.clone(), verifier, 3);

    let err = pipeline
        .translate(&TranslationRequest::new("scanf", SCANF))
        .await
        .unwrap_err();

    assert!(err.is_toolchain());
    assert!(matches!(err, PipelineError::Toolchain(_)));
    assert!(model.calls_for(Template::Refine).is_empty());
}

#[tokio::test]
async fn test_malformed_reply_consumes_iteration() {
    let model = Arc::new(
        ScriptedModel::default().with_generate(vec![Ok("I cannot translate this program.".into())]),
    );
    let verifier = Arc::new(ScriptedVerifier::default());
    let pipeline = pipeline(model.clone(), verifier.clone(), 3);

    let result = pipeline
        .translate(&TranslationRequest::new("scanf", SCANF))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.attempts.len(), 2);
    assert!(result.attempts[0].malformed);
    assert!(!result.attempts[0].compiled);
    assert!(result.attempts[0].diagnostics[0]
        .message
        .contains("no usable Rust code"));
    // only the refined candidate reached the compiler
    assert_eq!(verifier.calls(), 1);
}

#[tokio::test]
async fn test_single_iteration_budget() {
    let model = Arc::new(ScriptedModel::default().with_refine(vec![Ok("unused".into())]));
    let verifier = Arc::new(ScriptedVerifier::new(vec![Verdict::Fail("mismatched types")]));
    let pipeline = pipeline(model.clone(), verifier, 1);

    let result = pipeline
        .translate(&TranslationRequest::new("scanf", SCANF))
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.attempts.len(), 1);
    assert!(model.calls_for(Template::Refine).is_empty());
}

#[tokio::test]
async fn test_summary_repaired_from_prose() {
    let model = Arc::new(
        ScriptedModel::default().with_summarize(vec![Ok("It reads two integers and prints their sum.".into())]),
    );
    let verifier = Arc::new(ScriptedVerifier::default());
    let pipeline = pipeline(model, verifier, 3);

    let result = pipeline
        .translate(&TranslationRequest::new("scanf", SCANF))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(
        result.artifacts.summary.functional_description,
        "It reads two integers and prints their sum."
    );
}

#[tokio::test]
async fn test_precomputed_summary_skips_model_call() {
    let model = Arc::new(ScriptedModel::default());
    let verifier = Arc::new(ScriptedVerifier::default());
    let pipeline = pipeline(model.clone(), verifier, 3);

    let mut request = TranslationRequest::new("scanf", SCANF);
    request.summary = Some(transpile_agents::CodeSummary {
        functional_description: "sums input".into(),
        ..Default::default()
    });
    pipeline.translate(&request).await.unwrap();

    assert!(model.calls_for(Template::Summarize).is_empty());
}

const CHAIN: &str = r#"
int leaf(int x) { return x + 1; }
int mid(int x) { return leaf(x) * 2; }
int top(void) { return mid(3); }
"#;

fn chain_scan() -> transpile_core::project::ProjectScan {
    ProjectScanner::new().scan_sources(&[(PathBuf::from("chain.c"), CHAIN.to_string())])
}

#[tokio::test]
async fn test_project_runs_dependencies_first() {
    let model = Arc::new(ScriptedModel::default());
    let verifier = Arc::new(ScriptedVerifier::default());
    let pipeline = Arc::new(pipeline(model.clone(), verifier, 3));

    let report = ProjectRunner::new(pipeline, 1, false).run(&chain_scan()).await;

    let labels: Vec<&str> = report.sccs.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, vec!["leaf", "mid", "top"]);
    assert_eq!(report.succeeded(), 3);
    assert!(!report.cancelled);

    let generated: Vec<String> = model
        .calls_for(Template::Generate)
        .into_iter()
        .map(|r| r.user)
        .collect();
    assert!(generated[0].contains("int leaf("));
    assert!(generated[2].contains("int top("));
    // upstream translations are offered to later SCCs
    assert!(generated[2].contains("Known dependencies:"));

    let artifact = report.artifact();
    let leaf = artifact.find("// SCC 0: leaf").unwrap();
    let top = artifact.find("// SCC 2: top").unwrap();
    assert!(leaf < top);
}

#[tokio::test]
async fn test_project_failure_blocks_dependents() {
    let model = Arc::new(ScriptedModel {
        fail_when_user_contains: Some("int mid("),
        ..ScriptedModel::default()
    });
    let verifier = Arc::new(ScriptedVerifier::default());
    let pipeline = Arc::new(pipeline(model.clone(), verifier, 3));

    let report = ProjectRunner::new(pipeline, 2, false).run(&chain_scan()).await;

    let status: Vec<SccStatus> = report.sccs.iter().map(|s| s.status).collect();
    assert_eq!(
        status,
        vec![SccStatus::Done, SccStatus::Failed, SccStatus::Blocked]
    );
    assert!(report.sccs[1].error.is_some());
    assert!(report.sccs[2].result.is_none());
    assert!(!model
        .calls_for(Template::Generate)
        .iter()
        .any(|r| r.user.contains("int top(")));
    assert!(report.artifact().contains("not translated"));
}

#[tokio::test]
async fn test_project_exhausted_scc_still_unlocks_dependents() {
    let model = Arc::new(ScriptedModel::default());
    // leaf fails every attempt, mid and top compile first time
    let verifier = Arc::new(ScriptedVerifier::new(vec![
        Verdict::Fail("mismatched types"),
        Verdict::Fail("mismatched types"),
    ]));
    let pipeline = Arc::new(pipeline(model, verifier, 2));

    let report = ProjectRunner::new(pipeline, 1, false).run(&chain_scan()).await;

    assert_eq!(report.sccs.len(), 3);
    assert!(report.sccs.iter().all(|s| s.status == SccStatus::Done));
    assert_eq!(report.succeeded(), 2);
    assert!(report.artifact().contains("// SCC 0: leaf (does not compile)"));
}

const LEAF_FN: &str = "pub fn leaf(x: i32) -> i32 {\n    x + 1\n}";
const MID_FN: &str = "pub fn mid(x: i32) -> i32 {\n    leaf(x) * 2\n}";

fn leaf_mid_model() -> ScriptedModel {
    ScriptedModel {
        code_for: vec![("int leaf(", LEAF_FN), ("int mid(", MID_FN)],
        ..ScriptedModel::default()
    }
}

fn leaf_mid_scan() -> transpile_core::project::ProjectScan {
    let source = "int leaf(int x) { return x + 1; }\nint mid(int x) { return leaf(x) * 2; }\n";
    ProjectScanner::new().scan_sources(&[(PathBuf::from("chain.c"), source.to_string())])
}

#[tokio::test]
async fn test_project_candidates_verified_with_upstream_code() {
    let model = Arc::new(leaf_mid_model());
    let verifier = Arc::new(ScriptedVerifier::new(vec![
        Verdict::Pass,
        Verdict::Fail("cannot find function `leaf` in this scope"),
        Verdict::Pass,
    ]));
    let pipeline = Arc::new(pipeline(model.clone(), verifier.clone(), 3));

    let report = ProjectRunner::new(pipeline, 1, false).run(&leaf_mid_scan()).await;

    assert_eq!(report.succeeded(), 2);
    let seen = verifier.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 3);
    // leaf has no upstream, so it is compiled alone
    assert_eq!(seen[0], LEAF_FN);
    for mid in &seen[1..] {
        assert!(mid.starts_with(MID_FN));
        assert!(mid.contains("// SCC 0: leaf\npub fn leaf"));
    }

    // only the candidate is kept as the SCC's translation
    let mid = report.sccs[1].result.as_ref().unwrap();
    assert_eq!(mid.final_code, MID_FN);
    assert_eq!(mid.attempts.len(), 2);

    let refines = model.calls_for(Template::Refine);
    assert_eq!(refines.len(), 1);
    assert!(refines[0].user.contains("## Declaration\nkind: scc, name: SCC 1: mid"));
    assert!(refines[0].user.contains("## Already translated"));
    assert!(refines[0].user.contains("- pub fn leaf(x: i32) -> i32"));

    let artifact = report.artifact();
    assert_eq!(artifact.matches("pub fn leaf").count(), 1);
    assert_eq!(artifact.matches("pub fn mid").count(), 1);
}

#[tokio::test]
async fn test_exhausted_upstream_left_out_of_workspace() {
    let model = Arc::new(leaf_mid_model());
    let verifier = Arc::new(ScriptedVerifier::new(vec![Verdict::Fail("mismatched types")]));
    let pipeline = Arc::new(pipeline(model, verifier.clone(), 1));

    let report = ProjectRunner::new(pipeline, 1, false).run(&leaf_mid_scan()).await;

    assert!(report.sccs.iter().all(|s| s.status == SccStatus::Done));
    let seen = verifier.seen.lock().unwrap().clone();
    assert_eq!(seen, vec![LEAF_FN.to_string(), MID_FN.to_string()]);
}

#[tokio::test]
async fn test_project_dependent_compiles_with_rustc() {
    let rustc = RustcVerifier::new(VerifierConfig::default());
    if let Err(e) = rustc.probe().await {
        eprintln!("skipping: {e}");
        return;
    }
    let model = Arc::new(leaf_mid_model());
    let index = Arc::new(ExampleIndex::build(Corpus::builtin().unwrap()));
    let pipeline = Arc::new(TranslationPipeline::new(model, Arc::new(rustc), index, &config(3)));

    let report = ProjectRunner::new(pipeline, 2, false).run(&leaf_mid_scan()).await;

    let labels: Vec<&str> = report.sccs.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, vec!["leaf", "mid"]);
    for scc in &report.sccs {
        let result = scc.result.as_ref().unwrap();
        assert!(result.success, "{} did not compile: {:?}", scc.label, result.attempts);
        assert_eq!(result.attempts.len(), 1);
    }
    assert_eq!(report.succeeded(), 2);
}
