//! Multi-file translation: one pipeline request per SCC, dependencies first,
//! independent SCCs in parallel on a bounded worker pool.

use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use transpile_core::feedback::Workspace;
use transpile_core::ordering::{DependencyOrder, Scc, SccStatus, Schedule};
use transpile_core::project::{ProjectScan, UnitKind};

use crate::errors::PipelineError;
use crate::pipeline::{PipelineResult, TranslationPipeline, TranslationRequest};

/// Upstream SCCs reachable within this many hops feed the dependency context.
const CONTEXT_MAX_HOPS: usize = 2;
const CONTEXT_MAX_ENTRIES: usize = 12;

static RUST_SIGNATURE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:unsafe\s+)?(?:fn|struct|enum|trait|type|const|static|impl)\b").unwrap()
});

/// Item headers of translated code, e.g. `pub fn area(s: &Square) -> i64`.
pub fn rust_signatures(code: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    code.lines()
        .filter(|l| RUST_SIGNATURE_RE.is_match(l))
        .map(|l| l.trim().trim_end_matches('{').trim_end().to_string())
        .filter(|l| seen.insert(l.clone()))
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct SccReport {
    pub id: usize,
    pub label: String,
    pub status: SccStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<PipelineResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectReport {
    pub sccs: Vec<SccReport>,
    pub cancelled: bool,
}

impl ProjectReport {
    pub fn succeeded(&self) -> usize {
        self.sccs
            .iter()
            .filter(|s| s.result.as_ref().is_some_and(|r| r.success))
            .count()
    }

    pub fn results(&self) -> impl Iterator<Item = &PipelineResult> {
        self.sccs.iter().filter_map(|s| s.result.as_ref())
    }

    /// SCC sections concatenated in processing order, as one source file.
    pub fn artifact(&self) -> String {
        let mut workspace = Workspace::new();
        for scc in &self.sccs {
            let prefix = format!("SCC {}: {}", scc.id, scc.label);
            match (&scc.result, &scc.error) {
                (Some(result), _) => {
                    let note = if result.success { "" } else { " (does not compile)" };
                    workspace.push(format!("{prefix}{note}"), result.final_code.as_str());
                }
                (None, Some(err)) => workspace.push(format!("{prefix} (not translated: {err})"), ""),
                (None, None) => workspace.push(format!("{prefix} ({:?})", scc.status), ""),
            }
        }
        workspace.render()
    }
}

pub struct ProjectRunner {
    pipeline: Arc<TranslationPipeline>,
    workers: usize,
    abort_on_fatal: bool,
}

impl ProjectRunner {
    pub fn new(pipeline: Arc<TranslationPipeline>, workers: usize, abort_on_fatal: bool) -> Self {
        Self {
            pipeline,
            workers: workers.max(1),
            abort_on_fatal,
        }
    }

    fn request_for(
        &self,
        scan: &ProjectScan,
        order: &DependencyOrder,
        scc: &Scc,
        results: &[Option<PipelineResult>],
    ) -> TranslationRequest {
        let units: Vec<_> = scc.units.iter().filter_map(|n| scan.unit(n)).collect();
        let source = units
            .iter()
            .map(|u| u.source.trim())
            .collect::<Vec<_>>()
            .join("\n\n");
        let hints = units.iter().flat_map(|u| u.hints.iter().cloned()).collect();
        let type_names = units
            .iter()
            .filter(|u| u.kind != UnitKind::Function)
            .map(|u| u.name.clone())
            .collect();

        let label = format!("SCC {}: {}", scc.id, scc.label());
        TranslationRequest {
            declaration_context: Some(format!("kind: scc, name: {label}")),
            dependency_context: dependency_context(order, scc.id, results),
            workspace: workspace_for(order, scc.id, results),
            label,
            source,
            type_names,
            hints: Some(hints),
            summary: None,
        }
    }

    pub async fn run(&self, scan: &ProjectScan) -> ProjectReport {
        let order = scan.order();
        let mut schedule = Schedule::new(order.clone());
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let cancel = CancellationToken::new();
        let mut tasks: JoinSet<(usize, Result<PipelineResult, PipelineError>)> = JoinSet::new();
        let mut results: Vec<Option<PipelineResult>> = vec![None; order.len()];
        let mut errors: Vec<Option<String>> = vec![None; order.len()];

        info!(units = scan.units.len(), sccs = order.len(), workers = self.workers, "Project run starting");

        loop {
            if !cancel.is_cancelled() {
                for id in schedule.ready() {
                    schedule.start(id);
                    let request = self.request_for(scan, &order, &order.sccs[id], &results);
                    let pipeline = Arc::clone(&self.pipeline);
                    let semaphore = Arc::clone(&semaphore);
                    let token = cancel.clone();
                    tasks.spawn(async move {
                        let work = async {
                            let _permit = semaphore
                                .acquire_owned()
                                .await
                                .map_err(|e| PipelineError::Internal(e.into()))?;
                            pipeline.translate(&request).await
                        };
                        let result = tokio::select! {
                            _ = token.cancelled() => Err(PipelineError::Cancelled("run aborted".into())),
                            r = work => r,
                        };
                        (id, result)
                    });
                }
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };
            match joined {
                Ok((id, Ok(result))) => {
                    info!(scc = id, success = result.success, attempts = result.attempts.len(), "SCC translated");
                    // an exhausted SCC still yields code; dependents go ahead with it
                    schedule.complete(id);
                    results[id] = Some(result);
                }
                Ok((id, Err(e))) => {
                    let blocked = schedule.fail(id);
                    warn!(scc = id, error = %e, blocked = blocked.len(), "SCC failed");
                    if self.abort_on_fatal && !matches!(e, PipelineError::Cancelled(_)) {
                        warn!("Aborting project run");
                        cancel.cancel();
                    }
                    errors[id] = Some(e.to_string());
                }
                Err(e) => error!(error = %e, "Translation task panicked"),
            }
        }

        // panicked tasks leave their SCC running
        for id in schedule.with_status(SccStatus::Running) {
            schedule.fail(id);
            errors[id].get_or_insert_with(|| "task panicked".to_string());
        }

        let sccs = order
            .sccs
            .iter()
            .map(|scc| SccReport {
                id: scc.id,
                label: scc.label(),
                status: schedule.status(scc.id).unwrap_or(SccStatus::Pending),
                result: results[scc.id].take(),
                error: errors[scc.id].take(),
            })
            .collect();

        ProjectReport {
            sccs,
            cancelled: cancel.is_cancelled(),
        }
    }
}

/// Final code of every compiling upstream SCC, transitively, in processing
/// order. Dependents of an exhausted SCC see its signatures in the prompt
/// but are verified without it.
fn workspace_for(
    order: &DependencyOrder,
    id: usize,
    results: &[Option<PipelineResult>],
) -> Workspace {
    let mut upstream = BTreeSet::new();
    let mut stack: Vec<usize> = order.sccs[id].depends_on.clone();
    while let Some(dep) = stack.pop() {
        if upstream.insert(dep) {
            stack.extend(order.sccs[dep].depends_on.iter().copied());
        }
    }

    let mut workspace = Workspace::new();
    for dep in upstream {
        match &results[dep] {
            Some(result) if result.success => workspace.push(
                format!("SCC {}: {}", dep, order.sccs[dep].label()),
                result.final_code.as_str(),
            ),
            Some(_) => {
                debug!(scc = id, upstream = dep, "Upstream does not compile; left out of workspace")
            }
            None => {}
        }
    }
    workspace
}

/// Summaries and item signatures of translated upstream SCCs, nearest first.
fn dependency_context(
    order: &DependencyOrder,
    id: usize,
    results: &[Option<PipelineResult>],
) -> Option<String> {
    let mut lines = vec!["Known dependencies:".to_string()];
    let mut seen = BTreeSet::from([id]);
    let mut queue: VecDeque<(usize, usize)> =
        order.sccs[id].depends_on.iter().map(|&d| (d, 1)).collect();
    let mut entries = 0;

    while let Some((dep, hop)) = queue.pop_front() {
        if entries >= CONTEXT_MAX_ENTRIES {
            break;
        }
        if hop > CONTEXT_MAX_HOPS || !seen.insert(dep) {
            continue;
        }
        if let Some(result) = &results[dep] {
            lines.push(format!(
                "SCC {}: {} | function: {}",
                dep,
                order.sccs[dep].label(),
                result.artifacts.summary.functional_description
            ));
            for signature in rust_signatures(&result.final_code) {
                lines.push(format!("- {signature}"));
                entries += 1;
                if entries >= CONTEXT_MAX_ENTRIES {
                    break;
                }
            }
        }
        queue.extend(order.sccs[dep].depends_on.iter().map(|&d| (d, hop + 1)));
    }

    (lines.len() > 1).then(|| lines.join("\n"))
}
