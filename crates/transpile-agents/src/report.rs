//! Human-readable rendering of run results. JSON output is the serde form
//! of the same structs.

use std::fmt::Write as _;

use serde::Serialize;
use transpile_core::feedback::error_parser::format_for_prompt;

use crate::pipeline::PipelineResult;
use crate::project_runner::ProjectReport;
use crate::suite::CaseGroup;

const RULE: &str = "============================================================";

fn mark(success: bool) -> &'static str {
    if success {
        "✓"
    } else {
        "✗"
    }
}

/// Full report for one request: outcome, analysis, final code, last errors.
pub fn render_result(result: &PipelineResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{RULE}\nTRANSLATION RESULTS\n{RULE}");
    let _ = writeln!(out, "Request:    {} ({})", result.label, result.request_id);
    let _ = writeln!(
        out,
        "Outcome:    {} {} after {} attempt(s), {} ms",
        mark(result.success),
        result.outcome,
        result.attempts.len(),
        result.duration_ms
    );

    let categories: Vec<String> = result.artifacts.categories.iter().map(|c| c.to_string()).collect();
    let _ = writeln!(
        out,
        "Categories: {} (analysis: {})",
        if categories.is_empty() {
            "none".to_string()
        } else {
            categories.join(", ")
        },
        result.artifacts.analysis
    );
    let _ = writeln!(out, "Hints:      {}", result.artifacts.hints.len());
    for example in &result.artifacts.examples {
        let _ = writeln!(
            out,
            "Example {}:  {} (score {:.3})",
            example.rank, example.description, example.score
        );
    }
    if result.artifacts.retrieval_fell_back {
        let _ = writeln!(out, "            (no category match; ranked the full corpus)");
    }

    for attempt in &result.attempts {
        let _ = writeln!(
            out,
            "  [{}] attempt {}: {}",
            mark(attempt.compiled),
            attempt.iteration_index + 1,
            if attempt.compiled {
                "compiled".to_string()
            } else if attempt.malformed {
                "no usable code in reply".to_string()
            } else {
                format!("{} error(s)", attempt.diagnostics.len())
            }
        );
    }

    let _ = writeln!(out, "\nRust code:\n{}", result.final_code.trim_end());
    if let Some(last) = result.attempts.last().filter(|a| !a.compiled) {
        let _ = writeln!(out, "\nRemaining errors:\n{}", format_for_prompt(&last.diagnostics).trim_end());
    }
    out
}

#[derive(Debug, Clone, Serialize)]
pub struct SuiteEntry {
    pub name: String,
    pub group: CaseGroup,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<PipelineResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SuiteEntry {
    pub fn passed(&self) -> bool {
        self.result.as_ref().is_some_and(|r| r.success)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SuiteReport {
    pub entries: Vec<SuiteEntry>,
}

impl SuiteReport {
    pub fn passed(&self) -> usize {
        self.entries.iter().filter(|e| e.passed()).count()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{RULE}\nSUMMARY\n{RULE}");
        let _ = writeln!(out, "Passed: {}/{}\n", self.passed(), self.entries.len());
        for entry in &self.entries {
            let detail = match (&entry.result, &entry.error) {
                (Some(r), _) => format!("{} attempt(s)", r.attempts.len()),
                (None, Some(e)) => format!("error: {e}"),
                (None, None) => "not run".to_string(),
            };
            let _ = writeln!(out, "  {} {:<20} {}", mark(entry.passed()), entry.name, detail);
        }
        out
    }
}

pub fn render_project(report: &ProjectReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{RULE}\nPROJECT RESULTS\n{RULE}");
    let _ = writeln!(
        out,
        "Compiled: {}/{} SCC(s){}",
        report.succeeded(),
        report.sccs.len(),
        if report.cancelled { " (run aborted)" } else { "" }
    );
    for scc in &report.sccs {
        let detail = match (&scc.result, &scc.error) {
            (Some(r), _) => format!("{} attempt(s)", r.attempts.len()),
            (None, Some(e)) => format!("{:?}: {e}", scc.status),
            (None, None) => format!("{:?}", scc.status),
        };
        let success = scc.result.as_ref().is_some_and(|r| r.success);
        let _ = writeln!(out, "  {} SCC {}: {}  {}", mark(success), scc.id, scc.label, detail);
    }
    out
}
