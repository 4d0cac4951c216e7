//! rustc diagnostic parsing and classification
//!
//! Turns `--error-format=json` output (or plain text, when JSON is missing)
//! into structured [`Diagnostic`]s, filters rustc-internal noise, and tags
//! each diagnostic with an [`ErrorCategory`] that selects focused advice for
//! the refinement prompt.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static BORROW_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(borrow|cannot move|already borrowed|use of moved value)").unwrap()
});

static LIFETIME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(lifetime|does not live long enough|outlive|borrowed value)").unwrap()
});

static TYPE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(mismatched types|expected .*, found|cannot add|cannot multiply|no implementation for)").unwrap());

static TRAIT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(trait bound|does not implement|is not satisfied|no method named)").unwrap());

static IMPORT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(unresolved|cannot find|not found in|use of undeclared|failed to resolve)").unwrap()
});

static SYNTAX_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(expected one of|unexpected token|unclosed delimiter|expected item)").unwrap());

static UNSAFE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(unsafe|raw pointer|dereference of raw)").unwrap());

static TEXT_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(error|warning)(?:\[(E\d{4})\])?: (.+)$").unwrap()
});

static TEXT_LOCATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*--> (.+?):(\d+):(\d+)\s*$").unwrap());

/// rustc output that describes the compiler's environment rather than the candidate.
static NOISE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(couldn't create a temp dir|Operation not permitted.*/dev/|aborting due to|for more information about this error|some errors have detailed explanations)",
    )
    .unwrap()
});

/// Error categories used to pick refinement advice
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// E0308 and friends
    TypeMismatch,
    /// E0382, E0499, E0502, ...
    BorrowChecker,
    /// E0106, E0597, ...
    Lifetime,
    /// E0277, E0599
    TraitBound,
    /// E0425, E0432, E0433, E0412
    ImportResolution,
    /// Parser errors
    Syntax,
    /// E0133: unsafe operations outside an unsafe block
    Unsafe,
    Other,
}

impl ErrorCategory {
    /// Translation-specific advice appended to the refine prompt.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::TypeMismatch => {
                "Convert numeric types explicitly with `as` or From; C's implicit promotions do not exist in Rust."
            }
            Self::BorrowChecker => {
                "Avoid aliasing mutable state: clone small values, split borrows, or restructure loops to index instead of holding references."
            }
            Self::Lifetime => {
                "Return owned values (String, Vec<T>) instead of references to locals."
            }
            Self::TraitBound => {
                "Check the method exists on the type; add derives (Clone, Copy, Debug, PartialEq) where needed."
            }
            Self::ImportResolution => {
                "Use only the standard library and define every helper the code calls; C library functions have no Rust equivalent by name."
            }
            Self::Syntax => "Emit a complete Rust program with balanced delimiters and no prose.",
            Self::Unsafe => "Replace raw pointers with references, slices, Vec or Box instead of adding unsafe.",
            Self::Other => "Read the compiler message carefully and change only what it points at.",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TypeMismatch => write!(f, "type_mismatch"),
            Self::BorrowChecker => write!(f, "borrow_checker"),
            Self::Lifetime => write!(f, "lifetime"),
            Self::TraitBound => write!(f, "trait_bound"),
            Self::ImportResolution => write!(f, "import"),
            Self::Syntax => write!(f, "syntax"),
            Self::Unsafe => write!(f, "unsafe"),
            Self::Other => write!(f, "other"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

/// One compiler finding about a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// Error code, e.g. "E0308"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    pub category: ErrorCategory,
    /// rustc's human-readable rendering, when available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered: Option<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        let category = classify(&message, None);
        Self {
            severity: Severity::Error,
            message,
            code: None,
            location: None,
            category,
            rendered: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Compact one-block form for prompts and logs.
    pub fn format(&self) -> String {
        if let Some(rendered) = &self.rendered {
            return rendered.trim_end().to_string();
        }
        let mut out = match &self.code {
            Some(code) => format!("{}[{}]: {}", self.severity, code, self.message),
            None => format!("{}: {}", self.severity, self.message),
        };
        if let Some(loc) = &self.location {
            out.push_str(&format!("\n  --> {}:{}:{}", loc.file, loc.line, loc.column));
        }
        out
    }
}

// rustc --error-format=json wire shapes

#[derive(Debug, Deserialize)]
struct RustcDiagnostic {
    message: String,
    code: Option<RustcCode>,
    level: String,
    #[serde(default)]
    spans: Vec<RustcSpan>,
    rendered: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RustcCode {
    code: String,
}

#[derive(Debug, Deserialize)]
struct RustcSpan {
    file_name: String,
    line_start: usize,
    column_start: usize,
    is_primary: bool,
    label: Option<String>,
}

impl RustcDiagnostic {
    fn into_diagnostic(self) -> Option<Diagnostic> {
        let severity = match self.level.as_str() {
            "error" | "error: internal compiler error" => Severity::Error,
            "warning" => Severity::Warning,
            _ => return None,
        };
        if NOISE.is_match(&self.message) {
            return None;
        }

        let primary = self.spans.iter().find(|s| s.is_primary).or(self.spans.first());
        let location = primary.map(|s| Location {
            file: s.file_name.clone(),
            line: s.line_start,
            column: s.column_start,
        });
        let labels: Vec<&str> = self.spans.iter().filter_map(|s| s.label.as_deref()).collect();
        let code = self.code.map(|c| c.code);
        let category = classify(
            &format!("{} {}", self.message, labels.join(" ")),
            code.as_deref(),
        );

        Some(Diagnostic {
            severity,
            message: self.message,
            code,
            location,
            category,
            rendered: self.rendered,
        })
    }
}

/// Classify by error code first, then by message text.
pub fn classify(text: &str, code: Option<&str>) -> ErrorCategory {
    if let Some(code) = code {
        match code {
            "E0308" | "E0369" | "E0277" if TYPE_PATTERN.is_match(text) => {
                return ErrorCategory::TypeMismatch
            }
            "E0308" | "E0604" | "E0606" | "E0610" => return ErrorCategory::TypeMismatch,
            "E0382" | "E0499" | "E0502" | "E0503" | "E0505" | "E0506" | "E0507" | "E0596" => {
                return ErrorCategory::BorrowChecker
            }
            "E0106" | "E0597" | "E0621" | "E0700" | "E0515" | "E0716" => {
                return ErrorCategory::Lifetime
            }
            "E0277" | "E0599" => return ErrorCategory::TraitBound,
            "E0425" | "E0432" | "E0433" | "E0412" | "E0423" => {
                return ErrorCategory::ImportResolution
            }
            "E0133" => return ErrorCategory::Unsafe,
            _ => {}
        }
    }

    if SYNTAX_PATTERN.is_match(text) {
        return ErrorCategory::Syntax;
    }
    if LIFETIME_PATTERN.is_match(text) {
        return ErrorCategory::Lifetime;
    }
    if BORROW_PATTERN.is_match(text) {
        return ErrorCategory::BorrowChecker;
    }
    if TYPE_PATTERN.is_match(text) {
        return ErrorCategory::TypeMismatch;
    }
    if TRAIT_PATTERN.is_match(text) {
        return ErrorCategory::TraitBound;
    }
    if IMPORT_PATTERN.is_match(text) {
        return ErrorCategory::ImportResolution;
    }
    if UNSAFE_PATTERN.is_match(text) {
        return ErrorCategory::Unsafe;
    }
    ErrorCategory::Other
}

/// Parse rustc stderr. JSON lines are preferred; if none parse, fall back to
/// the human-readable format.
pub fn parse_diagnostics(stderr: &str) -> Vec<Diagnostic> {
    let mut saw_json = false;
    let mut out = Vec::new();
    for line in stderr.lines() {
        let line = line.trim();
        if !line.starts_with('{') {
            continue;
        }
        if let Ok(raw) = serde_json::from_str::<RustcDiagnostic>(line) {
            saw_json = true;
            out.extend(raw.into_diagnostic());
        }
    }
    if saw_json {
        return out;
    }
    parse_text_diagnostics(stderr)
}

/// Best-effort parse of `error[E0308]: ...` / `--> file:line:col` blocks.
pub fn parse_text_diagnostics(stderr: &str) -> Vec<Diagnostic> {
    let mut out: Vec<Diagnostic> = Vec::new();
    let mut block = String::new();

    for line in stderr.lines() {
        if let Some(caps) = TEXT_HEADER.captures(line) {
            if let Some(last) = out.last_mut() {
                last.rendered = Some(std::mem::take(&mut block));
            }
            block.clear();
            let message = caps.get(3).map_or("", |m| m.as_str()).trim().to_string();
            if NOISE.is_match(&message) {
                continue;
            }
            let severity = if &caps[1] == "error" {
                Severity::Error
            } else {
                Severity::Warning
            };
            let code = caps.get(2).map(|m| m.as_str().to_string());
            let category = classify(&message, code.as_deref());
            out.push(Diagnostic {
                severity,
                message,
                code,
                location: None,
                category,
                rendered: None,
            });
            block.push_str(line);
            block.push('\n');
            continue;
        }

        if NOISE.is_match(line) {
            continue;
        }
        if let Some(last) = out.last_mut() {
            if last.location.is_none() {
                if let Some(caps) = TEXT_LOCATION.captures(line) {
                    last.location = Some(Location {
                        file: caps[1].to_string(),
                        line: caps[2].parse().unwrap_or(0),
                        column: caps[3].parse().unwrap_or(0),
                    });
                }
            }
            if !block.is_empty() {
                block.push_str(line);
                block.push('\n');
            }
        }
    }
    if let Some(last) = out.last_mut() {
        if !block.is_empty() {
            last.rendered = Some(block);
        }
    }
    out
}

/// Errors first, rendered for the refinement prompt, each followed by
/// category advice (deduplicated).
pub fn format_for_prompt(diagnostics: &[Diagnostic]) -> String {
    let errors: Vec<&Diagnostic> = diagnostics.iter().filter(|d| d.is_error()).collect();
    let shown: Vec<&Diagnostic> = if errors.is_empty() {
        diagnostics.iter().collect()
    } else {
        errors
    };
    if shown.is_empty() {
        return "No diagnostics.".to_string();
    }

    let mut out = String::new();
    for (i, diag) in shown.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, diag.format()));
    }

    let mut seen = Vec::new();
    for diag in &shown {
        if !seen.contains(&diag.category) {
            seen.push(diag.category);
        }
    }
    out.push_str("\nAdvice:\n");
    for category in seen {
        out.push_str(&format!("- [{}] {}\n", category, category.advice()));
    }
    out
}

/// Counts by severity and category.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosticSummary {
    pub errors: usize,
    pub warnings: usize,
    pub by_category: BTreeMap<ErrorCategory, usize>,
}

impl DiagnosticSummary {
    pub fn of(diagnostics: &[Diagnostic]) -> Self {
        let mut summary = Self::default();
        for diag in diagnostics {
            match diag.severity {
                Severity::Error => summary.errors += 1,
                Severity::Warning => summary.warnings += 1,
            }
            *summary.by_category.entry(diag.category).or_insert(0) += 1;
        }
        summary
    }
}
