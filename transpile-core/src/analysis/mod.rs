//! Static pattern detection over C source.
//!
//! A [`Detector`] owns an ordered registry of [`PatternChecker`]s. Each checker
//! looks at the whole translation unit and reports zero or more [`RuleHint`]s
//! for a single [`Category`]. The detector merges the per-checker output,
//! drops duplicates, and reports whether it had to fall back to text matching.
//!
//! ```text
//! source ─► ParsedSource (tree-sitter-c) ─► checker 1 ─┐
//!                  │ (error nodes)           checker 2 ─┼─► dedup ─► AnalysisReport
//!                  └─► regex fallback        checker N ─┘
//! ```

pub mod checkers;
pub mod syntax;

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::resilience::DegradationLevel;

pub use checkers::{
    ArrayChecker, IoChecker, MixedTypeChecker, PointerChecker, StringBufferChecker,
};
pub use syntax::ParsedSource;

/// Closed-but-extensible tag set for translation hazards.
///
/// Built-in checkers map onto the named variants. Callers that register
/// their own checker use [`Category::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    /// Formatted console I/O (`scanf`, `printf`, ...)
    Io,
    /// Raw pointers, manual allocation, pointer arithmetic
    Pointer,
    /// Subscripted access and fixed-size arrays
    Array,
    /// Implicit numeric conversions and C casts
    MixedType,
    /// Unbounded string buffer routines (`strcpy`, `sprintf`, ...)
    StringBuffer,
    /// Category contributed by a caller-registered checker
    Custom(String),
}

impl Category {
    /// Parse a category tag, accepting the spellings used by hand-written corpora.
    pub fn parse(tag: &str) -> Self {
        let normalized: String = tag
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "io" => Self::Io,
            "pointer" | "pointers" => Self::Pointer,
            "array" | "arrays" => Self::Array,
            "mixedtype" | "mixtype" | "mixedtypes" => Self::MixedType,
            "stringbuffer" | "string" | "strings" => Self::StringBuffer,
            _ => Self::Custom(tag.trim().to_string()),
        }
    }

    /// The built-in categories, in registry order.
    pub fn builtin() -> [Category; 5] {
        [
            Self::Io,
            Self::Pointer,
            Self::Array,
            Self::MixedType,
            Self::StringBuffer,
        ]
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io => write!(f, "I/O"),
            Self::Pointer => write!(f, "Pointers"),
            Self::Array => write!(f, "Array"),
            Self::MixedType => write!(f, "Mixtype"),
            Self::StringBuffer => write!(f, "StringBuffer"),
            Self::Custom(name) => write!(f, "{name}"),
        }
    }
}

impl From<String> for Category {
    fn from(tag: String) -> Self {
        Self::parse(&tag)
    }
}

impl From<Category> for String {
    fn from(category: Category) -> Self {
        category.to_string()
    }
}

/// One detected hazard plus the advice for translating it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleHint {
    pub category: Category,
    /// Source text that triggered the hint.
    pub matched_snippet: String,
    /// Target-language idiom to use instead.
    pub suggested_pattern: String,
    pub rationale: String,
}

impl RuleHint {
    pub fn new(
        category: Category,
        matched_snippet: impl Into<String>,
        suggested_pattern: impl Into<String>,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            category,
            matched_snippet: matched_snippet.into(),
            suggested_pattern: suggested_pattern.into(),
            rationale: rationale.into(),
        }
    }
}

/// A single hazard detector.
///
/// Checkers must be pure: the same source always yields the same hints in
/// the same order. They must never panic on malformed input; when
/// [`ParsedSource::syntax`] is `None` they fall back to text matching.
pub trait PatternChecker: Send + Sync {
    /// Category every hint from this checker is tagged with.
    fn category(&self) -> Category;

    /// Inspect the source and return hints in match order.
    fn check(&self, source: &ParsedSource<'_>) -> Vec<RuleHint>;
}

/// Output of one detection pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub hints: Vec<RuleHint>,
    /// `Partial` when the C parser reported errors and checkers used text matching.
    pub degradation: DegradationLevel,
}

impl AnalysisReport {
    /// Distinct categories in first-seen order.
    pub fn categories(&self) -> Vec<Category> {
        let mut seen = HashSet::new();
        self.hints
            .iter()
            .filter(|h| seen.insert(h.category.clone()))
            .map(|h| h.category.clone())
            .collect()
    }

    pub fn is_degraded(&self) -> bool {
        self.degradation != DegradationLevel::Full
    }
}

/// Ordered checker registry.
pub struct Detector {
    checkers: Vec<Box<dyn PatternChecker>>,
}

impl Detector {
    /// An empty registry. Use [`Detector::register`] to add checkers.
    pub fn empty() -> Self {
        Self {
            checkers: Vec::new(),
        }
    }

    /// Registry with the five built-in checkers.
    pub fn new() -> Self {
        Self::empty()
            .register(IoChecker)
            .register(PointerChecker)
            .register(ArrayChecker)
            .register(MixedTypeChecker)
            .register(StringBufferChecker)
    }

    /// Append a checker. Registration order is hint order.
    pub fn register(mut self, checker: impl PatternChecker + 'static) -> Self {
        self.checkers.push(Box::new(checker));
        self
    }

    pub fn categories(&self) -> Vec<Category> {
        self.checkers.iter().map(|c| c.category()).collect()
    }

    /// Run every registered checker over `source`.
    pub fn detect(&self, source: &str) -> AnalysisReport {
        let parsed = ParsedSource::parse(source);
        let degradation = if parsed.syntax().is_some() {
            DegradationLevel::Full
        } else {
            warn!("C parse reported errors; pattern checks fell back to text matching");
            DegradationLevel::Partial
        };

        let mut seen: HashSet<(Category, String)> = HashSet::new();
        let mut hints = Vec::new();
        for checker in &self.checkers {
            for hint in checker.check(&parsed) {
                let key = (hint.category.clone(), hint.matched_snippet.clone());
                if seen.insert(key) {
                    hints.push(hint);
                }
            }
        }

        debug!(hints = hints.len(), degradation = %degradation, "Pattern detection complete");
        AnalysisReport { hints, degradation }
    }
}

impl Default for Detector {
    fn default() -> Self {
        Self::new()
    }
}

/// Render hints as a numbered rule list for prompt embedding.
pub fn format_hints(hints: &[RuleHint]) -> String {
    if hints.is_empty() {
        return "No special translation rules detected.".to_string();
    }

    let mut out = String::from("Translation rules to apply:\n");
    for (i, hint) in hints.iter().enumerate() {
        out.push_str(&format!(
            "{}. [{}] `{}`\n   Use: {}\n   Why: {}\n",
            i + 1,
            hint.category,
            hint.matched_snippet,
            hint.suggested_pattern,
            hint.rationale
        ));
    }
    out
}
