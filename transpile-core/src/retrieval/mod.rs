//! Example corpus and category-filtered BM25 retrieval.
//!
//! The corpus is loaded once, indexed once, and then shared read-only
//! (`Arc<ExampleIndex>`) by every translation request.

pub mod bm25;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::analysis::Category;
pub use bm25::{tokenize, Bm25Config, InvertedIndex};

/// Number of examples returned when the caller does not say otherwise.
pub const DEFAULT_TOP_K: usize = 3;

static BUILTIN_CORPUS: &str = include_str!("../../corpus/examples.json");

/// A precedent translation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    #[serde(alias = "c_code")]
    pub source_snippet: String,
    #[serde(alias = "rust_code")]
    pub target_snippet: String,
    #[serde(default)]
    pub categories: BTreeSet<Category>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("failed to read corpus {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed corpus: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("corpus contains no examples")]
    Empty,
}

/// Ordered collection of examples. Order is the tie-break order for retrieval.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    examples: Vec<Example>,
}

impl Corpus {
    /// The corpus compiled into the crate.
    pub fn builtin() -> Result<Self, CorpusError> {
        Self::from_json(BUILTIN_CORPUS)
    }

    pub fn from_json(json: &str) -> Result<Self, CorpusError> {
        let examples: Vec<Example> = serde_json::from_str(json)?;
        if examples.is_empty() {
            return Err(CorpusError::Empty);
        }
        Ok(Self { examples })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CorpusError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| CorpusError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let corpus = Self::from_json(&json)?;
        info!(path = %path.display(), examples = corpus.len(), "Loaded example corpus");
        Ok(corpus)
    }

    /// Append records after the existing ones. Existing records are never touched.
    pub fn extend(&mut self, more: impl IntoIterator<Item = Example>) {
        self.examples.extend(more);
    }

    pub fn examples(&self) -> &[Example] {
        &self.examples
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }
}

/// One ranked example within a [`RetrievalResult`].
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedExample {
    pub example: Arc<Example>,
    pub score: f64,
    /// 1-based
    pub rank: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievalResult {
    pub hits: Vec<RetrievedExample>,
    /// True when no example matched the query categories and the full corpus was searched.
    pub fell_back: bool,
}

impl RetrievalResult {
    pub fn examples(&self) -> impl Iterator<Item = &Example> {
        self.hits.iter().map(|h| h.example.as_ref())
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// Immutable retrieval index over a [`Corpus`].
#[derive(Debug)]
pub struct ExampleIndex {
    examples: Vec<Arc<Example>>,
    index: InvertedIndex,
    config: Bm25Config,
}

impl ExampleIndex {
    pub fn build(corpus: Corpus) -> Self {
        Self::with_config(corpus, Bm25Config::default())
    }

    pub fn with_config(corpus: Corpus, config: Bm25Config) -> Self {
        let mut index = InvertedIndex::new();
        let examples: Vec<Arc<Example>> = corpus
            .examples
            .into_iter()
            .map(|ex| {
                index.add(&ex.source_snippet);
                Arc::new(ex)
            })
            .collect();
        debug!(examples = examples.len(), "Built example index");
        Self {
            examples,
            index,
            config,
        }
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Top `k` examples for `source` among those tagged with any of `categories`.
    ///
    /// When no example carries a query category (or `categories` is empty) the
    /// whole corpus is ranked instead. A non-empty filtered set smaller than
    /// `k` is returned as is.
    pub fn retrieve(&self, source: &str, categories: &[Category], k: usize) -> RetrievalResult {
        let filtered: Vec<usize> = self
            .examples
            .iter()
            .enumerate()
            .filter(|(_, ex)| categories.iter().any(|c| ex.categories.contains(c)))
            .map(|(i, _)| i)
            .collect();

        let fell_back = filtered.is_empty();
        let candidates = if fell_back {
            if !self.examples.is_empty() {
                warn!(
                    categories = ?categories,
                    "No example matches the query categories; ranking the full corpus"
                );
            }
            (0..self.examples.len()).collect()
        } else {
            filtered
        };

        let scores = self.index.score_all(source, self.config);
        let mut ranked: Vec<(usize, f64)> = candidates.into_iter().map(|i| (i, scores[i])).collect();
        // stable: equal scores keep corpus order
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        let hits = ranked
            .into_iter()
            .take(k)
            .enumerate()
            .map(|(rank, (i, score))| RetrievedExample {
                example: Arc::clone(&self.examples[i]),
                score,
                rank: rank + 1,
            })
            .collect();

        RetrievalResult { hits, fell_back }
    }
}

/// Render retrieved examples for prompt embedding.
pub fn format_examples<'a>(examples: impl IntoIterator<Item = &'a Example>) -> String {
    let mut out = String::new();
    for (i, ex) in examples.into_iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&format!(
            "Example {}: {}\nC code:\n```c\n{}\n```\nRust code:\n```rust\n{}\n```\n",
            i + 1,
            ex.description,
            ex.source_snippet.trim(),
            ex.target_snippet.trim()
        ));
    }
    if out.is_empty() {
        out.push_str("No examples available.");
    }
    out
}
