//! Okapi BM25 over an in-memory inverted index.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// BM25 tuning parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Config {
    /// Term frequency saturation
    pub k1: f64,
    /// Document length normalization
    pub b: f64,
}

impl Default for Bm25Config {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

/// Lowercase, split on anything that is not alphanumeric or `_`, drop
/// single-character tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|s| s.len() > 1)
        .map(String::from)
        .collect()
}

/// Term -> (doc -> term frequency), plus document lengths.
///
/// Documents are identified by their insertion index.
#[derive(Debug, Default, Clone)]
pub struct InvertedIndex {
    postings: HashMap<String, HashMap<usize, usize>>,
    doc_lengths: Vec<usize>,
    total_length: usize,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index `text` as the next document. Returns its id.
    pub fn add(&mut self, text: &str) -> usize {
        let id = self.doc_lengths.len();
        let tokens = tokenize(text);
        for token in &tokens {
            *self
                .postings
                .entry(token.clone())
                .or_default()
                .entry(id)
                .or_insert(0) += 1;
        }
        self.total_length += tokens.len();
        self.doc_lengths.push(tokens.len());
        id
    }

    pub fn len(&self) -> usize {
        self.doc_lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_lengths.is_empty()
    }

    fn avg_doc_length(&self) -> f64 {
        if self.doc_lengths.is_empty() {
            0.0
        } else {
            self.total_length as f64 / self.doc_lengths.len() as f64
        }
    }

    /// BM25 score of every document against `query`. Documents that share
    /// no term with the query score 0.0.
    pub fn score_all(&self, query: &str, config: Bm25Config) -> Vec<f64> {
        let mut scores = vec![0.0; self.len()];
        let n = self.len() as f64;
        let avg = self.avg_doc_length().max(1.0);

        let mut terms = tokenize(query);
        terms.sort();
        terms.dedup();

        for term in &terms {
            let Some(postings) = self.postings.get(term) else {
                continue;
            };
            let df = postings.len() as f64;
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();

            for (&doc, &tf) in postings {
                let tf = tf as f64;
                let doc_len = self.doc_lengths[doc] as f64;
                let tf_norm = (tf * (config.k1 + 1.0))
                    / (tf + config.k1 * (1.0 - config.b + config.b * doc_len / avg));
                scores[doc] += idf * tf_norm;
            }
        }

        scores
    }
}
