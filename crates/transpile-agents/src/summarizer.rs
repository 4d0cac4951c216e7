//! Structural summary of a C unit via one model call, with best-effort
//! repair of replies that are not the requested JSON.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use transpile_core::resilience::DegradationLevel;

use crate::errors::PipelineError;
use crate::model::RetryingModel;
use crate::prompts::summarize_request;

static LABELLED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^[\s>*-]*\**(parameters|arguments|inputs|returns?|return_type|outputs|functionality|function|functional_description|description)\**\s*:\s*(.+?)\s*$",
    )
    .unwrap()
});

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSummary {
    #[serde(default, alias = "arguments")]
    pub parameters: String,
    #[serde(default, alias = "outputs", alias = "returns")]
    pub return_type: String,
    #[serde(default, alias = "function", alias = "description")]
    pub functional_description: String,
}

impl CodeSummary {
    /// Prompt rendering.
    pub fn format(&self) -> String {
        format!(
            "Code Summary:\n- Parameters: {}\n- Returns: {}\n- Functionality: {}",
            self.parameters, self.return_type, self.functional_description
        )
    }

    fn is_empty(&self) -> bool {
        self.parameters.is_empty()
            && self.return_type.is_empty()
            && self.functional_description.is_empty()
    }
}

/// Flatten non-string JSON values (arrays of parameters, objects) to text.
fn json_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Null => String::new(),
        serde_json::Value::Array(items) => items
            .iter()
            .map(json_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

fn from_json(reply: &str) -> Option<CodeSummary> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end <= start {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(&reply[start..=end]).ok()?;
    let object = value.as_object()?;
    let field = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| object.get(*k))
            .map(json_text)
            .unwrap_or_default()
    };
    let summary = CodeSummary {
        parameters: field(&["parameters", "arguments"]),
        return_type: field(&["return_type", "returns", "outputs"]),
        functional_description: field(&["functional_description", "function", "description"]),
    };
    (!summary.is_empty()).then_some(summary)
}

fn from_labelled_lines(reply: &str) -> Option<CodeSummary> {
    let mut summary = CodeSummary::default();
    for caps in LABELLED_RE.captures_iter(reply) {
        let value = caps[2].trim().to_string();
        let slot = match caps[1].to_ascii_lowercase().as_str() {
            "parameters" | "arguments" | "inputs" => &mut summary.parameters,
            "return" | "returns" | "return_type" | "outputs" => &mut summary.return_type,
            _ => &mut summary.functional_description,
        };
        if slot.is_empty() {
            *slot = value;
        }
    }
    (!summary.is_empty()).then_some(summary)
}

/// JSON object anywhere in the reply, then labelled lines, then defaults
/// with the raw reply as the description.
pub fn parse_summary(reply: &str) -> (CodeSummary, DegradationLevel) {
    if let Some(summary) = from_json(reply) {
        return (summary, DegradationLevel::Full);
    }
    if let Some(summary) = from_labelled_lines(reply) {
        return (summary, DegradationLevel::Partial);
    }
    let summary = CodeSummary {
        functional_description: reply.trim().to_string(),
        ..Default::default()
    };
    (summary, DegradationLevel::Unavailable)
}

pub struct Summarizer {
    model: RetryingModel,
}

impl Summarizer {
    pub fn new(model: RetryingModel) -> Self {
        Self { model }
    }

    pub async fn summarize(
        &self,
        source: &str,
        declaration_context: Option<&str>,
    ) -> Result<CodeSummary, PipelineError> {
        let reply = self
            .model
            .call(&summarize_request(source, declaration_context))
            .await?;
        let (summary, level) = parse_summary(&reply);
        if level == DegradationLevel::Full {
            debug!("Summary parsed");
        } else {
            warn!(level = %level, "Summary reply was not JSON; repaired");
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_with_surrounding_prose() {
        let reply = r#"Sure! Here it is:
```json
{"parameters": ["a: int", "b: int"], "return_type": "int", "functional_description": "Adds two numbers"}
```"#;
        let (summary, level) = parse_summary(reply);
        assert_eq!(level, DegradationLevel::Full);
        assert_eq!(summary.parameters, "a: int, b: int");
        assert_eq!(summary.return_type, "int");
        assert_eq!(summary.functional_description, "Adds two numbers");
    }

    #[test]
    fn test_alternate_json_keys() {
        let (summary, level) =
            parse_summary(r#"{"arguments": "none", "outputs": "exit code", "function": "entry"}"#);
        assert_eq!(level, DegradationLevel::Full);
        assert_eq!(summary.return_type, "exit code");
    }

    #[test]
    fn test_labelled_lines() {
        let reply = "The code:\n- **Parameters**: two integers\nReturns: nothing\nFunctionality: prints the sum\n";
        let (summary, level) = parse_summary(reply);
        assert_eq!(level, DegradationLevel::Partial);
        assert_eq!(summary.parameters, "two integers");
        assert_eq!(summary.return_type, "nothing");
        assert_eq!(summary.functional_description, "prints the sum");
    }

    #[test]
    fn test_free_text_falls_back() {
        let (summary, level) = parse_summary("  It reads numbers and prints them.  ");
        assert_eq!(level, DegradationLevel::Unavailable);
        assert!(summary.parameters.is_empty());
        assert_eq!(summary.functional_description, "It reads numbers and prints them.");
    }

    #[test]
    fn test_format() {
        let summary = CodeSummary {
            parameters: "none".into(),
            return_type: "int".into(),
            functional_description: "entry point".into(),
        };
        assert_eq!(
            summary.format(),
            "Code Summary:\n- Parameters: none\n- Returns: int\n- Functionality: entry point"
        );
    }
}
