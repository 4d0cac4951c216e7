//! Translator runtime configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags ([`CliOverrides`])
//! 2. Environment variables (`TRANSPILE_*`, `.env` is loaded first)
//! 3. Optional TOML file
//! 4. Built-in defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use transpile_core::feedback::VerifierConfig;
use transpile_core::resilience::RetryPolicy;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
/// Parallel SCC translations in project mode.
const DEFAULT_WORKERS: usize = 4;

const ENV_MODEL: &str = "TRANSPILE_MODEL";
const ENV_API_KEY: &str = "TRANSPILE_API_KEY";
const ENV_API_BASE: &str = "TRANSPILE_API_BASE";
const ENV_TEMPERATURE: &str = "TRANSPILE_TEMPERATURE";
const ENV_MAX_TOKENS: &str = "TRANSPILE_MAX_TOKENS";
const ENV_MAX_ITERATIONS: &str = "TRANSPILE_MAX_ITERATIONS";
const ENV_TOP_K: &str = "TRANSPILE_TOP_K";
const ENV_MODEL_TIMEOUT: &str = "TRANSPILE_MODEL_TIMEOUT_SECS";
const ENV_COMPILER_TIMEOUT: &str = "TRANSPILE_COMPILER_TIMEOUT_SECS";
const ENV_RETRIES: &str = "TRANSPILE_TRANSPORT_RETRIES";
const ENV_RUSTC: &str = "TRANSPILE_RUSTC";
const ENV_WORKERS: &str = "TRANSPILE_WORKERS";
const ENV_CORPUS: &str = "TRANSPILE_CORPUS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("{var}={value:?} is not a valid value")]
    InvalidEnv { var: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Everything a translation run needs to know.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    pub model: String,
    /// Bearer key; local OpenAI-compatible servers usually accept none.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub api_base: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Refinement budget: attempts per request, including the first draft.
    pub max_iterations: u32,
    /// Examples retrieved per request.
    pub top_k: usize,
    pub model_timeout_secs: u64,
    pub compiler_timeout_secs: u64,
    /// Transparent retries per model call.
    pub transport_retries: u32,
    pub retry_backoff_ms: u64,
    pub rustc: PathBuf,
    pub workers: usize,
    /// Extra corpus records appended to the built-in set.
    pub corpus: Option<PathBuf>,
    /// Cancel the whole project run on the first infrastructure failure.
    pub abort_on_fatal: bool,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            temperature: 0.2,
            max_tokens: 2048,
            max_iterations: transpile_core::DEFAULT_MAX_ITERATIONS,
            top_k: transpile_core::DEFAULT_TOP_K,
            model_timeout_secs: 120,
            compiler_timeout_secs: 30,
            transport_retries: 2,
            retry_backoff_ms: 500,
            rustc: PathBuf::from("rustc"),
            workers: DEFAULT_WORKERS,
            corpus: None,
            abort_on_fatal: false,
        }
    }
}

/// Values given on the command line. `None` leaves the lower layers alone.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub max_iterations: Option<u32>,
    pub top_k: Option<usize>,
    pub workers: Option<usize>,
    pub abort_on_fatal: bool,
}

fn parse_env<T: std::str::FromStr>(
    var: &'static str,
    value: Option<String>,
) -> Result<Option<T>, ConfigError> {
    value
        .map(|v| {
            v.trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { var, value: v })
        })
        .transpose()
}

impl TranslatorConfig {
    /// Load `.env`, then the optional TOML file, then `TRANSPILE_*` variables.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let base = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        base.with_env_from(|k| std::env::var(k).ok())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }

    /// Overlay environment values read through `lookup`.
    pub fn with_env_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(v) = lookup(ENV_MODEL) {
            self.model = v;
        }
        if let Some(v) = lookup(ENV_API_KEY).filter(|v| !v.is_empty()) {
            self.api_key = Some(v);
        }
        if let Some(v) = lookup(ENV_API_BASE) {
            self.api_base = v;
        }
        if let Some(v) = lookup(ENV_RUSTC) {
            self.rustc = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_CORPUS) {
            self.corpus = Some(PathBuf::from(v));
        }
        if let Some(v) = parse_env(ENV_TEMPERATURE, lookup(ENV_TEMPERATURE))? {
            self.temperature = v;
        }
        if let Some(v) = parse_env(ENV_MAX_TOKENS, lookup(ENV_MAX_TOKENS))? {
            self.max_tokens = v;
        }
        if let Some(v) = parse_env(ENV_MAX_ITERATIONS, lookup(ENV_MAX_ITERATIONS))? {
            self.max_iterations = v;
        }
        if let Some(v) = parse_env(ENV_TOP_K, lookup(ENV_TOP_K))? {
            self.top_k = v;
        }
        if let Some(v) = parse_env(ENV_MODEL_TIMEOUT, lookup(ENV_MODEL_TIMEOUT))? {
            self.model_timeout_secs = v;
        }
        if let Some(v) = parse_env(ENV_COMPILER_TIMEOUT, lookup(ENV_COMPILER_TIMEOUT))? {
            self.compiler_timeout_secs = v;
        }
        if let Some(v) = parse_env(ENV_RETRIES, lookup(ENV_RETRIES))? {
            self.transport_retries = v;
        }
        if let Some(v) = parse_env(ENV_WORKERS, lookup(ENV_WORKERS))? {
            self.workers = v;
        }
        Ok(self)
    }

    pub fn with_overrides(mut self, cli: &CliOverrides) -> Self {
        if let Some(v) = cli.max_iterations {
            self.max_iterations = v;
        }
        if let Some(v) = cli.top_k {
            self.top_k = v;
        }
        if let Some(v) = cli.workers {
            self.workers = v;
        }
        self.abort_on_fatal |= cli.abort_on_fatal;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::Invalid("max_iterations must be at least 1".into()));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid("model must not be empty".into()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Invalid(format!(
                "temperature {} outside [0, 2]",
                self.temperature
            )));
        }
        if self.top_k == 0 {
            return Err(ConfigError::Invalid("top_k must be at least 1".into()));
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        Ok(())
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.transport_retries,
            backoff_ms: self.retry_backoff_ms,
        }
    }

    pub fn verifier_config(&self) -> VerifierConfig {
        VerifierConfig {
            rustc: self.rustc.clone(),
            timeout_secs: self.compiler_timeout_secs,
            ..VerifierConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = TranslatorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.top_k, 3);
        assert_eq!(config.retry_policy().total_attempts(), 3);
    }

    #[test]
    fn test_precedence_file_env_cli() {
        let file: TranslatorConfig = toml::from_str(
            r#"
model = "from-file"
top_k = 5
max_iterations = 4
"#,
        )
        .unwrap();
        assert_eq!(file.temperature, 0.2);

        let merged = file
            .with_env_from(env(&[
                ("TRANSPILE_MODEL", "from-env"),
                ("TRANSPILE_MAX_ITERATIONS", "6"),
            ]))
            .unwrap()
            .with_overrides(&CliOverrides {
                max_iterations: Some(2),
                ..Default::default()
            });

        assert_eq!(merged.model, "from-env");
        assert_eq!(merged.top_k, 5);
        assert_eq!(merged.max_iterations, 2);
    }

    #[test]
    fn test_bad_env_value() {
        let err = TranslatorConfig::default()
            .with_env_from(env(&[("TRANSPILE_WORKERS", "many")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv {
                var: "TRANSPILE_WORKERS",
                ..
            }
        ));
    }

    #[test]
    fn test_validation() {
        let bad = |f: fn(&mut TranslatorConfig)| {
            let mut c = TranslatorConfig::default();
            f(&mut c);
            c.validate().is_err()
        };
        assert!(bad(|c| c.max_iterations = 0));
        assert!(bad(|c| c.model = " ".into()));
        assert!(bad(|c| c.temperature = 2.5));
        assert!(bad(|c| c.top_k = 0));
        assert!(bad(|c| c.workers = 0));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            TranslatorConfig::from_file(Path::new("/nonexistent/transpile.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
