//! rustc wrapper for checking candidate translations
//!
//! Each call writes the candidate into its own temporary directory, runs
//! `rustc --emit=metadata` (type-check only: no codegen, no linking, nothing
//! executed) with JSON diagnostics, and removes the directory on every exit
//! path when the [`tempfile::TempDir`] guard drops.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::candidate::has_main;
use super::error_parser::{parse_diagnostics, Diagnostic, Severity};

const CANDIDATE_FILE: &str = "candidate.rs";

/// Infrastructure failures. These are never refinement iterations.
#[derive(Debug, Error)]
pub enum VerifierError {
    #[error("rust toolchain unavailable ({program}): {reason}")]
    ToolchainUnavailable { program: String, reason: String },

    #[error("compiler timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("verifier scratch space: {0}")]
    Scratch(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrateType {
    Lib,
    Bin,
}

impl CrateType {
    /// `bin` when the candidate defines `fn main`, `lib` otherwise.
    pub fn for_candidate(code: &str) -> Self {
        if has_main(code) {
            Self::Bin
        } else {
            Self::Lib
        }
    }

    fn as_arg(self) -> &'static str {
        match self {
            Self::Lib => "lib",
            Self::Bin => "bin",
        }
    }
}

/// Outcome of one compiler run over one candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verification {
    pub compiled: bool,
    /// Error diagnostics, in compiler order. Empty iff `compiled`.
    pub diagnostics: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub exit_code: Option<i32>,
    pub crate_type: CrateType,
    pub duration_ms: u64,
}

impl Verification {
    /// Build from raw compiler output. A failed exit with nothing parseable
    /// still yields one synthetic error so callers always have feedback.
    pub fn from_output(
        success: bool,
        exit_code: Option<i32>,
        stderr: &str,
        crate_type: CrateType,
    ) -> Self {
        let (mut diagnostics, warnings): (Vec<Diagnostic>, Vec<Diagnostic>) =
            parse_diagnostics(stderr)
                .into_iter()
                .partition(|d| d.severity == Severity::Error);

        if success {
            diagnostics.clear();
        } else if diagnostics.is_empty() {
            let lines: Vec<&str> = stderr.lines().collect();
            let tail = lines[lines.len().saturating_sub(20)..].join("\n");
            let message = match exit_code {
                Some(code) if tail.trim().is_empty() => format!("rustc exited with status {code}"),
                None if tail.trim().is_empty() => "rustc terminated by signal".to_string(),
                _ => tail,
            };
            diagnostics.push(Diagnostic::error(message));
        }

        Self {
            compiled: success,
            diagnostics,
            warnings,
            exit_code,
            crate_type,
            duration_ms: 0,
        }
    }
}

/// Anything that can judge a candidate. The pipeline only sees this trait.
#[async_trait]
pub trait CandidateVerifier: Send + Sync {
    async fn verify(&self, candidate: &str) -> Result<Verification, VerifierError>;
}

/// Configuration for [`RustcVerifier`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Path or name of the rustc binary
    pub rustc: PathBuf,
    pub edition: String,
    pub timeout_secs: u64,
    /// Extra flags appended after the fixed ones
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            rustc: PathBuf::from("rustc"),
            edition: "2021".to_string(),
            timeout_secs: 30,
            extra_args: Vec::new(),
        }
    }
}

/// Runs the system rustc as a subprocess.
pub struct RustcVerifier {
    config: VerifierConfig,
}

impl RustcVerifier {
    pub fn new(config: VerifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    fn program(&self) -> String {
        self.config.rustc.display().to_string()
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    /// Check that the compiler can be started. Returns its version line.
    pub async fn probe(&self) -> Result<String, VerifierError> {
        let mut cmd = tokio::process::Command::new(&self.config.rustc);
        cmd.arg("--version");
        let output = self.run_with_timeout(&mut cmd).await?;
        if !output.status.success() {
            return Err(VerifierError::ToolchainUnavailable {
                program: self.program(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn run_with_timeout(
        &self,
        cmd: &mut tokio::process::Command,
    ) -> Result<std::process::Output, VerifierError> {
        cmd.kill_on_drop(true);

        // Own process group so a timeout kill also reaches anything rustc spawned.
        #[cfg(unix)]
        cmd.process_group(0);

        match tokio::time::timeout(self.timeout(), cmd.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(VerifierError::ToolchainUnavailable {
                program: self.program(),
                reason: e.to_string(),
            }),
            Err(_) => Err(VerifierError::Timeout(self.timeout())),
        }
    }
}

#[async_trait]
impl CandidateVerifier for RustcVerifier {
    async fn verify(&self, candidate: &str) -> Result<Verification, VerifierError> {
        let start = Instant::now();
        let scratch = tempfile::Builder::new().prefix("transpile-verify-").tempdir()?;
        let source = scratch.path().join(CANDIDATE_FILE);
        tokio::fs::write(&source, candidate).await?;

        let crate_type = CrateType::for_candidate(candidate);
        let mut cmd = tokio::process::Command::new(&self.config.rustc);
        cmd.arg("--edition")
            .arg(&self.config.edition)
            .arg("--crate-type")
            .arg(crate_type.as_arg())
            .arg("--crate-name")
            .arg("candidate")
            .arg("--emit=metadata")
            .arg("--error-format=json")
            .arg("--out-dir")
            .arg(scratch.path())
            .args(&self.config.extra_args)
            .arg(&source)
            .current_dir(scratch.path());

        let output = self.run_with_timeout(&mut cmd).await.inspect_err(|e| {
            warn!(error = %e, "Compiler invocation failed");
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut verification = Verification::from_output(
            output.status.success(),
            output.status.code(),
            &stderr,
            crate_type,
        );
        verification.duration_ms = start.elapsed().as_millis() as u64;

        debug!(
            compiled = verification.compiled,
            errors = verification.diagnostics.len(),
            warnings = verification.warnings.len(),
            crate_type = crate_type.as_arg(),
            elapsed_ms = verification.duration_ms,
            "Candidate verified"
        );

        // scratch dropped here
        Ok(verification)
    }
}
