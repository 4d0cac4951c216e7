//! Multi-file C project scanning.
//!
//! Turns a compilation database or a source directory into translation
//! [`Unit`]s (top-level definitions) plus the [`DependencyGraph`] between them.

pub mod manifest;
pub mod scanner;

use std::path::PathBuf;

use thiserror::Error;

pub use manifest::{load_compile_commands, parse_compile_commands, CompileCommand};
pub use scanner::{ProjectScan, ProjectScanner, SourceLocation, Unit, UnitKind};

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed compilation database: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("directory walk failed: {0}")]
    Walk(#[from] ignore::Error),

    #[error("no C sources found")]
    NoSources,
}
