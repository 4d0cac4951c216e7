//! `compile_commands.json` loading.
//!
//! Each entry names a source file, the directory the compiler ran in, and
//! either an `arguments` array or a shell-quoted `command` string. The
//! compiler executable, `-c`, and `-o <out>` are dropped; the remaining flags
//! are kept for reporting.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use super::ScanError;

#[derive(Debug, Deserialize)]
struct RawEntry {
    directory: Option<PathBuf>,
    file: PathBuf,
    #[serde(default)]
    arguments: Option<Vec<String>>,
    #[serde(default)]
    command: Option<String>,
}

/// One translation unit from the compilation database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileCommand {
    pub directory: PathBuf,
    /// Absolute (directory-joined) source path.
    pub file: PathBuf,
    /// Compiler flags without the executable, `-c` or `-o`.
    pub args: Vec<String>,
}

fn strip_compile_artifacts(args: &[String]) -> Vec<String> {
    let mut cleaned = Vec::with_capacity(args.len());
    let mut skip_next = false;
    for arg in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        match arg.as_str() {
            "-c" => {}
            "-o" => skip_next = true,
            a if a.starts_with("-o") => {}
            _ => cleaned.push(arg.clone()),
        }
    }
    cleaned
}

/// Parse a compilation database from JSON text. `base` resolves entries
/// that omit `directory`.
pub fn parse_compile_commands(json: &str, base: &Path) -> Result<Vec<CompileCommand>, ScanError> {
    let entries: Vec<RawEntry> = serde_json::from_str(json)?;
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for entry in entries {
        let directory = match entry.directory {
            Some(d) if d.is_absolute() => d,
            Some(d) => base.join(d),
            None => base.to_path_buf(),
        };
        let file = if entry.file.is_absolute() {
            entry.file
        } else {
            directory.join(entry.file)
        };

        let argv = match (entry.arguments, entry.command) {
            (Some(args), _) if !args.is_empty() => args,
            (_, Some(command)) => match shlex::split(&command) {
                Some(args) => args,
                None => {
                    warn!(file = %file.display(), "Unparseable compile command; skipping entry");
                    continue;
                }
            },
            _ => {
                warn!(file = %file.display(), "Entry has neither arguments nor command; skipping");
                continue;
            }
        };
        let Some((_compiler, rest)) = argv.split_first() else {
            continue;
        };

        if !seen.insert(file.clone()) {
            continue;
        }
        out.push(CompileCommand {
            directory,
            file,
            args: strip_compile_artifacts(rest),
        });
    }

    Ok(out)
}

/// Load `compile_commands.json` from disk.
pub fn load_compile_commands(path: impl AsRef<Path>) -> Result<Vec<CompileCommand>, ScanError> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).map_err(|source| ScanError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    parse_compile_commands(&json, base)
}
