//! Extracting compilable Rust from raw model output.
//!
//! Models wrap code in markdown fences, prepend explanations, or answer with
//! prose or a Cargo manifest instead of code. [`extract_candidate`] returns the
//! code or a [`MalformedOutput`] describing why nothing usable was found.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[ \t]*(?:rust|rs)?[ \t]*\r?\n(.*?)\r?\n[ \t]*```").unwrap());

static RUST_ITEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:fn\s+\w+|use\s+\w+|let\s+\w+|struct\s+\w+|impl\b|enum\s+\w+|pub\s+fn|mut\s+\w+)")
        .unwrap()
});

static MAIN_FN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?fn\s+main\s*\(").unwrap());

/// Comments, string literals and char literals, leftmost first so `"//"`
/// inside a string is not taken for a comment.
static NON_CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)//[^\n]*|/\*.*?\*/|"(?:[^"\\]|\\.)*"|'(?:[^'\\\n]|\\.)'"#).unwrap()
});

/// Why a model reply was rejected before compilation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedOutput {
    #[error("model returned an empty response")]
    Empty,

    #[error("model output reads as prose, not Rust code")]
    Prose,

    #[error("model output is a Cargo manifest, not Rust code")]
    Manifest,
}

/// Content of the first fenced block, or the trimmed text when there is none.
pub fn strip_markdown_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    FENCE_RE
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or(trimmed)
}

/// Heuristic check that `code` is Rust source rather than prose or config.
pub fn looks_like_rust(code: &str) -> Result<(), MalformedOutput> {
    if code.trim().is_empty() {
        return Err(MalformedOutput::Empty);
    }
    if code.contains("[package]") || code.contains("[[bin]]") {
        return Err(MalformedOutput::Manifest);
    }
    if RUST_ITEM_RE.is_match(code) {
        return Ok(());
    }

    let lines: Vec<&str> = code.lines().filter(|l| !l.trim().is_empty()).collect();
    let prose = lines
        .iter()
        .filter(|l| {
            let l = l.trim();
            !l.starts_with("//") && l.chars().next().is_some_and(char::is_uppercase)
        })
        .count();
    if !lines.is_empty() && prose * 2 > lines.len() {
        return Err(MalformedOutput::Prose);
    }
    Ok(())
}

/// Pull the candidate program out of a model reply.
pub fn extract_candidate(raw: &str) -> Result<String, MalformedOutput> {
    let code = strip_markdown_fences(raw);
    looks_like_rust(code)?;
    Ok(code.to_string())
}

/// Whether the candidate defines `fn main`, i.e. should be checked as a binary.
pub fn has_main(code: &str) -> bool {
    let code = NON_CODE_RE.replace_all(code, |caps: &regex::Captures<'_>| {
        // keep line structure so `^` anchors still line up
        "\n".repeat(caps[0].matches('\n').count())
    });
    MAIN_FN_RE.is_match(&code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fences_with_surrounding_text() {
        let raw = "Here is the translation:\n```rust\nfn main() {\n    println!(\"hi\");\n}\n```\nHope this helps.";
        assert_eq!(
            strip_markdown_fences(raw),
            "fn main() {\n    println!(\"hi\");\n}"
        );
    }

    #[test]
    fn test_strip_bare_fence() {
        assert_eq!(strip_markdown_fences("```\nlet x = 1;\n```"), "let x = 1;");
    }

    #[test]
    fn test_unfenced_passthrough() {
        assert_eq!(strip_markdown_fences("  fn f() {}  "), "fn f() {}");
    }

    #[test]
    fn test_rejects_prose() {
        let raw = "I cannot translate this.\nThe code uses undefined behavior.\nPlease clarify.";
        assert_eq!(extract_candidate(raw), Err(MalformedOutput::Prose));
    }

    #[test]
    fn test_rejects_manifest_and_empty() {
        assert_eq!(
            extract_candidate("```toml\n[package]\nname = \"x\"\n```"),
            Err(MalformedOutput::Manifest)
        );
        assert_eq!(extract_candidate("   \n"), Err(MalformedOutput::Empty));
    }

    #[test]
    fn test_accepts_code() {
        let code = extract_candidate("```rust\npub fn add(a: i32, b: i32) -> i32 { a + b }\n```").unwrap();
        assert!(code.starts_with("pub fn add"));
        assert!(!has_main(&code));
        assert!(has_main("fn main () {}"));
    }

    #[test]
    fn test_main_in_comments_or_strings_is_not_an_entry_point() {
        assert!(!has_main("// fn main() {}\npub fn add(a: i32) -> i32 { a }"));
        assert!(!has_main("/* old entry:\nfn main() {\n} */\npub fn f() {}"));
        assert!(!has_main("pub const HELP: &str = \"\nfn main() {}\n\";"));
        assert!(!has_main("pub fn spawn_main() {}"));
    }

    #[test]
    fn test_main_after_comment_and_string() {
        let code = "// entry point below\nconst URL: &str = \"http://x\";\n\nfn main() {\n    println!(\"{}\", URL);\n}";
        assert!(has_main(code));
        assert!(has_main("pub async fn main() {}"));
    }
}
