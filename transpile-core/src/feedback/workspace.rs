//! Translations already accepted in a multi-file run.
//!
//! A dependent unit only compiles next to the items it calls, so candidates
//! are verified as `candidate + workspace` in one file. The candidate goes
//! first and unchanged, which keeps compiler line numbers pointing into it.

use std::collections::HashSet;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkspacePart {
    /// Rendered as a `// header` line above the code.
    pub header: String,
    pub code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Workspace {
    parts: Vec<WorkspacePart>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkKind {
    /// `#![...]`, only legal at the top of the file
    CrateAttr,
    Use,
    Code,
}

struct Chunk<'a> {
    kind: ChunkKind,
    lines: Vec<&'a str>,
}

impl Chunk<'_> {
    fn key(&self) -> String {
        self.lines
            .iter()
            .flat_map(|l| l.split_whitespace())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Split code into top-level crate attributes, `use` declarations (which may
/// span lines) and everything else.
fn chunks(code: &str) -> Vec<Chunk<'_>> {
    let mut out = Vec::new();
    let mut lines = code.lines();
    while let Some(line) = lines.next() {
        let kind = if line.starts_with("#![") {
            ChunkKind::CrateAttr
        } else if line.starts_with("use ") || line.starts_with("pub use ") {
            ChunkKind::Use
        } else {
            ChunkKind::Code
        };
        let mut chunk = Chunk {
            kind,
            lines: vec![line],
        };
        let terminator = match kind {
            ChunkKind::CrateAttr => Some(']'),
            ChunkKind::Use => Some(';'),
            ChunkKind::Code => None,
        };
        if let Some(end) = terminator {
            while !chunk.lines.last().is_some_and(|l| l.trim_end().ends_with(end)) {
                match lines.next() {
                    Some(next) => chunk.lines.push(next),
                    None => break,
                }
            }
        }
        out.push(chunk);
    }
    out
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, header: impl Into<String>, code: impl Into<String>) {
        self.parts.push(WorkspacePart {
            header: header.into(),
            code: code.into(),
        });
    }

    pub fn parts(&self) -> &[WorkspacePart] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// All parts as one source file. Crate attributes move to the top and a
    /// `use` already seen earlier in the file is dropped.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut attrs = HashSet::new();
        for part in &self.parts {
            for chunk in chunks(&part.code) {
                if chunk.kind == ChunkKind::CrateAttr && attrs.insert(chunk.key()) {
                    out.push_str(&chunk.lines.join("\n"));
                    out.push('\n');
                }
            }
        }
        if !out.is_empty() {
            out.push('\n');
        }
        self.append_parts(&mut out, HashSet::new());
        out
    }

    /// `candidate` verbatim, followed by every part.
    pub fn with_candidate(&self, candidate: &str) -> String {
        let seen = chunks(candidate)
            .iter()
            .filter(|c| c.kind == ChunkKind::Use)
            .map(Chunk::key)
            .collect();
        let mut out = candidate.trim_end().to_string();
        out.push_str("\n\n");
        self.append_parts(&mut out, seen);
        out
    }

    fn append_parts(&self, out: &mut String, mut seen_uses: HashSet<String>) {
        for part in &self.parts {
            out.push_str(&format!("// {}\n", part.header.replace('\n', " ")));
            let mut body = Vec::new();
            for chunk in chunks(&part.code) {
                match chunk.kind {
                    ChunkKind::CrateAttr => continue,
                    ChunkKind::Use if !seen_uses.insert(chunk.key()) => continue,
                    _ => body.extend(chunk.lines),
                }
            }
            let body = body.join("\n");
            let body = body.trim_matches('\n');
            if !body.trim().is_empty() {
                out.push_str(body);
                out.push('\n');
            }
            out.push('\n');
        }
        let trimmed = out.trim_end().len();
        out.truncate(trimmed);
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_parts() -> Workspace {
        let mut ws = Workspace::new();
        ws.push(
            "SCC 0: leaf",
            "#![allow(dead_code)]\nuse std::collections::HashMap;\n\npub fn leaf(x: i32) -> i32 {\n    x + 1\n}",
        );
        ws.push(
            "SCC 1: mid",
            "#![allow(dead_code)]\nuse std::collections::HashMap;\nuse std::{\n    fmt,\n    io,\n};\n\npub fn mid(x: i32) -> i32 {\n    leaf(x) * 2\n}",
        );
        ws
    }

    #[test]
    fn test_render_hoists_attrs_and_drops_repeated_uses() {
        let text = two_parts().render();
        assert!(text.starts_with("#![allow(dead_code)]\n\n// SCC 0: leaf\n"));
        assert_eq!(text.matches("#![allow(dead_code)]").count(), 1);
        assert_eq!(text.matches("use std::collections::HashMap;").count(), 1);
        assert!(text.contains("use std::{\n    fmt,\n    io,\n};"));
        assert!(text.find("// SCC 0: leaf").unwrap() < text.find("pub fn leaf").unwrap());
        assert!(text.find("pub fn leaf").unwrap() < text.find("// SCC 1: mid").unwrap());
        assert!(text.ends_with("}\n"));
    }

    #[test]
    fn test_candidate_first_and_unchanged() {
        let candidate = "use std::collections::HashMap;\n\npub fn top() -> i32 {\n    mid(3)\n}";
        let text = two_parts().with_candidate(candidate);
        assert!(text.starts_with(candidate));
        assert_eq!(text.matches("use std::collections::HashMap;").count(), 1);
        assert!(!text.contains("#![allow"));
        assert!(text.contains("pub fn mid"));
    }

    #[test]
    fn test_indented_use_is_code() {
        let mut ws = Workspace::new();
        ws.push("a", "use std::io;\nfn f() {\n    use std::io;\n}");
        ws.push("b", "use std::io;");
        let text = ws.render();
        assert_eq!(text.matches("\nuse std::io;").count(), 1);
        assert!(text.contains("    use std::io;"));
    }

    #[test]
    fn test_empty_part_keeps_header() {
        let mut ws = Workspace::new();
        ws.push("SCC 3: parse (not translated: cancelled)", "");
        assert_eq!(ws.render(), "// SCC 3: parse (not translated: cancelled)\n");
    }
}
