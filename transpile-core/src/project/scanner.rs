//! Unit extraction and dependency edges via tree-sitter-c.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use tree_sitter::Node;

use super::manifest::load_compile_commands;
use super::ScanError;
use crate::analysis::syntax::{collect_kinds, declarator_name, parse_c};
use crate::analysis::{Detector, RuleHint};
use crate::ordering::{DependencyGraph, DependencyOrder, EdgeReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Function,
    Struct,
    Union,
    Enum,
    Typedef,
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Function => write!(f, "function"),
            Self::Struct => write!(f, "struct"),
            Self::Union => write!(f, "union"),
            Self::Enum => write!(f, "enum"),
            Self::Typedef => write!(f, "typedef"),
        }
    }
}

/// One top-level definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    pub name: String,
    pub kind: UnitKind,
    pub file: PathBuf,
    /// 1-based line of the definition.
    pub line: usize,
    pub source: String,
    pub hints: Vec<RuleHint>,
    /// Further definitions with the same name, merged into this unit.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub duplicates: Vec<SourceLocation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: PathBuf,
    pub line: usize,
}

impl Unit {
    /// Fold in another definition of the same name: its location is
    /// recorded and hints not already present are appended.
    fn merge(&mut self, location: SourceLocation, hints: Vec<RuleHint>) {
        for hint in hints {
            let known = self.hints.iter().any(|h| {
                h.category == hint.category && h.matched_snippet == hint.matched_snippet
            });
            if !known {
                self.hints.push(hint);
            }
        }
        if !self.duplicates.contains(&location) {
            self.duplicates.push(location);
        }
    }
}

/// Units in discovery order plus their dependency graph.
#[derive(Debug, Clone, Default)]
pub struct ProjectScan {
    pub units: Vec<Unit>,
    pub graph: DependencyGraph,
}

impl ProjectScan {
    pub fn unit(&self, name: &str) -> Option<&Unit> {
        self.units.iter().find(|u| u.name == name)
    }

    pub fn order(&self) -> DependencyOrder {
        self.graph.order()
    }
}

pub struct ProjectScanner {
    detector: Detector,
}

impl Default for ProjectScanner {
    fn default() -> Self {
        Self::new()
    }
}

fn is_container(kind: &str) -> bool {
    matches!(
        kind,
        "preproc_if"
            | "preproc_ifdef"
            | "preproc_else"
            | "preproc_elif"
            | "linkage_specification"
            | "declaration_list"
    )
}

/// Top-level items in document order, looking through preprocessor
/// conditionals and `extern "C"` blocks.
fn top_level_items(root: Node<'_>) -> Vec<Node<'_>> {
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node != root && !is_container(node.kind()) {
            out.push(node);
            continue;
        }
        let mut cursor = node.walk();
        let children: Vec<_> = node.named_children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    out
}

fn specifier_kind(kind: &str) -> Option<UnitKind> {
    match kind {
        "struct_specifier" => Some(UnitKind::Struct),
        "union_specifier" => Some(UnitKind::Union),
        "enum_specifier" => Some(UnitKind::Enum),
        _ => None,
    }
}

/// `struct Name { ... }` with a body -> (Name, kind)
fn defined_specifier(node: Node<'_>, text: &str) -> Option<(String, UnitKind)> {
    let kind = specifier_kind(node.kind())?;
    node.child_by_field_name("body")?;
    let name = node.child_by_field_name("name")?.utf8_text(text.as_bytes()).ok()?;
    Some((name.to_string(), kind))
}

struct Definition<'t> {
    name: String,
    kind: UnitKind,
    node: Node<'t>,
    /// struct tag of a `typedef struct tag { } Name;`
    alias: Option<String>,
}

fn definitions<'t>(item: Node<'t>, text: &str) -> Vec<Definition<'t>> {
    match item.kind() {
        "function_definition" => item
            .child_by_field_name("declarator")
            .and_then(|d| declarator_name(d, text))
            .map(|name| Definition {
                name: name.to_string(),
                kind: UnitKind::Function,
                node: item,
                alias: None,
            })
            .into_iter()
            .collect(),
        "struct_specifier" | "union_specifier" | "enum_specifier" => defined_specifier(item, text)
            .map(|(name, kind)| Definition {
                name,
                kind,
                node: item,
                alias: None,
            })
            .into_iter()
            .collect(),
        "declaration" => item
            .child_by_field_name("type")
            .and_then(|t| defined_specifier(t, text))
            .map(|(name, kind)| Definition {
                name,
                kind,
                node: item,
                alias: None,
            })
            .into_iter()
            .collect(),
        "type_definition" => {
            let tag = item
                .child_by_field_name("type")
                .and_then(|t| defined_specifier(t, text))
                .map(|(name, _)| name);
            let mut cursor = item.walk();
            item.children_by_field_name("declarator", &mut cursor)
                .filter_map(|d| declarator_name(d, text))
                .map(|name| Definition {
                    name: name.to_string(),
                    kind: UnitKind::Typedef,
                    node: item,
                    alias: tag.clone().filter(|t| t != name),
                })
                .collect()
        }
        _ => Vec::new(),
    }
}

/// Names referenced inside a definition: callees and type names.
fn references(node: Node<'_>, text: &str) -> Vec<(String, EdgeReason)> {
    let mut found = Vec::new();
    collect_kinds(node, &["call_expression", "type_identifier"], &mut found);
    found
        .into_iter()
        .filter_map(|n| match n.kind() {
            "call_expression" => {
                let callee = n.child_by_field_name("function")?;
                (callee.kind() == "identifier")
                    .then(|| callee.utf8_text(text.as_bytes()).ok())
                    .flatten()
                    .map(|s| (s.to_string(), EdgeReason::Call))
            }
            _ => n
                .utf8_text(text.as_bytes())
                .ok()
                .map(|s| (s.to_string(), EdgeReason::Type)),
        })
        .collect()
}

impl ProjectScanner {
    pub fn new() -> Self {
        Self::with_detector(Detector::new())
    }

    pub fn with_detector(detector: Detector) -> Self {
        Self { detector }
    }

    /// Scan in-memory `(path, source)` pairs.
    pub fn scan_sources(&self, sources: &[(PathBuf, String)]) -> ProjectScan {
        let trees: Vec<_> = sources
            .iter()
            .filter_map(|(path, text)| match parse_c(text) {
                Some(tree) => Some((path, text.as_str(), tree)),
                None => {
                    warn!(file = %path.display(), "C parser produced no tree; skipping file");
                    None
                }
            })
            .collect();

        let mut units: Vec<Unit> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut aliases: HashMap<String, String> = HashMap::new();
        let mut bodies: Vec<(usize, Node<'_>, &str)> = Vec::new();

        for (path, text, tree) in &trees {
            if tree.root_node().has_error() {
                warn!(file = %path.display(), "Parse errors; definitions may be incomplete");
            }
            for item in top_level_items(tree.root_node()) {
                for def in definitions(item, text) {
                    if let Some(tag) = def.alias {
                        aliases.entry(tag).or_insert_with(|| def.name.clone());
                    }
                    let mut source = def
                        .node
                        .utf8_text(text.as_bytes())
                        .unwrap_or_default()
                        .to_string();
                    if specifier_kind(def.node.kind()).is_some() && !source.ends_with(';') {
                        source.push(';');
                    }
                    let hints = self.detector.detect(&source).hints;
                    let line = def.node.start_position().row + 1;

                    if let Some(&existing) = index.get(&def.name) {
                        debug!(name = %def.name, file = %path.display(), line, "Merging duplicate definition");
                        units[existing].merge(
                            SourceLocation {
                                file: (*path).clone(),
                                line,
                            },
                            hints,
                        );
                        bodies.push((existing, def.node, text));
                        continue;
                    }

                    index.insert(def.name.clone(), units.len());
                    bodies.push((units.len(), def.node, text));
                    units.push(Unit {
                        name: def.name,
                        kind: def.kind,
                        file: (*path).clone(),
                        line,
                        source,
                        hints,
                        duplicates: Vec::new(),
                    });
                }
            }
        }

        let mut graph = DependencyGraph::new();
        for unit in &units {
            graph.add_unit(&unit.name);
        }
        for (ui, node, text) in bodies {
            let from = units[ui].name.as_str();
            for (name, reason) in references(node, text) {
                let target = aliases.get(&name).unwrap_or(&name);
                if index.contains_key(target) {
                    graph.add_dependency(from, target, reason);
                }
            }
        }

        info!(
            files = trees.len(),
            units = units.len(),
            edges = graph.edge_count(),
            "Project scanned"
        );
        ProjectScan { units, graph }
    }

    pub fn scan_files(&self, files: &[PathBuf]) -> Result<ProjectScan, ScanError> {
        if files.is_empty() {
            return Err(ScanError::NoSources);
        }
        let mut sources = Vec::with_capacity(files.len());
        for path in files {
            let bytes = std::fs::read(path).map_err(|source| ScanError::Io {
                path: path.clone(),
                source,
            })?;
            sources.push((path.clone(), String::from_utf8_lossy(&bytes).into_owned()));
        }
        Ok(self.scan_sources(&sources))
    }

    /// Scan every source listed in a compilation database. Missing files are skipped.
    pub fn scan_compile_commands(&self, path: impl AsRef<Path>) -> Result<ProjectScan, ScanError> {
        let files: Vec<PathBuf> = load_compile_commands(path)?
            .into_iter()
            .filter_map(|cmd| {
                if cmd.file.exists() {
                    Some(cmd.file)
                } else {
                    warn!(file = %cmd.file.display(), "Listed source does not exist; skipping");
                    None
                }
            })
            .collect();
        self.scan_files(&files)
    }

    /// Scan every `.c`/`.h` file under `dir`, honoring ignore files.
    pub fn scan_directory(&self, dir: impl AsRef<Path>) -> Result<ProjectScan, ScanError> {
        let mut files = Vec::new();
        for entry in ignore::WalkBuilder::new(dir.as_ref()).build() {
            let entry = entry?;
            let is_file = entry.file_type().is_some_and(|t| t.is_file());
            let is_c = entry
                .path()
                .extension()
                .is_some_and(|e| e == "c" || e == "h");
            if is_file && is_c {
                files.push(entry.into_path());
            }
        }
        files.sort();
        self.scan_files(&files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Category;

    const LIST_H: &str = r#"
typedef struct node_s {
    int value;
    struct node_s *next;
} Node;
"#;

    const LIST_C: &str = r#"
#include <stdlib.h>

Node *push(Node *head, int value) {
    Node *n = malloc(sizeof(Node));
    n->value = value;
    n->next = head;
    return n;
}

int length(const Node *head) {
    return head ? 1 + length(head->next) : 0;
}

int is_even(int n);

int is_odd(int n) { return n == 0 ? 0 : is_even(n - 1); }
int is_even(int n) { return n == 0 ? 1 : is_odd(n - 1); }

int main(void) {
    Node *list = push(NULL, 1);
    return length(list) + is_even(4);
}
"#;

    fn scan() -> ProjectScan {
        ProjectScanner::new().scan_sources(&[
            (PathBuf::from("list.h"), LIST_H.to_string()),
            (PathBuf::from("list.c"), LIST_C.to_string()),
        ])
    }

    #[test]
    fn test_units_extracted() {
        let scan = scan();
        let names: Vec<&str> = scan.units.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["Node", "push", "length", "is_odd", "is_even", "main"]);
        assert_eq!(scan.unit("Node").map(|u| u.kind), Some(UnitKind::Typedef));
        assert_eq!(scan.unit("push").map(|u| u.line), Some(4));
        assert!(scan
            .unit("push")
            .is_some_and(|u| u.hints.iter().any(|h| h.matched_snippet.starts_with("malloc"))));
    }

    #[test]
    fn test_edges_and_order() {
        let scan = scan();
        assert!(scan.graph.dependencies_of("push").contains(&("Node", EdgeReason::Type)));
        let order = scan.order();
        // Node first, mutual recursion collapsed, main last
        assert_eq!(order.sccs[0].units, vec!["Node"]);
        let cycle = order.sccs.iter().find(|s| s.is_cycle()).unwrap();
        assert_eq!(cycle.units, vec!["is_odd", "is_even"]);
        assert_eq!(order.sccs.last().unwrap().units, vec!["main"]);
    }

    #[test]
    fn test_duplicate_definitions_merge() {
        let a = "struct point { int x; int y; };\n\nvoid load(struct point *p) { scanf(\"%d\", &p->x); }\n";
        let b = "#include <string.h>\n\nstruct point { int x; int y; };\n\nvoid load(struct point *p, char *dst) { strcpy(dst, \"origin\"); }\n";
        let scan = ProjectScanner::new().scan_sources(&[
            (PathBuf::from("a.c"), a.to_string()),
            (PathBuf::from("b.c"), b.to_string()),
        ]);

        let names: Vec<&str> = scan.units.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["point", "load"]);

        let point = scan.unit("point").unwrap();
        assert_eq!(point.file, PathBuf::from("a.c"));
        assert_eq!(
            point.duplicates,
            vec![SourceLocation {
                file: PathBuf::from("b.c"),
                line: 3
            }]
        );

        let load = scan.unit("load").unwrap();
        let categories: Vec<&Category> = load.hints.iter().map(|h| &h.category).collect();
        assert!(categories.contains(&&Category::Io));
        assert!(categories.contains(&&Category::StringBuffer));
        assert!(scan.graph.dependencies_of("load").contains(&("point", EdgeReason::Type)));
    }

    #[test]
    fn test_items_inside_conditionals_keep_document_order() {
        let src = "int a(void) { return 1; }\n#ifdef FAST\nint b(void) { return a(); }\n#else\nint c(void) { return 2; }\n#endif\nint d(void) { return 3; }\n";
        let scan = ProjectScanner::new().scan_sources(&[(PathBuf::from("x.c"), src.to_string())]);
        let names: Vec<&str> = scan.units.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_scan_files_errors() {
        let scanner = ProjectScanner::new();
        assert!(matches!(scanner.scan_files(&[]), Err(ScanError::NoSources)));
        assert!(matches!(
            scanner.scan_files(&[PathBuf::from("/nonexistent/x.c")]),
            Err(ScanError::Io { .. })
        ));
    }
}
