//! tree-sitter-c front end shared by the pattern checkers and the project scanner.

use tree_sitter::{Node, Parser, Tree};

/// Parse C source. Returns `None` only if the grammar could not be loaded
/// or the parser gave up.
pub fn parse_c(text: &str) -> Option<Tree> {
    let mut parser = Parser::new();
    parser.set_language(&tree_sitter_c::LANGUAGE.into()).ok()?;
    parser.parse(text, None)
}

/// Source text plus its syntax tree when the tree is trustworthy.
pub struct ParsedSource<'a> {
    text: &'a str,
    tree: Option<Tree>,
}

/// A call to a named function, e.g. `scanf("%d", &x)`.
#[derive(Debug, Clone, Copy)]
pub struct CallSite<'t> {
    pub name: &'t str,
    pub text: &'t str,
    pub node: Node<'t>,
}

impl<'a> ParsedSource<'a> {
    /// Parse `text`. Trees containing ERROR or MISSING nodes are discarded so
    /// checkers take their text-matching path instead.
    pub fn parse(text: &'a str) -> Self {
        let tree = parse_c(text).filter(|t| !t.root_node().has_error());
        Self { text, tree }
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    /// The syntax tree, or `None` when analysis is degraded.
    pub fn syntax(&self) -> Option<&Tree> {
        self.tree.as_ref()
    }

    pub fn node_text(&self, node: Node<'_>) -> &'a str {
        node.utf8_text(self.text.as_bytes()).unwrap_or("")
    }

    /// All nodes whose kind is in `kinds`, in document order.
    pub fn nodes_of_kind(&self, kinds: &[&str]) -> Vec<Node<'_>> {
        let mut out = Vec::new();
        if let Some(tree) = &self.tree {
            collect_kinds(tree.root_node(), kinds, &mut out);
        }
        out
    }

    /// Calls whose callee is a plain identifier, in document order.
    pub fn calls(&self) -> Vec<CallSite<'_>> {
        self.nodes_of_kind(&["call_expression"])
            .into_iter()
            .filter_map(|node| {
                let callee = node.child_by_field_name("function")?;
                if callee.kind() != "identifier" {
                    return None;
                }
                Some(CallSite {
                    name: self.node_text(callee),
                    text: self.node_text(node),
                    node,
                })
            })
            .collect()
    }
}

/// Preorder walk with a cursor; nesting depth never touches the call stack.
pub(crate) fn collect_kinds<'t>(node: Node<'t>, kinds: &[&str], out: &mut Vec<Node<'t>>) {
    let mut cursor = node.walk();
    loop {
        let current = cursor.node();
        if kinds.contains(&current.kind()) {
            out.push(current);
        }
        if cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.node() == node {
                return;
            }
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return;
            }
        }
    }
}

/// Innermost identifier of a declarator chain (`*p`, `a[10]`, `x = 3`, `f(int)`).
pub fn declarator_name<'s>(node: Node<'_>, text: &'s str) -> Option<&'s str> {
    let mut node = node;
    loop {
        match node.kind() {
            "identifier" | "field_identifier" | "type_identifier" => {
                return node.utf8_text(text.as_bytes()).ok()
            }
            _ => node = node.child_by_field_name("declarator")?,
        }
    }
}

/// Whether a declarator chain passes through a `pointer_declarator`.
pub fn is_pointer_declarator(node: Node<'_>) -> bool {
    let mut node = node;
    loop {
        match node.kind() {
            "pointer_declarator" => return true,
            "identifier" => return false,
            _ => match node.child_by_field_name("declarator") {
                Some(inner) => node = inner,
                None => return false,
            },
        }
    }
}

/// First line of a snippet, trimmed, for compact hint text.
pub fn first_line(snippet: &str) -> &str {
    snippet.lines().next().unwrap_or("").trim()
}
