//! Built-in pattern checkers, one per [`Category`].
//!
//! Every checker has an AST path (used when the C parse is clean) and a
//! regex path over raw text (used when it is not).

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use tree_sitter::Node;

use super::syntax::{declarator_name, first_line, is_pointer_declarator, ParsedSource};
use super::{Category, PatternChecker, RuleHint};

/// (callee, suggested pattern, rationale)
type CallRule = (&'static str, &'static str, &'static str);

const IO_RULES: &[CallRule] = &[
    (
        "scanf",
        "read a line with std::io::stdin().read_line(&mut buf), then split_whitespace() and parse::<T>() each token",
        "scanf writes through out-pointers and silently ignores malformed input; parsing makes failure explicit",
    ),
    (
        "printf",
        "print!/println! with {} placeholders (%d, %lld -> {}, %.2f -> {:.2}, %s -> {})",
        "format strings are checked at compile time and arguments are type-safe",
    ),
    (
        "fprintf",
        "eprintln! for stderr, writeln!(writer, ...) for other streams",
        "stream handles become typed writers",
    ),
    (
        "puts",
        "println!(\"{}\", s)",
        "puts appends a newline, println! does the same",
    ),
    (
        "getchar",
        "std::io::stdin().bytes() or read_line and iterate chars()",
        "EOF is an Option/Result, not a sentinel int",
    ),
    (
        "fgets",
        "std::io::stdin().read_line(&mut String)",
        "String grows as needed so there is no fixed buffer to overrun",
    ),
];

const ALLOC_RULES: &[CallRule] = &[
    (
        "malloc",
        "Vec<T> (vec![0; n] or Vec::with_capacity(n)) or Box<T> for a single value",
        "owned containers free themselves and carry their length",
    ),
    (
        "calloc",
        "vec![0; n]",
        "zero-initialised Vec replaces calloc",
    ),
    (
        "realloc",
        "Vec::resize / Vec::reserve",
        "Vec reallocates in place of manual realloc and keeps pointers valid",
    ),
    (
        "free",
        "let the owner go out of scope (or drop(value))",
        "ownership ends the allocation exactly once, which rules out double free and use after free",
    ),
];

const STRING_RULES: &[CallRule] = &[
    (
        "strcpy",
        "String::from / clone_from, or copy_from_slice on a checked sub-slice",
        "unbounded copies overflow the destination buffer",
    ),
    (
        "strncpy",
        "copy at most dst.len() bytes with dst[..n].copy_from_slice(&src[..n])",
        "slices carry their length so truncation is explicit",
    ),
    (
        "strcat",
        "String::push_str",
        "String grows instead of writing past the end",
    ),
    (
        "sprintf",
        "format!(...) into a String",
        "format! allocates the exact size needed",
    ),
    (
        "gets",
        "std::io::stdin().read_line(&mut String)",
        "gets cannot bound its write and must never be translated literally",
    ),
];

static IO_CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(scanf|printf|fprintf|puts|getchar|fgets)\s*\(").unwrap()
});

static ALLOC_CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(malloc|calloc|realloc|free)\s*\(").unwrap());

static STRING_CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(strcpy|strncpy|strcat|sprintf|gets)\s*\(").unwrap());

static POINTER_DECL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:int|char|float|double|long|short|unsigned|void|size_t|struct\s+\w+)\s*\*+\s*([A-Za-z_]\w*)",
    )
    .unwrap()
});

static ARRAY_DECL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:int|char|float|double|long|short|unsigned)\s+[A-Za-z_]\w*\s*\[[^\]]*\]")
        .unwrap()
});

static SUBSCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z_]\w*\s*\[[^\]]+\]").unwrap());

static CAST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\(\s*(?:unsigned\s+|signed\s+)?(?:long\s+long|long|int|short|char|float|double|size_t)\s*\)\s*[\w(]",
    )
    .unwrap()
});

fn lookup(rules: &[CallRule], name: &str) -> Option<CallRule> {
    rules.iter().copied().find(|(callee, _, _)| *callee == name)
}

/// Text from `start` to the end of the statement on the same line.
fn statement_at(text: &str, start: usize) -> &str {
    let rest = &text[start..];
    let line = rest.lines().next().unwrap_or(rest);
    match line.find(';') {
        Some(end) => line[..end].trim(),
        None => line.trim(),
    }
}

/// One hint per distinct callee from `rules`, first occurrence wins.
fn named_call_hints(
    source: &ParsedSource<'_>,
    category: &Category,
    rules: &[CallRule],
    fallback: &Regex,
) -> Vec<RuleHint> {
    let mut seen = HashSet::new();
    let mut hints = Vec::new();

    if source.syntax().is_some() {
        for call in source.calls() {
            if let Some((name, suggested, rationale)) = lookup(rules, call.name) {
                if seen.insert(name) {
                    hints.push(RuleHint::new(
                        category.clone(),
                        first_line(call.text),
                        suggested,
                        rationale,
                    ));
                }
            }
        }
        return hints;
    }

    let text = source.text();
    for caps in fallback.captures_iter(text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if let Some((name, suggested, rationale)) = lookup(rules, name.as_str()) {
            if seen.insert(name) {
                hints.push(RuleHint::new(
                    category.clone(),
                    statement_at(text, whole.start()),
                    suggested,
                    rationale,
                ));
            }
        }
    }
    hints
}

/// Formatted console I/O.
pub struct IoChecker;

impl PatternChecker for IoChecker {
    fn category(&self) -> Category {
        Category::Io
    }

    fn check(&self, source: &ParsedSource<'_>) -> Vec<RuleHint> {
        named_call_hints(source, &self.category(), IO_RULES, &IO_CALL_RE)
    }
}

/// Unbounded string-buffer routines.
pub struct StringBufferChecker;

impl PatternChecker for StringBufferChecker {
    fn category(&self) -> Category {
        Category::StringBuffer
    }

    fn check(&self, source: &ParsedSource<'_>) -> Vec<RuleHint> {
        named_call_hints(source, &self.category(), STRING_RULES, &STRING_CALL_RE)
    }
}

/// Pointer parameters, manual allocation and pointer arithmetic.
pub struct PointerChecker;

const POINTER_PARAM_SUGGESTION: &str =
    "&T / &mut T for a single value, &[T] / &mut [T] when it points at a buffer";
const POINTER_PARAM_RATIONALE: &str =
    "references are non-null and borrow-checked; slices carry their length";
const POINTER_ARITH_SUGGESTION: &str =
    "index a slice (s[i]) or iterate (iter(), windows(), split_at) instead of moving a pointer";
const POINTER_ARITH_RATIONALE: &str = "pointer offsets are unchecked; slice indexing is bounds-checked";

impl PointerChecker {
    fn pointer_names<'s, 't>(
        source: &'s ParsedSource<'t>,
    ) -> (HashSet<&'t str>, Option<Node<'s>>) {
        let mut names = HashSet::new();
        let mut first_param = None;
        for node in source.nodes_of_kind(&["parameter_declaration", "declaration"]) {
            let mut cursor = node.walk();
            for declarator in node.children_by_field_name("declarator", &mut cursor) {
                if is_pointer_declarator(declarator) {
                    if let Some(name) = declarator_name(declarator, source.text()) {
                        names.insert(name);
                    }
                    if node.kind() == "parameter_declaration" && first_param.is_none() {
                        first_param = Some(node);
                    }
                }
            }
        }
        (names, first_param)
    }

    fn is_pointer_ident(source: &ParsedSource<'_>, node: Option<Node<'_>>, names: &HashSet<&str>) -> bool {
        node.is_some_and(|n| n.kind() == "identifier" && names.contains(source.node_text(n)))
    }

    fn ast_arith<'t>(source: &ParsedSource<'t>, names: &HashSet<&str>) -> Option<&'t str> {
        for node in source.nodes_of_kind(&["update_expression", "binary_expression"]) {
            let hit = match node.kind() {
                "update_expression" => {
                    Self::is_pointer_ident(source, node.child_by_field_name("argument"), names)
                }
                _ => {
                    let op = node
                        .child_by_field_name("operator")
                        .map(|o| source.node_text(o))
                        .unwrap_or("");
                    (op == "+" || op == "-")
                        && (Self::is_pointer_ident(source, node.child_by_field_name("left"), names)
                            || Self::is_pointer_ident(
                                source,
                                node.child_by_field_name("right"),
                                names,
                            ))
                }
            };
            if hit {
                return Some(first_line(source.node_text(node)));
            }
        }
        None
    }

    fn text_pointer_hints(text: &str) -> Vec<RuleHint> {
        let mut hints = Vec::new();
        let mut names = Vec::new();
        for caps in POINTER_DECL_RE.captures_iter(text) {
            if let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) {
                if names.is_empty() {
                    hints.push(RuleHint::new(
                        Category::Pointer,
                        whole.as_str().trim(),
                        POINTER_PARAM_SUGGESTION,
                        POINTER_PARAM_RATIONALE,
                    ));
                }
                names.push(regex::escape(name.as_str()));
            }
        }
        if names.is_empty() {
            return hints;
        }
        let pattern = format!(r"\b(?:{})\s*(?:\+\+|--|[+-]\s*\w)", names.join("|"));
        if let Ok(arith) = Regex::new(&pattern) {
            if let Some(m) = arith.find(text) {
                hints.push(RuleHint::new(
                    Category::Pointer,
                    m.as_str().trim(),
                    POINTER_ARITH_SUGGESTION,
                    POINTER_ARITH_RATIONALE,
                ));
            }
        }
        hints
    }
}

impl PatternChecker for PointerChecker {
    fn category(&self) -> Category {
        Category::Pointer
    }

    fn check(&self, source: &ParsedSource<'_>) -> Vec<RuleHint> {
        let mut hints = Vec::new();

        if source.syntax().is_some() {
            let (names, first_param) = Self::pointer_names(source);
            if let Some(param) = first_param {
                hints.push(RuleHint::new(
                    Category::Pointer,
                    source.node_text(param).trim(),
                    POINTER_PARAM_SUGGESTION,
                    POINTER_PARAM_RATIONALE,
                ));
            }
            hints.extend(named_call_hints(source, &Category::Pointer, ALLOC_RULES, &ALLOC_CALL_RE));
            if let Some(snippet) = Self::ast_arith(source, &names) {
                hints.push(RuleHint::new(
                    Category::Pointer,
                    snippet,
                    POINTER_ARITH_SUGGESTION,
                    POINTER_ARITH_RATIONALE,
                ));
            }
        } else {
            hints.extend(Self::text_pointer_hints(source.text()));
            hints.extend(named_call_hints(source, &Category::Pointer, ALLOC_RULES, &ALLOC_CALL_RE));
        }

        hints
    }
}

/// Subscripted access and fixed-size array declarations.
pub struct ArrayChecker;

const SUBSCRIPT_SUGGESTION: &str =
    "index with usize (arr[i as usize]) or prefer for x in arr.iter() / iter().enumerate()";
const SUBSCRIPT_RATIONALE: &str = "indexing is bounds-checked and panics instead of reading past the end";
const ARRAY_DECL_SUGGESTION: &str = "[T; N] for a fixed size, Vec<T> when the length comes from input";
const ARRAY_DECL_RATIONALE: &str = "arrays and vectors know their own length";

impl PatternChecker for ArrayChecker {
    fn category(&self) -> Category {
        Category::Array
    }

    fn check(&self, source: &ParsedSource<'_>) -> Vec<RuleHint> {
        let mut hints = Vec::new();

        if source.syntax().is_some() {
            if let Some(node) = source.nodes_of_kind(&["array_declarator"]).first() {
                let decl = node.parent().unwrap_or(*node);
                let decl = if decl.kind() == "init_declarator" {
                    decl.parent().unwrap_or(decl)
                } else {
                    decl
                };
                hints.push(RuleHint::new(
                    Category::Array,
                    first_line(source.node_text(decl)),
                    ARRAY_DECL_SUGGESTION,
                    ARRAY_DECL_RATIONALE,
                ));
            }
            if let Some(node) = source.nodes_of_kind(&["subscript_expression"]).first() {
                hints.push(RuleHint::new(
                    Category::Array,
                    first_line(source.node_text(*node)),
                    SUBSCRIPT_SUGGESTION,
                    SUBSCRIPT_RATIONALE,
                ));
            }
            return hints;
        }

        let text = source.text();
        let decls: Vec<(usize, usize)> = ARRAY_DECL_RE
            .find_iter(text)
            .map(|m| (m.start(), m.end()))
            .collect();
        if let Some(m) = ARRAY_DECL_RE.find(text) {
            hints.push(RuleHint::new(
                Category::Array,
                m.as_str().trim(),
                ARRAY_DECL_SUGGESTION,
                ARRAY_DECL_RATIONALE,
            ));
        }
        let access = SUBSCRIPT_RE
            .find_iter(text)
            .find(|m| !decls.iter().any(|(s, e)| m.start() >= *s && m.end() <= *e));
        if let Some(m) = access {
            hints.push(RuleHint::new(
                Category::Array,
                m.as_str().trim(),
                SUBSCRIPT_SUGGESTION,
                SUBSCRIPT_RATIONALE,
            ));
        }
        hints
    }
}

/// C casts and arithmetic that mixes numeric types.
pub struct MixedTypeChecker;

const CAST_SUGGESTION: &str = "explicit `as` conversion (x as i64), or i64::from / TryFrom when it may not fit";
const CAST_RATIONALE: &str = "Rust never converts numeric types implicitly";
const MIXED_SUGGESTION: &str =
    "convert operands to one type before the operation, e.g. (a as i64) * (b as i64)";
const MIXED_RATIONALE: &str =
    "C promotes operands silently; in Rust mismatched operand types do not compile and narrow products can overflow";

fn normalize_type(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_numeric_type(ty: &str) -> bool {
    ty.split_whitespace().any(|w| {
        matches!(
            w,
            "int" | "long" | "short" | "char" | "float" | "double" | "unsigned" | "signed" | "size_t"
        )
    })
}

impl MixedTypeChecker {
    /// identifier -> declared numeric type, pointers excluded.
    fn declared_types<'t>(source: &ParsedSource<'t>) -> HashMap<&'t str, String> {
        let mut types = HashMap::new();
        for node in source.nodes_of_kind(&["parameter_declaration", "declaration"]) {
            let Some(ty) = node.child_by_field_name("type") else {
                continue;
            };
            let ty = normalize_type(source.node_text(ty));
            if !is_numeric_type(&ty) {
                continue;
            }
            let mut cursor = node.walk();
            for declarator in node.children_by_field_name("declarator", &mut cursor) {
                if is_pointer_declarator(declarator) {
                    continue;
                }
                if let Some(name) = declarator_name(declarator, source.text()) {
                    types.insert(name, ty.clone());
                }
            }
        }
        types
    }

    fn operand_type<'m>(
        source: &ParsedSource<'_>,
        node: Option<Node<'_>>,
        types: &'m HashMap<&str, String>,
    ) -> Option<&'m String> {
        let mut node = node?;
        while node.kind() == "parenthesized_expression" {
            node = node.named_child(0)?;
        }
        match node.kind() {
            "identifier" => types.get(source.node_text(node)),
            _ => None,
        }
    }

    fn ast_hints(source: &ParsedSource<'_>) -> Vec<RuleHint> {
        let mut hints = Vec::new();

        let mut cast_types = HashSet::new();
        for cast in source.nodes_of_kind(&["cast_expression"]) {
            let ty = cast
                .child_by_field_name("type")
                .map(|t| normalize_type(source.node_text(t)))
                .unwrap_or_default();
            if is_numeric_type(&ty) && cast_types.insert(ty) {
                hints.push(RuleHint::new(
                    Category::MixedType,
                    first_line(source.node_text(cast)),
                    CAST_SUGGESTION,
                    CAST_RATIONALE,
                ));
            }
        }

        let types = Self::declared_types(source);
        for expr in source.nodes_of_kind(&["binary_expression"]) {
            let op = expr
                .child_by_field_name("operator")
                .map(|o| source.node_text(o))
                .unwrap_or("");
            if !matches!(op, "+" | "-" | "*" | "/" | "%") {
                continue;
            }
            let left = Self::operand_type(source, expr.child_by_field_name("left"), &types);
            let right = Self::operand_type(source, expr.child_by_field_name("right"), &types);
            if let (Some(l), Some(r)) = (left, right) {
                if l != r {
                    hints.push(RuleHint::new(
                        Category::MixedType,
                        first_line(source.node_text(expr)),
                        MIXED_SUGGESTION,
                        MIXED_RATIONALE,
                    ));
                    continue;
                }
                // same-typed operands assigned into a wider declaration: `long long r = a * b;`
                if let Some(declared) = Self::initialised_type(source, expr) {
                    if declared != *l && op == "*" {
                        hints.push(RuleHint::new(
                            Category::MixedType,
                            first_line(source.node_text(expr.parent().unwrap_or(expr))),
                            MIXED_SUGGESTION,
                            MIXED_RATIONALE,
                        ));
                    }
                }
            }
        }

        hints
    }

    fn initialised_type(source: &ParsedSource<'_>, expr: Node<'_>) -> Option<String> {
        let init = expr.parent()?;
        if init.kind() != "init_declarator" {
            return None;
        }
        let decl = init.parent()?;
        let ty = normalize_type(source.node_text(decl.child_by_field_name("type")?));
        is_numeric_type(&ty).then_some(ty)
    }
}

impl PatternChecker for MixedTypeChecker {
    fn category(&self) -> Category {
        Category::MixedType
    }

    fn check(&self, source: &ParsedSource<'_>) -> Vec<RuleHint> {
        if source.syntax().is_some() {
            return Self::ast_hints(source);
        }
        CAST_RE
            .find_iter(source.text())
            .take(1)
            .map(|m| {
                RuleHint::new(
                    Category::MixedType,
                    statement_at(source.text(), m.start()),
                    CAST_SUGGESTION,
                    CAST_RATIONALE,
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(checker: &dyn PatternChecker, src: &str) -> Vec<RuleHint> {
        checker.check(&ParsedSource::parse(src))
    }

    #[test]
    fn test_io_one_hint_per_function() {
        let src = r#"
int main() {
    int a, b;
    scanf("%d", &a);
    scanf("%d", &b);
    printf("%d\n", a);
    return 0;
}
"#;
        let hints = run(&IoChecker, src);
        assert_eq!(hints.len(), 2);
        assert_eq!(hints[0].matched_snippet, "scanf(\"%d\", &a)");
    }

    #[test]
    fn test_pointer_alloc_and_arithmetic() {
        let src = r#"
int sum(int *data, int n) {
    int *buf = malloc(n * sizeof(int));
    int *cur = data;
    int s = 0;
    while (n--) { s += *cur; cur++; }
    free(buf);
    return s;
}
"#;
        let hints = run(&PointerChecker, src);
        let snippets: Vec<&str> = hints.iter().map(|h| h.matched_snippet.as_str()).collect();
        assert_eq!(snippets[0], "int *data");
        assert!(snippets.iter().any(|s| s.starts_with("malloc")));
        assert!(snippets.iter().any(|s| s.starts_with("free")));
        assert!(snippets.contains(&"cur++"));
    }

    #[test]
    fn test_address_of_is_not_a_pointer_hint() {
        let hints = run(&PointerChecker, "void f() { int a; g(&a); }");
        assert!(hints.is_empty());
    }

    #[test]
    fn test_array_declaration_and_subscript() {
        let src = "int main() { int arr[5] = {1,2,3,4,5}; int x = arr[2]; return x; }";
        let hints = run(&ArrayChecker, src);
        assert_eq!(hints.len(), 2);
        assert!(hints[0].matched_snippet.starts_with("int arr[5]"));
        assert_eq!(hints[1].matched_snippet, "arr[2]");
    }

    #[test]
    fn test_mixed_cast_and_widening_product() {
        let src = r#"
int main() {
    int a = 100000, b = 100000;
    long long r = a * b;
    float f = 3.7;
    int i = (int)f;
    return 0;
}
"#;
        let hints = run(&MixedTypeChecker, src);
        assert!(hints.iter().any(|h| h.matched_snippet == "(int)f"));
        assert!(hints.iter().any(|h| h.matched_snippet.contains("r = a * b")));
    }

    #[test]
    fn test_mixed_operand_types() {
        let src = "double avg(int total, double count) { return total / count; }";
        let hints = run(&MixedTypeChecker, src);
        assert_eq!(hints.len(), 1);
        assert_eq!(hints[0].matched_snippet, "total / count");
    }

    #[test]
    fn test_string_buffer_calls() {
        let src = "void f(char *s) { char buf[8]; strcpy(buf, s); }";
        let hints = run(&StringBufferChecker, src);
        assert_eq!(hints.len(), 1);
        assert_eq!(hints[0].category, Category::StringBuffer);
    }

    #[test]
    fn test_text_fallback_paths() {
        // unbalanced braces force the regex path
        let src = "int main( {\n  int *p = malloc(4);\n  p++;\n  int a[3];\n  a[1] = (long)p;\n";
        let parsed = ParsedSource::parse(src);
        assert!(parsed.syntax().is_none());

        let ptr = PointerChecker.check(&parsed);
        assert!(ptr.iter().any(|h| h.matched_snippet == "p++"));
        assert!(ptr.iter().any(|h| h.matched_snippet.starts_with("malloc")));

        let arr = ArrayChecker.check(&parsed);
        assert_eq!(arr[0].matched_snippet, "int a[3]");
        assert_eq!(arr[1].matched_snippet, "a[1]");

        let mixed = MixedTypeChecker.check(&parsed);
        assert_eq!(mixed.len(), 1);
    }
}
