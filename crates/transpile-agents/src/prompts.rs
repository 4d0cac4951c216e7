//! Prompt templates for the three model calls of a translation request.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever template content changes.
//! The version is stamped into every pipeline result so a regression can be
//! traced to the prompt that produced it.

use crate::model::{ModelRequest, Template};

/// Prompt version. Bump on any template content change.
pub const PROMPT_VERSION: &str = "1.3.0";

pub const SUMMARIZE_SYSTEM: &str = "\
You analyse C code before it is translated to Rust. \
Describe the given declaration precisely and briefly.

Reply with a single JSON object and nothing else:
{\"parameters\": \"inputs, members or components involved\", \
\"return_type\": \"results, exposed data or observable state\", \
\"functional_description\": \"high-level purpose\"}";

pub const GENERATE_SYSTEM: &str = "\
You are an expert C to Rust translator. You produce safe, idiomatic Rust \
(edition 2021) that compiles with rustc using only the standard library. \
Preserve the observable behavior of the C program, including its input \
and output format. Never use `unsafe`. Reply with Rust code only.";

pub const REFINE_SYSTEM: &str = "\
You are an expert Rust developer repairing a C to Rust translation that \
does not compile. Fix every reported compiler error while keeping the \
behavior of the original C code. Reply with the complete corrected Rust \
program only.";

const BASE_CONSTRAINTS: &[&str] = &[
    "Output pure Rust code only. No comments, markdown, or explanatory text.",
    "Use only the Rust standard library; no external crates.",
    "Do not introduce new top-level declarations beyond what the C code defines, except a `fn main` when the C code has one.",
    "Follow Rust naming conventions: structs, enums and type aliases are UpperCamelCase; update all uses when renaming.",
    "Use only fields and methods that exist on the provided types. Do not invent helper methods.",
    "Avoid redundant parentheses in control-flow conditions (use `if flag`, not `if (flag)`).",
];

/// `node_s` → `NodeS`
pub fn rust_camel_case(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|p| !p.is_empty())
        .map(|p| {
            let mut chars = p.chars();
            chars
                .next()
                .map(|first| first.to_ascii_uppercase().to_string() + chars.as_str())
                .unwrap_or_default()
        })
        .collect()
}

/// Hard requirements on the output shape. `type_names` are C type names
/// that must be renamed to UpperCamelCase.
pub fn translation_constraints(type_names: &[&str]) -> String {
    let mut rules: Vec<String> = BASE_CONSTRAINTS.iter().map(|r| r.to_string()).collect();
    for name in type_names {
        let target = rust_camel_case(name);
        if !target.is_empty() && target != *name {
            rules.push(format!(
                "Rename `{name}` to `{target}` in Rust and update all references to use `{target}`."
            ));
        }
    }
    rules
        .iter()
        .map(|r| format!("- {r}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn summarize_request(source: &str, declaration_context: Option<&str>) -> ModelRequest {
    let mut user = String::new();
    if let Some(context) = declaration_context {
        user.push_str(&format!("## Declaration\n{context}\n\n"));
    }
    user.push_str(&format!("## C code\n```c\n{}\n```", source.trim_end()));
    ModelRequest {
        template: Template::Summarize,
        system: SUMMARIZE_SYSTEM.to_string(),
        user,
    }
}

/// Inputs for the first-draft request, already rendered to text.
#[derive(Debug, Clone, Default)]
pub struct GenerateInputs<'a> {
    pub source: &'a str,
    pub hints: &'a str,
    pub examples: &'a str,
    pub summary: &'a str,
    pub declaration_context: Option<&'a str>,
    /// Already-translated upstream declarations (project mode).
    pub dependency_context: Option<&'a str>,
    pub constraints: &'a str,
}

pub fn generate_request(inputs: &GenerateInputs<'_>) -> ModelRequest {
    let mut user = format!(
        "## {}\n\n## Examples\n{}\n\n## {}\n",
        inputs.hints.trim_end(),
        inputs.examples.trim_end(),
        inputs.summary.trim()
    );
    push_context(&mut user, inputs.declaration_context, inputs.dependency_context);
    user.push_str(&format!(
        "\n## C code to translate\n```c\n{}\n```\n\n## Constraints\n{}",
        inputs.source.trim_end(),
        inputs.constraints
    ));
    ModelRequest {
        template: Template::Generate,
        system: GENERATE_SYSTEM.to_string(),
        user,
    }
}

/// `## Declaration` and `## Already translated` sections, when present.
fn push_context(user: &mut String, declaration: Option<&str>, dependencies: Option<&str>) {
    if let Some(context) = declaration {
        user.push_str(&format!("\n## Declaration\n{context}\n"));
    }
    if let Some(deps) = dependencies.filter(|d| !d.trim().is_empty()) {
        user.push_str(&format!(
            "\n## Already translated (reuse, do not redefine)\n{}\n",
            deps.trim_end()
        ));
    }
}

/// Inputs for a repair request: the original C, the failing candidate and
/// its rendered diagnostics.
#[derive(Debug, Clone, Default)]
pub struct RefineInputs<'a> {
    pub original: &'a str,
    pub previous: &'a str,
    pub diagnostics: &'a str,
    pub declaration_context: Option<&'a str>,
    pub dependency_context: Option<&'a str>,
    pub constraints: &'a str,
}

pub fn refine_request(inputs: &RefineInputs<'_>) -> ModelRequest {
    let mut user = format!(
        "## Original C code\n```c\n{}\n```\n",
        inputs.original.trim_end()
    );
    push_context(&mut user, inputs.declaration_context, inputs.dependency_context);
    user.push_str(&format!(
        "\n## Previous Rust attempt\n```rust\n{}\n```\n\n\
         ## Compiler errors\n{}\n\n## Constraints\n{}",
        inputs.previous.trim_end(),
        inputs.diagnostics.trim_end(),
        inputs.constraints
    ));
    ModelRequest {
        template: Template::Refine,
        system: REFINE_SYSTEM.to_string(),
        user,
    }
}
