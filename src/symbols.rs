//! A lightweight declaration outline used when no language server is around.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static DECLARATION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?:export\s+)?(?:default\s+)?(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?(?:unsafe\s+)?(fn|struct|enum|trait|impl|mod|class|def|function|interface|type)\s+([A-Za-z_$][\w$]*)",
    )
    .expect("Invalid regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Symbol {
    pub name: String,
    pub kind: String,
    /// 1-indexed line of the declaration.
    pub line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

pub fn outline(content: &str) -> Vec<Symbol> {
    content
        .lines()
        .enumerate()
        .filter_map(|(i, line)| {
            let cap = DECLARATION_REGEX.captures(line)?;
            Some(Symbol {
                name: cap[2].to_string(),
                kind: normalize_kind(&cap[1]).to_string(),
                line: i + 1,
                path: None,
            })
        })
        .collect()
}

fn normalize_kind(keyword: &str) -> &'static str {
    match keyword {
        "fn" | "def" | "function" => "function",
        "struct" | "class" => "class",
        "enum" => "enum",
        "trait" | "interface" => "interface",
        "impl" => "implementation",
        "mod" => "module",
        _ => "type",
    }
}
