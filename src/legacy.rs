//! helm-docs comment dialect.
//!
//! ```yaml
//! # -- (int) Number of replicas
//! # @default -- 3
//! replicas: 3
//! ```

use std::sync::LazyLock;

use regex::Regex;

static DESCRIPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*#\s*(.*)\s+--\s*(.*)$").expect("static regex must compile")
});

static RAW_FLAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*#\s+@raw").expect("static regex must compile"));

static CONTINUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*#(\s?)(.*)$").expect("static regex must compile"));

static DEFAULT_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*# @default -- (.*)$").expect("static regex must compile"));

static VALUE_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\((.*?)\)\s*(.*)$").expect("static regex must compile"));

static NOTATION_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*#\s+@notationType\s+--\s+(.*)$").expect("static regex must compile")
});

static SECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*# @section -- (.*)$").expect("static regex must compile"));

/// What a helm-docs comment says about a value. Empty fields were not given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HelmDocsComment {
    pub description: String,
    pub default: String,
    pub value_type: String,
}

/// Parse helm-docs comment lines.
///
/// Only the last group starting with `# --` counts; earlier lines belong to
/// other documentation.
pub fn parse_helm_docs_comment<S: AsRef<str>>(lines: &[S]) -> HelmDocsComment {
    let mut parsed = HelmDocsComment::default();

    let start = lines
        .iter()
        .rposition(|line| line.as_ref().starts_with("# --"))
        .unwrap_or(0);
    let lines = &lines[start..];

    let Some((first, captures)) = lines
        .iter()
        .enumerate()
        .find_map(|(i, line)| DESCRIPTION.captures(line.as_ref()).map(|c| (i, c)))
    else {
        return parsed;
    };
    parsed.description = captures[2].to_string();

    if let Some(typed) = VALUE_TYPE.captures(&parsed.description) {
        if !typed[1].is_empty() {
            parsed.value_type = typed[1].to_string();
            parsed.description = typed[2].to_string();
        }
    }

    let mut raw = false;
    for line in &lines[first + 1..] {
        let line = line.as_ref();

        if !raw && RAW_FLAG.is_match(line) {
            raw = true;
            continue;
        }
        if let Some(default) = DEFAULT_VALUE.captures(line) {
            parsed.default = default[1].to_string();
            continue;
        }
        if NOTATION_TYPE.is_match(line) || SECTION.is_match(line) {
            continue;
        }
        if let Some(continued) = CONTINUATION.captures(line) {
            let separator = if raw { "\n" } else { " " };
            parsed.description.push_str(separator);
            parsed.description.push_str(&continued[2]);
        }
    }

    parsed
}

/// Translate a helm-docs type name into a JSON Schema type.
pub fn helm_docs_type(name: &str) -> Option<&'static str> {
    match name {
        "int" => Some("integer"),
        "bool" => Some("boolean"),
        "float" => Some("number"),
        "list" => Some("array"),
        "map" => Some("object"),
        "string" => Some("string"),
        "object" => Some("object"),
        _ => None,
    }
}
