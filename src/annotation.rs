//! Schema annotations embedded in YAML key comments.
//!
//! A key's leading comment may carry an explicit schema fragment between two
//! `# @schema` marker lines. Everything outside the block is description text.
//!
//! ```yaml
//! # @schema
//! # type: integer
//! # minimum: 1
//! # @schema
//! # Number of replicas.
//! replicas: 3
//! ```

use std::sync::LazyLock;

use regex::Regex;

use crate::error::AnnotationError;
use crate::schema::Schema;
use crate::types::{COMMENT_PREFIX, SCHEMA_MARKER};

static LEADING_PARAGRAPHS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)(?m)(?:.*\n{2,})+").expect("static regex must compile")
});

// helm-docs `@tag` lines, e.g. `@default -- 3` or `@ignored`.
static HELM_DOCS_TAGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?ms)(\r\n|\r|\n)?\s*@\w+(\s+--\s)?[^\n\r]*").expect("static regex must compile")
});

static HELM_DOCS_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^--\s?").expect("static regex must compile"));

/// Split a key comment into its annotation block and its description.
///
/// Returns the decoded schema fragment (all-default when the comment has no
/// block) and the description made of every line outside the block.
///
/// # Errors
///
/// Returns `AnnotationError::Unclosed` when the block is opened but never
/// closed, and `AnnotationError::InvalidYaml` when the block is not a valid
/// schema.
pub fn parse_comment(comment: &str) -> Result<(Schema, String), AnnotationError> {
    let mut description = Vec::new();
    let mut raw_schema = Vec::new();
    let mut inside = false;

    for line in comment.lines() {
        if line.trim_end() == SCHEMA_MARKER {
            inside = !inside;
            continue;
        }
        if inside {
            raw_schema.push(strip_comment_marker(line));
        } else {
            description.push(strip_comment_marker(line));
        }
    }

    if inside {
        return Err(AnnotationError::Unclosed {
            comment: comment.to_string(),
        });
    }

    let text = raw_schema.join("\n");
    let mut schema = if text.trim().is_empty() {
        Schema::default()
    } else {
        serde_yaml::from_str(&text).map_err(|source| AnnotationError::InvalidYaml { source })?
    };
    schema.has_data = !raw_schema.is_empty();

    Ok((schema, description.join("\n")))
}

/// Keep only the last paragraph of a comment.
///
/// Paragraphs are separated by one or more blank lines.
pub fn strip_leading_paragraphs(comment: &str) -> String {
    LEADING_PARAGRAPHS.replace_all(comment, "").into_owned()
}

/// Remove helm-docs `@tag` lines and `-- ` line prefixes from a description.
pub fn strip_helm_docs_tags(description: &str) -> String {
    let without_tags = HELM_DOCS_TAGS.replace_all(description, "");
    HELM_DOCS_PREFIX.replace_all(&without_tags, "").into_owned()
}

fn strip_comment_marker(line: &str) -> &str {
    let line = line.strip_prefix(COMMENT_PREFIX).unwrap_or(line);
    line.strip_prefix(' ').unwrap_or(line)
}
