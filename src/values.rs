//! Values document front-end.
//!
//! `serde_yaml` parses the document; it does not keep comments, so a second
//! line-oriented pass walks the block structure and records the comment lines
//! written directly above every mapping key. Both passes address a key by its
//! path (mapping keys and sequence indexes from the root).

use std::collections::HashMap;

use serde::Deserialize;
use serde_yaml::Value;

use crate::error::GenerateError;

/// Native type tag of a YAML node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag {
    Null,
    Bool,
    Str,
    Int,
    Float,
    Seq,
    Map,
    /// Explicit application tag, e.g. `!vault`.
    Other(String),
}

impl Tag {
    /// JSON Schema type name for values carrying this tag.
    ///
    /// # Errors
    ///
    /// Returns `GenerateError::UnsupportedTag` for application tags.
    pub fn schema_type(&self) -> Result<&'static str, GenerateError> {
        match self {
            Tag::Null => Ok("null"),
            Tag::Bool => Ok("boolean"),
            Tag::Str => Ok("string"),
            Tag::Int => Ok("integer"),
            Tag::Float => Ok("number"),
            Tag::Seq => Ok("array"),
            Tag::Map => Ok("object"),
            Tag::Other(tag) => Err(GenerateError::UnsupportedTag { tag: tag.clone() }),
        }
    }
}

/// A scalar with its tag and literal text. Null scalars have empty text.
#[derive(Debug, Clone, PartialEq)]
pub struct Scalar {
    pub tag: Tag,
    pub raw: String,
}

/// One `key: value` pair with the comment written above the key.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingEntry {
    pub key: String,
    pub comment: String,
    pub value: YamlNode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum YamlNode {
    /// A document wraps its content node.
    Document(Vec<YamlNode>),
    Mapping(Vec<MappingEntry>),
    Sequence(Vec<YamlNode>),
    Scalar(Scalar),
    /// `*anchor` reference, holding the anchored node.
    Alias(Box<YamlNode>),
}

impl YamlNode {
    /// Follow alias nodes to the node they point at.
    pub fn resolve_alias(&self) -> &YamlNode {
        match self {
            YamlNode::Alias(target) => target.resolve_alias(),
            node => node,
        }
    }

    /// JSON Schema type name for this node.
    ///
    /// # Errors
    ///
    /// Returns `GenerateError::UnsupportedTag` for scalars with application tags.
    pub fn schema_type(&self) -> Result<&'static str, GenerateError> {
        match self {
            YamlNode::Document(_) | YamlNode::Mapping(_) => Ok("object"),
            YamlNode::Sequence(_) => Ok("array"),
            YamlNode::Scalar(scalar) => scalar.tag.schema_type(),
            YamlNode::Alias(target) => target.schema_type(),
        }
    }
}

/// Parse a values document into a node tree with key comments attached.
///
/// An empty or null document is a document holding an empty mapping. A
/// stream with several documents yields one content node per document.
///
/// # Errors
///
/// Returns `GenerateError::InvalidYaml` if the text is not YAML, or
/// `GenerateError::UnsupportedKey` for sequence or mapping keys.
pub fn parse_values(source: &str) -> Result<YamlNode, GenerateError> {
    let mut documents = Vec::new();
    for document in serde_yaml::Deserializer::from_str(source) {
        let value =
            Value::deserialize(document).map_err(|source| GenerateError::InvalidYaml { source })?;
        documents.push(value);
    }

    let layout = scan_layout(source);
    let mut content = Vec::with_capacity(documents.len());
    for value in documents {
        if value.is_null() {
            content.push(YamlNode::Mapping(Vec::new()));
        } else {
            content.push(build_node(value, &mut Vec::new(), &layout)?);
        }
    }
    if content.is_empty() {
        content.push(YamlNode::Mapping(Vec::new()));
    }

    Ok(YamlNode::Document(content))
}

// serde_yaml has already expanded aliases; an aliased value takes its key
// comments from the anchored node.
fn build_node(
    value: Value,
    path: &mut Vec<String>,
    layout: &Layout,
) -> Result<YamlNode, GenerateError> {
    match layout.aliases.get(path.as_slice()) {
        Some(anchor) => {
            let mut anchor_path = anchor.clone();
            let node = build_value(value, &mut anchor_path, layout)?;
            Ok(YamlNode::Alias(Box::new(node)))
        }
        None => build_value(value, path, layout),
    }
}

fn build_value(
    value: Value,
    path: &mut Vec<String>,
    layout: &Layout,
) -> Result<YamlNode, GenerateError> {
    let node = match value {
        Value::Null => scalar(Tag::Null, String::new()),
        Value::Bool(b) => scalar(Tag::Bool, b.to_string()),
        Value::Number(n) => {
            let tag = if n.is_f64() { Tag::Float } else { Tag::Int };
            scalar(tag, n.to_string())
        }
        Value::String(s) => scalar(Tag::Str, s),
        Value::Sequence(items) => {
            let mut nodes = Vec::with_capacity(items.len());
            for (index, item) in items.into_iter().enumerate() {
                path.push(index.to_string());
                let node = build_node(item, path, layout);
                path.pop();
                nodes.push(node?);
            }
            YamlNode::Sequence(nodes)
        }
        Value::Mapping(mapping) => {
            let mut entries = Vec::with_capacity(mapping.len());
            for (key, value) in mapping {
                let key = key_text(key)?;
                path.push(key.clone());
                let comment = layout.comments.get(path.as_slice()).cloned();
                let value = build_node(value, path, layout);
                path.pop();
                entries.push(MappingEntry {
                    key,
                    comment: comment.unwrap_or_default(),
                    value: value?,
                });
            }
            YamlNode::Mapping(entries)
        }
        Value::Tagged(tagged) => scalar(
            Tag::Other(tagged.tag.to_string()),
            scalar_text(&tagged.value),
        ),
    };
    Ok(node)
}

fn scalar(tag: Tag, raw: String) -> YamlNode {
    YamlNode::Scalar(Scalar { tag, raw })
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => String::new(),
    }
}

fn key_text(key: Value) -> Result<String, GenerateError> {
    match key {
        Value::String(s) => Ok(s),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok("null".to_string()),
        Value::Tagged(tagged) => key_text(tagged.value),
        other => Err(GenerateError::UnsupportedKey {
            key: format!("{other:?}"),
        }),
    }
}

/// Comments and alias positions recovered from the raw text.
#[derive(Debug, Default)]
struct Layout {
    comments: HashMap<Vec<String>, String>,
    /// Path of the node carrying each `&anchor`, latest definition wins.
    anchors: HashMap<String, Vec<String>>,
    /// Alias path to the path of the anchored node it points at.
    aliases: HashMap<Vec<String>, Vec<String>>,
}

#[derive(Debug)]
enum Segment {
    Key(String),
    Index(usize),
}

#[derive(Debug)]
struct Frame {
    indent: usize,
    segment: Segment,
}

fn scan_layout(source: &str) -> Layout {
    let mut layout = Layout::default();
    let mut frames: Vec<Frame> = Vec::new();
    let mut pending: Vec<String> = Vec::new();
    let mut block_scalar: Option<usize> = None;
    let mut seen_content = false;

    for line in source.lines() {
        let indent = line.len() - line.trim_start_matches(' ').len();
        let text = line.trim();

        if let Some(parent) = block_scalar {
            if text.is_empty() || indent > parent {
                continue;
            }
            block_scalar = None;
        }

        if is_document_marker(line) {
            frames.clear();
            pending.clear();
            seen_content = false;
            continue;
        }
        if text.is_empty() {
            if !pending.is_empty() {
                pending.push(String::new());
            }
            continue;
        }
        if text.starts_with('#') {
            pending.push(text.to_string());
            continue;
        }
        if text.starts_with('%') {
            continue;
        }

        let comment = take_comment(&mut pending, seen_content);
        seen_content = true;

        let mut column = indent;
        let mut rest = &line[indent..];
        let mut entry_column = None;
        while let Some(after) = strip_entry_dash(rest) {
            let index = pop_for_entry(&mut frames, column);
            frames.push(Frame {
                indent: column,
                segment: Segment::Index(index),
            });
            entry_column = Some(column);
            column += rest.len() - after.len();
            rest = after;
        }

        match split_key(rest) {
            Some((key, value)) => {
                while frames.last().is_some_and(|frame| frame.indent >= column) {
                    frames.pop();
                }
                frames.push(Frame {
                    indent: column,
                    segment: Segment::Key(key),
                });
                let path = frame_path(&frames);
                if let Some(comment) = comment {
                    layout.comments.insert(path.clone(), comment);
                }
                inspect_value(value, column, path, &mut layout, &mut block_scalar);
            }
            None => {
                if let Some(entry_column) = entry_column {
                    let path = frame_path(&frames);
                    inspect_value(rest, entry_column, path, &mut layout, &mut block_scalar);
                }
            }
        }
    }

    layout
}

fn is_document_marker(line: &str) -> bool {
    ["---", "..."].iter().any(|marker| {
        line.strip_prefix(marker)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with([' ', '\t']))
    })
}

// A comment separated from its key by a blank line is not the key's comment.
// Before the first node, only the last paragraph belongs to the key; earlier
// ones describe the document.
fn take_comment(pending: &mut Vec<String>, seen_content: bool) -> Option<String> {
    let mut lines = std::mem::take(pending);
    if lines.last().is_some_and(String::is_empty) {
        return None;
    }
    if !seen_content {
        if let Some(blank) = lines.iter().rposition(String::is_empty) {
            lines.drain(..=blank);
        }
    }
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

fn strip_entry_dash(text: &str) -> Option<&str> {
    let after = text.strip_prefix('-')?;
    if after.is_empty() {
        Some(after)
    } else if after.starts_with([' ', '\t']) {
        Some(after.trim_start_matches([' ', '\t']))
    } else {
        None
    }
}

/// Pop frames that a sequence entry at `column` closes, returning the entry's index.
fn pop_for_entry(frames: &mut Vec<Frame>, column: usize) -> usize {
    while let Some(top) = frames.last() {
        if top.indent > column {
            frames.pop();
            continue;
        }
        if top.indent == column {
            if let Segment::Index(previous) = top.segment {
                frames.pop();
                return previous + 1;
            }
        }
        break;
    }
    0
}

fn frame_path(frames: &[Frame]) -> Vec<String> {
    frames
        .iter()
        .map(|frame| match &frame.segment {
            Segment::Key(key) => key.clone(),
            Segment::Index(index) => index.to_string(),
        })
        .collect()
}

fn inspect_value(
    value: &str,
    parent_column: usize,
    path: Vec<String>,
    layout: &mut Layout,
    block_scalar: &mut Option<usize>,
) {
    let mut value = value.trim();
    // anchors and tags may precede the value
    let mut anchor = None;
    while value.starts_with(['&', '!']) {
        let (token, rest) = value.split_once([' ', '\t']).unwrap_or((value, ""));
        if let Some(name) = token.strip_prefix('&') {
            anchor = Some(name.to_string());
        }
        value = rest.trim_start();
    }
    if let Some(name) = anchor {
        layout.anchors.insert(name, path.clone());
    }

    if let Some(alias) = value.strip_prefix('*') {
        let name = alias.split_whitespace().next().unwrap_or_default();
        let target = layout
            .anchors
            .get(name)
            .cloned()
            .unwrap_or_else(|| path.clone());
        layout.aliases.insert(path, target);
    } else if value.starts_with(['|', '>']) {
        *block_scalar = Some(parent_column);
    }
}

/// Split `key: value` into the key text and the value text.
fn split_key(text: &str) -> Option<(String, &str)> {
    let quote = text.chars().next()?;
    match quote {
        '"' | '\'' => {
            let close = closing_quote(text, quote)?;
            let key = unquote(&text[1..close], quote);
            let value = text[close + 1..].trim_start().strip_prefix(':')?;
            if value.is_empty() || value.starts_with([' ', '\t']) {
                Some((key, value))
            } else {
                None
            }
        }
        '#' | '{' | '[' | '?' | '|' | '>' | '*' | '&' | '!' => None,
        _ => {
            let mut from = 0;
            loop {
                let colon = from + text[from..].find(':')?;
                let value = &text[colon + 1..];
                if value.is_empty() || value.starts_with([' ', '\t']) {
                    let key = text[..colon].trim_end();
                    if key.contains(" #") {
                        return None;
                    }
                    return Some((key.to_string(), value));
                }
                from = colon + 1;
            }
        }
    }
}

fn closing_quote(text: &str, quote: char) -> Option<usize> {
    let bytes = text.as_bytes();
    let quote = quote as u8;
    let mut i = 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if quote == b'"' => i += 2,
            b if b == quote => {
                if quote == b'\'' && bytes.get(i + 1) == Some(&b'\'') {
                    i += 2;
                } else {
                    return Some(i);
                }
            }
            _ => i += 1,
        }
    }
    None
}

fn unquote(inner: &str, quote: char) -> String {
    if quote == '\'' {
        inner.replace("''", "'")
    } else {
        inner.replace("\\\"", "\"").replace("\\\\", "\\")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root_entries(node: &YamlNode) -> &[MappingEntry] {
        match node {
            YamlNode::Document(content) => match &content[0] {
                YamlNode::Mapping(entries) => entries,
                other => panic!("expected mapping, got {other:?}"),
            },
            other => panic!("expected document, got {other:?}"),
        }
    }

    fn entries(node: &YamlNode) -> &[MappingEntry] {
        match node.resolve_alias() {
            YamlNode::Mapping(entries) => entries,
            other => panic!("expected mapping, got {other:?}"),
        }
    }

    #[test]
    fn scalar_tags() {
        let doc = parse_values("s: text\ni: 3\nf: 1.5\nb: true\nn:\nt: 2024-01-01\n").unwrap();
        let tags: Vec<(&str, &Tag, &str)> = root_entries(&doc)
            .iter()
            .map(|e| match &e.value {
                YamlNode::Scalar(s) => (e.key.as_str(), &s.tag, s.raw.as_str()),
                other => panic!("expected scalar, got {other:?}"),
            })
            .collect();

        assert_eq!(
            tags,
            [
                ("s", &Tag::Str, "text"),
                ("i", &Tag::Int, "3"),
                ("f", &Tag::Float, "1.5"),
                ("b", &Tag::Bool, "true"),
                ("n", &Tag::Null, ""),
                ("t", &Tag::Str, "2024-01-01"),
            ]
        );
    }

    #[test]
    fn comments_attach_to_keys() {
        let source = "\
# Number of replicas
replicas: 3
image:
  # @schema
  # type: string
  # @schema
  tag: latest
  # pull policy
  pullPolicy: IfNotPresent
";
        let doc = parse_values(source).unwrap();
        let root = root_entries(&doc);
        assert_eq!(root[0].comment, "# Number of replicas");
        assert_eq!(root[1].comment, "");

        let image = entries(&root[1].value);
        assert_eq!(image[0].key, "tag");
        assert_eq!(image[0].comment, "# @schema\n# type: string\n# @schema");
        assert_eq!(image[1].comment, "# pull policy");
    }

    #[test]
    fn comment_paragraphs_are_kept() {
        let source = "a: 1\n# first\n\n# second\nb: 2\n";
        let doc = parse_values(source).unwrap();
        assert_eq!(root_entries(&doc)[1].comment, "# first\n\n# second");
    }

    #[test]
    fn document_comment_is_not_a_key_comment() {
        let source = "# chart values\n\n# the name\nname: x\n";
        let doc = parse_values(source).unwrap();
        assert_eq!(root_entries(&doc)[0].comment, "# the name");

        let detached = parse_values("# header\n\nname: x\n").unwrap();
        assert_eq!(root_entries(&detached)[0].comment, "");
    }

    #[test]
    fn comments_inside_sequences() {
        let source = "\
servers:
  - name: a
    # the port
    port: 80
  - name: b
    # second port
    port: 81
";
        let doc = parse_values(source).unwrap();
        let servers = match &root_entries(&doc)[0].value {
            YamlNode::Sequence(items) => items,
            other => panic!("expected sequence, got {other:?}"),
        };
        assert_eq!(entries(&servers[0])[1].comment, "# the port");
        assert_eq!(entries(&servers[1])[1].comment, "# second port");
    }

    #[test]
    fn compact_sequence_under_key() {
        let source = "list:\n- a: 1\n  # c\n  b: 2\nnext: 3\n";
        let doc = parse_values(source).unwrap();
        let root = root_entries(&doc);
        let YamlNode::Sequence(items) = &root[0].value else {
            panic!("expected sequence");
        };
        assert_eq!(entries(&items[0])[1].comment, "# c");
        assert_eq!(root[1].key, "next");
    }

    #[test]
    fn block_scalars_are_skipped() {
        let source = "\
script: |
  # not a comment
  key: not a key
# real comment
after: 1
";
        let doc = parse_values(source).unwrap();
        let root = root_entries(&doc);
        assert_eq!(root[0].comment, "");
        assert_eq!(root[1].comment, "# real comment");
    }

    #[test]
    fn quoted_keys() {
        let source = "# dotted\n\"a.b\": 1\n'it''s': 2\n";
        let doc = parse_values(source).unwrap();
        let root = root_entries(&doc);
        assert_eq!(root[0].key, "a.b");
        assert_eq!(root[0].comment, "# dotted");
        assert_eq!(root[1].key, "it's");
    }

    #[test]
    fn aliases_are_marked() {
        let source = "base: &base\n  a: 1\ncopy: *base\n";
        let doc = parse_values(source).unwrap();
        let root = root_entries(&doc);
        assert!(matches!(root[1].value, YamlNode::Alias(_)));
        assert_eq!(entries(&root[1].value)[0].key, "a");
    }

    #[test]
    fn aliases_carry_anchor_comments() {
        let source = "\
base: &base
  # @schema
  # minimum: 5
  # @schema
  port: 80
copy: *base
";
        let doc = parse_values(source).unwrap();
        let root = root_entries(&doc);
        let copied = entries(&root[1].value);
        assert_eq!(copied[0].key, "port");
        assert_eq!(copied[0].comment, "# @schema\n# minimum: 5\n# @schema");
    }

    #[test]
    fn alias_of_sequence_entry() {
        let source = "\
servers:
  - &primary
    # main port
    port: 80
backup: *primary
";
        let doc = parse_values(source).unwrap();
        let root = root_entries(&doc);
        assert!(matches!(root[1].value, YamlNode::Alias(_)));
        assert_eq!(entries(&root[1].value)[0].comment, "# main port");
    }

    #[test]
    fn custom_tags_are_reported() {
        let doc = parse_values("secret: !vault abc\n").unwrap();
        let root = root_entries(&doc);
        let err = root[0].value.schema_type().unwrap_err();
        assert!(matches!(err, GenerateError::UnsupportedTag { tag } if tag == "!vault"));
    }

    #[test]
    fn empty_document_is_empty_mapping() {
        for source in ["", "~\n", "# only a comment\n"] {
            let doc = parse_values(source).unwrap();
            assert_eq!(doc, YamlNode::Document(vec![YamlNode::Mapping(Vec::new())]));
        }
    }

    #[test]
    fn several_documents() {
        let doc = parse_values("a: 1\n---\nb: 2\n").unwrap();
        let YamlNode::Document(content) = doc else {
            panic!("expected document");
        };
        assert_eq!(content.len(), 2);
    }

    #[test]
    fn invalid_yaml() {
        let err = parse_values("a: [1, 2\n").unwrap_err();
        assert!(matches!(err, GenerateError::InvalidYaml { .. }));
    }
}
