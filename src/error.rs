//! Error types for schema generation, reference resolution and validation.

use std::path::PathBuf;
use thiserror::Error;

/// Errors while reading a key's comment.
#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error("unclosed schema block found in comment: {comment}")]
    Unclosed { comment: String },

    #[error("invalid schema annotation: {source}")]
    InvalidYaml {
        #[source]
        source: serde_yaml::Error,
    },
}

/// Errors while resolving `$ref` values.
#[derive(Debug, Error)]
pub enum ResolveError {
    // IO errors (exit code 3)
    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    // Parse errors (exit code 2)
    #[error("invalid JSON schema in {path}: {source}")]
    InvalidJson {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("fragment not found: {fragment} in {path}")]
    FragmentNotFound { fragment: String, path: String },
}

impl ResolveError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            ResolveError::ReadError { .. } | ResolveError::Fetch { .. } => 3,
            _ => 2,
        }
    }
}

/// A violated schema rule. Validation stops at the first one found.
#[derive(Debug, Error)]
pub enum ValidateError {
    #[error("invalid schema syntax: {message}")]
    InvalidSyntax { message: String },

    #[error("unsupported type {name}")]
    UnsupportedType { name: String },

    #[error("cannot use both 'const' and 'type' in the same schema")]
    ConstWithType,

    #[error("cannot use both 'enum' and 'type' in the same schema")]
    EnumWithType,

    #[error("numeric constraints can only be used with number or integer types, got {types}")]
    NumericConstraintType { types: String },

    #[error("multipleOf must be greater than 0")]
    MultipleOfNotPositive,

    #[error("cannot use both minimum and exclusiveMinimum")]
    MinimumWithExclusive,

    #[error("cannot use both maximum and exclusiveMaximum")]
    MaximumWithExclusive,

    #[error("format can only be used with string type, got {types}")]
    FormatType { types: String },

    #[error("unsupported format: {format}")]
    UnsupportedFormat { format: String },

    #[error("pattern can only be used with string type, got {types}")]
    PatternType { types: String },

    #[error("cannot use both format and pattern in the same schema")]
    FormatWithPattern,

    #[error("minLength ({min}) cannot be greater than maxLength ({max})")]
    LengthRange { min: i64, max: i64 },

    #[error("items can only be used with array type, got {types}")]
    ItemsType { types: String },

    #[error("invalid items schema: {source}")]
    InvalidItems {
        #[source]
        source: Box<ValidateError>,
    },

    #[error("minItems/maxItems can only be used with array type, got {types}")]
    ItemCountType { types: String },

    #[error("maxItems ({max}) cannot be less than minItems ({min})")]
    ItemCountRange { min: i64, max: i64 },
}

/// Errors that abort a generation run.
#[derive(Debug, Error)]
pub enum GenerateError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Structural errors (exit code 2)
    #[error("invalid YAML: {source}")]
    InvalidYaml {
        #[source]
        source: serde_yaml::Error,
    },

    #[error("strange yaml document found: expected exactly one root node, got {count}")]
    MalformedDocument { count: usize },

    #[error("strange yaml document found: expected a document node")]
    NotADocument,

    #[error("unsupported mapping key: {key}")]
    UnsupportedKey { key: String },

    #[error("error while parsing comment of key {key}: {source}")]
    Comment {
        key: String,
        #[source]
        source: AnnotationError,
    },

    #[error("error while validating jsonschema of key {key}: {source}")]
    InvalidKeySchema {
        key: String,
        #[source]
        source: ValidateError,
    },

    #[error("unsupported yaml tag found: {tag}")]
    UnsupportedTag { tag: String },

    #[error("invalid pattern '{pattern}' in patternProperties: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("definition conflict: '{name}' has different definitions in multiple schema files")]
    DefinitionConflict { name: String },

    #[error("unsupported field names '{}' for skipping auto-generation", names.join("', '"))]
    UnsupportedSkipField { names: Vec<String> },

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("generated schema is invalid: {0}")]
    Invalid(#[from] ValidateError),
}

impl GenerateError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            GenerateError::FileNotFound { .. } | GenerateError::ReadError { .. } => 3,
            GenerateError::Resolve(e) => e.exit_code(),
            _ => 2,
        }
    }
}
