//! Core types for schema generation: union-typed wrappers, skip flags and options.

use std::fmt;

use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{GenerateError, ValidateError};

/// Line that opens and closes an annotation block inside a key's comment.
pub const SCHEMA_MARKER: &str = "# @schema";

/// Native YAML comment marker.
pub const COMMENT_PREFIX: &str = "#";

/// Prefix of vendor keys kept in a schema's extension bag.
///
/// See <https://json-schema.org/blog/posts/custom-annotations-will-continue>.
pub const CUSTOM_ANNOTATION_PREFIX: &str = "x-";

/// `$schema` value written on the root of every generated document.
pub const DRAFT_07: &str = "http://json-schema.org/draft-07/schema#";

/// JSON pointer prefix of entries in a definitions registry.
pub const DEFINITIONS_POINTER: &str = "/definitions/";

/// Description of the synthesized `global` property.
pub const GLOBAL_DESCRIPTION: &str =
    "Global values are values that can be accessed from any chart or subchart by exactly the same name.";

/// Type names accepted in a `type` designator.
pub const PRIMITIVE_TYPES: &[&str] = &[
    "object", "string", "integer", "number", "array", "null", "boolean",
];

/// `format` values accepted by the validator.
pub const SUPPORTED_FORMATS: &[&str] = &[
    "date-time",
    "time",
    "date",
    "duration",
    "email",
    "idn-email",
    "hostname",
    "idn-hostname",
    "ipv4",
    "ipv6",
    "uuid",
    "uri",
    "uri-reference",
    "iri",
    "iri-reference",
    "uri-template",
    "json-pointer",
    "relative-json-pointer",
    "regex",
];

/// A `type` designator: one type name or an ordered list of them.
///
/// A YAML null inside the list decodes to the literal name `"null"`, so
/// `type: [string, null]` expresses a nullable string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaType(Vec<String>);

impl SchemaType {
    /// Single-name designator.
    pub fn single(name: impl Into<String>) -> Self {
        SchemaType(vec![name.into()])
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    /// True when the designator leaves the type unconstrained.
    ///
    /// An empty name anywhere in the list counts as unconstrained.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty() || self.0.iter().any(String::is_empty)
    }

    /// True when nothing would be serialized for this designator.
    pub fn is_unset(&self) -> bool {
        self.0.is_empty()
    }

    /// True when `name` is one of the listed types.
    pub fn matches(&self, name: &str) -> bool {
        self.0.iter().any(|t| t == name)
    }

    /// Check that only recognized primitive type names are used.
    pub fn validate(&self) -> Result<(), ValidateError> {
        match self
            .0
            .iter()
            .find(|t| !t.is_empty() && !PRIMITIVE_TYPES.contains(&t.as_str()))
        {
            Some(name) => Err(ValidateError::UnsupportedType { name: name.clone() }),
            None => Ok(()),
        }
    }
}

impl From<Vec<String>> for SchemaType {
    fn from(names: Vec<String>) -> Self {
        SchemaType(names)
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

impl Serialize for SchemaType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0.as_slice() {
            [single] => serializer.serialize_str(single),
            names => names.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for SchemaType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TypeVisitor;

        impl<'de> Visitor<'de> for TypeVisitor {
            type Value = SchemaType;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a type name or a list of type names")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(SchemaType::single(v))
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(SchemaType::default())
            }

            fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(SchemaType::default())
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut names = Vec::new();
                while let Some(name) = seq.next_element::<Option<String>>()? {
                    names.push(name.unwrap_or_else(|| "null".to_string()));
                }
                Ok(SchemaType(names))
            }
        }

        deserializer.deserialize_any(TypeVisitor)
    }
}

/// The `required` keyword in both of its accepted shapes.
///
/// `flag` is the per-property shorthand (`required: true` on a property means
/// "list me in my parent"); `names` is the standard list of required
/// property names. Only `names` is ever serialized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Required {
    pub flag: bool,
    pub names: Vec<String>,
}

impl Required {
    pub fn has_no_names(&self) -> bool {
        self.names.is_empty()
    }

    /// Append `name` unless it is already listed.
    pub fn insert(&mut self, name: &str) {
        if !self.names.iter().any(|n| n == name) {
            self.names.push(name.to_string());
        }
    }
}

impl Serialize for Required {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.names.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Required {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RequiredVisitor;

        impl<'de> Visitor<'de> for RequiredVisitor {
            type Value = Required;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a boolean or a list of property names")
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
                Ok(Required {
                    flag: v,
                    names: Vec::new(),
                })
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut required = Required::default();
                while let Some(name) = seq.next_element::<String>()? {
                    required.insert(&name);
                }
                Ok(required)
            }
        }

        deserializer.deserialize_any(RequiredVisitor)
    }
}

/// Which fields must not be filled in automatically.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkipAutoGeneration {
    pub schema_type: bool,
    pub title: bool,
    pub description: bool,
    pub required: bool,
    pub default: bool,
    pub additional_properties: bool,
}

impl SkipAutoGeneration {
    /// Build the skip flags from field names: `type`, `title`, `description`,
    /// `required`, `default` and `additionalProperties`.
    ///
    /// # Errors
    ///
    /// Returns `GenerateError::UnsupportedSkipField` listing every name that
    /// is not a skippable field.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, GenerateError> {
        let mut skip = SkipAutoGeneration::default();
        let mut unsupported = Vec::new();

        for name in names {
            match name.as_ref() {
                "type" => skip.schema_type = true,
                "title" => skip.title = true,
                "description" => skip.description = true,
                "required" => skip.required = true,
                "default" => skip.default = true,
                "additionalProperties" => skip.additional_properties = true,
                other => unsupported.push(other.to_string()),
            }
        }

        if unsupported.is_empty() {
            Ok(skip)
        } else {
            Err(GenerateError::UnsupportedSkipField { names: unsupported })
        }
    }
}

/// Options for schema generation.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Keep every paragraph of a key's comment instead of only the last one.
    pub keep_full_comment: bool,
    /// Also read helm-docs style `# --` comments.
    pub helm_docs_compatibility: bool,
    /// Remove helm-docs `@tag` lines and `-- ` prefixes from descriptions.
    pub strip_helm_docs_prefix: bool,
    /// Synthesize a `global` property when the values file has none.
    pub add_global: bool,
    /// Fetch `$ref` URLs over HTTP.
    pub resolve_remote: bool,
    pub skip_auto_generation: SkipAutoGeneration,
    /// Clear every `required` list in the finished document.
    pub disable_required_properties: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            keep_full_comment: false,
            helm_docs_compatibility: false,
            strip_helm_docs_prefix: true,
            add_global: true,
            resolve_remote: false,
            skip_auto_generation: SkipAutoGeneration::default(),
            disable_required_properties: false,
        }
    }
}

impl GenerateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keep_full_comment(mut self, keep: bool) -> Self {
        self.keep_full_comment = keep;
        self
    }

    pub fn helm_docs_compatibility(mut self, enabled: bool) -> Self {
        self.helm_docs_compatibility = enabled;
        self
    }

    pub fn strip_helm_docs_prefix(mut self, strip: bool) -> Self {
        self.strip_helm_docs_prefix = strip;
        self
    }

    pub fn add_global(mut self, add: bool) -> Self {
        self.add_global = add;
        self
    }

    pub fn resolve_remote(mut self, resolve: bool) -> Self {
        self.resolve_remote = resolve;
        self
    }

    pub fn skip_auto_generation(mut self, skip: SkipAutoGeneration) -> Self {
        self.skip_auto_generation = skip;
        self
    }

    pub fn disable_required_properties(mut self, disable: bool) -> Self {
        self.disable_required_properties = disable;
        self
    }
}
