//! The schema tree: a typed, recursive JSON Schema node.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::types::{Required, SchemaType, CUSTOM_ANNOTATION_PREFIX};

/// Name → schema registry used for `definitions`.
pub type Definitions = IndexMap<String, Schema>;

/// `additionalProperties`: a boolean or a nested schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AdditionalProperties {
    Allowed(bool),
    Schema(Box<Schema>),
}

impl AdditionalProperties {
    pub fn as_schema_mut(&mut self) -> Option<&mut Schema> {
        match self {
            AdditionalProperties::Schema(schema) => Some(schema),
            AdditionalProperties::Allowed(_) => None,
        }
    }
}

/// Vendor keys (`x-…`) carried next to the typed fields.
///
/// Serialized inline at the top level of the owning schema object. Unknown
/// keys without the prefix are dropped when decoding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomAnnotations(IndexMap<String, Value>);

impl CustomAnnotations {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for CustomAnnotations {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter())
    }
}

impl<'de> Deserialize<'de> for CustomAnnotations {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut map = IndexMap::<String, Value>::deserialize(deserializer)?;
        map.retain(|key, _| key.starts_with(CUSTOM_ANNOTATION_PREFIX));
        Ok(CustomAnnotations(map))
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// A (partial) JSON Schema node.
///
/// Decoded from YAML annotation blocks and JSON schema files, serialized as
/// JSON. `has_data` is never serialized.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Schema {
    #[serde(rename = "$schema", skip_serializing_if = "String::is_empty")]
    pub schema: String,
    #[serde(rename = "$id", skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "$ref", skip_serializing_if = "String::is_empty")]
    pub reference: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "is_false")]
    pub deprecated: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub read_only: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub write_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<Value>,
    #[serde(rename = "const", skip_serializing_if = "Option::is_none")]
    pub constant: Option<Value>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enumeration: Option<Vec<Value>>,

    #[serde(rename = "type", skip_serializing_if = "SchemaType::is_unset")]
    pub schema_type: SchemaType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusive_minimum: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusive_maximum: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiple_of: Option<i64>,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub pattern: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_items: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items: Option<i64>,
    #[serde(skip_serializing_if = "is_false")]
    pub unique_items: bool,

    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, Schema>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub pattern_properties: IndexMap<String, Schema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<AdditionalProperties>,
    #[serde(skip_serializing_if = "Required::has_no_names")]
    pub required: Required,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub any_of: Vec<Schema>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub all_of: Vec<Schema>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub one_of: Vec<Schema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not: Option<Box<Schema>>,

    #[serde(rename = "if", skip_serializing_if = "Option::is_none")]
    pub if_schema: Option<Box<Schema>>,
    #[serde(rename = "then", skip_serializing_if = "Option::is_none")]
    pub then_schema: Option<Box<Schema>>,
    #[serde(rename = "else", skip_serializing_if = "Option::is_none")]
    pub else_schema: Option<Box<Schema>>,

    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub definitions: Definitions,

    #[serde(flatten)]
    pub custom_annotations: CustomAnnotations,

    /// Set when the node came from an explicit annotation rather than inference.
    #[serde(skip)]
    pub has_data: bool,
}

impl Schema {
    /// A node typed as `schema_type`, or an unconstrained node for `""`.
    pub fn new(schema_type: &str) -> Self {
        if schema_type.is_empty() {
            return Schema::default();
        }
        Schema {
            schema_type: SchemaType::single(schema_type),
            ..Schema::default()
        }
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Structural equality, ignoring `title` and `description`.
    ///
    /// Two definitions that differ only in prose describe the same thing.
    pub fn semantically_eq(&self, other: &Schema) -> bool {
        if self.pattern != other.pattern
            || self.format != other.format
            || self.deprecated != other.deprecated
            || self.read_only != other.read_only
            || self.write_only != other.write_only
            || self.unique_items != other.unique_items
            || self.reference != other.reference
        {
            return false;
        }

        if self.schema_type.names() != other.schema_type.names() {
            return false;
        }

        if self.minimum != other.minimum
            || self.maximum != other.maximum
            || self.exclusive_minimum != other.exclusive_minimum
            || self.exclusive_maximum != other.exclusive_maximum
            || self.multiple_of != other.multiple_of
            || self.min_length != other.min_length
            || self.max_length != other.max_length
            || self.min_items != other.min_items
            || self.max_items != other.max_items
        {
            return false;
        }

        if self.default != other.default || self.constant != other.constant {
            return false;
        }

        if self.enumeration.as_deref().unwrap_or_default()
            != other.enumeration.as_deref().unwrap_or_default()
            || self.examples != other.examples
        {
            return false;
        }

        maps_equal(&self.properties, &other.properties)
            && maps_equal(&self.definitions, &other.definitions)
            && maps_equal(&self.pattern_properties, &other.pattern_properties)
            && equals(self.items.as_deref(), other.items.as_deref())
            && equals(self.if_schema.as_deref(), other.if_schema.as_deref())
            && equals(self.then_schema.as_deref(), other.then_schema.as_deref())
            && equals(self.else_schema.as_deref(), other.else_schema.as_deref())
            && equals(self.not.as_deref(), other.not.as_deref())
            && lists_equal(&self.any_of, &other.any_of)
            && lists_equal(&self.all_of, &other.all_of)
            && lists_equal(&self.one_of, &other.one_of)
    }

    /// Collapse the per-property `required: true` shorthand into the parent's
    /// `required` list, bottom-up. Idempotent.
    pub fn fix_required_properties(&mut self) {
        if !self.properties.is_empty() {
            let mut flagged = Vec::new();
            for (name, prop) in self.properties.iter_mut() {
                prop.fix_required_properties();
                if prop.required.flag {
                    flagged.push(name.clone());
                }
            }
            for name in &flagged {
                self.required.insert(name);
            }
            if !self.schema_type.matches("object") {
                self.schema_type = SchemaType::single("object");
            }
        }

        for child in self.nested_mut() {
            child.fix_required_properties();
        }
    }

    /// Clear every `required` list and shorthand in this subtree.
    pub fn disable_required_properties(&mut self) {
        self.required = Required::default();
        for prop in self.properties.values_mut() {
            prop.disable_required_properties();
        }
        for child in self.nested_mut() {
            child.disable_required_properties();
        }
    }

    /// Move every `definitions` entry in this subtree into `out`, leaving the
    /// subtree without registries.
    pub fn drain_definitions(&mut self, out: &mut Vec<(String, Schema)>) {
        let own = std::mem::take(&mut self.definitions);
        for (name, mut definition) in own {
            let mut inner = Vec::new();
            definition.drain_definitions(&mut inner);
            out.push((name, definition));
            out.extend(inner);
        }

        for prop in self
            .properties
            .values_mut()
            .chain(self.pattern_properties.values_mut())
        {
            prop.drain_definitions(out);
        }
        for child in self.nested_mut() {
            child.drain_definitions(out);
        }
    }

    // Subschemas other than properties and patternProperties.
    fn nested_mut(&mut self) -> impl Iterator<Item = &mut Schema> + '_ {
        self.if_schema
            .as_deref_mut()
            .into_iter()
            .chain(self.then_schema.as_deref_mut())
            .chain(self.else_schema.as_deref_mut())
            .chain(self.items.as_deref_mut())
            .chain(
                self.additional_properties
                    .as_mut()
                    .and_then(AdditionalProperties::as_schema_mut),
            )
            .chain(self.any_of.iter_mut())
            .chain(self.all_of.iter_mut())
            .chain(self.one_of.iter_mut())
            .chain(self.not.as_deref_mut())
            .chain(self.definitions.values_mut())
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

/// Structural equality of two optional nodes: both absent is equal, exactly
/// one absent is not.
pub fn equals(a: Option<&Schema>, b: Option<&Schema>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.semantically_eq(b),
        _ => false,
    }
}

fn maps_equal(a: &IndexMap<String, Schema>, b: &IndexMap<String, Schema>) -> bool {
    a.len() == b.len()
        && a.iter()
            .all(|(key, schema)| b.get(key).is_some_and(|other| schema.semantically_eq(other)))
}

fn lists_equal(a: &[Schema], b: &[Schema]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.semantically_eq(y))
}
