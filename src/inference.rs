//! Schema inference from an annotated values tree.

use std::path::Path;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::annotation::{parse_comment, strip_helm_docs_tags, strip_leading_paragraphs};
use crate::error::GenerateError;
use crate::legacy::{helm_docs_type, parse_helm_docs_comment};
use crate::resolver::RefResolver;
use crate::schema::{AdditionalProperties, Definitions, Schema};
use crate::types::{GenerateOptions, SchemaType, DRAFT_07, GLOBAL_DESCRIPTION};
use crate::validator::{validate, validate_syntax};
use crate::values::{parse_values, MappingEntry, YamlNode};

/// Generate the schema of a values file.
///
/// # Errors
///
/// Returns `GenerateError` if the file can't be read, isn't valid YAML, or
/// yields an invalid schema.
pub fn generate(values_path: &Path, options: &GenerateOptions) -> Result<Schema, GenerateError> {
    if !values_path.exists() {
        return Err(GenerateError::FileNotFound {
            path: values_path.to_path_buf(),
        });
    }
    let source =
        std::fs::read_to_string(values_path).map_err(|source| GenerateError::ReadError {
            path: values_path.to_path_buf(),
            source,
        })?;

    generate_from_str(&source, &values_path.to_string_lossy(), options)
}

/// Generate a schema from values text.
///
/// `locator` is the path relative `$ref`s are resolved against.
///
/// # Errors
///
/// Returns `GenerateError` if the text isn't valid YAML or yields an invalid
/// schema.
pub fn generate_from_str(
    source: &str,
    locator: &str,
    options: &GenerateOptions,
) -> Result<Schema, GenerateError> {
    let mut resolver = RefResolver::new(options.resolve_remote);
    generate_with(source, locator, options, &mut resolver)
}

/// Generate a schema using a caller-provided resolver.
///
/// # Errors
///
/// See [`generate_from_str`].
pub fn generate_with(
    source: &str,
    locator: &str,
    options: &GenerateOptions,
    resolver: &mut RefResolver,
) -> Result<Schema, GenerateError> {
    let document = parse_values(source)?;

    let mut schema = Inference::new(options, locator, resolver).infer_document(&document)?;

    schema.fix_required_properties();
    if options.disable_required_properties {
        schema.disable_required_properties();
    }

    validate_syntax(&schema)?;
    Ok(schema)
}

/// Walks a values tree and builds its schema.
///
/// Holds the root definitions registry that `$ref` resolution fills while
/// the walk goes on.
pub struct Inference<'a> {
    options: &'a GenerateOptions,
    locator: &'a str,
    resolver: &'a mut RefResolver,
    definitions: Definitions,
}

impl<'a> Inference<'a> {
    pub fn new(
        options: &'a GenerateOptions,
        locator: &'a str,
        resolver: &'a mut RefResolver,
    ) -> Self {
        Self {
            options,
            locator,
            resolver,
            definitions: Definitions::new(),
        }
    }

    /// Build the root schema of a document node.
    ///
    /// # Errors
    ///
    /// Returns `GenerateError::NotADocument` for any other node kind,
    /// `GenerateError::MalformedDocument` unless the document holds exactly
    /// one node, or any error from inferring its keys.
    pub fn infer_document(mut self, node: &YamlNode) -> Result<Schema, GenerateError> {
        let skip = self.options.skip_auto_generation;
        let YamlNode::Document(content) = node else {
            return Err(GenerateError::NotADocument);
        };
        let [child] = content.as_slice() else {
            return Err(GenerateError::MalformedDocument {
                count: content.len(),
            });
        };

        let mut root = Schema::new("object");
        root.schema = DRAFT_07.to_string();

        let mut required = Vec::new();
        let content_schema = self.infer(child, &mut required)?;
        root.properties = content_schema.properties;
        root.required.names = required;

        if self.options.add_global && !root.properties.contains_key("global") {
            let mut global = Schema::new("object");
            if !skip.title {
                global.title = "global".to_string();
            }
            if !skip.description {
                global.description = GLOBAL_DESCRIPTION.to_string();
            }
            root.properties.insert("global".to_string(), global);
        }

        if !skip.additional_properties {
            root.additional_properties = Some(AdditionalProperties::Allowed(false));
        }

        root.definitions = std::mem::take(&mut self.definitions);
        Ok(root)
    }

    fn infer(
        &mut self,
        node: &YamlNode,
        parent_required: &mut Vec<String>,
    ) -> Result<Schema, GenerateError> {
        match node {
            YamlNode::Mapping(entries) => {
                let mut schema = Schema::new("object");
                for entry in entries {
                    let property = self.infer_entry(entry, parent_required)?;
                    schema.properties.insert(entry.key.clone(), property);
                }
                Ok(schema)
            }
            YamlNode::Alias(target) => self.infer(target, parent_required),
            YamlNode::Sequence(_) => Ok(Schema::new("array")),
            YamlNode::Scalar(scalar) => Ok(Schema::new(scalar.tag.schema_type()?)),
            YamlNode::Document(_) => Ok(Schema::new("object")),
        }
    }

    fn infer_entry(
        &mut self,
        entry: &MappingEntry,
        parent_required: &mut Vec<String>,
    ) -> Result<Schema, GenerateError> {
        let options = self.options;
        let skip = options.skip_auto_generation;
        let key = entry.key.as_str();
        let value = entry.value.resolve_alias();

        let comment = if options.keep_full_comment {
            entry.comment.clone()
        } else {
            strip_leading_paragraphs(&entry.comment)
        };
        let (mut schema, mut description) =
            parse_comment(&comment).map_err(|source| GenerateError::Comment {
                key: key.to_string(),
                source,
            })?;

        if options.helm_docs_compatibility {
            apply_helm_docs(&mut schema, &entry.comment);
        }

        if options.strip_helm_docs_prefix {
            description = strip_helm_docs_tags(&description);
        }

        if !schema.reference.is_empty() || !schema.pattern_properties.is_empty() {
            let found = self
                .resolver
                .resolve(&mut schema, self.locator, &mut self.definitions)?;
            self.merge_definitions(found)?;
        }

        if schema.has_data {
            validate(&schema).map_err(|source| GenerateError::InvalidKeySchema {
                key: key.to_string(),
                source,
            })?;
        } else if !skip.schema_type {
            schema.schema_type = SchemaType::single(value.schema_type()?);
        }

        // A referenced schema is complete as it is.
        if !schema.reference.is_empty() {
            return Ok(schema);
        }

        let auto_required =
            schema.required.names.is_empty() && !skip.required && !schema.has_data;
        if (schema.required.flag || auto_required) && !parent_required.iter().any(|k| k == key) {
            parent_required.push(key.to_string());
        }

        let is_mapping = matches!(value, YamlNode::Mapping(_));
        if !skip.additional_properties
            && is_mapping
            && (!schema.has_data || schema.additional_properties.is_none())
        {
            schema.additional_properties = Some(AdditionalProperties::Allowed(false));
        }

        if schema.title.is_empty() && !skip.title {
            schema.title = key.to_string();
        }
        if schema.description.is_empty() && !skip.description {
            schema.description = description;
        }
        if !skip.default && schema.default.is_none() {
            if let YamlNode::Scalar(scalar) = value {
                schema.default = Some(cast_default(&scalar.raw, &schema.schema_type));
            }
        }

        match value {
            YamlNode::Mapping(children) if schema.properties.is_empty() => {
                let mut generated = self.infer(value, &mut schema.required.names)?;
                let patterns = compile_patterns(&schema, children)?;
                for child in children {
                    if patterns.iter().any(|p| p.is_match(&child.key)) {
                        debug!(key = %child.key, "governed by patternProperties");
                        continue;
                    }
                    if let Some(property) = generated.properties.shift_remove(&child.key) {
                        schema.properties.insert(child.key.clone(), property);
                    }
                }
            }
            YamlNode::Sequence(items) if schema.items.is_none() => {
                let mut union = Schema::default();
                for item in items {
                    let item = item.resolve_alias();
                    if let YamlNode::Scalar(scalar) = item {
                        union.any_of.push(Schema::new(scalar.tag.schema_type()?));
                        continue;
                    }

                    let mut item_required = Vec::new();
                    let mut item_schema = self.infer(item, &mut item_required)?;
                    item_schema.required.names.extend(item_required);
                    if !skip.additional_properties
                        && matches!(item, YamlNode::Mapping(_))
                        && (!item_schema.has_data || item_schema.additional_properties.is_none())
                    {
                        item_schema.additional_properties =
                            Some(AdditionalProperties::Allowed(false));
                    }
                    union.any_of.push(item_schema);
                }
                schema.items = Some(Box::new(union));

                // Nested items only mark themselves with the `required: true`
                // shorthand; turn that into lists now.
                schema.fix_required_properties();
            }
            _ => {}
        }

        Ok(schema)
    }

    fn merge_definitions(&mut self, found: Vec<(String, Schema)>) -> Result<(), GenerateError> {
        for (name, definition) in found {
            match self.definitions.get(&name) {
                Some(existing) if !existing.semantically_eq(&definition) => {
                    return Err(GenerateError::DefinitionConflict { name });
                }
                Some(_) => debug!(definition = %name, "identical definition already registered"),
                None => {
                    self.definitions.insert(name, definition);
                }
            }
        }
        Ok(())
    }
}

fn apply_helm_docs(schema: &mut Schema, comment: &str) {
    let lines: Vec<&str> = comment.lines().collect();
    let parsed = parse_helm_docs_comment(&lines);

    if !parsed.default.is_empty() && schema.default.is_none() {
        schema.default = Some(Value::String(parsed.default));
        schema.has_data = true;
    }
    if !parsed.description.is_empty() && schema.description.is_empty() {
        schema.description = parsed.description;
        schema.has_data = true;
    }
    if !parsed.value_type.is_empty() {
        match helm_docs_type(&parsed.value_type) {
            Some(name) => {
                if schema.schema_type.is_unset() {
                    schema.schema_type = SchemaType::single(name);
                }
                schema.has_data = true;
            }
            None => warn!(
                value_type = %parsed.value_type,
                "can't translate helm-docs type to a schema type"
            ),
        }
    }
}

fn compile_patterns(
    schema: &Schema,
    children: &[MappingEntry],
) -> Result<Vec<Regex>, GenerateError> {
    if children.is_empty() {
        return Ok(Vec::new());
    }
    schema
        .pattern_properties
        .keys()
        .map(|pattern| {
            Regex::new(pattern).map_err(|source| GenerateError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })
        })
        .collect()
}

/// Convert a scalar's literal text to the first listed type it parses as.
///
/// Falls back to the text itself.
fn cast_default(raw: &str, schema_type: &SchemaType) -> Value {
    for name in schema_type.names() {
        match name.as_str() {
            "boolean" => match raw {
                "true" => return Value::Bool(true),
                "false" => return Value::Bool(false),
                _ => {}
            },
            "integer" => {
                if let Ok(v) = raw.parse::<i64>() {
                    return Value::from(v);
                }
            }
            "number" => {
                if let Some(v) = raw
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                {
                    return Value::Number(v);
                }
            }
            _ => {}
        }
    }
    Value::String(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidateError;
    use crate::types::SkipAutoGeneration;
    use crate::values::{Scalar, Tag};
    use serde_json::json;

    fn infer(source: &str) -> Schema {
        infer_with(source, &GenerateOptions::new())
    }

    fn infer_with(source: &str, options: &GenerateOptions) -> Schema {
        generate_from_str(source, "values.yaml", options).unwrap()
    }

    fn to_value(schema: &Schema) -> Value {
        serde_json::to_value(schema).unwrap()
    }

    #[test]
    fn bare_scalar_key() {
        let schema = infer("foo: bar\n");
        let foo = &schema.properties["foo"];

        assert_eq!(foo.schema_type.names(), ["string"]);
        assert_eq!(foo.title, "foo");
        assert_eq!(foo.default, Some(json!("bar")));
        assert_eq!(schema.required.names, ["foo"]);
    }

    #[test]
    fn root_shape() {
        let value = to_value(&infer("foo: bar\n"));
        assert_eq!(value["$schema"], DRAFT_07);
        assert_eq!(value["type"], "object");
        assert_eq!(value["additionalProperties"], false);
        assert_eq!(value["properties"]["global"]["type"], "object");
        assert_eq!(value["properties"]["global"]["title"], "global");
        assert_eq!(value["properties"]["global"]["description"], GLOBAL_DESCRIPTION);
    }

    #[test]
    fn sequence_items_union() {
        let schema = infer("list: [1, \"a\"]\n");
        let items = to_value(schema.properties["list"].items.as_ref().unwrap());
        assert_eq!(
            items,
            json!({ "anyOf": [{ "type": "integer" }, { "type": "string" }] })
        );
    }

    #[test]
    fn typed_defaults() {
        let schema = infer("b: true\ni: 42\nf: 1.5\nn:\n");
        assert_eq!(schema.properties["b"].default, Some(json!(true)));
        assert_eq!(schema.properties["i"].default, Some(json!(42)));
        assert_eq!(schema.properties["f"].default, Some(json!(1.5)));
        assert_eq!(schema.properties["n"].schema_type.names(), ["null"]);
        assert_eq!(schema.properties["n"].default, Some(json!("")));
    }

    #[test]
    fn nested_mapping() {
        let schema = infer("image:\n  repository: nginx\n  tag: latest\n");
        let image = &schema.properties["image"];

        assert_eq!(image.schema_type.names(), ["object"]);
        assert!(matches!(
            image.additional_properties,
            Some(AdditionalProperties::Allowed(false))
        ));
        assert_eq!(image.required.names, ["repository", "tag"]);
        assert!(image.default.is_none());
        assert_eq!(image.properties["tag"].default, Some(json!("latest")));
    }

    #[test]
    fn annotation_overrides_inference() {
        let source = "\
# @schema
# type: integer
# minimum: 1
# @schema
# Number of replicas
replicas: 3
";
        let schema = infer(source);
        let replicas = &schema.properties["replicas"];

        assert_eq!(replicas.schema_type.names(), ["integer"]);
        assert_eq!(replicas.minimum, Some(1));
        assert_eq!(replicas.description, "Number of replicas");
        assert_eq!(replicas.default, Some(json!(3)));
        // explicit annotations opt out of the required default
        assert!(schema.required.names.is_empty());
    }

    #[test]
    fn required_shorthand() {
        let source = "\
# @schema
# type: string
# required: true
# @schema
name: app
";
        let schema = infer(source);
        assert_eq!(schema.required.names, ["name"]);
    }

    #[test]
    fn invalid_annotation_names_key() {
        let source = "\
# @schema
# type: string
# const: x
# @schema
name: app
";
        let err = generate_from_str(source, "values.yaml", &GenerateOptions::new()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "error while validating jsonschema of key name: cannot use both 'const' and 'type' in the same schema"
        );
    }

    #[test]
    fn unclosed_annotation_names_key() {
        let err = generate_from_str("# @schema\nname: app\n", "values.yaml", &GenerateOptions::new())
            .unwrap_err();
        assert!(matches!(err, GenerateError::Comment { ref key, .. } if key == "name"));
    }

    #[test]
    fn custom_tag_is_rejected() {
        let err = generate_from_str("secret: !vault abc\n", "values.yaml", &GenerateOptions::new())
            .unwrap_err();
        assert_eq!(err.to_string(), "unsupported yaml tag found: !vault");
    }

    #[test]
    fn multiple_documents_are_malformed() {
        let err = generate_from_str("a: 1\n---\nb: 2\n", "values.yaml", &GenerateOptions::new())
            .unwrap_err();
        assert!(matches!(err, GenerateError::MalformedDocument { count: 2 }));
    }

    #[test]
    fn only_document_nodes_are_accepted() {
        let options = GenerateOptions::new();
        let mut resolver = RefResolver::new(false);
        let node = YamlNode::Scalar(Scalar {
            tag: Tag::Str,
            raw: "bar".to_string(),
        });

        let err = Inference::new(&options, "values.yaml", &mut resolver)
            .infer_document(&node)
            .unwrap_err();
        assert!(matches!(err, GenerateError::NotADocument));

        let document = parse_values("foo: bar\n").unwrap();
        let schema = Inference::new(&options, "values.yaml", &mut resolver)
            .infer_document(&document)
            .unwrap();
        assert!(schema.properties.contains_key("foo"));
    }

    #[test]
    fn empty_document() {
        let schema = infer("");
        assert_eq!(schema.properties.keys().collect::<Vec<_>>(), ["global"]);
    }

    #[test]
    fn pattern_properties_govern_matching_keys() {
        let source = "\
# @schema
# patternProperties:
#   \"^svc-\":
#     type: object
# @schema
services:
  svc-a:
    port: 80
  other: 1
";
        let schema = infer(source);
        let services = &schema.properties["services"];
        assert!(services.pattern_properties.contains_key("^svc-"));
        assert!(!services.properties.contains_key("svc-a"));
        assert!(services.properties.contains_key("other"));
    }

    #[test]
    fn malformed_pattern_fails_key_validation() {
        let source = "\
# @schema
# patternProperties:
#   \"[\":
#     type: string
# @schema
services:
  a: 1
";
        let err = generate_from_str(source, "values.yaml", &GenerateOptions::new()).unwrap_err();
        assert!(matches!(
            err,
            GenerateError::InvalidKeySchema {
                ref key,
                source: ValidateError::InvalidSyntax { .. },
            } if key == "services"
        ));
    }

    #[test]
    fn pattern_unsupported_by_regex_engine_is_fatal() {
        // valid ECMA-262, but lookaround is not supported by `regex`
        let source = "\
# @schema
# patternProperties:
#   \"^(?=a)\":
#     type: string
# @schema
services:
  a: 1
";
        let err = generate_from_str(source, "values.yaml", &GenerateOptions::new()).unwrap_err();
        assert!(matches!(err, GenerateError::InvalidPattern { ref pattern, .. } if pattern == "^(?=a)"));
    }

    #[test]
    fn sequence_of_mappings() {
        let source = "\
servers:
  - host: a
    port: 80
";
        let schema = infer(source);
        let items = schema.properties["servers"].items.as_ref().unwrap();
        let server = &items.any_of[0];

        assert_eq!(server.schema_type.names(), ["object"]);
        assert_eq!(server.required.names, ["host", "port"]);
        assert!(matches!(
            server.additional_properties,
            Some(AdditionalProperties::Allowed(false))
        ));
    }

    #[test]
    fn alias_values_follow_anchor() {
        let schema = infer("base: &base\n  a: 1\ncopy: *base\n");
        let copy = &schema.properties["copy"];
        assert_eq!(copy.schema_type.names(), ["object"]);
        assert!(copy.properties.contains_key("a"));
    }

    #[test]
    fn alias_keeps_anchor_annotations() {
        let source = "\
base: &base
  # @schema
  # type: integer
  # minimum: 5
  # @schema
  port: 80
copy: *base
";
        let schema = infer(source);
        for key in ["base", "copy"] {
            let port = &schema.properties[key].properties["port"];
            assert_eq!(port.minimum, Some(5), "{key}");
            assert!(port.required.names.is_empty());
            assert!(schema.properties[key].required.names.is_empty(), "{key}");
        }
    }

    #[test]
    fn skip_auto_generation() {
        let skip = SkipAutoGeneration::from_names(&[
            "title",
            "description",
            "default",
            "required",
            "additionalProperties",
        ])
        .unwrap();
        let options = GenerateOptions::new().skip_auto_generation(skip);
        let schema = infer_with("# text\nfoo:\n  bar: 1\n", &options);

        let foo = &schema.properties["foo"];
        assert!(foo.title.is_empty());
        assert!(foo.description.is_empty());
        assert!(foo.additional_properties.is_none());
        assert!(foo.properties["bar"].default.is_none());
        assert!(schema.required.names.is_empty());
        assert!(schema.additional_properties.is_none());
        assert!(schema.properties["global"].title.is_empty());
    }

    #[test]
    fn skip_type_leaves_type_unset() {
        let skip = SkipAutoGeneration::from_names(&["type"]).unwrap();
        let options = GenerateOptions::new().skip_auto_generation(skip);
        let schema = infer_with("foo: bar\n", &options);
        assert!(schema.properties["foo"].schema_type.is_unset());
        assert_eq!(schema.properties["foo"].default, Some(json!("bar")));
    }

    #[test]
    fn dont_add_global() {
        let schema = infer_with("foo: bar\n", &GenerateOptions::new().add_global(false));
        assert!(!schema.properties.contains_key("global"));
    }

    #[test]
    fn existing_global_is_kept() {
        let schema = infer("global:\n  region: eu\n");
        assert!(schema.properties["global"].properties.contains_key("region"));
    }

    #[test]
    fn disable_required() {
        let options = GenerateOptions::new().disable_required_properties(true);
        let value = to_value(&infer_with("a:\n  b: 1\n", &options));
        assert!(value.get("required").is_none());
        assert!(value["properties"]["a"].get("required").is_none());
    }

    #[test]
    fn full_comment_keeps_paragraphs() {
        let source = "x: 1\n# intro\n\n# detail\ny: 2\n";

        let schema = infer(source);
        assert_eq!(schema.properties["y"].description, "detail");

        let schema = infer_with(source, &GenerateOptions::new().keep_full_comment(true));
        assert_eq!(schema.properties["y"].description, "intro\n\ndetail");
    }

    #[test]
    fn helm_docs_comment() {
        let source = "\
# -- (int) Number of replicas
# @default -- 2
replicas: 3
";
        let options = GenerateOptions::new().helm_docs_compatibility(true);
        let schema = infer_with(source, &options);
        let replicas = &schema.properties["replicas"];

        assert_eq!(replicas.schema_type.names(), ["integer"]);
        assert_eq!(replicas.description, "Number of replicas");
        assert_eq!(replicas.default, Some(json!("2")));
    }

    #[test]
    fn helm_docs_prefix_is_stripped_by_default() {
        let schema = infer("# -- The image tag\ntag: latest\n");
        assert_eq!(schema.properties["tag"].description, "The image tag");

        let options = GenerateOptions::new().strip_helm_docs_prefix(false);
        let schema = infer_with("# -- The image tag\ntag: latest\n", &options);
        assert_eq!(schema.properties["tag"].description, "-- The image tag");
    }

    #[test]
    fn unknown_helm_docs_type_only_warns() {
        let options = GenerateOptions::new().helm_docs_compatibility(true);
        let schema = infer_with("# -- (tpl) A template\nname: x\n", &options);
        assert!(schema.properties["name"].schema_type.is_unset());
        assert_eq!(schema.properties["name"].description, "A template");
    }

    #[test]
    fn cast_default_falls_back_to_text() {
        let int = SchemaType::single("integer");
        assert_eq!(cast_default("12", &int), json!(12));
        assert_eq!(cast_default("12a", &int), json!("12a"));

        let union = SchemaType::from(vec!["boolean".to_string(), "number".to_string()]);
        assert_eq!(cast_default("2.5", &union), json!(2.5));
        assert_eq!(cast_default("false", &union), json!(false));
        assert_eq!(cast_default("x", &union), json!("x"));
    }
}
