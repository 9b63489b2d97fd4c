//! Rule checks for schema nodes.

use std::sync::LazyLock;

use jsonschema::Validator;
use serde_json::json;

use crate::error::ValidateError;
use crate::schema::Schema;
use crate::types::{DRAFT_07, SUPPORTED_FORMATS};

// The draft-07 meta-schema ships with jsonschema's registry, so the reference
// resolves without network access.
static META_SCHEMA: LazyLock<Validator> = LazyLock::new(|| {
    jsonschema::draft7::new(&json!({ "$ref": DRAFT_07 }))
        .expect("draft-07 meta-schema must compile")
});

/// Validate a schema node and everything nested in it.
///
/// Stops at the first violated rule.
///
/// # Errors
///
/// Returns the `ValidateError` describing the first violation.
pub fn validate(schema: &Schema) -> Result<(), ValidateError> {
    validate_syntax(schema)?;
    validate_type_constraints(schema)?;
    validate_numeric_constraints(schema)?;
    validate_string_constraints(schema)?;
    validate_array_constraints(schema)?;
    validate_nested(schema)
}

/// Check a node against the JSON Schema meta-schema and the known type names.
///
/// # Errors
///
/// Returns `ValidateError::InvalidSyntax` or `ValidateError::UnsupportedType`.
pub fn validate_syntax(schema: &Schema) -> Result<(), ValidateError> {
    let value = serde_json::to_value(schema).map_err(|e| ValidateError::InvalidSyntax {
        message: e.to_string(),
    })?;

    META_SCHEMA.validate(&value).map_err(|e| ValidateError::InvalidSyntax {
        message: e.to_string(),
    })?;

    schema.schema_type.validate()
}

fn validate_type_constraints(schema: &Schema) -> Result<(), ValidateError> {
    if schema.constant.is_some() && !schema.schema_type.is_empty() {
        return Err(ValidateError::ConstWithType);
    }
    if schema.enumeration.is_some() && !schema.schema_type.is_empty() {
        return Err(ValidateError::EnumWithType);
    }
    Ok(())
}

fn validate_numeric_constraints(schema: &Schema) -> Result<(), ValidateError> {
    let has_numeric = schema.minimum.is_some()
        || schema.maximum.is_some()
        || schema.exclusive_minimum.is_some()
        || schema.exclusive_maximum.is_some()
        || schema.multiple_of.is_some();
    if !has_numeric {
        return Ok(());
    }

    let types = &schema.schema_type;
    if !types.is_empty() && !types.matches("number") && !types.matches("integer") {
        return Err(ValidateError::NumericConstraintType {
            types: types.to_string(),
        });
    }
    if schema.multiple_of.is_some_and(|m| m <= 0) {
        return Err(ValidateError::MultipleOfNotPositive);
    }
    if schema.minimum.is_some() && schema.exclusive_minimum.is_some() {
        return Err(ValidateError::MinimumWithExclusive);
    }
    if schema.maximum.is_some() && schema.exclusive_maximum.is_some() {
        return Err(ValidateError::MaximumWithExclusive);
    }
    Ok(())
}

fn validate_string_constraints(schema: &Schema) -> Result<(), ValidateError> {
    let types = &schema.schema_type;

    if !schema.format.is_empty() {
        if !types.is_empty() && !types.matches("string") {
            return Err(ValidateError::FormatType {
                types: types.to_string(),
            });
        }
        if !SUPPORTED_FORMATS.contains(&schema.format.as_str()) {
            return Err(ValidateError::UnsupportedFormat {
                format: schema.format.clone(),
            });
        }
    }

    if !schema.pattern.is_empty() && !types.is_empty() && !types.matches("string") {
        return Err(ValidateError::PatternType {
            types: types.to_string(),
        });
    }

    if !schema.format.is_empty() && !schema.pattern.is_empty() {
        return Err(ValidateError::FormatWithPattern);
    }

    if let (Some(min), Some(max)) = (schema.min_length, schema.max_length) {
        if min > max {
            return Err(ValidateError::LengthRange { min, max });
        }
    }
    Ok(())
}

fn validate_array_constraints(schema: &Schema) -> Result<(), ValidateError> {
    let types = &schema.schema_type;

    if let Some(items) = &schema.items {
        if !types.is_empty() && !types.matches("array") {
            return Err(ValidateError::ItemsType {
                types: types.to_string(),
            });
        }
        validate(items).map_err(|source| ValidateError::InvalidItems {
            source: Box::new(source),
        })?;
    }

    if schema.min_items.is_some() || schema.max_items.is_some() {
        if !types.is_empty() && !types.matches("array") {
            return Err(ValidateError::ItemCountType {
                types: types.to_string(),
            });
        }
        if let (Some(min), Some(max)) = (schema.min_items, schema.max_items) {
            if max < min {
                return Err(ValidateError::ItemCountRange { min, max });
            }
        }
    }
    Ok(())
}

fn validate_nested(schema: &Schema) -> Result<(), ValidateError> {
    let composed = schema
        .all_of
        .iter()
        .chain(&schema.any_of)
        .chain(&schema.one_of);
    let conditional = [
        &schema.if_schema,
        &schema.then_schema,
        &schema.else_schema,
        &schema.not,
    ]
    .into_iter()
    .filter_map(|s| s.as_deref());

    for nested in composed
        .chain(conditional)
        .chain(schema.definitions.values())
    {
        validate(nested)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema(value: serde_json::Value) -> Schema {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn valid_schemas_pass() {
        for value in [
            json!({ "type": "string", "format": "email" }),
            json!({ "type": "integer", "minimum": 1, "maximum": 10 }),
            json!({ "type": ["string", "null"], "pattern": "^a" }),
            json!({ "enum": ["a", "b"] }),
            json!({ "type": "array", "items": { "type": "string" }, "minItems": 1 }),
            json!({ "$ref": "#/definitions/Foo" }),
        ] {
            assert!(validate(&schema(value.clone())).is_ok(), "{value}");
        }
    }

    #[test]
    fn meta_schema_rejects_malformed_keywords() {
        for value in [
            json!({ "minLength": -1 }),
            json!({ "definitions": { "Foo": { "minItems": -3 } } }),
            json!({ "multipleOf": -2 }),
        ] {
            let err = validate_syntax(&schema(value.clone())).unwrap_err();
            assert!(matches!(err, ValidateError::InvalidSyntax { .. }), "{value}: {err}");
        }
    }

    #[test]
    fn meta_schema_accepts_unresolved_internal_refs() {
        let node = schema(json!({
            "properties": { "a": { "$ref": "#/definitions/NotYetRegistered" } }
        }));
        assert!(validate_syntax(&node).is_ok());
    }

    #[test]
    fn const_with_type() {
        let err = validate(&schema(json!({ "type": "string", "const": "x" }))).unwrap_err();
        assert!(matches!(err, ValidateError::ConstWithType));
        assert_eq!(
            err.to_string(),
            "cannot use both 'const' and 'type' in the same schema"
        );
    }

    #[test]
    fn enum_with_type() {
        let err = validate(&schema(json!({ "type": "string", "enum": ["x"] }))).unwrap_err();
        assert!(matches!(err, ValidateError::EnumWithType));
    }

    #[test]
    fn unknown_type_name() {
        // `type: text` is rejected by the meta-schema's type enum first
        let err = validate(&schema(json!({ "type": "text" }))).unwrap_err();
        assert!(matches!(err, ValidateError::InvalidSyntax { .. }));

        let types = crate::types::SchemaType::single("text");
        assert!(matches!(
            types.validate(),
            Err(ValidateError::UnsupportedType { ref name }) if name == "text"
        ));
    }

    #[test]
    fn numeric_rules() {
        let err = validate(&schema(json!({ "type": "string", "minimum": 1 }))).unwrap_err();
        assert_eq!(
            err.to_string(),
            "numeric constraints can only be used with number or integer types, got [string]"
        );

        // the meta-schema requires `multipleOf` > 0
        let err = validate(&schema(json!({ "type": "integer", "multipleOf": 0 }))).unwrap_err();
        assert!(matches!(err, ValidateError::InvalidSyntax { .. }));

        let err = validate(&schema(json!({ "minimum": 1, "exclusiveMinimum": 0 }))).unwrap_err();
        assert!(matches!(err, ValidateError::MinimumWithExclusive));

        let err = validate(&schema(json!({ "maximum": 1, "exclusiveMaximum": 2 }))).unwrap_err();
        assert!(matches!(err, ValidateError::MaximumWithExclusive));
    }

    #[test]
    fn string_rules() {
        let err = validate(&schema(json!({ "type": "integer", "format": "email" }))).unwrap_err();
        assert!(matches!(err, ValidateError::FormatType { .. }));

        let err = validate(&schema(json!({ "format": "color" }))).unwrap_err();
        assert_eq!(err.to_string(), "unsupported format: color");

        let err = validate(&schema(json!({ "type": "boolean", "pattern": "^a" }))).unwrap_err();
        assert!(matches!(err, ValidateError::PatternType { .. }));

        let err = validate(&schema(json!({ "format": "uuid", "pattern": "^a" }))).unwrap_err();
        assert!(matches!(err, ValidateError::FormatWithPattern));

        let err = validate(&schema(json!({ "minLength": 5, "maxLength": 2 }))).unwrap_err();
        assert_eq!(
            err.to_string(),
            "minLength (5) cannot be greater than maxLength (2)"
        );
    }

    #[test]
    fn array_rules() {
        let err = validate(&schema(json!({ "type": "object", "items": {} }))).unwrap_err();
        assert!(matches!(err, ValidateError::ItemsType { .. }));

        let err = validate(&schema(json!({
            "type": "array",
            "items": { "type": "string", "const": "a" }
        })))
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid items schema: cannot use both 'const' and 'type' in the same schema"
        );

        let err = validate(&schema(json!({ "type": "string", "maxItems": 1 }))).unwrap_err();
        assert!(matches!(err, ValidateError::ItemCountType { .. }));

        let err = validate(&schema(json!({ "minItems": 3, "maxItems": 1 }))).unwrap_err();
        assert_eq!(err.to_string(), "maxItems (1) cannot be less than minItems (3)");
    }

    #[test]
    fn nested_schemas_are_checked() {
        for value in [
            json!({ "anyOf": [{ "type": "string", "const": "a" }] }),
            json!({ "if": { "type": "string", "enum": ["a"] } }),
            json!({ "definitions": { "X": { "type": "integer", "format": "email" } } }),
        ] {
            assert!(validate(&schema(value.clone())).is_err(), "{value}");
        }
    }
}
