// SPDX-FileCopyrightText: © 2025 FlowKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Port schemas and structural validation.
//!
//! A schema describes the shape of the data a port carries:
//! - [`PrimitiveType`]: tag for scalar/container JSON types
//! - [`FieldSchema`]: one field of a struct shape (`type`, `required`, `default`)
//! - [`SchemaShape`]: either a bare primitive tag or a named-field mapping
//! - [`PortSchema`]: shape + streaming flag, the unit of connection compatibility
//!
//! Two ports may be wired together iff their schemas are *structurally*
//! equal (same streaming flag, deeply equal shapes). Equality is structural
//! rather than nominal so independently declared ports connect without a
//! global type registry.
//!
//! Defaults are applied at validation time, not declaration time: a value
//! that never received a field still ends up with a canonical copy of the
//! default before the node observes it.

use crate::error::SchemaError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tag identifying the JSON-native type a primitive schema accepts.
///
/// Payloads are `serde_json::Value`, so `bytes` matches JSON strings
/// (binary data travels base64-encoded) and `float` widens integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveType {
    Bytes,
    String,
    Integer,
    Float,
    Boolean,
    Dict,
    List,
    Any,
}

impl PrimitiveType {
    /// The tag name used in error messages and declarations.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bytes => "bytes",
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Dict => "dict",
            Self::List => "list",
            Self::Any => "any",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::Bytes | Self::String => value.is_string(),
            Self::Integer => value.as_i64().is_some() || value.as_u64().is_some(),
            Self::Float => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Dict => value.is_object(),
            Self::List => value.is_array(),
        }
    }
}

/// The JSON type name of a value, for error messages.
pub(crate) const fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

/// Descriptor for one field of a struct shape or one config entry.
///
/// Declarations accept two forms, unified into this single type: a bare
/// primitive tag (`"string"`) or the detailed mapping
/// (`{type, required, description, default}`). The bare form deserializes
/// with `required = false` and no default.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSchema {
    #[serde(rename = "type")]
    pub ty: PrimitiveType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub default: Option<Value>,
}

impl FieldSchema {
    /// A bare-tag field: optional, no default.
    pub fn of(ty: PrimitiveType) -> Self {
        Self { ty, required: false, description: String::new(), default: None }
    }

    /// A required field with no default.
    pub fn required(ty: PrimitiveType) -> Self {
        Self { ty, required: true, description: String::new(), default: None }
    }

    /// An optional field with a declared default.
    pub fn with_default(ty: PrimitiveType, default: Value) -> Self {
        Self { ty, required: false, description: String::new(), default: Some(default) }
    }

    /// Attaches a human-readable description.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Checks a present value against the declared primitive type.
    /// `null` is always accepted; absence handling is the caller's job.
    pub fn validate_type(&self, value: &Value) -> Result<(), SchemaError> {
        if value.is_null() || self.ty.accepts(value) {
            Ok(())
        } else {
            Err(SchemaError::TypeMismatch {
                expected: self.ty.name(),
                actual: value_type_name(value),
            })
        }
    }

    /// Full absent/default/required/type handling for one field of `map`.
    pub fn validate_and_apply(
        &self,
        map: &mut serde_json::Map<String, Value>,
        field: &str,
    ) -> Result<(), SchemaError> {
        match map.get(field) {
            None => {
                if let Some(default) = &self.default {
                    map.insert(field.to_string(), default.clone());
                    Ok(())
                } else if self.required {
                    Err(SchemaError::MissingField { field: field.to_string() })
                } else {
                    Ok(())
                }
            },
            Some(value) => self.validate_type(value),
        }
    }
}

impl<'de> Deserialize<'de> for FieldSchema {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // Accept both the bare-tag and the detailed declaration form.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Decl {
            Tag(PrimitiveType),
            Detailed {
                #[serde(rename = "type")]
                ty: PrimitiveType,
                #[serde(default)]
                required: bool,
                #[serde(default)]
                description: String,
                #[serde(default)]
                default: Option<Value>,
            },
        }

        Ok(match Decl::deserialize(deserializer)? {
            Decl::Tag(ty) => Self::of(ty),
            Decl::Detailed { ty, required, description, default } => {
                Self { ty, required, description, default }
            },
        })
    }
}

/// The shape of a port's data: a primitive tag or a named-field mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemaShape {
    Primitive(PrimitiveType),
    Struct(IndexMap<String, FieldSchema>),
}

impl SchemaShape {
    /// Builds a struct shape from `(name, field)` pairs.
    pub fn record<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, FieldSchema)>,
        K: Into<String>,
    {
        Self::Struct(fields.into_iter().map(|(k, f)| (k.into(), f)).collect())
    }
}

/// Schema bound to a port: streaming flag plus the data shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortSchema {
    pub is_streaming: bool,
    pub shape: SchemaShape,
    #[serde(default)]
    pub description: String,
}

impl PortSchema {
    /// One-shot port carrying a primitive value.
    pub const fn value_of(ty: PrimitiveType) -> Self {
        Self { is_streaming: false, shape: SchemaShape::Primitive(ty), description: String::new() }
    }

    /// Streaming port carrying primitive chunks.
    pub const fn stream_of(ty: PrimitiveType) -> Self {
        Self { is_streaming: true, shape: SchemaShape::Primitive(ty), description: String::new() }
    }

    /// One-shot port carrying a struct-shaped value.
    pub fn value_record<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, FieldSchema)>,
        K: Into<String>,
    {
        Self { is_streaming: false, shape: SchemaShape::record(fields), description: String::new() }
    }

    /// Streaming port carrying struct-shaped chunks.
    pub fn stream_record<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, FieldSchema)>,
        K: Into<String>,
    {
        Self { is_streaming: true, shape: SchemaShape::record(fields), description: String::new() }
    }

    /// Attaches a human-readable description (ignored by equality).
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Structural equality: streaming flags match and shapes are deeply
    /// equal. The description does not participate.
    pub fn matches(&self, other: &Self) -> bool {
        self.is_streaming == other.is_streaming && self.shape == other.shape
    }

    /// Validates `value` against this schema, materializing declared
    /// defaults for absent struct fields into `value`.
    pub fn validate(&self, value: &mut Value) -> Result<(), SchemaError> {
        match &self.shape {
            SchemaShape::Primitive(ty) => {
                if value.is_null() || ty.accepts(value) {
                    Ok(())
                } else {
                    Err(SchemaError::TypeMismatch {
                        expected: ty.name(),
                        actual: value_type_name(value),
                    })
                }
            },
            SchemaShape::Struct(fields) => {
                let Some(map) = value.as_object_mut() else {
                    return Err(SchemaError::ShapeMismatch { actual: value_type_name(value) });
                };
                for (name, field) in fields {
                    field.validate_and_apply(map, name)?;
                }
                Ok(())
            },
        }
    }
}

impl PartialEq for PortSchema {
    fn eq(&self, other: &Self) -> bool {
        self.matches(other)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn audio_schema() -> PortSchema {
        PortSchema::stream_record([
            ("audio", FieldSchema::required(PrimitiveType::Bytes)),
            ("rate", FieldSchema::of(PrimitiveType::Integer)),
        ])
    }

    #[test]
    fn test_primitive_accepts_null() {
        let schema = PortSchema::value_of(PrimitiveType::Integer);
        let mut value = Value::Null;
        schema.validate(&mut value).unwrap();
    }

    #[test]
    fn test_primitive_type_mismatch() {
        let schema = PortSchema::value_of(PrimitiveType::Integer);
        let mut value = json!("not a number");
        let err = schema.validate(&mut value).unwrap_err();
        assert_eq!(err, SchemaError::TypeMismatch { expected: "integer", actual: "string" });
    }

    #[test]
    fn test_any_accepts_everything() {
        let schema = PortSchema::value_of(PrimitiveType::Any);
        for mut value in [json!(1), json!("x"), json!({"a": 1}), json!([1, 2]), json!(null)] {
            schema.validate(&mut value).unwrap();
        }
    }

    #[test]
    fn test_float_widens_integers() {
        let schema = PortSchema::value_of(PrimitiveType::Float);
        let mut value = json!(3);
        schema.validate(&mut value).unwrap();
    }

    #[test]
    fn test_struct_requires_mapping() {
        let schema = audio_schema();
        let mut value = json!([1, 2, 3]);
        let err = schema.validate(&mut value).unwrap_err();
        assert_eq!(err, SchemaError::ShapeMismatch { actual: "list" });
    }

    #[test]
    fn test_missing_required_field() {
        let schema = audio_schema();
        let mut value = json!({"rate": 16000});
        let err = schema.validate(&mut value).unwrap_err();
        assert_eq!(err, SchemaError::MissingField { field: "audio".to_string() });
    }

    #[test]
    fn test_default_is_materialized_at_validation_time() {
        let schema = PortSchema::value_record([
            ("threshold", FieldSchema::with_default(PrimitiveType::Float, json!(0.5))),
            ("label", FieldSchema::of(PrimitiveType::String)),
        ]);
        let mut value = json!({});
        schema.validate(&mut value).unwrap();
        assert_eq!(value, json!({"threshold": 0.5}));
    }

    #[test]
    fn test_nested_field_type_checked_when_present() {
        let schema = audio_schema();
        let mut value = json!({"audio": "aGk=", "rate": "fast"});
        let err = schema.validate(&mut value).unwrap_err();
        assert_eq!(err, SchemaError::TypeMismatch { expected: "integer", actual: "string" });
    }

    #[test]
    fn test_structural_equality_ignores_description() {
        let a = audio_schema().describe("microphone feed");
        let b = audio_schema();
        assert_eq!(a, b);
    }

    #[test]
    fn test_streaming_flag_breaks_equality() {
        let mut b = audio_schema();
        b.is_streaming = false;
        assert!(!audio_schema().matches(&b));
    }

    #[test]
    fn test_shape_difference_breaks_equality() {
        let a = audio_schema();
        let b = PortSchema::stream_record([
            ("audio", FieldSchema::required(PrimitiveType::Bytes)),
            ("rate", FieldSchema::of(PrimitiveType::String)),
        ]);
        assert!(!a.matches(&b));
    }

    #[test]
    fn test_field_schema_shorthand_deserializes() {
        let field: FieldSchema = serde_json::from_value(json!("string")).unwrap();
        assert_eq!(field, FieldSchema::of(PrimitiveType::String));

        let field: FieldSchema = serde_json::from_value(json!({
            "type": "integer",
            "required": true,
            "description": "sample rate"
        }))
        .unwrap();
        assert!(field.required);
        assert_eq!(field.ty, PrimitiveType::Integer);
    }
}
