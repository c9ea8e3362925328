//! Dynamic input schemas for tools.
//!
//! A tagged-variant representation — one variant per field kind — with a
//! single `parse` entry point. This is deliberately not a reflective
//! "duck typing" validator: every accepted shape is named up front.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// A single argument's declared shape and constraints.
#[derive(Debug, Clone)]
pub enum FieldSchema {
    String {
        min_len: Option<usize>,
        max_len: Option<usize>,
        pattern: Option<String>,
    },
    Number {
        min: Option<f64>,
        max: Option<f64>,
        integer: bool,
    },
    Boolean,
    Enum(Vec<String>),
    Array {
        items: Box<FieldSchema>,
        min_items: Option<usize>,
        max_items: Option<usize>,
    },
    Object(Box<ObjectSchema>),
    /// Accepts any JSON value unchanged — for fields whose shape genuinely
    /// varies by call (e.g. parameterized query arguments).
    Any,
}

impl FieldSchema {
    pub fn string() -> Self {
        Self::String {
            min_len: None,
            max_len: None,
            pattern: None,
        }
    }

    pub fn string_pattern(pattern: impl Into<String>) -> Self {
        Self::String {
            min_len: None,
            max_len: None,
            pattern: Some(pattern.into()),
        }
    }

    pub fn number() -> Self {
        Self::Number {
            min: None,
            max: None,
            integer: false,
        }
    }

    pub fn integer_range(min: i64, max: i64) -> Self {
        Self::Number {
            min: Some(min as f64),
            max: Some(max as f64),
            integer: true,
        }
    }

    pub fn enum_of(values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::Enum(values.into_iter().map(Into::into).collect())
    }

    fn to_json_schema(&self) -> Value {
        match self {
            Self::String {
                min_len,
                max_len,
                pattern,
            } => {
                let mut m = Map::new();
                m.insert("type".into(), json!("string"));
                if let Some(v) = min_len {
                    m.insert("minLength".into(), json!(v));
                }
                if let Some(v) = max_len {
                    m.insert("maxLength".into(), json!(v));
                }
                if let Some(v) = pattern {
                    m.insert("pattern".into(), json!(v));
                }
                Value::Object(m)
            }
            Self::Number { min, max, integer } => {
                let mut m = Map::new();
                m.insert("type".into(), json!(if *integer { "integer" } else { "number" }));
                if let Some(v) = min {
                    m.insert("minimum".into(), json!(v));
                }
                if let Some(v) = max {
                    m.insert("maximum".into(), json!(v));
                }
                Value::Object(m)
            }
            Self::Boolean => json!({"type": "boolean"}),
            Self::Enum(values) => json!({"type": "string", "enum": values}),
            Self::Array {
                items,
                min_items,
                max_items,
            } => {
                let mut m = Map::new();
                m.insert("type".into(), json!("array"));
                m.insert("items".into(), items.to_json_schema());
                if let Some(v) = min_items {
                    m.insert("minItems".into(), json!(v));
                }
                if let Some(v) = max_items {
                    m.insert("maxItems".into(), json!(v));
                }
                Value::Object(m)
            }
            Self::Object(obj) => obj.to_json_schema(),
            Self::Any => json!({}),
        }
    }

    /// Parse+validate `raw` against this field's shape, returning the
    /// (possibly type-coerced) value or a path-qualified error.
    fn parse(&self, raw: &Value, path: &str) -> Result<Value, SchemaError> {
        match self {
            Self::String {
                min_len,
                max_len,
                pattern,
            } => {
                let s = raw
                    .as_str()
                    .ok_or_else(|| SchemaError::new(path, "expected a string"))?;
                if let Some(min) = min_len {
                    if s.len() < *min {
                        return Err(SchemaError::new(path, format!("shorter than minLength {min}")));
                    }
                }
                if let Some(max) = max_len {
                    if s.len() > *max {
                        return Err(SchemaError::new(path, format!("longer than maxLength {max}")));
                    }
                }
                if let Some(pat) = pattern {
                    let re = regex::Regex::new(pat)
                        .map_err(|e| SchemaError::new(path, format!("invalid pattern: {e}")))?;
                    if !re.is_match(s) {
                        return Err(SchemaError::new(path, format!("does not match pattern '{pat}'")));
                    }
                }
                Ok(Value::String(s.to_string()))
            }
            Self::Number { min, max, integer } => {
                let n = raw
                    .as_f64()
                    .ok_or_else(|| SchemaError::new(path, "expected a number"))?;
                if *integer && n.fract() != 0.0 {
                    return Err(SchemaError::new(path, "expected an integer"));
                }
                if let Some(v) = min {
                    if n < *v {
                        return Err(SchemaError::new(path, format!("below minimum {v}")));
                    }
                }
                if let Some(v) = max {
                    if n > *v {
                        return Err(SchemaError::new(path, format!("above maximum {v}")));
                    }
                }
                Ok(raw.clone())
            }
            Self::Boolean => {
                if raw.is_boolean() {
                    Ok(raw.clone())
                } else {
                    Err(SchemaError::new(path, "expected a boolean"))
                }
            }
            Self::Enum(values) => {
                let s = raw
                    .as_str()
                    .ok_or_else(|| SchemaError::new(path, "expected a string"))?;
                if values.iter().any(|v| v == s) {
                    Ok(Value::String(s.to_string()))
                } else {
                    Err(SchemaError::new(
                        path,
                        format!("must be one of {}", values.join(", ")),
                    ))
                }
            }
            Self::Array {
                items,
                min_items,
                max_items,
            } => {
                let arr = raw
                    .as_array()
                    .ok_or_else(|| SchemaError::new(path, "expected an array"))?;
                if let Some(min) = min_items {
                    if arr.len() < *min {
                        return Err(SchemaError::new(path, format!("fewer than minItems {min}")));
                    }
                }
                if let Some(max) = max_items {
                    if arr.len() > *max {
                        return Err(SchemaError::new(path, format!("more than maxItems {max}")));
                    }
                }
                let mut out = Vec::with_capacity(arr.len());
                for (i, v) in arr.iter().enumerate() {
                    out.push(items.parse(v, &format!("{path}[{i}]"))?);
                }
                Ok(Value::Array(out))
            }
            Self::Object(obj) => obj.parse(raw, path),
            Self::Any => Ok(raw.clone()),
        }
    }
}

/// A field's optionality and default within an [`ObjectSchema`].
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub schema: FieldSchema,
    pub default: Option<Value>,
    pub optional: bool,
}

impl FieldSpec {
    pub fn required(schema: FieldSchema) -> Self {
        Self {
            schema,
            default: None,
            optional: false,
        }
    }

    pub fn optional(schema: FieldSchema) -> Self {
        Self {
            schema,
            default: None,
            optional: true,
        }
    }

    pub fn with_default(schema: FieldSchema, default: Value) -> Self {
        Self {
            schema,
            default: Some(default),
            optional: true,
        }
    }

    fn is_required(&self) -> bool {
        !self.optional && self.default.is_none()
    }
}

/// The top-level schema for a tool's input object.
#[derive(Debug, Clone, Default)]
pub struct ObjectSchema {
    pub fields: BTreeMap<String, FieldSpec>,
    /// Reject objects containing keys not named in `fields`.
    pub deny_unknown: bool,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
            deny_unknown: true,
        }
    }

    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.insert(name.into(), spec);
        self
    }

    pub fn parse(&self, raw: &Value, path: &str) -> Result<Value, SchemaError> {
        let obj = raw
            .as_object()
            .ok_or_else(|| SchemaError::new(path, "expected an object"))?;

        if self.deny_unknown {
            for key in obj.keys() {
                if !self.fields.contains_key(key) {
                    let field_path = join_path(path, key);
                    return Err(SchemaError::new(field_path, "unrecognized field"));
                }
            }
        }

        let mut out = Map::new();
        for (name, spec) in &self.fields {
            let field_path = join_path(path, name);
            match obj.get(name) {
                Some(value) => {
                    out.insert(name.clone(), spec.schema.parse(value, &field_path)?);
                }
                None => {
                    if let Some(default) = &spec.default {
                        out.insert(name.clone(), default.clone());
                    } else if !spec.optional {
                        return Err(SchemaError::new(field_path, "required field is missing"));
                    }
                }
            }
        }
        Ok(Value::Object(out))
    }

    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for (name, spec) in &self.fields {
            properties.insert(name.clone(), spec.schema.to_json_schema());
            if spec.is_required() {
                required.push(name.clone());
            }
        }
        json!({
            "type": "object",
            "properties": Value::Object(properties),
            "required": required,
        })
    }
}

fn join_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

/// A schema violation at a specific argument path.
#[derive(Debug, Clone)]
pub struct SchemaError {
    pub path: String,
    pub message: String,
}

impl SchemaError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Top-level entry point: parse a tool's raw arguments against its schema.
pub fn parse_args(schema: &ObjectSchema, raw: &Value) -> Result<Value, SchemaError> {
    schema.parse(raw, "")
}
