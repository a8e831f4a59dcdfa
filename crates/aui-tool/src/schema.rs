//! Input schemas: a small tagged-union description of a tool's input shape,
//! used both to validate calls and to export JSON schema for tool manifests.

use schemars::{JsonSchema, schema_for};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::marker::PhantomData;

/// Input rejected by a validator. `path` is empty for the root value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaError {
    pub path: String,
    pub message: String,
}

impl SchemaError {
    fn new(path: &str, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

impl std::error::Error for SchemaError {}

/// Anything that can check raw input and describe its shape.
pub trait InputValidator: Send + Sync {
    /// Returns the validated (possibly normalised) input
    fn parse(&self, input: Value) -> Result<Value, SchemaError>;

    /// JSON schema describing accepted input
    fn json_schema(&self) -> Value;
}

#[derive(Debug, Clone, PartialEq)]
pub enum SchemaKind {
    Any,
    String {
        min_length: Option<usize>,
        max_length: Option<usize>,
    },
    Number {
        min: Option<f64>,
        max: Option<f64>,
        integer: bool,
    },
    Boolean,
    Array(Box<Schema>),
    Enum(Vec<String>),
    Object(Vec<Field>),
    Optional(Box<Schema>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub schema: Schema,
}

/// Structural description of a value.
///
/// # Example
///
/// ```
/// use aui_tool::Schema;
/// use serde_json::json;
///
/// let schema = Schema::object()
///     .field("a", Schema::number())
///     .field("b", Schema::number());
///
/// assert!(schema.parse(&json!({"a": 6, "b": 7})).is_ok());
/// assert!(schema.parse(&json!({"a": "x", "b": 7})).is_err());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    kind: SchemaKind,
    description: Option<String>,
    default: Option<Value>,
}

impl Schema {
    fn of(kind: SchemaKind) -> Self {
        Self {
            kind,
            description: None,
            default: None,
        }
    }

    pub fn any() -> Self {
        Self::of(SchemaKind::Any)
    }

    pub fn string() -> Self {
        Self::of(SchemaKind::String {
            min_length: None,
            max_length: None,
        })
    }

    pub fn number() -> Self {
        Self::of(SchemaKind::Number {
            min: None,
            max: None,
            integer: false,
        })
    }

    pub fn integer() -> Self {
        Self::of(SchemaKind::Number {
            min: None,
            max: None,
            integer: true,
        })
    }

    pub fn boolean() -> Self {
        Self::of(SchemaKind::Boolean)
    }

    pub fn array(items: Schema) -> Self {
        Self::of(SchemaKind::Array(Box::new(items)))
    }

    pub fn enumeration<S: Into<String>>(values: impl IntoIterator<Item = S>) -> Self {
        Self::of(SchemaKind::Enum(values.into_iter().map(Into::into).collect()))
    }

    pub fn object() -> Self {
        Self::of(SchemaKind::Object(Vec::new()))
    }

    /// Adds a field to an object schema. Has no effect on other kinds.
    pub fn field(mut self, name: impl Into<String>, schema: Schema) -> Self {
        if let SchemaKind::Object(ref mut fields) = self.kind {
            let name = name.into();
            fields.retain(|f| f.name != name);
            fields.push(Field { name, schema });
        }
        self
    }

    /// Accepts `null` or a missing object field
    pub fn optional(self) -> Self {
        let description = self.description.clone();
        Self {
            kind: SchemaKind::Optional(Box::new(self)),
            description,
            default: None,
        }
    }

    /// Value substituted for `null` or a missing field
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Lower bound for numbers. Has no effect on other kinds.
    pub fn min(mut self, bound: f64) -> Self {
        if let SchemaKind::Number { ref mut min, .. } = self.kind {
            *min = Some(bound);
        }
        self
    }

    /// Upper bound for numbers. Has no effect on other kinds.
    pub fn max(mut self, bound: f64) -> Self {
        if let SchemaKind::Number { ref mut max, .. } = self.kind {
            *max = Some(bound);
        }
        self
    }

    pub fn min_length(mut self, len: usize) -> Self {
        if let SchemaKind::String {
            ref mut min_length, ..
        } = self.kind
        {
            *min_length = Some(len);
        }
        self
    }

    pub fn max_length(mut self, len: usize) -> Self {
        if let SchemaKind::String {
            ref mut max_length, ..
        } = self.kind
        {
            *max_length = Some(len);
        }
        self
    }

    pub fn kind(&self) -> &SchemaKind {
        &self.kind
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn fallback(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Whether an object field with this schema may be left out
    pub fn is_optional(&self) -> bool {
        self.default.is_some() || matches!(self.kind, SchemaKind::Optional(_))
    }

    /// Validates `value`, filling defaults and dropping unknown object keys
    pub fn parse(&self, value: &Value) -> Result<Value, SchemaError> {
        self.parse_at("", value)
    }

    fn parse_at(&self, path: &str, value: &Value) -> Result<Value, SchemaError> {
        if value.is_null() {
            if let Some(default) = &self.default {
                return Ok(default.clone());
            }
        }

        match &self.kind {
            SchemaKind::Any => Ok(value.clone()),
            SchemaKind::Optional(inner) => {
                if value.is_null() {
                    Ok(inner.default.clone().unwrap_or(Value::Null))
                } else {
                    inner.parse_at(path, value)
                }
            }
            SchemaKind::String {
                min_length,
                max_length,
            } => {
                let text = value
                    .as_str()
                    .ok_or_else(|| mismatch(path, "string", value))?;
                let len = text.chars().count();
                if let Some(min) = min_length.filter(|min| len < *min) {
                    return Err(SchemaError::new(
                        path,
                        format!("expected at least {} characters, received {}", min, len),
                    ));
                }
                if let Some(max) = max_length.filter(|max| len > *max) {
                    return Err(SchemaError::new(
                        path,
                        format!("expected at most {} characters, received {}", max, len),
                    ));
                }
                Ok(value.clone())
            }
            SchemaKind::Number { min, max, integer } => {
                let number = value
                    .as_f64()
                    .ok_or_else(|| mismatch(path, if *integer { "integer" } else { "number" }, value))?;
                if *integer && number.fract() != 0.0 {
                    return Err(SchemaError::new(
                        path,
                        format!("expected integer, received {}", number),
                    ));
                }
                if let Some(min) = min.filter(|min| number < *min) {
                    return Err(SchemaError::new(
                        path,
                        format!("must be greater than or equal to {}", min),
                    ));
                }
                if let Some(max) = max.filter(|max| number > *max) {
                    return Err(SchemaError::new(
                        path,
                        format!("must be less than or equal to {}", max),
                    ));
                }
                // Whole floats outside i64 are kept as given rather than saturated
                let in_range = (i64::MIN as f64..i64::MAX as f64).contains(&number);
                if *integer && in_range && value.as_i64().is_none() && value.as_u64().is_none() {
                    return Ok(Value::from(number as i64));
                }
                Ok(value.clone())
            }
            SchemaKind::Boolean => {
                if value.is_boolean() {
                    Ok(value.clone())
                } else {
                    Err(mismatch(path, "boolean", value))
                }
            }
            SchemaKind::Array(items) => {
                let elements = value
                    .as_array()
                    .ok_or_else(|| mismatch(path, "array", value))?;
                elements
                    .iter()
                    .enumerate()
                    .map(|(i, element)| items.parse_at(&format!("{}[{}]", path, i), element))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array)
            }
            SchemaKind::Enum(options) => match value.as_str() {
                Some(text) if options.iter().any(|o| o == text) => Ok(value.clone()),
                _ => Err(SchemaError::new(
                    path,
                    format!(
                        "expected one of [{}], received {}",
                        options.join(", "),
                        value
                    ),
                )),
            },
            SchemaKind::Object(fields) => {
                let object = value
                    .as_object()
                    .ok_or_else(|| mismatch(path, "object", value))?;
                let mut parsed = Map::new();
                for field in fields {
                    let field_path = if path.is_empty() {
                        field.name.clone()
                    } else {
                        format!("{}.{}", path, field.name)
                    };
                    match object.get(&field.name).filter(|v| !v.is_null()) {
                        Some(raw) => {
                            parsed.insert(field.name.clone(), field.schema.parse_at(&field_path, raw)?);
                        }
                        None if field.schema.is_optional() => {
                            let filled = field.schema.parse_at(&field_path, &Value::Null)?;
                            if !filled.is_null() {
                                parsed.insert(field.name.clone(), filled);
                            }
                        }
                        None => return Err(SchemaError::new(&field_path, "required")),
                    }
                }
                Ok(Value::Object(parsed))
            }
        }
    }

    /// Dispatches to the visitor method for this schema's kind
    pub fn accept<V: SchemaVisitor>(&self, visitor: &mut V) -> V::Output {
        match &self.kind {
            SchemaKind::Any => visitor.visit_any(self),
            SchemaKind::String {
                min_length,
                max_length,
            } => visitor.visit_string(self, *min_length, *max_length),
            SchemaKind::Number { min, max, integer } => {
                visitor.visit_number(self, *min, *max, *integer)
            }
            SchemaKind::Boolean => visitor.visit_boolean(self),
            SchemaKind::Array(items) => visitor.visit_array(self, items),
            SchemaKind::Enum(values) => visitor.visit_enum(self, values),
            SchemaKind::Object(fields) => visitor.visit_object(self, fields),
            SchemaKind::Optional(inner) => visitor.visit_optional(self, inner),
        }
    }

    pub fn to_json_schema(&self) -> Value {
        self.accept(&mut JsonSchemaVisitor)
    }
}

fn mismatch(path: &str, expected: &str, value: &Value) -> SchemaError {
    SchemaError::new(
        path,
        format!("expected {}, received {}", expected, type_name(value)),
    )
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl InputValidator for Schema {
    fn parse(&self, input: Value) -> Result<Value, SchemaError> {
        Schema::parse(self, &input)
    }

    fn json_schema(&self) -> Value {
        self.to_json_schema()
    }
}

/// One method per schema kind
pub trait SchemaVisitor {
    type Output;

    fn visit_any(&mut self, schema: &Schema) -> Self::Output;
    fn visit_string(
        &mut self,
        schema: &Schema,
        min_length: Option<usize>,
        max_length: Option<usize>,
    ) -> Self::Output;
    fn visit_number(
        &mut self,
        schema: &Schema,
        min: Option<f64>,
        max: Option<f64>,
        integer: bool,
    ) -> Self::Output;
    fn visit_boolean(&mut self, schema: &Schema) -> Self::Output;
    fn visit_array(&mut self, schema: &Schema, items: &Schema) -> Self::Output;
    fn visit_enum(&mut self, schema: &Schema, values: &[String]) -> Self::Output;
    fn visit_object(&mut self, schema: &Schema, fields: &[Field]) -> Self::Output;
    fn visit_optional(&mut self, schema: &Schema, inner: &Schema) -> Self::Output;
}

/// Renders a [`Schema`] as JSON schema
pub struct JsonSchemaVisitor;

impl JsonSchemaVisitor {
    fn typed(schema: &Schema, type_: &str) -> Map<String, Value> {
        let mut out = Map::new();
        out.insert("type".to_string(), Value::String(type_.to_string()));
        annotate(&mut out, schema);
        out
    }
}

fn annotate(out: &mut Map<String, Value>, schema: &Schema) {
    if let Some(description) = &schema.description {
        out.insert("description".to_string(), Value::String(description.clone()));
    }
    if let Some(default) = &schema.default {
        out.insert("default".to_string(), default.clone());
    }
}

impl SchemaVisitor for JsonSchemaVisitor {
    type Output = Value;

    fn visit_any(&mut self, schema: &Schema) -> Value {
        let mut out = Map::new();
        annotate(&mut out, schema);
        Value::Object(out)
    }

    fn visit_string(
        &mut self,
        schema: &Schema,
        min_length: Option<usize>,
        max_length: Option<usize>,
    ) -> Value {
        let mut out = Self::typed(schema, "string");
        if let Some(min) = min_length {
            out.insert("minLength".to_string(), Value::from(min));
        }
        if let Some(max) = max_length {
            out.insert("maxLength".to_string(), Value::from(max));
        }
        Value::Object(out)
    }

    fn visit_number(
        &mut self,
        schema: &Schema,
        min: Option<f64>,
        max: Option<f64>,
        integer: bool,
    ) -> Value {
        let mut out = Self::typed(schema, if integer { "integer" } else { "number" });
        if let Some(min) = min {
            out.insert("minimum".to_string(), Value::from(min));
        }
        if let Some(max) = max {
            out.insert("maximum".to_string(), Value::from(max));
        }
        Value::Object(out)
    }

    fn visit_boolean(&mut self, schema: &Schema) -> Value {
        Value::Object(Self::typed(schema, "boolean"))
    }

    fn visit_array(&mut self, schema: &Schema, items: &Schema) -> Value {
        let mut out = Self::typed(schema, "array");
        out.insert("items".to_string(), items.accept(self));
        Value::Object(out)
    }

    fn visit_enum(&mut self, schema: &Schema, values: &[String]) -> Value {
        let mut out = Self::typed(schema, "string");
        out.insert(
            "enum".to_string(),
            Value::Array(values.iter().cloned().map(Value::String).collect()),
        );
        Value::Object(out)
    }

    fn visit_object(&mut self, schema: &Schema, fields: &[Field]) -> Value {
        let mut out = Self::typed(schema, "object");
        let mut properties = Map::new();
        let mut required = Vec::new();
        for field in fields {
            properties.insert(field.name.clone(), field.schema.accept(self));
            if !field.schema.is_optional() {
                required.push(Value::String(field.name.clone()));
            }
        }
        out.insert("properties".to_string(), Value::Object(properties));
        out.insert("required".to_string(), Value::Array(required));
        Value::Object(out)
    }

    fn visit_optional(&mut self, schema: &Schema, inner: &Schema) -> Value {
        let mut rendered = inner.accept(self);
        if let Value::Object(ref mut out) = rendered {
            annotate(out, schema);
        }
        rendered
    }
}

/// Generates JSON schema from a Rust type
pub fn generate_schema<T: JsonSchema>() -> Value {
    let schema = schema_for!(T);
    serde_json::to_value(schema).unwrap_or(Value::Null)
}

/// Validator backed by a Rust type: serde checks the input and schemars
/// describes it.
pub struct TypedSchema<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedSchema<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for TypedSchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> InputValidator for TypedSchema<T>
where
    T: JsonSchema + DeserializeOwned + Serialize,
{
    fn parse(&self, input: Value) -> Result<Value, SchemaError> {
        let typed: T =
            serde_json::from_value(input).map_err(|e| SchemaError::new("", e.to_string()))?;
        serde_json::to_value(typed).map_err(|e| SchemaError::new("", e.to_string()))
    }

    fn json_schema(&self) -> Value {
        let mut schema = generate_schema::<T>();
        if let Value::Object(ref mut root) = schema {
            root.remove("$schema");
            root.remove("title");
        }
        schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn calc_schema() -> Schema {
        Schema::object()
            .field("a", Schema::number().describe("Left operand"))
            .field("b", Schema::number())
    }

    #[test]
    fn test_parse_accepts_valid_object() {
        let parsed = calc_schema().parse(&json!({"a": 6, "b": 7})).unwrap();
        assert_eq!(parsed, json!({"a": 6, "b": 7}));
    }

    #[test]
    fn test_parse_reports_path() {
        let err = calc_schema().parse(&json!({"a": "x", "b": 7})).unwrap_err();
        assert_eq!(err.path, "a");
        assert_eq!(err.to_string(), "a: expected number, received string");

        let err = calc_schema().parse(&json!({"a": 1})).unwrap_err();
        assert_eq!(err.to_string(), "b: required");
    }

    #[test]
    fn test_parse_strips_unknown_keys_and_fills_defaults() {
        let schema = Schema::object()
            .field("name", Schema::string().default_value(json!("default")))
            .field("amount", Schema::integer().optional());

        let parsed = schema.parse(&json!({"extra": true})).unwrap();
        assert_eq!(parsed, json!({"name": "default"}));
    }

    #[test]
    fn test_parse_nested_array_path() {
        let schema = Schema::object().field("ids", Schema::array(Schema::integer()));
        let err = schema.parse(&json!({"ids": [1, 2.5]})).unwrap_err();
        assert_eq!(err.path, "ids[1]");
    }

    #[test]
    fn test_parse_enum_and_bounds() {
        let action = Schema::enumeration(["increment", "reset"]);
        assert!(action.parse(&json!("reset")).is_ok());
        assert!(action.parse(&json!("explode")).is_err());

        let pct = Schema::number().min(0.0).max(100.0);
        assert!(pct.parse(&json!(100)).is_ok());
        assert!(pct.parse(&json!(101)).is_err());

        let title = Schema::string().min_length(1).max_length(3);
        assert!(title.parse(&json!("")).is_err());
        assert!(title.parse(&json!("abcd")).is_err());
    }

    #[test]
    fn test_integer_normalises_whole_floats() {
        assert_eq!(Schema::integer().parse(&json!(3.0)).unwrap(), json!(3));
    }

    #[test]
    fn test_integer_outside_i64_is_not_saturated() {
        assert_eq!(Schema::integer().parse(&json!(1e20)).unwrap(), json!(1e20));
        assert_eq!(Schema::integer().parse(&json!(-1e20)).unwrap(), json!(-1e20));
        assert_eq!(Schema::integer().parse(&json!(-4.0)).unwrap(), json!(-4));
    }

    #[test]
    fn test_json_schema_export() {
        let schema = Schema::object()
            .describe("Multiply two numbers")
            .field("a", Schema::number().describe("Left operand"))
            .field("note", Schema::string().optional())
            .field("mode", Schema::enumeration(["fast", "exact"]).default_value(json!("fast")));

        assert_eq!(
            schema.to_json_schema(),
            json!({
                "type": "object",
                "description": "Multiply two numbers",
                "properties": {
                    "a": {"type": "number", "description": "Left operand"},
                    "note": {"type": "string"},
                    "mode": {"type": "string", "enum": ["fast", "exact"], "default": "fast"}
                },
                "required": ["a"]
            })
        );
    }

    #[derive(Debug, Serialize, Deserialize, JsonSchema)]
    struct TestParams {
        name: String,
        age: u32,
    }

    #[test]
    fn test_generate_schema() {
        let schema = generate_schema::<TestParams>();
        let obj = schema.as_object().unwrap();
        assert!(obj.contains_key("$schema"));
    }

    #[test]
    fn test_typed_schema() {
        let validator = TypedSchema::<TestParams>::new();

        assert!(validator.parse(json!({"name": "Ada", "age": 36})).is_ok());
        assert!(validator.parse(json!({"name": "Ada", "age": -1})).is_err());

        let exported = validator.json_schema();
        assert!(!exported.as_object().unwrap().contains_key("$schema"));
        assert_eq!(exported["type"], "object");
    }
}
