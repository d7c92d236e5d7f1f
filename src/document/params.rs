//! Parameter coercion.
//!
//! Path, query, header and cookie values arrive as strings. Before they are
//! validated or handed to handlers they are turned into JSON values shaped
//! by the parameter's schema: arrays are split, scalars are converted to the
//! declared primitive type when `coerce` is set. Values that do not convert
//! stay strings so that validation reports them.

use serde_json::{Number, Value};

/// How an array parameter is serialized in a single value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayStyle {
    /// `a,b,c`
    Form,
    /// `a b c`
    SpaceDelimited,
    /// `a|b|c`
    PipeDelimited,
}

impl ArrayStyle {
    pub fn from_openapi(style: Option<&str>) -> Self {
        match style {
            Some("spaceDelimited") => Self::SpaceDelimited,
            Some("pipeDelimited") => Self::PipeDelimited,
            _ => Self::Form,
        }
    }

    fn delimiter(self) -> char {
        match self {
            Self::Form => ',',
            Self::SpaceDelimited => ' ',
            Self::PipeDelimited => '|',
        }
    }
}

/// Primary JSON type declared by a (resolved) schema, ignoring `null`.
pub fn schema_type(schema: &Value) -> Option<&str> {
    match schema.get("type")? {
        Value::String(kind) => Some(kind.as_str()),
        Value::Array(kinds) => kinds.iter().filter_map(Value::as_str).find(|k| *k != "null"),
        _ => None,
    }
}

/// Turn the raw values of one parameter into a JSON value.
///
/// `items` is the resolved item schema for array parameters.
pub fn coerce_values(
    raw: &[String],
    schema: &Value,
    items: Option<&Value>,
    style: ArrayStyle,
    explode: bool,
    coerce: bool,
) -> Value {
    if schema_type(schema) == Some("array") {
        let parts: Vec<&str> = if raw.len() == 1 && !explode {
            raw[0].split(style.delimiter()).collect()
        } else {
            raw.iter().map(String::as_str).collect()
        };
        let item_schema = items.unwrap_or(&Value::Null);
        return Value::Array(
            parts
                .into_iter()
                .map(|part| coerce_scalar(part, item_schema, coerce))
                .collect(),
        );
    }

    match raw {
        [] => Value::Null,
        [single] => coerce_scalar(single, schema, coerce),
        many => Value::Array(many.iter().map(|v| Value::String(v.clone())).collect()),
    }
}

/// Convert one string to the schema's primitive type, if possible.
pub fn coerce_scalar(raw: &str, schema: &Value, coerce: bool) -> Value {
    if !coerce {
        return Value::String(raw.to_string());
    }

    match schema_type(schema) {
        Some("integer") => raw
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        Some("number") => {
            if let Ok(int) = raw.parse::<i64>() {
                Value::from(int)
            } else {
                raw.parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or_else(|| Value::String(raw.to_string()))
            }
        }
        Some("boolean") => match raw {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::String(raw.to_string()),
        },
        _ => Value::String(raw.to_string()),
    }
}
