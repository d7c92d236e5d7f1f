//! Local `$ref` resolution and schema preparation.
//!
//! # Responsibilities
//! - Follow `#/...` references within the document
//! - Rewrite OpenAPI 3.0 `nullable` into JSON Schema type unions
//! - Compile schemas into `jsonschema` validators with the document's
//!   components reachable from inside the compiled schema
//!
//! # Design Decisions
//! - Remote references are rejected at construction
//! - Reference chains are bounded to catch cycles

use std::sync::Arc;

use jsonschema::{Draft, Validator};
use percent_encoding::percent_decode_str;
use serde_json::{json, Map, Value};

use crate::document::loader::DocumentError;

const MAX_REF_DEPTH: usize = 32;

/// Follow `$ref` until a concrete value is reached.
pub fn resolve<'a>(root: &'a Value, value: &'a Value) -> Result<&'a Value, DocumentError> {
    let mut current = value;
    for _ in 0..MAX_REF_DEPTH {
        let Some(reference) = current.get("$ref").and_then(Value::as_str) else {
            return Ok(current);
        };
        current = lookup(root, reference)?;
    }
    Err(DocumentError::Reference(format!(
        "reference chain longer than {MAX_REF_DEPTH} starting at {value}"
    )))
}

fn lookup<'a>(root: &'a Value, reference: &str) -> Result<&'a Value, DocumentError> {
    let pointer = reference
        .strip_prefix('#')
        .ok_or_else(|| DocumentError::Reference(reference.to_string()))?;
    let decoded = percent_decode_str(pointer).decode_utf8_lossy();
    root.pointer(&decoded)
        .ok_or_else(|| DocumentError::Reference(reference.to_string()))
}

/// Rewrite `nullable: true` into a type union, recursively.
pub fn rewrite_nullable(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if map.get("nullable") == Some(&Value::Bool(true)) {
                map.remove("nullable");
                make_nullable(map);
            }
            for child in map.values_mut() {
                rewrite_nullable(child);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(rewrite_nullable),
        _ => {}
    }
}

fn make_nullable(map: &mut Map<String, Value>) {
    match map.get_mut("type") {
        Some(Value::String(kind)) => {
            let kind = std::mem::take(kind);
            map.insert("type".to_string(), json!([kind, "null"]));
        }
        Some(Value::Array(kinds)) => {
            if !kinds.iter().any(|k| k == "null") {
                kinds.push(json!("null"));
            }
        }
        _ => {}
    }
    if let Some(Value::Array(values)) = map.get_mut("enum") {
        if !values.contains(&Value::Null) {
            values.push(Value::Null);
        }
    }
}

/// Compiles schemas taken from one document.
pub struct SchemaCompiler {
    draft: Draft,
    components: Value,
    rewrite: bool,
}

impl SchemaCompiler {
    pub fn new(root: &Value, openapi_31: bool) -> Self {
        let mut components = root.get("components").cloned().unwrap_or_else(|| json!({}));
        if !openapi_31 {
            rewrite_nullable(&mut components);
        }
        Self {
            draft: if openapi_31 {
                Draft::Draft202012
            } else {
                Draft::Draft4
            },
            components,
            rewrite: !openapi_31,
        }
    }

    /// Compile `schema`, found at `pointer`, into a validator.
    pub fn compile(&self, schema: &Value, pointer: &str) -> Result<Arc<Validator>, DocumentError> {
        let mut schema = schema.clone();
        if self.rewrite {
            rewrite_nullable(&mut schema);
        }

        // `#/components/...` references resolve against this wrapper.
        let wrapper = json!({
            "allOf": [schema],
            "components": self.components,
        });

        jsonschema::options()
            .with_draft(self.draft)
            .build(&wrapper)
            .map(Arc::new)
            .map_err(|e| DocumentError::Schema {
                pointer: pointer.to_string(),
                message: e.to_string(),
            })
    }
}

/// Escape a key for use inside a JSON pointer.
pub fn escape_pointer(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}
