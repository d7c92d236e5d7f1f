//! Compiled operation index.
//!
//! # Responsibilities
//! - Walk `paths` and compile every operation once
//! - Merge path-level and operation-level parameters
//! - Compile parameter and request body schemas
//! - Match request paths to operations via `matchit`
//!
//! # Design Decisions
//! - Path templates use the same `{name}` syntax as axum, so the same
//!   templates drive validation and dispatch
//! - Conflicting templates are a construction error, never a runtime panic
//! - HEAD falls back to GET, mirroring axum's method routing

use std::fmt;
use std::sync::Arc;

use axum::http::Method;
use jsonschema::Validator;
use percent_encoding::percent_decode_str;
use serde_json::Value;

use crate::document::loader::{DocumentError, SchemaDocument};
use crate::document::params::{coerce_values, ArrayStyle};
use crate::document::refs::{escape_pointer, resolve, SchemaCompiler};
use crate::http::media;

const METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// Headers OpenAPI says must not be described as parameters.
const RESERVED_HEADERS: [&str; 3] = ["accept", "content-type", "authorization"];

/// Where a parameter is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Cookie,
}

impl ParamLocation {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "path" => Some(Self::Path),
            "query" => Some(Self::Query),
            "header" => Some(Self::Header),
            "cookie" => Some(Self::Cookie),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Cookie => "cookie",
        }
    }
}

/// A parameter with its resolved schema and compiled validator.
pub struct CompiledParameter {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
    pub style: ArrayStyle,
    pub explode: bool,
    pub schema: Value,
    pub items: Option<Value>,
    pub validator: Option<Arc<Validator>>,
}

impl CompiledParameter {
    /// Error path used in failure details, e.g. `/query/limit`.
    pub fn pointer(&self) -> String {
        format!("/{}/{}", self.location.as_str(), self.name)
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.schema.get("default")
    }

    pub fn coerce(&self, raw: &[String], coerce: bool) -> Value {
        coerce_values(
            raw,
            &self.schema,
            self.items.as_ref(),
            self.style,
            self.explode,
            coerce,
        )
    }
}

impl fmt::Debug for CompiledParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledParameter")
            .field("name", &self.name)
            .field("location", &self.location)
            .field("required", &self.required)
            .finish_non_exhaustive()
    }
}

/// One declared request body media type.
pub struct CompiledMedia {
    pub range: String,
    pub validator: Option<Arc<Validator>>,
}

impl fmt::Debug for CompiledMedia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledMedia")
            .field("range", &self.range)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct CompiledBody {
    pub required: bool,
    pub media: Vec<CompiledMedia>,
}

impl CompiledBody {
    /// The declared media entry accepting `content_type`, exact matches first.
    pub fn media_for(&self, content_type: &str) -> Option<&CompiledMedia> {
        let essence = media::essence(content_type);
        self.media
            .iter()
            .find(|m| media::essence(&m.range) == essence)
            .or_else(|| self.media.iter().find(|m| media::matches(&m.range, content_type)))
    }
}

/// A single method on a single path template.
#[derive(Debug)]
pub struct CompiledOperation {
    pub method: Method,
    pub template: String,
    pub operation_id: Option<String>,
    pub parameters: Vec<CompiledParameter>,
    pub body: Option<CompiledBody>,
}

impl CompiledOperation {
    /// Handler key: the `operationId`, or `"METHOD /template"` without one.
    pub fn key(&self) -> String {
        match &self.operation_id {
            Some(id) => id.clone(),
            None => format!("{} {}", self.method, self.template),
        }
    }

    pub fn parameters_in(&self, location: ParamLocation) -> impl Iterator<Item = &CompiledParameter> {
        self.parameters.iter().filter(move |p| p.location == location)
    }
}

/// All operations declared on one path template.
#[derive(Debug)]
pub struct PathEntry {
    pub template: String,
    pub operations: Vec<Arc<CompiledOperation>>,
}

/// A matched operation plus its decoded path parameters.
#[derive(Debug, Clone)]
pub struct OperationMatch {
    pub operation: Arc<CompiledOperation>,
    pub path_params: Vec<(String, String)>,
}

/// Result of looking a request up in the index.
#[derive(Debug)]
pub enum Lookup {
    /// The path is not under the API base path.
    Outside,
    NotFound,
    MethodNotAllowed(Vec<Method>),
    Found(OperationMatch),
}

/// Every operation of a document, keyed by path template.
pub struct OperationIndex {
    base_path: String,
    paths: Vec<Arc<PathEntry>>,
    router: matchit::Router<usize>,
}

impl fmt::Debug for OperationIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationIndex")
            .field("base_path", &self.base_path)
            .field("paths", &self.paths.len())
            .finish()
    }
}

impl OperationIndex {
    /// Compile `document`. `base_path` overrides the server URL prefix.
    pub fn build(document: &SchemaDocument, base_path: Option<&str>) -> Result<Self, DocumentError> {
        let root = document.root();
        let compiler = SchemaCompiler::new(root, document.is_openapi_31());
        let base_path = normalize_base(
            base_path
                .map(str::to_string)
                .or_else(|| document.server_base_path()),
        );

        let mut paths = Vec::new();
        let mut router = matchit::Router::new();

        let declared = root
            .get("paths")
            .and_then(Value::as_object)
            .into_iter()
            .flatten();

        for (template, item) in declared {
            if !template.starts_with('/') {
                return Err(DocumentError::Route {
                    template: template.clone(),
                    message: "path templates must start with '/'".to_string(),
                });
            }

            let item_pointer = format!("/paths/{}", escape_pointer(template));
            let item = resolve(root, item)?;
            let shared = item.get("parameters");

            let mut operations = Vec::new();
            for name in METHODS {
                let Some(operation) = item.get(name) else {
                    continue;
                };
                let method = Method::from_bytes(name.to_ascii_uppercase().as_bytes())
                    .unwrap_or(Method::GET);
                let pointer = format!("{item_pointer}/{name}");
                operations.push(Arc::new(compile_operation(
                    root, &compiler, template, method, operation, shared, &pointer,
                )?));
            }

            router
                .insert(template.as_str(), paths.len())
                .map_err(|e| DocumentError::Route {
                    template: template.clone(),
                    message: e.to_string(),
                })?;

            paths.push(Arc::new(PathEntry {
                template: template.clone(),
                operations,
            }));
        }

        tracing::debug!(
            base_path = %base_path,
            paths = paths.len(),
            "Operation index compiled"
        );

        Ok(Self {
            base_path,
            paths,
            router,
        })
    }

    /// Prefix shared by every documented path; empty for the root.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn paths(&self) -> &[Arc<PathEntry>] {
        &self.paths
    }

    pub fn operations(&self) -> impl Iterator<Item = &Arc<CompiledOperation>> {
        self.paths.iter().flat_map(|entry| entry.operations.iter())
    }

    /// Strip the base path, or `None` if `path` lies outside it.
    pub fn relative_path<'a>(&self, path: &'a str) -> Option<&'a str> {
        if self.base_path.is_empty() {
            return Some(path);
        }
        match path.strip_prefix(self.base_path.as_str()) {
            Some("") => Some("/"),
            Some(rest) if rest.starts_with('/') => Some(rest),
            _ => None,
        }
    }

    pub fn lookup(&self, method: &Method, path: &str) -> Lookup {
        let Some(relative) = self.relative_path(path) else {
            return Lookup::Outside;
        };
        let Ok(matched) = self.router.at(relative) else {
            return Lookup::NotFound;
        };
        let entry = &self.paths[*matched.value];

        let found = entry
            .operations
            .iter()
            .find(|op| op.method == *method)
            .or_else(|| {
                (*method == Method::HEAD)
                    .then(|| entry.operations.iter().find(|op| op.method == Method::GET))
                    .flatten()
            });

        match found {
            Some(operation) => Lookup::Found(OperationMatch {
                operation: Arc::clone(operation),
                path_params: matched
                    .params
                    .iter()
                    .map(|(name, value)| {
                        (
                            name.to_string(),
                            percent_decode_str(value).decode_utf8_lossy().into_owned(),
                        )
                    })
                    .collect(),
            }),
            None => Lookup::MethodNotAllowed(
                entry.operations.iter().map(|op| op.method.clone()).collect(),
            ),
        }
    }
}

fn normalize_base(base: Option<String>) -> String {
    match base {
        Some(base) => {
            let trimmed = base.trim_end_matches('/');
            if trimmed.is_empty() || trimmed.starts_with('/') {
                trimmed.to_string()
            } else {
                format!("/{trimmed}")
            }
        }
        None => String::new(),
    }
}

fn compile_operation(
    root: &Value,
    compiler: &SchemaCompiler,
    template: &str,
    method: Method,
    operation: &Value,
    shared: Option<&Value>,
    pointer: &str,
) -> Result<CompiledOperation, DocumentError> {
    let mut parameters: Vec<CompiledParameter> = Vec::new();

    let declared = [
        (shared, format!("{}/parameters", parent_pointer(pointer))),
        (operation.get("parameters"), format!("{pointer}/parameters")),
    ];
    for (list, list_pointer) in declared {
        let Some(list) = list.and_then(Value::as_array) else {
            continue;
        };
        for (i, parameter) in list.iter().enumerate() {
            let Some(compiled) =
                compile_parameter(root, compiler, parameter, &format!("{list_pointer}/{i}"))?
            else {
                continue;
            };
            // Operation-level declarations override path-level ones.
            parameters.retain(|p| !(p.name == compiled.name && p.location == compiled.location));
            parameters.push(compiled);
        }
    }

    let body = match operation.get("requestBody") {
        Some(body) => Some(compile_body(
            root,
            compiler,
            body,
            &format!("{pointer}/requestBody"),
        )?),
        None => None,
    };

    Ok(CompiledOperation {
        method,
        template: template.to_string(),
        operation_id: operation
            .get("operationId")
            .and_then(Value::as_str)
            .map(str::to_string),
        parameters,
        body,
    })
}

fn parent_pointer(pointer: &str) -> &str {
    pointer.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

fn compile_parameter(
    root: &Value,
    compiler: &SchemaCompiler,
    parameter: &Value,
    pointer: &str,
) -> Result<Option<CompiledParameter>, DocumentError> {
    let parameter = resolve(root, parameter)?;

    let name = parameter
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| DocumentError::Schema {
            pointer: pointer.to_string(),
            message: "parameter has no name".to_string(),
        })?;
    let declared_in = parameter.get("in").and_then(Value::as_str).unwrap_or_default();
    let Some(location) = ParamLocation::parse(declared_in) else {
        tracing::warn!(pointer, location = declared_in, "Ignoring parameter with unknown location");
        return Ok(None);
    };
    if location == ParamLocation::Header && RESERVED_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
        return Ok(None);
    }

    let style = parameter.get("style").and_then(Value::as_str);
    let form_by_default = matches!(location, ParamLocation::Query | ParamLocation::Cookie);
    let explode = parameter
        .get("explode")
        .and_then(Value::as_bool)
        .unwrap_or_else(|| style.map_or(form_by_default, |s| s == "form"));

    // `content` is the alternative to `schema` for complex parameters.
    let raw_schema = parameter.get("schema").or_else(|| {
        parameter
            .get("content")
            .and_then(Value::as_object)
            .and_then(|content| content.values().next())
            .and_then(|media| media.get("schema"))
    });

    let (schema, items, validator) = match raw_schema {
        Some(raw) => {
            let schema = resolve(root, raw)?.clone();
            let items = match schema.get("items") {
                Some(items) => Some(resolve(root, items)?.clone()),
                None => None,
            };
            let validator = compiler.compile(raw, &format!("{pointer}/schema"))?;
            (schema, items, Some(validator))
        }
        None => (Value::Null, None, None),
    };

    Ok(Some(CompiledParameter {
        name: name.to_string(),
        location,
        required: location == ParamLocation::Path
            || parameter.get("required").and_then(Value::as_bool).unwrap_or(false),
        style: ArrayStyle::from_openapi(style),
        explode,
        schema,
        items,
        validator,
    }))
}

fn compile_body(
    root: &Value,
    compiler: &SchemaCompiler,
    body: &Value,
    pointer: &str,
) -> Result<CompiledBody, DocumentError> {
    let body = resolve(root, body)?;
    let mut media = Vec::new();

    for (range, entry) in body.get("content").and_then(Value::as_object).into_iter().flatten() {
        let validator = match entry.get("schema") {
            Some(schema) => Some(compiler.compile(
                schema,
                &format!("{pointer}/content/{}/schema", escape_pointer(range)),
            )?),
            None => None,
        };
        media.push(CompiledMedia {
            range: range.clone(),
            validator,
        });
    }

    Ok(CompiledBody {
        required: body.get("required").and_then(Value::as_bool).unwrap_or(false),
        media,
    })
}
