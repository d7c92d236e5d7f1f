//! Parameter normalization.
//!
//! # Responsibilities
//! - Gather raw path, query, header and cookie values for an operation
//! - Coerce them to their schema types and fill in schema defaults
//! - Hand handlers a typed [`RequestParams`] extension / extractor
//!
//! # Design Decisions
//! - Reuses the operation matched by the validator when there is one
//! - Runs even when validation is disabled or skipped for a path
//! - Requests that match no operation get empty parameters

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Uri};
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::cookie::CookieJar;
use serde_json::{Map, Value};

use crate::document::index::CompiledParameter;
use crate::document::{CompiledOperation, Lookup, OperationIndex, OperationMatch, ParamLocation};
use crate::middleware::cookies::request_cookies;

/// Raw string values of a request, grouped by parameter location.
pub(crate) struct RawParameters {
    path: Vec<(String, String)>,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    cookies: CookieJar,
}

impl RawParameters {
    pub(crate) fn collect(request: &Request, matched: &OperationMatch) -> Self {
        Self {
            path: matched.path_params.clone(),
            query: query_pairs(request.uri()),
            headers: request.headers().clone(),
            cookies: request_cookies(request),
        }
    }

    /// Every raw value supplied for `parameter`, in request order.
    pub(crate) fn values(&self, parameter: &CompiledParameter) -> Vec<String> {
        let name = parameter.name.as_str();
        match parameter.location {
            ParamLocation::Path => self
                .path
                .iter()
                .filter(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
                .collect(),
            ParamLocation::Query => self
                .query
                .iter()
                .filter(|(k, _)| query_key_matches(k, name))
                .map(|(_, v)| v.clone())
                .collect(),
            ParamLocation::Header => self
                .headers
                .get_all(name)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .map(str::to_string)
                .collect(),
            ParamLocation::Cookie => self
                .cookies
                .get(name)
                .map(|c| vec![c.value().to_string()])
                .unwrap_or_default(),
        }
    }

    /// Query keys that no declared parameter accounts for.
    pub(crate) fn undeclared_query_keys<'a>(&'a self, operation: &'a CompiledOperation) -> Vec<&'a str> {
        let mut keys: Vec<&str> = Vec::new();
        for (key, _) in &self.query {
            let declared = operation
                .parameters_in(ParamLocation::Query)
                .any(|p| query_key_matches(key, &p.name));
            if !declared && !keys.contains(&key.as_str()) {
                keys.push(key);
            }
        }
        keys
    }

    fn query_values(&self, key: &str) -> Vec<String> {
        self.query
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .collect()
    }
}

/// `ids[]` is accepted as a spelling of `ids`.
fn query_key_matches(key: &str, name: &str) -> bool {
    key == name || key.strip_suffix("[]") == Some(name)
}

fn query_pairs(uri: &Uri) -> Vec<(String, String)> {
    url::form_urlencoded::parse(uri.query().unwrap_or_default().as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// Normalized parameters of the matched operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestParams {
    /// Handler key of the matched operation.
    pub operation: Option<String>,
    pub path: Map<String, Value>,
    pub query: Map<String, Value>,
    pub headers: Map<String, Value>,
    pub cookies: Map<String, Value>,
}

impl RequestParams {
    pub fn get(&self, location: ParamLocation, name: &str) -> Option<&Value> {
        self.section(location).get(name)
    }

    fn section(&self, location: ParamLocation) -> &Map<String, Value> {
        match location {
            ParamLocation::Path => &self.path,
            ParamLocation::Query => &self.query,
            ParamLocation::Header => &self.headers,
            ParamLocation::Cookie => &self.cookies,
        }
    }

    fn section_mut(&mut self, location: ParamLocation) -> &mut Map<String, Value> {
        match location {
            ParamLocation::Path => &mut self.path,
            ParamLocation::Query => &mut self.query,
            ParamLocation::Header => &mut self.headers,
            ParamLocation::Cookie => &mut self.cookies,
        }
    }
}

impl<S> FromRequestParts<S> for RequestParams
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Self>().cloned().unwrap_or_default())
    }
}

/// Builds [`RequestParams`] for each request.
#[derive(Debug)]
pub struct ParamNormalizer {
    index: Arc<OperationIndex>,
    coerce: bool,
}

impl ParamNormalizer {
    pub fn new(index: Arc<OperationIndex>, coerce: bool) -> Self {
        Self { index, coerce }
    }

    pub fn normalize(&self, request: &Request) -> RequestParams {
        let matched = request.extensions().get::<OperationMatch>().cloned().or_else(|| {
            match self.index.lookup(request.method(), request.uri().path()) {
                Lookup::Found(matched) => Some(matched),
                _ => None,
            }
        });
        let Some(matched) = matched else {
            return RequestParams::default();
        };

        let raw = RawParameters::collect(request, &matched);
        let operation = &matched.operation;
        let mut params = RequestParams {
            operation: Some(operation.key()),
            ..RequestParams::default()
        };

        for parameter in &operation.parameters {
            let values = raw.values(parameter);
            let value = if values.is_empty() {
                match parameter.default_value() {
                    Some(default) => default.clone(),
                    None => continue,
                }
            } else {
                parameter.coerce(&values, self.coerce)
            };
            params
                .section_mut(parameter.location)
                .insert(parameter.name.clone(), value);
        }

        for key in raw.undeclared_query_keys(operation) {
            let mut values: Vec<Value> = raw.query_values(key).into_iter().map(Value::String).collect();
            let value = if values.len() == 1 {
                values.remove(0)
            } else {
                Value::Array(values)
            };
            params.query.insert(key.to_string(), value);
        }

        params
    }
}

/// Parameter normalization middleware.
pub async fn normalize_params(
    State(normalizer): State<Arc<ParamNormalizer>>,
    mut request: Request,
    next: Next,
) -> Response {
    let params = normalizer.normalize(&request);
    request.extensions_mut().insert(params);
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::header;
    use serde_json::json;

    use crate::document::SchemaDocument;

    fn index() -> Arc<OperationIndex> {
        let document = SchemaDocument::from_value(
            "test.yaml",
            json!({
                "openapi": "3.0.3",
                "paths": {
                    "/pets/{petId}": {
                        "get": {
                            "operationId": "showPet",
                            "parameters": [
                                { "name": "petId", "in": "path", "schema": { "type": "integer" } },
                                { "name": "verbose", "in": "query", "schema": { "type": "boolean", "default": false } },
                                { "name": "fields", "in": "query", "schema": { "type": "array", "items": { "type": "string" } } },
                                { "name": "X-Trace", "in": "header", "schema": { "type": "integer" } },
                                { "name": "session", "in": "cookie", "schema": { "type": "string" } }
                            ]
                        }
                    }
                }
            }),
        )
        .unwrap();
        Arc::new(OperationIndex::build(&document, None).unwrap())
    }

    fn request(uri: &str) -> Request {
        axum::http::Request::builder()
            .uri(uri)
            .header("x-trace", "99")
            .header(header::COOKIE, "session=s1")
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_normalize_coerces_and_fills_defaults() {
        let normalizer = ParamNormalizer::new(index(), true);
        let params = normalizer.normalize(&request("/pets/7?fields%5B%5D=name&fields%5B%5D=tag&extra=1"));

        assert_eq!(params.operation.as_deref(), Some("showPet"));
        assert_eq!(params.get(ParamLocation::Path, "petId"), Some(&json!(7)));
        assert_eq!(params.get(ParamLocation::Query, "verbose"), Some(&json!(false)));
        assert_eq!(params.get(ParamLocation::Query, "fields"), Some(&json!(["name", "tag"])));
        assert_eq!(params.get(ParamLocation::Query, "extra"), Some(&json!("1")));
        assert_eq!(params.get(ParamLocation::Header, "X-Trace"), Some(&json!(99)));
        assert_eq!(params.get(ParamLocation::Cookie, "session"), Some(&json!("s1")));
    }

    #[test]
    fn test_normalize_without_coercion_keeps_strings() {
        let normalizer = ParamNormalizer::new(index(), false);
        let params = normalizer.normalize(&request("/pets/7?verbose=true"));
        assert_eq!(params.get(ParamLocation::Path, "petId"), Some(&json!("7")));
        assert_eq!(params.get(ParamLocation::Query, "verbose"), Some(&json!("true")));
    }

    #[test]
    fn test_unmatched_request_gets_empty_params() {
        let normalizer = ParamNormalizer::new(index(), true);
        assert_eq!(normalizer.normalize(&request("/owners")), RequestParams::default());
    }
}
