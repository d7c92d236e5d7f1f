//! Request body parsing.
//!
//! # Responsibilities
//! - Enforce the configured body size limit
//! - Parse JSON, URL-encoded, plain text and octet-stream bodies
//! - Expose the parsed value to later stages as a [`ParsedBody`] extension
//!
//! # Design Decisions
//! - Declared `Content-Length` over the limit is rejected before reading
//! - The buffered bytes are put back on the request so axum extractors in
//!   handlers keep working
//! - Unrecognized content types pass through untouched

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;
use bytes::Bytes;
use http_body_util::LengthLimitError;
use serde_json::{Map, Value};

use crate::http::error::{ApiError, ErrorDetail};
use crate::http::media;

/// The parsed request body, available as a request extension.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedBody {
    Json(Value),
    /// URL-encoded form; repeated keys become arrays.
    Form(Map<String, Value>),
    Text(String),
    Raw(Bytes),
}

impl ParsedBody {
    /// The body as a JSON value, for schema validation.
    pub fn to_json(&self) -> Option<Value> {
        match self {
            Self::Json(value) => Some(value.clone()),
            Self::Form(map) => Some(Value::Object(map.clone())),
            Self::Text(text) => Some(Value::String(text.clone())),
            Self::Raw(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Json,
    Form,
    Text,
    Raw,
}

/// Body parser settings shared by every request.
#[derive(Debug, Clone)]
pub struct BodyParser {
    limit: usize,
    json_type: String,
}

impl BodyParser {
    pub fn new(limit: usize, json_type: impl Into<String>) -> Self {
        Self {
            limit,
            json_type: json_type.into(),
        }
    }

    fn kind(&self, content_type: &str) -> Option<BodyKind> {
        if media::matches(&self.json_type, content_type) {
            Some(BodyKind::Json)
        } else if media::matches("application/x-www-form-urlencoded", content_type) {
            Some(BodyKind::Form)
        } else if media::matches("text/plain", content_type) {
            Some(BodyKind::Text)
        } else if media::matches("application/octet-stream", content_type) {
            Some(BodyKind::Raw)
        } else {
            None
        }
    }

    fn declared_length(headers: &HeaderMap) -> Option<usize> {
        headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    }

    fn parse(&self, kind: BodyKind, bytes: &Bytes) -> Result<ParsedBody, ApiError> {
        match kind {
            BodyKind::Json => serde_json::from_slice(bytes)
                .map(ParsedBody::Json)
                .map_err(|e| {
                    ApiError::bad_request(format!("malformed JSON body: {e}"))
                        .with_errors(vec![ErrorDetail::new("/body", e.to_string())])
                }),
            BodyKind::Form => Ok(ParsedBody::Form(parse_form(bytes))),
            BodyKind::Text => String::from_utf8(bytes.to_vec())
                .map(ParsedBody::Text)
                .map_err(|_| ApiError::bad_request("text body is not valid UTF-8")),
            BodyKind::Raw => Ok(ParsedBody::Raw(bytes.clone())),
        }
    }
}

/// Decode `a=1&b=2&b=3` into `{"a": "1", "b": ["2", "3"]}`.
pub fn parse_form(bytes: &[u8]) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in url::form_urlencoded::parse(bytes) {
        let value = Value::String(value.into_owned());
        match map.get_mut(key.as_ref()) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(key.into_owned(), value);
            }
        }
    }
    map
}

fn is_length_limit(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.is::<LengthLimitError>() {
            return true;
        }
        current = e.source();
    }
    false
}

/// Body parsing middleware.
pub async fn parse_body(
    State(parser): State<Arc<BodyParser>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let kind = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|ct| parser.kind(ct));

    let Some(kind) = kind else {
        return Ok(next.run(request).await);
    };

    if let Some(length) = BodyParser::declared_length(request.headers()) {
        if length > parser.limit {
            return Err(ApiError::payload_too_large(parser.limit));
        }
        if length == 0 {
            return Ok(next.run(request).await);
        }
    }

    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, parser.limit).await.map_err(|e| {
        let inner = e.into_inner();
        if is_length_limit(inner.as_ref()) {
            ApiError::payload_too_large(parser.limit)
        } else {
            ApiError::bad_request(format!("failed to read request body: {inner}"))
        }
    })?;

    let mut request = Request::from_parts(parts, Body::from(bytes.clone()));
    if !bytes.is_empty() {
        let parsed = parser.parse(kind, &bytes)?;
        request.extensions_mut().insert(parsed);
    }

    Ok(next.run(request).await)
}
