//! Schema-based request validation.
//!
//! # Responsibilities
//! - Match requests to documented operations
//! - Check required parameters and parameter schemas
//! - Check the request body media type and schema
//! - Decide body presence from the request itself, so bodies the parser
//!   leaves alone are still checked against the declared media types
//! - Reject undeclared query parameters unless allowed
//!
//! # Design Decisions
//! - All problems of one request are reported together
//! - Unknown paths under the base path are 404, unknown methods 405
//! - Paths outside the base path and ignored prefixes pass through
//! - The matched operation is stored for the normalization stage

use std::sync::Arc;

use axum::body::HttpBody;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use jsonschema::Validator;
use serde_json::Value;

use crate::config::ValidatorConfig;
use crate::document::{Lookup, OperationIndex, OperationMatch};
use crate::http::error::{ApiError, ErrorDetail};
use crate::middleware::body::ParsedBody;
use crate::middleware::normalize::RawParameters;

/// Validates requests against the compiled operation index.
#[derive(Debug)]
pub struct RequestValidator {
    index: Arc<OperationIndex>,
    config: ValidatorConfig,
}

impl RequestValidator {
    pub fn new(index: Arc<OperationIndex>, config: ValidatorConfig) -> Self {
        Self { index, config }
    }

    fn ignored(&self, path: &str) -> bool {
        self.config
            .ignore_paths
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Validate `request`, returning the matched operation when there is one.
    pub fn validate(&self, request: &Request) -> Result<Option<OperationMatch>, ApiError> {
        let path = request.uri().path();
        if !self.config.validate_requests || self.ignored(path) {
            return Ok(None);
        }

        let matched = match self.index.lookup(request.method(), path) {
            Lookup::Outside => return Ok(None),
            Lookup::NotFound => return Err(ApiError::not_found(path)),
            Lookup::MethodNotAllowed(allowed) => {
                let allowed = allowed.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ");
                return Err(ApiError::new(format!("{} method not allowed", request.method()))
                    .with_status(StatusCode::METHOD_NOT_ALLOWED)
                    .with_errors(vec![ErrorDetail::new(
                        path,
                        format!("allowed methods: {allowed}"),
                    )]));
            }
            Lookup::Found(matched) => matched,
        };

        let mut errors = Vec::new();
        self.check_parameters(request, &matched, &mut errors);
        self.check_body(request, &matched, &mut errors)?;

        if errors.is_empty() {
            Ok(Some(matched))
        } else {
            Err(ApiError::validation(errors))
        }
    }

    fn check_parameters(&self, request: &Request, matched: &OperationMatch, errors: &mut Vec<ErrorDetail>) {
        let raw = RawParameters::collect(request, matched);
        let operation = &matched.operation;

        for parameter in &operation.parameters {
            let values = raw.values(parameter);
            if values.is_empty() {
                if parameter.required {
                    errors.push(
                        ErrorDetail::new(parameter.pointer(), "is required").with_code("required"),
                    );
                }
                continue;
            }

            if let Some(validator) = &parameter.validator {
                let value = parameter.coerce(&values, self.config.coerce_types);
                schema_errors(validator, &value, &parameter.pointer(), errors);
            }
        }

        if !self.config.allow_unknown_query_parameters {
            for key in raw.undeclared_query_keys(operation) {
                errors.push(
                    ErrorDetail::new(format!("/query/{key}"), "is not allowed")
                        .with_code("unknown_query_parameter"),
                );
            }
        }
    }

    fn check_body(
        &self,
        request: &Request,
        matched: &OperationMatch,
        errors: &mut Vec<ErrorDetail>,
    ) -> Result<(), ApiError> {
        let Some(body) = &matched.operation.body else {
            return Ok(());
        };

        if !has_body(request) {
            if body.required {
                errors.push(ErrorDetail::new("/body", "is required").with_code("required"));
            }
            return Ok(());
        }

        let content_type = request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let Some(media) = body.media_for(content_type) else {
            return Err(unsupported_media_type(content_type));
        };

        // Only types the body parser understands carry a value to check.
        let parsed = request.extensions().get::<ParsedBody>().and_then(ParsedBody::to_json);
        if let (Some(validator), Some(value)) = (&media.validator, parsed) {
            schema_errors(validator, &value, "/body", errors);
        }
        Ok(())
    }
}

/// Whether the request carries body bytes, whatever their media type.
fn has_body(request: &Request) -> bool {
    let headers = request.headers();
    if let Some(length) = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
    {
        return length > 0;
    }
    if headers.contains_key(header::TRANSFER_ENCODING) {
        return true;
    }
    let body = request.body();
    !body.is_end_stream() && body.size_hint().upper() != Some(0)
}

fn unsupported_media_type(content_type: &str) -> ApiError {
    let message = if content_type.is_empty() {
        "missing content type".to_string()
    } else {
        format!("unsupported media type {content_type}")
    };
    ApiError::new(message)
        .with_status(StatusCode::UNSUPPORTED_MEDIA_TYPE)
        .with_errors(vec![
            ErrorDetail::new("/body", "unsupported media type").with_code("content_type")
        ])
}

fn schema_errors(validator: &Validator, value: &Value, pointer: &str, errors: &mut Vec<ErrorDetail>) {
    for error in validator.iter_errors(value) {
        errors.push(
            ErrorDetail::new(format!("{pointer}{}", error.instance_path), error.to_string())
                .with_code("schema"),
        );
    }
}

/// Request validation middleware.
pub async fn validate_requests(
    State(validator): State<Arc<RequestValidator>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(matched) = validator.validate(&request)? {
        request.extensions_mut().insert(matched);
    }
    Ok(next.run(request).await)
}
