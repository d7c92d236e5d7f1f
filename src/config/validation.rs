//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (status thresholds, body limits)
//! - Check that paths and header values are usable by the pipeline
//! - Detect CORS combinations the layer would refuse at runtime
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppOptions → Result<(), Vec<ValidationError>>
//! - Runs before any stage is constructed

use std::fmt;
use std::net::SocketAddr;

use axum::http::{HeaderName, HeaderValue, Method};

use crate::config::schema::{AppConfig, AppOptions, CorsConfig};
use crate::middleware::access_log::LogFormat;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate the service configuration read by the binary.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("`{}` is not a socket address", config.listener.bind_address),
        ));
    }

    if let Err(mut option_errors) = validate_options(&config.options) {
        for err in &mut option_errors {
            err.field = format!("options.{}", err.field);
        }
        errors.append(&mut option_errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate the assembler options bundle.
pub fn validate_options(options: &AppOptions) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if options.parser.limit.as_bytes() == 0 {
        errors.push(ValidationError::new("parser.limit", "must be greater than zero"));
    }
    if !is_media_range(&options.parser.content_type) {
        errors.push(ValidationError::new(
            "parser.content_type",
            format!("`{}` is not a media type", options.parser.content_type),
        ));
    }

    for (i, prefix) in options.validator.ignore_paths.iter().enumerate() {
        if !prefix.starts_with('/') {
            errors.push(ValidationError::new(
                format!("validator.ignore_paths[{i}]"),
                "must start with '/'",
            ));
        }
    }

    if let Some(format) = &options.logging.format {
        if let Err(e) = LogFormat::parse(format) {
            errors.push(ValidationError::new("logging.format", e.to_string()));
        }
    }
    if let Some(threshold) = options.logging.error_threshold {
        if !(100..=599).contains(&threshold.0) {
            errors.push(ValidationError::new(
                "logging.error_threshold",
                format!("{} is not an HTTP status code", threshold.0),
            ));
        }
    }

    validate_cors(&options.cors, &mut errors);

    if options.docs.enabled {
        if !options.docs.path.starts_with('/') || options.docs.path == "/" {
            errors.push(ValidationError::new(
                "docs.path",
                "must start with '/' and not be the root",
            ));
        }
        if !options.docs.spec_url.starts_with('/') {
            errors.push(ValidationError::new("docs.spec_url", "must start with '/'"));
        }
    }

    if let Some(base) = &options.routing.base_path {
        if !base.starts_with('/') {
            errors.push(ValidationError::new("routing.base_path", "must start with '/'"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_cors(cors: &CorsConfig, errors: &mut Vec<ValidationError>) {
    for origin in &cors.allowed_origins {
        if origin != "*" && HeaderValue::from_str(origin).is_err() {
            errors.push(ValidationError::new(
                "cors.allowed_origins",
                format!("`{origin}` is not a valid header value"),
            ));
        }
    }
    for method in &cors.allowed_methods {
        if Method::from_bytes(method.as_bytes()).is_err() {
            errors.push(ValidationError::new(
                "cors.allowed_methods",
                format!("`{method}` is not an HTTP method"),
            ));
        }
    }
    for (field, headers) in [
        ("cors.allowed_headers", &cors.allowed_headers),
        ("cors.exposed_headers", &cors.exposed_headers),
    ] {
        for header in headers {
            if HeaderName::from_bytes(header.as_bytes()).is_err() {
                errors.push(ValidationError::new(
                    field,
                    format!("`{header}` is not a header name"),
                ));
            }
        }
    }

    // tower-http refuses credentials together with any wildcard
    if cors.allow_credentials {
        let is_wildcard = |values: &[String]| values.iter().any(|v| v.trim() == "*");
        let wildcard = cors.allowed_origins.is_empty()
            || is_wildcard(&cors.allowed_origins)
            || cors.allowed_methods.is_empty()
            || is_wildcard(&cors.allowed_methods)
            || cors.allowed_headers.is_empty()
            || is_wildcard(&cors.allowed_headers);
        if wildcard {
            errors.push(ValidationError::new(
                "cors.allow_credentials",
                "requires explicit origins, methods and headers",
            ));
        }
        if is_wildcard(&cors.exposed_headers) {
            errors.push(ValidationError::new(
                "cors.exposed_headers",
                "`*` cannot be exposed with credentials",
            ));
        }
    }
}

fn is_media_range(value: &str) -> bool {
    match value.split_once('/') {
        Some((kind, subtype)) => !kind.trim().is_empty() && !subtype.trim().is_empty(),
        None => false,
    }
}
