//! Cross-origin policy.
//!
//! Translates [`CorsConfig`] into a `tower_http` [`CorsLayer`]. An empty list
//! or one containing `*` means "any"; values were checked by
//! `config::validation` beforehand, so entries that still fail to parse are
//! skipped.

use std::time::Duration;

use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer, ExposeHeaders};

use crate::config::CorsConfig;

/// Build the CORS layer for the pipeline.
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origin = if is_any(&config.allowed_origins) {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            config
                .allowed_origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };

    let methods = if is_any(&config.allowed_methods) {
        AllowMethods::from(Any)
    } else {
        AllowMethods::list(
            config
                .allowed_methods
                .iter()
                .filter_map(|m| Method::from_bytes(m.to_ascii_uppercase().as_bytes()).ok()),
        )
    };

    let headers = if is_any(&config.allowed_headers) {
        AllowHeaders::from(Any)
    } else {
        AllowHeaders::list(header_names(&config.allowed_headers))
    };

    let exposed = if config.exposed_headers.iter().any(|h| h.trim() == "*") {
        ExposeHeaders::from(Any)
    } else {
        ExposeHeaders::list(header_names(&config.exposed_headers))
    };

    let mut layer = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(methods)
        .allow_headers(headers)
        .expose_headers(exposed)
        .allow_credentials(config.allow_credentials);

    if let Some(secs) = config.max_age_secs {
        layer = layer.max_age(Duration::from_secs(secs));
    }

    layer
}

fn is_any(values: &[String]) -> bool {
    values.is_empty() || values.iter().any(|v| v.trim() == "*")
}

fn header_names(names: &[String]) -> Vec<HeaderName> {
    names
        .iter()
        .filter_map(|h| HeaderName::from_bytes(h.as_bytes()).ok())
        .collect()
}
