//! Dynamic route dispatch.
//!
//! # Responsibilities
//! - Mount one axum route per documented path template
//! - Attach each operation's registered handler to its method
//! - Answer undocumented operations with 501 Not Implemented
//!
//! # Design Decisions
//! - Routes are built once from the compiled index; nothing is matched by
//!   hand at request time
//! - Documented paths are nested under the API base path
//! - Misses are [`ApiError`]s so they render like every other failure

use axum::http::{Method, Uri};
use axum::routing::{MethodFilter, MethodRouter};
use axum::Router;

use crate::config::RoutingConfig;
use crate::document::OperationIndex;
use crate::http::error::{ApiError, ErrorDetail};
use crate::routing::registry::HandlerRegistry;

/// Errors raised while mounting operation handlers.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("no handler registered for operations: {}", .0.join(", "))]
    MissingHandlers(Vec<String>),

    #[error("method {method} on {template} cannot be routed")]
    UnsupportedMethod { method: Method, template: String },
}

/// Build the dispatch router for every operation in `index`.
pub fn build_router(
    index: &OperationIndex,
    registry: &HandlerRegistry,
    config: &RoutingConfig,
) -> Result<Router, RoutingError> {
    let mut missing = Vec::new();
    let mut routed = Vec::new();
    let mut inner = Router::new();

    for entry in index.paths() {
        if entry.operations.is_empty() {
            continue;
        }

        let allowed = entry
            .operations
            .iter()
            .map(|op| op.method.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let mut method_router: MethodRouter = MethodRouter::new();

        for operation in &entry.operations {
            let filter = MethodFilter::try_from(operation.method.clone()).map_err(|_| {
                RoutingError::UnsupportedMethod {
                    method: operation.method.clone(),
                    template: entry.template.clone(),
                }
            })?;
            let key = operation.key();

            let route = match registry.route(&key, filter) {
                Some(route) => route,
                None => {
                    missing.push(key.clone());
                    not_implemented(filter, key.clone())
                }
            };
            method_router = method_router.merge(route);
            routed.push(key);
        }

        let fallback_allowed = allowed.clone();
        method_router = method_router.fallback(move |method: Method, uri: Uri| {
            let allowed = fallback_allowed.clone();
            async move {
                ApiError::new(format!("{method} method not allowed"))
                    .with_status(axum::http::StatusCode::METHOD_NOT_ALLOWED)
                    .with_errors(vec![ErrorDetail::new(
                        uri.path(),
                        format!("allowed methods: {allowed}"),
                    )])
            }
        });

        inner = inner.route(&entry.template, method_router);
    }

    if !missing.is_empty() {
        if config.require_handlers {
            return Err(RoutingError::MissingHandlers(missing));
        }
        tracing::warn!(
            operations = %missing.join(", "),
            "Operations without handlers will answer 501"
        );
    }

    for key in registry.keys() {
        if !routed.iter().any(|k| k == key) {
            tracing::warn!(operation = %key, "Handler registered for unknown operation");
        }
    }

    tracing::debug!(
        base_path = %index.base_path(),
        operations = routed.len(),
        "Dispatch routes mounted"
    );

    let router = if index.base_path().is_empty() {
        inner
    } else {
        Router::new().nest(index.base_path(), inner)
    };
    Ok(router.fallback(|uri: Uri| async move { ApiError::not_found(uri.path()) }))
}

fn not_implemented(filter: MethodFilter, key: String) -> MethodRouter {
    axum::routing::on(filter, move || {
        let key = key.clone();
        async move {
            ApiError::new(format!("operation {key} is not implemented"))
                .with_status(axum::http::StatusCode::NOT_IMPLEMENTED)
        }
    })
}
