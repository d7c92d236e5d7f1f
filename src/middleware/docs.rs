//! Documentation UI.
//!
//! Serves Swagger UI under `docs.path`, seeded with the parsed document,
//! which is itself served as JSON at `docs.spec_url`.

use axum::Router;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::DocsConfig;
use crate::document::SchemaDocument;

/// Routes for the documentation UI; empty when disabled.
pub fn docs_router(config: &DocsConfig, document: &SchemaDocument) -> Router {
    if !config.enabled {
        return Router::new();
    }

    tracing::debug!(path = %config.path, spec_url = %config.spec_url, "Serving documentation UI");
    SwaggerUi::new(config.path.clone())
        .external_url_unchecked(config.spec_url.clone(), document.root().clone())
        .into()
}
