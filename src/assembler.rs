//! Application assembly.
//!
//! # Responsibilities
//! - Resolve and validate the options bundle
//! - Load the schema document and compile its operations
//! - Instantiate every pipeline stage and install them in a fixed order
//! - Hand back an [`App`] owning the assembled `axum::Router`
//!
//! # Pipeline
//! ```text
//! cors → failure rendering → body parser → access log → cookies
//!     → caller routes | documentation UI
//!     → validation → normalization → caller middlewares → dispatch
//! ```
//!
//! # Design Decisions
//! - Construction either returns a complete [`App`] or an error; there is
//!   no partially assembled state
//! - Layers are applied innermost first so that registration order is
//!   execution order
//! - Failures are rendered just inside CORS so every stage's failures go
//!   through the same handler and still carry CORS headers; failures from
//!   below the access log are rendered there already, so the log line shows
//!   the response the client gets
//! - Documentation and caller routes are matched before the API fallback,
//!   so they never reach validation or dispatch

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::handler::Handler;
use axum::middleware::{from_fn, from_fn_with_state, map_response_with_state};
use axum::Router;

use crate::config::loader::join_errors;
use crate::config::validation::{validate_options, ValidationError};
use crate::config::AppOptions;
use crate::document::{DocumentError, OperationIndex, SchemaDocument};
use crate::http::failure::{render_failures, FailureHandler, JsonFailureHandler};
use crate::middleware::access_log::{log_requests, AccessLog, LogFormatError};
use crate::middleware::body::{parse_body, BodyParser};
use crate::middleware::cookies::parse_cookies;
use crate::middleware::cors::cors_layer;
use crate::middleware::custom::{run_custom, Middleware};
use crate::middleware::docs::docs_router;
use crate::middleware::normalize::{normalize_params, ParamNormalizer};
use crate::middleware::validate::{validate_requests, RequestValidator};
use crate::routing::{build_router, HandlerRegistry, RoutingError};

/// Errors that prevent an [`App`] from being assembled.
#[derive(Debug, thiserror::Error)]
pub enum AssembleError {
    #[error("invalid options: {}", join_errors(.0))]
    Config(Vec<ValidationError>),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("invalid log format: {0}")]
    LogFormat(#[from] LogFormatError),

    #[error(transparent)]
    Routing(#[from] RoutingError),
}

/// One stage of the request pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Cors,
    BodyParser,
    AccessLog,
    Cookies,
    Docs,
    Validation,
    Normalization,
    /// Caller middleware at this registration index.
    Custom(usize),
    Dispatch,
    FailureHandler,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cors => f.write_str("cors"),
            Self::BodyParser => f.write_str("body-parser"),
            Self::AccessLog => f.write_str("access-log"),
            Self::Cookies => f.write_str("cookies"),
            Self::Docs => f.write_str("docs"),
            Self::Validation => f.write_str("validation"),
            Self::Normalization => f.write_str("normalization"),
            Self::Custom(index) => write!(f, "middleware[{index}]"),
            Self::Dispatch => f.write_str("dispatch"),
            Self::FailureHandler => f.write_str("failure-handler"),
        }
    }
}

/// An assembled application.
pub struct App {
    router: Router,
    document: Arc<SchemaDocument>,
    stages: Vec<Stage>,
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("document", &self.document.path())
            .field("stages", &self.stages)
            .finish()
    }
}

impl App {
    pub fn builder(definition_path: impl Into<PathBuf>) -> AppBuilder {
        AppBuilder::new(definition_path)
    }

    /// Assemble with `options` and caller `middlewares`, without handlers.
    pub fn new(
        definition_path: impl Into<PathBuf>,
        options: AppOptions,
        middlewares: Vec<Arc<dyn Middleware>>,
    ) -> Result<Self, AssembleError> {
        let mut builder = AppBuilder::new(definition_path).options(options);
        builder.middlewares.extend(middlewares);
        builder.build()
    }

    /// The assembled router. Cloning is cheap and has no side effects.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn into_router(self) -> Router {
        self.router
    }

    /// The parsed schema document served by the documentation UI.
    pub fn document(&self) -> &Arc<SchemaDocument> {
        &self.document
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }
}

/// Collects the inputs of an [`App`].
pub struct AppBuilder {
    definition_path: PathBuf,
    options: AppOptions,
    router: Option<Router>,
    handlers: HandlerRegistry,
    middlewares: Vec<Arc<dyn Middleware>>,
    content_type: Option<String>,
    failure_handler: Arc<dyn FailureHandler>,
}

impl fmt::Debug for AppBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppBuilder")
            .field("definition_path", &self.definition_path)
            .field("options", &self.options)
            .field("handlers", &self.handlers)
            .field("middlewares", &self.middlewares.len())
            .field("content_type", &self.content_type)
            .finish()
    }
}

impl AppBuilder {
    pub fn new(definition_path: impl Into<PathBuf>) -> Self {
        Self {
            definition_path: definition_path.into(),
            options: AppOptions::default(),
            router: None,
            handlers: HandlerRegistry::new(),
            middlewares: Vec::new(),
            content_type: None,
            failure_handler: Arc::new(JsonFailureHandler),
        }
    }

    pub fn options(mut self, options: AppOptions) -> Self {
        self.options = options;
        self
    }

    /// Existing router to build on. Its routes skip validation and dispatch.
    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    pub fn handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    /// Register a single operation handler.
    pub fn handler<H, T>(mut self, key: impl Into<String>, handler: H) -> Self
    where
        H: Handler<T, ()> + Sync,
        T: 'static,
    {
        self.handlers.register(key, handler);
        self
    }

    /// Append a caller middleware. Middlewares run in the order added.
    pub fn middleware(mut self, middleware: impl Middleware) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Media range accepted by the JSON body parser. Overrides
    /// `options.parser.content_type`.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn failure_handler(mut self, handler: impl FailureHandler) -> Self {
        self.failure_handler = Arc::new(handler);
        self
    }

    pub fn build(self) -> Result<App, AssembleError> {
        let Self {
            definition_path,
            mut options,
            router,
            handlers,
            middlewares,
            content_type,
            failure_handler,
        } = self;

        // 1. Options
        if let Some(content_type) = content_type {
            options.parser.content_type = content_type;
        }
        validate_options(&options).map_err(AssembleError::Config)?;
        let spec_path = options
            .validator
            .api_spec
            .clone()
            .unwrap_or_else(|| definition_path.clone());

        // 2. Application
        let router = router.unwrap_or_default();
        let mut stages = Vec::new();

        // 3. CORS
        let cors = cors_layer(&options.cors);
        stages.push(Stage::Cors);

        // 4. Schema document
        let document = Arc::new(SchemaDocument::load(&definition_path)?);
        let base_path = options.routing.base_path.as_deref();
        let index = Arc::new(OperationIndex::build(&document, base_path)?);

        // 5. Body parsing
        let parser = Arc::new(BodyParser::new(
            options.parser.limit.as_bytes(),
            options.parser.content_type.clone(),
        ));
        stages.push(Stage::BodyParser);

        // 6. Request logging
        let access_log = Arc::new(AccessLog::from_config(&options.logging)?);
        stages.push(Stage::AccessLog);

        // 7. Cookies
        stages.push(Stage::Cookies);

        // 8. Documentation UI
        let docs = docs_router(&options.docs, &document);
        if options.docs.enabled {
            stages.push(Stage::Docs);
        }

        // 9. Validation
        let validation_index = if same_file(&spec_path, &definition_path) {
            Arc::clone(&index)
        } else {
            let spec = SchemaDocument::load(&spec_path)?;
            Arc::new(OperationIndex::build(&spec, base_path)?)
        };
        let validator = Arc::new(RequestValidator::new(
            Arc::clone(&validation_index),
            options.validator.clone(),
        ));
        stages.push(Stage::Validation);

        // 10. Normalization
        let normalizer = Arc::new(ParamNormalizer::new(
            validation_index,
            options.validator.coerce_types,
        ));
        stages.push(Stage::Normalization);

        // 11. Caller middlewares
        stages.extend((0..middlewares.len()).map(Stage::Custom));

        // 12. Dispatch
        let dispatch = build_router(&index, &handlers, &options.routing)?;
        stages.push(Stage::Dispatch);

        // 13. Failure handler
        stages.push(Stage::FailureHandler);

        let mut api = dispatch;
        for middleware in middlewares.iter().rev() {
            api = api.layer(from_fn_with_state(Arc::clone(middleware), run_custom));
        }
        let api = api
            .layer(from_fn_with_state(normalizer, normalize_params))
            .layer(from_fn_with_state(validator, validate_requests));

        // Rendered twice: inside the access log so lines see the final
        // response, and outermost for body parser failures.
        let router = router
            .merge(docs)
            .fallback_service(api)
            .layer(from_fn(parse_cookies))
            .layer(map_response_with_state(
                Arc::clone(&failure_handler),
                render_failures,
            ))
            .layer(from_fn_with_state(access_log, log_requests))
            .layer(from_fn_with_state(parser, parse_body))
            .layer(map_response_with_state(failure_handler, render_failures))
            .layer(cors);

        tracing::info!(
            definition = %definition_path.display(),
            openapi = %document.version(),
            base_path = %index.base_path(),
            operations = index.operations().count(),
            stages = %stages.iter().map(Stage::to_string).collect::<Vec<_>>().join(" → "),
            "Application assembled"
        );

        Ok(App {
            router,
            document,
            stages,
        })
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
