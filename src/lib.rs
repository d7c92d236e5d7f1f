//! HTTP application assembler.
//!
//! Builds an `axum::Router` from an OpenAPI 3.x document, an options bundle
//! and a set of operation handlers, with a fixed middleware pipeline:
//! CORS, body parsing, access logging, cookies, documentation UI, request
//! validation, parameter normalization, caller middlewares, dispatch and
//! failure rendering.

pub mod assembler;
pub mod config;
pub mod document;
pub mod http;
pub mod lifecycle;
pub mod middleware;
pub mod observability;
pub mod routing;

pub use assembler::{App, AppBuilder, AssembleError, Stage};
pub use config::{AppConfig, AppOptions};
pub use http::{ApiError, ErrorDetail, FailureHandler, HttpServer};
pub use middleware::{Middleware, ParsedBody, RequestParams};
pub use routing::HandlerRegistry;
