//! Caller-supplied middlewares.
//!
//! Custom middlewares run after parameter normalization and before route
//! dispatch, in the order they were registered. They see the parsed body,
//! cookies and [`RequestParams`](crate::middleware::normalize::RequestParams)
//! as request extensions, and may short-circuit with an [`ApiError`].

use std::future::Future;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use futures_util::future::BoxFuture;

use crate::http::error::ApiError;

/// A request interceptor placed between normalization and dispatch.
///
/// Any `Fn(Request, Next) -> impl Future<Output = Result<Response, ApiError>>`
/// is a middleware, so an `async fn` with that signature can be passed
/// directly.
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, request: Request, next: Next) -> BoxFuture<'static, Result<Response, ApiError>>;
}

impl<F, Fut> Middleware for F
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, ApiError>> + Send + 'static,
{
    fn handle(&self, request: Request, next: Next) -> BoxFuture<'static, Result<Response, ApiError>> {
        Box::pin((self)(request, next))
    }
}

pub(crate) async fn run_custom(
    State(middleware): State<Arc<dyn Middleware>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    middleware.handle(request, next).await
}
