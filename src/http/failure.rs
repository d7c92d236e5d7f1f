//! Terminal failure handling.
//!
//! Every stage reports failure by returning an [`ApiError`]. The pipeline
//! finds the [`Failure`] marker on the way out and hands it to the
//! configured [`FailureHandler`], which produces the final response.

use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::http::error::{ApiError, ErrorDetail, Failure};

/// Renders a failure into the response sent to the client.
pub trait FailureHandler: Send + Sync + 'static {
    fn handle(&self, failure: ApiError) -> Response;
}

impl<F> FailureHandler for F
where
    F: Fn(ApiError) -> Response + Send + Sync + 'static,
{
    fn handle(&self, failure: ApiError) -> Response {
        (self)(failure)
    }
}

/// Default handler: the failure status with a `{message, errors}` JSON body.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFailureHandler;

#[derive(Serialize)]
struct FailureBody<'a> {
    message: &'a str,
    errors: &'a [ErrorDetail],
}

impl FailureHandler for JsonFailureHandler {
    fn handle(&self, failure: ApiError) -> Response {
        let body = FailureBody {
            message: &failure.message,
            errors: &failure.errors,
        };
        (failure.status, Json(body)).into_response()
    }
}

/// Response mapper installed around the pipeline.
pub(crate) async fn render_failures(
    State(handler): State<Arc<dyn FailureHandler>>,
    mut response: Response,
) -> Response {
    match response.extensions_mut().remove::<Failure>() {
        Some(Failure(failure)) => {
            tracing::debug!(
                status = failure.status.as_u16(),
                message = %failure.message,
                "Rendering request failure"
            );
            handler.handle(failure)
        }
        None => response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::http::StatusCode;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_json_handler_uses_failure_status() {
        let failure = ApiError::new("teapot")
            .with_status(StatusCode::IM_A_TEAPOT)
            .with_errors(vec![ErrorDetail::new("/body", "too hot").with_code("temp")]);

        let response = JsonFailureHandler.handle(failure);
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);

        let body = body_json(response).await;
        assert_eq!(body["message"], "teapot");
        assert_eq!(body["errors"][0]["path"], "/body");
        assert_eq!(body["errors"][0]["errorCode"], "temp");
    }

    #[tokio::test]
    async fn test_json_handler_defaults_to_500() {
        let response = JsonFailureHandler.handle(ApiError::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["message"], "boom");
        assert_eq!(body["errors"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_render_passes_through_plain_responses() {
        let handler: Arc<dyn FailureHandler> = Arc::new(JsonFailureHandler);
        let response = render_failures(State(handler), StatusCode::CREATED.into_response()).await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_render_uses_custom_handler() {
        let handler: Arc<dyn FailureHandler> =
            Arc::new(|failure: ApiError| (failure.status, failure.message).into_response());
        let response = render_failures(
            State(handler),
            ApiError::bad_request("plain text").into_response(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"plain text");
    }
}
