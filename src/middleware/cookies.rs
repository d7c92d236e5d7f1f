//! Cookie parsing.
//!
//! Parses the `Cookie` header once and stores the resulting [`CookieJar`]
//! as a request extension. Handlers can still use `CookieJar` directly as
//! an extractor; the validator reads `in: cookie` parameters from here.

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::cookie::CookieJar;

pub async fn parse_cookies(mut request: Request, next: Next) -> Response {
    let jar = CookieJar::from_headers(request.headers());
    request.extensions_mut().insert(jar);
    next.run(request).await
}

/// The jar stored by [`parse_cookies`], or one parsed from the headers.
pub fn request_cookies(request: &Request) -> CookieJar {
    request
        .extensions()
        .get::<CookieJar>()
        .cloned()
        .unwrap_or_else(|| CookieJar::from_headers(request.headers()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::header;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    async fn session(request: Request) -> String {
        let jar = request.extensions().get::<CookieJar>().cloned().unwrap_or_default();
        match jar.get("session") {
            Some(cookie) => cookie.value().to_string(),
            None => "none".to_string(),
        }
    }

    #[tokio::test]
    async fn test_cookies_available_as_extension() {
        let app = Router::new()
            .route("/", get(session))
            .layer(axum::middleware::from_fn(parse_cookies));

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/")
                    .header(header::COOKIE, "theme=dark; session=abc123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"abc123");
    }

    #[test]
    fn test_request_cookies_falls_back_to_headers() {
        let request = axum::http::Request::builder()
            .header(header::COOKIE, "a=1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(request_cookies(&request).get("a").unwrap().value(), "1");
    }
}
