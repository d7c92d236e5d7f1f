//! End-to-end tests for assembled applications.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use api_assembler::config::loader::load_config;
use api_assembler::config::{ByteSize, ListenerConfig, StatusThreshold};
use api_assembler::document::DocumentError;
use api_assembler::lifecycle::{assemble, Shutdown};
use api_assembler::{
    ApiError, App, AppBuilder, AppOptions, AssembleError, HttpServer, Middleware, RequestParams,
    Stage,
};

mod common;

use common::{fixture, get as get_request, post, request, send, LogCapture};

async fn list_pets(params: RequestParams) -> Json<Value> {
    Json(json!({ "operation": params.operation, "query": params.query }))
}

async fn create_pet(Json(pet): Json<Value>) -> (StatusCode, Json<Value>) {
    (StatusCode::CREATED, Json(pet))
}

async fn show_pet(params: RequestParams, headers: HeaderMap) -> Json<Value> {
    let trace = headers.get("x-trace").and_then(|v| v.to_str().ok());
    Json(json!({ "path": params.path, "cookies": params.cookies, "trace": trace }))
}

fn petstore() -> AppBuilder {
    App::builder(fixture("petstore.yaml"))
        .handler("listPets", list_pets)
        .handler("createPet", create_pet)
        .handler("showPet", show_pet)
}

fn append_trace(request: &mut Request, step: &str) {
    let trace = match request.headers().get("x-trace").and_then(|v| v.to_str().ok()) {
        Some(current) => format!("{current},{step}"),
        None => step.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&trace) {
        request.headers_mut().insert("x-trace", value);
    }
}

async fn first(mut request: Request, next: Next) -> Result<Response, ApiError> {
    append_trace(&mut request, "first");
    Ok(next.run(request).await)
}

async fn second(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let operation = request
        .extensions()
        .get::<RequestParams>()
        .and_then(|params| params.operation.clone())
        .unwrap_or_else(|| "unmatched".to_string());
    append_trace(&mut request, &operation);
    Ok(next.run(request).await)
}

async fn deny(_request: Request, _next: Next) -> Result<Response, ApiError> {
    Err(ApiError::new("forbidden").with_status(StatusCode::FORBIDDEN))
}

#[tokio::test]
async fn test_builds_from_yaml_and_json() {
    let app = petstore().build().unwrap();
    assert_eq!(app.document().version(), "3.0.3");

    let app = App::builder(fixture("petstore.json"))
        .handler("listPets", list_pets)
        .build()
        .unwrap();
    let response = send(app.router(), get_request("/api/pets?limit=3")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["query"]["limit"], json!(3));
}

#[test]
fn test_unusable_documents_fail_construction() {
    let err = App::builder(fixture("missing.yaml")).build().unwrap_err();
    assert!(matches!(err, AssembleError::Document(DocumentError::Io { .. })));

    let err = App::builder(fixture("malformed.yaml")).build().unwrap_err();
    assert!(matches!(err, AssembleError::Document(DocumentError::Parse { .. })));

    let err = App::builder(fixture("not_openapi.yaml")).build().unwrap_err();
    assert!(matches!(err, AssembleError::Document(DocumentError::Unsupported { .. })));
}

#[test]
fn test_invalid_options_fail_construction() {
    let mut options = AppOptions::default();
    options.logging.format = Some(":method :nonsense".to_string());
    options.logging.error_threshold = Some(StatusThreshold(42));

    match petstore().options(options).build() {
        Err(AssembleError::Config(errors)) => assert_eq!(errors.len(), 2),
        other => panic!("expected config errors, got {other:?}"),
    }
}

#[test]
fn test_credentials_with_wildcards_fail_construction() {
    for (methods, headers) in [(vec!["*"], vec!["content-type"]), (vec!["GET"], vec!["*"])] {
        let mut options = AppOptions::default();
        options.cors.allow_credentials = true;
        options.cors.allowed_origins = vec!["https://app.example.com".to_string()];
        options.cors.allowed_methods = methods.into_iter().map(String::from).collect();
        options.cors.allowed_headers = headers.into_iter().map(String::from).collect();

        match petstore().options(options).build() {
            Err(AssembleError::Config(errors)) => {
                assert_eq!(errors[0].field, "cors.allow_credentials")
            }
            other => panic!("expected config errors, got {other:?}"),
        }
    }
}

#[test]
fn test_require_handlers() {
    let mut options = AppOptions::default();
    options.routing.require_handlers = true;

    let err = petstore().options(options).build().unwrap_err();
    assert!(err.to_string().contains("deletePet"));
}

#[test]
fn test_stage_order() {
    let app = petstore().middleware(first).middleware(second).build().unwrap();
    assert_eq!(
        app.stages(),
        &[
            Stage::Cors,
            Stage::BodyParser,
            Stage::AccessLog,
            Stage::Cookies,
            Stage::Docs,
            Stage::Validation,
            Stage::Normalization,
            Stage::Custom(0),
            Stage::Custom(1),
            Stage::Dispatch,
            Stage::FailureHandler,
        ]
    );

    let mut options = AppOptions::default();
    options.docs.enabled = false;
    let app = petstore().options(options).build().unwrap();
    assert!(!app.stages().contains(&Stage::Docs));
}

#[tokio::test]
async fn test_router_is_reusable() {
    let app = petstore().build().unwrap();
    for _ in 0..2 {
        let response = send(app.router(), get_request("/v1/pets")).await;
        assert_eq!(response.status, StatusCode::OK);
    }
}

#[tokio::test]
async fn test_handlers_receive_normalized_params() {
    let app = petstore().build().unwrap();

    let response = send(app.router(), get_request("/v1/pets?tags=cat&tags=dog")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.json(),
        json!({ "operation": "listPets", "query": { "limit": 20, "tags": ["cat", "dog"] } })
    );

    let mut show = get_request("/v1/pets/5");
    show.headers_mut()
        .insert(header::COOKIE, HeaderValue::from_static("session=abc"));
    let response = send(app.router(), show).await;
    assert_eq!(response.json()["path"], json!({ "petId": 5 }));
    assert_eq!(response.json()["cookies"], json!({ "session": "abc" }));
}

#[tokio::test]
async fn test_body_reaches_handler() {
    let app = petstore().build().unwrap();
    let response = send(
        app.router(),
        post("/v1/pets", "application/json", r#"{"name":"Rex","tag":null}"#),
    )
    .await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.json(), json!({ "name": "Rex", "tag": null }));
}

#[tokio::test]
async fn test_validation_failures_render_as_json() {
    let app = petstore().build().unwrap();

    let response = send(app.router(), get_request("/v1/pets?limit=0")).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let body = response.json();
    assert_eq!(body["errors"][0]["path"], "/query/limit");
    assert_eq!(body["errors"][0]["errorCode"], "schema");
    assert!(body["message"].as_str().unwrap().starts_with("/query/limit"));

    let response = send(app.router(), get_request("/v1/pets/abc")).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["errors"][0]["path"], "/path/petId");

    let response = send(app.router(), get_request("/v1/pets?color=red")).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["errors"][0]["path"], "/query/color");

    let response = send(
        app.router(),
        post("/v1/pets", "application/json", r#"{"name":""}"#),
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["errors"][0]["path"], "/body/name");

    let response = send(app.router(), request(Method::POST, "/v1/pets")).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["errors"][0]["path"], "/body");
}

#[tokio::test]
async fn test_route_failures() {
    let app = petstore().build().unwrap();

    let response = send(app.router(), get_request("/v1/owners")).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.json()["message"], "not found");

    let response = send(app.router(), request(Method::PUT, "/v1/pets")).await;
    assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
    assert!(response.json()["errors"].is_array());

    let response = send(app.router(), post("/v1/pets", "text/plain", "Rex")).await;
    assert_eq!(response.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let response = send(app.router(), request(Method::DELETE, "/v1/pets/1")).await;
    assert_eq!(response.status, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(
        response.json(),
        json!({ "message": "operation deletePet is not implemented", "errors": [] })
    );
}

async fn create_item(body: String) -> (StatusCode, String) {
    (StatusCode::CREATED, body)
}

#[tokio::test]
async fn test_bodies_outside_the_parser_are_validated_by_media_type() {
    let app = App::builder(fixture("items.yaml"))
        .handler("createItem", create_item)
        .handler("replaceItems", || async { StatusCode::NO_CONTENT })
        .build()
        .unwrap();

    let response = send(app.router(), post("/items", "application/xml", "<item/>")).await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body, "<item/>");

    let response = send(app.router(), post("/items", "application/xml", "")).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["errors"][0]["path"], "/body");

    let mut replace = post("/items", "application/json", r#"["a"]"#);
    *replace.method_mut() = Method::PUT;
    let response = send(app.router(), replace).await;
    assert_eq!(response.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(response.json()["errors"][0]["errorCode"], "content_type");

    let mut replace = post("/items", "image/png", "\u{89}PNG");
    *replace.method_mut() = Method::PUT;
    let response = send(app.router(), replace).await;
    assert_eq!(response.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let response = send(app.router(), request(Method::PUT, "/items")).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_separate_validation_document() {
    let mut options = AppOptions::default();
    options.validator.api_spec = Some(fixture("petstore-strict.yaml"));
    let app = petstore().options(options).build().unwrap();

    let response = send(app.router(), get_request("/v1/pets?limit=50")).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["errors"][0]["path"], "/query/limit");

    let response = send(app.router(), get_request("/v1/pets")).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["errors"][0]["errorCode"], "required");

    let response = send(app.router(), get_request("/v1/pets?limit=5")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.json(),
        json!({ "operation": "listPets", "query": { "limit": 5 } })
    );
}

#[tokio::test]
async fn test_oversized_body_is_413() {
    let mut options = AppOptions::default();
    options.parser.limit = ByteSize::from_bytes(16);
    let app = petstore().options(options).build().unwrap();

    let response = send(
        app.router(),
        post("/v1/pets", "application/json", r#"{"name":"a rather long pet name"}"#),
    )
    .await;
    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(response.json()["errors"], json!([]));
}

#[tokio::test]
async fn test_handler_failures_keep_their_status() {
    let app = petstore()
        .handler("listPets", || async {
            Err::<Json<Value>, _>(ApiError::new("database unavailable"))
        })
        .handler("createPet", || async {
            Err::<Json<Value>, _>(
                ApiError::new("duplicate pet").with_status(StatusCode::CONFLICT),
            )
        })
        .build()
        .unwrap();

    let response = send(app.router(), get_request("/v1/pets")).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.json(),
        json!({ "message": "database unavailable", "errors": [] })
    );

    let response = send(app.router(), post("/v1/pets", "application/json", r#"{"name":"Rex"}"#)).await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.json()["message"], "duplicate pet");
}

#[tokio::test]
async fn test_custom_failure_handler() {
    let app = petstore()
        .failure_handler(|failure: ApiError| {
            (failure.status, format!("failed: {}", failure.message)).into_response()
        })
        .build()
        .unwrap();

    let response = send(app.router(), get_request("/v1/owners")).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body, "failed: not found");
}

#[tokio::test]
async fn test_middlewares_run_in_order_before_dispatch() {
    let app = petstore().middleware(first).middleware(second).build().unwrap();

    let response = send(app.router(), get_request("/v1/pets/5")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["trace"], "first,showPet");
}

#[tokio::test]
async fn test_middlewares_run_after_validation() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let app = petstore()
        .middleware(move |request: Request, next: Next| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ApiError>(next.run(request).await)
            }
        })
        .build()
        .unwrap();

    let response = send(app.router(), get_request("/v1/pets?limit=1000")).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let response = send(app.router(), get_request("/v1/pets?limit=10")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_middleware_can_short_circuit() {
    let middleware: Arc<dyn Middleware> = Arc::new(deny);
    let app = App::new(fixture("petstore.yaml"), AppOptions::default(), vec![middleware]).unwrap();

    let response = send(app.router(), get_request("/v1/pets")).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.json(), json!({ "message": "forbidden", "errors": [] }));
}

#[tokio::test]
async fn test_docs_and_caller_routes_bypass_validation() {
    let mut options = AppOptions::default();
    options.routing.base_path = Some("/".to_string());
    let app = petstore()
        .options(options)
        .router(Router::new().route("/health", get(|| async { "ok" })))
        .build()
        .unwrap();

    let response = send(app.router(), get_request("/api-docs/openapi.json")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["info"]["title"], "Petstore");

    let response = send(app.router(), get_request("/health")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, "ok");

    let response = send(app.router(), get_request("/pets")).await;
    assert_eq!(response.status, StatusCode::OK);

    let response = send(app.router(), get_request("/elsewhere")).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cors_headers_on_success_and_failure() {
    let app = petstore().build().unwrap();

    for uri in ["/v1/pets", "/v1/owners"] {
        let mut req = get_request(uri);
        req.headers_mut()
            .insert(header::ORIGIN, HeaderValue::from_static("https://example.com"));
        let response = send(app.router(), req).await;
        assert_eq!(
            response.headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN),
            Some(&HeaderValue::from_static("*"))
        );
    }
}

#[tokio::test]
async fn test_content_type_override_wins() {
    let mut options = AppOptions::default();
    options.parser.content_type = "application/xml".to_string();
    let app = petstore()
        .options(options)
        .content_type("application/json")
        .build()
        .unwrap();

    let response = send(app.router(), post("/v1/pets", "application/json", r#"{"name":"Rex"}"#)).await;
    assert_eq!(response.status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_access_log_threshold() {
    let capture = LogCapture::default();
    let _guard = capture.install();

    let mut options = AppOptions::default();
    options.logging.format = Some("tiny".to_string());
    options.logging.error_threshold = Some(StatusThreshold(400));
    let app = petstore().options(options).build().unwrap();

    send(app.router(), get_request("/v1/pets")).await;
    let not_found = send(app.router(), get_request("/v1/owners")).await;

    let logs = capture.contents();
    let line = format!("GET /v1/owners 404 {} -", not_found.body.len());
    assert!(logs.contains(&line), "{logs}");
    assert!(!logs.contains("GET /v1/pets 200"), "{logs}");
}

#[tokio::test]
async fn test_access_log_defaults_log_everything() {
    let capture = LogCapture::default();
    let _guard = capture.install();

    let app = petstore().build().unwrap();
    send(app.router(), get_request("/v1/pets")).await;

    let logs = capture.contents();
    assert!(logs.contains("GET /v1/pets 200"), "{logs}");
}

#[tokio::test]
async fn test_service_config_assembles() {
    let config = load_config(&fixture("service.toml")).unwrap();
    assert_eq!(config.definition_path, fixture("petstore.yaml"));
    assert_eq!(config.options.parser.limit.as_bytes(), 1024);

    let app = assemble(&config).unwrap();
    let response = send(app.router(), get_request("/v1/internal/anything")).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.json()["message"], "not found");
}

#[tokio::test]
async fn test_served_over_tcp() {
    let app = petstore().build().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(app, ListenerConfig::default());
    let handle = tokio::spawn(server.run_until(listener, shutdown.signal()));

    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{addr}/v1/pets?limit=2"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["query"]["limit"], json!(2));

    let response = client
        .post(format!("http://{addr}/v1/pets"))
        .json(&json!({ "tag": "no name" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert!(body["errors"].is_array());

    shutdown.trigger();
    handle.await.unwrap().unwrap();
}
