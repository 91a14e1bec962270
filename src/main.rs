mod entities;
mod http;
mod marketplace;
mod metrics;
mod models;
mod page;
mod pipeline;
mod resolver;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{ApiError, LookupRequest, LookupResponse};
use pipeline::{Pipeline, PipelineError};
use serde_json::json;
use std::net::SocketAddr;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{Instrument, error, info, info_span, warn};
use tracing_subscriber::{EnvFilter, fmt};
use uuid::Uuid;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "linkmeta.api", "server crashed: {err:?}");
    }
}

async fn run() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let pipeline = Pipeline::from_env()?;
    for marketplace in pipeline.marketplaces().iter() {
        if !marketplace.has_credentials() {
            warn!(
                target = "linkmeta.api",
                marketplace = %marketplace.name(),
                "marketplace credentials missing; lookups will use page scraping"
            );
        }
    }
    let prometheus_handle = PrometheusBuilder::new().install_recorder()?;
    let state = AppState {
        pipeline,
        prometheus_handle,
    };

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(8000);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    info!(target = "linkmeta.api", "listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state).into_make_service()).await?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    pipeline: Pipeline,
    prometheus_handle: PrometheusHandle,
}

fn app(state: AppState) -> Router {
    let routes = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route(
            "/link-extractor",
            post(extract_link).fallback(method_not_allowed),
        )
        .with_state(state);
    with_layers(routes)
}

/// Panics are caught inside CORS so the soft error still carries the CORS
/// headers.
fn with_layers(router: Router) -> Router {
    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    router
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::extract::DefaultBodyLimit::max(body_limit_from_env()))
}

/// Health and readiness check.
///
/// - Method: `GET`
/// - Path: `/health`
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "linkmeta-api-rs",
    }))
}

fn body_limit_from_env() -> usize {
    std::env::var("REQUEST_MAX_BYTES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(256 * 1024)
}

async fn metrics_endpoint(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
) -> Response {
    if let Ok(secret) = std::env::var("METRICS_KEY") {
        let presented = headers
            .get("X-Metrics-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != secret {
            return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
        }
    }
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.prometheus_handle.render(),
    )
        .into_response()
}

/// Resolve a product URL into `{image, title, price, description}`.
///
/// - Method: `POST`
/// - Path: `/link-extractor`
/// - Body: `{"url": "<absolute http(s) url>"}`
/// - Response: `200` with the record, or `200` with `{"error": ...}` when the
///   page could not be fetched; `400` for a bad body or URL.
async fn extract_link(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<LookupResponse>, AppError> {
    crate::metrics::inc_requests("/link-extractor");
    let request = LookupRequest::from_body(&body)?;
    let request_id = Uuid::new_v4();
    let span = info_span!(target: "linkmeta.api", "lookup", %request_id);
    span.in_scope(|| info!(target = "linkmeta.api", url = %request.url, "lookup invoked"));
    let response = state.pipeline.run(&request.url).instrument(span).await?;
    Ok(Json(response))
}

async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        "Method Not Allowed",
    )
        .into_response()
}

fn panic_response(err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(target = "linkmeta.api", panic = detail, "handler panicked");
    (StatusCode::OK, Json(LookupResponse::soft_error("Internal error"))).into_response()
}

#[derive(Debug)]
enum AppError {
    Pipeline(PipelineError),
}

impl From<PipelineError> for AppError {
    fn from(value: PipelineError) -> Self {
        Self::Pipeline(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Pipeline(err) => {
                info!(
                    target = "linkmeta.api",
                    stage = err.stage(),
                    detail = err.detail(),
                    "request rejected"
                );
                let payload = ApiError {
                    error: err.detail().to_string(),
                };
                (StatusCode::BAD_REQUEST, Json(payload)).into_response()
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marketplace::MarketplaceRegistry;
    use crate::marketplace::test_support::marketplace_for;
    use crate::pipeline::LookupSettings;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_app(registry: MarketplaceRegistry) -> Router {
        let settings = LookupSettings {
            resolve_timeout: std::time::Duration::from_secs(2),
            fetch_timeout: std::time::Duration::from_secs(2),
            marketplace_timeout: std::time::Duration::from_secs(2),
        };
        app(AppState {
            pipeline: Pipeline::new(&settings, registry),
            prometheus_handle: PrometheusBuilder::new().build_recorder().handle(),
        })
    }

    async fn post_body(router: Router, body: &str) -> (StatusCode, axum::http::HeaderMap, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/link-extractor")
            .header("Origin", "https://app.example.com")
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn non_post_is_method_not_allowed() {
        let router = test_app(MarketplaceRegistry::default());
        let request = Request::builder()
            .method("GET")
            .uri("/link-extractor")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"Method Not Allowed");
    }

    #[tokio::test]
    async fn unparsable_body_is_rejected() {
        let (status, _, body) = post_body(test_app(MarketplaceRegistry::default()), "{url:").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "Invalid request body"}));
    }

    #[tokio::test]
    async fn missing_url_is_rejected() {
        let (status, _, body) = post_body(test_app(MarketplaceRegistry::default()), "{}").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "No URL provided"}));
    }

    #[tokio::test]
    async fn malformed_url_is_rejected() {
        let (status, _, body) = post_body(
            test_app(MarketplaceRegistry::default()),
            r#"{"url": "not a url"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "Invalid URL"}));
    }

    #[tokio::test]
    async fn scraped_record_has_all_four_keys_and_cors() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/product/1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<meta property="og:title" content="Y2K Baby Tee">
                   <meta property="og:image" content="https://img.example.com/a.jpg">"#,
            ))
            .mount(&server)
            .await;

        let registry =
            MarketplaceRegistry::new(vec![marketplace_for(&server.uri(), "ebay.com")]);
        let body = json!({"url": format!("{}/product/1", server.uri())}).to_string();
        let (status, headers, body) = post_body(test_app(registry), &body).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "image": "https://img.example.com/a.jpg",
                "title": "Y2K Baby Tee",
                "price": null,
                "description": null
            })
        );
        assert_eq!(
            headers.get("content-type").and_then(|v| v.to_str().ok()),
            Some("application/json")
        );
        assert_eq!(
            headers
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok()),
            Some("*")
        );
    }

    #[tokio::test]
    async fn upstream_404_is_a_soft_error_with_200() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let body = json!({"url": format!("{}/missing", server.uri())}).to_string();
        let (status, _, body) = post_body(test_app(MarketplaceRegistry::default()), &body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"error": "Could not fetch page (404)"}));
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let router = test_app(MarketplaceRegistry::default());
        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
    }

    async fn explode() -> &'static str {
        panic!("lookup exploded")
    }

    #[tokio::test]
    async fn handler_panic_is_a_soft_error_with_cors() {
        let router = with_layers(Router::new().route("/link-extractor", post(explode)));
        let (status, headers, body) = post_body(router, r#"{"url": "https://example.com"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"error": "Internal error"}));
        assert_eq!(
            headers
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok()),
            Some("*")
        );
    }

    #[test]
    fn panic_payloads_of_either_string_type_are_handled() {
        let owned = panic_response(Box::new(String::from("boom")));
        assert_eq!(owned.status(), StatusCode::OK);
        let borrowed = panic_response(Box::new("boom"));
        assert_eq!(borrowed.status(), StatusCode::OK);
    }
}
