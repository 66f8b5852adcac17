mod models;
mod rate_limit;
mod responses;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, Method};
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use cage_runtime::sandbox::{DockerPodRuntime, DockerPodRuntimeConfig};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

fn setup_log() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init();
}

/// Build CORS layer from `CORS_ALLOWED_ORIGINS`; unset or `"*"` allows any
/// origin, a comma-separated list whitelists exactly those.
fn build_cors_layer() -> CorsLayer {
    let allowed_methods = vec![Method::GET, Method::POST, Method::DELETE, Method::OPTIONS];
    let allowed_headers = vec![header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT];

    let origins_env = std::env::var("CORS_ALLOWED_ORIGINS").unwrap_or_default();

    if origins_env.is_empty() || origins_env == "*" {
        CorsLayer::new()
            .allow_origin(AllowOrigin::any())
            .allow_methods(allowed_methods)
            .allow_headers(allowed_headers)
    } else {
        let origins: Vec<_> = origins_env
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(allowed_methods)
            .allow_headers(allowed_headers)
            .allow_credentials(true)
    }
}

fn router(state: AppState) -> Router {
    let cors = build_cors_layer();

    // Unauthenticated, unrated: liveness.
    let health_routes = Router::new().route("/health", get(routes::health));

    // Read endpoints: 120 req/min per IP.
    let read_routes = Router::new()
        .route("/registry", get(routes::list_registry))
        .route("/pods", get(routes::list_pods))
        .route("/pods/{branch}", get(routes::get_pod))
        .layer(middleware::from_fn(rate_limit::read_rate_limit));

    // Write endpoints: 30 req/min per IP.
    let write_routes = Router::new()
        .route(
            "/register",
            post(routes::register_pod).delete(routes::deregister_pod),
        )
        .route("/bootstrap", post(routes::bootstrap))
        .route("/git", post(routes::handle_git))
        .route("/gh", post(routes::handle_gh))
        .route("/pods", post(routes::create_pod))
        .route("/pods/{branch}", delete(routes::delete_pod))
        .layer(middleware::from_fn(rate_limit::write_rate_limit));

    Router::new()
        .merge(health_routes)
        .merge(read_routes)
        .merge(write_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    setup_log();

    let pod_runtime = Arc::new(DockerPodRuntime::new(DockerPodRuntimeConfig::from_env()));
    let state = AppState::new(pod_runtime);

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
    let addr: SocketAddr = bind_addr
        .parse()
        .unwrap_or_else(|_| "0.0.0.0:8000".parse().unwrap());

    tracing::info!(%addr, version = %state.config.version, "starting yolo-cage dispatcher");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{Request, StatusCode};
    use cage_runtime::sandbox::{PodCreateResponse, PodInfo, PodRuntime, PodStatus};
    use http_body_util::BodyExt;
    use tower::util::ServiceExt;

    struct FakePodRuntime;

    #[async_trait]
    impl PodRuntime for FakePodRuntime {
        async fn create_pod(&self, branch: &str) -> cage_runtime::Result<PodCreateResponse> {
            Ok(PodCreateResponse {
                name: format!("yolo-cage-{branch}"),
                branch: branch.to_string(),
                status: PodStatus::Pending,
                message: "created".to_string(),
            })
        }

        async fn list_pods(&self) -> cage_runtime::Result<Vec<PodInfo>> {
            Ok(vec![])
        }

        async fn get_pod(&self, _branch: &str) -> cage_runtime::Result<Option<PodInfo>> {
            Ok(None)
        }

        async fn delete_pod(&self, _branch: &str) -> cage_runtime::Result<bool> {
            Ok(false)
        }
    }

    fn test_app() -> Router {
        router(AppState::new(Arc::new(FakePodRuntime)))
    }

    async fn body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_unauthenticated_and_reports_ok() {
        let response = test_app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response.into_body()).await;
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn registry_starts_empty() {
        let response = test_app()
            .oneshot(Request::builder().uri("/registry").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response.into_body()).await;
        assert!(json["registry"].as_object().unwrap().is_empty());
    }

    #[tokio::test]
    async fn git_from_unregistered_pod_is_forbidden() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let response = test_app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/git")
                    .header("content-type", "application/json")
                    .extension(ConnectInfo(addr))
                    .body(Body::from(
                        serde_json::json!({"args": ["status"], "cwd": "/home/dev/workspace"})
                            .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn cors_preflight_is_allowed_by_default() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/health")
                    .header("origin", "https://example.com")
                    .header("access-control-request-method", "GET")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
