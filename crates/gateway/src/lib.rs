//! HTTP API gateway for OpsClaw.
//!
//! Exposes a health check and the v1 API: run tasks in sessions, read
//! their history, watch their steps live (SSE or WebSocket) and cancel
//! them by id.
//!
//! Built on Axum for high performance async HTTP.

pub mod api_v1;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    middleware::{self, Next},
    response::Json,
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{debug, info, warn};

use opsclaw_agent::{AgentRuntime, ToolkitSource};
use opsclaw_config::{AppConfig, GatewayConfig};
use opsclaw_security::ChainCredentialResolver;
use opsclaw_tools::Toolkit;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Build the full router: `/health` plus the v1 API under `/v1`.
///
/// Layers applied:
/// - Bearer token authentication on all /v1 routes (when tokens are configured)
/// - CORS limited to the gateway's own origin
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(api_state: api_v1::SharedApiState, gateway: &GatewayConfig) -> Router {
    let v1 = api_v1::v1_router(api_state.clone())
        .layer(middleware::from_fn_with_state(api_state, auth_middleware));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", v1)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors_layer(gateway))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn cors_layer(gateway: &GatewayConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        format!("http://localhost:{}", gateway.port),
        format!("http://{}:{}", gateway.host, gateway.port),
    ]
    .iter()
    .filter_map(|origin| origin.parse().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(Duration::from_secs(3600))
}

/// Start the gateway HTTP server.
///
/// Builds the provider and the runtime once; every request shares them.
/// Toolkit credentials are resolved per task, not here.
pub async fn start(config: AppConfig, toolkits: Vec<Toolkit>) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let provider = opsclaw_providers::router::build_from_config(&config)
        .default()
        .ok_or("No default provider configured; set an API key")?;

    let resolver = Arc::new(ChainCredentialResolver::from_config(&config));
    let tools = Arc::new(ToolkitSource::new(toolkits, config.toolkits.clone(), resolver));
    let runtime = Arc::new(AgentRuntime::from_config(&config, provider, tools));

    // Sessions whose observers all left keep no channel around
    let janitor = Arc::clone(&runtime);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let pruned = janitor.prune_observers();
            if pruned > 0 {
                debug!(pruned, "Pruned idle session channels");
            }
        }
    });

    let api_state = Arc::new(api_v1::ApiV1State {
        runtime,
        bearer_tokens: config.gateway.bearer_tokens.clone(),
    });
    if api_state.bearer_tokens.is_empty() {
        warn!("No bearer tokens configured; /v1 is open to anyone who can reach {addr}");
    }

    let app = build_router(api_state, &config.gateway);

    info!(addr = %addr, "Gateway starting with v1 API");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Authentication middleware for the /v1 API.
///
/// Requires a valid `Authorization: Bearer <token>` header once any token
/// is configured.
async fn auth_middleware(
    State(state): State<api_v1::SharedApiState>,
    req: axum::extract::Request,
    next: Next,
) -> Result<axum::response::Response, StatusCode> {
    if state.bearer_tokens.is_empty() {
        return Ok(next.run(req).await);
    }

    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match auth_header {
        Some(token) if state.bearer_tokens.iter().any(|t| t == token) => Ok(next.run(req).await),
        _ => {
            warn!("Unauthorized request to /v1 API — missing or invalid bearer token");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use opsclaw_agent::{AgentLoop, StaticTools};
    use opsclaw_core::tool::ToolRegistry;
    use tower::ServiceExt;

    struct SilentProvider;

    #[async_trait::async_trait]
    impl opsclaw_core::provider::Provider for SilentProvider {
        fn name(&self) -> &str {
            "silent"
        }

        async fn complete(
            &self,
            request: opsclaw_core::provider::ProviderRequest,
        ) -> Result<opsclaw_core::provider::ProviderResponse, opsclaw_core::error::ProviderError> {
            Ok(opsclaw_core::provider::ProviderResponse {
                text: "Final Answer: ok".into(),
                usage: None,
                model: request.model,
            })
        }
    }

    fn app(tokens: &[&str]) -> Router {
        let engine = AgentLoop::new(Arc::new(SilentProvider), "mock-model");
        let runtime = AgentRuntime::new(engine, Arc::new(StaticTools::new(ToolRegistry::new())))
            .with_step_logging(false);
        let state = Arc::new(api_v1::ApiV1State {
            runtime: Arc::new(runtime),
            bearer_tokens: tokens.iter().map(|t| t.to_string()).collect(),
        });
        build_router(state, &GatewayConfig::default())
    }

    #[tokio::test]
    async fn health_endpoint() {
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app(&["secret-token"]).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn v1_requires_a_configured_token() {
        let req = Request::builder().uri("/v1/tools").body(Body::empty()).unwrap();
        let response = app(&["secret-token"]).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let req = Request::builder()
            .uri("/v1/tools")
            .header("Authorization", "Bearer wrong")
            .body(Body::empty())
            .unwrap();
        let response = app(&["secret-token"]).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let req = Request::builder()
            .uri("/v1/tools")
            .header("Authorization", "Bearer secret-token")
            .body(Body::empty())
            .unwrap();
        let response = app(&["secret-token"]).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn no_tokens_means_open_api() {
        let req = Request::builder().uri("/v1/tools").body(Body::empty()).unwrap();
        let response = app(&[]).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn oversized_bodies_are_rejected() {
        let input = "x".repeat(MAX_BODY_BYTES + 1);
        let req = Request::builder()
            .method("POST")
            .uri("/v1/sessions/s/tasks")
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::json!({ "input": input }).to_string()))
            .unwrap();

        let response = app(&[]).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
