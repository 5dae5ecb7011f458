//! Gateway HTTP Server
//!
//! Public HTTP surface: health and registry inspection, instance
//! registration/heartbeat, prefix-routed proxying under `/api`, and the
//! aggregated `/api/dashboard` and `/api/search` endpoints.

use crate::application::{
    AggregationError, AggregationService, ForwardError, ForwardRequest, ProxyService,
    UpstreamResponse,
};
use crate::domain::{RouteTable, ServiceRegistration};
use crate::infrastructure::{CircuitBreaker, CircuitSnapshot, CircuitState, ServiceRegistry};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Registration request from a backend instance.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub meta: HashMap<String, serde_json::Value>,
}

/// Identifies one instance for heartbeat and deregistration.
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceRequest {
    pub name: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

/// Health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub circuits: BTreeMap<String, CircuitSnapshot>,
}

/// Registry inspection response.
#[derive(Debug, Serialize)]
pub struct RegistryResponse {
    pub services: BTreeMap<String, Vec<ServiceRegistration>>,
    pub resolved: BTreeMap<String, String>,
}

/// Shared handler state.
#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<ServiceRegistry>,
    pub breaker: Arc<CircuitBreaker>,
    pub proxy: Arc<ProxyService>,
    pub aggregator: Arc<AggregationService>,
    pub routes: Arc<RouteTable>,
}

impl ApiState {
    pub fn new(proxy: Arc<ProxyService>, routes: RouteTable) -> Self {
        Self {
            registry: proxy.registry().clone(),
            breaker: proxy.breaker().clone(),
            aggregator: Arc::new(AggregationService::new(proxy.clone())),
            proxy,
            routes: Arc::new(routes),
        }
    }

    /// Every service name worth reporting: routed, registered, static, or
    /// already referenced by the breaker.
    fn known_services(&self) -> Vec<String> {
        let mut names = self.routes.services();
        names.extend(self.registry.known_services());
        names.extend(self.breaker.all_snapshots().into_iter().map(|(name, _)| name));
        names.sort();
        names.dedup();
        names
    }

    /// Persist registry changes; a failing store never fails the request.
    async fn persist_registry(&self) {
        if let Err(e) = self.registry.flush().await {
            tracing::error!("failed to persist registry: {}", e);
        }
    }
}

/// Build the gateway router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/registry", get(registry_handler))
        .route("/registry/register", post(register_handler))
        .route("/registry/heartbeat", post(heartbeat_handler))
        .route("/registry/deregister", post(deregister_handler))
        .route("/api/dashboard", get(dashboard_handler).fallback(not_found_handler))
        .route("/api/search", get(search_handler).fallback(not_found_handler))
        .route("/api/:prefix", any(proxy_handler))
        .route("/api/:prefix/*rest", any(proxy_handler))
        .fallback(not_found_handler)
        .with_state(state)
}

/// Gateway HTTP server.
pub struct ApiServer {
    listen_addr: String,
    state: ApiState,
}

impl ApiServer {
    pub fn new(listen_addr: String, state: ApiState) -> Self {
        Self { listen_addr, state }
    }

    pub fn state(&self) -> ApiState {
        self.state.clone()
    }

    /// Serve until `shutdown` completes.
    #[cfg_attr(coverage_nightly, coverage(off))]
    pub async fn run<F>(&self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = router(self.state.clone()).layer(TraceLayer::new_for_http());

        let listener = TcpListener::bind(&self.listen_addr).await?;
        tracing::info!("gateway listening on {}", self.listen_addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

// Error mapping

fn error_body(status: StatusCode, body: serde_json::Value) -> Response {
    (status, Json(body)).into_response()
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response {
        match self {
            ForwardError::Unavailable { service } => error_body(
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({
                    "error": "Service unavailable",
                    "service": service,
                }),
            ),
            ForwardError::CircuitOpen {
                service,
                retry_after,
                last_error,
            } => {
                let mut response = error_body(
                    StatusCode::SERVICE_UNAVAILABLE,
                    serde_json::json!({
                        "error": "Circuit open",
                        "service": service,
                        "retryAfterMs": retry_after.as_millis() as u64,
                        "lastError": last_error,
                    }),
                );
                // Retry-After is whole seconds, rounded up
                let secs = (retry_after.as_millis() as u64).div_ceil(1000).max(1);
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(secs));
                response
            }
            ForwardError::Transport { service, message } => error_body(
                StatusCode::BAD_GATEWAY,
                serde_json::json!({
                    "error": "Bad gateway",
                    "service": service,
                    "details": message,
                }),
            ),
        }
    }
}

impl IntoResponse for AggregationError {
    fn into_response(self) -> Response {
        match self {
            AggregationError::DependenciesMissing { missing } => error_body(
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({
                    "error": "dependencies missing",
                    "missing": missing,
                }),
            ),
        }
    }
}

fn upstream_into_response(upstream: UpstreamResponse) -> Response {
    let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut headers = HeaderMap::new();
    if let Some(value) = upstream
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
    {
        headers.insert(header::CONTENT_TYPE, value);
    }
    (status, headers, upstream.body).into_response()
}

// Handler functions

async fn health_handler(State(state): State<ApiState>) -> impl IntoResponse {
    let circuits: BTreeMap<String, CircuitSnapshot> = state
        .known_services()
        .into_iter()
        .map(|name| {
            let snapshot = state.breaker.snapshot(&name);
            (name, snapshot)
        })
        .collect();

    let any_open = circuits.values().any(|c| c.state == CircuitState::Open);
    let response = HealthResponse {
        status: if any_open { "degraded" } else { "ok" }.to_string(),
        service: "api-gateway".to_string(),
        circuits,
    };
    Json(response)
}

async fn registry_handler(State(state): State<ApiState>) -> impl IntoResponse {
    let resolved = state
        .known_services()
        .into_iter()
        .filter_map(|name| {
            let address = state.registry.resolve(&name)?;
            Some((name, address.base_url()))
        })
        .collect();

    Json(RegistryResponse {
        services: state.registry.snapshot().services,
        resolved,
    })
}

async fn register_handler(
    State(state): State<ApiState>,
    Json(req): Json<RegisterRequest>,
) -> Response {
    if req.name.trim().is_empty() || req.host.trim().is_empty() {
        return error_body(
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": "name and host are required" }),
        );
    }

    let entry = state.registry.register(&req.name, &req.host, req.port, req.meta);
    state.persist_registry().await;

    (StatusCode::CREATED, Json(entry)).into_response()
}

async fn heartbeat_handler(
    State(state): State<ApiState>,
    Json(req): Json<InstanceRequest>,
) -> Response {
    if state.registry.heartbeat(&req.name, &req.host, req.port) {
        state.persist_registry().await;
        Json(serde_json::json!({ "ok": true })).into_response()
    } else {
        error_body(
            StatusCode::NOT_FOUND,
            serde_json::json!({
                "ok": false,
                "error": "instance not registered",
            }),
        )
    }
}

async fn deregister_handler(
    State(state): State<ApiState>,
    Json(req): Json<InstanceRequest>,
) -> Response {
    if state.registry.deregister(&req.name, &req.host, req.port) {
        state.persist_registry().await;
        Json(serde_json::json!({ "removed": true })).into_response()
    } else {
        error_body(
            StatusCode::NOT_FOUND,
            serde_json::json!({
                "removed": false,
                "error": "instance not found",
            }),
        )
    }
}

async fn dashboard_handler(State(state): State<ApiState>, headers: HeaderMap) -> Response {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match state.aggregator.dashboard(authorization).await {
        Ok(dashboard) => Json(dashboard).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn search_handler(
    State(state): State<ApiState>,
    Query(params): Query<SearchParams>,
) -> Response {
    match state.aggregator.search(&params.q).await {
        Ok(results) => Json(results).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn proxy_handler(
    State(state): State<ApiState>,
    Path(params): Path<HashMap<String, String>>,
    method: Method,
    headers: HeaderMap,
    uri: Uri,
    body: Bytes,
) -> Response {
    let Some(prefix) = params.get("prefix") else {
        return not_found_handler().await.into_response();
    };
    let Some(service) = state.routes.service_for(prefix) else {
        return not_found_handler().await.into_response();
    };

    let Ok(method) = reqwest::Method::from_bytes(method.as_str().as_bytes()) else {
        return error_body(
            StatusCode::METHOD_NOT_ALLOWED,
            serde_json::json!({ "error": "Method not allowed" }),
        );
    };

    // Strip the routing prefix, keep the query
    let path = uri.path().strip_prefix("/api").unwrap_or(uri.path());
    let path_and_query = match uri.query() {
        Some(query) => format!("{}?{}", path, query),
        None => path.to_string(),
    };

    let request_id = headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let carries_body = ![
        reqwest::Method::GET,
        reqwest::Method::HEAD,
        reqwest::Method::OPTIONS,
        reqwest::Method::TRACE,
    ]
    .contains(&method);

    let mut request = ForwardRequest::new(method, path_and_query)
        .with_forwarded_headers(
            headers
                .iter()
                .filter(|(name, _)| *name != "x-request-id")
                .filter_map(|(name, value)| Some((name.as_str(), value.to_str().ok()?))),
        )
        .with_header("x-request-id", &request_id);
    if carries_body {
        request = request.with_body(body);
    }

    match state.proxy.forward(service, request).await {
        Ok(upstream) => upstream_into_response(upstream),
        Err(e) => e.into_response(),
    }
}

async fn not_found_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "Not found" })),
    )
}
