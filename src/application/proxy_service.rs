//! Proxy Service - forwards one request to one backend service
//!
//! Resolves the service through the registry, consults its circuit
//! breaker, performs the call and reports the classified outcome back to
//! the breaker. Holds no state of its own.

use crate::domain::CallOutcome;
use crate::infrastructure::{CircuitBreaker, ServiceRegistry};
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use std::sync::Arc;
use std::time::Duration;

/// Inbound headers that are passed on to backends.
pub const FORWARDED_HEADERS: &[&str] = &["content-type", "accept", "authorization", "x-request-id"];

/// Request to forward, already rewritten for the backend.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: Method,
    /// Backend path including the query string, starting with `/`
    pub path_and_query: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl ForwardRequest {
    pub fn new(method: Method, path_and_query: impl Into<String>) -> Self {
        Self {
            method,
            path_and_query: path_and_query.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(path_and_query: impl Into<String>) -> Self {
        Self::new(Method::GET, path_and_query)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.to_string()));
        self
    }

    /// Copy the headers listed in [`FORWARDED_HEADERS`] from `headers`.
    pub fn with_forwarded_headers<'a>(
        mut self,
        headers: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        for (name, value) in headers {
            let name = name.to_ascii_lowercase();
            if FORWARDED_HEADERS.contains(&name.as_str()) {
                self.headers.push((name, value.to_string()));
            }
        }
        self
    }

    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Backend answer passed through verbatim.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Reasons a request produced no upstream response.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ForwardError {
    /// No live or static address known; no network attempt was made
    #[error("service {service} is unavailable")]
    Unavailable { service: String },
    /// Breaker is rejecting calls; no network attempt was made
    #[error("circuit open for {service}, retry in {}ms", .retry_after.as_millis())]
    CircuitOpen {
        service: String,
        retry_after: Duration,
        last_error: Option<String>,
    },
    /// The call was attempted and failed without a response
    #[error("upstream {service} failed: {message}")]
    Transport { service: String, message: String },
}

impl ForwardError {
    pub fn service(&self) -> &str {
        match self {
            ForwardError::Unavailable { service }
            | ForwardError::CircuitOpen { service, .. }
            | ForwardError::Transport { service, .. } => service,
        }
    }
}

/// Proxy service - resolve, guard, call, record.
pub struct ProxyService {
    registry: Arc<ServiceRegistry>,
    breaker: Arc<CircuitBreaker>,
    client: reqwest::Client,
}

impl ProxyService {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        breaker: Arc<CircuitBreaker>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            registry,
            breaker,
            client,
        }
    }

    /// HTTP client whose every call is bounded by `timeout`.
    pub fn build_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Forward `request` to `service`.
    ///
    /// Upstream answers of any status come back as `Ok`; 5xx answers still
    /// count as breaker failures.
    pub async fn forward(
        &self,
        service: &str,
        request: ForwardRequest,
    ) -> Result<UpstreamResponse, ForwardError> {
        // 1. Resolve
        let address = self
            .registry
            .resolve(service)
            .ok_or_else(|| ForwardError::Unavailable {
                service: service.to_string(),
            })?;

        // 2. Breaker
        if self.breaker.is_open(service) {
            let snapshot = self.breaker.snapshot(service);
            tracing::debug!("circuit open for {}, rejecting {}", service, request.path_and_query);
            return Err(ForwardError::CircuitOpen {
                service: service.to_string(),
                retry_after: Duration::from_millis(snapshot.open_for_ms),
                last_error: snapshot.last_error,
            });
        }

        // 3. Call
        let url = address.url_for(&request.path_and_query);
        tracing::debug!("forwarding {} {} -> {}", request.method, request.path_and_query, url);

        let mut builder = self.client.request(request.method, &url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let result = match builder.send().await {
            Ok(resp) => {
                let status = resp.status().as_u16();
                let content_type = resp
                    .headers()
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                resp.bytes().await.map(|body| UpstreamResponse {
                    status,
                    content_type,
                    body,
                })
            }
            Err(e) => Err(e),
        };

        // 4. Record
        match result {
            Ok(response) => {
                let outcome = CallOutcome::from_status(response.status);
                if !outcome.is_success() {
                    tracing::warn!("{} answered {} for {}", service, response.status, url);
                }
                self.breaker.record(service, &outcome);
                Ok(response)
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!("call to {} failed: {}", url, message);
                self.breaker.record(service, &CallOutcome::transport(&message));
                Err(ForwardError::Transport {
                    service: service.to_string(),
                    message,
                })
            }
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::domain::ServiceAddress;
    use crate::infrastructure::clock::ManualClock;
    use crate::infrastructure::CircuitBreakerConfig;
    use std::collections::HashMap;

    fn service_with(statics: HashMap<String, ServiceAddress>, threshold: u32) -> ProxyService {
        let clock = Arc::new(ManualClock::new(0));
        let registry = Arc::new(ServiceRegistry::new(clock.clone(), statics));
        let breaker = Arc::new(CircuitBreaker::new(
            CircuitBreakerConfig {
                failure_threshold: threshold,
                open_window: Duration::from_secs(30),
            },
            clock,
        ));
        let client = ProxyService::build_client(Duration::from_millis(200)).unwrap();
        ProxyService::new(registry, breaker, client)
    }

    #[test]
    fn test_forwarded_headers_filter() {
        let req = ForwardRequest::get("/items").with_forwarded_headers([
            ("Content-Type", "application/json"),
            ("Authorization", "Bearer t"),
            ("Cookie", "secret"),
            ("Host", "gateway"),
        ]);
        assert_eq!(req.headers.len(), 2);
        assert_eq!(req.header("authorization"), Some("Bearer t"));
        assert_eq!(req.header("cookie"), None);
    }

    #[test]
    fn test_upstream_response_is_success() {
        let ok = UpstreamResponse {
            status: 204,
            content_type: None,
            body: Bytes::new(),
        };
        assert!(ok.is_success());
        let not_found = UpstreamResponse { status: 404, ..ok };
        assert!(!not_found.is_success());
    }

    #[test]
    fn test_forward_error_service() {
        let err = ForwardError::Transport {
            service: "a".to_string(),
            message: "x".to_string(),
        };
        assert_eq!(err.service(), "a");
        assert_eq!(err.to_string(), "upstream a failed: x");
    }

    #[tokio::test]
    async fn test_unresolved_service_fails_fast() {
        let proxy = service_with(HashMap::new(), 1);
        let err = proxy.forward("ghost", ForwardRequest::get("/")).await.unwrap_err();
        assert!(matches!(err, ForwardError::Unavailable { .. }));
        // No breaker impact
        assert_eq!(proxy.breaker().snapshot("ghost").failures, 0);
    }

    #[tokio::test]
    async fn test_transport_failure_records_failure() {
        let mut statics = HashMap::new();
        // Nothing listens on port 9 locally
        statics.insert("down".to_string(), ServiceAddress::new("127.0.0.1", 9));
        let proxy = service_with(statics, 1);

        let err = proxy.forward("down", ForwardRequest::get("/x")).await.unwrap_err();
        assert!(matches!(err, ForwardError::Transport { .. }));
        assert!(proxy.breaker().is_open("down"));

        let err = proxy.forward("down", ForwardRequest::get("/x")).await.unwrap_err();
        match err {
            ForwardError::CircuitOpen {
                retry_after,
                last_error,
                ..
            } => {
                assert_eq!(retry_after, Duration::from_secs(30));
                assert!(last_error.is_some());
            }
            other => panic!("expected circuit open, got {:?}", other),
        }
    }
}
