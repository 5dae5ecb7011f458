//! Aggregation Service - composite endpoints built from several backends
//!
//! Each composite call fans out concurrent sub-calls through the proxy
//! service and waits for all of them. A failed or rejected branch degrades
//! to an empty value with a marker; it never fails the whole response.
//! The only fatal case is a required service with no address at all,
//! detected before any call is made.

use crate::application::proxy_service::{ForwardError, ForwardRequest, ProxyService};
use crate::application::token::subject_from_authorization;
use crate::domain::value_objects::{ITEM_SERVICE, LIST_SERVICE, USER_SERVICE};
use crate::domain::SourceStatus;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Composite call that cannot start.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AggregationError {
    #[error("dependencies missing: {}", .missing.join(", "))]
    DependenciesMissing { missing: Vec<String> },
}

/// Result of one sub-call, never an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Branch<T> {
    Data(T),
    CircuitOpen,
    Failed(String),
    Skipped,
}

impl<T> Branch<T> {
    pub fn status(&self) -> SourceStatus {
        match self {
            Branch::Data(_) => SourceStatus::Ok,
            Branch::CircuitOpen => SourceStatus::CircuitOpen,
            Branch::Failed(_) => SourceStatus::Error,
            Branch::Skipped => SourceStatus::Skipped,
        }
    }

    pub fn data(self) -> Option<T> {
        match self {
            Branch::Data(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardResponse {
    pub dashboard: Dashboard,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub user: Option<Value>,
    pub stats: DashboardStats,
    pub sources: DashboardSources,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardStats {
    pub items: usize,
    pub lists: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSources {
    pub user: SourceStatus,
    pub items: SourceStatus,
    pub lists: SourceStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResponse {
    pub items: Vec<Value>,
    pub lists: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<SearchSources>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchSources {
    pub items: SourceStatus,
    pub lists: SourceStatus,
}

/// Fan-out engine over the proxy service.
pub struct AggregationService {
    proxy: Arc<ProxyService>,
}

impl AggregationService {
    pub fn new(proxy: Arc<ProxyService>) -> Self {
        Self { proxy }
    }

    /// Fail when any of `services` has no address.
    fn require(&self, services: &[&str]) -> Result<(), AggregationError> {
        let missing: Vec<String> = services
            .iter()
            .filter(|s| self.proxy.registry().resolve(s).is_none())
            .map(|s| s.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            tracing::warn!("aggregation aborted, unresolved: {}", missing.join(", "));
            Err(AggregationError::DependenciesMissing { missing })
        }
    }

    /// One sub-call expecting a JSON body.
    async fn fetch_json(&self, service: &str, request: ForwardRequest) -> Branch<Value> {
        let path = request.path_and_query.clone();
        match self.proxy.forward(service, request).await {
            Ok(resp) if resp.is_success() => match serde_json::from_slice(&resp.body) {
                Ok(value) => Branch::Data(value),
                Err(e) => {
                    tracing::warn!("{} {} returned invalid JSON: {}", service, path, e);
                    Branch::Failed(format!("invalid JSON from {}: {}", service, e))
                }
            },
            Ok(resp) => {
                tracing::warn!("{} {} answered {}", service, path, resp.status);
                Branch::Failed(format!("{} answered {}", service, resp.status))
            }
            Err(ForwardError::CircuitOpen { .. }) => Branch::CircuitOpen,
            Err(e) => Branch::Failed(e.to_string()),
        }
    }

    /// Dashboard for the caller identified by `authorization`.
    ///
    /// The user branch runs only when a subject id can be read from the
    /// bearer token; the header is passed on so the user service can
    /// authorize the read.
    pub async fn dashboard(
        &self,
        authorization: Option<&str>,
    ) -> Result<DashboardResponse, AggregationError> {
        self.require(&[USER_SERVICE, ITEM_SERVICE, LIST_SERVICE])?;

        let subject = authorization.and_then(subject_from_authorization);

        let user = async {
            match (&subject, authorization) {
                (Some(id), Some(auth)) => {
                    let request = ForwardRequest::get(format!("/users/{}", id))
                        .with_header("authorization", auth);
                    self.fetch_json(USER_SERVICE, request).await
                }
                _ => Branch::Skipped,
            }
        };
        let items = self.fetch_json(ITEM_SERVICE, ForwardRequest::get("/items"));
        let lists = self.fetch_json(LIST_SERVICE, ForwardRequest::get("/lists"));

        let (user, items, lists) = tokio::join!(user, items, lists);

        let sources = DashboardSources {
            user: user.status(),
            items: items.status(),
            lists: lists.status(),
        };
        let stats = DashboardStats {
            items: array_len(items.data()),
            lists: array_len(lists.data()),
        };

        Ok(DashboardResponse {
            dashboard: Dashboard {
                user: user.data(),
                stats,
                sources,
            },
        })
    }

    /// Search items and lists for `query`.
    ///
    /// A blank query answers with empty results and makes no calls.
    pub async fn search(&self, query: &str) -> Result<SearchResponse, AggregationError> {
        let term = query.trim();
        if term.is_empty() {
            return Ok(SearchResponse::default());
        }

        self.require(&[ITEM_SERVICE, LIST_SERVICE])?;

        let items_path = format!("/search?{}", encode_query(&[("q", term)]));
        let items = self.fetch_json(ITEM_SERVICE, ForwardRequest::get(items_path));
        let lists = self.fetch_json(LIST_SERVICE, ForwardRequest::get("/lists"));

        let (items, lists) = tokio::join!(items, lists);

        let sources = SearchSources {
            items: items.status(),
            lists: lists.status(),
        };
        let needle = term.to_lowercase();

        Ok(SearchResponse {
            items: into_array(items.data()),
            lists: into_array(lists.data())
                .into_iter()
                .filter(|list| list_matches(list, &needle))
                .collect(),
            sources: Some(sources),
        })
    }
}

fn into_array(value: Option<Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(values)) => values,
        _ => Vec::new(),
    }
}

fn array_len(value: Option<Value>) -> usize {
    into_array(value).len()
}

/// Case-insensitive match of a lowercase needle on `name` or `description`.
fn list_matches(list: &Value, needle: &str) -> bool {
    ["name", "description"].iter().any(|field| {
        list.get(field)
            .and_then(Value::as_str)
            .map(|s| s.to_lowercase().contains(needle))
            .unwrap_or(false)
    })
}

/// `application/x-www-form-urlencoded` query string.
fn encode_query(pairs: &[(&str, &str)]) -> String {
    reqwest::Url::parse_with_params("http://localhost/", pairs)
        .ok()
        .and_then(|url| url.query().map(str::to_string))
        .unwrap_or_default()
}
