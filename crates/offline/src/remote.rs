//! Generic client for the managed backend.
//!
//! The backend is a request/response data service: row operations against
//! named collections plus invokable server-side functions. The offline layer
//! only depends on the [`RemoteStore`] trait; [`HttpRemote`] speaks the
//! PostgREST-style REST surface, [`InMemoryRemote`] stands in for tests.

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

/// Remote call failure, classified by what the caller should do about it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The backend could not be reached at all.
    #[error("backend unreachable: {0}")]
    Unreachable(String),
    /// The backend answered but could not serve the request right now
    /// (5xx, 408, 429).
    #[error("backend unavailable ({status}): {message}")]
    Unavailable { status: u16, message: String },
    /// The backend refused the request; repeating it will not help.
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    /// The response could not be understood.
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Whether retrying the same request can never succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(self, RemoteError::Rejected { .. })
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            408 | 429 | 500..=599 => RemoteError::Unavailable { status, message },
            _ => RemoteError::Rejected { status, message },
        }
    }
}

/// Equality filter on one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub value: String,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    fn matches(&self, row: &Value) -> bool {
        match row.get(&self.column) {
            Some(Value::String(s)) => *s == self.value,
            Some(Value::Null) | None => false,
            Some(other) => other.to_string() == self.value,
        }
    }
}

/// Row selection: conjunction of filters, optional ordering and limit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, bool)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order_by = Some((column.into(), ascending));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Request/response access to the managed backend.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn select(&self, collection: &str, query: &Query) -> Result<Vec<Value>, RemoteError>;

    /// Insert rows, returning them as stored.
    async fn insert(&self, collection: &str, rows: Vec<Value>) -> Result<Vec<Value>, RemoteError>;

    /// Patch every row matching all filters, returning the updated rows.
    async fn update(
        &self,
        collection: &str,
        filters: &[Filter],
        patch: Value,
    ) -> Result<Vec<Value>, RemoteError>;

    /// Delete every row matching all filters, returning how many went.
    async fn delete(&self, collection: &str, filters: &[Filter]) -> Result<usize, RemoteError>;

    /// Call a server-side function.
    async fn invoke(&self, function: &str, body: Value) -> Result<Value, RemoteError>;

    /// Cheap reachability probe.
    async fn health_check(&self) -> bool;
}

/// HTTP client for a PostgREST-style backend (`/rest/v1`, `/functions/v1`).
#[derive(Debug, Clone)]
pub struct HttpRemote {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Unreachable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    fn rest_url(&self, collection: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, collection)
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("apikey", key).bearer_auth(key),
            None => req,
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, RemoteError> {
        let resp = self
            .authed(req)
            .send()
            .await
            .map_err(|e| RemoteError::Unreachable(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            Ok(resp)
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(RemoteError::from_status(status.as_u16(), body))
        }
    }

    async fn rows(resp: reqwest::Response) -> Result<Vec<Value>, RemoteError> {
        let body: Value = resp
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        match body {
            Value::Array(rows) => Ok(rows),
            other => Err(RemoteError::Decode(format!("expected an array of rows, got {other}"))),
        }
    }
}

fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|f| (f.column.clone(), format!("eq.{}", f.value)))
        .collect()
}

fn query_params(query: &Query) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), "*".to_string())];
    params.extend(filter_params(&query.filters));
    if let Some((column, ascending)) = &query.order_by {
        let dir = if *ascending { "asc" } else { "desc" };
        params.push(("order".to_string(), format!("{column}.{dir}")));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn select(&self, collection: &str, query: &Query) -> Result<Vec<Value>, RemoteError> {
        let req = self
            .client
            .get(self.rest_url(collection))
            .query(&query_params(query));
        Self::rows(self.send(req).await?).await
    }

    async fn insert(&self, collection: &str, rows: Vec<Value>) -> Result<Vec<Value>, RemoteError> {
        let req = self
            .client
            .post(self.rest_url(collection))
            .header("Prefer", "return=representation")
            .json(&rows);
        Self::rows(self.send(req).await?).await
    }

    async fn update(
        &self,
        collection: &str,
        filters: &[Filter],
        patch: Value,
    ) -> Result<Vec<Value>, RemoteError> {
        let req = self
            .client
            .patch(self.rest_url(collection))
            .query(&filter_params(filters))
            .header("Prefer", "return=representation")
            .json(&patch);
        Self::rows(self.send(req).await?).await
    }

    async fn delete(&self, collection: &str, filters: &[Filter]) -> Result<usize, RemoteError> {
        let req = self
            .client
            .delete(self.rest_url(collection))
            .query(&filter_params(filters))
            .header("Prefer", "return=representation");
        Ok(Self::rows(self.send(req).await?).await?.len())
    }

    async fn invoke(&self, function: &str, body: Value) -> Result<Value, RemoteError> {
        let url = format!("{}/functions/v1/{}", self.base_url, function);
        let resp = self.send(self.client.post(url).json(&body)).await?;
        let text = resp
            .text()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| RemoteError::Decode(e.to_string()))
    }

    /// Any HTTP answer counts as reachable.
    async fn health_check(&self) -> bool {
        let req = self.authed(self.client.get(format!("{}/rest/v1/", self.base_url)));
        req.send().await.is_ok()
    }
}

/// A recorded call against [`InMemoryRemote`].
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    Select(String),
    Insert(String, Vec<Value>),
    Update(String),
    Delete(String),
    Invoke(String, Value),
}

#[derive(Debug, Default)]
struct MemoryState {
    collections: HashMap<String, Vec<Value>>,
    calls: Vec<RemoteCall>,
    reachable: bool,
    scripted_failures: VecDeque<RemoteError>,
}

/// In-process backend.
///
/// Intended for tests/dev: keeps collections in memory, records every call,
/// and can be told to go unreachable or to fail the next requests.
#[derive(Debug)]
pub struct InMemoryRemote {
    state: Mutex<MemoryState>,
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                reachable: true,
                ..MemoryState::default()
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A panicking test thread must not hide the recorded calls from the others.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the contents of a collection.
    pub fn seed(&self, collection: &str, rows: Vec<Value>) {
        self.lock().collections.insert(collection.to_string(), rows);
    }

    pub fn rows(&self, collection: &str) -> Vec<Value> {
        self.lock().collections.get(collection).cloned().unwrap_or_default()
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    /// Make the next data call (not health checks) fail with `error`.
    pub fn fail_next(&self, error: RemoteError) {
        self.lock().scripted_failures.push_back(error);
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.lock().calls.clone()
    }

    /// Number of `select` calls against `collection`.
    pub fn select_count(&self, collection: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, RemoteCall::Select(name) if name == collection))
            .count()
    }

    /// Record `call` and decide whether it goes through.
    fn admit(&self, call: RemoteCall) -> Result<std::sync::MutexGuard<'_, MemoryState>, RemoteError> {
        let mut state = self.lock();
        if !state.reachable {
            return Err(RemoteError::Unreachable("connection refused".to_string()));
        }
        if let Some(err) = state.scripted_failures.pop_front() {
            return Err(err);
        }
        state.calls.push(call);
        Ok(state)
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemote {
    async fn select(&self, collection: &str, query: &Query) -> Result<Vec<Value>, RemoteError> {
        let state = self.admit(RemoteCall::Select(collection.to_string()))?;
        let mut rows: Vec<Value> = state
            .collections
            .get(collection)
            .map(|rows| {
                rows.iter()
                    .filter(|r| query.filters.iter().all(|f| f.matches(r)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if let Some((column, ascending)) = &query.order_by {
            rows.sort_by(|a, b| {
                let ord = compare_column(a.get(column), b.get(column));
                if *ascending { ord } else { ord.reverse() }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert(&self, collection: &str, rows: Vec<Value>) -> Result<Vec<Value>, RemoteError> {
        let mut state = self.admit(RemoteCall::Insert(collection.to_string(), rows.clone()))?;
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .extend(rows.iter().cloned());
        Ok(rows)
    }

    async fn update(
        &self,
        collection: &str,
        filters: &[Filter],
        patch: Value,
    ) -> Result<Vec<Value>, RemoteError> {
        let mut state = self.admit(RemoteCall::Update(collection.to_string()))?;
        let mut updated = Vec::new();
        if let Some(rows) = state.collections.get_mut(collection) {
            for row in rows.iter_mut().filter(|r| filters.iter().all(|f| f.matches(r))) {
                if let (Some(target), Some(changes)) = (row.as_object_mut(), patch.as_object()) {
                    for (k, v) in changes {
                        target.insert(k.clone(), v.clone());
                    }
                }
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    async fn delete(&self, collection: &str, filters: &[Filter]) -> Result<usize, RemoteError> {
        let mut state = self.admit(RemoteCall::Delete(collection.to_string()))?;
        let Some(rows) = state.collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|r| !filters.iter().all(|f| f.matches(r)));
        Ok(before - rows.len())
    }

    async fn invoke(&self, function: &str, body: Value) -> Result<Value, RemoteError> {
        let _state = self.admit(RemoteCall::Invoke(function.to_string(), body))?;
        Ok(serde_json::json!({ "ok": true }))
    }

    async fn health_check(&self) -> bool {
        self.lock().reachable
    }
}

/// Postgres ordering for a JSON column: nulls sort after every value, so
/// they come last ascending and first descending.
fn compare_column(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.total_cmp(&y)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}
