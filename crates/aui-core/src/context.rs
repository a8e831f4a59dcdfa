use crate::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, OnceLock};

/// Key-value store owned by whoever constructs an [`ExecutionContext`].
///
/// Clones share the same entries, so reusing one context across calls
/// shares its cache while a fresh context starts empty.
#[derive(Debug, Clone, Default)]
pub struct ContextCache {
    entries: Arc<DashMap<String, Value>>,
}

impl ContextCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.entries.remove(key).map(|(_, value)| value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

/// A network request issued through [`Fetch`]
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: "POST".to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: Some(body),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Response returned by [`Fetch`]. Non-JSON bodies arrive as a JSON string.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Value,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network capability injected into every execution context so server and
/// client handlers share one call signature.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse>;
}

/// [`Fetch`] backed by a shared reqwest client
#[derive(Debug, Clone, Default)]
pub struct HttpFetch {
    client: reqwest::Client,
}

impl HttpFetch {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetch for HttpFetch {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| Error::message(format!("Invalid HTTP method '{}': {}", request.method, e)))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

        Ok(FetchResponse { status, body })
    }
}

fn default_fetch() -> Arc<dyn Fetch> {
    static FETCH: OnceLock<Arc<HttpFetch>> = OnceLock::new();
    FETCH.get_or_init(|| Arc::new(HttpFetch::default())).clone()
}

/// Identity carried into audit logs. Never includes the cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<Value>,
}

/// Per-call bag of capabilities handed to tool handlers.
///
/// `is_server` is supplied by the host when the context is built; the core
/// never guesses the environment. Tools only touch the context through its
/// cache.
#[derive(Clone)]
pub struct ExecutionContext {
    invocation_id: String,
    cache: ContextCache,
    fetch: Arc<dyn Fetch>,
    user: Option<Value>,
    session: Option<Value>,
    is_server: bool,
}

impl ExecutionContext {
    pub fn new(is_server: bool) -> Self {
        Self {
            invocation_id: uuid::Uuid::new_v4().to_string(),
            cache: ContextCache::new(),
            fetch: default_fetch(),
            user: None,
            session: None,
            is_server,
        }
    }

    /// Context for code running on the server side
    pub fn server() -> Self {
        Self::new(true)
    }

    /// Context for code running on the client side
    pub fn client() -> Self {
        Self::new(false)
    }

    /// Rebuilds a context from identity received over the wire
    pub fn from_snapshot(snapshot: ContextSnapshot, is_server: bool) -> Self {
        Self {
            user: snapshot.user,
            session: snapshot.session,
            ..Self::new(is_server)
        }
    }

    pub fn with_user(mut self, user: Value) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_session(mut self, session: Value) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_cache(mut self, cache: ContextCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_fetch(mut self, fetch: Arc<dyn Fetch>) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn with_invocation_id(mut self, invocation_id: impl Into<String>) -> Self {
        self.invocation_id = invocation_id.into();
        self
    }

    /// Same capabilities and identity with a fresh cache and invocation id
    pub fn fork(&self) -> Self {
        Self {
            invocation_id: uuid::Uuid::new_v4().to_string(),
            cache: ContextCache::new(),
            ..self.clone()
        }
    }

    /// Fills identity fields the caller left empty from `defaults`.
    pub fn inherit(mut self, defaults: &ExecutionContext) -> Self {
        if self.user.is_none() {
            self.user = defaults.user.clone();
        }
        if self.session.is_none() {
            self.session = defaults.session.clone();
        }
        self
    }

    pub fn invocation_id(&self) -> &str {
        &self.invocation_id
    }

    pub fn cache(&self) -> &ContextCache {
        &self.cache
    }

    pub fn fetch(&self) -> &Arc<dyn Fetch> {
        &self.fetch
    }

    pub fn user(&self) -> Option<&Value> {
        self.user.as_ref()
    }

    pub fn session(&self) -> Option<&Value> {
        self.session.as_ref()
    }

    pub fn is_server(&self) -> bool {
        self.is_server
    }

    pub fn environment(&self) -> &'static str {
        if self.is_server { "server" } else { "client" }
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            user: self.user.clone(),
            session: self.session.clone(),
        }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::server()
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("invocation_id", &self.invocation_id)
            .field("cache_entries", &self.cache.len())
            .field("user", &self.user)
            .field("session", &self.session)
            .field("is_server", &self.is_server)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_context_cache_shared_between_clones() {
        let ctx = ExecutionContext::client();
        let other = ctx.clone();

        ctx.cache().set("query:rust", json!(["tokio", "serde"]));

        assert_eq!(other.cache().get("query:rust"), Some(json!(["tokio", "serde"])));
        assert!(!ExecutionContext::client().cache().contains("query:rust"));
    }

    #[test]
    fn test_snapshot_excludes_cache() {
        let ctx = ExecutionContext::server()
            .with_user(json!({"id": "u-1"}))
            .with_session(json!({"id": "s-1"}));
        ctx.cache().set("secret", json!("value"));

        let snapshot = serde_json::to_value(ctx.snapshot()).unwrap();
        assert_eq!(snapshot, json!({"user": {"id": "u-1"}, "session": {"id": "s-1"}}));
    }

    #[test]
    fn test_inherit_keeps_caller_identity() {
        let defaults = ExecutionContext::server()
            .with_user(json!("default-user"))
            .with_session(json!("default-session"));
        let ctx = ExecutionContext::client()
            .with_user(json!("alice"))
            .inherit(&defaults);

        assert_eq!(ctx.user(), Some(&json!("alice")));
        assert_eq!(ctx.session(), Some(&json!("default-session")));
        assert!(!ctx.is_server());
    }

    #[test]
    fn test_fork_drops_cache_keeps_identity() {
        let ctx = ExecutionContext::client().with_user(json!("alice"));
        ctx.cache().set("k", json!(1));

        let forked = ctx.fork();
        assert!(forked.cache().is_empty());
        assert_eq!(forked.user(), Some(&json!("alice")));
        assert!(!forked.is_server());
        assert_ne!(forked.invocation_id(), ctx.invocation_id());
    }

    #[test]
    fn test_default_context_is_server() {
        let ctx = ExecutionContext::default();
        assert!(ctx.is_server());
        assert_eq!(ctx.environment(), "server");
        assert!(!ctx.invocation_id().is_empty());
    }
}
