//! How the client executor reaches a tool

use async_trait::async_trait;
use aui_core::{Error, ExecutionContext, Result};
use aui_tool::ToolRegistry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// One remote tool invocation. Timeouts and retries are applied by the
/// caller.
#[async_trait]
pub trait ToolTransport: Send + Sync {
    async fn call(&self, tool: &str, input: Value, ctx: Option<&ExecutionContext>) -> Result<Value>;
}

#[derive(Debug, Serialize)]
struct ExecuteRequest<'a> {
    tool: &'a str,
    input: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<aui_core::ContextSnapshot>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    code: Option<String>,
}

/// Posts `{ tool, input, context }` to the execute endpoint of an AUI
/// server. Success bodies are `{ data }`; failures are `{ error, code }`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            api_key: None,
        }
    }

    /// Sends `api_key` as a bearer token on every request
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ToolTransport for HttpTransport {
    async fn call(&self, tool: &str, input: Value, ctx: Option<&ExecutionContext>) -> Result<Value> {
        let body = ExecuteRequest {
            tool,
            input,
            context: ctx.map(|ctx| ctx.snapshot()),
        };

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if status.is_success() {
            let mut payload: Value = serde_json::from_str(&text)?;
            return Ok(payload
                .get_mut("data")
                .map(Value::take)
                .unwrap_or(Value::Null));
        }

        tracing::debug!(tool = %tool, status = status.as_u16(), "Remote tool call failed");

        match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => Err(Error::from_wire(body.code.as_deref(), tool, body.error)),
            Err(_) => {
                let code = match status.as_u16() {
                    404 => Some("not_found"),
                    429 => Some("rate_limited"),
                    _ => None,
                };
                Err(Error::from_wire(code, tool, format!("HTTP {}: {}", status, text)))
            }
        }
    }
}

/// Calls tools in an in-process registry, as a server would.
///
/// The caller's identity is carried over but the tool runs with a server
/// context, matching what an HTTP round trip would produce.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    registry: Arc<ToolRegistry>,
}

impl LocalTransport {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ToolTransport for LocalTransport {
    async fn call(&self, tool: &str, input: Value, ctx: Option<&ExecutionContext>) -> Result<Value> {
        let ctx = ctx.map(|ctx| ExecutionContext::from_snapshot(ctx.snapshot(), true));
        self.registry.execute(tool, input, ctx).await
    }
}
