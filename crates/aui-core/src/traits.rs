use super::{ExecutionContext, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where a tool is able to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    Server,
    Client,
    Hybrid,
    Custom,
}

impl ToolCategory {
    /// Category implied by which handlers a tool carries
    pub fn from_handlers(has_server: bool, has_client: bool) -> Self {
        match (has_server, has_client) {
            (true, true) => ToolCategory::Hybrid,
            (false, true) => ToolCategory::Client,
            _ => ToolCategory::Server,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolCategory::Server => "server",
            ToolCategory::Client => "client",
            ToolCategory::Hybrid => "hybrid",
            ToolCategory::Custom => "custom",
        }
    }
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Props handed to a tool's render function. Rendering is pure.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderProps<'a> {
    pub data: Option<&'a Value>,
    pub input: Option<&'a Value>,
    pub loading: bool,
    pub error: Option<&'a str>,
}

impl<'a> RenderProps<'a> {
    pub fn data(data: &'a Value) -> Self {
        Self {
            data: Some(data),
            ..Default::default()
        }
    }

    pub fn loading() -> Self {
        Self {
            loading: true,
            ..Default::default()
        }
    }

    pub fn failed(error: &'a str) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn with_input(mut self, input: &'a Value) -> Self {
        self.input = Some(input);
        self
    }
}

/// Entry of an LLM tool-calling manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolManifest {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Tool trait - abstraction for invokable operations
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the unique name of the tool
    fn name(&self) -> &str;

    /// Returns a description of what the tool does
    fn description(&self) -> &str;

    fn tags(&self) -> &[String] {
        &[]
    }

    /// Returns the JSON schema for the tool's input, if it declares one
    fn input_schema(&self) -> Option<Value> {
        None
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Server
    }

    /// Whether some inputs need human approval before the tool runs
    fn requires_confirmation(&self) -> bool {
        false
    }

    /// Whether this particular input needs human approval
    fn should_confirm(&self, _input: &Value) -> bool {
        self.requires_confirmation()
    }

    /// Presents a result. Tools without a renderer return `None`.
    fn render(&self, _props: RenderProps<'_>) -> Option<String> {
        None
    }

    fn manifest(&self) -> ToolManifest {
        ToolManifest {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self
                .input_schema()
                .unwrap_or_else(|| serde_json::json!({"type": "object", "properties": {}})),
        }
    }

    /// Checks `input` against the tool's schema and returns the parsed value.
    /// Tools without a schema accept anything.
    fn validate(&self, input: Value) -> Result<Value> {
        Ok(input)
    }

    /// Validates `input` and runs the handler selected by `ctx`.
    ///
    /// Without a context the server handler runs against a fresh server
    /// context.
    async fn run(&self, input: Value, ctx: Option<ExecutionContext>) -> Result<Value>;

    /// Runs input that already went through [`Tool::validate`].
    ///
    /// Wrappers that validate before their own checks call this so the
    /// schema is parsed once. Defaults to [`Tool::run`].
    async fn run_validated(&self, input: Value, ctx: Option<ExecutionContext>) -> Result<Value> {
        self.run(input, ctx).await
    }
}
