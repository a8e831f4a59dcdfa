use aui_core::{ContextSnapshot, ToolCategory, ToolManifest};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub tool: String,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub context: Option<ContextSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmRequest {
    pub tool: String,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub context: Option<ContextSnapshot>,
    #[serde(default)]
    pub approved: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmResponse {
    pub approved: bool,
    pub data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// One entry of `GET {base}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    #[serde(flatten)]
    pub manifest: ToolManifest,
    pub category: ToolCategory,
    pub tags: Vec<String>,
    #[serde(rename = "requiresConfirmation")]
    pub requires_confirmation: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestResponse {
    pub tools: Vec<ToolDescriptor>,
}
