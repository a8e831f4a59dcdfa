//! # AUI Telemetry
//!
//! Structured logging and OpenTelemetry tracing for tool runs.
//!
//! Every tool invocation executes inside a span carrying the attribute keys
//! defined in [`attributes`], so runs can be correlated with audit log
//! entries through their invocation id.

mod spans;
mod tracer;

pub use spans::{
    ToolSpanAttributes, record_outcome, safe_serialize, tool_span, trace_client_attempt,
};
pub use tracer::{init_telemetry, register_span_processor, tracer_provider};

/// OpenTelemetry span attribute constants for tool observability.
pub mod attributes {
    pub const AUI_OPERATION_NAME: &str = "aui.operation.name";
    pub const AUI_TOOL_NAME: &str = "aui.tool.name";
    pub const AUI_TOOL_ENVIRONMENT: &str = "aui.tool.environment";
    pub const AUI_TOOL_ARGS: &str = "aui.tool.args";
    pub const AUI_TOOL_OUTCOME: &str = "aui.tool.outcome";
    pub const AUI_INVOCATION_ID: &str = "aui.invocation.id";
    pub const AUI_CLIENT_ATTEMPT: &str = "aui.client.attempt";

    pub const SYSTEM_NAME: &str = "aui";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_constants() {
        assert_eq!(attributes::AUI_TOOL_NAME, "aui.tool.name");
        assert_eq!(attributes::SYSTEM_NAME, "aui");
    }
}
