//! Span creation helpers for tool runs and client attempts

use crate::attributes::*;
use tracing::Span;
use tracing::field::Empty;

/// Attributes for tracing a tool run
#[derive(Debug, Clone)]
pub struct ToolSpanAttributes {
    pub tool_name: String,
    pub invocation_id: String,
    pub environment: String,
    pub args_json: String,
}

/// Create the span a tool run executes in.
///
/// The outcome field starts empty and is filled by [`record_outcome`] once
/// the handler settles.
pub fn tool_span(attrs: &ToolSpanAttributes) -> Span {
    tracing::info_span!(
        "run_tool",
        { AUI_OPERATION_NAME } = "run_tool",
        { AUI_TOOL_NAME } = %attrs.tool_name,
        { AUI_INVOCATION_ID } = %attrs.invocation_id,
        { AUI_TOOL_ENVIRONMENT } = %attrs.environment,
        { AUI_TOOL_ARGS } = %attrs.args_json,
        { AUI_TOOL_OUTCOME } = Empty,
    )
}

/// Record `ok` or the error kind on a span created by [`tool_span`]
pub fn record_outcome<T>(span: &Span, result: &aui_core::Result<T>) {
    match result {
        Ok(_) => span.record(AUI_TOOL_OUTCOME, "ok"),
        Err(e) => span.record(AUI_TOOL_OUTCOME, e.kind()),
    };
}

/// Create the span for one client executor attempt
pub fn trace_client_attempt(tool_name: &str, attempt: u32) -> Span {
    tracing::debug_span!(
        "client_attempt",
        { AUI_OPERATION_NAME } = "client_attempt",
        { AUI_TOOL_NAME } = %tool_name,
        { AUI_CLIENT_ATTEMPT } = attempt,
    )
}

/// Helper to safely serialize to JSON string
pub fn safe_serialize<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "<not serializable>".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_serialize() {
        let value = serde_json::json!({"a": 6, "b": 7});
        let result = safe_serialize(&value);
        assert!(result.contains("\"a\":6"));
    }

    #[test]
    fn test_tool_span_records_outcome() {
        let span = tool_span(&ToolSpanAttributes {
            tool_name: "calc".to_string(),
            invocation_id: "inv-1".to_string(),
            environment: "server".to_string(),
            args_json: r#"{"a":6,"b":7}"#.to_string(),
        });

        let ok: aui_core::Result<i32> = Ok(42);
        record_outcome(&span, &ok);

        let failed: aui_core::Result<i32> = Err(aui_core::Error::NotFound("calc".into()));
        record_outcome(&span, &failed);
    }
}
