use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation failed for tool '{tool}': {message}")]
    Validation { tool: String, message: String },

    #[error("Permission denied for tool '{tool}': {message}")]
    Permission { tool: String, message: String },

    #[error("Rate limit exceeded for tool '{tool}': {message}")]
    RateLimit { tool: String, message: String },

    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool '{tool}' timed out after {after_ms}ms")]
    Timeout { tool: String, after_ms: u64 },

    #[error("Tool '{tool}' execution failed: {source}")]
    ToolFailed {
        tool: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Tool '{0}' requires confirmation before it can run")]
    ConfirmationRequired(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Helper for creating configuration errors
    ///
    /// # Example
    /// ```
    /// use aui_core::Error;
    /// let err = Error::config_error("tool 'calc' has no handler");
    /// ```
    pub fn config_error(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    /// Helper for creating validation errors
    pub fn validation(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Helper for creating permission errors
    pub fn permission(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Permission {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Helper for creating rate limit errors
    pub fn rate_limit(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::RateLimit {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Wraps an error raised inside a tool handler
    ///
    /// # Example
    /// ```
    /// use aui_core::Error;
    /// let err = Error::handler("weather", anyhow::anyhow!("upstream returned 503"));
    /// assert_eq!(err.kind(), "tool_failed");
    /// ```
    pub fn handler(tool: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Error::ToolFailed {
            tool: tool.into(),
            source: source.into(),
        }
    }

    /// Helper for creating general errors with a message
    pub fn message(msg: impl Into<String>) -> Self {
        Error::Other(anyhow::anyhow!("{}", msg.into()))
    }

    /// Stable machine-readable code used on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Configuration(_) => "configuration_error",
            Error::Validation { .. } => "validation_error",
            Error::Permission { .. } => "permission_denied",
            Error::RateLimit { .. } => "rate_limited",
            Error::NotFound(_) => "not_found",
            Error::Timeout { .. } => "timeout",
            Error::ToolFailed { .. } => "tool_failed",
            Error::ConfirmationRequired(_) => "confirmation_required",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Io(_) => "io_error",
            Error::Other(_) => "internal_error",
        }
    }

    /// Whether a client may try the same call again.
    ///
    /// Missing tools and exhausted quotas fail fast, and so do failures that
    /// would repeat identically for the same input.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Error::NotFound(_)
                | Error::RateLimit { .. }
                | Error::Validation { .. }
                | Error::Permission { .. }
                | Error::Configuration(_)
                | Error::ConfirmationRequired(_)
        )
    }

    /// Rebuilds a typed error from a remote `{ error, code }` payload.
    ///
    /// Peers that omit `code` are classified from the message text, so a
    /// plain "Tool not found" or "rate limit exceeded" still fails fast.
    pub fn from_wire(code: Option<&str>, tool: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            Some("configuration_error") => Error::Configuration(message),
            Some("validation_error") => Error::validation(tool, message),
            Some("permission_denied") => Error::permission(tool, message),
            Some("rate_limited") => Error::rate_limit(tool, message),
            Some("not_found") => {
                let name = message.strip_prefix("Tool not found: ").unwrap_or(tool);
                Error::NotFound(name.to_string())
            }
            Some("confirmation_required") => Error::ConfirmationRequired(tool.to_string()),
            Some("network_error") => Error::Network(message),
            Some(_) => Error::handler(tool, anyhow::anyhow!(message)),
            None => {
                let lowered = message.to_lowercase();
                if lowered.contains("not found") {
                    Error::NotFound(tool.to_string())
                } else if lowered.contains("rate limit") {
                    Error::rate_limit(tool, message)
                } else {
                    Error::handler(tool, anyhow::anyhow!(message))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_exclusions() {
        assert!(!Error::NotFound("calc".into()).is_retryable());
        assert!(!Error::rate_limit("calc", "60/min").is_retryable());
        assert!(!Error::validation("calc", "a: expected number").is_retryable());
        assert!(
            Error::Timeout {
                tool: "calc".into(),
                after_ms: 10
            }
            .is_retryable()
        );
        assert!(Error::handler("calc", anyhow::anyhow!("boom")).is_retryable());
    }

    #[test]
    fn test_from_wire_uses_code_first() {
        let err = Error::from_wire(Some("rate_limited"), "search", "slow down");
        assert!(matches!(err, Error::RateLimit { .. }));

        let err = Error::from_wire(Some("not_found"), "search", "Tool not found: serach");
        assert!(matches!(err, Error::NotFound(ref name) if name == "serach"));

        let err = Error::from_wire(Some("tool_failed"), "search", "Tool not found in cache");
        assert!(matches!(err, Error::ToolFailed { .. }));
    }

    #[test]
    fn test_from_wire_falls_back_to_message() {
        let err = Error::from_wire(None, "search", "Tool search not found");
        assert!(matches!(err, Error::NotFound(ref name) if name == "search"));

        let err = Error::from_wire(None, "search", "Rate limit exceeded: 10/min");
        assert_eq!(err.kind(), "rate_limited");

        let err = Error::from_wire(None, "search", "database offline");
        assert_eq!(err.kind(), "tool_failed");
    }
}
