//! Tool definition and execution for AUI
//!
//! This crate provides:
//! - Input schemas with path-reporting validation and JSON-schema export
//! - `FunctionTool`, built from closures with a typed builder
//! - Middleware chains around server/client dispatch
//! - `ControlledTool` for permissions, rate limits and audit logs
//! - `ToolRegistry` for lookup, search and manifest export
//! - Built-in tools (calculator, counter, task list)

pub mod builtin;
pub mod confirmation;
pub mod control;
pub mod function_tool;
pub mod middleware;
pub mod registry;
pub mod schema;

// Re-exports
pub use confirmation::{ConfirmPredicate, Confirmation};
pub use control::{
    ControlOptions, ControlledTool, ExecutionLogEntry, ExecutionOutcome, Permissions,
    RateLimitConfig, RateLimiter,
};
pub use function_tool::{FunctionTool, HandlerFn, RenderFn, ToolBuilder};
pub use middleware::{FnMiddleware, Middleware, Next, middleware_fn};
pub use registry::{RegistryStats, SearchResult, ToolMetadata, ToolRegistry};
pub use schema::{
    Field, InputValidator, JsonSchemaVisitor, Schema, SchemaError, SchemaKind, SchemaVisitor,
    TypedSchema, generate_schema,
};

// Re-export core types
pub use aui_core::{Error, ExecutionContext, RenderProps, Result, Tool, ToolCategory, ToolManifest};
