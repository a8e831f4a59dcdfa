//! Core traits and types for AUI
//!
//! This crate provides the foundational abstractions shared by tools, the
//! client executor and the HTTP server: the [`Tool`] trait, the per-call
//! [`ExecutionContext`], the error taxonomy and configuration loading.

pub mod config;
pub mod context;
pub mod error;
pub mod traits;

// Re-exports
pub use config::{
    AuiConfig, BackoffKind, CacheConfig, CacheStorageKind, ClientConfig, ObservabilityConfig,
    RetryConfig, ServerConfig,
};
pub use context::{
    ContextCache, ContextSnapshot, ExecutionContext, Fetch, FetchRequest, FetchResponse, HttpFetch,
};
pub use error::{Error, Result};
pub use traits::{RenderProps, Tool, ToolCategory, ToolManifest};
