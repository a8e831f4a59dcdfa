//! Client-side tool execution for AUI
//!
//! [`ClientExecutor`] calls tools across a [`ToolTransport`] with per-attempt
//! timeouts, retry with backoff, and an optional result cache backed by any
//! [`CacheStore`].

pub mod cache;
pub mod executor;
pub mod transport;

pub use cache::{CacheEntry, CacheStore, FileCache, MemoryCache, SessionCache, SessionSpace};
pub use executor::{CacheKeyFn, CacheStats, ClientExecutor, ClientExecutorBuilder, RetryPolicy};
pub use transport::{HttpTransport, LocalTransport, ToolTransport};
