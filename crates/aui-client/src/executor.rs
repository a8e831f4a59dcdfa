use crate::cache::{CacheEntry, CacheStore, FileCache, MemoryCache, SessionCache};
use crate::transport::{HttpTransport, ToolTransport};
use aui_core::{
    BackoffKind, CacheConfig, CacheStorageKind, ClientConfig, Error, ExecutionContext, Result,
    RetryConfig,
};
use aui_telemetry::trace_client_attempt;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;
use tracing::Instrument;

/// Builds the cache key for a call; the default is `tool:serialized input`
pub type CacheKeyFn = Arc<dyn Fn(&str, &Value) -> String + Send + Sync>;

/// How many times to attempt a call and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
    pub backoff: BackoffKind,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            attempts: config.attempts.max(1),
            delay: Duration::from_millis(config.delay_ms),
            backoff: config.backoff,
        }
    }
}

impl RetryPolicy {
    /// A single attempt
    pub fn none() -> Self {
        Self {
            attempts: 1,
            delay: Duration::ZERO,
            backoff: BackoffKind::Exponential,
        }
    }

    /// Wait after the zero-based `attempt` fails: `delay * 2^attempt` or
    /// `delay * (attempt + 1)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            BackoffKind::Exponential => self.delay.saturating_mul(2u32.saturating_pow(attempt)),
            BackoffKind::Linear => self.delay.saturating_mul(attempt.saturating_add(1)),
        }
    }
}

/// Snapshot returned by [`ClientExecutor::cache_stats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub enabled: bool,
    pub entries: usize,
    pub max_size: usize,
    pub ttl_ms: u64,
    pub hits: u64,
    pub misses: u64,
}

struct ResultCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
    max_size: usize,
}

/// Executes tools across a [`ToolTransport`] with caching, retry and
/// per-attempt timeouts.
///
/// Not-found, rate-limit and other errors that would repeat for the same
/// input fail on the first attempt. Once retries run out the last error is
/// returned.
pub struct ClientExecutor {
    transport: Arc<dyn ToolTransport>,
    timeout: Duration,
    retry: RetryPolicy,
    cache: Option<ResultCache>,
    cache_key: Option<CacheKeyFn>,
    last_stamp: AtomicI64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ClientExecutor {
    pub fn builder(transport: Arc<dyn ToolTransport>) -> ClientExecutorBuilder {
        ClientExecutorBuilder::new(transport)
    }

    /// Executor posting to `config.base_url` with the configured timeout,
    /// retry policy and cache backend.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let mut transport = HttpTransport::new(&config.base_url);
        if let Some(api_key) = &config.api_key {
            transport = transport.with_api_key(api_key);
        }

        let mut builder = Self::builder(Arc::new(transport))
            .timeout(Duration::from_millis(config.timeout_ms))
            .retry(RetryPolicy::from(&config.retry));

        if config.cache.enabled {
            builder = builder.cache(
                cache_store(&config.cache)?,
                Duration::from_millis(config.cache.ttl_ms),
                config.cache.max_size,
            );
        }

        Ok(builder.build())
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn key_for(&self, tool: &str, input: &Value) -> String {
        match &self.cache_key {
            Some(key_fn) => key_fn(tool, input),
            None => format!("{}:{}", tool, input),
        }
    }

    /// Strictly increasing microsecond stamp so eviction order is total
    fn next_stamp(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_micros();
        let previous = self
            .last_stamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        now.max(previous + 1)
    }

    /// Runs `tool` remotely, serving from the cache when a fresh entry exists
    pub async fn execute(&self, tool: &str, input: Value, ctx: Option<&ExecutionContext>) -> Result<Value> {
        let Some(cache) = &self.cache else {
            return self.execute_with_retry(tool, input, ctx).await;
        };

        let key = self.key_for(tool, &input);
        if let Some(value) = self.lookup(cache, &key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(tool = %tool, key = %key, "Cache hit");
            return Ok(value);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let value = self.execute_with_retry(tool, input, ctx).await?;
        self.store(cache, &key, value.clone()).await;
        Ok(value)
    }

    async fn lookup(&self, cache: &ResultCache, key: &str) -> Option<Value> {
        let entry = match cache.store.get(key).await {
            Ok(entry) => entry?,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed");
                return None;
            }
        };

        let age_us = chrono::Utc::now().timestamp_micros() - entry.stored_at;
        if age_us < cache.ttl.as_micros() as i64 {
            return Some(entry.value);
        }

        if let Err(e) = cache.store.remove(key).await {
            tracing::warn!(key = %key, error = %e, "Failed to drop expired cache entry");
        }
        None
    }

    async fn store(&self, cache: &ResultCache, key: &str, value: Value) {
        let entry = CacheEntry {
            value,
            stored_at: self.next_stamp(),
        };
        if let Err(e) = cache.store.set(key, entry).await {
            tracing::warn!(key = %key, error = %e, "Cache write failed");
            return;
        }
        if let Err(e) = self.evict(cache).await {
            tracing::warn!(error = %e, "Cache eviction failed");
        }
    }

    /// Drops the oldest entries until at most `max_size` remain
    async fn evict(&self, cache: &ResultCache) -> Result<()> {
        let mut stamps = cache.store.stamps().await?;
        if stamps.len() <= cache.max_size {
            return Ok(());
        }

        stamps.sort_by_key(|(_, stored_at)| *stored_at);
        let excess = stamps.len() - cache.max_size;
        for (key, _) in stamps.into_iter().take(excess) {
            tracing::debug!(key = %key, "Evicting cache entry");
            cache.store.remove(&key).await?;
        }
        Ok(())
    }

    async fn execute_with_retry(
        &self,
        tool: &str,
        input: Value,
        ctx: Option<&ExecutionContext>,
    ) -> Result<Value> {
        let attempts = self.retry.attempts.max(1);
        let mut attempt = 0;

        loop {
            let call = self.transport.call(tool, input.clone(), ctx);
            let outcome = tokio::time::timeout(self.timeout, call)
                .instrument(trace_client_attempt(tool, attempt + 1))
                .await;

            let error = match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e,
                Err(_) => Error::Timeout {
                    tool: tool.to_string(),
                    after_ms: self.timeout.as_millis() as u64,
                },
            };

            attempt += 1;
            if !error.is_retryable() {
                tracing::debug!(tool = %tool, error = %error, "Not retrying");
                return Err(error);
            }
            if attempt >= attempts {
                tracing::warn!(tool = %tool, attempts, error = %error, "Retries exhausted");
                return Err(error);
            }

            let delay = self.retry.delay_for(attempt - 1);
            tracing::warn!(
                tool = %tool,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Tool call failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Drops the cached result for one call
    pub async fn invalidate(&self, tool: &str, input: &Value) -> Result<bool> {
        match &self.cache {
            Some(cache) => cache.store.remove(&self.key_for(tool, input)).await,
            None => Ok(false),
        }
    }

    pub async fn clear_cache(&self) -> Result<()> {
        if let Some(cache) = &self.cache {
            cache.store.clear().await?;
        }
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        Ok(())
    }

    pub async fn cache_stats(&self) -> Result<CacheStats> {
        let Some(cache) = &self.cache else {
            return Ok(CacheStats::default());
        };

        Ok(CacheStats {
            enabled: true,
            entries: cache.store.len().await?,
            max_size: cache.max_size,
            ttl_ms: cache.ttl.as_millis() as u64,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        })
    }
}

impl std::fmt::Debug for ClientExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientExecutor")
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("cache_enabled", &self.cache.is_some())
            .finish()
    }
}

fn cache_store(config: &CacheConfig) -> Result<Arc<dyn CacheStore>> {
    Ok(match config.storage {
        CacheStorageKind::Memory => Arc::new(MemoryCache::new()),
        CacheStorageKind::Local => {
            let path = config.path.as_ref().ok_or_else(|| {
                Error::config_error("client.cache.path is required for local storage")
            })?;
            Arc::new(FileCache::new(path))
        }
        CacheStorageKind::Session => {
            let session_id = config
                .session_id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            Arc::new(SessionCache::new(session_id))
        }
    })
}

/// Builder for [`ClientExecutor`]
pub struct ClientExecutorBuilder {
    transport: Arc<dyn ToolTransport>,
    timeout: Duration,
    retry: RetryPolicy,
    cache: Option<ResultCache>,
    cache_key: Option<CacheKeyFn>,
}

impl ClientExecutorBuilder {
    pub fn new(transport: Arc<dyn ToolTransport>) -> Self {
        Self {
            transport,
            timeout: Duration::from_millis(ClientConfig::default().timeout_ms),
            retry: RetryPolicy::default(),
            cache: None,
            cache_key: None,
        }
    }

    /// Deadline for each attempt
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Enables result caching. `max_size` is clamped to at least one entry.
    pub fn cache(mut self, store: Arc<dyn CacheStore>, ttl: Duration, max_size: usize) -> Self {
        self.cache = Some(ResultCache {
            store,
            ttl,
            max_size: max_size.max(1),
        });
        self
    }

    pub fn cache_key<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &Value) -> String + Send + Sync + 'static,
    {
        self.cache_key = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> ClientExecutor {
        ClientExecutor {
            transport: self.transport,
            timeout: self.timeout,
            retry: self.retry,
            cache: self.cache,
            cache_key: self.cache_key,
            last_stamp: AtomicI64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }
}
