//! Permission, rate limit and audit decorator for tools

use async_trait::async_trait;
use aui_core::{
    ContextSnapshot, Error, ExecutionContext, RenderProps, Result, Tool, ToolCategory,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Which environments may run a tool. The two flags are independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permissions {
    pub allow_client_execution: bool,
    pub allow_server_execution: bool,
}

impl Default for Permissions {
    fn default() -> Self {
        Self {
            allow_client_execution: true,
            allow_server_execution: true,
        }
    }
}

impl Permissions {
    pub fn check(&self, tool: &str, ctx: &ExecutionContext) -> Result<()> {
        if ctx.is_server() && !self.allow_server_execution {
            return Err(Error::permission(tool, "server execution is not allowed"));
        }
        if !ctx.is_server() && !self.allow_client_execution {
            return Err(Error::permission(tool, "client execution is not allowed"));
        }
        Ok(())
    }
}

/// Ceilings for [`RateLimiter`]; `None` means unlimited
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    pub requests_per_minute: Option<u32>,
    pub requests_per_hour: Option<u32>,
}

impl RateLimitConfig {
    pub fn is_unlimited(&self) -> bool {
        self.requests_per_minute.is_none() && self.requests_per_hour.is_none()
    }
}

/// Sliding-window limiter keeping the start time of every admitted call in
/// the last hour.
///
/// Windows are computed against `now` on each call, so there is no
/// background timer. Checking and recording happen under one lock.
#[derive(Debug, Default)]
pub struct RateLimiter {
    config: RateLimitConfig,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            calls: Mutex::new(VecDeque::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Admits one call or fails with [`Error::RateLimit`]
    pub fn try_acquire(&self, tool: &str) -> Result<()> {
        if self.config.is_unlimited() {
            return Ok(());
        }

        let now = Instant::now();
        let mut calls = lock(&self.calls);
        while calls
            .front()
            .is_some_and(|started| now.duration_since(*started) >= HOUR)
        {
            calls.pop_front();
        }

        if let Some(limit) = self.config.requests_per_hour {
            if calls.len() >= limit as usize {
                return Err(Error::rate_limit(
                    tool,
                    format!("{} requests per hour", limit),
                ));
            }
        }

        if let Some(limit) = self.config.requests_per_minute {
            let last_minute = calls
                .iter()
                .rev()
                .take_while(|started| now.duration_since(**started) < MINUTE)
                .count();
            if last_minute >= limit as usize {
                return Err(Error::rate_limit(
                    tool,
                    format!("{} requests per minute", limit),
                ));
            }
        }

        calls.push_back(now);
        Ok(())
    }

    /// Calls admitted within the last minute
    pub fn calls_last_minute(&self) -> usize {
        let now = Instant::now();
        lock(&self.calls)
            .iter()
            .filter(|started| now.duration_since(**started) < MINUTE)
            .count()
    }

    /// Calls admitted within the last hour
    pub fn calls_last_hour(&self) -> usize {
        let now = Instant::now();
        lock(&self.calls)
            .iter()
            .filter(|started| now.duration_since(**started) < HOUR)
            .count()
    }

    pub fn reset(&self) {
        lock(&self.calls).clear();
    }
}

/// Result half of an [`ExecutionLogEntry`]: exactly one of output or error
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionOutcome {
    Output(Value),
    Error(String),
}

/// One audited `run` call
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLogEntry {
    pub timestamp: DateTime<Utc>,
    pub invocation_id: String,
    pub input: Value,
    #[serde(flatten)]
    pub outcome: ExecutionOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextSnapshot>,
    pub duration_ms: u64,
}

impl ExecutionLogEntry {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ExecutionOutcome::Output(_))
    }
}

/// Settings for [`ControlledTool`]
#[derive(Debug, Clone, Default)]
pub struct ControlOptions {
    pub permissions: Permissions,
    pub rate_limit: RateLimitConfig,
    pub audit: bool,
    pub capture_context: bool,
}

impl ControlOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn audit(mut self, enabled: bool) -> Self {
        self.audit = enabled;
        self
    }

    /// Stores the caller's user and session with each log entry
    pub fn capture_context(mut self, enabled: bool) -> Self {
        self.capture_context = enabled;
        self
    }

    pub fn requests_per_minute(mut self, limit: u32) -> Self {
        self.rate_limit.requests_per_minute = Some(limit);
        self
    }

    pub fn requests_per_hour(mut self, limit: u32) -> Self {
        self.rate_limit.requests_per_hour = Some(limit);
        self
    }

    pub fn deny_client_execution(mut self) -> Self {
        self.permissions.allow_client_execution = false;
        self
    }

    pub fn deny_server_execution(mut self) -> Self {
        self.permissions.allow_server_execution = false;
        self
    }

    pub fn permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }
}

/// Wraps a tool with permission checks, a rate limiter and an audit log.
///
/// Order per call: permissions, input validation, rate limit, inner `run`.
/// Rejected and malformed calls never consume rate limit quota. With audit
/// on, every call appends exactly one entry, in completion order.
pub struct ControlledTool {
    inner: Arc<dyn Tool>,
    options: ControlOptions,
    limiter: RateLimiter,
    log: Mutex<Vec<ExecutionLogEntry>>,
}

impl ControlledTool {
    pub fn new(inner: Arc<dyn Tool>, options: ControlOptions) -> Self {
        Self {
            inner,
            limiter: RateLimiter::new(options.rate_limit),
            options,
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn wrap(tool: impl Tool + 'static, options: ControlOptions) -> Self {
        Self::new(Arc::new(tool), options)
    }

    pub fn inner(&self) -> &Arc<dyn Tool> {
        &self.inner
    }

    pub fn options(&self) -> &ControlOptions {
        &self.options
    }

    pub fn execution_log(&self) -> Vec<ExecutionLogEntry> {
        lock(&self.log).clone()
    }

    pub fn clear_execution_log(&self) {
        lock(&self.log).clear();
    }

    pub fn reset_rate_limit(&self) {
        self.limiter.reset();
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    async fn guarded(&self, input: Value, ctx: ExecutionContext) -> Result<Value> {
        let name = self.inner.name();

        if let Err(e) = self.options.permissions.check(name, &ctx) {
            tracing::warn!(tool = %name, environment = ctx.environment(), "Execution denied");
            return Err(e);
        }

        let input = self.inner.validate(input)?;

        if let Err(e) = self.limiter.try_acquire(name) {
            tracing::warn!(tool = %name, error = %e, "Rate limit exceeded");
            return Err(e);
        }

        self.inner.run_validated(input, Some(ctx)).await
    }

    fn record(&self, input: Value, ctx: &ExecutionContext, result: &Result<Value>, started: Instant) {
        let (outcome, error_kind) = match result {
            Ok(output) => (ExecutionOutcome::Output(output.clone()), None),
            Err(e) => (ExecutionOutcome::Error(e.to_string()), Some(e.kind())),
        };

        let entry = ExecutionLogEntry {
            timestamp: Utc::now(),
            invocation_id: ctx.invocation_id().to_string(),
            input,
            outcome,
            error_kind,
            context: self.options.capture_context.then(|| ctx.snapshot()),
            duration_ms: started.elapsed().as_millis() as u64,
        };

        lock(&self.log).push(entry);
    }
}

impl std::fmt::Debug for ControlledTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlledTool")
            .field("tool", &self.inner.name())
            .field("options", &self.options)
            .field("log_entries", &lock(&self.log).len())
            .finish()
    }
}

#[async_trait]
impl Tool for ControlledTool {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn tags(&self) -> &[String] {
        self.inner.tags()
    }

    fn input_schema(&self) -> Option<Value> {
        self.inner.input_schema()
    }

    fn category(&self) -> ToolCategory {
        self.inner.category()
    }

    fn requires_confirmation(&self) -> bool {
        self.inner.requires_confirmation()
    }

    fn should_confirm(&self, input: &Value) -> bool {
        self.inner.should_confirm(input)
    }

    fn render(&self, props: RenderProps<'_>) -> Option<String> {
        self.inner.render(props)
    }

    fn validate(&self, input: Value) -> Result<Value> {
        self.inner.validate(input)
    }

    async fn run(&self, input: Value, ctx: Option<ExecutionContext>) -> Result<Value> {
        let ctx = ctx.unwrap_or_default();
        let started = Instant::now();

        if !self.options.audit {
            return self.guarded(input, ctx).await;
        }

        let result = self.guarded(input.clone(), ctx.clone()).await;
        self.record(input, &ctx, &result, started);
        result
    }
}
