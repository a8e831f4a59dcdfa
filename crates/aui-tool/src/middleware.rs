//! Interceptors wrapped around a tool's handler selection

use crate::function_tool::FunctionTool;
use async_trait::async_trait;
use aui_core::{ExecutionContext, Result};
use serde_json::Value;
use std::future::Future;

/// Interceptor in a tool's middleware chain.
///
/// Each middleware receives the validated input and decides whether to call
/// `next.run(..)`; returning without calling it short-circuits the chain.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, input: Value, ctx: ExecutionContext, next: Next) -> Result<Value>;
}

/// The rest of the chain. The innermost step picks the server or client
/// handler.
pub struct Next {
    tool: FunctionTool,
    index: usize,
}

impl Next {
    pub(crate) fn start(tool: FunctionTool) -> Self {
        Self { tool, index: 0 }
    }

    pub async fn run(self, input: Value, ctx: ExecutionContext) -> Result<Value> {
        match self.tool.middleware_at(self.index) {
            Some(middleware) => {
                let next = Next {
                    tool: self.tool.clone(),
                    index: self.index + 1,
                };
                middleware.handle(input, ctx, next).await
            }
            None => self.tool.dispatch(input, ctx).await,
        }
    }
}

/// Middleware built from a closure
pub struct FnMiddleware<F> {
    f: F,
}

/// Adapts an async closure into a [`Middleware`]
///
/// # Example
///
/// ```
/// use aui_tool::{FunctionTool, middleware_fn};
///
/// let tool = FunctionTool::builder("shout")
///     .middleware(middleware_fn(|input, ctx, next| async move {
///         tracing::info!(invocation_id = %ctx.invocation_id(), "before");
///         next.run(input, ctx).await
///     }))
///     .execute(|input: serde_json::Value, _ctx| async move { Ok(input) })
///     .build()
///     .unwrap();
/// ```
pub fn middleware_fn<F, Fut>(f: F) -> FnMiddleware<F>
where
    F: Fn(Value, ExecutionContext, Next) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    FnMiddleware { f }
}

#[async_trait]
impl<F, Fut> Middleware for FnMiddleware<F>
where
    F: Fn(Value, ExecutionContext, Next) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    async fn handle(&self, input: Value, ctx: ExecutionContext, next: Next) -> Result<Value> {
        (self.f)(input, ctx, next).await
    }
}
