use crate::confirmation::Confirmation;
use crate::middleware::{Middleware, Next};
use crate::schema::{InputValidator, TypedSchema};
use async_trait::async_trait;
use aui_core::{Error, ExecutionContext, RenderProps, Result, Tool, ToolCategory};
use aui_telemetry::{ToolSpanAttributes, record_outcome, safe_serialize, tool_span};
use futures::FutureExt;
use futures::future::BoxFuture;
use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::Instrument;

/// Type alias for an erased tool handler: validated JSON in, JSON out
pub type HandlerFn =
    Arc<dyn Fn(Value, ExecutionContext) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Type alias for a presentation function
pub type RenderFn = Arc<dyn Fn(RenderProps<'_>) -> String + Send + Sync>;

struct ToolDefinition {
    name: String,
    description: String,
    tags: Vec<String>,
    validator: Option<Arc<dyn InputValidator>>,
    server: Option<HandlerFn>,
    client: Option<HandlerFn>,
    renderer: Option<RenderFn>,
    middleware: Vec<Arc<dyn Middleware>>,
    confirmation: Confirmation,
}

/// A tool assembled from closures by [`ToolBuilder`].
///
/// Cloning is cheap and clones share one configuration, which is frozen once
/// `build` returns.
#[derive(Clone)]
pub struct FunctionTool {
    def: Arc<ToolDefinition>,
}

impl FunctionTool {
    pub fn builder(name: impl Into<String>) -> ToolBuilder {
        ToolBuilder::new(name)
    }

    pub fn has_server_handler(&self) -> bool {
        self.def.server.is_some()
    }

    pub fn has_client_handler(&self) -> bool {
        self.def.client.is_some()
    }

    pub fn has_renderer(&self) -> bool {
        self.def.renderer.is_some()
    }

    pub fn confirmation(&self) -> &Confirmation {
        &self.def.confirmation
    }

    /// Checks `input` against the input schema; tools without one accept
    /// anything unchanged.
    pub fn validate(&self, input: Value) -> Result<Value> {
        match &self.def.validator {
            Some(validator) => validator
                .parse(input)
                .map_err(|e| Error::validation(&self.def.name, e.to_string())),
            None => Ok(input),
        }
    }

    pub(crate) fn middleware_at(&self, index: usize) -> Option<Arc<dyn Middleware>> {
        self.def.middleware.get(index).cloned()
    }

    /// The client handler runs only when one exists and the context says we
    /// are not on the server. A failing client handler is not retried on the
    /// server.
    pub(crate) async fn dispatch(&self, input: Value, ctx: ExecutionContext) -> Result<Value> {
        let handler = match (&self.def.client, &self.def.server) {
            (Some(client), _) if !ctx.is_server() => {
                tracing::debug!(tool = %self.def.name, "Dispatching to client handler");
                client
            }
            (_, Some(server)) => {
                tracing::debug!(tool = %self.def.name, "Dispatching to server handler");
                server
            }
            _ => {
                return Err(Error::config_error(format!(
                    "Tool '{}' has no handler for {} execution",
                    self.def.name,
                    ctx.environment()
                )));
            }
        };

        handler(input, ctx).await
    }
}

impl std::fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.def.name)
            .field("description", &self.def.description)
            .field("tags", &self.def.tags)
            .field("has_schema", &self.def.validator.is_some())
            .field("has_server_handler", &self.has_server_handler())
            .field("has_client_handler", &self.has_client_handler())
            .field("middleware", &self.def.middleware.len())
            .field("confirmation", &self.def.confirmation)
            .finish()
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.def.name
    }

    fn description(&self) -> &str {
        &self.def.description
    }

    fn tags(&self) -> &[String] {
        &self.def.tags
    }

    fn input_schema(&self) -> Option<Value> {
        self.def.validator.as_ref().map(|v| v.json_schema())
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::from_handlers(self.has_server_handler(), self.has_client_handler())
    }

    fn requires_confirmation(&self) -> bool {
        self.def.confirmation.is_required()
    }

    fn should_confirm(&self, input: &Value) -> bool {
        self.def.confirmation.should_confirm(input)
    }

    fn render(&self, props: RenderProps<'_>) -> Option<String> {
        self.def.renderer.as_ref().map(|render| render(props))
    }

    fn validate(&self, input: Value) -> Result<Value> {
        FunctionTool::validate(self, input)
    }

    async fn run(&self, input: Value, ctx: Option<ExecutionContext>) -> Result<Value> {
        self.traced(input, ctx, true).await
    }

    async fn run_validated(&self, input: Value, ctx: Option<ExecutionContext>) -> Result<Value> {
        self.traced(input, ctx, false).await
    }
}

impl FunctionTool {
    async fn traced(&self, input: Value, ctx: Option<ExecutionContext>, validate: bool) -> Result<Value> {
        let ctx = ctx.unwrap_or_default();
        let span = tool_span(&ToolSpanAttributes {
            tool_name: self.def.name.clone(),
            invocation_id: ctx.invocation_id().to_string(),
            environment: ctx.environment().to_string(),
            args_json: safe_serialize(&input),
        });

        let result = async {
            let input = if validate { FunctionTool::validate(self, input)? } else { input };
            Next::start(self.clone()).run(input, ctx).await
        }
        .instrument(span.clone())
        .await;

        record_outcome(&span, &result);
        result
    }
}

/// Erases a typed handler into a [`HandlerFn`]
fn erase<I, R, F, Fut>(tool: &str, f: F) -> HandlerFn
where
    I: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    F: Fn(I, ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    let tool = tool.to_string();
    let f = Arc::new(f);
    Arc::new(move |input: Value, ctx: ExecutionContext| {
        let f = f.clone();
        let tool = tool.clone();
        async move {
            let typed: I =
                serde_json::from_value(input).map_err(|e| Error::validation(&tool, e.to_string()))?;
            let output = f(typed, ctx).await?;
            Ok(serde_json::to_value(output)?)
        }
        .boxed()
    })
}

/// Fluent builder for [`FunctionTool`].
///
/// `I` and `O` track the handler input and output types: `input::<T>()`
/// narrows `I`, `execute` narrows `O`, and `client_execute` must produce the
/// same `O` as the server handler.
///
/// # Example
///
/// ```
/// use aui_tool::{FunctionTool, Schema};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Calc {
///     a: f64,
///     b: f64,
/// }
///
/// let tool = FunctionTool::builder("calc")
///     .description("Multiplies two numbers")
///     .input::<Calc>(
///         Schema::object()
///             .field("a", Schema::number())
///             .field("b", Schema::number()),
///     )
///     .execute(|input: Calc, _ctx| async move { Ok(input.a * input.b) })
///     .render(|props| format!("{}", props.data.cloned().unwrap_or_default()))
///     .build()
///     .unwrap();
/// ```
pub struct ToolBuilder<I = Value, O = Value> {
    name: String,
    description: Option<String>,
    tags: Vec<String>,
    validator: Option<Arc<dyn InputValidator>>,
    server: Option<HandlerFn>,
    client: Option<HandlerFn>,
    renderer: Option<RenderFn>,
    middleware: Vec<Arc<dyn Middleware>>,
    confirmation: Confirmation,
    _types: PhantomData<fn(I) -> O>,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            tags: Vec::new(),
            validator: None,
            server: None,
            client: None,
            renderer: None,
            middleware: Vec::new(),
            confirmation: Confirmation::Never,
            _types: PhantomData,
        }
    }
}

impl<I, O> ToolBuilder<I, O> {
    fn retype<I2, O2>(self) -> ToolBuilder<I2, O2> {
        ToolBuilder {
            name: self.name,
            description: self.description,
            tags: self.tags,
            validator: self.validator,
            server: self.server,
            client: self.client,
            renderer: self.renderer,
            middleware: self.middleware,
            confirmation: self.confirmation,
            _types: PhantomData,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
        self
    }

    pub fn tags<S: Into<String>>(self, tags: impl IntoIterator<Item = S>) -> Self {
        tags.into_iter().fold(self, |builder, tag| builder.tag(tag))
    }

    /// Sets or replaces the input schema; handlers added afterwards receive `T`
    pub fn input<T>(mut self, validator: impl InputValidator + 'static) -> ToolBuilder<T, O>
    where
        T: DeserializeOwned,
    {
        self.validator = Some(Arc::new(validator));
        self.retype()
    }

    /// Uses `T` itself as the schema, through serde and schemars
    pub fn input_type<T>(self) -> ToolBuilder<T, O>
    where
        T: JsonSchema + DeserializeOwned + Serialize + 'static,
    {
        self.input::<T>(TypedSchema::<T>::new())
    }

    /// Sets the server handler
    pub fn execute<F, Fut, R>(mut self, f: F) -> ToolBuilder<I, R>
    where
        I: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(I, ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        self.server = Some(erase(&self.name, f));
        self.retype()
    }

    /// Sets the client handler, preferred when the context is not a server one
    pub fn client_execute<F, Fut>(mut self, f: F) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(I, ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O>> + Send + 'static,
    {
        self.client = Some(erase(&self.name, f));
        self
    }

    /// Sets the presentation function
    pub fn render<F>(mut self, f: F) -> Self
    where
        F: Fn(RenderProps<'_>) -> String + Send + Sync + 'static,
    {
        self.renderer = Some(Arc::new(f));
        self
    }

    /// Appends an interceptor; the first one added is the outermost
    pub fn middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn requires_confirmation(mut self, required: bool) -> Self {
        self.confirmation = if required {
            Confirmation::Always
        } else {
            Confirmation::Never
        };
        self
    }

    /// Requires confirmation only for inputs matching `predicate`
    pub fn confirm_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.confirmation = Confirmation::When(Arc::new(predicate));
        self
    }

    pub fn build(self) -> Result<FunctionTool> {
        if self.name.trim().is_empty() {
            return Err(Error::config_error("Tool name is required"));
        }

        Ok(FunctionTool {
            def: Arc::new(ToolDefinition {
                description: self.description.unwrap_or_default(),
                name: self.name,
                tags: self.tags,
                validator: self.validator,
                server: self.server,
                client: self.client,
                renderer: self.renderer,
                middleware: self.middleware,
                confirmation: self.confirmation,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Deserialize)]
    struct CalcInput {
        a: f64,
        b: f64,
    }

    fn calc_tool(calls: Arc<AtomicUsize>) -> FunctionTool {
        FunctionTool::builder("calc")
            .description("Multiplies two numbers")
            .input::<CalcInput>(
                Schema::object()
                    .field("a", Schema::number())
                    .field("b", Schema::number()),
            )
            .execute(move |input: CalcInput, _ctx| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(input.a * input.b)
                }
            })
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_function_tool_creation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let tool = calc_tool(calls.clone());

        assert_eq!(tool.name(), "calc");
        assert_eq!(tool.description(), "Multiplies two numbers");
        assert_eq!(tool.category(), ToolCategory::Server);

        let result = tool.run(json!({"a": 6, "b": 7}), None).await.unwrap();
        assert_eq!(result, json!(42.0));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_validation_blocks_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let tool = calc_tool(calls.clone());

        let err = tool.run(json!({"a": "x", "b": 7}), None).await.unwrap_err();
        assert!(matches!(err, Error::Validation { ref tool, .. } if tool == "calc"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dispatch_precedence() {
        let tool = FunctionTool::builder("where")
            .execute(|_input: Value, _ctx| async move { Ok("server") })
            .client_execute(|_input: Value, _ctx| async move { Ok("client") })
            .build()
            .unwrap();

        assert_eq!(tool.category(), ToolCategory::Hybrid);
        assert_eq!(tool.run(json!({}), None).await.unwrap(), json!("server"));
        assert_eq!(
            tool.run(json!({}), Some(ExecutionContext::server()))
                .await
                .unwrap(),
            json!("server")
        );
        assert_eq!(
            tool.run(json!({}), Some(ExecutionContext::client()))
                .await
                .unwrap(),
            json!("client")
        );
    }

    #[tokio::test]
    async fn test_client_failure_is_not_retried_on_server() {
        let server_calls = Arc::new(AtomicUsize::new(0));
        let counter = server_calls.clone();

        let tool = FunctionTool::builder("flaky")
            .execute(move |_input: Value, _ctx| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Value::Null)
                }
            })
            .client_execute(|_input: Value, _ctx| async move {
                Err(Error::handler("flaky", anyhow::anyhow!("offline")))
            })
            .build()
            .unwrap();

        let err = tool
            .run(json!({}), Some(ExecutionContext::client()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ToolFailed { .. }));
        assert_eq!(server_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_handler_is_configuration_error() {
        let bare = FunctionTool::builder("bare").build().unwrap();
        let err = bare.run(json!({}), None).await.unwrap_err();
        assert!(matches!(err, Error::Configuration(ref msg) if msg.contains("bare")));

        let client_only = FunctionTool::builder("client_only")
            .client_execute(|input: Value, _ctx| async move { Ok(input) })
            .build()
            .unwrap();
        assert_eq!(client_only.category(), ToolCategory::Client);
        assert!(client_only.run(json!(1), None).await.is_err());
        assert_eq!(
            client_only
                .run(json!(1), Some(ExecutionContext::client()))
                .await
                .unwrap(),
            json!(1)
        );
    }

    #[tokio::test]
    async fn test_client_handler_uses_context_cache() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let counter = fetches.clone();

        let tool = FunctionTool::builder("search")
            .input::<Value>(Schema::object().field("query", Schema::string()))
            .execute(|_input: Value, _ctx| async move { Ok(json!([])) })
            .client_execute(move |input: Value, ctx: ExecutionContext| {
                let counter = counter.clone();
                async move {
                    let key = format!("search:{}", input["query"]);
                    if let Some(hit) = ctx.cache().get(&key) {
                        return Ok(hit);
                    }
                    counter.fetch_add(1, Ordering::SeqCst);
                    let results = json!([input["query"]]);
                    ctx.cache().set(key, results.clone());
                    Ok(results)
                }
            })
            .build()
            .unwrap();

        let ctx = ExecutionContext::client();
        let first = tool.run(json!({"query": "rust"}), Some(ctx.clone())).await.unwrap();
        let second = tool.run(json!({"query": "rust"}), Some(ctx)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_render_is_pure_and_repeatable() {
        let tool = FunctionTool::builder("weather")
            .execute(|_input: Value, _ctx| async move { Ok(json!({"temp": 21})) })
            .render(|props| match (props.loading, props.error, props.data) {
                (true, _, _) => "loading".to_string(),
                (_, Some(error), _) => format!("error: {}", error),
                (_, _, Some(data)) => format!("{}°C", data["temp"]),
                _ => String::new(),
            })
            .build()
            .unwrap();

        let data = json!({"temp": 21});
        assert_eq!(tool.render(RenderProps::data(&data)).unwrap(), "21°C");
        assert_eq!(tool.render(RenderProps::data(&data)).unwrap(), "21°C");
        assert_eq!(tool.render(RenderProps::loading()).unwrap(), "loading");
        assert_eq!(
            tool.render(RenderProps::failed("offline")).unwrap(),
            "error: offline"
        );

        let plain = FunctionTool::builder("plain").build().unwrap();
        assert!(plain.render(RenderProps::data(&data)).is_none());
    }

    #[test]
    fn test_builder_metadata() {
        let tool = FunctionTool::builder("tagged")
            .tags(["search", "web"])
            .tag("search")
            .requires_confirmation(true)
            .build()
            .unwrap();

        assert_eq!(tool.tags(), ["search".to_string(), "web".to_string()]);
        assert!(tool.requires_confirmation());
        assert!(tool.input_schema().is_none());

        assert!(FunctionTool::builder("  ").build().is_err());
    }
}
