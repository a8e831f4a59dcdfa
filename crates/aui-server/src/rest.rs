use crate::types::*;
use aui_core::{Error, ExecutionContext, ServerConfig, Tool};
use aui_tool::ToolRegistry;
use axum::{
    Router,
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ToolRegistry>,
}

pub fn create_router(registry: Arc<ToolRegistry>, config: &ServerConfig) -> Router {
    let state = AppState { registry };

    let base = config.base_path.trim_end_matches('/');
    let manifest_path = if base.is_empty() { "/" } else { base };

    Router::new()
        // Health check endpoint
        .route("/health", get(health_check))
        // Tool endpoints
        .route(manifest_path, get(list_tools))
        .route(&format!("{}/execute", base), post(execute_tool))
        .route(&format!("{}/confirm", base), post(confirm_tool))
        // Middleware layers (applied in reverse order)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds `config.bind_address()` and serves until the process exits
pub async fn serve(registry: Arc<ToolRegistry>, config: &ServerConfig) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_address()).await?;
    serve_on(listener, registry, config).await
}

/// Serves on an already bound listener
pub async fn serve_on(
    listener: TcpListener,
    registry: Arc<ToolRegistry>,
    config: &ServerConfig,
) -> anyhow::Result<()> {
    tracing::info!(
        address = %listener.local_addr()?,
        base_path = %config.base_path,
        tools = registry.len(),
        "AUI server listening"
    );
    axum::serve(listener, create_router(registry, config)).await?;
    Ok(())
}

/// Health check endpoint - returns OK if the service is running
async fn health_check() -> impl IntoResponse {
    tracing::debug!("Health check requested");
    (StatusCode::OK, "OK")
}

async fn list_tools(State(state): State<AppState>) -> Json<ManifestResponse> {
    let tools = state
        .registry
        .names()
        .iter()
        .filter_map(|name| state.registry.get(name))
        .map(|tool| ToolDescriptor {
            manifest: tool.manifest(),
            category: tool.category(),
            tags: tool.tags().to_vec(),
            requires_confirmation: tool.requires_confirmation(),
        })
        .collect();

    Json(ManifestResponse { tools })
}

fn lookup(state: &AppState, name: &str) -> Result<Arc<dyn Tool>, AppError> {
    state
        .registry
        .get(name)
        .ok_or_else(|| AppError(Error::NotFound(name.to_string())))
}

/// Requests always run on the server side; the caller only contributes
/// identity.
fn server_context(snapshot: Option<aui_core::ContextSnapshot>) -> ExecutionContext {
    ExecutionContext::from_snapshot(snapshot.unwrap_or_default(), true)
}

async fn execute_tool(
    State(state): State<AppState>,
    Json(req): Json<ExecuteRequest>,
) -> Result<Json<ExecuteResponse>, AppError> {
    let tool = lookup(&state, &req.tool)?;
    if tool.should_confirm(&req.input) {
        tracing::info!(tool = %req.tool, "Tool call needs confirmation");
        return Err(AppError(Error::ConfirmationRequired(req.tool)));
    }

    let data = state
        .registry
        .execute(&req.tool, req.input, Some(server_context(req.context)))
        .await?;

    Ok(Json(ExecuteResponse { data }))
}

async fn confirm_tool(
    State(state): State<AppState>,
    Json(req): Json<ConfirmRequest>,
) -> Result<Json<ConfirmResponse>, AppError> {
    lookup(&state, &req.tool)?;

    if !req.approved {
        tracing::info!(tool = %req.tool, "Tool call rejected by user");
        return Ok(Json(ConfirmResponse {
            approved: false,
            data: serde_json::Value::Null,
        }));
    }

    tracing::info!(tool = %req.tool, "Tool call approved by user");
    let data = state
        .registry
        .execute(&req.tool, req.input, Some(server_context(req.context)))
        .await?;

    Ok(Json(ConfirmResponse {
        approved: true,
        data,
    }))
}

// Error handling
pub struct AppError(pub Error);

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError(err)
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::Validation { .. } | Error::Serialization(_) => StatusCode::BAD_REQUEST,
            Error::Permission { .. } => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::ConfirmationRequired(_) => StatusCode::CONFLICT,
            Error::RateLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Tool request failed");
        }

        let body = ErrorResponse {
            error: self.0.to_string(),
            code: self.0.kind().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aui_tool::{ControlOptions, ControlledTool, FunctionTool, Schema};
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn registry() -> Arc<ToolRegistry> {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(Arc::new(
            FunctionTool::builder("calc")
                .description("Multiplies two numbers")
                .input::<Value>(
                    Schema::object()
                        .field("a", Schema::number())
                        .field("b", Schema::number()),
                )
                .execute(|input: Value, _ctx| async move {
                    Ok(input["a"].as_f64().unwrap_or(0.0) * input["b"].as_f64().unwrap_or(0.0))
                })
                .build()
                .unwrap(),
        ));
        registry.register(Arc::new(
            FunctionTool::builder("wipe")
                .requires_confirmation(true)
                .execute(|_input: Value, _ctx| async move { Ok(json!({"wiped": true})) })
                .build()
                .unwrap(),
        ));
        registry.register(Arc::new(ControlledTool::wrap(
            FunctionTool::builder("limited")
                .execute(|_input: Value, _ctx| async move { Ok(json!("ok")) })
                .build()
                .unwrap(),
            ControlOptions::new().requests_per_minute(1),
        )));
        registry
    }

    fn router() -> Router {
        create_router(registry(), &ServerConfig::default())
    }

    async fn post_json(router: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_execute_returns_data() {
        let (status, body) = post_json(
            router(),
            "/api/tools/execute",
            json!({"tool": "calc", "input": {"a": 6, "b": 7}}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"data": 42.0}));
    }

    #[tokio::test]
    async fn test_error_codes() {
        let (status, body) = post_json(
            router(),
            "/api/tools/execute",
            json!({"tool": "calc", "input": {"a": "x", "b": 7}}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "validation_error");

        let (status, body) = post_json(router(), "/api/tools/execute", json!({"tool": "nope"})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "not_found");
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_429() {
        let router = router();
        let request = json!({"tool": "limited", "input": {}});

        let (status, _) = post_json(router.clone(), "/api/tools/execute", request.clone()).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = post_json(router, "/api/tools/execute", request).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["code"], "rate_limited");
    }

    #[tokio::test]
    async fn test_confirmation_flow() {
        let router = router();

        let (status, body) =
            post_json(router.clone(), "/api/tools/execute", json!({"tool": "wipe"})).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "confirmation_required");

        let (status, body) = post_json(
            router.clone(),
            "/api/tools/confirm",
            json!({"tool": "wipe", "approved": false}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"approved": false, "data": null}));

        let (status, body) = post_json(
            router,
            "/api/tools/confirm",
            json!({"tool": "wipe", "approved": true}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!({"wiped": true}));
    }

    #[tokio::test]
    async fn test_manifest_lists_tools() {
        let response = router()
            .oneshot(Request::builder().uri("/api/tools").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        let tools = body["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 3);
        assert_eq!(tools[0]["name"], "calc");
        assert_eq!(tools[0]["parameters"]["required"], json!(["a", "b"]));
        assert_eq!(tools[2]["name"], "wipe");
        assert_eq!(tools[2]["requiresConfirmation"], true);
    }
}
