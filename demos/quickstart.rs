//! Quickstart: serve the built-in tools and call them through a client executor
//!
//! Run with `cargo run --example quickstart`. Settings come from `aui.toml`
//! when one is found (see `aui.toml.example`), otherwise defaults are used.

use aui_client::ClientExecutor;
use aui_core::{AuiConfig, ExecutionContext, RenderProps, Tool};
use aui_tool::builtin::{
    CounterStore, TaskListStore, create_calculator_tool, create_counter_tool,
    create_task_list_tool,
};
use aui_tool::{ControlOptions, ControlledTool, ToolRegistry, middleware_fn};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut config = AuiConfig::load().unwrap_or_default();
    aui_telemetry::init_telemetry(&config.observability)?;

    println!("=== AUI Quickstart ===\n");

    // 1. Build a registry with the built-in tools
    let registry = Arc::new(ToolRegistry::new());
    registry.register(Arc::new(create_calculator_tool()?));
    registry.register(Arc::new(ControlledTool::wrap(
        create_counter_tool(Arc::new(CounterStore::new()))?,
        ControlOptions::new().audit(true).requests_per_minute(30),
    )));
    registry.register(Arc::new(create_task_list_tool(Arc::new(
        TaskListStore::new(),
    ))?));

    for manifest in registry.export_schema() {
        println!("  {} - {}", manifest.name, manifest.description);
    }

    // 2. Run a tool in-process
    let calculator = registry
        .get("calculator")
        .ok_or_else(|| anyhow::anyhow!("calculator is registered"))?;
    let result = calculator
        .run(json!({"expression": "(2 + 3) * 4"}), Some(ExecutionContext::server()))
        .await?;
    if let Some(view) = calculator.render(RenderProps::data(&result)) {
        println!("\nIn-process: {}", view);
    }

    // 3. Serve the registry on an ephemeral port
    config.server.port = 0;
    let listener = TcpListener::bind(config.server.bind_address()).await?;
    let address = listener.local_addr()?;
    let server_config = config.server.clone();
    let served = registry.clone();
    tokio::spawn(async move {
        if let Err(e) = aui_server::serve_on(listener, served, &server_config).await {
            tracing::error!(error = %e, "Server stopped");
        }
    });

    // 4. Call it over HTTP with caching and retry
    config.client.base_url = format!("http://{}{}/execute", address, config.server.base_path);
    config.client.cache.enabled = true;
    let executor = ClientExecutor::from_config(&config.client)?;

    let ctx = ExecutionContext::client().with_user(json!({"id": "demo"}));
    for _ in 0..2 {
        let out = executor
            .execute("counter", json!({"action": "increment", "name": "visits"}), Some(&ctx))
            .await?;
        println!("Remote counter: {}", out);
    }
    println!("Cache: {:?}", executor.cache_stats().await?);

    match executor
        .execute("task_list", json!({"action": "clear"}), None)
        .await
    {
        Ok(out) => println!("Cleared: {}", out),
        Err(e) => println!("Needs approval first: {}", e),
    }

    // 5. Middleware on an ad-hoc tool
    let shout = aui_tool::FunctionTool::builder("shout")
        .middleware(middleware_fn(|input, ctx, next| async move {
            tracing::info!(invocation_id = %ctx.invocation_id(), "shout called");
            next.run(input, ctx).await
        }))
        .execute(|input: serde_json::Value, _ctx| async move {
            Ok(input["text"].as_str().unwrap_or_default().to_uppercase())
        })
        .build()?;
    println!("\nMiddleware: {}", shout.run(json!({"text": "hello"}), None).await?);

    Ok(())
}
