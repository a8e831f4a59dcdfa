//! Behaviour of tools, the control wrapper and the registry working together

use aui_core::{Error, ExecutionContext, Tool};
use aui_tool::builtin::{CounterStore, create_calculator_tool, create_counter_tool};
use aui_tool::{ControlOptions, ControlledTool, ExecutionOutcome, FunctionTool, Schema, ToolRegistry};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Deserialize)]
struct Pair {
    a: f64,
    b: f64,
}

fn calc(calls: Arc<AtomicUsize>) -> FunctionTool {
    FunctionTool::builder("calc")
        .description("Multiplies two numbers")
        .input::<Pair>(
            Schema::object()
                .field("a", Schema::number())
                .field("b", Schema::number()),
        )
        .execute(move |input: Pair, _ctx| {
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
async fn test_calc_scenario() {
    let calls = Arc::new(AtomicUsize::new(0));
    let tool = calc(calls.clone());

    assert_eq!(tool.run(json!({"a": 6, "b": 7}), None).await.unwrap(), json!(42.0));

    let err = tool.run(json!({"a": "x", "b": 7}), None).await.unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
    assert!(err.to_string().contains("a: expected number"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_dispatch_precedence_through_registry() {
    let registry = ToolRegistry::new();
    registry.register(Arc::new(
        FunctionTool::builder("env")
            .execute(|_input: Value, _ctx| async move { Ok("server") })
            .client_execute(|_input: Value, _ctx| async move { Ok("client") })
            .build()
            .unwrap(),
    ));

    assert_eq!(registry.execute("env", json!({}), None).await.unwrap(), json!("server"));
    assert_eq!(
        registry
            .execute("env", json!({}), Some(ExecutionContext::client()))
            .await
            .unwrap(),
        json!("client")
    );
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_boundary_with_audit() {
    let calls = Arc::new(AtomicUsize::new(0));
    let tool = ControlledTool::wrap(
        calc(calls.clone()),
        ControlOptions::new().audit(true).requests_per_minute(5),
    );

    for _ in 0..5 {
        tool.run(json!({"a": 1, "b": 1}), None).await.unwrap();
    }
    let err = tool.run(json!({"a": 1, "b": 1}), None).await.unwrap_err();
    assert!(matches!(err, Error::RateLimit { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 5);

    tokio::time::advance(Duration::from_secs(60)).await;
    tool.run(json!({"a": 1, "b": 1}), None).await.unwrap();

    let log = tool.execution_log();
    assert_eq!(log.len(), 7);
    assert_eq!(log.iter().filter(|entry| !entry.is_success()).count(), 1);
}

#[tokio::test]
async fn test_audit_tags_each_entry_once() {
    let tool = ControlledTool::wrap(
        calc(Arc::new(AtomicUsize::new(0))),
        ControlOptions::new().audit(true),
    );

    tool.run(json!({"a": 2, "b": 3}), None).await.unwrap();
    tool.run(json!({"a": null}), None).await.unwrap_err();

    for entry in tool.execution_log() {
        let wire = serde_json::to_value(&entry).unwrap();
        let has_output = wire.get("output").is_some();
        let has_error = wire.get("error").is_some();
        assert!(has_output != has_error);
    }
    assert!(matches!(
        tool.execution_log()[0].outcome,
        ExecutionOutcome::Output(ref v) if *v == json!(6.0)
    ));
}

#[tokio::test]
async fn test_controlled_tool_in_registry() {
    let registry = ToolRegistry::new();
    let controlled = Arc::new(ControlledTool::wrap(
        calc(Arc::new(AtomicUsize::new(0))),
        ControlOptions::new().audit(true).deny_client_execution(),
    ));
    registry.register(controlled.clone());

    registry
        .execute("calc", json!({"a": 2, "b": 2}), None)
        .await
        .unwrap();
    let err = registry
        .execute("calc", json!({"a": 2, "b": 2}), Some(ExecutionContext::client()))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Permission { .. }));
    assert_eq!(controlled.execution_log().len(), 2);
}

#[tokio::test]
async fn test_registry_round_trip() {
    let registry = ToolRegistry::new();
    let tool: Arc<dyn Tool> = Arc::new(create_calculator_tool().unwrap());

    registry.register(tool.clone());
    assert!(Arc::ptr_eq(&registry.get("calculator").unwrap(), &tool));

    registry.unregister("calculator");
    assert!(registry.get("calculator").is_none());
}

#[tokio::test]
async fn test_counter_scenario() {
    let registry = ToolRegistry::new();
    registry.register(Arc::new(
        create_counter_tool(Arc::new(CounterStore::new())).unwrap(),
    ));

    let first = registry
        .execute("counter", json!({"action": "increment", "name": "t", "amount": 1}), None)
        .await
        .unwrap();
    assert_eq!(first["previousValue"], 0);
    assert_eq!(first["value"], 1);

    let read = registry
        .execute("counter", json!({"action": "get", "name": "t"}), None)
        .await
        .unwrap();
    assert_eq!(read["value"], 1);
    assert_eq!(read["previousValue"], 1);
}

#[tokio::test]
async fn test_search_and_manifest_cover_builtins() {
    let registry = ToolRegistry::new();
    registry.register(Arc::new(create_calculator_tool().unwrap()));
    registry.register(Arc::new(
        create_counter_tool(Arc::new(CounterStore::new())).unwrap(),
    ));

    let hits = registry.search("math");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].tool.name(), "calculator");

    let manifest = registry.export_schema();
    let names: Vec<&str> = manifest.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["calculator", "counter"]);
    assert_eq!(manifest[0].parameters["required"], json!(["expression"]));
}
