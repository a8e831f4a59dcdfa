use crate::FunctionTool;
use aui_core::{Error, ExecutionContext, Result};
use dashmap::DashMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Named in-memory counters shared by every counter tool built over them
#[derive(Debug, Default)]
pub struct CounterStore {
    values: DashMap<String, i64>,
}

impl CounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> i64 {
        self.values.get(name).map(|v| *v).unwrap_or(0)
    }

    /// Applies `f` to the named counter and returns `(previous, current)`.
    /// The counter is left unchanged when `f` returns `None`.
    fn update(&self, name: &str, f: impl FnOnce(i64) -> Option<i64>) -> Result<(i64, i64)> {
        let mut value = self.values.entry(name.to_string()).or_insert(0);
        let previous = *value;
        let next = f(previous).ok_or_else(|| {
            Error::validation("counter", format!("amount overflows counter '{}'", name))
        })?;
        *value = next;
        Ok((previous, next))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CounterAction {
    Increment,
    Decrement,
    Reset,
    Get,
}

fn default_name() -> String {
    "default".to_string()
}

fn default_amount() -> i64 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CounterInput {
    pub action: CounterAction,
    /// Counter to act on
    #[serde(default = "default_name")]
    pub name: String,
    /// Step for increment and decrement
    #[serde(default = "default_amount")]
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterOutput {
    pub name: String,
    pub value: i64,
    pub previous_value: i64,
    pub action: CounterAction,
}

/// Creates the `counter` tool over `store`
pub fn create_counter_tool(store: Arc<CounterStore>) -> Result<FunctionTool> {
    FunctionTool::builder("counter")
        .description("Increments, decrements, resets or reads a named counter")
        .tags(["state", "demo"])
        .input_type::<CounterInput>()
        .execute(move |input: CounterInput, ctx: ExecutionContext| {
            let store = store.clone();
            async move {
                let (previous, value) = match input.action {
                    CounterAction::Increment => {
                        store.update(&input.name, |v| v.checked_add(input.amount))?
                    }
                    CounterAction::Decrement => {
                        store.update(&input.name, |v| v.checked_sub(input.amount))?
                    }
                    CounterAction::Reset => store.update(&input.name, |_| Some(0))?,
                    CounterAction::Get => {
                        let current = store.get(&input.name);
                        (current, current)
                    }
                };

                tracing::debug!(
                    invocation_id = %ctx.invocation_id(),
                    counter = %input.name,
                    previous,
                    value,
                    "Counter updated"
                );

                Ok(CounterOutput {
                    name: input.name,
                    value,
                    previous_value: previous,
                    action: input.action,
                })
            }
        })
        .render(|props| match props.data {
            Some(data) => format!("{}: {}", data["name"].as_str().unwrap_or_default(), data["value"]),
            None => String::new(),
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use aui_core::{Error, Tool};
    use serde_json::json;

    #[tokio::test]
    async fn test_counter_sequence() {
        let store = Arc::new(CounterStore::new());
        let tool = create_counter_tool(store.clone()).unwrap();

        let out = tool
            .run(json!({"action": "increment", "name": "t", "amount": 1}), None)
            .await
            .unwrap();
        assert_eq!(out, json!({"name": "t", "value": 1, "previousValue": 0, "action": "increment"}));

        let out = tool
            .run(json!({"action": "get", "name": "t"}), None)
            .await
            .unwrap();
        assert_eq!(out["value"], 1);
        assert_eq!(out["previousValue"], 1);

        let out = tool
            .run(json!({"action": "decrement", "name": "t", "amount": 3}), None)
            .await
            .unwrap();
        assert_eq!(out["value"], -2);
        assert_eq!(out["previousValue"], 1);

        let out = tool
            .run(json!({"action": "reset", "name": "t"}), None)
            .await
            .unwrap();
        assert_eq!(out["value"], 0);
        assert_eq!(store.get("t"), 0);
    }

    #[tokio::test]
    async fn test_overflow_is_rejected_and_keeps_value() {
        let store = Arc::new(CounterStore::new());
        let tool = create_counter_tool(store.clone()).unwrap();

        let out = tool
            .run(json!({"action": "increment", "name": "t", "amount": i64::MAX}), None)
            .await
            .unwrap();
        assert_eq!(out["value"], i64::MAX);

        let err = tool
            .run(json!({"action": "increment", "name": "t", "amount": 1}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert_eq!(store.get("t"), i64::MAX);

        tool.run(json!({"action": "reset", "name": "t"}), None).await.unwrap();
        let err = tool
            .run(json!({"action": "decrement", "name": "t", "amount": i64::MIN}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert_eq!(store.get("t"), 0);
    }

    #[tokio::test]
    async fn test_counter_defaults() {
        let store = Arc::new(CounterStore::new());
        let tool = create_counter_tool(store.clone()).unwrap();

        tool.run(json!({"action": "increment"}), None).await.unwrap();
        assert_eq!(store.get("default"), 1);
    }

    #[tokio::test]
    async fn test_stores_are_independent() {
        let first = create_counter_tool(Arc::new(CounterStore::new())).unwrap();
        let second = create_counter_tool(Arc::new(CounterStore::new())).unwrap();

        first.run(json!({"action": "increment"}), None).await.unwrap();
        let out = second.run(json!({"action": "get"}), None).await.unwrap();
        assert_eq!(out["value"], 0);
    }

    #[tokio::test]
    async fn test_unknown_action_is_rejected() {
        let tool = create_counter_tool(Arc::new(CounterStore::new())).unwrap();
        let err = tool.run(json!({"action": "multiply"}), None).await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(tool.input_schema().unwrap()["properties"].get("action").is_some());
    }
}
