use crate::{FunctionTool, Schema};
use aui_core::{Error, ExecutionContext, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: u64,
    pub title: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

/// Ordered list of tasks behind the `task_list` tool
#[derive(Debug, Default)]
pub struct TaskListStore {
    tasks: Mutex<Vec<Task>>,
    next_id: AtomicU64,
}

impl TaskListStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Task>> {
        match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn add(&self, title: impl Into<String>) -> Task {
        let task = Task {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            title: title.into(),
            completed: false,
            created_at: Utc::now(),
        };
        self.lock().push(task.clone());
        task
    }

    pub fn complete(&self, id: u64) -> Option<Task> {
        let mut tasks = self.lock();
        let task = tasks.iter_mut().find(|t| t.id == id)?;
        task.completed = true;
        Some(task.clone())
    }

    pub fn remove(&self, id: u64) -> Option<Task> {
        let mut tasks = self.lock();
        let index = tasks.iter().position(|t| t.id == id)?;
        Some(tasks.remove(index))
    }

    pub fn list(&self) -> Vec<Task> {
        self.lock().clone()
    }

    /// Drops every task and returns how many there were
    pub fn clear(&self) -> usize {
        let mut tasks = self.lock();
        let removed = tasks.len();
        tasks.clear();
        removed
    }
}

fn task_id(input: &Value) -> Result<u64> {
    input["id"]
        .as_u64()
        .ok_or_else(|| Error::validation("task_list", "id: required for this action"))
}

fn missing_task(id: u64) -> Error {
    Error::handler("task_list", anyhow::anyhow!("task {} not found", id))
}

/// Creates the `task_list` tool over `store`. Clearing the list asks for
/// confirmation.
pub fn create_task_list_tool(store: Arc<TaskListStore>) -> Result<FunctionTool> {
    let schema = Schema::object()
        .field(
            "action",
            Schema::enumeration(["add", "complete", "remove", "list", "clear"]),
        )
        .field(
            "title",
            Schema::string().min_length(1).max_length(200).optional(),
        )
        .field("id", Schema::integer().min(1.0).optional());

    FunctionTool::builder("task_list")
        .description("Adds, completes, removes, lists or clears tasks")
        .tags(["state", "productivity"])
        .input::<Value>(schema)
        .execute(move |input: Value, ctx: ExecutionContext| {
            let store = store.clone();
            async move {
                let action = input["action"].as_str().unwrap_or_default();
                tracing::debug!(invocation_id = %ctx.invocation_id(), action, "Task list action");

                match action {
                    "add" => {
                        let title = input["title"].as_str().ok_or_else(|| {
                            Error::validation("task_list", "title: required for this action")
                        })?;
                        Ok(json!({ "task": store.add(title) }))
                    }
                    "complete" => {
                        let id = task_id(&input)?;
                        let task = store
                            .complete(id)
                            .ok_or_else(|| missing_task(id))?;
                        Ok(json!({ "task": task }))
                    }
                    "remove" => {
                        let id = task_id(&input)?;
                        let task = store
                            .remove(id)
                            .ok_or_else(|| missing_task(id))?;
                        Ok(json!({ "removed": task }))
                    }
                    "clear" => Ok(json!({ "cleared": store.clear() })),
                    _ => Ok(json!({ "tasks": store.list() })),
                }
            }
        })
        .confirm_when(|input| input["action"] == "clear")
        .render(|props| {
            let Some(data) = props.data else {
                return String::new();
            };
            match data["tasks"].as_array() {
                Some(tasks) => tasks
                    .iter()
                    .map(|task| {
                        let mark = if task["completed"] == true { "x" } else { " " };
                        format!("[{}] {}", mark, task["title"].as_str().unwrap_or_default())
                    })
                    .collect::<Vec<_>>()
                    .join("\n"),
                None => data.to_string(),
            }
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use aui_core::{RenderProps, Tool};

    #[tokio::test]
    async fn test_task_lifecycle() {
        let store = Arc::new(TaskListStore::new());
        let tool = create_task_list_tool(store.clone()).unwrap();

        let added = tool
            .run(json!({"action": "add", "title": "write docs"}), None)
            .await
            .unwrap();
        let id = added["task"]["id"].as_u64().unwrap();
        tool.run(json!({"action": "add", "title": "ship"}), None)
            .await
            .unwrap();

        let done = tool
            .run(json!({"action": "complete", "id": id}), None)
            .await
            .unwrap();
        assert_eq!(done["task"]["completed"], true);

        let listed = tool.run(json!({"action": "list"}), None).await.unwrap();
        assert_eq!(listed["tasks"].as_array().unwrap().len(), 2);
        assert_eq!(
            tool.render(RenderProps::data(&listed)).unwrap(),
            "[x] write docs\n[ ] ship"
        );

        tool.run(json!({"action": "remove", "id": id}), None)
            .await
            .unwrap();
        assert_eq!(store.list().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_task() {
        let tool = create_task_list_tool(Arc::new(TaskListStore::new())).unwrap();

        let err = tool
            .run(json!({"action": "complete", "id": 42}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ToolFailed { .. }));
        assert!(err.to_string().contains("task 42 not found"));

        let err = tool
            .run(json!({"action": "add"}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn test_clear_needs_confirmation() {
        let tool = create_task_list_tool(Arc::new(TaskListStore::new())).unwrap();

        assert!(tool.requires_confirmation());
        assert!(tool.should_confirm(&json!({"action": "clear"})));
        assert!(!tool.should_confirm(&json!({"action": "add", "title": "x"})));
    }
}
