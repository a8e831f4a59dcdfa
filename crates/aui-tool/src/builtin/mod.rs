//! Built-in tools. Stateful ones keep their state in an explicitly
//! constructed store passed in by the caller.

pub mod calculator;
pub mod counter;
pub mod task_list;

pub use calculator::create_calculator_tool;
pub use counter::{CounterStore, create_counter_tool};
pub use task_list::{Task, TaskListStore, create_task_list_tool};
