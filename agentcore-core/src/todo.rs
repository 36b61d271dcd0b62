//! # Todo Plan Store
//!
//! An in-memory, ordered list of task items the agent maintains across a
//! task run, exposed to the LLM as the `todo_manager` tool. Priorities are
//! stable: editing a priority moves an item into its new priority band
//! while preserving insertion order within that band.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Relative priority band for a todo item. Ordered `High < Medium < Low` for
/// the purposes of `get_next`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TodoPriority {
    High,
    Medium,
    Low,
}

impl TodoPriority {
    fn rank(self) -> u8 {
        match self {
            TodoPriority::High => 0,
            TodoPriority::Medium => 1,
            TodoPriority::Low => 2,
        }
    }
}

/// Lifecycle status of a todo item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

/// A single item in the plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub priority: TodoPriority,
    pub status: TodoStatus,
    /// Rough estimate of effort on a 1-10 scale.
    pub estimated_effort: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Monotonic insertion index, preserved across priority edits so that
    /// `get_next` stays stable within a priority band.
    insertion_index: u64,
}

/// Errors raised by the store's operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TodoError {
    #[error("todo item not found: {id}")]
    NotFound { id: Uuid },
    #[error("estimated_effort must be between 1 and 10, got {value}")]
    InvalidEffort { value: u8 },
}

/// In-memory, synchronous plan store. One instance is owned by the Main
/// Agent Loop for the lifetime of a task run.
#[derive(Debug, Default)]
pub struct TodoStore {
    items: Vec<TodoItem>,
    next_insertion_index: u64,
}

impl TodoStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard all items and start a fresh plan.
    pub fn create_plan(&mut self) {
        self.items.clear();
        self.next_insertion_index = 0;
    }

    pub fn add_todo(
        &mut self,
        title: impl Into<String>,
        description: impl Into<String>,
        priority: TodoPriority,
        estimated_effort: u8,
    ) -> Result<Uuid, TodoError> {
        if !(1..=10).contains(&estimated_effort) {
            return Err(TodoError::InvalidEffort {
                value: estimated_effort,
            });
        }
        let now = Utc::now();
        let id = Uuid::new_v4();
        let insertion_index = self.next_insertion_index;
        self.next_insertion_index += 1;
        self.items.push(TodoItem {
            id,
            title: title.into(),
            description: description.into(),
            priority,
            status: TodoStatus::Pending,
            estimated_effort,
            created_at: now,
            updated_at: now,
            insertion_index,
        });
        Ok(id)
    }

    pub fn update_status(&mut self, id: Uuid, status: TodoStatus) -> Result<(), TodoError> {
        let item = self
            .items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or(TodoError::NotFound { id })?;
        item.status = status;
        item.updated_at = Utc::now();
        Ok(())
    }

    /// Change an item's priority. Insertion order is preserved within the
    /// new priority band — the item simply re-sorts alongside its new peers.
    pub fn update_priority(&mut self, id: Uuid, priority: TodoPriority) -> Result<(), TodoError> {
        let item = self
            .items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or(TodoError::NotFound { id })?;
        item.priority = priority;
        item.updated_at = Utc::now();
        Ok(())
    }

    /// The first pending item, ordered by priority rank then insertion order.
    pub fn get_next(&self) -> Option<&TodoItem> {
        self.items
            .iter()
            .filter(|i| i.status == TodoStatus::Pending)
            .min_by_key(|i| (i.priority.rank(), i.insertion_index))
    }

    /// All items, ordered by priority rank then insertion order.
    pub fn list(&self) -> Vec<&TodoItem> {
        let mut items: Vec<&TodoItem> = self.items.iter().collect();
        items.sort_by_key(|i| (i.priority.rank(), i.insertion_index));
        items
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.next_insertion_index = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}
