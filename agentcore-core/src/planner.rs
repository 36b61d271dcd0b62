//! # Planner
//!
//! A single, one-shot LLM call made before the Main Agent Loop starts
//! iterating. It looks at the user's request and either declares that no
//! up-front plan is needed, or emits a short todo list that gets seeded into
//! the [`TodoStore`](crate::todo::TodoStore).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::brain::LlmClient;
use crate::error::LlmError;
use crate::todo::{TodoPriority, TodoStore};
use crate::types::Message;

const PLANNER_SYSTEM_PROMPT: &str = r#"You are the planning step of an autonomous coding agent.

Given the user's request, decide whether it benefits from an explicit,
multi-step plan. Trivial requests (a single file read, a one-line answer,
a simple question) do not need planning — set needs_planning to false and
leave todos empty. Requests that touch multiple files, require sequencing,
or have several independent parts should get a short todo list, each with a
clear title, one-sentence description, a priority, and an effort estimate
from 1 (trivial) to 10 (substantial).

Respond with a single JSON object matching the provided schema. Do not
include any text outside the JSON object."#;

/// A todo as proposed by the planner, before it has been assigned an id and
/// inserted into the store.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PlannedTodo {
    pub title: String,
    pub description: String,
    pub priority: TodoPriority,
    /// 1 (trivial) to 10 (substantial).
    pub estimated_effort: u8,
}

/// Output of a planning pass.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PlanningResponse {
    /// Short analysis of what the request actually requires.
    pub analysis: String,
    /// The high-level approach the agent intends to take.
    pub approach: String,
    pub todos: Vec<PlannedTodo>,
    pub needs_planning: bool,
}

/// Runs the one-shot planning call and seeds a [`TodoStore`] from its
/// result.
pub struct Planner;

impl Planner {
    /// Ask the LLM whether `user_request` needs a plan, and if so, what it
    /// looks like.
    pub async fn plan(
        client: &mut LlmClient,
        user_request: &str,
    ) -> Result<PlanningResponse, LlmError> {
        let schema = schemars::schema_for!(PlanningResponse);
        let messages = vec![
            Message::system(PLANNER_SYSTEM_PROMPT),
            Message::user(user_request),
        ];
        client.generate_object(&messages, &schema, None).await
    }

    /// Seed `store` from a planning response. A no-op when
    /// `needs_planning` is false, per spec: the loop proceeds without
    /// pre-seeded todos in that case.
    pub fn seed_store(response: &PlanningResponse, store: &mut TodoStore) {
        if !response.needs_planning {
            return;
        }
        store.create_plan();
        for todo in &response.todos {
            let effort = todo.estimated_effort.clamp(1, 10);
            let _ = store.add_todo(&todo.title, &todo.description, todo.priority, effort);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use std::sync::Arc;

    fn planning_json(needs_planning: bool, todos: &str) -> String {
        format!(
            r#"{{"analysis":"a simple request","approach":"do it directly","todos":[{todos}],"needs_planning":{needs_planning}}}"#
        )
    }

    #[tokio::test]
    async fn test_plan_trivial_request_needs_no_planning() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_response(MockLlmProvider::text_response(&planning_json(false, "")));
        let mut client = LlmClient::new(provider, "system prompt");

        let response = Planner::plan(&mut client, "what does this function do?")
            .await
            .unwrap();
        assert!(!response.needs_planning);
        assert!(response.todos.is_empty());
    }

    #[tokio::test]
    async fn test_plan_complex_request_emits_todos() {
        let provider = Arc::new(MockLlmProvider::new());
        let todos = r#"{"title":"add auth","description":"implement login","priority":"high","estimated_effort":6}"#;
        provider.queue_response(MockLlmProvider::text_response(&planning_json(true, todos)));
        let mut client = LlmClient::new(provider, "system prompt");

        let response = Planner::plan(&mut client, "add authentication to the app")
            .await
            .unwrap();
        assert!(response.needs_planning);
        assert_eq!(response.todos.len(), 1);
        assert_eq!(response.todos[0].title, "add auth");
    }

    #[test]
    fn test_seed_store_noop_when_not_needed() {
        let response = PlanningResponse {
            analysis: "x".into(),
            approach: "y".into(),
            todos: vec![PlannedTodo {
                title: "ignored".into(),
                description: "".into(),
                priority: TodoPriority::Low,
                estimated_effort: 1,
            }],
            needs_planning: false,
        };
        let mut store = TodoStore::new();
        Planner::seed_store(&response, &mut store);
        assert!(store.is_empty());
    }

    #[test]
    fn test_seed_store_inserts_todos() {
        let response = PlanningResponse {
            analysis: "x".into(),
            approach: "y".into(),
            todos: vec![
                PlannedTodo {
                    title: "first".into(),
                    description: "do first thing".into(),
                    priority: TodoPriority::High,
                    estimated_effort: 3,
                },
                PlannedTodo {
                    title: "second".into(),
                    description: "do second thing".into(),
                    priority: TodoPriority::Medium,
                    estimated_effort: 2,
                },
            ],
            needs_planning: true,
        };
        let mut store = TodoStore::new();
        Planner::seed_store(&response, &mut store);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get_next().unwrap().title, "first");
    }

    #[test]
    fn test_seed_store_clamps_out_of_range_effort() {
        let response = PlanningResponse {
            analysis: "x".into(),
            approach: "y".into(),
            todos: vec![PlannedTodo {
                title: "oops".into(),
                description: "".into(),
                priority: TodoPriority::Low,
                estimated_effort: 0,
            }],
            needs_planning: true,
        };
        let mut store = TodoStore::new();
        Planner::seed_store(&response, &mut store);
        assert_eq!(store.list()[0].estimated_effort, 1);
    }
}
