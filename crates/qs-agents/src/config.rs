//! Configuration types for agents.

use serde::{Deserialize, Serialize};

/// Loop budgets and prompt options shared by the planner and its searchers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Maximum planning rounds per question.
    pub planner_max_turns: usize,
    /// Maximum rounds per sub-query.
    pub searcher_max_turns: usize,
    /// Append worked examples to the instruction prompts.
    pub few_shot: bool,
    /// Concurrent requests inside one tool call.
    pub tool_concurrency: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            planner_max_turns: 4,
            searcher_max_turns: 3,
            few_shot: true,
            tool_concurrency: 8,
        }
    }
}
