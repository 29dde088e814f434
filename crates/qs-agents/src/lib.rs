//! Agents for quick-search.
//!
//! This crate provides:
//! - `PlanningAgent`: decomposes a question into sub-queries over several
//!   rounds and summarizes the findings
//! - `SearchDistributor`: answers one round's sub-queries concurrently
//! - `SearcherAgent`: researches one sub-query with `web_search` and
//!   `web_select`
//! - Prompt builders for every model call site

mod config;
mod distributor;
mod planner;
pub mod prompts;
mod searcher;

#[cfg(test)]
mod test_support;

pub use config::AgentSettings;
pub use distributor::SearchDistributor;
pub use planner::PlanningAgent;
pub use searcher::SearcherAgent;
