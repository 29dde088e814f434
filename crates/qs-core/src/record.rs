use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::message::Message;

/// Answer recorded when a run produces nothing usable. Callers treat it as
/// "no answer", distinct from an empty string.
pub const FAILURE_ANSWER: &str = "错误";

/// Outcome and instrumentation of one planning run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub response: String,
    pub trace: Vec<Message>,
    pub errmsg: Option<String>,
    pub thought_depth: u32,
    pub search: Vec<String>,
    pub search_nums: usize,
    pub search_function: usize,
}

impl ResultRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend the issued sub-queries. The counter only ever grows here.
    pub fn add_search(&mut self, queries: &[String]) {
        self.search_nums += queries.len();
        self.search.extend_from_slice(queries);
    }
}

/// A [`ResultRecord`] shared between the planner and concurrently running
/// searchers.
#[derive(Debug, Clone, Default)]
pub struct SharedRecord {
    inner: Arc<Mutex<ResultRecord>>,
}

impl SharedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ResultRecord> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_search(&self, queries: &[String]) {
        self.lock().add_search(queries);
    }

    /// Count one search-tool invocation.
    pub fn record_search_call(&self) {
        self.lock().search_function += 1;
    }

    pub fn update<F: FnOnce(&mut ResultRecord)>(&self, f: F) {
        f(&mut self.lock());
    }

    pub fn snapshot(&self) -> ResultRecord {
        self.lock().clone()
    }
}
