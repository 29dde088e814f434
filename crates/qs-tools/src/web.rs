//! The `web_search` and `web_select` tools offered to the searcher agent.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use qs_core::{string_list, Error, Tool, ToolDefinition, ToolParameter};

use crate::fetch::ContentFetcher;
use crate::search::{SearchEngine, SearchHit};

pub const WEB_SEARCH: &str = "web_search";
pub const WEB_SELECT: &str = "web_select";

/// Parameter under which the caller hands `web_select` the previous search
/// observation.
pub const SEARCH_RESULTS_KEY: &str = "search_results";

/// Merged results kept per `web_search` call.
const MAX_OBSERVATION_RESULTS: usize = 6;

// =============================================================================
// Web Search Tool
// =============================================================================

pub struct WebSearchTool {
    engine: Arc<SearchEngine>,
    concurrency: usize,
}

impl WebSearchTool {
    pub fn new(engine: Arc<SearchEngine>, concurrency: usize) -> Self {
        Self {
            engine,
            concurrency: concurrency.max(1),
        }
    }
}

/// Results of several queries, one entry per URL; repeated URLs collect
/// every snippet.
#[derive(Default)]
struct MergedHits {
    hits: Vec<SearchHit>,
    by_url: HashMap<String, usize>,
}

impl MergedHits {
    fn add(&mut self, hit: SearchHit) {
        match self.by_url.get(&hit.url) {
            Some(&index) => {
                let existing = &mut self.hits[index];
                existing.snippet.push('\n');
                existing.snippet.push_str(&hit.snippet);
            }
            None => {
                self.by_url.insert(hit.url.clone(), self.hits.len());
                self.hits.push(hit);
            }
        }
    }

    fn into_observation(self, limit: usize) -> Result<Value, Error> {
        let mut observation = Map::new();
        for (index, hit) in self.hits.into_iter().take(limit).enumerate() {
            observation.insert(index.to_string(), serde_json::to_value(hit)?);
        }
        Ok(Value::Object(observation))
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        WEB_SEARCH
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(WEB_SEARCH, "调用搜索引擎 API，根据问题搜索相关网页并返回搜索结果。")
            .with_parameter(ToolParameter::required(
                "query",
                "str",
                "需要搜索的问题或关键词，可以是一个字符串或字符串列表。",
            ))
    }

    async fn call(&self, parameters: Map<String, Value>) -> Result<Value, Error> {
        let queries = parameters
            .get("query")
            .and_then(string_list)
            .ok_or_else(|| Error::tool(WEB_SEARCH, "`query` must be a string or a list of strings"))?;

        let engine = &self.engine;
        let mut results = stream::iter(queries)
            .map(|query| async move {
                let result = engine.search(&query).await;
                (query, result)
            })
            .buffer_unordered(self.concurrency);

        let mut merged = MergedHits::default();
        while let Some((query, result)) = results.next().await {
            match result {
                Ok(hits) => {
                    debug!(query = %query, hits = hits.len(), "Search query finished");
                    for hit in hits {
                        merged.add(hit);
                    }
                }
                Err(e) => warn!(query = %query, error = %e, "Search query failed"),
            }
        }

        merged.into_observation(MAX_OBSERVATION_RESULTS)
    }
}

// =============================================================================
// Web Select Tool
// =============================================================================

pub struct WebSelectTool {
    fetcher: Arc<ContentFetcher>,
    concurrency: usize,
    max_chars: usize,
}

impl WebSelectTool {
    pub fn new(fetcher: Arc<ContentFetcher>, concurrency: usize, max_chars: usize) -> Self {
        Self {
            fetcher,
            concurrency: concurrency.max(1),
            max_chars,
        }
    }
}

#[async_trait]
impl Tool for WebSelectTool {
    fn name(&self) -> &str {
        WEB_SELECT
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(WEB_SELECT, "从搜索结果中挑选相关网页，读取网页正文以便进一步分析。")
            .with_parameter(ToolParameter::required(
                "select_ids",
                "list[str]",
                "选中网页在搜索结果中的编号列表。",
            ))
    }

    async fn call(&self, parameters: Map<String, Value>) -> Result<Value, Error> {
        let search_results = parameters
            .get(SEARCH_RESULTS_KEY)
            .and_then(Value::as_object)
            .filter(|results| !results.is_empty())
            .ok_or_else(|| Error::validation("No search results to select from"))?;

        let select_ids = parameters
            .get("select_ids")
            .and_then(string_list)
            .ok_or_else(|| Error::tool(WEB_SELECT, "`select_ids` must be a list of result ids"))?;

        let mut targets: Vec<(String, Map<String, Value>, String)> = Vec::new();
        for id in select_ids {
            if targets.iter().any(|(seen, _, _)| *seen == id) {
                continue;
            }
            let Some(entry) = search_results.get(&id).and_then(Value::as_object) else {
                debug!(id = %id, "Selected id not in search results");
                continue;
            };
            let url = entry.get("url").and_then(Value::as_str).unwrap_or_default().to_string();
            targets.push((id, entry.clone(), url));
        }

        let fetcher = &self.fetcher;
        let mut fetches = stream::iter(targets)
            .map(|(id, entry, url)| async move {
                let outcome = fetcher.fetch(&url).await;
                (id, entry, url, outcome)
            })
            .buffer_unordered(self.concurrency);

        let mut selected = Map::new();
        while let Some((id, mut entry, url, outcome)) = fetches.next().await {
            if !outcome.success {
                warn!(id = %id, url = %url, error = %outcome.text, "Fetching selected page failed");
                continue;
            }
            let content: String = outcome.text.chars().take(self.max_chars).collect();
            entry.remove("snippet");
            entry.insert("content".to_string(), Value::String(content));
            selected.insert(id, Value::Object(entry));
        }

        Ok(Value::Object(selected))
    }
}

// =============================================================================
// Factory functions
// =============================================================================

/// The searcher's tools, in the order they are described to the model.
pub fn create_search_tools(
    engine: Arc<SearchEngine>,
    fetcher: Arc<ContentFetcher>,
    concurrency: usize,
    max_chars: usize,
) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(WebSearchTool::new(engine, concurrency)),
        Arc::new(WebSelectTool::new(fetcher, concurrency, max_chars)),
    ]
}
