//! Fakes shared by the agent tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use qs_core::testing::MockProvider;
use qs_core::{
    string_list, ChatClient, ChatSampling, CompletionRequest, Error, Role, Tool, ToolDefinition,
    ToolParameter, ToolRegistry,
};
use qs_tools::{SEARCH_RESULTS_KEY, WEB_SEARCH, WEB_SELECT};

use crate::prompts::{SELECT_TOOL_PROMPT, SUFFICIENCY_PROMPT, SUMMARY_PROMPT};

/// Which prompt builder produced a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallSite {
    Thought,
    Search,
    Select,
    Sufficiency,
    Summary,
    Answer,
}

pub fn call_site(request: &CompletionRequest) -> CallSite {
    let select_head = SELECT_TOOL_PROMPT.split("{tool_info}").next().unwrap_or_default();
    if let Some(first) = request.messages.first().filter(|m| m.role == Role::System) {
        let content = first.content.as_str();
        if content.starts_with("The current date is") {
            return CallSite::Thought;
        }
        if content.starts_with("当前日期:") {
            return CallSite::Search;
        }
        if content.starts_with(select_head) {
            return CallSite::Select;
        }
        if content == SUMMARY_PROMPT {
            return CallSite::Summary;
        }
    }
    match request.messages.last() {
        Some(last) if last.role == Role::User && last.content.starts_with(SUFFICIENCY_PROMPT) => {
            CallSite::Sufficiency
        }
        _ => CallSite::Answer,
    }
}

pub async fn client_from(provider: Arc<MockProvider>) -> ChatClient {
    ChatClient::connect(provider, None, ChatSampling::default())
        .await
        .unwrap()
}

pub async fn client(provider: MockProvider) -> ChatClient {
    client_from(Arc::new(provider)).await
}

/// `web_search` returns one hit per call built from its first query.
/// Queries containing "fail" raise a tool error.
struct FakeSearch {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Tool for FakeSearch {
    fn name(&self) -> &str {
        WEB_SEARCH
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(WEB_SEARCH, "fake search")
            .with_parameter(ToolParameter::required("query", "str", "keywords"))
    }

    async fn call(&self, parameters: Map<String, Value>) -> Result<Value, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let queries = parameters
            .get("query")
            .and_then(string_list)
            .unwrap_or_default();
        let first = queries.first().cloned().unwrap_or_default();
        if first.contains("fail") {
            return Err(Error::tool(WEB_SEARCH, "backend down"));
        }
        Ok(json!({
            "0": {"url": format!("https://a.cn/{first}"), "title": first, "snippet": "摘要"}
        }))
    }
}

/// `web_select` echoes the selected ids as fetched pages.
struct FakeSelect {
    calls: Arc<AtomicUsize>,
    last_params: Arc<Mutex<Option<Map<String, Value>>>>,
}

#[async_trait]
impl Tool for FakeSelect {
    fn name(&self) -> &str {
        WEB_SELECT
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(WEB_SELECT, "fake select")
            .with_parameter(ToolParameter::required("select_ids", "list[str]", "ids"))
    }

    async fn call(&self, parameters: Map<String, Value>) -> Result<Value, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_params.lock().unwrap() = Some(parameters.clone());
        let results = parameters
            .get(SEARCH_RESULTS_KEY)
            .and_then(Value::as_object)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| Error::validation("no search results"))?;
        let mut pages = Map::new();
        for id in parameters
            .get("select_ids")
            .and_then(string_list)
            .unwrap_or_default()
        {
            if let Some(hit) = results.get(&id) {
                pages.insert(id, json!({"url": hit["url"], "content": "页面正文"}));
            }
        }
        Ok(Value::Object(pages))
    }
}

pub struct FakeTools {
    search_calls: Arc<AtomicUsize>,
    select_calls: Arc<AtomicUsize>,
    last_select: Arc<Mutex<Option<Map<String, Value>>>>,
}

impl FakeTools {
    pub fn new() -> Self {
        Self {
            search_calls: Arc::new(AtomicUsize::new(0)),
            select_calls: Arc::new(AtomicUsize::new(0)),
            last_select: Arc::new(Mutex::new(None)),
        }
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn select_calls(&self) -> usize {
        self.select_calls.load(Ordering::SeqCst)
    }

    pub fn last_select_params(&self) -> Option<Map<String, Value>> {
        self.last_select.lock().unwrap().clone()
    }
}

pub fn registry(tools: &FakeTools) -> Arc<ToolRegistry> {
    Arc::new(ToolRegistry::describe([
        Arc::new(FakeSearch {
            calls: tools.search_calls.clone(),
        }) as Arc<dyn Tool>,
        Arc::new(FakeSelect {
            calls: tools.select_calls.clone(),
            last_params: tools.last_select.clone(),
        }),
    ]))
}
