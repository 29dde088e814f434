//! Per sub-query search loop.
//!
//! A searcher alternates `web_search` and `web_select` calls, checking after
//! every round whether the gathered pages already answer its sub-query.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error};

use qs_core::{parse_directive, string_list, ChatClient, Error, Message, SharedRecord, ToolCall, ToolRegistry};
use qs_tools::{SEARCH_RESULTS_KEY, WEB_SEARCH, WEB_SELECT};

use crate::config::AgentSettings;
use crate::prompts;

const QUESTION_HEADER: &str = "## 当前问题\n";

/// The tool call made in the previous round.
#[derive(Debug, Clone, PartialEq)]
enum PriorCall {
    NoPriorCall,
    /// Carries the search observation the next selection picks from.
    PriorSearch(Value),
    PriorSelect,
    Unknown(String),
}

/// What the next round has to do.
#[derive(Debug, Clone, PartialEq)]
enum Step {
    Search,
    Select(Value),
    Abort(String),
}

impl PriorCall {
    fn next_step(self) -> Step {
        match self {
            PriorCall::NoPriorCall | PriorCall::PriorSelect => Step::Search,
            PriorCall::PriorSearch(observation) => Step::Select(observation),
            PriorCall::Unknown(name) => Step::Abort(name),
        }
    }

    /// Classify the tool named by a directive. A directive that names no
    /// tool is taken to mean the one the prompt asked for.
    fn classify(name: Option<&str>, expected: &str) -> Option<PriorCall> {
        match name {
            None => None,
            Some(name) if name == expected => None,
            Some(other) => Some(PriorCall::Unknown(other.to_string())),
        }
    }
}

/// Answers one sub-query. Cheap to construct; the distributor creates a
/// fresh one per sub-query.
pub struct SearcherAgent {
    chat: ChatClient,
    tools: Arc<ToolRegistry>,
    max_turns: usize,
    few_shot: bool,
}

impl SearcherAgent {
    pub fn new(chat: ChatClient, tools: Arc<ToolRegistry>, settings: &AgentSettings) -> Self {
        Self {
            chat,
            tools,
            max_turns: settings.searcher_max_turns,
            few_shot: settings.few_shot,
        }
    }

    /// Research `query` and return the model's answer.
    ///
    /// Returns `None` when the loop stops before any tool ran. An empty
    /// answer from the model is still `Some`. Chat and tool errors propagate.
    pub async fn answer(&self, query: &str, record: &SharedRecord) -> Result<Option<String>, Error> {
        let mut history = vec![Message::user(format!("{QUESTION_HEADER}{query}"))];
        let mut sufficient = self.is_sufficient(&history).await?;
        let mut prior = PriorCall::NoPriorCall;
        let mut tools_ran = false;

        for turn in 0..self.max_turns {
            if sufficient || turn + 1 == self.max_turns {
                debug!(query, turn, sufficient, "Answering sub-query");
                return self.chat.stream_text(&history).await.map(Some);
            }

            let next = match prior.next_step() {
                Step::Search => self.search_round(&mut history, record).await?,
                Step::Select(observation) => self.select_round(&mut history, observation).await?,
                Step::Abort(name) => {
                    error!(query, tool = %name, "Model asked for an unknown tool");
                    break;
                }
            };
            prior = match next {
                Some(call) => call,
                None => {
                    debug!(query, turn, "Directive carried nothing to run");
                    break;
                }
            };
            if !matches!(prior, PriorCall::Unknown(_)) {
                tools_ran = true;
            }

            sufficient = self.is_sufficient(&history).await?;
        }

        if tools_ran {
            self.chat.stream_text(&history).await.map(Some)
        } else {
            Ok(None)
        }
    }

    /// Anything but an explicit "False" verdict counts as sufficient.
    async fn is_sufficient(&self, history: &[Message]) -> Result<bool, Error> {
        let prompt = prompts::sufficiency_prompt(history, self.few_shot);
        let response = self.chat.stream_text(&prompt).await?;
        let insufficient = match parse_directive(&response).get("action") {
            Some(Value::String(action)) => action.contains("False"),
            Some(Value::Bool(action)) => !action,
            _ => false,
        };
        Ok(!insufficient)
    }

    async fn search_round(
        &self,
        history: &mut Vec<Message>,
        record: &SharedRecord,
    ) -> Result<Option<PriorCall>, Error> {
        let schema = self.tools.schema_text(WEB_SEARCH).unwrap_or_default();
        let prompt = prompts::search_prompt(history, &schema, self.few_shot);
        let response = self.chat.stream_text(&prompt).await?;
        let call = ToolCall::from_directive(&parse_directive(&response));
        history.push(Message::assistant(response));

        let has_query = call
            .parameter("query")
            .and_then(string_list)
            .is_some_and(|queries| !queries.is_empty());
        if !has_query {
            return Ok(None);
        }
        if let Some(unknown) = PriorCall::classify(call.name.as_deref(), WEB_SEARCH) {
            return Ok(Some(unknown));
        }

        let observation = self
            .tools
            .dispatch(&ToolCall::new(WEB_SEARCH, call.parameters))
            .await?;
        debug!(observation = %observation, "Search observation");
        history.push(Message::user(observation.to_string()));
        record.record_search_call();

        Ok(Some(PriorCall::PriorSearch(observation)))
    }

    async fn select_round(
        &self,
        history: &mut Vec<Message>,
        search_results: Value,
    ) -> Result<Option<PriorCall>, Error> {
        let schema = self.tools.schema_text(WEB_SELECT).unwrap_or_default();
        let prompt = prompts::select_prompt(history, &schema, self.few_shot);
        let response = self.chat.stream_text(&prompt).await?;
        let call = ToolCall::from_directive(&parse_directive(&response));
        history.push(Message::assistant(response));

        let has_ids = call
            .parameter("select_ids")
            .and_then(string_list)
            .is_some_and(|ids| !ids.is_empty());
        if !has_ids {
            return Ok(None);
        }
        if let Some(unknown) = PriorCall::classify(call.name.as_deref(), WEB_SELECT) {
            return Ok(Some(unknown));
        }

        let call = ToolCall::new(WEB_SELECT, call.parameters)
            .with_parameter(SEARCH_RESULTS_KEY, search_results);
        let observation = self.tools.dispatch(&call).await?;
        debug!(observation = %observation, "Select observation");
        history.push(Message::user(observation.to_string()));

        Ok(Some(PriorCall::PriorSelect))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{call_site, client, registry, CallSite, FakeTools};
    use qs_core::testing::MockProvider;
    use serde_json::json;

    const SEARCH: &str = r#"{"name": "web_search", "parameters": {"query": ["珠峰 高度"]}}"#;
    const SELECT: &str = r#"{"name": "web_select", "parameters": {"select_ids": ["0"]}}"#;
    const INSUFFICIENT: &str = r#"{"thought": "还不够", "action": "False"}"#;
    const SUFFICIENT: &str = r#"{"thought": "够了", "action": "True"}"#;

    fn settings() -> AgentSettings {
        AgentSettings {
            few_shot: false,
            ..AgentSettings::default()
        }
    }

    async fn searcher(provider: MockProvider, tools: &FakeTools) -> SearcherAgent {
        SearcherAgent::new(client(provider).await, registry(tools), &settings())
    }

    #[test]
    fn test_transition_table() {
        assert_eq!(PriorCall::NoPriorCall.next_step(), Step::Search);
        assert_eq!(PriorCall::PriorSelect.next_step(), Step::Search);
        assert_eq!(
            PriorCall::PriorSearch(json!({"0": {}})).next_step(),
            Step::Select(json!({"0": {}}))
        );
        assert_eq!(
            PriorCall::Unknown("calculator".into()).next_step(),
            Step::Abort("calculator".into())
        );
    }

    #[test]
    fn test_classify() {
        assert_eq!(PriorCall::classify(None, WEB_SEARCH), None);
        assert_eq!(PriorCall::classify(Some(WEB_SEARCH), WEB_SEARCH), None);
        assert_eq!(
            PriorCall::classify(Some("calculator"), WEB_SEARCH),
            Some(PriorCall::Unknown("calculator".into()))
        );
    }

    #[tokio::test]
    async fn test_sufficient_at_once_answers_without_tools() {
        let provider = MockProvider::new().with_responder(|request| {
            Ok(match call_site(request) {
                CallSite::Sufficiency => SUFFICIENT.to_string(),
                CallSite::Answer => "8848.86米".to_string(),
                other => panic!("unexpected call: {other:?}"),
            })
        });
        let tools = FakeTools::new();
        let record = SharedRecord::new();

        let answer = searcher(provider, &tools).await.answer("珠峰多高", &record).await.unwrap();

        assert_eq!(answer.as_deref(), Some("8848.86米"));
        assert_eq!(tools.search_calls(), 0);
        assert_eq!(record.snapshot().search_function, 0);
    }

    #[tokio::test]
    async fn test_search_then_select_then_answer() {
        let provider = MockProvider::new().with_responder(|request| {
            let observed_pages = request
                .messages
                .iter()
                .any(|m| m.content.contains("页面正文"));
            Ok(match call_site(request) {
                CallSite::Sufficiency if observed_pages => SUFFICIENT.to_string(),
                CallSite::Sufficiency => INSUFFICIENT.to_string(),
                CallSite::Search => SEARCH.to_string(),
                CallSite::Select => SELECT.to_string(),
                CallSite::Answer => "8848.86米".to_string(),
                other => panic!("unexpected call: {other:?}"),
            })
        });
        let tools = FakeTools::new();
        let record = SharedRecord::new();

        let agent = SearcherAgent::new(
            client(provider).await,
            registry(&tools),
            &AgentSettings {
                searcher_max_turns: 5,
                few_shot: false,
                ..AgentSettings::default()
            },
        );
        let answer = agent.answer("珠峰多高", &record).await.unwrap();

        assert_eq!(answer.as_deref(), Some("8848.86米"));
        assert_eq!(tools.search_calls(), 1);
        assert_eq!(tools.select_calls(), 1);
        assert_eq!(record.snapshot().search_function, 1);

        // The select tool saw the search observation under the injected key.
        let params = tools.last_select_params().unwrap();
        assert_eq!(params[SEARCH_RESULTS_KEY]["0"]["url"], "https://a.cn/珠峰 高度");
        assert_eq!(params["select_ids"], json!(["0"]));
    }

    #[tokio::test]
    async fn test_select_prompt_omits_search_call() {
        let provider = MockProvider::new().with_responder(|request| {
            Ok(match call_site(request) {
                CallSite::Sufficiency => INSUFFICIENT.to_string(),
                CallSite::Search => SEARCH.to_string(),
                CallSite::Select => SELECT.to_string(),
                _ => "答案".to_string(),
            })
        });
        let provider = Arc::new(provider);
        let tools = FakeTools::new();
        let agent = SearcherAgent::new(
            crate::test_support::client_from(provider.clone()).await,
            registry(&tools),
            &settings(),
        );
        agent.answer("珠峰多高", &SharedRecord::new()).await.unwrap();

        let select = provider
            .requests()
            .into_iter()
            .find(|r| call_site(r) == CallSite::Select)
            .unwrap();
        assert_eq!(select.messages.len(), 3);
        assert!(select.messages[1].content.starts_with(QUESTION_HEADER));
        assert!(select.messages[2].content.contains("https://a.cn"));
        assert!(!select.messages.iter().any(|m| m.content == SEARCH));
    }

    #[tokio::test]
    async fn test_final_turn_forces_answer() {
        let provider = MockProvider::new().with_responder(|request| {
            Ok(match call_site(request) {
                CallSite::Sufficiency => INSUFFICIENT.to_string(),
                CallSite::Search => SEARCH.to_string(),
                CallSite::Select => SELECT.to_string(),
                CallSite::Answer => "尽力回答".to_string(),
                other => panic!("unexpected call: {other:?}"),
            })
        });
        let tools = FakeTools::new();
        let record = SharedRecord::new();

        let answer = searcher(provider, &tools).await.answer("珠峰多高", &record).await.unwrap();

        // Three turns: search, select, then the forced answer.
        assert_eq!(answer.as_deref(), Some("尽力回答"));
        assert_eq!(tools.search_calls(), 1);
        assert_eq!(tools.select_calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_query_breaks_without_error() {
        let provider = MockProvider::new().with_responder(|request| {
            Ok(match call_site(request) {
                CallSite::Sufficiency => INSUFFICIENT.to_string(),
                CallSite::Search => r#"{"name": "web_search", "parameters": {"query": []}}"#.to_string(),
                other => panic!("unexpected call: {other:?}"),
            })
        });
        let tools = FakeTools::new();
        let record = SharedRecord::new();

        let answer = searcher(provider, &tools).await.answer("珠峰多高", &record).await.unwrap();

        assert_eq!(answer, None);
        assert_eq!(tools.search_calls(), 0);
        assert_eq!(record.snapshot().search_function, 0);
    }

    #[tokio::test]
    async fn test_unparseable_verdict_means_sufficient() {
        let provider = MockProvider::new().with_responder(|request| {
            Ok(match call_site(request) {
                CallSite::Sufficiency => "我觉得差不多了".to_string(),
                CallSite::Answer => "答案".to_string(),
                other => panic!("unexpected call: {other:?}"),
            })
        });
        let tools = FakeTools::new();
        let answer = searcher(provider, &tools)
            .await
            .answer("q", &SharedRecord::new())
            .await
            .unwrap();
        assert_eq!(answer.as_deref(), Some("答案"));
        assert_eq!(tools.search_calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_model_answer_is_still_an_answer() {
        let provider = MockProvider::new().with_responder(|request| {
            Ok(match call_site(request) {
                CallSite::Sufficiency => SUFFICIENT.to_string(),
                CallSite::Answer => String::new(),
                other => panic!("unexpected call: {other:?}"),
            })
        });
        let tools = FakeTools::new();
        let answer = searcher(provider, &tools)
            .await
            .answer("q", &SharedRecord::new())
            .await
            .unwrap();
        assert_eq!(answer, Some(String::new()));
    }

    #[tokio::test]
    async fn test_unknown_tool_aborts_after_history_answer() {
        let provider = MockProvider::new().with_responder(|request| {
            Ok(match call_site(request) {
                CallSite::Sufficiency => INSUFFICIENT.to_string(),
                CallSite::Search => SEARCH.to_string(),
                CallSite::Select => {
                    r#"{"name": "calculator", "parameters": {"select_ids": ["0"]}}"#.to_string()
                }
                CallSite::Answer => "根据已有结果".to_string(),
                other => panic!("unexpected call: {other:?}"),
            })
        });
        let tools = FakeTools::new();
        let agent = SearcherAgent::new(
            client(provider).await,
            registry(&tools),
            &AgentSettings {
                searcher_max_turns: 6,
                few_shot: false,
                ..AgentSettings::default()
            },
        );

        let answer = agent.answer("q", &SharedRecord::new()).await.unwrap();

        assert_eq!(answer.as_deref(), Some("根据已有结果"));
        assert_eq!(tools.search_calls(), 1);
        assert_eq!(tools.select_calls(), 0);
    }

    #[tokio::test]
    async fn test_tool_error_propagates() {
        let provider = MockProvider::new().with_responder(|request| {
            Ok(match call_site(request) {
                CallSite::Sufficiency => INSUFFICIENT.to_string(),
                CallSite::Search => {
                    r#"{"name": "web_search", "parameters": {"query": "fail"}}"#.to_string()
                }
                other => panic!("unexpected call: {other:?}"),
            })
        });
        let tools = FakeTools::new();
        let err = searcher(provider, &tools)
            .await
            .answer("q", &SharedRecord::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Tool { .. }));
    }
}
