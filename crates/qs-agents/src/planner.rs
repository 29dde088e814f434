//! Top-level planning loop.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info};

use qs_core::{
    parse_directive, string_list, ChatClient, Error, Message, ResultRecord, SharedRecord,
    ToolRegistry, FAILURE_ANSWER,
};

use crate::config::AgentSettings;
use crate::distributor::SearchDistributor;
use crate::prompts;

fn or_failure(answer: String) -> String {
    if answer.is_empty() {
        FAILURE_ANSWER.to_string()
    } else {
        answer
    }
}

/// Decomposes a question into sub-queries round by round, then summarizes.
pub struct PlanningAgent {
    chat: ChatClient,
    distributor: SearchDistributor,
    max_turns: usize,
    few_shot: bool,
}

impl PlanningAgent {
    pub fn new(chat: ChatClient, distributor: SearchDistributor, max_turns: usize, few_shot: bool) -> Self {
        Self {
            chat,
            distributor,
            max_turns,
            few_shot,
        }
    }

    /// Wire a planner and its distributor from one settings block.
    pub fn from_settings(chat: ChatClient, tools: Arc<ToolRegistry>, settings: &AgentSettings) -> Self {
        let distributor = SearchDistributor::new(chat.clone(), tools, settings.clone());
        Self::new(chat, distributor, settings.planner_max_turns, settings.few_shot)
    }

    /// Answer a single question.
    pub async fn run(&self, question: &str) -> ResultRecord {
        self.run_messages(vec![Message::user(question)]).await
    }

    /// Answer the conversation in `messages`.
    ///
    /// Never fails: a chat error ends the run with the error recorded in
    /// `errmsg` and the failure answer in `response`.
    pub async fn run_messages(&self, messages: Vec<Message>) -> ResultRecord {
        let record = SharedRecord::new();
        let mut history = messages;

        if let Err(e) = self.plan(&mut history, &record).await {
            error!(error = %e, "Planning run failed");
            record.update(|r| {
                r.errmsg = Some(e.to_string());
                r.response = FAILURE_ANSWER.to_string();
            });
        }

        record.update(|r| r.trace = history);
        record.snapshot()
    }

    async fn plan(&self, history: &mut Vec<Message>, record: &SharedRecord) -> Result<(), Error> {
        for turn in 0..self.max_turns {
            let last = turn + 1 == self.max_turns;
            let prompt = prompts::thought_prompt(history, self.few_shot);
            let response = self.chat.stream_text(&prompt).await?;
            let directive = parse_directive(&response);

            if directive.is_empty() {
                if last {
                    let answer = or_failure(response);
                    history.push(Message::assistant(answer.clone()));
                    record.update(|r| r.response = answer);
                    return Ok(());
                }
                debug!(turn, "No directive in planner response, thinking again");
                record.update(|r| r.response = response);
                continue;
            }

            let queries = directive
                .get("search")
                .and_then(|search| match search {
                    Value::Array(_) => string_list(search),
                    _ => None,
                })
                .unwrap_or_default();

            if queries.is_empty() || last {
                info!(turn, "Summarizing");
                let summary = self.chat.stream_text(&prompts::summary_prompt(history)).await?;
                let answer = or_failure(summary);
                history.push(Message::assistant(answer.clone()));
                record.update(|r| r.response = answer);
                return Ok(());
            }

            info!(turn, sub_queries = queries.len(), "Distributing sub-queries");
            record.update(|r| r.thought_depth += 1);
            history.push(Message::assistant(response));
            record.add_search(&queries);

            let found = self.distributor.distribute(&queries, record).await;
            if !found.is_empty() {
                history.push(Message::user(found));
            }
        }
        Ok(())
    }
}
