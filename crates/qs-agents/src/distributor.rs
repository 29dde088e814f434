use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, warn};

use qs_core::{ChatClient, SharedRecord, ToolRegistry};

use crate::config::AgentSettings;
use crate::searcher::SearcherAgent;

/// Runs one searcher per sub-query, all at once, and joins their answers.
#[derive(Clone)]
pub struct SearchDistributor {
    chat: ChatClient,
    tools: Arc<ToolRegistry>,
    settings: AgentSettings,
}

impl SearchDistributor {
    pub fn new(chat: ChatClient, tools: Arc<ToolRegistry>, settings: AgentSettings) -> Self {
        Self {
            chat,
            tools,
            settings,
        }
    }

    /// Answer every sub-query and concatenate the labelled answers in
    /// completion order. Failed sub-queries, and ones that stopped before
    /// any tool ran, are left out.
    pub async fn distribute(&self, queries: &[String], record: &SharedRecord) -> String {
        let mut pending: FuturesUnordered<_> = queries
            .iter()
            .map(|query| {
                let searcher = SearcherAgent::new(self.chat.clone(), self.tools.clone(), &self.settings);
                async move {
                    let result = searcher.answer(query, record).await;
                    (query, result)
                }
            })
            .collect();

        let mut content = String::new();
        while let Some((query, result)) = pending.next().await {
            match result {
                Ok(None) => {
                    debug!(query = %query, "Sub-query produced no answer");
                }
                Ok(Some(answer)) => {
                    content.push_str(&format!("##当前问题:{query}\n{answer}\n"));
                }
                Err(e) => {
                    warn!(query = %query, error = %e, "Sub-query failed");
                }
            }
        }
        content
    }
}
