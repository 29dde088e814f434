//! Wiring config into agents, and the two run modes.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinSet;
use tracing::{info, warn};

use qs_agents::PlanningAgent;
use qs_core::{ChatClient, ResultRecord, ToolRegistry};
use qs_providers::OpenAIProvider;
use qs_tools::{create_search_tools, ContentFetcher, SearchEngine};

use crate::config::Config;
use crate::dataset::{self, Question, RecordWriter, RunRecord};

/// Search and select tools for the configured provider. Their caches are
/// shared by everything holding the registry.
pub fn build_tools(config: &Config) -> Result<Arc<ToolRegistry>> {
    let engine = SearchEngine::from_settings(&config.search)
        .context("Failed to set up the search provider")?;
    let fetcher = ContentFetcher::new(&config.fetch);
    let tools = create_search_tools(
        Arc::new(engine),
        Arc::new(fetcher),
        config.agent.tool_concurrency,
        config.fetch.max_chars,
    );
    Ok(Arc::new(ToolRegistry::describe(tools)))
}

pub async fn connect(config: &Config, base_url: &str) -> Result<ChatClient> {
    let provider = OpenAIProvider::new(&config.chat.api_key).with_base_url(base_url);
    ChatClient::connect(
        Arc::new(provider),
        config.chat.model.clone(),
        config.chat.sampling(),
    )
    .await
    .with_context(|| format!("Failed to connect to {base_url}"))
}

/// Answer one question against the first configured endpoint.
pub async fn ask(config: &Config, question: &str) -> Result<ResultRecord> {
    let base_url = config
        .chat
        .base_urls
        .first()
        .context("No chat endpoint configured (chat.base_urls is empty)")?;
    let tools = build_tools(config)?;
    let chat = connect(config, base_url).await?;
    info!(model = chat.model(), base_url = %base_url, "Answering question");

    let planner = PlanningAgent::from_settings(chat, tools, &config.agent);
    Ok(planner.run(question).await)
}

/// Answer every question in `input` not yet in `output`, one chunk per
/// endpoint.
pub async fn batch(config: &Config, input: &Path, output: &Path) -> Result<()> {
    let questions = dataset::load_questions(input)?;
    let total = questions.len();
    let done = dataset::load_done(output)?;
    let todo = dataset::pending(questions, &done);
    if todo.is_empty() {
        println!("All {total} questions already answered in {}", output.display());
        return Ok(());
    }
    println!("{} of {total} questions to answer", todo.len());

    let base_urls = &config.chat.base_urls;
    anyhow::ensure!(
        !base_urls.is_empty(),
        "No chat endpoint configured (chat.base_urls is empty)"
    );

    let tools = build_tools(config)?;
    let writer = Arc::new(RecordWriter::open(output).await?);

    let mut workers = JoinSet::new();
    for (chunk_id, (chunk, base_url)) in dataset::split_chunks(todo, base_urls.len())
        .into_iter()
        .zip(base_urls.iter().cloned())
        .enumerate()
    {
        if chunk.is_empty() {
            continue;
        }
        let config = config.clone();
        let tools = tools.clone();
        let writer = writer.clone();
        workers.spawn(async move {
            let chat = match connect(&config, &base_url).await {
                Ok(chat) => chat,
                Err(e) => {
                    warn!(chunk = chunk_id, base_url = %base_url, error = %e, "Skipping chunk");
                    return 0;
                }
            };
            let planner = PlanningAgent::from_settings(chat, tools, &config.agent);
            run_chunk(chunk_id, &planner, &chunk, &writer).await
        });
    }

    let mut written = 0;
    while let Some(result) = workers.join_next().await {
        match result {
            Ok(count) => written += count,
            Err(e) => warn!(error = %e, "Batch worker panicked"),
        }
    }
    println!("Wrote {written} results to {}", output.display());
    Ok(())
}

/// Answer `questions` in order, appending each successful run. Returns the
/// number of records written.
pub async fn run_chunk(
    chunk_id: usize,
    planner: &PlanningAgent,
    questions: &[Question],
    writer: &RecordWriter,
) -> usize {
    let total = questions.len();
    let mut written = 0;
    for (i, question) in questions.iter().enumerate() {
        let record = planner.run(&question.question).await;
        if let Some(errmsg) = &record.errmsg {
            warn!(chunk = chunk_id, question = %question.question, error = %errmsg, "Question failed");
        } else if let Err(e) = writer.append(&RunRecord::new(question, record)).await {
            warn!(chunk = chunk_id, error = %e, "Failed to write result");
        } else {
            written += 1;
        }
        info!(chunk = chunk_id, "Progress {}/{}", i + 1, total);
    }
    written
}
