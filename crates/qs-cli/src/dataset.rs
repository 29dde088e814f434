//! Batch input and output: question sets, the results file and the
//! checkpoint it doubles as.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use qs_core::ResultRecord;

/// One input item. Fields other than these are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Question {
    pub question: String,
    /// Reference answer, carried through to the results file untouched.
    #[serde(default)]
    pub answer: Value,
}

/// One line of the results file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub question: String,
    pub answer: Value,
    pub response: String,
    pub search: Vec<String>,
    pub thought_depth: u32,
    pub search_nums: usize,
    pub search_function: usize,
}

impl RunRecord {
    pub fn new(question: &Question, record: ResultRecord) -> Self {
        Self {
            question: question.question.clone(),
            answer: question.answer.clone(),
            response: record.response,
            search: record.search,
            thought_depth: record.thought_depth,
            search_nums: record.search_nums,
            search_function: record.search_function,
        }
    }
}

fn is_jsonl(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "jsonl")
}

/// Read a `.json` array or a `.jsonl` file of questions.
pub fn load_questions(path: &Path) -> Result<Vec<Question>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    if is_jsonl(path) {
        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line)
                    .with_context(|| format!("{}:{}: invalid question", path.display(), i + 1))
            })
            .collect()
    } else {
        serde_json::from_str(&content)
            .with_context(|| format!("{}: expected a JSON array of questions", path.display()))
    }
}

/// Questions already present in a results file. A missing file means none.
pub fn load_done(path: &Path) -> Result<HashSet<String>> {
    if !path.exists() {
        return Ok(HashSet::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut done = HashSet::new();
    for (i, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(value) => {
                if let Some(question) = value.get("question").and_then(Value::as_str) {
                    done.insert(question.to_string());
                }
            }
            Err(e) => warn!(path = %path.display(), line = i + 1, error = %e, "Skipping unreadable result line"),
        }
    }
    Ok(done)
}

pub fn pending(questions: Vec<Question>, done: &HashSet<String>) -> Vec<Question> {
    questions
        .into_iter()
        .filter(|q| !done.contains(&q.question))
        .collect()
}

/// Split into `n` contiguous chunks of `len / n` items; the last chunk also
/// takes the remainder.
pub fn split_chunks<T>(items: Vec<T>, n: usize) -> Vec<Vec<T>> {
    let n = n.max(1);
    let size = items.len() / n;
    let mut rest = items.into_iter();
    let mut chunks: Vec<Vec<T>> = (0..n - 1)
        .map(|_| rest.by_ref().take(size).collect())
        .collect();
    chunks.push(rest.collect());
    chunks
}

/// Appends run records as JSON lines. Concurrent writers are serialized.
pub struct RecordWriter {
    file: Mutex<tokio::fs::File>,
}

impl RecordWriter {
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    pub async fn append(&self, record: &RunRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
