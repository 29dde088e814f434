//! Test utilities shared across the workspace.
//! Only compiled when running tests or with the `testing` feature.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::Error;
use crate::message::{Message, StreamChunk, Usage};
use crate::provider::{CompletionRequest, CompletionResponse, FinishReason, Provider, StreamResult};

type Responder = Box<dyn Fn(&CompletionRequest) -> Result<String, Error> + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// A mock provider that answers from a scripted responder or a FIFO queue.
///
/// When a responder is set it answers every request; otherwise queued
/// responses are returned first-in first-out. Streaming splits the answer
/// into a few deltas so consumers see real fragment boundaries.
pub struct MockProvider {
    responses: Mutex<Vec<String>>,
    responder: Option<Responder>,
    models: Vec<String>,
    /// Captured requests (for assertion).
    pub captured_requests: Mutex<Vec<CompletionRequest>>,
    pub name: String,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            responder: None,
            models: vec!["mock-model".to_string()],
            captured_requests: Mutex::new(Vec::new()),
            name: "mock".to_string(),
        }
    }

    /// Answer every request through `responder`.
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String, Error> + Send + Sync + 'static,
    {
        self.responder = Some(Box::new(responder));
        self
    }

    pub fn with_models<S: Into<String>>(mut self, models: Vec<S>) -> Self {
        self.models = models.into_iter().map(Into::into).collect();
        self
    }

    /// Queue a response for the next call (FIFO).
    pub fn queue_response(&self, content: &str) {
        lock(&self.responses).insert(0, content.to_string());
    }

    pub fn request_count(&self) -> usize {
        lock(&self.captured_requests).len()
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        lock(&self.captured_requests).last().cloned()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.captured_requests).clone()
    }

    fn answer(&self, request: CompletionRequest) -> Result<String, Error> {
        let answer = match &self.responder {
            Some(responder) => responder(&request),
            None => lock(&self.responses)
                .pop()
                .ok_or_else(|| Error::Unknown("No mock response queued".to_string())),
        };
        lock(&self.captured_requests).push(request);
        answer
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn split_fragments(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(8).map(|c| c.iter().collect()).collect()
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, Error> {
        let content = self.answer(request)?;
        Ok(CompletionResponse {
            message: Message::assistant(content),
            usage: Usage::new(0, 0),
            model: "mock-model".to_string(),
            finish_reason: FinishReason::Stop,
        })
    }

    async fn stream(&self, request: CompletionRequest) -> Result<StreamResult, Error> {
        let content = self.answer(request)?;
        let mut chunks = vec![Ok(StreamChunk::Start {
            model: "mock-model".to_string(),
        })];
        chunks.extend(
            split_fragments(&content)
                .into_iter()
                .map(|content| Ok(StreamChunk::Delta { content })),
        );
        chunks.push(Ok(StreamChunk::Done { usage: None }));
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    async fn list_models(&self) -> Result<Vec<String>, Error> {
        Ok(self.models.clone())
    }
}
