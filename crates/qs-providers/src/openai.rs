use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error};

use qs_core::{
    CompletionRequest, CompletionResponse, Error, FinishReason, Message, Provider, Role,
    StreamChunk, StreamResult, Usage,
};

/// Local vLLM-style server.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/v1";

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAIProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        // HTTP/1.1 without compression keeps SSE chunks flowing as they are produced
        let client = Client::builder()
            .http1_only()
            .no_gzip()
            .no_brotli()
            .no_deflate()
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_request(&self, request: &CompletionRequest) -> OpenAIChatRequest {
        OpenAIChatRequest {
            model: request.model.clone(),
            messages: request.messages.iter().map(convert_message).collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            frequency_penalty: request.frequency_penalty,
            stream: Some(request.stream),
            stream_options: if request.stream {
                Some(StreamOptions {
                    include_usage: true,
                })
            } else {
                None
            },
        }
    }

    fn parse_response(&self, response: OpenAIChatResponse) -> Result<CompletionResponse, Error> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::api(500, "No choices in response"))?;

        let finish_reason = match choice.finish_reason.as_deref() {
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            _ => FinishReason::Stop,
        };

        let usage = response
            .usage
            .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens));

        Ok(CompletionResponse {
            message: Message::assistant(choice.message.content.unwrap_or_default()),
            usage: usage.unwrap_or_default(),
            model: response.model,
            finish_reason,
        })
    }

    fn parse_error(&self, status: u16, body: &str) -> Error {
        #[derive(Deserialize)]
        struct ErrorResponse {
            error: ErrorDetail,
        }

        #[derive(Deserialize)]
        struct ErrorDetail {
            message: String,
        }

        match serde_json::from_str::<ErrorResponse>(body) {
            Ok(err) => match status {
                401 => Error::auth(err.error.message),
                429 => Error::rate_limit(err.error.message),
                400 => Error::invalid_request(err.error.message),
                _ => Error::api(status, err.error.message),
            },
            Err(_) => Error::api(status, body.to_string()),
        }
    }

    async fn post_chat(
        &self,
        api_request: &OpenAIChatRequest,
        streaming: bool,
    ) -> Result<reqwest::Response, Error> {
        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if streaming {
            builder = builder
                .header("Accept", "text/event-stream")
                .header("Accept-Encoding", "identity")
                .header("Cache-Control", "no-cache");
        }

        let response = builder
            .json(api_request)
            .send()
            .await
            .map_err(|e| Error::network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(self.parse_error(status.as_u16(), &error_text));
        }
        Ok(response)
    }
}

fn convert_message(message: &Message) -> OpenAIMessage {
    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    OpenAIMessage {
        role: role.to_string(),
        content: Some(message.content.clone()),
    }
}

/// Turn one SSE `data:` payload into stream chunks. Returns `None` once the
/// terminal `[DONE]` marker is seen.
fn parse_sse_data(data: &str) -> Option<Vec<StreamChunk>> {
    if data == "[DONE]" {
        return None;
    }

    let mut chunks = Vec::new();
    match serde_json::from_str::<OpenAIStreamResponse>(data) {
        Ok(response) => {
            for choice in response.choices {
                if let Some(content) = choice.delta.content {
                    if !content.is_empty() {
                        chunks.push(StreamChunk::Delta { content });
                    }
                }
                if choice.finish_reason.is_some() {
                    let usage = response
                        .usage
                        .as_ref()
                        .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens));
                    chunks.push(StreamChunk::Done { usage });
                }
            }
        }
        Err(e) => {
            error!("Failed to parse SSE message: {} - data: {}", e, data);
        }
    }
    Some(chunks)
}

/// Pop every complete SSE event (blank-line terminated) off the front of
/// `buffer`, returning their `data:` payloads in order.
fn drain_events(buffer: &mut String) -> Vec<String> {
    let mut payloads = Vec::new();
    loop {
        let normalized = buffer.find("\r\n\r\n").map(|i| (i, 4));
        let plain = buffer.find("\n\n").map(|i| (i, 2));
        let boundary = match (normalized, plain) {
            (Some(a), Some(b)) => Some(if a.0 < b.0 { a } else { b }),
            (a, b) => a.or(b),
        };
        let Some((event_end, sep_len)) = boundary else {
            break;
        };

        let event: String = buffer.drain(..event_end + sep_len).collect();
        for line in event.lines() {
            if let Some(data) = line.strip_prefix("data:") {
                payloads.push(data.trim_start().to_string());
            }
        }
    }
    payloads
}

/// Move decoded text from `pending` into `buffer`. An incomplete trailing
/// sequence stays in `pending`; invalid bytes become U+FFFD.
fn decode_utf8(pending: &mut Vec<u8>, buffer: &mut String) {
    loop {
        match std::str::from_utf8(&pending[..]) {
            Ok(text) => {
                buffer.push_str(text);
                pending.clear();
                return;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                buffer.push_str(&String::from_utf8_lossy(&pending[..valid]));
                match e.error_len() {
                    // a multi-byte character may straddle two network chunks
                    None => {
                        pending.drain(..valid);
                        return;
                    }
                    Some(len) => {
                        error!("Invalid UTF-8 in SSE stream");
                        buffer.push(char::REPLACEMENT_CHARACTER);
                        pending.drain(..valid + len);
                    }
                }
            }
        }
    }
}

/// Whatever is left once the body ends. A last event without its blank
/// line is still an event.
fn drain_tail(pending: &[u8], buffer: &mut String) -> Vec<String> {
    if !pending.is_empty() {
        buffer.push_str(&String::from_utf8_lossy(pending));
    }
    if buffer.trim().is_empty() {
        buffer.clear();
        return Vec::new();
    }
    buffer.push_str("\n\n");
    drain_events(buffer)
}

/// Send the chunks for each payload. Returns false once `[DONE]` is seen.
async fn forward(tx: &mpsc::Sender<Result<StreamChunk, Error>>, payloads: Vec<String>) -> bool {
    for data in payloads {
        match parse_sse_data(&data) {
            Some(chunks) => {
                for chunk in chunks {
                    let _ = tx.send(Ok(chunk)).await;
                }
            }
            None => return false,
        }
    }
    true
}

#[async_trait]
impl Provider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, Error> {
        let mut req = request;
        req.stream = false;

        let api_request = self.build_request(&req);
        debug!("OpenAI request: {:?}", api_request);

        let response = self.post_chat(&api_request, false).await?;
        let api_response: OpenAIChatResponse = response
            .json()
            .await
            .map_err(|e| Error::serialization(e.to_string()))?;

        self.parse_response(api_response)
    }

    async fn stream(&self, request: CompletionRequest) -> Result<StreamResult, Error> {
        let mut req = request;
        req.stream = true;

        let api_request = self.build_request(&req);
        debug!("OpenAI stream request: {:?}", api_request);

        let mut response = self.post_chat(&api_request, true).await?;
        let (tx, rx) = mpsc::channel::<Result<StreamChunk, Error>>(100);

        tokio::spawn(async move {
            let mut buffer = String::new();
            let mut pending = Vec::new();

            loop {
                let chunk = match response.chunk().await {
                    Ok(Some(chunk)) => chunk,
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.send(Err(Error::stream(e.to_string()))).await;
                        return;
                    }
                };

                pending.extend_from_slice(&chunk);
                decode_utf8(&mut pending, &mut buffer);

                if !forward(&tx, drain_events(&mut buffer)).await {
                    let _ = tx.send(Ok(StreamChunk::Done { usage: None })).await;
                    return;
                }
            }

            forward(&tx, drain_tail(&pending, &mut buffer)).await;
            let _ = tx.send(Ok(StreamChunk::Done { usage: None })).await;
        });

        Ok(Box::pin(ReceiverStream::new(rx)) as StreamResult)
    }

    async fn list_models(&self) -> Result<Vec<String>, Error> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| Error::network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(self.parse_error(status.as_u16(), &error_text));
        }

        let listing: OpenAIModelList = response
            .json()
            .await
            .map_err(|e| Error::serialization(e.to_string()))?;
        Ok(listing.data.into_iter().map(|m| m.id).collect())
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAIChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChatResponse {
    model: String,
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamResponse {
    choices: Vec<OpenAIStreamChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChoice {
    delta: OpenAIStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIModelList {
    data: Vec<OpenAIModel>,
}

#[derive(Debug, Deserialize)]
struct OpenAIModel {
    id: String,
}
