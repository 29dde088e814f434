//! Thin client over a [`Provider`] that owns the model id and the two
//! sampling presets used by the agents.

use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Error;
use crate::message::{Message, StreamChunk};
use crate::provider::{CompletionRequest, Provider};

/// Incremental text fragments of one streamed completion. Finite and not
/// restartable.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, Error>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub frequency_penalty: f32,
}

impl SamplingParams {
    /// Preset for streamed agent calls.
    pub fn streaming() -> Self {
        Self {
            max_tokens: 2048,
            temperature: 0.7,
            frequency_penalty: 1.05,
        }
    }

    /// Preset for one-shot, non-streamed calls.
    pub fn plain() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.7,
            frequency_penalty: 0.7,
        }
    }

    fn apply(&self, request: CompletionRequest) -> CompletionRequest {
        request
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature)
            .with_frequency_penalty(self.frequency_penalty)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChatSampling {
    #[serde(default = "SamplingParams::streaming")]
    pub stream: SamplingParams,
    #[serde(default = "SamplingParams::plain")]
    pub chat: SamplingParams,
}

impl Default for ChatSampling {
    fn default() -> Self {
        Self {
            stream: SamplingParams::streaming(),
            chat: SamplingParams::plain(),
        }
    }
}

#[derive(Clone)]
pub struct ChatClient {
    provider: Arc<dyn Provider>,
    model: String,
    sampling: ChatSampling,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("sampling", &self.sampling)
            .finish()
    }
}

impl ChatClient {
    /// Build a client, asking the endpoint for its first listed model when
    /// `model` is not given.
    pub async fn connect(
        provider: Arc<dyn Provider>,
        model: Option<String>,
        sampling: ChatSampling,
    ) -> Result<Self, Error> {
        let model = match model.filter(|m| !m.is_empty()) {
            Some(model) => model,
            None => {
                let models = provider.list_models().await?;
                let first = models.into_iter().next().ok_or_else(|| {
                    Error::config(format!(
                        "no model configured and {} lists no models",
                        provider.name()
                    ))
                })?;
                debug!(provider = provider.name(), model = %first, "Resolved model from listing");
                first
            }
        };

        Ok(Self {
            provider,
            model,
            sampling,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn sampling(&self) -> &ChatSampling {
        &self.sampling
    }

    fn request(&self, messages: &[Message], sampling: &SamplingParams) -> CompletionRequest {
        sampling.apply(CompletionRequest::new(messages.to_vec()).with_model(&self.model))
    }

    pub async fn stream_chat(&self, messages: &[Message]) -> Result<TextStream, Error> {
        let request = self
            .request(messages, &self.sampling.stream)
            .with_stream(true);
        let chunks = self.provider.stream(request).await?;

        let fragments = chunks.filter_map(|chunk| async move {
            match chunk {
                Ok(StreamChunk::Delta { content }) if !content.is_empty() => Some(Ok(content)),
                Ok(StreamChunk::Error { message }) => Some(Err(Error::stream(message))),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            }
        });

        Ok(Box::pin(fragments))
    }

    /// Stream a completion and collect it into one string.
    pub async fn stream_text(&self, messages: &[Message]) -> Result<String, Error> {
        let mut fragments = self.stream_chat(messages).await?;
        let mut text = String::new();
        while let Some(fragment) = fragments.next().await {
            text.push_str(&fragment?);
        }
        debug!(chars = text.chars().count(), "Response: {}", text);
        Ok(text)
    }

    pub async fn chat(&self, messages: &[Message]) -> Result<String, Error> {
        let request = self.request(messages, &self.sampling.chat).with_stream(false);
        let response = self.provider.complete(request).await?;
        Ok(response.message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockProvider;

    #[tokio::test]
    async fn test_connect_uses_configured_model() {
        let provider = Arc::new(MockProvider::new().with_models(vec!["listed"]));
        let client = ChatClient::connect(provider.clone(), Some("pinned".into()), ChatSampling::default())
            .await
            .unwrap();
        assert_eq!(client.model(), "pinned");
    }

    #[tokio::test]
    async fn test_connect_resolves_first_listed_model() {
        let provider = Arc::new(MockProvider::new().with_models(vec!["first", "second"]));
        let client = ChatClient::connect(provider, None, ChatSampling::default())
            .await
            .unwrap();
        assert_eq!(client.model(), "first");
    }

    #[tokio::test]
    async fn test_connect_empty_listing_is_config_error() {
        let provider = Arc::new(MockProvider::new().with_models(Vec::<String>::new()));
        let err = ChatClient::connect(provider, None, ChatSampling::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_stream_text_joins_fragments_with_stream_sampling() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_response("hello streamed world");
        let client = ChatClient::connect(provider.clone(), Some("m".into()), ChatSampling::default())
            .await
            .unwrap();

        let text = client.stream_text(&[Message::user("hi")]).await.unwrap();
        assert_eq!(text, "hello streamed world");

        let request = provider.last_request().unwrap();
        assert!(request.stream);
        assert_eq!(request.model.as_deref(), Some("m"));
        assert_eq!(request.max_tokens, Some(2048));
        assert_eq!(request.frequency_penalty, Some(1.05));
    }

    #[tokio::test]
    async fn test_chat_uses_plain_sampling() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_response("plain answer");
        let client = ChatClient::connect(provider.clone(), Some("m".into()), ChatSampling::default())
            .await
            .unwrap();

        let text = client.chat(&[Message::user("hi")]).await.unwrap();
        assert_eq!(text, "plain answer");

        let request = provider.last_request().unwrap();
        assert!(!request.stream);
        assert_eq!(request.max_tokens, Some(1024));
        assert_eq!(request.frequency_penalty, Some(0.7));
    }

    #[tokio::test]
    async fn test_stream_text_empty_response() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_response("");
        let client = ChatClient::connect(provider, Some("m".into()), ChatSampling::default())
            .await
            .unwrap();
        assert_eq!(client.stream_text(&[Message::user("hi")]).await.unwrap(), "");
    }
}
