//! qs-core: Core types and traits for quick-search
//!
//! This crate provides the foundational types shared by the research
//! agents: chat messages, the provider seam and chat client, the tool
//! registry, directive parsing, the shared result record and the TTL cache.

pub mod cache;
pub mod chat;
pub mod directive;
pub mod error;
pub mod message;
pub mod provider;
pub mod record;
pub mod tool;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cache::TtlCache;
pub use chat::{ChatClient, ChatSampling, SamplingParams, TextStream};
pub use directive::{parse_directive, string_list, Directive, ToolCall};
pub use error::Error;
pub use message::{Message, Role, StreamChunk, Usage};
pub use provider::{CompletionRequest, CompletionResponse, FinishReason, Provider, StreamResult};
pub use record::{ResultRecord, SharedRecord, FAILURE_ANSWER};
pub use tool::{Tool, ToolDefinition, ToolParameter, ToolRegistry};

pub type Result<T> = std::result::Result<T, Error>;
