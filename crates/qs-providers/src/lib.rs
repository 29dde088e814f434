//! qs-providers: chat-completion backends for quick-search
//!
//! Implements the `Provider` trait for OpenAI-compatible servers (vLLM,
//! hosted OpenAI-style APIs).

pub mod openai;

pub use openai::OpenAIProvider;
