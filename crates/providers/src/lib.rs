pub mod client;
pub mod ollama;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use skimmer_core::Result;
use tokio_util::sync::CancellationToken;

pub use client::build_http_client;
pub use ollama::OllamaBackend;

/// A tool call on the wire. Arguments are a JSON object, not a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireToolCall {
    pub function: WireFunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl WireToolCall {
    pub fn new(name: &str, arguments: Value) -> Self {
        Self {
            function: WireFunctionCall {
                name: name.to_string(),
                arguments,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub thinking: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<WireToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Base64 encoded images.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl WireMessage {
    pub fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
            thinking: String::new(),
            tool_calls: Vec::new(),
            tool_name: None,
            images: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    /// Function schemas, `{"type":"function","function":{...}}`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub think: Option<bool>,
}

/// One incremental response from the backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatChunk {
    pub role: String,
    pub content: String,
    pub thinking: String,
    pub tool_calls: Vec<WireToolCall>,
    pub done: bool,
}

impl ChatChunk {
    pub fn content(text: &str) -> Self {
        Self {
            role: "assistant".to_string(),
            content: text.to_string(),
            ..Default::default()
        }
    }

    pub fn thinking(text: &str) -> Self {
        Self {
            role: "assistant".to_string(),
            thinking: text.to_string(),
            ..Default::default()
        }
    }

    pub fn tool_calls(calls: Vec<WireToolCall>) -> Self {
        Self {
            role: "assistant".to_string(),
            tool_calls: calls,
            ..Default::default()
        }
    }

    /// No content, no thinking, no tool calls.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.thinking.is_empty() && self.tool_calls.is_empty()
    }
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatChunk>> + Send>>;

/// Streaming inference backend.
///
/// Implementations should stop yielding once `cancel` fires.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn stream_chat(&self, request: ChatRequest, cancel: CancellationToken)
        -> Result<ChunkStream>;
}
