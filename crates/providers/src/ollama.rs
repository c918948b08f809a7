use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use skimmer_core::{Config, Error, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::client::build_http_client;
use crate::{ChatBackend, ChatChunk, ChatRequest, ChunkStream, WireToolCall};

/// Streams `/api/chat` responses from an Ollama server.
pub struct OllamaBackend {
    client: Client,
    api_base: String,
}

impl OllamaBackend {
    pub fn new(client: Client, api_base: &str) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let api_base = config.ollama_base();
        let own_proxy = config.get_provider("ollama").and_then(|p| p.proxy.as_deref());
        let client = build_http_client(
            own_proxy,
            &config.network,
            &api_base,
            Duration::from_secs(config.agents.defaults.request_timeout_secs),
        )?;
        Ok(Self::new(client, &api_base))
    }

    /// Config may store "ollama/llama3" but the API expects "llama3".
    fn normalize_model(model: &str) -> &str {
        model.strip_prefix("ollama/").unwrap_or(model)
    }

    fn request_body(request: &ChatRequest) -> serde_json::Value {
        let mut body = json!({
            "model": Self::normalize_model(&request.model),
            "messages": request.messages,
            "stream": true,
        });
        if !request.tools.is_empty() {
            body["tools"] = json!(request.tools);
        }
        if let Some(think) = request.think {
            body["think"] = json!(think);
        }
        body
    }
}

#[derive(Debug, Deserialize)]
struct StreamLine {
    #[serde(default)]
    message: Option<StreamMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamMessage {
    #[serde(default)]
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    thinking: String,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

/// Decodes one NDJSON line. Blank lines yield `None`.
fn decode_line(line: &str) -> Result<Option<ChatChunk>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let parsed: StreamLine = serde_json::from_str(line)
        .map_err(|e| Error::Provider(format!("malformed stream line: {}", e)))?;
    if let Some(err) = parsed.error {
        return Err(Error::Provider(err));
    }
    let mut chunk = ChatChunk {
        done: parsed.done,
        ..Default::default()
    };
    if let Some(msg) = parsed.message {
        chunk.role = msg.role;
        chunk.content = msg.content;
        chunk.thinking = msg.thinking;
        chunk.tool_calls = msg.tool_calls;
    }
    Ok(Some(chunk))
}

/// Splits a byte stream into complete lines. Bytes are buffered until a
/// newline arrives so multi-byte characters are never cut.
#[derive(Default)]
struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            None
        } else {
            let rest = std::mem::take(&mut self.buf);
            Some(String::from_utf8_lossy(&rest).into_owned())
        }
    }
}

#[async_trait]
impl ChatBackend for OllamaBackend {
    async fn stream_chat(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChunkStream> {
        let url = format!("{}/api/chat", self.api_base);
        let body = Self::request_body(&request);

        info!(
            url = %url,
            model = %request.model,
            tools_count = request.tools.len(),
            messages_count = request.messages.len(),
            "Calling Ollama API"
        );

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Ollama request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let raw_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %raw_body, "Ollama API error");
            return Err(Error::Provider(format!("Ollama API error {}: {}", status, raw_body)));
        }

        let mut bytes = response.bytes_stream();
        let stream = try_stream! {
            let mut lines = LineBuffer::default();
            while let Some(piece) = bytes.next().await {
                if cancel.is_cancelled() {
                    debug!("Ollama stream cancelled");
                    break;
                }
                let piece = piece.map_err(|e| Error::Provider(format!("Ollama stream failed: {}", e)))?;
                for line in lines.push(&piece) {
                    if let Some(chunk) = decode_line(&line)? {
                        yield chunk;
                    }
                }
            }
            if !cancel.is_cancelled() {
                if let Some(rest) = lines.finish() {
                    if let Some(chunk) = decode_line(&rest)? {
                        yield chunk;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WireMessage;

    #[test]
    fn test_normalize_model() {
        assert_eq!(OllamaBackend::normalize_model("ollama/llama3"), "llama3");
        assert_eq!(OllamaBackend::normalize_model("qwen2.5:7b"), "qwen2.5:7b");
    }

    #[test]
    fn test_request_body_streams_and_sends_think_only_when_set() {
        let mut req = ChatRequest {
            model: "ollama/gpt-oss:20b".to_string(),
            messages: vec![WireMessage::new("user", "hi")],
            tools: vec![],
            think: None,
        };
        let body = OllamaBackend::request_body(&req);
        assert_eq!(body["model"], "gpt-oss:20b");
        assert_eq!(body["stream"], true);
        assert!(body.get("think").is_none());
        assert!(body.get("tools").is_none());

        req.think = Some(true);
        req.tools = vec![json!({"type": "function", "function": {"name": "browser.find"}})];
        let body = OllamaBackend::request_body(&req);
        assert_eq!(body["think"], true);
        assert_eq!(body["tools"][0]["function"]["name"], "browser.find");
    }

    #[test]
    fn test_decode_thinking_and_tool_calls() {
        let chunk = decode_line(r#"{"model":"m","message":{"role":"assistant","content":"","thinking":"Let me look"},"done":false}"#)
            .unwrap()
            .unwrap();
        assert_eq!(chunk.thinking, "Let me look");
        assert!(chunk.content.is_empty());

        let chunk = decode_line(
            r#"{"message":{"role":"assistant","content":"","tool_calls":[{"function":{"name":"browser.search","arguments":{"query":"rust"}}}]},"done":false}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(chunk.tool_calls.len(), 1);
        assert_eq!(chunk.tool_calls[0].function.name, "browser.search");
        assert_eq!(chunk.tool_calls[0].function.arguments["query"], "rust");
    }

    #[test]
    fn test_decode_error_and_blank() {
        assert!(decode_line("   ").unwrap().is_none());
        let err = decode_line(r#"{"error":"model not found"}"#).unwrap_err();
        assert!(err.to_string().contains("model not found"));
        let done = decode_line(r#"{"done":true}"#).unwrap().unwrap();
        assert!(done.done);
        assert!(done.is_empty());
    }

    #[test]
    fn test_line_buffer_keeps_split_utf8() {
        let mut buf = LineBuffer::default();
        let text = "{\"message\":{\"content\":\"héllo\"}}\n";
        let bytes = text.as_bytes();
        let split = text.find('é').unwrap() + 1;
        assert!(buf.push(&bytes[..split]).is_empty());
        let lines = buf.push(&bytes[split..]);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("héllo"));
        assert!(buf.finish().is_none());

        assert!(buf.push(b"{\"done\":true}").is_empty());
        assert_eq!(buf.finish().as_deref(), Some("{\"done\":true}"));
    }
}
