//! Events streamed to the caller, one JSON object per line.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use skimmer_core::{Result, ToolCall};
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventName {
    ChatCreated,
    Chat,
    Thinking,
    Tool,
    ToolResult,
    AssistantWithTools,
    Done,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEvent {
    pub event_name: EventName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_state: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_time_start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_time_end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

impl ChatEvent {
    pub fn new(event_name: EventName) -> Self {
        Self {
            event_name,
            chat_id: None,
            content: None,
            thinking: None,
            tool_calls: Vec::new(),
            tool_name: None,
            tool_result: None,
            tool_result_data: None,
            tool_state: None,
            thinking_time_start: None,
            thinking_time_end: None,
            error: None,
        }
    }

    pub fn chat_created(chat_id: &str) -> Self {
        Self {
            chat_id: Some(chat_id.to_string()),
            ..Self::new(EventName::ChatCreated)
        }
    }

    pub fn done() -> Self {
        Self::new(EventName::Done)
    }

    pub fn error(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Self::new(EventName::Error)
        }
    }

    /// An incremental model chunk. Empty text fields are left out.
    pub fn chunk(
        event_name: EventName,
        content: &str,
        thinking: &str,
        tool_calls: Vec<ToolCall>,
        thinking_time: (Option<DateTime<Utc>>, Option<DateTime<Utc>>),
    ) -> Self {
        Self {
            content: non_empty(content),
            thinking: non_empty(thinking),
            tool_calls,
            thinking_time_start: thinking_time.0,
            thinking_time_end: thinking_time.1,
            ..Self::new(event_name)
        }
    }

    pub fn tool(tool_name: &str, content: &str) -> Self {
        Self {
            content: Some(content.to_string()),
            tool_name: Some(tool_name.to_string()),
            ..Self::new(EventName::Tool)
        }
    }

    pub fn tool_result(tool_name: &str, content: &str, data: Option<Value>, state: Option<Value>) -> Self {
        Self {
            content: Some(content.to_string()),
            tool_name: Some(tool_name.to_string()),
            tool_result: Some(true),
            tool_result_data: data,
            tool_state: state,
            ..Self::new(EventName::ToolResult)
        }
    }
}

/// Destination of the event stream. Each event must be delivered (flushed)
/// before `emit` returns.
pub trait EventSink: Send {
    fn emit(&mut self, event: &ChatEvent) -> Result<()>;
}

/// Newline-delimited JSON over any writer.
pub struct JsonLinesSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> EventSink for JsonLinesSink<W> {
    fn emit(&mut self, event: &ChatEvent) -> Result<()> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

impl EventSink for Vec<ChatEvent> {
    fn emit(&mut self, event: &ChatEvent) -> Result<()> {
        self.push(event.clone());
        Ok(())
    }
}
