use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
            Role::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool call as recorded in the transcript:
/// `{type: "function", function: {name, arguments}}` where `arguments` is a JSON string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(rename = "type", default = "default_tool_call_type")]
    pub kind: String,
    pub function: ToolFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFunction {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

fn default_tool_call_type() -> String {
    "function".to_string()
}

impl ToolCall {
    pub fn function(name: &str, arguments: &Value) -> Self {
        Self {
            kind: default_tool_call_type(),
            function: ToolFunction {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }
}

/// A file attached to a user message. `data` is base64 encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    #[serde(default)]
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub thinking: String,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(
        rename = "thinkingTimeStart",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub thinking_time_start: Option<DateTime<Utc>>,
    #[serde(
        rename = "thinkingTimeEnd",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub thinking_time_end: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(role: Role, content: &str) -> Self {
        let now = Utc::now();
        Self {
            role,
            content: content.to_string(),
            thinking: String::new(),
            stream: false,
            model: None,
            attachments: Vec::new(),
            tool_calls: Vec::new(),
            tool_name: None,
            tool_result: None,
            created_at: now,
            updated_at: now,
            thinking_time_start: None,
            thinking_time_end: None,
        }
    }

    pub fn user(content: &str) -> Self {
        Self::new(Role::User, content)
    }

    pub fn system(content: &str) -> Self {
        Self::new(Role::System, content)
    }

    pub fn assistant(content: &str, model: &str) -> Self {
        let mut msg = Self::new(Role::Assistant, content);
        msg.model = Some(model.to_string());
        msg
    }

    /// A tool result message. `tool_result` carries the structured payload, if any.
    pub fn tool(name: &str, content: &str, tool_result: Option<Value>) -> Self {
        let mut msg = Self::new(Role::Tool, content);
        msg.tool_name = Some(name.to_string());
        msg.tool_result = tool_result;
        msg
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    /// True when the message would carry nothing to the model.
    pub fn is_blank(&self) -> bool {
        self.content.is_empty()
            && self.thinking.is_empty()
            && self.tool_calls.is_empty()
            && self.attachments.is_empty()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// A conversation: the transcript plus the persisted browser-state snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_state: Option<Value>,
}

impl Chat {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            title: String::new(),
            messages: Vec::new(),
            created_at: Utc::now(),
            browser_state: None,
        }
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn last_message_mut(&mut self) -> Option<&mut Message> {
        self.messages.last_mut()
    }

    pub fn last_is_assistant(&self) -> bool {
        self.messages.last().map(Message::is_assistant).unwrap_or(false)
    }
}
