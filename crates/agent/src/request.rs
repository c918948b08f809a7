//! Transcript → backend request.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;
use skimmer_core::{Attachment, Message, Role, ToolCall};
use skimmer_providers::{ChatRequest, WireMessage, WireToolCall};
use tracing::{debug, error};

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "webp"];

fn is_image(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Transcript copy carrying `calls` on a synthetic assistant message, placed
/// right before the trailing run of tool results.
pub fn with_pending_calls(messages: &[Message], calls: &[ToolCall], model: &str) -> Vec<Message> {
    let mut synthetic = Message::assistant("", model);
    synthetic.tool_calls = calls.to_vec();

    let insert_at = messages
        .iter()
        .rposition(|m| m.role != Role::Tool)
        .map(|i| i + 1)
        .unwrap_or(0);

    let mut out = Vec::with_capacity(messages.len() + 1);
    out.extend_from_slice(&messages[..insert_at]);
    out.push(synthetic);
    out.extend_from_slice(&messages[insert_at..]);
    out
}

fn attachment_text(attachment: &Attachment) -> String {
    match STANDARD.decode(attachment.data.as_bytes()) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => attachment.data.clone(),
    }
}

fn wire_tool_calls(calls: &[ToolCall]) -> Vec<WireToolCall> {
    calls
        .iter()
        .filter_map(|call| match serde_json::from_str::<Value>(&call.function.arguments) {
            Ok(args) => Some(WireToolCall::new(call.name(), args)),
            Err(e) => {
                error!(
                    function_name = %call.name(),
                    arguments = %call.function.arguments,
                    error = %e,
                    "Failed to parse tool call arguments"
                );
                None
            }
        })
        .collect()
}

/// Wire form of one message; `None` for messages that carry nothing.
pub fn to_wire(message: &Message) -> Option<WireMessage> {
    if message.is_blank() {
        return None;
    }

    let mut wire = WireMessage::new(message.role.as_str(), &message.content);
    wire.thinking = message.thinking.clone();

    match message.role {
        Role::User => {
            for attachment in &message.attachments {
                if is_image(&attachment.filename) {
                    wire.images.push(attachment.data.clone());
                } else {
                    wire.content.push_str(&format!(
                        "\n--- File: {name} ---\n{}\n--- End of {name} ---",
                        attachment_text(attachment),
                        name = attachment.filename
                    ));
                }
            }
        }
        Role::Assistant => wire.tool_calls = wire_tool_calls(&message.tool_calls),
        Role::Tool => wire.tool_name = message.tool_name.clone(),
        Role::System => {}
    }
    Some(wire)
}

pub fn build_chat_request(messages: &[Message], model: &str, think: bool, tools: Vec<Value>) -> ChatRequest {
    let messages: Vec<WireMessage> = messages.iter().filter_map(to_wire).collect();
    debug!(model, messages = messages.len(), tools = tools.len(), "Built chat request");
    ChatRequest {
        model: model.to_string(),
        messages,
        tools,
        think: think.then_some(true),
    }
}
