//! Display-time repairs for stored chats. Nothing here is persisted.

use skimmer_core::config::default_view_tokens;
use skimmer_core::{Chat, Message, Role};
use skimmer_tools::browser::BrowserState;

/// Gives every nameless tool message the name of the last call on the
/// nearest preceding assistant message that made calls.
pub fn backfill_tool_names(messages: &mut [Message]) {
    let mut last_call: Option<String> = None;
    for message in messages.iter_mut() {
        match message.role {
            Role::Assistant => {
                if let Some(call) = message.tool_calls.last() {
                    last_call = Some(call.name().to_string());
                }
            }
            Role::Tool => {
                let missing = message.tool_name.as_deref().map(str::is_empty).unwrap_or(true);
                if missing {
                    if let Some(name) = &last_call {
                        message.tool_name = Some(name.clone());
                    }
                }
            }
            _ => {}
        }
    }
}

/// The chat as shown to a reader: tool names backfilled and the recovered
/// browser state attached without cached page bodies.
pub fn display_chat(mut chat: Chat) -> Chat {
    backfill_tool_names(&mut chat.messages);
    let state = chat
        .browser_state
        .as_ref()
        .and_then(BrowserState::from_snapshot)
        .or_else(|| BrowserState::from_transcript(&chat.messages, default_view_tokens()));
    if let Some(state) = state {
        if let Ok(stripped) = serde_json::to_value(state.stripped()) {
            chat.browser_state = Some(stripped);
        }
    }
    chat
}
