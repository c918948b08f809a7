//! Chat persistence.
//!
//! The orchestrator writes through [`ChatStore`] after every streamed chunk,
//! so implementations must be cheap for `update_last_message`. Concurrent
//! writers to the same chat id are not serialized here.

pub mod file;
pub mod memory;

use serde_json::Value;
use skimmer_core::{Chat, Message, Result};

pub use file::FileChatStore;
pub use memory::MemoryChatStore;

pub trait ChatStore: Send + Sync {
    fn append_message(&self, chat_id: &str, message: &Message) -> Result<()>;

    /// Replaces the newest message of the chat.
    fn update_last_message(&self, chat_id: &str, message: &Message) -> Result<()>;

    fn set_browser_state(&self, chat_id: &str, state: &Value) -> Result<()>;

    /// `None` when the chat does not exist. Attachment payloads are dropped
    /// unless `include_attachments` is set; file names are always kept.
    fn load_chat(&self, chat_id: &str, include_attachments: bool) -> Result<Option<Chat>>;

    /// Writes the whole chat, replacing anything stored under its id.
    fn save_chat(&self, chat: &Chat) -> Result<()>;
}

pub(crate) fn strip_attachment_data(chat: &mut Chat) {
    for message in &mut chat.messages {
        for attachment in &mut message.attachments {
            attachment.data.clear();
        }
    }
}
