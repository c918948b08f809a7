use serde_json::Value;
use skimmer_core::{Chat, Error, Message, Result};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::{strip_attachment_data, ChatStore};

/// Process-local store, used for one-off runs and tests.
#[derive(Default)]
pub struct MemoryChatStore {
    chats: Mutex<HashMap<String, Chat>>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Chat>>> {
        self.chats
            .lock()
            .map_err(|_| Error::Storage("chat store lock poisoned".to_string()))
    }
}

impl ChatStore for MemoryChatStore {
    fn append_message(&self, chat_id: &str, message: &Message) -> Result<()> {
        self.lock()?
            .entry(chat_id.to_string())
            .or_insert_with(|| Chat::new(chat_id))
            .messages
            .push(message.clone());
        Ok(())
    }

    fn update_last_message(&self, chat_id: &str, message: &Message) -> Result<()> {
        let mut chats = self.lock()?;
        let chat = chats
            .get_mut(chat_id)
            .ok_or_else(|| Error::NotFound(format!("chat {}", chat_id)))?;
        let last = chat
            .last_message_mut()
            .ok_or_else(|| Error::Storage(format!("chat {} has no message to update", chat_id)))?;
        *last = message.clone();
        Ok(())
    }

    fn set_browser_state(&self, chat_id: &str, state: &Value) -> Result<()> {
        let mut chats = self.lock()?;
        let chat = chats
            .get_mut(chat_id)
            .ok_or_else(|| Error::NotFound(format!("chat {}", chat_id)))?;
        chat.browser_state = Some(state.clone());
        Ok(())
    }

    fn load_chat(&self, chat_id: &str, include_attachments: bool) -> Result<Option<Chat>> {
        let mut chat = self.lock()?.get(chat_id).cloned();
        if !include_attachments {
            if let Some(chat) = chat.as_mut() {
                strip_attachment_data(chat);
            }
        }
        Ok(chat)
    }

    fn save_chat(&self, chat: &Chat) -> Result<()> {
        self.lock()?.insert(chat.id.clone(), chat.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_round_trip_through_trait_object() {
        let store: Box<dyn ChatStore> = Box::new(MemoryChatStore::new());
        store.append_message("c", &Message::user("hi")).unwrap();
        store.append_message("c", &Message::assistant("", "m")).unwrap();
        store.update_last_message("c", &Message::assistant("done", "m")).unwrap();
        store.set_browser_state("c", &json!({"pageStack": []})).unwrap();

        let chat = store.load_chat("c", false).unwrap().unwrap();
        assert_eq!(chat.messages.len(), 2);
        assert_eq!(chat.messages[1].content, "done");
        assert!(chat.browser_state.is_some());
    }

    #[test]
    fn test_errors_for_unknown_chat() {
        let store = MemoryChatStore::new();
        assert!(store.load_chat("x", true).unwrap().is_none());
        assert!(store.set_browser_state("x", &json!({})).is_err());
        store.save_chat(&Chat::new("y")).unwrap();
        assert!(matches!(
            store.update_last_message("y", &Message::user("z")),
            Err(Error::Storage(_))
        ));
    }
}
