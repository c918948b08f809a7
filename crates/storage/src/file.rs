use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use skimmer_core::{Chat, Error, Message, Paths, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use tracing::{debug, warn};

use crate::{strip_attachment_data, ChatStore};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_type")]
enum ChatLine {
    #[serde(rename = "metadata")]
    Metadata {
        id: String,
        #[serde(default)]
        title: String,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        browser_state: Option<Value>,
    },
    /// Replaces the message before it; folded in on load.
    #[serde(rename = "update_last")]
    UpdateLast { message: Box<Message> },
    #[serde(rename = "browser_state")]
    BrowserState { state: Value },
    #[serde(untagged)]
    Message(Box<Message>),
}

/// One JSONL file per chat: a metadata line followed by one line per message.
///
/// Streaming updates and browser snapshots are appended as records and folded
/// in on load; `save_chat` rewrites the file compacted. Lines that fail to
/// parse are never rewritten into the chat file: a compaction moves them,
/// byte for byte, to `<id>.jsonl.unparsed`.
pub struct FileChatStore {
    paths: Paths,
}

impl FileChatStore {
    pub fn new(paths: Paths) -> Self {
        Self { paths }
    }

    fn read(&self, chat_id: &str) -> Result<Option<Chat>> {
        let path = self.paths.chat_file(chat_id);
        if !path.exists() {
            return Ok(None);
        }

        let reader = BufReader::new(File::open(&path)?);
        let mut chat = Chat::new(chat_id);
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ChatLine>(&line) {
                Ok(ChatLine::Message(msg)) => chat.messages.push(*msg),
                Ok(ChatLine::UpdateLast { message }) => match chat.last_message_mut() {
                    Some(last) => *last = *message,
                    None => warn!(chat_id, "Update record before any message, skipping"),
                },
                Ok(ChatLine::BrowserState { state }) => chat.browser_state = Some(state),
                Ok(ChatLine::Metadata { title, created_at, browser_state, .. }) => {
                    chat.title = title;
                    chat.created_at = created_at;
                    chat.browser_state = browser_state;
                }
                Err(e) => {
                    warn!(chat_id, error = %e, "Failed to parse chat line, skipping");
                }
            }
        }
        Ok(Some(chat))
    }

    fn write(&self, chat: &Chat) -> Result<()> {
        let path = self.paths.chat_file(&chat.id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        set_aside_unparsed(&path)?;

        // Written aside and renamed so a crash never leaves a truncated chat.
        let tmp = path.with_extension("jsonl.tmp");
        {
            let mut file = File::create(&tmp)?;
            writeln!(file, "{}", serde_json::to_string(&metadata_line(chat))?)?;
            for msg in &chat.messages {
                writeln!(file, "{}", serde_json::to_string(msg)?)?;
            }
            file.flush()?;
        }
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Appends one record to an existing chat file.
    fn append_line(&self, chat_id: &str, line: &ChatLine) -> Result<()> {
        let path = self.paths.chat_file(chat_id);
        if !path.exists() {
            return Err(Error::NotFound(format!("chat {}", chat_id)));
        }
        let mut file = OpenOptions::new().append(true).open(&path)?;
        writeln!(file, "{}", serde_json::to_string(line)?)?;
        Ok(())
    }
}

/// Copies lines of `path` that do not parse to the `.unparsed` sidecar.
fn set_aside_unparsed(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    let mut unparsed = Vec::new();
    for line in BufReader::new(File::open(path)?).lines() {
        let line = line?;
        if !line.trim().is_empty() && serde_json::from_str::<ChatLine>(&line).is_err() {
            unparsed.push(line);
        }
    }
    if unparsed.is_empty() {
        return Ok(());
    }

    let aside = path.with_extension("jsonl.unparsed");
    warn!(path = %path.display(), lines = unparsed.len(), "Moving unparsed chat lines aside");
    let mut file = OpenOptions::new().create(true).append(true).open(&aside)?;
    for line in &unparsed {
        writeln!(file, "{}", line)?;
    }
    file.flush()?;
    Ok(())
}

fn metadata_line(chat: &Chat) -> ChatLine {
    ChatLine::Metadata {
        id: chat.id.clone(),
        title: chat.title.clone(),
        created_at: chat.created_at,
        updated_at: Utc::now(),
        browser_state: chat.browser_state.clone(),
    }
}

impl ChatStore for FileChatStore {
    fn append_message(&self, chat_id: &str, message: &Message) -> Result<()> {
        let path = self.paths.chat_file(chat_id);
        if !path.exists() {
            debug!(chat_id, "Creating chat file");
            self.write(&Chat::new(chat_id))?;
        }

        let mut file = OpenOptions::new().append(true).open(&path)?;
        writeln!(file, "{}", serde_json::to_string(message)?)?;
        Ok(())
    }

    fn update_last_message(&self, chat_id: &str, message: &Message) -> Result<()> {
        self.append_line(chat_id, &ChatLine::UpdateLast { message: Box::new(message.clone()) })
    }

    fn set_browser_state(&self, chat_id: &str, state: &Value) -> Result<()> {
        self.append_line(chat_id, &ChatLine::BrowserState { state: state.clone() })
    }

    fn load_chat(&self, chat_id: &str, include_attachments: bool) -> Result<Option<Chat>> {
        let mut chat = self.read(chat_id)?;
        if !include_attachments {
            if let Some(chat) = chat.as_mut() {
                strip_attachment_data(chat);
            }
        }
        Ok(chat)
    }

    fn save_chat(&self, chat: &Chat) -> Result<()> {
        self.write(chat)
    }
}
