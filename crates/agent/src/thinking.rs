//! Chunk classification and the thinking window.

use chrono::{DateTime, Utc};
use skimmer_core::Message;
use skimmer_providers::ChatChunk;

/// How a streamed chunk is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Thinking,
    Chat,
    ToolCall,
}

/// Start/end of the current thinking window.
///
/// Closed (neither set) → open (start only) → closed (both set). A closed
/// window with both stamps reopens on the next thinking chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThinkingTimer {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

impl ThinkingTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.start
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    pub fn stamps(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        (self.start, self.end)
    }

    pub fn is_open(&self) -> bool {
        self.start.is_some() && self.end.is_none()
    }

    /// Classifies `chunk` and moves the window. Chunks with nothing in them
    /// yield `None`.
    pub fn classify(&mut self, chunk: &ChatChunk) -> Option<ChunkKind> {
        if !chunk.thinking.is_empty() && (self.start.is_none() || self.end.is_some()) {
            self.start = Some(Utc::now());
            self.end = None;
        }
        if chunk.is_empty() {
            return None;
        }

        let kind = if !chunk.tool_calls.is_empty() {
            ChunkKind::ToolCall
        } else if self.start.is_some() && chunk.content.is_empty() {
            ChunkKind::Thinking
        } else {
            ChunkKind::Chat
        };

        let closes = match kind {
            ChunkKind::ToolCall => true,
            ChunkKind::Chat => !chunk.content.is_empty(),
            ChunkKind::Thinking => false,
        };
        if closes && self.is_open() {
            self.end = Some(Utc::now());
        }
        Some(kind)
    }

    /// Closes an open window at the current time. Returns the end stamp if
    /// this call closed it.
    pub fn close_now(&mut self) -> Option<DateTime<Utc>> {
        if !self.is_open() {
            return None;
        }
        let now = Utc::now();
        self.end = Some(now);
        Some(now)
    }

    pub fn reset(&mut self) {
        self.start = None;
        self.end = None;
    }

    /// Copies whichever stamps are set onto `message`.
    pub fn stamp(&self, message: &mut Message) {
        if let Some(start) = self.start {
            message.thinking_time_start = Some(start);
        }
        if let Some(end) = self.end {
            message.thinking_time_end = Some(end);
        }
    }
}
