use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::StreamExt;
use serde::Deserialize;
use skimmer_core::config::{AgentDefaults, WebToolsConfig};
use skimmer_core::{Attachment, Chat, Config, Error, Message, Result};
use skimmer_providers::{ChatBackend, ChatChunk};
use skimmer_storage::ChatStore;
use skimmer_tools::web::WebProvider;
use skimmer_tools::ToolContext;
use std::borrow::Cow;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::coordinator::PendingToolCalls;
use crate::events::{ChatEvent, EventName, EventSink};
use crate::request::{build_chat_request, with_pending_calls};
use crate::setup::TurnTools;
use crate::thinking::{ChunkKind, ThinkingTimer};

/// One user turn as received from the caller.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    /// Existing chat id, or `"new"` (or empty) to start a chat.
    #[serde(default)]
    pub chat_id: String,
    pub model: String,
    pub prompt: String,
    #[serde(default)]
    pub think: Option<bool>,
    #[serde(default)]
    pub web_search: bool,
    /// Editing: the user message at this index and everything after it is
    /// replaced.
    #[serde(default)]
    pub index: Option<usize>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnSummary {
    pub chat_id: String,
    pub passes: u32,
    pub cancelled: bool,
    pub hit_pass_limit: bool,
}

/// Per-turn working state. Owns the transcript until the final save.
pub(crate) struct Turn<'a> {
    pub(crate) chat: Chat,
    pub(crate) model: String,
    pub(crate) think: bool,
    pub(crate) tools: TurnTools,
    pub(crate) timer: ThinkingTimer,
    pub(crate) pending: PendingToolCalls,
    pub(crate) store: &'a dyn ChatStore,
    pub(crate) ctx: ToolContext,
    sink: &'a mut dyn EventSink,
}

impl<'a> Turn<'a> {
    pub(crate) fn new(
        chat: Chat,
        model: &str,
        think: bool,
        tools: TurnTools,
        store: &'a dyn ChatStore,
        sink: &'a mut dyn EventSink,
        cancel: CancellationToken,
    ) -> Self {
        let ctx = ToolContext {
            chat_id: chat.id.clone(),
            cancel,
        };
        Self {
            chat,
            model: model.to_string(),
            think,
            tools,
            timer: ThinkingTimer::new(),
            pending: PendingToolCalls::default(),
            store,
            ctx,
            sink,
        }
    }

    pub(crate) fn emit(&mut self, event: ChatEvent) {
        if let Err(e) = self.sink.emit(&event) {
            warn!(chat_id = %self.chat.id, error = %e, "Failed to deliver event");
        }
    }

    /// Appends to the transcript and persists the new message.
    pub(crate) fn append(&mut self, message: Message) {
        if let Err(e) = self.store.append_message(&self.chat.id, &message) {
            warn!(chat_id = %self.chat.id, error = %e, "Failed to persist new message");
        }
        self.chat.messages.push(message);
    }

    pub(crate) fn persist_last(&self) {
        let Some(last) = self.chat.last_message() else {
            return;
        };
        if let Err(e) = self.store.update_last_message(&self.chat.id, last) {
            warn!(chat_id = %self.chat.id, error = %e, "Failed to persist message update");
        }
    }

    /// Makes sure the transcript ends with an assistant message. A new one
    /// adopts any pending tool calls. Returns whether a message was created.
    fn ensure_assistant(&mut self, thinking: &str) -> bool {
        if self.chat.last_is_assistant() {
            return false;
        }
        let mut message = Message::assistant("", &self.model);
        message.thinking = thinking.to_string();
        message.stream = true;
        message.tool_calls = self.pending.take();
        self.timer.stamp(&mut message);
        self.append(message);
        true
    }

    fn on_content(&mut self, content: &str) {
        self.ensure_assistant("");
        if let Some(last) = self.chat.last_message_mut() {
            last.content.push_str(content);
            last.touch();
            self.timer.stamp(last);
        }
        self.persist_last();
    }

    fn on_thinking(&mut self, thinking: &str) {
        if self.ensure_assistant(thinking) {
            return;
        }
        if let Some(last) = self.chat.last_message_mut() {
            last.thinking.push_str(thinking);
            last.touch();
            self.timer.stamp(last);
        }
        self.persist_last();
    }

    /// Closes a thinking window still open at the end of the turn.
    fn close_thinking(&mut self) {
        let Some(end) = self.timer.close_now() else {
            return;
        };
        if let Some(last) = self.chat.last_message_mut().filter(|m| m.is_assistant()) {
            last.thinking_time_end = Some(end);
            last.touch();
            self.persist_last();
        }
    }
}

fn chunk_event(kind: ChunkKind, chunk: &ChatChunk, timer: &ThinkingTimer) -> ChatEvent {
    let (name, tool_calls) = match kind {
        ChunkKind::Thinking => (EventName::Thinking, Vec::new()),
        ChunkKind::Chat => (EventName::Chat, Vec::new()),
        ChunkKind::ToolCall => (
            EventName::AssistantWithTools,
            chunk
                .tool_calls
                .iter()
                .map(|c| skimmer_core::ToolCall::function(&c.function.name, &c.function.arguments))
                .collect(),
        ),
    };
    ChatEvent::chunk(name, &chunk.content, &chunk.thinking, tool_calls, timer.stamps())
}

/// Adds the user message, truncating history when an earlier message is
/// being edited. An attachment sent without data keeps the stored file of
/// the same name.
fn add_user_message(chat: &mut Chat, request: &TurnRequest) {
    let index = request.index.filter(|&i| i < chat.messages.len());
    let mut attachments = Vec::with_capacity(request.attachments.len());
    for attachment in &request.attachments {
        if attachment.data.is_empty() {
            let stored = index.and_then(|i| {
                chat.messages[i]
                    .attachments
                    .iter()
                    .find(|a| a.filename == attachment.filename)
            });
            match stored {
                Some(stored) => attachments.push(stored.clone()),
                None => warn!(filename = %attachment.filename, "Attachment without data, dropping"),
            }
        } else if let Err(e) = STANDARD.decode(attachment.data.as_bytes()) {
            error!(filename = %attachment.filename, error = %e, "Failed to decode attachment data");
        } else {
            attachments.push(attachment.clone());
        }
    }

    if let Some(i) = index {
        debug!(chat_id = %chat.id, index = i, "Truncating history for edit");
        chat.messages.truncate(i);
    }
    let mut user = Message::user(&request.prompt);
    user.attachments = attachments;
    chat.messages.push(user);
}

/// Drives turns: user message in, inference passes until no tool runs,
/// events out.
///
/// Each turn owns its transcript and browser session. Running two turns on
/// the same chat id at once is not guarded here; callers must serialize
/// them.
pub struct ChatOrchestrator {
    backend: Arc<dyn ChatBackend>,
    store: Arc<dyn ChatStore>,
    web: Arc<dyn WebProvider>,
    defaults: AgentDefaults,
    web_config: WebToolsConfig,
}

impl ChatOrchestrator {
    pub fn new(
        config: &Config,
        backend: Arc<dyn ChatBackend>,
        store: Arc<dyn ChatStore>,
        web: Arc<dyn WebProvider>,
    ) -> Self {
        Self {
            backend,
            store,
            web,
            defaults: config.agents.defaults.clone(),
            web_config: config.tools.web.clone(),
        }
    }

    pub async fn handle_request(
        &self,
        request: TurnRequest,
        sink: &mut dyn EventSink,
        cancel: CancellationToken,
    ) -> Result<TurnSummary> {
        if request.model.trim().is_empty() {
            return Err(Error::Validation("model is required".to_string()));
        }
        if request.prompt.trim().is_empty() {
            return Err(Error::Validation("prompt is required".to_string()));
        }

        let chat_id = if request.chat_id.is_empty() || request.chat_id == "new" {
            let id = uuid::Uuid::new_v4().to_string();
            if let Err(e) = sink.emit(&ChatEvent::chat_created(&id)) {
                warn!(chat_id = %id, error = %e, "Failed to deliver event");
            }
            id
        } else {
            request.chat_id.clone()
        };

        let mut chat = self
            .store
            .load_chat(&chat_id, true)?
            .unwrap_or_else(|| Chat::new(&chat_id));
        add_user_message(&mut chat, &request);
        self.store.save_chat(&chat)?;

        let think = request.think.unwrap_or(self.defaults.think);
        let tools = TurnTools::setup(
            &self.web_config,
            self.defaults.view_tokens,
            &chat,
            request.web_search,
            self.web.clone(),
        );
        info!(
            chat_id = %chat_id,
            model = %request.model,
            think,
            tools = ?tools.registry.tool_names(),
            "Starting turn"
        );

        let mut turn = Turn::new(chat, &request.model, think, tools, self.store.as_ref(), sink, cancel);
        let mut summary = self.run_passes(&mut turn).await;
        summary.chat_id = chat_id;
        self.finish(&mut turn, summary.cancelled)?;
        info!(chat_id = %summary.chat_id, passes = summary.passes, cancelled = summary.cancelled, "Turn finished");
        Ok(summary)
    }

    /// Runs passes until one executes no tool, the turn is cancelled, or the
    /// pass ceiling is reached.
    pub(crate) async fn run_passes(&self, turn: &mut Turn<'_>) -> TurnSummary {
        let max_passes = self.defaults.max_passes.max(1);
        let mut summary = TurnSummary::default();
        loop {
            if turn.ctx.cancel.is_cancelled() {
                break;
            }
            if summary.passes >= max_passes {
                warn!(chat_id = %turn.chat.id, max_passes, "Pass limit reached, ending turn");
                summary.hit_pass_limit = true;
                break;
            }
            summary.passes += 1;
            debug!(chat_id = %turn.chat.id, pass = summary.passes, "Starting pass");
            if !self.process_pass(turn).await {
                break;
            }
        }
        summary.cancelled = turn.ctx.cancel.is_cancelled();
        summary
    }

    /// One request/stream cycle. Returns whether any tool was executed.
    async fn process_pass(&self, turn: &mut Turn<'_>) -> bool {
        let messages: Cow<[Message]> = if !turn.pending.is_empty() && !turn.chat.last_is_assistant() {
            let synthesized = with_pending_calls(&turn.chat.messages, turn.pending.calls(), &turn.model);
            turn.pending.mark_sent();
            Cow::Owned(synthesized)
        } else {
            Cow::Borrowed(turn.chat.messages.as_slice())
        };
        let request = build_chat_request(
            &messages,
            &turn.model,
            turn.think,
            turn.tools.registry.available_schemas(),
        );
        drop(messages);

        let cancel = turn.ctx.cancel.clone();
        let mut stream = match self.backend.stream_chat(request, cancel.clone()).await {
            Ok(stream) => stream,
            Err(e) => {
                error!(chat_id = %turn.chat.id, error = %e, "Failed to start chat stream");
                turn.emit(ChatEvent::error(&e.to_string()));
                return false;
            }
        };

        let mut tools_executed = false;
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    info!(chat_id = %turn.chat.id, "Turn cancelled mid-stream");
                    return false;
                }
                next = stream.next() => next,
            };
            let chunk = match next {
                None => break,
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    error!(chat_id = %turn.chat.id, error = %e, "Chat stream failed");
                    turn.emit(ChatEvent::error(&e.to_string()));
                    return false;
                }
            };

            let Some(kind) = turn.timer.classify(&chunk) else {
                continue;
            };
            let event = chunk_event(kind, &chunk, &turn.timer);
            turn.emit(event);

            match kind {
                ChunkKind::ToolCall => {
                    if turn.handle_tool_calls(chunk.tool_calls).await {
                        tools_executed = true;
                    }
                }
                ChunkKind::Chat => turn.on_content(&chunk.content),
                ChunkKind::Thinking => turn.on_thinking(&chunk.thinking),
            }
        }
        tools_executed
    }

    /// Closes the thinking window, emits `done` and writes the whole chat.
    fn finish(&self, turn: &mut Turn<'_>, cancelled: bool) -> Result<()> {
        turn.close_thinking();
        turn.emit(ChatEvent::done());
        if let Some(last) = turn.chat.last_message_mut() {
            last.stream = false;
        }
        match self.store.save_chat(&turn.chat) {
            Ok(()) => Ok(()),
            Err(e) if cancelled => {
                warn!(chat_id = %turn.chat.id, error = %e, "Failed to save cancelled chat");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
