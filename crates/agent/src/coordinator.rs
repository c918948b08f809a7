//! Tool-call handling within a pass: where calls land in the transcript, and
//! how each result is recorded and reported.

use serde_json::Value;
use skimmer_core::{Error, Message, ToolCall};
use skimmer_providers::WireToolCall;
use skimmer_tools::browser::{is_browser_tool, BROWSER_SEARCH};
use skimmer_tools::web::{is_standalone_tool, WEB_FETCH};
use skimmer_tools::ToolOutput;
use tracing::{debug, info, warn};

use crate::events::ChatEvent;
use crate::runtime::Turn;

/// Calls that ran without an assistant message to carry them.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum PendingToolCalls {
    #[default]
    NoPendingCalls,
    /// Not yet sent: the next request carries them on a synthetic assistant
    /// message.
    PendingStandalone(Vec<ToolCall>),
    /// Sent on a synthetic message; the next assistant message created in
    /// the transcript adopts them.
    PendingAttached(Vec<ToolCall>),
}

impl PendingToolCalls {
    pub fn calls(&self) -> &[ToolCall] {
        match self {
            Self::NoPendingCalls => &[],
            Self::PendingStandalone(calls) | Self::PendingAttached(calls) => calls,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calls().is_empty()
    }

    /// Adds unattached calls; they go out with the next request.
    pub fn defer(&mut self, calls: Vec<ToolCall>) {
        let mut all = self.take();
        all.extend(calls);
        *self = Self::PendingStandalone(all);
    }

    /// Records that the pending calls went out on a synthetic message.
    pub fn mark_sent(&mut self) {
        if let Self::PendingStandalone(calls) = self {
            *self = Self::PendingAttached(std::mem::take(calls));
        }
    }

    pub fn take(&mut self) -> Vec<ToolCall> {
        match std::mem::take(self) {
            Self::NoPendingCalls => Vec::new(),
            Self::PendingStandalone(calls) | Self::PendingAttached(calls) => calls,
        }
    }

    pub fn clear(&mut self) {
        *self = Self::NoPendingCalls;
    }
}

fn to_transcript(calls: &[WireToolCall]) -> Vec<ToolCall> {
    calls
        .iter()
        .map(|c| ToolCall::function(&c.function.name, &c.function.arguments))
        .collect()
}

/// Text the model receives for a successful call; never empty when there is
/// a structured result to fall back on.
fn model_content(name: &str, output: &ToolOutput, tool_result: Option<&Value>) -> String {
    let mut content = output.content.clone();
    if name == WEB_FETCH && content.is_empty() {
        if let Some(text) = output.result.as_str() {
            content = text.to_string();
        }
    }
    if content.is_empty() {
        if let Some(result) = tool_result {
            debug!(tool = name, "Tool message empty, sending JSON result");
            content = result.to_string();
        }
    }
    content
}

impl Turn<'_> {
    /// Places the chunk's calls in the transcript, then runs them in order.
    /// Returns whether any call was executed.
    pub(crate) async fn handle_tool_calls(&mut self, wire_calls: Vec<WireToolCall>) -> bool {
        if let Some(end) = self.timer.end() {
            if let Some(last) = self.chat.last_message_mut().filter(|m| m.is_assistant()) {
                last.thinking_time_end = Some(end);
                last.touch();
                self.persist_last();
            }
            self.timer.reset();
        }

        let calls = to_transcript(&wire_calls);
        if self.chat.last_is_assistant() {
            if let Some(last) = self.chat.last_message_mut() {
                last.tool_calls = calls;
                last.touch();
            }
            self.persist_last();
        } else if calls.iter().all(|c| is_standalone_tool(c.name())) {
            let mut synthetic = Message::assistant("", &self.model);
            synthetic.tool_calls = calls;
            self.append(synthetic);
            self.pending.clear();
        } else {
            debug!(chat_id = %self.chat.id, calls = calls.len(), "Deferring tool calls to a synthetic assistant message");
            self.pending.defer(calls);
        }

        for call in &wire_calls {
            self.execute_tool_call(call).await;
        }
        !wire_calls.is_empty()
    }

    async fn execute_tool_call(&mut self, call: &WireToolCall) {
        let name = call.function.name.as_str();
        info!(chat_id = %self.chat.id, tool = name, "Executing tool call");
        match self
            .tools
            .registry
            .execute(name, &self.ctx, call.function.arguments.clone())
            .await
        {
            Ok(output) => self.record_tool_output(name, output).await,
            Err(e) => self.record_tool_error(name, &e),
        }
    }

    async fn record_tool_output(&mut self, name: &str, output: ToolOutput) {
        let tool_result = if name.starts_with(BROWSER_SEARCH) {
            None
        } else if is_browser_tool(name) {
            if let Some(state) = self.tools.browser_state().await {
                if let Err(e) = self.store.set_browser_state(&self.chat.id, &state) {
                    warn!(chat_id = %self.chat.id, error = %e, "Failed to persist browser state");
                }
                self.chat.browser_state = Some(state);
            }
            None
        } else {
            Some(output.result.clone())
        };

        let content = model_content(name, &output, tool_result.as_ref());
        self.append(Message::tool(name, &content, tool_result));

        self.emit(ChatEvent::tool(name, &output.content));
        let state = self.tools.browser_state().await;
        self.emit(ChatEvent::tool_result(name, &output.content, Some(output.result), state));
    }

    fn record_tool_error(&mut self, name: &str, error: &Error) {
        warn!(chat_id = %self.chat.id, tool = name, error = %error, "Tool call failed");
        let content = format!("Error: {}", error);
        self.append(Message::tool(name, &content, None));

        self.emit(ChatEvent::tool(name, &content));
        self.emit(ChatEvent::tool_result(name, &content, None, None));
    }
}
