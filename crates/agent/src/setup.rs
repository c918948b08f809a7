use serde_json::Value;
use skimmer_core::config::{WebMode, WebToolsConfig};
use skimmer_core::{Chat, Role};
use skimmer_tools::browser::{
    Browser, BrowserFindTool, BrowserOpenTool, BrowserSearchTool, BrowserState, SharedBrowser,
};
use skimmer_tools::web::{WebFetchTool, WebProvider, WebSearchTool};
use skimmer_tools::ToolRegistry;
use std::sync::Arc;
use tracing::{debug, warn};

/// Tools for one turn, plus the browser session they share when browsing is on.
#[derive(Clone, Default)]
pub struct TurnTools {
    pub registry: ToolRegistry,
    pub browser: Option<SharedBrowser>,
}

impl TurnTools {
    /// No tools when web search is off or the newest user message carries
    /// attachments. Browser mode recovers the chat's browser state.
    pub fn setup(
        web_config: &WebToolsConfig,
        view_tokens: usize,
        chat: &Chat,
        web_search: bool,
        web: Arc<dyn WebProvider>,
    ) -> Self {
        let has_attachments = chat
            .last_message()
            .map(|m| m.role == Role::User && !m.attachments.is_empty())
            .unwrap_or(false);
        if !web_search || has_attachments {
            debug!(chat_id = %chat.id, web_search, has_attachments, "No tools for this turn");
            return Self::default();
        }

        let mut tools = Self::default();
        match web_config.mode {
            WebMode::Browser => {
                let state = BrowserState::recover(chat.browser_state.as_ref(), &chat.messages, view_tokens);
                let browser = Browser::new(state, web).shared();
                tools.registry.register(Arc::new(BrowserSearchTool::new(browser.clone())));
                tools.registry.register(Arc::new(BrowserOpenTool::new(browser.clone())));
                tools.registry.register(Arc::new(BrowserFindTool::new(browser.clone())));
                tools.browser = Some(browser);
            }
            WebMode::Standalone => {
                let count = web_config.search.max_results as usize;
                tools.registry.register(Arc::new(WebSearchTool::new(web.clone(), count)));
                tools.registry.register(Arc::new(WebFetchTool::new(web)));
            }
            WebMode::Off => {
                warn!(chat_id = %chat.id, "Web search requested but web tools are disabled");
            }
        }
        debug!(chat_id = %chat.id, tools = ?tools.registry.tool_names(), "Tools set up");
        tools
    }

    /// Snapshot of the shared browser state, if this turn has a browser.
    pub async fn browser_state(&self) -> Option<Value> {
        let browser = self.browser.as_ref()?;
        let browser = browser.lock().await;
        serde_json::to_value(browser.state()).ok()
    }
}
