use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use skimmer_core::config::default_view_tokens;
use skimmer_core::{Message, Role};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::links::wrap_lines;

/// Column width pages are wrapped to.
pub const WRAP_WIDTH: usize = 80;

/// A rendered page. Immutable once built, apart from stripping `text`/`lines`
/// for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub lines: Vec<String>,
    /// Citation id to absolute URL.
    #[serde(default)]
    pub links: BTreeMap<usize, String>,
    #[serde(default = "Utc::now")]
    pub fetched_at: DateTime<Utc>,
}

impl Page {
    /// Builds a page, wrapping `text` into lines.
    pub fn new(url: &str, title: &str, text: String, links: BTreeMap<usize, String>) -> Self {
        let lines = wrap_lines(&text, WRAP_WIDTH);
        Self {
            url: url.to_string(),
            title: title.to_string(),
            text,
            lines,
            links,
            fetched_at: Utc::now(),
        }
    }
}

/// Per-conversation browsing state: the navigation stack and the page cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserState {
    /// Append-only navigation history; revisits push duplicates.
    #[serde(default)]
    pub page_stack: Vec<String>,
    /// One entry per distinct URL, never evicted.
    #[serde(default)]
    pub url_to_page: HashMap<String, Page>,
    #[serde(default = "default_view_tokens")]
    pub view_tokens: usize,
}

impl Default for BrowserState {
    fn default() -> Self {
        Self::new(default_view_tokens())
    }
}

impl BrowserState {
    pub fn new(view_tokens: usize) -> Self {
        Self {
            page_stack: Vec::new(),
            url_to_page: HashMap::new(),
            view_tokens,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.page_stack.is_empty() && self.url_to_page.is_empty()
    }

    /// Caches the page and pushes its URL.
    pub fn save_page(&mut self, page: Page) {
        let url = page.url.clone();
        self.url_to_page.insert(url.clone(), page);
        self.page_stack.push(url);
    }

    /// Caches the page without navigating to it.
    pub fn cache_page(&mut self, page: Page) {
        self.url_to_page.insert(page.url.clone(), page);
    }

    pub fn push_url(&mut self, url: &str) {
        self.page_stack.push(url.to_string());
    }

    pub fn page(&self, url: &str) -> Option<&Page> {
        self.url_to_page.get(url)
    }

    pub fn top_cursor(&self) -> Option<usize> {
        self.page_stack.len().checked_sub(1)
    }

    /// Page at a stack position, if that position exists and its URL is cached.
    pub fn page_at(&self, cursor: usize) -> Option<&Page> {
        self.page_stack.get(cursor).and_then(|url| self.page(url))
    }

    /// Copy with every cached page's `text` and `lines` removed.
    pub fn stripped(&self) -> Self {
        let mut state = self.clone();
        for page in state.url_to_page.values_mut() {
            page.text.clear();
            page.lines.clear();
        }
        state
    }

    /// Parses a persisted snapshot. `null` and malformed blobs yield `None`.
    pub fn from_snapshot(blob: &Value) -> Option<Self> {
        if blob.is_null() {
            return None;
        }
        serde_json::from_value(blob.clone()).ok()
    }

    /// Most recent tool result that decodes into a non-empty state.
    pub fn from_transcript(messages: &[Message], default_view_tokens: usize) -> Option<Self> {
        messages
            .iter()
            .rev()
            .filter(|m| m.role == Role::Tool)
            .filter_map(|m| m.tool_result.as_ref())
            .filter_map(|v| serde_json::from_value::<BrowserState>(v.clone()).ok())
            .find(|st| !st.is_empty())
            .map(|mut st| {
                if st.view_tokens == 0 {
                    st.view_tokens = default_view_tokens;
                }
                st
            })
    }

    /// Recovers the state for a conversation: the persisted snapshot, then the
    /// newest browser state embedded in a tool result, then a fresh state.
    pub fn recover(snapshot: Option<&Value>, messages: &[Message], view_tokens: usize) -> Self {
        if let Some(state) = snapshot.and_then(Self::from_snapshot) {
            debug!(pages = state.url_to_page.len(), "Browser state from snapshot");
            return state;
        }
        if let Some(state) = Self::from_transcript(messages, view_tokens) {
            debug!(pages = state.url_to_page.len(), "Browser state from tool results");
            return state;
        }
        Self::new(view_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page(url: &str) -> Page {
        Page::new(url, "T", "hello".to_string(), BTreeMap::new())
    }

    #[test]
    fn test_save_page_appends_and_dedups_cache() {
        let mut st = BrowserState::default();
        st.save_page(page("a"));
        st.save_page(page("b"));
        st.save_page(page("a"));
        assert_eq!(st.page_stack, vec!["a", "b", "a"]);
        assert_eq!(st.url_to_page.len(), 2);
        assert_eq!(st.top_cursor(), Some(2));
        assert_eq!(st.page_at(1).unwrap().url, "b");
        assert!(st.page_at(3).is_none());
    }

    #[test]
    fn test_json_shape() {
        let mut st = BrowserState::new(512);
        let mut links = BTreeMap::new();
        links.insert(0, "https://x.org".to_string());
        st.save_page(Page::new("u", "T", "line".into(), links));
        let v = serde_json::to_value(&st).unwrap();
        assert_eq!(v["pageStack"], json!(["u"]));
        assert_eq!(v["viewTokens"], 512);
        assert_eq!(v["urlToPage"]["u"]["links"]["0"], "https://x.org");
        assert!(v["urlToPage"]["u"]["fetchedAt"].is_string());
        let back: BrowserState = serde_json::from_value(v).unwrap();
        assert_eq!(back, st);
    }

    #[test]
    fn test_stripped_drops_text_and_lines_only() {
        let mut st = BrowserState::default();
        st.save_page(page("a"));
        let s = st.stripped();
        let p = s.page("a").unwrap();
        assert!(p.text.is_empty() && p.lines.is_empty());
        assert_eq!(p.title, "T");
        assert_eq!(st.page("a").unwrap().text, "hello");
    }

    #[test]
    fn test_recover_prefers_snapshot() {
        let mut persisted = BrowserState::new(300);
        persisted.save_page(page("snap"));
        let mut legacy = BrowserState::new(0);
        legacy.save_page(page("legacy"));
        let messages = vec![Message::tool("browser.open", "x", Some(serde_json::to_value(&legacy).unwrap()))];

        let blob = serde_json::to_value(&persisted).unwrap();
        let st = BrowserState::recover(Some(&blob), &messages, 1024);
        assert_eq!(st.page_stack, vec!["snap"]);
        assert_eq!(st.view_tokens, 300);
    }

    #[test]
    fn test_recover_from_transcript_defaults_view_tokens() {
        let mut legacy = BrowserState::new(0);
        legacy.save_page(page("legacy"));
        let messages = vec![
            Message::tool("browser.open", "x", Some(serde_json::to_value(&legacy).unwrap())),
            Message::tool("other", "y", Some(json!({"pageStack": [], "urlToPage": {}}))),
            Message::tool("other", "z", Some(json!("not a state"))),
            Message::user("next"),
        ];
        let st = BrowserState::recover(Some(&Value::Null), &messages, 1024);
        assert_eq!(st.page_stack, vec!["legacy"]);
        assert_eq!(st.view_tokens, 1024);
    }

    #[test]
    fn test_recover_empty() {
        let st = BrowserState::recover(Some(&json!("garbage")), &[Message::user("hi")], 1024);
        assert!(st.is_empty());
        assert_eq!(st.view_tokens, 1024);
    }
}
