//! `browser.search`, `browser.open` and `browser.find`: the model-facing face
//! of a shared [`Browser`].

use async_trait::async_trait;
use serde::de::{Deserializer, Error as _};
use serde::Deserialize;
use serde_json::{json, Value};
use skimmer_core::Result;

use super::session::{OpenTarget, SharedBrowser};
use crate::{Tool, ToolContext, ToolOutput, ToolSchema};

pub const BROWSER_SEARCH: &str = "browser.search";
pub const BROWSER_OPEN: &str = "browser.open";
pub const BROWSER_FIND: &str = "browser.find";

const DEFAULT_TOPN: usize = 5;

/// Integers from models arrive as ints, floats or numeric strings.
fn lenient_int<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid integer {}", n))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s.trim().parse::<i64>().map(Some).map_err(D::Error::custom),
        Some(other) => Err(D::Error::custom(format!("expected an integer, got {}", other))),
    }
}

/// A string id is a URL; a number is a link id on the page at the cursor.
fn open_target<'de, D>(deserializer: D) -> std::result::Result<OpenTarget, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(OpenTarget::Current),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(OpenTarget::Current),
        Some(Value::String(s)) => Ok(OpenTarget::Url(s.trim().to_string())),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(OpenTarget::Link)
            .ok_or_else(|| D::Error::custom(format!("invalid link id {}", n))),
        Some(other) => Err(D::Error::custom(format!("id must be a URL or a link id, got {}", other))),
    }
}

fn state_output(browser: &super::Browser, text: String) -> Result<ToolOutput> {
    Ok(ToolOutput::new(serde_json::to_value(browser.state())?, text))
}

// ============ browser.search ============

pub struct BrowserSearchTool {
    browser: SharedBrowser,
}

impl BrowserSearchTool {
    pub fn new(browser: SharedBrowser) -> Self {
        Self { browser }
    }
}

#[derive(Debug, Deserialize)]
pub struct BrowserSearchArgs {
    #[serde(default)]
    pub query: String,
    #[serde(default, deserialize_with = "lenient_int")]
    pub topn: Option<i64>,
}

#[async_trait]
impl Tool for BrowserSearchTool {
    type Args = BrowserSearchArgs;

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: BROWSER_SEARCH,
            description: "Search the web for information. Results open as a page whose 【id†title†domain】 markers can be followed with browser.open.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search query" },
                    "topn": { "type": "integer", "description": "Number of results (default 5)" }
                },
                "required": ["query"]
            }),
        }
    }

    async fn execute(&self, _ctx: &ToolContext, args: BrowserSearchArgs) -> Result<ToolOutput> {
        let topn = match args.topn {
            Some(n) if n > 0 => n as usize,
            _ => DEFAULT_TOPN,
        };
        let mut browser = self.browser.lock().await;
        let text = browser.search(&args.query, topn).await?;
        state_output(&browser, text)
    }
}

// ============ browser.open ============

pub struct BrowserOpenTool {
    browser: SharedBrowser,
}

impl BrowserOpenTool {
    pub fn new(browser: SharedBrowser) -> Self {
        Self { browser }
    }
}

#[derive(Debug, Deserialize)]
pub struct BrowserOpenArgs {
    #[serde(default, deserialize_with = "lenient_int")]
    pub cursor: Option<i64>,
    #[serde(default, deserialize_with = "open_target")]
    pub id: OpenTarget,
    #[serde(default, deserialize_with = "lenient_int")]
    pub loc: Option<i64>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub num_lines: Option<i64>,
}

#[async_trait]
impl Tool for BrowserOpenTool {
    type Args = BrowserOpenArgs;

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: BROWSER_OPEN,
            description: "Open a link in the browser. Pass a URL, or the numeric id of a 【id†...】 link on the page at `cursor`; omit `id` to view the current page again, starting at line `loc`.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "id": {
                        "description": "URL to open, or link id on the current page",
                        "anyOf": [{ "type": "string" }, { "type": "integer" }]
                    },
                    "cursor": { "type": "integer", "description": "Page stack index the link id refers to (default: current page)" },
                    "loc": { "type": "integer", "description": "First line to show (default 0)" },
                    "num_lines": { "type": "integer", "description": "Lines to show; omit to fill the view budget" }
                }
            }),
        }
    }

    async fn execute(&self, _ctx: &ToolContext, args: BrowserOpenArgs) -> Result<ToolOutput> {
        let mut browser = self.browser.lock().await;
        let text = browser
            .open(
                args.cursor.unwrap_or(-1),
                args.id,
                args.loc.unwrap_or(0),
                args.num_lines.unwrap_or(-1),
            )
            .await?;
        state_output(&browser, text)
    }
}

// ============ browser.find ============

pub struct BrowserFindTool {
    browser: SharedBrowser,
}

impl BrowserFindTool {
    pub fn new(browser: SharedBrowser) -> Self {
        Self { browser }
    }
}

#[derive(Debug, Deserialize)]
pub struct BrowserFindArgs {
    #[serde(default)]
    pub pattern: String,
    #[serde(default, deserialize_with = "lenient_int")]
    pub cursor: Option<i64>,
}

#[async_trait]
impl Tool for BrowserFindTool {
    type Args = BrowserFindArgs;

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: BROWSER_FIND,
            description: "Find a term in the browser. Case-insensitive search of the page at `cursor` (default: current page).",
            parameters: json!({
                "type": "object",
                "properties": {
                    "pattern": { "type": "string", "description": "Text to look for" },
                    "cursor": { "type": "integer", "description": "Page stack index to search (default: current page)" }
                },
                "required": ["pattern"]
            }),
        }
    }

    async fn execute(&self, _ctx: &ToolContext, args: BrowserFindArgs) -> Result<ToolOutput> {
        let mut browser = self.browser.lock().await;
        let text = browser.find(&args.pattern, args.cursor.unwrap_or(-1)).await?;
        state_output(&browser, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::session::tests::FakeWeb;
    use crate::browser::{Browser, BrowserState};
    use crate::{DynTool, ToolRegistry};
    use std::sync::Arc;

    fn registry(web: FakeWeb) -> (ToolRegistry, SharedBrowser) {
        let browser = Browser::new(BrowserState::default(), Arc::new(web)).shared();
        let mut registry = ToolRegistry::new();
        let tools: Vec<Arc<dyn DynTool>> = vec![
            Arc::new(BrowserSearchTool::new(browser.clone())),
            Arc::new(BrowserOpenTool::new(browser.clone())),
            Arc::new(BrowserFindTool::new(browser.clone())),
        ];
        for tool in tools {
            registry.register(tool);
        }
        (registry, browser)
    }

    #[test]
    fn test_open_args_decoding() {
        let args: BrowserOpenArgs = serde_json::from_value(json!({"id": "https://a.org"})).unwrap();
        assert_eq!(args.id, OpenTarget::Url("https://a.org".into()));
        assert_eq!(args.cursor, None);

        let args: BrowserOpenArgs =
            serde_json::from_value(json!({"id": 3.0, "cursor": "1", "loc": 10, "num_lines": null})).unwrap();
        assert_eq!(args.id, OpenTarget::Link(3));
        assert_eq!(args.cursor, Some(1));
        assert_eq!(args.loc, Some(10));
        assert_eq!(args.num_lines, None);

        let args: BrowserOpenArgs = serde_json::from_value(json!({})).unwrap();
        assert_eq!(args.id, OpenTarget::Current);

        assert!(serde_json::from_value::<BrowserOpenArgs>(json!({"id": [1]})).is_err());
        assert!(serde_json::from_value::<BrowserOpenArgs>(json!({"loc": "top"})).is_err());
    }

    #[tokio::test]
    async fn test_open_through_registry() {
        let (registry, browser) = registry(FakeWeb::default().with_page("https://example.com", "Ex", "hello"));
        assert_eq!(registry.tool_names(), vec![BROWSER_SEARCH, BROWSER_OPEN, BROWSER_FIND]);

        let ctx = ToolContext::new("chat-1");
        let out = registry
            .execute(BROWSER_OPEN, &ctx, json!({"id": "https://example.com"}))
            .await
            .unwrap();
        assert!(out.content.contains("[0] Ex"));
        assert!(out.content.contains("L0:"));
        assert_eq!(out.result["pageStack"], json!(["https://example.com"]));
        assert_eq!(out.result["urlToPage"]["https://example.com"]["title"], "Ex");
        assert_eq!(browser.lock().await.state().page_stack.len(), 1);
    }

    #[tokio::test]
    async fn test_search_then_find() {
        let (registry, _) = registry(
            FakeWeb::default()
                .with_hit("Tokio", "https://tokio.rs", "An async runtime")
                .with_hit("Serde", "https://serde.rs", "Serialization framework"),
        );
        let ctx = ToolContext::default();
        let out = registry
            .execute(BROWSER_SEARCH, &ctx, json!({"query": "rust crates", "topn": "1"}))
            .await
            .unwrap();
        assert!(out.content.contains("【0†Tokio†tokio.rs】"));
        assert!(!out.content.contains("Serde"));

        let out = registry
            .execute(BROWSER_FIND, &ctx, json!({"pattern": "runtime"}))
            .await
            .unwrap();
        assert!(out.content.starts_with("[1] Find results for text: `runtime` in `rust crates`"));
        assert_eq!(out.result["pageStack"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_argument_errors() {
        let (registry, _) = registry(FakeWeb::default());
        let ctx = ToolContext::default();
        let err = registry.execute(BROWSER_FIND, &ctx, json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "Validation error: pattern parameter is required");
        let err = registry
            .execute(BROWSER_OPEN, &ctx, json!({"cursor": {"x": 1}}))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Validation error: invalid arguments for browser.open"));
    }
}
