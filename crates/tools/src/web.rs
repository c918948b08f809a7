use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use skimmer_core::{Config, Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::html_to_md::fetch_document;
use crate::{Tool, ToolContext, ToolOutput, ToolSchema};

/// One crawled page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlPage {
    pub title: String,
    pub full_text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

/// Crawl/search collaborator used by the browser and the standalone web tools.
#[async_trait]
pub trait WebProvider: Send + Sync {
    /// Fetch each URL. The returned map is keyed by the requested URL;
    /// URLs that could not be fetched are absent.
    async fn crawl(&self, urls: &[String]) -> Result<HashMap<String, CrawlPage>>;

    /// Run each query, returning one result list per query in the same order.
    async fn search(&self, queries: &[String], max_results: usize) -> Result<Vec<Vec<SearchHit>>>;
}

/// Web provider backed by plain HTTP: Brave Search API when a key is configured,
/// otherwise Bing result markup; crawling converts fetched HTML to Markdown.
pub struct HttpWebProvider {
    client: Client,
    brave_api_key: Option<String>,
    max_fetch_chars: usize,
}

const BRAVE_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";
const BING_ENDPOINT: &str = "https://www.bing.com/search";

impl HttpWebProvider {
    pub fn new(client: Client, brave_api_key: Option<String>, max_fetch_chars: usize) -> Self {
        Self {
            client,
            brave_api_key,
            max_fetch_chars,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let web = &config.tools.web;
        let client = skimmer_providers::build_http_client(
            None,
            &config.network,
            BING_ENDPOINT,
            Duration::from_secs(web.fetch_timeout_secs),
        )?;
        Ok(Self::new(
            client,
            config.web_search_api_key().map(str::to_string),
            web.max_fetch_chars,
        ))
    }

    async fn search_one(&self, query: &str, count: usize) -> Result<Vec<SearchHit>> {
        if let Some(key) = &self.brave_api_key {
            match self.brave_search(key, query, count).await {
                Ok(hits) => return Ok(hits),
                Err(e) => warn!(error = %e, "Brave search failed, falling back to Bing"),
            }
        }
        self.bing_search(query, count).await
    }

    async fn brave_search(&self, api_key: &str, query: &str, count: usize) -> Result<Vec<SearchHit>> {
        let response = self
            .client
            .get(BRAVE_ENDPOINT)
            .header("X-Subscription-Token", api_key)
            .header("Accept", "application/json")
            .query(&[("q", query), ("count", &count.to_string())])
            .send()
            .await
            .map_err(|e| Error::Tool(format!("Search request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Tool(format!("Search API error {}: {}", status, text)));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| Error::Tool(format!("Failed to parse search response: {}", e)))?;
        Ok(parse_brave_results(&data, count))
    }

    async fn bing_search(&self, query: &str, count: usize) -> Result<Vec<SearchHit>> {
        let response = self
            .client
            .get(BING_ENDPOINT)
            .query(&[("q", query), ("count", &count.to_string())])
            .header("User-Agent", "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36")
            .header("Accept", "text/html,application/xhtml+xml,*/*;q=0.8")
            .send()
            .await
            .map_err(|e| Error::Tool(format!("Bing search failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Tool(format!("Bing returned status {}", response.status())));
        }

        let html = response
            .text()
            .await
            .map_err(|e| Error::Tool(format!("Failed to read Bing response: {}", e)))?;

        let hits = parse_bing_results(&html, count);
        debug!(count = hits.len(), query, "Bing scrape results");
        if hits.is_empty() && bing_html_looks_blocked(&html) {
            return Err(Error::Tool(
                "Bing returned a bot-check page. Configure a Brave Search API key or try again later.".to_string(),
            ));
        }
        Ok(hits)
    }
}

#[async_trait]
impl WebProvider for HttpWebProvider {
    async fn crawl(&self, urls: &[String]) -> Result<HashMap<String, CrawlPage>> {
        let mut pages = HashMap::new();
        let mut last_err = None;
        for url in urls {
            match fetch_document(&self.client, url, self.max_fetch_chars).await {
                Ok(doc) => {
                    pages.insert(
                        url.clone(),
                        CrawlPage {
                            title: doc.title.unwrap_or_default(),
                            full_text: doc.markdown,
                        },
                    );
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Crawl failed");
                    last_err = Some(e);
                }
            }
        }
        match last_err {
            Some(e) if pages.is_empty() => Err(e),
            _ => Ok(pages),
        }
    }

    async fn search(&self, queries: &[String], max_results: usize) -> Result<Vec<Vec<SearchHit>>> {
        let count = max_results.clamp(1, 10);
        let mut all = Vec::with_capacity(queries.len());
        for query in queries {
            all.push(self.search_one(query, count).await?);
        }
        Ok(all)
    }
}

fn parse_brave_results(data: &Value, count: usize) -> Vec<SearchHit> {
    data["web"]["results"]
        .as_array()
        .map(|results| {
            results
                .iter()
                .filter_map(|r| {
                    let url = r["url"].as_str()?;
                    Some(SearchHit {
                        title: r["title"].as_str().unwrap_or(url).to_string(),
                        url: url.to_string(),
                        snippet: r["description"].as_str().unwrap_or_default().to_string(),
                    })
                })
                .take(count)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_bing_results(html: &str, count: usize) -> Vec<SearchHit> {
    use scraper::{Html, Selector};

    let document = Html::parse_document(html);
    let (Ok(container), Ok(title_sel), Ok(snippet_sel)) = (
        Selector::parse("li.b_algo, div.b_algo"),
        Selector::parse("h2 a, .b_title a"),
        Selector::parse(".b_caption p, .b_lineclamp2, .b_lineclamp3, .b_lineclamp4, .b_dList"),
    ) else {
        return Vec::new();
    };

    let mut seen = std::collections::HashSet::new();
    let mut hits = Vec::new();
    for el in document.select(&container) {
        if hits.len() >= count {
            break;
        }
        let Some(title_el) = el.select(&title_sel).next() else {
            continue;
        };
        let title = title_el.text().collect::<String>().trim().to_string();
        let url = title_el.value().attr("href").unwrap_or_default().to_string();
        if title.is_empty() || !url.starts_with("http") || !seen.insert(url.clone()) {
            continue;
        }
        let snippet = el
            .select(&snippet_sel)
            .next()
            .map(|e| e.text().collect::<String>().trim().to_string())
            .unwrap_or_default();
        hits.push(SearchHit { title, url, snippet });
    }
    hits
}

fn bing_html_looks_blocked(html: &str) -> bool {
    let s = html.to_lowercase();
    s.contains("captcha") || s.contains("unusual traffic")
}

pub const WEB_SEARCH: &str = "web_search";
pub const WEB_FETCH: &str = "web_fetch";

/// Tools that may run without a preceding assistant turn.
pub fn is_standalone_tool(name: &str) -> bool {
    name == WEB_SEARCH || name == WEB_FETCH
}

// ============ web_search ============

/// Search without browser-session state.
pub struct WebSearchTool {
    web: Arc<dyn WebProvider>,
    default_count: usize,
}

impl WebSearchTool {
    pub fn new(web: Arc<dyn WebProvider>, default_count: usize) -> Self {
        Self { web, default_count }
    }
}

#[derive(Debug, Deserialize)]
pub struct WebSearchArgs {
    pub query: String,
    #[serde(default)]
    pub count: Option<usize>,
}

#[async_trait]
impl Tool for WebSearchTool {
    type Args = WebSearchArgs;

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: WEB_SEARCH,
            description: "Search the web and return titles, URLs and snippets.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search query" },
                    "count": { "type": "integer", "description": "Number of results (1-10, default 5)" }
                },
                "required": ["query"]
            }),
        }
    }

    async fn execute(&self, _ctx: &ToolContext, args: WebSearchArgs) -> Result<ToolOutput> {
        let query = args.query.trim();
        if query.is_empty() {
            return Err(Error::Validation("query parameter is required".to_string()));
        }
        let count = args.count.unwrap_or(self.default_count).clamp(1, 10);
        let hits = self
            .web
            .search(&[query.to_string()], count)
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();

        let mut content = String::new();
        for (i, hit) in hits.iter().enumerate() {
            content.push_str(&format!("{}. {}\n   {}\n", i + 1, hit.title, hit.url));
            if !hit.snippet.is_empty() {
                content.push_str(&format!("   {}\n", hit.snippet.trim()));
            }
        }
        if hits.is_empty() {
            content = format!("No results for: {}", query);
        }
        Ok(ToolOutput::new(json!({ "query": query, "results": hits }), content))
    }
}

// ============ web_fetch ============

/// Fetch one URL as Markdown, without browser-session state.
pub struct WebFetchTool {
    web: Arc<dyn WebProvider>,
}

impl WebFetchTool {
    pub fn new(web: Arc<dyn WebProvider>) -> Self {
        Self { web }
    }
}

#[derive(Debug, Deserialize)]
pub struct WebFetchArgs {
    pub url: String,
}

#[async_trait]
impl Tool for WebFetchTool {
    type Args = WebFetchArgs;

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: WEB_FETCH,
            description: "Fetch a web page and return its content as Markdown.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "url": { "type": "string", "description": "URL to fetch (http or https)" }
                },
                "required": ["url"]
            }),
        }
    }

    async fn execute(&self, _ctx: &ToolContext, args: WebFetchArgs) -> Result<ToolOutput> {
        let url = args.url.trim();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(Error::Validation("URL must start with http:// or https://".to_string()));
        }
        let mut pages = self.web.crawl(&[url.to_string()]).await?;
        let page = pages
            .remove(url)
            .ok_or_else(|| Error::Tool(format!("no content returned for {}", url)))?;
        let title = if page.title.is_empty() { url.to_string() } else { page.title.clone() };
        Ok(ToolOutput::new(
            json!({ "url": url, "title": title, "text": page.full_text }),
            page.full_text,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DynTool;
    use std::sync::Mutex;

    /// Scripted provider: canned pages and hits, records calls.
    #[derive(Default)]
    struct StubWeb {
        pages: HashMap<String, CrawlPage>,
        hits: Vec<SearchHit>,
        seen: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl WebProvider for StubWeb {
        async fn crawl(&self, urls: &[String]) -> Result<HashMap<String, CrawlPage>> {
            Ok(urls
                .iter()
                .filter_map(|u| self.pages.get(u).map(|p| (u.clone(), p.clone())))
                .collect())
        }

        async fn search(&self, queries: &[String], max_results: usize) -> Result<Vec<Vec<SearchHit>>> {
            let mut seen = self.seen.lock().unwrap();
            for q in queries {
                seen.push((q.clone(), max_results));
            }
            Ok(queries.iter().map(|_| self.hits.clone()).collect())
        }
    }

    #[test]
    fn test_parse_brave_results() {
        let data = json!({"web": {"results": [
            {"title": "Rust", "url": "https://rust-lang.org", "description": "A language"},
            {"title": "No url"},
            {"title": "Crates", "url": "https://crates.io", "description": "Registry"}
        ]}});
        let hits = parse_brave_results(&data, 5);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].snippet, "A language");
        assert_eq!(parse_brave_results(&data, 1).len(), 1);
        assert!(parse_brave_results(&json!({}), 5).is_empty());
    }

    #[test]
    fn test_parse_bing_results() {
        let html = r#"<html><body><ol>
            <li class="b_algo"><h2><a href="https://a.example/">Alpha</a></h2><div class="b_caption"><p>First hit</p></div></li>
            <li class="b_algo"><h2><a href="/relative">Skip me</a></h2></li>
            <li class="b_algo"><h2><a href="https://a.example/">Dup</a></h2></li>
            <li class="b_algo"><h2><a href="https://b.example/">Beta</a></h2></li>
        </ol></body></html>"#;
        let hits = parse_bing_results(html, 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "Alpha");
        assert_eq!(hits[0].snippet, "First hit");
        assert_eq!(hits[1].url, "https://b.example/");
        assert!(hits[1].snippet.is_empty());
    }

    #[tokio::test]
    async fn test_web_search_tool_formats_hits() {
        let web = Arc::new(StubWeb {
            hits: vec![SearchHit {
                title: "Rust".into(),
                url: "https://rust-lang.org".into(),
                snippet: " fast ".into(),
            }],
            ..Default::default()
        });
        let tool = WebSearchTool::new(web.clone(), 5);
        let out = tool
            .execute(&ToolContext::new("c"), WebSearchArgs { query: "rust".into(), count: Some(50) })
            .await
            .unwrap();
        assert_eq!(out.content, "1. Rust\n   https://rust-lang.org\n   fast\n");
        assert_eq!(out.result["results"][0]["url"], "https://rust-lang.org");
        assert_eq!(web.seen.lock().unwrap()[0], ("rust".to_string(), 10));
    }

    #[tokio::test]
    async fn test_web_fetch_tool() {
        let mut pages = HashMap::new();
        pages.insert(
            "https://example.com".to_string(),
            CrawlPage { title: String::new(), full_text: "hello".into() },
        );
        let tool = WebFetchTool::new(Arc::new(StubWeb { pages, ..Default::default() }));
        let ctx = ToolContext::new("c");
        let out = tool.execute(&ctx, WebFetchArgs { url: "https://example.com".into() }).await.unwrap();
        assert_eq!(out.content, "hello");
        assert_eq!(out.result["title"], "https://example.com");

        let err = tool.execute(&ctx, WebFetchArgs { url: "ftp://x".into() }).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        let err = tool.execute(&ctx, WebFetchArgs { url: "https://missing.org".into() }).await.unwrap_err();
        assert!(err.to_string().contains("no content returned"));
    }

    /// Never finishes a crawl or a search.
    struct StalledWeb;

    #[async_trait]
    impl WebProvider for StalledWeb {
        async fn crawl(&self, _urls: &[String]) -> Result<HashMap<String, CrawlPage>> {
            std::future::pending().await
        }

        async fn search(&self, _queries: &[String], _max_results: usize) -> Result<Vec<Vec<SearchHit>>> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_web_tools_stop_on_cancel() {
        let ctx = ToolContext::new("c");
        let fetch = WebFetchTool::new(Arc::new(StalledWeb));
        let search = WebSearchTool::new(Arc::new(StalledWeb), 5);

        let canceller = ctx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });
        let err = DynTool::call(&fetch, &ctx, json!({"url": "https://example.com"})).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled(_)));

        let err = DynTool::call(&search, &ctx, json!({"query": "rust"})).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled(_)));
    }
}
