//! Browser session: navigation over a per-conversation page store.

use skimmer_core::{Error, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::find::build_find_results_page;
use super::page::{BrowserState, Page};
use super::render::display_page;
use super::search::{build_page_from_crawl, build_search_hit_page, build_search_results_page};
use crate::web::WebProvider;

/// One browser session shared by the browser tools of a conversation.
pub type SharedBrowser = Arc<Mutex<Browser>>;

/// What `open` should navigate to.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum OpenTarget {
    /// Re-display the page at the cursor.
    #[default]
    Current,
    Url(String),
    /// Citation id on the page at the cursor.
    Link(i64),
}

pub struct Browser {
    state: BrowserState,
    web: Arc<dyn WebProvider>,
}

impl Browser {
    pub fn new(state: BrowserState, web: Arc<dyn WebProvider>) -> Self {
        Self { state, web }
    }

    pub fn shared(self) -> SharedBrowser {
        Arc::new(Mutex::new(self))
    }

    pub fn state(&self) -> &BrowserState {
        &self.state
    }

    fn page_from_stack(&self, url: &str) -> Result<&Page> {
        self.state
            .page(url)
            .ok_or_else(|| Error::Browser(format!("page not found for url {}", url)))
    }

    /// Page at `cursor`, or the topmost page for a negative cursor. An empty
    /// stack with a negative cursor yields `None`.
    fn page_at_cursor(&self, cursor: i64) -> Result<Option<&Page>> {
        let stack = &self.state.page_stack;
        if cursor >= 0 {
            let url = stack.get(cursor as usize).ok_or_else(|| {
                Error::Browser(format!(
                    "cursor {} is out of range (pageStack length: {})",
                    cursor,
                    stack.len()
                ))
            })?;
            return self.page_from_stack(url).map(Some);
        }
        match stack.last() {
            Some(url) => Ok(self.page_from_stack(url).ok()),
            None => Ok(None),
        }
    }

    /// Renders the topmost stack entry.
    fn display_top(&self, loc: i64, num_lines: i64) -> Result<String> {
        let cursor = self
            .state
            .top_cursor()
            .ok_or_else(|| Error::Browser("no current page to display".to_string()))?;
        let page = self.state.page_at(cursor).ok_or_else(|| {
            Error::Browser(format!("page not found for cursor {}", cursor))
        })?;
        display_page(page, cursor, loc, num_lines, self.state.view_tokens)
            .map_err(|e| Error::Browser(format!("failed to display page: {}", e)))
    }

    async fn crawl(&self, url: &str) -> Result<Page> {
        let crawled = self
            .web
            .crawl(&[url.to_string()])
            .await
            .map_err(|e| Error::Tool(format!("failed to crawl URL {}: {}", url, e)))?;
        Ok(build_page_from_crawl(url, &crawled))
    }

    /// Runs a web search, pushes the results page and caches one page per hit.
    pub async fn search(&mut self, query: &str, topn: usize) -> Result<String> {
        if query.trim().is_empty() {
            return Err(Error::Validation("query parameter is required".to_string()));
        }
        let results = self
            .web
            .search(&[query.to_string()], topn)
            .await
            .map_err(|e| Error::Tool(format!("search error: {}", e)))?;

        self.state.save_page(build_search_results_page(query, &results));
        for hits in &results {
            for (i, hit) in hits.iter().enumerate() {
                self.state.cache_page(build_search_hit_page(hit, i + 1));
            }
        }
        info!(query = %query, hits = results.iter().map(Vec::len).sum::<usize>(), "Browser search");

        self.display_top(0, -1)
    }

    /// Navigates and renders the new topmost page. Every successful call
    /// pushes exactly one stack entry.
    pub async fn open(&mut self, cursor: i64, target: OpenTarget, loc: i64, num_lines: i64) -> Result<String> {
        let current = match self.page_at_cursor(cursor) {
            Ok(page) => page.cloned(),
            Err(e) if cursor >= 0 => return Err(e),
            Err(_) => None,
        };

        let page = match target {
            OpenTarget::Url(url) => match self.state.page(&url) {
                Some(cached) => cached.clone(),
                None => self.crawl(&url).await?,
            },
            OpenTarget::Link(id) => {
                let current = current.ok_or_else(|| {
                    Error::Browser("no current page to resolve link from".to_string())
                })?;
                let url = usize::try_from(id)
                    .ok()
                    .and_then(|id| current.links.get(&id))
                    .ok_or_else(|| Error::Browser(format!("invalid link id {}", id)))?;
                match self.state.page(url) {
                    Some(cached) => cached.clone(),
                    None => self.crawl(url).await?,
                }
            }
            OpenTarget::Current => {
                let current = current
                    .ok_or_else(|| Error::Browser("no current page to display".to_string()))?;
                self.state.push_url(&current.url);
                debug!(url = %current.url, "Browser re-open");
                return self.display_top(loc, num_lines);
            }
        };

        debug!(url = %page.url, stack = self.state.page_stack.len() + 1, "Browser open");
        self.state.save_page(page);
        self.display_top(loc, num_lines)
    }

    /// Case-insensitive search within the page at `cursor` (topmost for -1);
    /// the result page is pushed like an `open`.
    pub async fn find(&mut self, pattern: &str, cursor: i64) -> Result<String> {
        if pattern.is_empty() {
            return Err(Error::Validation("pattern parameter is required".to_string()));
        }
        let stack = &self.state.page_stack;
        let url = if cursor == -1 {
            stack
                .last()
                .ok_or_else(|| Error::Browser("no pages to search in".to_string()))?
        } else if cursor < 0 || cursor as usize >= stack.len() {
            return Err(Error::Browser(format!(
                "cursor {} is out of range [0-{}]",
                cursor,
                stack.len() as i64 - 1
            )));
        } else {
            &stack[cursor as usize]
        };
        let page = self
            .page_from_stack(url)
            .map_err(|e| Error::Browser(format!("page not found for cursor {}: {}", cursor, e)))?;

        let found = build_find_results_page(pattern, page);
        self.state.save_page(found);
        self.display_top(0, -1)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::web::{CrawlPage, SearchHit};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    /// Canned crawl and search responses; records every crawled URL.
    #[derive(Default)]
    pub(crate) struct FakeWeb {
        pub pages: HashMap<String, CrawlPage>,
        pub hits: Vec<SearchHit>,
        pub crawled: StdMutex<Vec<String>>,
        pub fail: bool,
    }

    impl FakeWeb {
        pub fn with_page(mut self, url: &str, title: &str, text: &str) -> Self {
            self.pages.insert(
                url.to_string(),
                CrawlPage { title: title.to_string(), full_text: text.to_string() },
            );
            self
        }

        pub fn with_hit(mut self, title: &str, url: &str, snippet: &str) -> Self {
            self.hits.push(SearchHit {
                title: title.to_string(),
                url: url.to_string(),
                snippet: snippet.to_string(),
            });
            self
        }
    }

    #[async_trait]
    impl WebProvider for FakeWeb {
        async fn crawl(&self, urls: &[String]) -> Result<HashMap<String, CrawlPage>> {
            if self.fail {
                return Err(Error::Tool("connection refused".to_string()));
            }
            self.crawled.lock().unwrap().extend(urls.iter().cloned());
            Ok(urls
                .iter()
                .filter_map(|u| self.pages.get(u).map(|p| (u.clone(), p.clone())))
                .collect())
        }

        async fn search(&self, queries: &[String], max_results: usize) -> Result<Vec<Vec<SearchHit>>> {
            if self.fail {
                return Err(Error::Tool("rate limited".to_string()));
            }
            Ok(queries
                .iter()
                .map(|_| self.hits.iter().take(max_results).cloned().collect())
                .collect())
        }
    }

    fn browser(web: FakeWeb) -> (Browser, Arc<FakeWeb>) {
        let web = Arc::new(web);
        (Browser::new(BrowserState::default(), web.clone()), web)
    }

    #[tokio::test]
    async fn test_open_url_on_empty_state() {
        let (mut b, _) = browser(FakeWeb::default().with_page("https://example.com", "Ex", "hello"));
        let text = b
            .open(-1, OpenTarget::Url("https://example.com".into()), 0, -1)
            .await
            .unwrap();
        assert_eq!(b.state().page_stack, vec!["https://example.com"]);
        assert_eq!(b.state().page("https://example.com").unwrap().url, "https://example.com");
        assert!(text.contains("[0] Ex"));
        assert!(text.contains("L0:"));
        assert!(text.contains("L2: hello"));
    }

    #[tokio::test]
    async fn test_open_uses_cache_and_always_appends() {
        let (mut b, web) = browser(
            FakeWeb::default()
                .with_page("https://a.org", "A", "go [b](https://b.org)")
                .with_page("https://b.org", "B", "bee"),
        );
        let steps = [
            OpenTarget::Url("https://a.org".into()),
            OpenTarget::Link(0),
            OpenTarget::Current,
            OpenTarget::Url("https://a.org".into()),
            OpenTarget::Url("https://b.org".into()),
        ];
        for (i, target) in steps.into_iter().enumerate() {
            let before = b.state().page_stack.len();
            b.open(-1, target, 0, -1).await.unwrap();
            assert_eq!(b.state().page_stack.len(), before + 1, "step {}", i);
        }
        assert_eq!(
            b.state().page_stack,
            vec!["https://a.org", "https://b.org", "https://b.org", "https://a.org", "https://b.org"]
        );
        assert_eq!(*web.crawled.lock().unwrap(), vec!["https://a.org", "https://b.org"]);
        assert_eq!(b.state().url_to_page.len(), 2);
    }

    #[tokio::test]
    async fn test_open_link_relative_to_cursor() {
        let (mut b, _) = browser(
            FakeWeb::default()
                .with_page("https://a.org", "A", "[one](https://one.org)")
                .with_page("https://z.org", "Z", "[zed](https://zed.org)")
                .with_page("https://one.org", "One", "first"),
        );
        b.open(-1, OpenTarget::Url("https://a.org".into()), 0, -1).await.unwrap();
        b.open(-1, OpenTarget::Url("https://z.org".into()), 0, -1).await.unwrap();
        let text = b.open(0, OpenTarget::Link(0), 0, -1).await.unwrap();
        assert!(text.starts_with("[2] One (https://one.org)"));
    }

    #[tokio::test]
    async fn test_open_errors() {
        let (mut b, _) = browser(FakeWeb::default().with_page("https://a.org", "A", "[x](https://x.org)"));
        let err = b.open(-1, OpenTarget::Current, 0, -1).await.unwrap_err();
        assert_eq!(err.to_string(), "no current page to display");
        let err = b.open(-1, OpenTarget::Link(0), 0, -1).await.unwrap_err();
        assert_eq!(err.to_string(), "no current page to resolve link from");
        let err = b.open(0, OpenTarget::Url("https://a.org".into()), 0, -1).await.unwrap_err();
        assert_eq!(err.to_string(), "cursor 0 is out of range (pageStack length: 0)");

        b.open(-1, OpenTarget::Url("https://a.org".into()), 0, -1).await.unwrap();
        let err = b.open(-1, OpenTarget::Link(7), 0, -1).await.unwrap_err();
        assert_eq!(err.to_string(), "invalid link id 7");
        let err = b.open(-1, OpenTarget::Current, 50, -1).await.unwrap_err();
        assert!(err.to_string().starts_with("failed to display page: invalid location: 50"));
        assert_eq!(b.state().page_stack.len(), 2);
    }

    #[tokio::test]
    async fn test_open_stripped_cached_page() {
        let mut state = BrowserState::default();
        state.save_page(Page::new("https://a.org", "A", "alpha".to_string(), Default::default()));
        let web = Arc::new(FakeWeb::default());
        let mut b = Browser::new(state.stripped(), web.clone());

        let err = b.open(-1, OpenTarget::Url("https://a.org".into()), 0, -1).await.unwrap_err();
        assert_eq!(err.to_string(), "failed to display page: page https://a.org has no content to display");
        assert!(web.crawled.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_crawl_failure_leaves_stack_alone() {
        let (mut b, _) = browser(FakeWeb { fail: true, ..Default::default() });
        let err = b.open(-1, OpenTarget::Url("https://down.org".into()), 0, -1).await.unwrap_err();
        assert_eq!(err.to_string(), "Tool error: failed to crawl URL https://down.org: Tool error: connection refused");
        assert!(b.state().page_stack.is_empty());
    }

    #[tokio::test]
    async fn test_search_pushes_collection_and_caches_hits() {
        let (mut b, web) = browser(
            FakeWeb::default()
                .with_hit("Rust", "https://www.rust-lang.org", "A language")
                .with_hit("Crates", "https://crates.io", ""),
        );
        let text = b.search("rust", 5).await.unwrap();
        assert!(text.starts_with("[0] rust (search_results_rust)"));
        assert!(text.contains("* 【0†Rust†rust-lang.org】A language"));
        assert_eq!(b.state().page_stack, vec!["search_results_rust"]);
        assert_eq!(b.state().url_to_page.len(), 3);

        // opening a hit is served from the cache
        let text = b.open(-1, OpenTarget::Link(1), 0, -1).await.unwrap();
        assert!(text.contains("【2†Crates】"));
        assert!(web.crawled.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_errors() {
        let (mut b, _) = browser(FakeWeb::default());
        assert_eq!(b.search("  ", 5).await.unwrap_err().to_string(), "Validation error: query parameter is required");
        let (mut b, _) = browser(FakeWeb { fail: true, ..Default::default() });
        assert!(b.search("q", 5).await.unwrap_err().to_string().contains("search error"));
    }

    #[tokio::test]
    async fn test_find_pushes_result_page() {
        let (mut b, _) = browser(FakeWeb::default().with_page("https://a.org", "A", "alpha\nbeta\ngamma"));
        assert_eq!(b.find("x", -1).await.unwrap_err().to_string(), "no pages to search in");
        b.open(-1, OpenTarget::Url("https://a.org".into()), 0, -1).await.unwrap();

        let text = b.find("BETA", -1).await.unwrap();
        assert!(text.starts_with("[1] Find results for text: `BETA` in `A` (find_results_BETA)"));
        assert!(text.contains("match at L2"));
        assert_eq!(b.state().page_stack.len(), 2);

        assert_eq!(b.find("x", 5).await.unwrap_err().to_string(), "cursor 5 is out of range [0-1]");
        assert_eq!(b.find("x", -3).await.unwrap_err().to_string(), "cursor -3 is out of range [0-1]");
        assert!(b.find("", -1).await.is_err());
    }
}
