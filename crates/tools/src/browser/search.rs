//! Pages built from search hits and crawl results.

use std::collections::{BTreeMap, HashMap};

use super::links::{domain_of, process_markdown_links};
use super::page::Page;
use crate::safe_truncate;
use crate::web::{CrawlPage, SearchHit};

/// Longest snippet shown per hit on the results page, in bytes.
const SNIPPET_MAX: usize = 400;
const NO_CONTENT: &str = "No content could be extracted from this page.";

/// The results page for `query`: one cited line per hit, link ids 0..n in hit order.
pub fn build_search_results_page(query: &str, results: &[Vec<SearchHit>]) -> Page {
    let mut text = String::from("\nURL: \n# Search Results\n\n");
    let mut links = BTreeMap::new();

    for hit in results.iter().flatten() {
        let id = links.len();
        text.push_str(&format!("* 【{}†{}†{}】", id, hit.title, domain_of(&hit.url)));
        text.push_str(safe_truncate(&hit.snippet, SNIPPET_MAX).trim());
        text.push('\n');
        links.insert(id, hit.url.clone());
    }

    Page::new(&format!("search_results_{}", query), query, text, links)
}

/// A single hit cached as its own page, so opening its link needs no crawl.
/// `link_idx` is the hit's 1-based position in the result list.
pub fn build_search_hit_page(hit: &SearchHit, link_idx: usize) -> Page {
    if hit.snippet.is_empty() {
        let mut links = BTreeMap::new();
        links.insert(link_idx, hit.url.clone());
        let text = format!("【{}†{}】\nURL: {}\n\n\n", link_idx, hit.title, hit.url);
        return Page::new(&hit.url, &hit.title, text, links);
    }

    let (text, links) = process_markdown_links(&format!("URL: {}\n{}", hit.url, hit.snippet));
    Page::new(&hit.url, &hit.title, text, links)
}

/// Page for `requested_url` from a crawl response. The first entry carrying a
/// result wins; its key becomes the page URL.
pub fn build_page_from_crawl(requested_url: &str, crawled: &HashMap<String, CrawlPage>) -> Page {
    let mut url = requested_url.to_string();
    let mut title = requested_url.to_string();
    let mut body = String::new();

    let hit = crawled
        .get_key_value(requested_url)
        .or_else(|| crawled.iter().next());
    if let Some((key, result)) = hit {
        url = key.clone();
        if !result.title.is_empty() {
            title = result.title.clone();
        }
        body = result.full_text.clone();
    }

    let text = if body.is_empty() {
        NO_CONTENT.to_string()
    } else {
        format!("URL: {}\n{}", url, body)
    };
    let (text, links) = process_markdown_links(&text);
    Page::new(&url, &title, text, links)
}
