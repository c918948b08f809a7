//! HTML to Markdown conversion for crawled pages.
//!
//! Pages are requested with `Accept: text/markdown` first; servers that honour it
//! return Markdown directly, everything HTML is converted locally via `htmd`.

use reqwest::Client;
use scraper::{Html, Selector};
use serde_json::Value;
use skimmer_core::{Error, Result};

use crate::safe_truncate;

/// A fetched page reduced to what the browser needs.
#[derive(Debug, Default, Clone)]
pub struct FetchedDocument {
    pub title: Option<String>,
    pub markdown: String,
}

pub async fn fetch_document(client: &Client, url: &str, max_chars: usize) -> Result<FetchedDocument> {
    let response = client
        .get(url)
        .header("Accept", "text/markdown, text/html;q=0.9, */*;q=0.8")
        .send()
        .await
        .map_err(|e| Error::Tool(format!("Fetch failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::Tool(format!("Fetch of {} returned status {}", url, status.as_u16())));
    }
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let body = response
        .text()
        .await
        .map_err(|e| Error::Tool(format!("Failed to read response body: {}", e)))?;

    let mut doc = FetchedDocument::default();
    if content_type.contains("text/markdown") {
        doc.markdown = body;
    } else if content_type.contains("text/html") || looks_like_html(&body) {
        doc.title = extract_title(&body);
        doc.markdown = html_to_markdown(&body);
    } else if content_type.contains("application/json") {
        doc.markdown = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| serde_json::to_string_pretty(&v).ok())
            .unwrap_or(body);
    } else {
        doc.markdown = body;
    }

    doc.markdown = safe_truncate(&doc.markdown, max_chars).to_string();
    Ok(doc)
}

fn looks_like_html(body: &str) -> bool {
    let head = safe_truncate(body.trim_start(), 512).to_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

/// Convert HTML to Markdown, dropping navigation chrome and scripts.
pub fn html_to_markdown(html: &str) -> String {
    use htmd::HtmlToMarkdown;

    let converter = HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "nav", "footer", "header", "aside", "noscript", "iframe"])
        .build();

    match converter.convert(html) {
        Ok(md) => clean_markdown(&md),
        Err(_) => extract_text_fallback(html),
    }
}

/// Collapse runs of blank lines to one and trim the ends.
fn clean_markdown(md: &str) -> String {
    let mut result = String::with_capacity(md.len());
    let mut pending_blank = false;

    for line in md.lines() {
        if line.trim().is_empty() {
            pending_blank = true;
            continue;
        }
        if !result.is_empty() {
            result.push('\n');
            if pending_blank {
                result.push('\n');
            }
        }
        pending_blank = false;
        result.push_str(line);
    }

    result.trim().to_string()
}

fn extract_text_fallback(html: &str) -> String {
    let document = Html::parse_document(html);
    let selectors = ["article", "main", "[role=\"main\"]", "#content", "body"];

    for sel_str in selectors {
        if let Ok(selector) = Selector::parse(sel_str) {
            if let Some(element) = document.select(&selector).next() {
                let text = element.text().collect::<Vec<_>>().join(" ");
                let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
                if text.len() > 100 {
                    return text;
                }
            }
        }
    }

    let text = document.root_element().text().collect::<Vec<_>>().join(" ");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn extract_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("title").ok()?;
    let title = document
        .select(&selector)
        .next()?
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_to_markdown_basic() {
        let html = "<html><body><h1>Hello</h1><p>World</p></body></html>";
        let md = html_to_markdown(html);
        assert!(md.contains("Hello"));
        assert!(md.contains("World"));
    }

    #[test]
    fn test_html_to_markdown_strips_scripts() {
        let html = "<html><body><script>alert('x')</script><p>Content</p></body></html>";
        let md = html_to_markdown(html);
        assert!(!md.contains("alert"));
        assert!(md.contains("Content"));
    }

    #[test]
    fn test_html_to_markdown_keeps_links_as_markdown() {
        let html = r#"<html><body><p>See <a href="https://example.com">the docs</a></p></body></html>"#;
        let md = html_to_markdown(html);
        assert!(md.contains("[the docs](https://example.com)"));
    }

    #[test]
    fn test_clean_markdown_collapses_blanks() {
        let result = clean_markdown("Line 1\n\n\n\n\nLine 2\nLine 3\n\n");
        assert_eq!(result, "Line 1\n\nLine 2\nLine 3");
    }

    #[test]
    fn test_extract_title() {
        let html = "<html><head><title>  Example\n            Domain </title></head><body></body></html>";
        assert_eq!(extract_title(html).as_deref(), Some("Example Domain"));
        assert_eq!(extract_title("<html><head><title> </title></head></html>"), None);
    }

    #[test]
    fn test_extract_text_fallback() {
        let html = "<html><body><article><p>Main content here</p></article><nav>Nav stuff</nav></body></html>";
        let text = extract_text_fallback(html);
        assert!(text.contains("Main content"));
    }
}
