//! Citation markers and line wrapping.
//!
//! Markdown links `[text](url)` become `【id†text†domain】`, with ids handed out
//! from 0 in order of appearance and the id → url mapping returned alongside.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::BTreeMap;

static SPLIT_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]+)\]\s*\n\s*\(([^)]+)\)").expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("valid regex"));

/// Host of `url` with a leading `www.` removed, or the input itself when it has no host.
pub fn domain_of(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(u) => match u.host_str() {
            Some(host) if !host.is_empty() => {
                let host = host.strip_prefix("www.").unwrap_or(host);
                match u.port() {
                    Some(port) => format!("{}:{}", host, port),
                    None => host.to_string(),
                }
            }
            _ => url.to_string(),
        },
        Err(_) => url.to_string(),
    }
}

/// Rewrites markdown links as citation markers.
pub fn process_markdown_links(text: &str) -> (String, BTreeMap<usize, String>) {
    let joined = SPLIT_LINK.replace_all(text, |caps: &Captures| {
        format!(
            "[{}]({})",
            WHITESPACE.replace_all(&caps[1], " "),
            WHITESPACE.replace_all(&caps[2], " ")
        )
    });

    let mut links = BTreeMap::new();
    let processed = LINK.replace_all(&joined, |caps: &Captures| {
        let label = caps[1].trim();
        let target = caps[2].trim();
        let id = links.len();
        links.insert(id, target.to_string());
        format!("【{}†{}†{}】", id, label, domain_of(target))
    });

    (processed.into_owned(), links)
}

/// Wraps each `\n`-separated line to `width` columns by greedy word packing.
/// Blank lines are kept; a single over-long word stays on its own line.
pub fn wrap_lines(text: &str, width: usize) -> Vec<String> {
    let width = if width == 0 { 80 } else { width };
    let mut wrapped = Vec::new();

    for line in text.split('\n') {
        if line.chars().count() <= width {
            wrapped.push(line.to_string());
            continue;
        }
        let mut words = line.split_whitespace().peekable();
        if words.peek().is_none() {
            wrapped.push(line.to_string());
            continue;
        }
        let mut current = String::new();
        let mut current_len = 0;
        for word in words {
            let word_len = word.chars().count();
            if current.is_empty() {
                current.push_str(word);
                current_len = word_len;
            } else if current_len + 1 + word_len > width {
                wrapped.push(std::mem::take(&mut current));
                current.push_str(word);
                current_len = word_len;
            } else {
                current.push(' ');
                current.push_str(word);
                current_len += 1 + word_len;
            }
        }
        if !current.is_empty() {
            wrapped.push(current);
        }
    }

    wrapped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_of() {
        assert_eq!(domain_of("https://www.example.com/a"), "example.com");
        assert_eq!(domain_of("http://localhost:8080/x"), "localhost:8080");
        assert_eq!(domain_of("/relative/path"), "/relative/path");
        assert_eq!(domain_of("mailto:a@b.c"), "mailto:a@b.c");
    }

    #[test]
    fn test_links_numbered_in_order() {
        let text = "See [Rust]( https://www.rust-lang.org ) and [crates](https://crates.io/x) or [Rust again](https://www.rust-lang.org).";
        let (out, links) = process_markdown_links(text);
        assert_eq!(
            out,
            "See 【0†Rust†rust-lang.org】 and 【1†crates†crates.io】 or 【2†Rust again†rust-lang.org】."
        );
        assert_eq!(links.keys().copied().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(links[&0], "https://www.rust-lang.org");
        assert_eq!(links[&1], "https://crates.io/x");
    }

    #[test]
    fn test_split_links_are_joined() {
        let text = "Intro [Split\nlabel]\n   (https://example.com/page)\nend";
        let (out, links) = process_markdown_links(text);
        assert_eq!(out, "Intro 【0†Split label†example.com】\nend");
        assert_eq!(links[&0], "https://example.com/page");

        let text = "x [Docs]\n  (https://docs.rs)";
        let (out, _) = process_markdown_links(text);
        assert_eq!(out, "x 【0†Docs†docs.rs】");
    }

    #[test]
    fn test_codec_is_noop_without_links() {
        let (once, links) = process_markdown_links("see [Rust](https://rust-lang.org) [not a link]");
        assert_eq!(links.len(), 1);
        let (twice, again) = process_markdown_links(&once);
        assert_eq!(twice, once);
        assert!(again.is_empty());
    }

    #[test]
    fn test_wrap_lines() {
        assert_eq!(wrap_lines("", 80), vec![""]);
        assert_eq!(wrap_lines("a\n\nb", 80), vec!["a", "", "b"]);
        assert_eq!(wrap_lines("aaa bbb ccc", 7), vec!["aaa bbb", "ccc"]);
        assert_eq!(wrap_lines("averyverylongword x", 5), vec!["averyverylongword", "x"]);
        let long = "word ".repeat(40);
        for line in wrap_lines(&long, 80) {
            assert!(line.len() <= 80);
        }
    }
}
