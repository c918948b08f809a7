use std::collections::BTreeMap;

use super::page::Page;

/// Lines shown per match; the scan also skips this many lines after a match.
const SNIPPET_LINES: usize = 4;
const MAX_MATCHES: usize = 50;

/// Case-insensitive search over `page.lines`, producing a navigable result page.
pub fn build_find_results_page(pattern: &str, page: &Page) -> Page {
    let needle = pattern.to_lowercase();
    let mut chunks = Vec::new();
    let mut idx = 0;

    while idx < page.lines.len() {
        if !page.lines[idx].to_lowercase().contains(&needle) {
            idx += 1;
            continue;
        }

        let end = (idx + SNIPPET_LINES).min(page.lines.len());
        let snippet = page.lines[idx..end].join("\n");
        chunks.push(format!("【{}†match at L{}】\n{}", chunks.len(), idx, snippet));
        if chunks.len() >= MAX_MATCHES {
            break;
        }
        idx += SNIPPET_LINES;
    }

    let text = if chunks.is_empty() {
        format!("No `find` results for pattern: `{}`", pattern)
    } else {
        chunks.join("\n\n")
    };

    Page::new(
        &format!("find_results_{}", pattern),
        &format!("Find results for text: `{}` in `{}`", pattern, page.title),
        text,
        BTreeMap::new(),
    )
}
