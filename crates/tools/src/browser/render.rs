//! Line-numbered page views bounded by an approximate token budget.

use skimmer_core::{Error, Result};
use std::fmt::Write;

use super::page::Page;

/// Characters per token used for the upper bound on text inspected.
const MAX_CHARS_PER_TOKEN: usize = 128;
/// Characters per token used for the estimate itself.
const APPROX_CHARS_PER_TOKEN: usize = 4;

/// Numbered rendering of `lines`. When the first line is present it is
/// preceded by a bare `L0:` marker and every following number shifts by one.
pub fn join_lines_with_numbers(lines: &[String]) -> String {
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        if i == 0 {
            out.push_str("L0:\n");
        }
        let _ = writeln!(out, "L{}: {}", i + 1, line);
    }
    out
}

/// Exclusive end line of the view starting at `loc`.
///
/// A positive `num_lines` is taken as is. Otherwise the remaining lines are
/// shown if they fit `view_tokens`; if not, the view is cut at the line that
/// contains character `view_tokens * 4`. Always clamped to `total_lines`.
pub fn end_loc(loc: usize, num_lines: i64, lines: &[String], view_tokens: usize) -> usize {
    let total_lines = lines.len();
    let num_lines = if num_lines > 0 {
        num_lines as usize
    } else {
        let txt = join_lines_with_numbers(lines.get(loc..).unwrap_or_default());
        if txt.len() > view_tokens {
            let upper_bound = ((view_tokens + 1) * MAX_CHARS_PER_TOKEN).min(txt.len());
            let approx_tokens = upper_bound / APPROX_CHARS_PER_TOKEN;
            if approx_tokens > view_tokens {
                let end_idx = (view_tokens * APPROX_CHARS_PER_TOKEN).min(txt.len());
                txt.as_bytes()[..end_idx].iter().filter(|b| **b == b'\n').count() + 1
            } else {
                total_lines
            }
        } else {
            total_lines
        }
    };
    loc.saturating_add(num_lines).min(total_lines)
}

/// Renders the view of `page` at stack position `cursor`.
pub fn display_page(page: &Page, cursor: usize, loc: i64, num_lines: i64, view_tokens: usize) -> Result<String> {
    let total_lines = page.lines.len();
    if total_lines == 0 {
        return Err(Error::Browser(format!("page {} has no content to display", page.url)));
    }
    if loc < 0 || loc as usize >= total_lines {
        return Err(Error::Browser(format!(
            "invalid location: {} (max: {})",
            loc,
            total_lines as i64 - 1
        )));
    }
    let loc = loc as usize;
    let end = end_loc(loc, num_lines, &page.lines, view_tokens);

    let mut out = String::new();
    let _ = write!(out, "[{}] {}", cursor, page.title);
    if page.url.is_empty() {
        out.push('\n');
    } else {
        let _ = writeln!(out, " ({})", page.url);
    }
    let _ = write!(out, "**viewing lines [{} - {}] of {}**\n\n", loc, end - 1, total_lines - 1);

    let mut had_zero_line = false;
    for (i, line) in page.lines.iter().enumerate().take(end).skip(loc) {
        if i == 0 {
            out.push_str("L0:\n");
            had_zero_line = true;
        }
        let number = if had_zero_line { i + 1 } else { i };
        let _ = writeln!(out, "L{}: {}", number, line);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn page_with_lines(lines: &[&str]) -> Page {
        let mut page = Page::new("https://example.com", "Ex", lines.join("\n"), BTreeMap::new());
        page.lines = lines.iter().map(|s| s.to_string()).collect();
        page
    }

    #[test]
    fn test_header_banner_and_zero_marker() {
        let page = page_with_lines(&["hello", "world"]);
        let out = display_page(&page, 0, 0, -1, 1024).unwrap();
        assert_eq!(
            out,
            "[0] Ex (https://example.com)\n**viewing lines [0 - 1] of 1**\n\nL0:\nL1: hello\nL2: world\n"
        );
    }

    #[test]
    fn test_view_not_starting_at_zero_keeps_numbers() {
        let page = page_with_lines(&["a", "b", "c", "d"]);
        let out = display_page(&page, 3, 1, 2, 1024).unwrap();
        assert_eq!(
            out,
            "[3] Ex (https://example.com)\n**viewing lines [1 - 2] of 3**\n\nL1: b\nL2: c\n"
        );
    }

    #[test]
    fn test_page_without_url() {
        let mut page = page_with_lines(&["x"]);
        page.url.clear();
        let out = display_page(&page, 0, 0, -1, 1024).unwrap();
        assert!(out.starts_with("[0] Ex\n**viewing lines [0 - 0] of 0**"));
    }

    #[test]
    fn test_location_out_of_range() {
        let page = page_with_lines(&["a", "b"]);
        let err = display_page(&page, 0, 2, -1, 1024).unwrap_err();
        assert_eq!(err.to_string(), "invalid location: 2 (max: 1)");
        assert!(display_page(&page, 0, -1, -1, 1024).is_err());
    }

    #[test]
    fn test_page_without_lines() {
        let page = page_with_lines(&[]);
        let err = display_page(&page, 0, 0, -1, 1024).unwrap_err();
        assert_eq!(err.to_string(), "page https://example.com has no content to display");
    }

    #[test]
    fn test_explicit_window_is_clamped() {
        let lines: Vec<String> = (0..10).map(|i| format!("line {}", i)).collect();
        for loc in 0..10 {
            for n in 1..15i64 {
                assert_eq!(end_loc(loc, n, &lines, 1024), (loc + n as usize).min(10));
            }
        }
    }

    #[test]
    fn test_budget_shows_everything_when_it_fits() {
        let lines: Vec<String> = (0..10).map(|i| format!("line {}", i)).collect();
        assert_eq!(end_loc(0, -1, &lines, 1024), 10);
        assert_eq!(end_loc(4, 0, &lines, 1024), 10);
    }

    #[test]
    fn test_budget_cuts_long_pages() {
        let lines: Vec<String> = (0..2000).map(|_| "x".repeat(70)).collect();
        let end = end_loc(0, -1, &lines, 100);
        // 400 characters of ~76-char numbered lines
        assert!(end > 1 && end < 10, "end = {}", end);
        let page = Page {
            lines: lines.clone(),
            ..page_with_lines(&["x"])
        };
        let out = display_page(&page, 0, 0, -1, 100).unwrap();
        assert!(out.contains(&format!("**viewing lines [0 - {}] of 1999**", end - 1)));
    }

    #[test]
    fn test_rendering_is_idempotent() {
        let lines: Vec<String> = (0..500).map(|i| format!("row {} {}", i, "y".repeat(i % 50))).collect();
        let page = Page {
            lines,
            ..page_with_lines(&["x"])
        };
        let a = display_page(&page, 2, 10, -1, 256).unwrap();
        let b = display_page(&page, 2, 10, -1, 256).unwrap();
        assert_eq!(a, b);
    }
}
