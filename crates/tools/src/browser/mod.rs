//! Text-mode web browser for the model.
//!
//! Pages are cached per URL and navigated through an append-only page stack.
//! Every view is a line-numbered window bounded by a token budget, and links
//! are rewritten as `【id†text†domain】` markers the model can follow by id.

pub mod find;
pub mod links;
pub mod page;
pub mod render;
pub mod search;
pub mod session;
pub mod tool;

pub use links::{domain_of, process_markdown_links, wrap_lines};
pub use page::{BrowserState, Page, WRAP_WIDTH};
pub use render::display_page;
pub use session::{Browser, OpenTarget, SharedBrowser};
pub use tool::{BrowserFindTool, BrowserOpenTool, BrowserSearchTool, BROWSER_FIND, BROWSER_OPEN, BROWSER_SEARCH};

/// True for tools that operate on the shared browser session.
pub fn is_browser_tool(name: &str) -> bool {
    name.starts_with("browser")
}
