pub mod browser;
pub mod html_to_md;
pub mod registry;
pub mod web;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use skimmer_core::{Error, Result};
use std::future::Future;
use tokio_util::sync::CancellationToken;

pub use registry::ToolRegistry;

/// Truncate a string to at most `max_bytes` bytes, respecting UTF-8 char boundaries.
pub fn safe_truncate(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[derive(Clone, Debug, Default)]
pub struct ToolContext {
    pub chat_id: String,
    pub cancel: CancellationToken,
}

impl ToolContext {
    pub fn new(chat_id: &str) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            cancel: CancellationToken::new(),
        }
    }

    /// Runs `work` unless the turn is cancelled first.
    pub async fn until_cancelled<T>(&self, what: &str, work: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled(format!("{} cancelled", what))),
            result = work => result,
        }
    }
}

pub struct ToolSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// What a tool hands back: a structured payload plus the text shown to the model.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub result: Value,
    pub content: String,
}

impl ToolOutput {
    pub fn new(result: Value, content: String) -> Self {
        Self { result, content }
    }
}

/// A tool with typed arguments. Arguments are decoded once, at the registry boundary.
#[async_trait]
pub trait Tool: Send + Sync {
    type Args: DeserializeOwned + Send;

    fn schema(&self) -> ToolSchema;
    async fn execute(&self, ctx: &ToolContext, args: Self::Args) -> Result<ToolOutput>;
}

/// Object-safe view of a [`Tool`], taking raw JSON arguments.
#[async_trait]
pub trait DynTool: Send + Sync {
    fn schema(&self) -> ToolSchema;
    async fn call(&self, ctx: &ToolContext, params: Value) -> Result<ToolOutput>;
}

#[async_trait]
impl<T: Tool> DynTool for T {
    fn schema(&self) -> ToolSchema {
        Tool::schema(self)
    }

    async fn call(&self, ctx: &ToolContext, params: Value) -> Result<ToolOutput> {
        let params = if params.is_null() {
            Value::Object(Default::default())
        } else {
            params
        };
        let args: T::Args = serde_json::from_value(params).map_err(|e| {
            Error::Validation(format!("invalid arguments for {}: {}", Tool::schema(self).name, e))
        })?;
        let name = Tool::schema(self).name;
        ctx.until_cancelled(name, self.execute(ctx, args)).await
    }
}
