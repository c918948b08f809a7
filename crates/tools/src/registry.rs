use serde_json::{json, Value};
use skimmer_core::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::{DynTool, ToolContext, ToolOutput};

/// Tools available to one turn, kept in registration order so the model
/// always sees the same schema list.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn DynTool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn DynTool>) {
        let name = tool.schema().name.to_string();
        debug!(name = %name, "Registering tool");
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn DynTool>> {
        self.tools.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn available_schemas(&self) -> Vec<Value> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| {
                let schema = tool.schema();
                json!({
                    "type": "function",
                    "function": {
                        "name": schema.name,
                        "description": schema.description,
                        "parameters": schema.parameters
                    }
                })
            })
            .collect()
    }

    pub async fn execute(&self, name: &str, ctx: &ToolContext, params: Value) -> Result<ToolOutput> {
        let tool = self
            .get(name)
            .ok_or_else(|| Error::Tool(format!("Unknown tool: {}", name)))?;
        debug!(tool = name, chat_id = %ctx.chat_id, "Executing tool");
        tool.call(ctx, params).await
    }
}
