use serde_json::Value;
use skimmer_agent::TurnTools;
use skimmer_core::Chat;
use skimmer_storage::ChatStore;
use skimmer_tools::browser::is_browser_tool;
use skimmer_tools::web::HttpWebProvider;
use skimmer_tools::ToolContext;
use std::sync::Arc;
use tracing::debug;

/// Runs one tool outside a turn. Browser tools read the chat's recovered
/// state and write the result back, so calls can be chained.
pub async fn run(chat_id: &str, name: &str, params_json: &str) -> anyhow::Result<()> {
    let (config, store) = super::load_env()?;
    let web = HttpWebProvider::from_config(&config)?;

    let params: Value = serde_json::from_str(params_json)
        .map_err(|e| anyhow::anyhow!("Failed to parse JSON params: {}\nInput: {}", e, params_json))?;

    let chat = match store.load_chat(chat_id, false)? {
        Some(chat) => chat,
        None => {
            let chat = Chat::new(chat_id);
            store.save_chat(&chat)?;
            chat
        }
    };

    let tools = TurnTools::setup(
        &config.tools.web,
        config.agents.defaults.view_tokens,
        &chat,
        true,
        Arc::new(web),
    );
    if tools.registry.get(name).is_none() {
        anyhow::bail!(
            "Tool '{}' is not available. Available tools: {}",
            name,
            tools.registry.tool_names().join(", ")
        );
    }

    let ctx = ToolContext::new(chat_id);
    let output = tools.registry.execute(name, &ctx, params).await?;

    if is_browser_tool(name) {
        if let Some(state) = tools.browser_state().await {
            store.set_browser_state(chat_id, &state)?;
            debug!(chat_id, tool = name, "Browser state saved");
        }
    }

    if output.content.is_empty() {
        println!("{}", serde_json::to_string_pretty(&output.result)?);
    } else {
        println!("{}", output.content);
    }
    Ok(())
}
