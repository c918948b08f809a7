use skimmer_agent::display_chat;
use skimmer_storage::ChatStore;

pub fn run(chat_id: &str) -> anyhow::Result<()> {
    let (_, store) = super::load_env()?;
    let chat = store
        .load_chat(chat_id, false)?
        .ok_or_else(|| anyhow::anyhow!("Chat '{}' not found", chat_id))?;
    println!("{}", serde_json::to_string_pretty(&display_chat(chat))?);
    Ok(())
}
