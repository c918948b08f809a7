use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use skimmer_agent::{ChatOrchestrator, JsonLinesSink, TurnRequest};
use skimmer_core::Attachment;
use skimmer_providers::OllamaBackend;
use skimmer_tools::web::HttpWebProvider;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct ChatArgs {
    pub prompt: String,
    pub chat: String,
    pub model: Option<String>,
    pub think: bool,
    pub web: bool,
    pub index: Option<usize>,
    pub attach: Vec<PathBuf>,
}

fn read_attachment(path: &PathBuf) -> anyhow::Result<Attachment> {
    let bytes = std::fs::read(path)
        .map_err(|e| anyhow::anyhow!("Failed to read attachment {}: {}", path.display(), e))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(Attachment {
        filename,
        data: STANDARD.encode(bytes),
    })
}

pub async fn run(args: ChatArgs) -> anyhow::Result<()> {
    let (config, store) = super::load_env()?;
    let backend = OllamaBackend::from_config(&config)?;
    let web = HttpWebProvider::from_config(&config)?;

    let attachments = args
        .attach
        .iter()
        .map(read_attachment)
        .collect::<anyhow::Result<Vec<_>>>()?;

    let request = TurnRequest {
        chat_id: args.chat,
        model: args
            .model
            .unwrap_or_else(|| config.agents.defaults.model.clone()),
        prompt: args.prompt,
        think: args.think.then_some(true),
        web_search: args.web,
        index: args.index,
        attachments,
    };

    let orchestrator = ChatOrchestrator::new(&config, Arc::new(backend), Arc::new(store), Arc::new(web));

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping turn");
            on_interrupt.cancel();
        }
    });

    let mut sink = JsonLinesSink::new(std::io::stdout());
    let summary = orchestrator.handle_request(request, &mut sink, cancel).await?;
    info!(
        chat_id = %summary.chat_id,
        passes = summary.passes,
        cancelled = summary.cancelled,
        hit_pass_limit = summary.hit_pass_limit,
        "Chat turn complete"
    );
    Ok(())
}
