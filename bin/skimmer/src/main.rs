mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "skimmer")]
#[command(about = "Streaming chat with a stateful web browsing tool", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one chat turn, streaming events to stdout as JSON lines
    Chat {
        /// Message to send
        prompt: String,

        /// Chat ID ("new" starts a chat)
        #[arg(short, long, default_value = "new")]
        chat: String,

        /// Model name (defaults to agents.defaults.model)
        #[arg(short, long)]
        model: Option<String>,

        /// Ask the model to think before answering
        #[arg(long)]
        think: bool,

        /// Enable web tools for this turn
        #[arg(short, long)]
        web: bool,

        /// Replace the message at this index and everything after it
        #[arg(long)]
        index: Option<usize>,

        /// Files to attach
        #[arg(short, long)]
        attach: Vec<PathBuf>,
    },

    /// Print a stored chat as JSON
    Show {
        /// Chat ID
        chat: String,
    },

    /// Execute a web tool directly against a chat's browser state
    Tool {
        /// Chat ID
        chat: String,

        /// Tool name, e.g. browser.open
        name: String,

        /// JSON arguments
        #[arg(default_value = "{}")]
        params: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout carries the event stream; logs go to stderr
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Chat {
            prompt,
            chat,
            model,
            think,
            web,
            index,
            attach,
        } => {
            commands::chat::run(commands::chat::ChatArgs {
                prompt,
                chat,
                model,
                think,
                web,
                index,
                attach,
            })
            .await?;
        }
        Commands::Show { chat } => {
            commands::show::run(&chat)?;
        }
        Commands::Tool { chat, name, params } => {
            commands::tool::run(&chat, &name, &params).await?;
        }
    }

    Ok(())
}
