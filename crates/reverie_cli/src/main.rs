mod commands;
mod logging;
mod repl;

use anyhow::{Context, Result};
use clap::Parser;
use reverie_core::ReverieConfig;
use reverie_reasoning::llm::LlmClient;
use reverie_reasoning::providers::{self, FallbackClient};
use reverie_reasoning::Mind;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "reverie", author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file; missing files fall back to defaults
    #[arg(short, long, default_value = "reverie.toml", env = "REVERIE_CONFIG")]
    config: PathBuf,

    /// Memory database path (overrides the config file)
    #[arg(short, long)]
    db: Option<String>,

    /// Chat only, without the background thought loop
    #[arg(long)]
    no_daemon: bool,

    /// Emit console logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Also write daily-rotated log files into this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    let _log_guard = logging::init(args.json_logs, args.log_dir.as_deref())?;

    let mut config = ReverieConfig::load_or_default(&args.config);
    if let Some(db) = args.db {
        config.memory.db_path = db;
    }

    let (thought_llm, conversation_llm) = build_backends(&config)?;
    info!(
        "Backends: thoughts via {} ({}), conversation via {}",
        thought_llm.name(),
        config.thought_llm.model,
        conversation_llm.name()
    );

    info!("Opening memory at {}", config.memory.db_path);
    let mind = Arc::new(Mind::open(&config, thought_llm, conversation_llm).await?);
    if mind.boot().await.context("Boot failed")? {
        println!("First activation. Hello.");
    }
    if !args.no_daemon {
        mind.start().await;
    }

    let session = repl::run(mind.clone(), history_path()).await;
    mind.shutdown().await;
    session
}

/// Thought backend first; the conversation backend falls back to it when it
/// cannot be built or, if configured, when it fails at runtime.
fn build_backends(config: &ReverieConfig) -> Result<(Arc<dyn LlmClient>, Arc<dyn LlmClient>)> {
    let thought = providers::from_config(&config.thought_llm).context("Failed to build the thought backend")?;

    let conversation = match providers::from_config(&config.conversation_llm) {
        Ok(client) => client,
        Err(e) => {
            warn!("Conversation backend unavailable ({:#}); using the thought backend", e);
            return Ok((thought.clone(), thought));
        }
    };

    if config.dialogue.fallback_to_thought_backend {
        let chained: Arc<dyn LlmClient> = Arc::new(
            FallbackClient::new(conversation, thought.clone())
                .with_primary_timeout(config.dialogue.primary_timeout()),
        );
        Ok((thought, chained))
    } else {
        Ok((thought, conversation))
    }
}

fn history_path() -> Option<PathBuf> {
    let dir = dirs::data_dir()?.join("reverie");
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir.join("history.txt"))
}
