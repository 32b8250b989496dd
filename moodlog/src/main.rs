//! moodlog - AI companion service for a personal diary app.
//!
//! Architecture:
//! - Vendor adapters wrap one AI vendor each (DeepSeek, Zhipu, Gemini)
//! - Fallback routers try the configured vendors in preference order
//! - The companion composes chat, diary writing, transcription and speech
//! - The realtime manager keeps live voice sessions and reaps idle ones
//! - The HTTP server and the CLI are thin layers over the companion

mod cli;
mod companion;
mod config;
mod diary;
mod error;
mod models;
mod prompts;
mod realtime;
mod router;
mod server;
mod vendor;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{execute, Cli};

const DEFAULT_LOG_FILTER: &str = "moodlog=info,tower_http=info";

#[tokio::main]
async fn main() -> Result<()> {
    let env_files = config::load_env_files();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    for path in &env_files {
        tracing::debug!(path = %path.display(), "loaded environment file");
    }

    let cli = Cli::parse();
    execute(cli).await
}
