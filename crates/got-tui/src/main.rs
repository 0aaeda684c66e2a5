use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use got_client::config::{BASE_URL_ENV, ClientConfig, DEFAULT_BASE_URL};
use got_client::store::{FileStore, IdentityStore, MemoryStore};
use tracing_subscriber::EnvFilter;

mod client;
mod tui;

#[derive(Parser)]
#[command(name = "got")]
#[command(about = "Play Game of Three against another participant", long_about = None)]
struct Cli {
    /// Base address of the game service
    #[arg(short, long, env = BASE_URL_ENV, default_value = DEFAULT_BASE_URL)]
    server: String,

    /// Player name. When given, registration starts right away
    #[arg(short, long)]
    name: Option<String>,

    /// Where the participant and game ids are kept between runs
    #[arg(long, default_value = ".got-session.json")]
    session_file: PathBuf,

    /// Keep ids in memory only
    #[arg(long)]
    ephemeral: bool,

    /// Forget any stored ids before starting
    #[arg(long)]
    fresh: bool,

    /// Seconds between polls of the game service
    #[arg(long, default_value_t = 5)]
    poll_secs: u64,

    /// Write logs to this file (the terminal belongs to the UI)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(path) = &cli.log_file {
        init_logging(path)?;
    }

    let config = ClientConfig::new(&cli.server)?
        .with_poll_interval(Duration::from_secs(cli.poll_secs))?;

    let store: Arc<dyn IdentityStore> = if cli.ephemeral {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(FileStore::new(&cli.session_file))
    };
    if cli.fresh {
        store.clear();
    }

    tracing::info!(server = %config.base_url, "starting");
    client::start_client(config, store, cli.name.as_deref().unwrap_or_default()).await
}

fn init_logging(path: &std::path::Path) -> std::io::Result<()> {
    let file = File::create(path)?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}
