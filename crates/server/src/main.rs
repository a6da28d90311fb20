//! Tallybook record store server.
//!
//! Usage:
//!   tallybook-server --port 7641 --db tallybook.db

use anyhow::Result;
use clap::Parser;
use tallybook_engine::Engine;
use tallybook_server::TcpServer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tallybook-server")]
#[command(about = "Schema-enforced record store over TCP")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "7641")]
    port: u16,

    /// Path to the SQLite database file
    #[arg(long, default_value = "tallybook.db")]
    db: String,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    info!("opening store at {}", args.db);
    let engine = Engine::open(&args.db)?;

    let server = TcpServer::bind(engine, args.port).await?;
    server.run().await?;
    Ok(())
}
