use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mizzle::server::{Server, ServerContext};

/// mizzle server - wire-protocol demo server
#[derive(Parser, Debug)]
#[command(name = "mizzle-server")]
#[command(version, about, disable_help_flag = true)]
struct Args {
    /// Listening host
    #[arg(short = 'h', long, default_value = "localhost")]
    host: String,

    /// Listening TCP port
    #[arg(short = 'p', long)]
    port: u16,

    /// Print help
    #[arg(long, action = clap::ArgAction::Help)]
    help: Option<bool>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let listener = TcpListener::bind((args.host.as_str(), args.port))
        .await
        .with_context(|| format!("failed to listen on {}:{}", args.host, args.port))?;
    info!(host = %args.host, port = args.port, "listening");

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
                shutdown.cancel();
            }
        }
    });

    let server = Server::new(listener, ServerContext::default());
    server.serve(shutdown).await?;

    Ok(())
}
