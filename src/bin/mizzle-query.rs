use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mizzle::client::Session;

/// mizzle query tool - send one SQL string and print the result summary
#[derive(Parser, Debug)]
#[command(name = "mizzle-query")]
#[command(version, about)]
struct Args {
    /// Server host
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server TCP port
    #[arg(short = 'P', long, default_value_t = 3306)]
    port: u16,

    /// Username to announce in the handshake
    #[arg(short = 'u', long, default_value = "root")]
    user: String,

    /// SQL to execute
    sql: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let mut session = Session::connect(&args.host, args.port, &args.user)
        .await
        .with_context(|| format!("failed to connect to {}:{}", args.host, args.port))?;
    println!("Connected to {}", session.server_version());

    let result = session.query(&args.sql).await?;
    println!(
        "Result: affected_rows={} last_insert_id={} warnings={}",
        result.affected_rows, result.last_insert_id, result.warnings
    );
    if !result.info.is_empty() {
        println!("        info={}", result.info);
    }

    session.quit().await?;
    Ok(())
}
