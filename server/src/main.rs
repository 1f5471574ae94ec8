use clap::Parser;
use log::{error, info};
use server::network::Server;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "3000")]
    port: u16,

    /// Milliseconds between simulation ticks
    #[arg(
        short,
        long,
        default_value_t = shared::TICK_INTERVAL_MS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    tick_ms: u64,

    /// Maximum number of connected clients, spectators included
    #[arg(short, long, default_value = "32")]
    max_clients: usize,

    /// Seconds of silence before a client is dropped
    #[arg(long, default_value = "5")]
    client_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);

    info!(
        "Starting server on {} ({}ms ticks, {} max clients)",
        address, args.tick_ms, args.max_clients
    );

    let mut server = Server::new(
        &address,
        Duration::from_millis(args.tick_ms),
        args.max_clients,
        Duration::from_secs(args.client_timeout_secs),
    )
    .await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
