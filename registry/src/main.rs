use clap::Parser;
use log::info;
use registry::network::RegistryServer;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "2460")]
    port: u16,

    /// Seconds without a heartbeat before a server is dropped
    #[arg(short, long, default_value = "30")]
    timeout_secs: u64,

    /// Maximum number of listed servers
    #[arg(short, long, default_value = "1024")]
    max_servers: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting registry...");
    info!(
        "Heartbeat timeout: {}s, capacity: {} servers",
        args.timeout_secs, args.max_servers
    );

    let address = format!("{}:{}", args.host, args.port);
    let server = RegistryServer::new(
        &address,
        Duration::from_secs(args.timeout_secs),
        args.max_servers,
    )
    .await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
