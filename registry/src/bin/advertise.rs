//! Stand-in dedicated server that keeps itself listed on a registry

use clap::Parser;
use log::{error, info, warn};
use shared::protocol::{read_frame, write_frame, FrameError};
use shared::{RegistryRequest, RegistryResponse, ServerIdentity, ServerInfo};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::interval;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Registry address
    #[arg(short, long, default_value = "127.0.0.1:2460")]
    registry: String,

    /// Address players connect to, `host[:port]`
    #[arg(short, long, default_value = "127.0.0.1:2456")]
    address: String,

    /// Advertised server name
    #[arg(short, long, default_value = "Test Server")]
    name: String,

    /// Maximum player count
    #[arg(short = 'l', long, default_value = "10")]
    player_limit: u32,

    /// Seconds between heartbeats
    #[arg(short = 'i', long, default_value = "10")]
    interval_secs: u64,
}

async fn exchange(
    stream: &mut TcpStream,
    request: &RegistryRequest,
) -> Result<RegistryResponse, FrameError> {
    write_frame(stream, request).await?;
    read_frame(stream)
        .await?
        .ok_or_else(|| "registry closed the connection".into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    let args = Args::parse();

    let identity = ServerIdentity::direct(&args.address);
    if !identity.is_valid() {
        return Err(format!("invalid server address {:?}", args.address).into());
    }

    let info = ServerInfo {
        server_name: args.name.clone(),
        player_limit: args.player_limit,
        game_version: env!("CARGO_PKG_VERSION").to_string(),
        ..ServerInfo::default()
    };

    let mut stream = TcpStream::connect(&args.registry).await?;
    info!("Connected to registry at {}", args.registry);

    let advertise = RegistryRequest::Advertise {
        identity: identity.clone(),
        info,
    };
    let mut heartbeat = interval(Duration::from_secs(args.interval_secs.max(1)));

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                match exchange(&mut stream, &advertise).await {
                    Ok(RegistryResponse::Advertised { join_code }) => {
                        info!("{} listed as {} (join code {})", args.name, identity, join_code);
                    }
                    Ok(RegistryResponse::Error { reason }) => {
                        warn!("Registry rejected advertisement: {}", reason);
                    }
                    Ok(other) => warn!("Unexpected response: {:?}", other),
                    Err(e) => {
                        error!("Heartbeat failed: {}", e);
                        return Err(e);
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                let withdraw = RegistryRequest::Withdraw { identity: identity.clone() };
                if let Err(e) = exchange(&mut stream, &withdraw).await {
                    warn!("Failed to withdraw: {}", e);
                }
                info!("Withdrawn, shutting down");
                return Ok(());
            }
        }
    }
}
