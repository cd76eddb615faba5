//! Registry network layer handling TCP connections and heartbeat expiry

use crate::directory::{AdvertiseOutcome, ServerDirectory};
use log::{debug, error, info, warn};
use shared::protocol::{read_frame, write_frame, FrameError};
use shared::{unix_millis, RegistryRequest, RegistryResponse};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;

/// How often expired advertisements are swept
const TIMEOUT_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Direct-connect registry serving advertise, list and query requests
pub struct RegistryServer {
    listener: TcpListener,
    directory: Arc<RwLock<ServerDirectory>>,
}

impl RegistryServer {
    pub async fn new(
        addr: &str,
        heartbeat_timeout: Duration,
        max_servers: usize,
    ) -> Result<Self, FrameError> {
        let listener = TcpListener::bind(addr).await?;
        info!("Registry listening on {}", listener.local_addr()?);

        Ok(RegistryServer {
            listener,
            directory: Arc::new(RwLock::new(ServerDirectory::new(
                max_servers,
                heartbeat_timeout,
            ))),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, FrameError> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared handle to the directory, for inspection while the server runs
    pub fn directory(&self) -> Arc<RwLock<ServerDirectory>> {
        Arc::clone(&self.directory)
    }

    /// Spawns task that expires servers whose heartbeats stopped
    fn spawn_timeout_checker(&self) {
        let directory = Arc::clone(&self.directory);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TIMEOUT_CHECK_INTERVAL);

            loop {
                interval.tick().await;

                let expired = {
                    let mut directory = directory.write().await;
                    directory.check_timeouts()
                };

                if !expired.is_empty() {
                    debug!("Expired {} advertisement(s)", expired.len());
                }
            }
        });
    }

    /// Serves one browser or dedicated server until it disconnects
    async fn handle_connection(
        mut stream: TcpStream,
        peer: SocketAddr,
        directory: Arc<RwLock<ServerDirectory>>,
    ) -> Result<(), FrameError> {
        while let Some(request) = read_frame::<_, RegistryRequest>(&mut stream).await? {
            let response = handle_request(&directory, request).await;
            write_frame(&mut stream, &response).await?;
        }

        debug!("Connection from {} closed", peer);
        Ok(())
    }

    /// Main accept loop, serving every connection on its own task
    pub async fn run(self) -> Result<(), FrameError> {
        self.spawn_timeout_checker();

        info!("Registry started successfully");

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    continue;
                }
            };

            let directory = Arc::clone(&self.directory);
            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, peer, directory).await {
                    warn!("Connection from {} failed: {}", peer, e);
                }
            });
        }
    }
}

/// Applies one request to the directory and builds its response
pub async fn handle_request(
    directory: &RwLock<ServerDirectory>,
    request: RegistryRequest,
) -> RegistryResponse {
    match request {
        RegistryRequest::Advertise { identity, info } => {
            let outcome = {
                let mut directory = directory.write().await;
                directory.advertise(identity, info, unix_millis())
            };

            match outcome {
                AdvertiseOutcome::Registered { join_code }
                | AdvertiseOutcome::Refreshed { join_code } => {
                    RegistryResponse::Advertised { join_code }
                }
                AdvertiseOutcome::Rejected { reason } => RegistryResponse::Error { reason },
            }
        }

        RegistryRequest::Withdraw { identity } => {
            let removed = directory.write().await.withdraw(&identity);
            RegistryResponse::Withdrawn { removed }
        }

        RegistryRequest::List { filter, limit } => {
            let (total, servers) = directory.read().await.list(&filter, limit);
            debug!(
                "List {:?}: {} match(es), returning {}",
                filter,
                total,
                servers.len()
            );
            RegistryResponse::ServerList { total, servers }
        }

        RegistryRequest::Query { identity } => {
            if !identity.is_valid() {
                return RegistryResponse::Error {
                    reason: format!("{} is not a valid identity", identity),
                };
            }
            let snapshot = directory.read().await.query(&identity, unix_millis());
            RegistryResponse::Status { snapshot }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{OnlineStatus, ServerIdentity, ServerInfo};

    fn directory() -> RwLock<ServerDirectory> {
        RwLock::new(ServerDirectory::new(8, Duration::from_secs(5)))
    }

    fn advertise(name: &str, addr: &str) -> RegistryRequest {
        RegistryRequest::Advertise {
            identity: ServerIdentity::direct(addr),
            info: ServerInfo {
                server_name: name.to_string(),
                ..ServerInfo::default()
            },
        }
    }

    #[tokio::test]
    async fn test_advertise_then_list() {
        let directory = directory();

        let response = handle_request(&directory, advertise("Ironforge", "10.0.0.1:2456")).await;
        assert!(matches!(response, RegistryResponse::Advertised { .. }));

        let response = handle_request(
            &directory,
            RegistryRequest::List {
                filter: "iron".to_string(),
                limit: 10,
            },
        )
        .await;

        match response {
            RegistryResponse::ServerList { total, servers } => {
                assert_eq!(total, 1);
                assert_eq!(servers[0].snapshot.server_name(), "Ironforge");
                assert_eq!(servers[0].identity, ServerIdentity::direct("10.0.0.1"));
            }
            other => panic!("Unexpected response: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rejected_advertise_is_error() {
        let directory = directory();
        let response = handle_request(&directory, advertise("bad", "")).await;
        assert!(matches!(response, RegistryResponse::Error { .. }));
    }

    #[tokio::test]
    async fn test_query_reports_status() {
        let directory = directory();
        handle_request(&directory, advertise("Up", "10.0.0.2:2456")).await;

        let response = handle_request(
            &directory,
            RegistryRequest::Query {
                identity: ServerIdentity::direct("10.0.0.2:2456"),
            },
        )
        .await;
        match response {
            RegistryResponse::Status { snapshot } => {
                assert_eq!(snapshot.online_status(), OnlineStatus::Online);
            }
            other => panic!("Unexpected response: {:?}", other),
        }

        let response = handle_request(
            &directory,
            RegistryRequest::Query {
                identity: ServerIdentity::direct("10.0.0.3:2456"),
            },
        )
        .await;
        match response {
            RegistryResponse::Status { snapshot } => {
                assert_eq!(snapshot.online_status(), OnlineStatus::Offline);
            }
            other => panic!("Unexpected response: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_query_invalid_identity_is_error() {
        let directory = directory();
        let response = handle_request(
            &directory,
            RegistryRequest::Query {
                identity: ServerIdentity::None,
            },
        )
        .await;
        assert!(matches!(response, RegistryResponse::Error { .. }));
    }

    #[tokio::test]
    async fn test_withdraw_round_trip() {
        let directory = directory();
        handle_request(&directory, advertise("Gone", "10.0.0.4:2456")).await;

        let response = handle_request(
            &directory,
            RegistryRequest::Withdraw {
                identity: ServerIdentity::direct("10.0.0.4:2456"),
            },
        )
        .await;
        assert!(matches!(response, RegistryResponse::Withdrawn { removed: true }));
        assert!(directory.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_server_over_tcp() {
        let server = RegistryServer::new("127.0.0.1:0", Duration::from_secs(5), 8)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());

        let mut stream = TcpStream::connect(addr).await.unwrap();
        write_frame(&mut stream, &advertise("Tcp World", "10.0.0.9:2456"))
            .await
            .unwrap();
        let response: RegistryResponse = read_frame(&mut stream).await.unwrap().unwrap();
        assert!(matches!(response, RegistryResponse::Advertised { .. }));

        write_frame(
            &mut stream,
            &RegistryRequest::List {
                filter: String::new(),
                limit: 10,
            },
        )
        .await
        .unwrap();
        let response: RegistryResponse = read_frame(&mut stream).await.unwrap().unwrap();
        match response {
            RegistryResponse::ServerList { total, .. } => assert_eq!(total, 1),
            other => panic!("Unexpected response: {:?}", other),
        }
    }
}
