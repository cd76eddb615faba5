//! Backend for the direct-connect registry
//!
//! Every request runs on its own tokio task over a short-lived TCP
//! connection. Results are sent back as [`RegistryEvent`]s and applied in
//! `tick()`, so listeners and refresh callbacks only ever run on the browser
//! thread. The registry filters by name itself; the last filter text is also
//! applied locally so typing narrows the list before the re-query lands.

use crate::backend::{Backend, ListUpdatedListener, RefreshCallback, RefreshKind};
use crate::event::{Listeners, SubscriptionId};
use crate::listing::ServerListing;
use log::{debug, info, warn};
use shared::protocol::{read_frame, write_frame, FrameError, MAX_LIST_LIMIT};
use shared::{
    unix_millis, IdentityKind, MatchmakingSnapshot, OnlineStatus, RegistryRequest,
    RegistryResponse, ServerIdentity, ServerRecord,
};
use std::collections::HashMap;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::timeout;

/// Per-server status queries allowed in flight
pub const DEFAULT_MAX_PENDING: usize = 8;

/// Longest a single request may take, connection included
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Results handed from request tasks back to the backend
#[derive(Debug)]
enum RegistryEvent {
    List(Result<(u32, Vec<ServerRecord>), String>),
    Status {
        identity: ServerIdentity,
        snapshot: MatchmakingSnapshot,
    },
    /// The registry could not tell; says nothing about the server itself
    StatusFailed { identity: ServerIdentity },
}

/// Sends one request on a fresh connection and waits for its response
pub async fn exchange(
    address: &str,
    request: &RegistryRequest,
    limit: Duration,
) -> Result<RegistryResponse, FrameError> {
    let round_trip = async {
        let mut stream = TcpStream::connect(address).await?;
        write_frame(&mut stream, request).await?;
        match read_frame(&mut stream).await? {
            Some(response) => Ok::<RegistryResponse, FrameError>(response),
            None => Err("registry closed the connection".into()),
        }
    };

    match timeout(limit, round_trip).await {
        Ok(result) => result,
        Err(_) => Err(format!("no response from {} within {:?}", address, limit).into()),
    }
}

pub struct RegistryBackend {
    name: String,
    address: String,
    request_timeout: Duration,
    list_limit: u32,
    max_pending: usize,

    available: bool,
    total: u32,
    listing: ServerListing,

    list_in_flight: bool,
    list_queued: bool,
    pending: HashMap<ServerIdentity, RefreshCallback>,

    changed: bool,
    listeners: Listeners<dyn FnMut()>,
    sender: UnboundedSender<RegistryEvent>,
    receiver: UnboundedReceiver<RegistryEvent>,
}

impl RegistryBackend {
    /// A backend talking to the registry at `address` (`host:port`)
    pub fn new(address: &str) -> Self {
        let (sender, receiver) = unbounded_channel();

        Self {
            name: format!("registry {}", address),
            address: address.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            list_limit: MAX_LIST_LIMIT,
            max_pending: DEFAULT_MAX_PENDING,
            available: true,
            total: 0,
            listing: ServerListing::new(),
            list_in_flight: false,
            list_queued: false,
            pending: HashMap::new(),
            changed: false,
            listeners: Listeners::new(),
            sender,
            receiver,
        }
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    pub fn with_list_limit(mut self, list_limit: u32) -> Self {
        self.list_limit = list_limit.min(MAX_LIST_LIMIT);
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Whether a list request is on its way
    pub fn is_list_in_flight(&self) -> bool {
        self.list_in_flight
    }

    fn start_list(&mut self) {
        self.list_in_flight = true;

        let address = self.address.clone();
        let request = RegistryRequest::List {
            filter: self.listing.filter().to_string(),
            limit: self.list_limit,
        };
        let request_timeout = self.request_timeout;
        let sender = self.sender.clone();

        debug!("{}: requesting list {:?}", self.name, self.listing.filter());
        tokio::spawn(async move {
            let result = match exchange(&address, &request, request_timeout).await {
                Ok(RegistryResponse::ServerList { total, servers }) => Ok((total, servers)),
                Ok(RegistryResponse::Error { reason }) => Err(reason),
                Ok(other) => Err(format!("unexpected response {:?}", other)),
                Err(e) => Err(e.to_string()),
            };
            let _ = sender.send(RegistryEvent::List(result));
        });
    }

    fn start_query(&self, identity: ServerIdentity) {
        let address = self.address.clone();
        let request_timeout = self.request_timeout;
        let sender = self.sender.clone();

        tokio::spawn(async move {
            let request = RegistryRequest::Query {
                identity: identity.clone(),
            };
            let event = match exchange(&address, &request, request_timeout).await {
                Ok(RegistryResponse::Status { snapshot }) => {
                    RegistryEvent::Status { identity, snapshot }
                }
                Ok(RegistryResponse::Error { reason }) => {
                    warn!("Registry refused status of {}: {}", identity, reason);
                    RegistryEvent::StatusFailed { identity }
                }
                Ok(other) => {
                    warn!("Unexpected status response for {}: {:?}", identity, other);
                    RegistryEvent::StatusFailed { identity }
                }
                Err(e) => {
                    warn!("Status query for {} failed: {}", identity, e);
                    RegistryEvent::StatusFailed { identity }
                }
            };
            let _ = sender.send(event);
        });
    }

    fn handle_event(&mut self, event: RegistryEvent) {
        match event {
            RegistryEvent::List(Ok((total, servers))) => {
                if !self.available {
                    info!("{}: available again", self.name);
                }
                debug!("{}: {} of {} server(s) listed", self.name, servers.len(), total);
                self.available = true;
                self.total = total;
                self.listing.set_records(servers);
                self.changed = true;
                self.finish_list();
            }

            RegistryEvent::List(Err(reason)) => {
                warn!("{}: list request failed: {}", self.name, reason);
                self.available = false;
                self.total = 0;
                self.listing.clear();
                self.changed = true;
                self.finish_list();
            }

            RegistryEvent::Status { identity, snapshot } => {
                if snapshot.online_status() != OnlineStatus::NotAvailable {
                    self.available = true;
                }
                if self.listing.record_status(&identity, &snapshot) {
                    self.changed = true;
                }
                if let Some(callback) = self.pending.remove(&identity) {
                    callback(&identity, &snapshot);
                }
            }

            RegistryEvent::StatusFailed { identity } => {
                // Reported to the caller but never stored, so neither the
                // listed record nor the scheduler's freshness check sees it
                if let Some(callback) = self.pending.remove(&identity) {
                    callback(&identity, &MatchmakingSnapshot::not_available(unix_millis()));
                }
            }
        }
    }

    fn finish_list(&mut self) {
        self.list_in_flight = false;
        if std::mem::take(&mut self.list_queued) {
            self.start_list();
        }
    }
}

impl Backend for RegistryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn public_server_count(&self) -> u32 {
        self.total
    }

    fn filtered_public_server_list(&self) -> &[ServerRecord] {
        self.listing.filtered()
    }

    fn server_side_filtering(&self) -> bool {
        true
    }

    fn subscribe(&mut self, listener: ListUpdatedListener) -> SubscriptionId {
        self.listeners.subscribe(listener)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        self.listeners.unsubscribe(id);
    }

    fn refresh_public_server_list(&mut self, _kind: RefreshKind) {
        // Both kinds re-run the list query with the current filter
        if self.list_in_flight {
            self.list_queued = true;
        } else {
            self.start_list();
        }
    }

    fn set_public_server_list_filter(&mut self, filter: &str) {
        if self.listing.set_filter(filter) {
            self.changed = true;
        }
    }

    fn can_refresh_server_now(&self) -> bool {
        self.pending.len() < self.max_pending
    }

    fn can_refresh_server_of_type_now(&self, kind: IdentityKind) -> bool {
        kind == IdentityKind::Direct && self.can_refresh_server_now()
    }

    fn refresh_server(&mut self, identity: &ServerIdentity, callback: RefreshCallback) -> bool {
        if !identity.is_valid()
            || !self.can_refresh_server_of_type_now(identity.kind())
            || self.pending.contains_key(identity)
        {
            return false;
        }

        debug!("{}: querying {}", self.name, identity);
        self.pending.insert(identity.clone(), callback);
        self.start_query(identity.clone());
        true
    }

    fn is_pending(&self, identity: &ServerIdentity) -> bool {
        self.pending.contains_key(identity)
    }

    fn get_server_matchmaking_data(
        &self,
        identity: &ServerIdentity,
        newer_than_utc: u64,
    ) -> MatchmakingSnapshot {
        self.listing.freshest(identity, newer_than_utc)
    }

    fn tick(&mut self) {
        while let Ok(event) = self.receiver.try_recv() {
            self.handle_event(event);
        }
        self.listing.prune_known();

        if std::mem::take(&mut self.changed) {
            self.listeners.for_each(|listener| listener());
        }
    }
}
