//! Advertised server bookkeeping for the direct-connect registry
//!
//! This module handles the registry-side table of dedicated servers, including:
//! - Advertisement lifecycle (first advertise, heartbeat refresh, withdraw, timeout)
//! - Join code assignment that stays stable across heartbeats
//! - Case-insensitive name filtering for list requests
//! - Capacity limits on how many servers may be listed at once

use log::info;
use rand::distributions::Alphanumeric;
use rand::Rng;
use shared::protocol::MAX_LIST_LIMIT;
use shared::{MatchmakingSnapshot, ServerIdentity, ServerInfo, ServerRecord};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Length of generated join codes
pub const JOIN_CODE_LEN: usize = 6;

/// A dedicated server that has advertised itself to the registry
#[derive(Debug)]
pub struct AdvertisedServer {
    pub identity: ServerIdentity,
    pub info: ServerInfo,
    pub join_code: String,
    /// Last time a heartbeat arrived, for expiry
    pub last_seen: Instant,
    /// Wall-clock time of the last heartbeat, stamped on snapshots
    pub last_heartbeat_utc: u64,
}

impl AdvertisedServer {
    pub fn new(identity: ServerIdentity, info: ServerInfo, join_code: String, now_utc: u64) -> Self {
        Self {
            identity,
            info,
            join_code,
            last_seen: Instant::now(),
            last_heartbeat_utc: now_utc,
        }
    }

    /// Replaces the published info with a fresh heartbeat
    pub fn refresh(&mut self, info: ServerInfo, now_utc: u64) {
        self.info = info;
        self.last_seen = Instant::now();
        self.last_heartbeat_utc = now_utc;
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }

    /// Snapshot of this server as of its last heartbeat
    pub fn snapshot(&self) -> MatchmakingSnapshot {
        let mut info = self.info.clone();
        info.join_code = Some(self.join_code.clone());
        MatchmakingSnapshot::online(self.last_heartbeat_utc, info)
    }

    fn matches(&self, filter: &str) -> bool {
        shared::matches_name_filter(&self.identity, &self.info.server_name, filter)
    }
}

/// Outcome of an advertise request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvertiseOutcome {
    Registered { join_code: String },
    Refreshed { join_code: String },
    Rejected { reason: String },
}

/// All servers currently listed by the registry
///
/// The directory enforces its capacity limit, expires servers whose heartbeats
/// stop, and answers list and status queries from browsers.
pub struct ServerDirectory {
    servers: HashMap<ServerIdentity, AdvertisedServer>,
    max_servers: usize,
    timeout: Duration,
}

impl ServerDirectory {
    pub fn new(max_servers: usize, timeout: Duration) -> Self {
        Self {
            servers: HashMap::new(),
            max_servers,
            timeout,
        }
    }

    /// Registers a new server or refreshes an existing advertisement
    ///
    /// Only valid direct identities can be listed. A known server keeps its
    /// join code; a new one is rejected once the directory is full.
    pub fn advertise(
        &mut self,
        identity: ServerIdentity,
        info: ServerInfo,
        now_utc: u64,
    ) -> AdvertiseOutcome {
        if identity.as_direct().is_none() || !identity.is_valid() {
            return AdvertiseOutcome::Rejected {
                reason: format!("{} is not a valid dedicated server address", identity),
            };
        }

        if let Some(server) = self.servers.get_mut(&identity) {
            server.refresh(info, now_utc);
            return AdvertiseOutcome::Refreshed {
                join_code: server.join_code.clone(),
            };
        }

        if self.servers.len() >= self.max_servers {
            return AdvertiseOutcome::Rejected {
                reason: "Registry full".to_string(),
            };
        }

        let join_code = self.unused_join_code();
        info!(
            "Server {} ({}) listed with join code {}",
            identity, info.server_name, join_code
        );
        self.servers.insert(
            identity.clone(),
            AdvertisedServer::new(identity, info, join_code.clone(), now_utc),
        );

        AdvertiseOutcome::Registered { join_code }
    }

    /// Removes a server, returning whether it was listed
    pub fn withdraw(&mut self, identity: &ServerIdentity) -> bool {
        if let Some(server) = self.servers.remove(identity) {
            info!("Server {} withdrawn", server.identity);
            true
        } else {
            false
        }
    }

    /// Lists servers whose name contains `filter`, ignoring case
    ///
    /// Returns the total number of matches alongside at most `limit` records,
    /// ordered by name so repeated requests page consistently.
    pub fn list(&self, filter: &str, limit: u32) -> (u32, Vec<ServerRecord>) {
        let filter = filter.trim().to_lowercase();
        let limit = limit.min(MAX_LIST_LIMIT) as usize;

        let mut matches: Vec<&AdvertisedServer> = self
            .servers
            .values()
            .filter(|server| server.matches(&filter))
            .collect();
        matches.sort_by(|a, b| {
            a.info
                .server_name
                .to_lowercase()
                .cmp(&b.info.server_name.to_lowercase())
                .then_with(|| a.identity.to_string().cmp(&b.identity.to_string()))
        });

        let total = matches.len() as u32;
        let records = matches
            .into_iter()
            .take(limit)
            .map(|server| ServerRecord::new(server.identity.clone(), server.snapshot()))
            .collect();

        (total, records)
    }

    /// Current status of one server; unknown servers report offline as of `now_utc`
    pub fn query(&self, identity: &ServerIdentity, now_utc: u64) -> MatchmakingSnapshot {
        match self.servers.get(identity) {
            Some(server) => server.snapshot(),
            None => MatchmakingSnapshot::offline(now_utc),
        }
    }

    /// Removes servers whose heartbeats stopped, returning their identities
    pub fn check_timeouts(&mut self) -> Vec<ServerIdentity> {
        let timeout = self.timeout;
        let timed_out: Vec<ServerIdentity> = self
            .servers
            .iter()
            .filter(|(_, server)| server.is_timed_out(timeout))
            .map(|(identity, _)| identity.clone())
            .collect();

        for identity in &timed_out {
            if self.servers.remove(identity).is_some() {
                info!("Server {} timed out", identity);
            }
        }

        timed_out
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    fn unused_join_code(&self) -> String {
        let mut rng = rand::thread_rng();
        loop {
            let code: String = (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(JOIN_CODE_LEN)
                .map(|b| char::from(b).to_ascii_uppercase())
                .collect();
            if !self.servers.values().any(|server| server.join_code == code) {
                return code;
            }
        }
    }
}
