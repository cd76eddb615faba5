//! Timestamped matchmaking facts reported by discovery backends

use crate::identity::ServerIdentity;
use serde::{Deserialize, Serialize};

/// Reachability of a server at the moment a snapshot was taken
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OnlineStatus {
    /// The backend could not determine the status
    #[default]
    NotAvailable,
    Offline,
    Online,
}

/// Descriptive data a server publishes about itself
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub server_name: String,
    pub player_count: u32,
    pub player_limit: u32,
    /// Identity of the player or machine hosting the world
    pub host_user: ServerIdentity,
    pub game_version: String,
    pub network_version: u32,
    pub join_code: Option<String>,
    pub is_password_protected: bool,
    /// Platform the server is locked to, empty when crossplay is enabled
    pub platform_restriction: String,
    pub modifiers: Vec<String>,
}

/// Immutable report about one identity's state, as seen by one backend
///
/// A newer report replaces the previous value; snapshots are never edited in
/// place, so the fields are only reachable through accessors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchmakingSnapshot {
    timestamp_utc: Option<u64>,
    online_status: OnlineStatus,
    info: ServerInfo,
}

impl MatchmakingSnapshot {
    /// A snapshot carrying no fact at all
    pub fn invalid() -> Self {
        Self::default()
    }

    pub fn online(timestamp_utc: u64, info: ServerInfo) -> Self {
        Self {
            timestamp_utc: Some(timestamp_utc),
            online_status: OnlineStatus::Online,
            info,
        }
    }

    pub fn offline(timestamp_utc: u64) -> Self {
        Self {
            timestamp_utc: Some(timestamp_utc),
            online_status: OnlineStatus::Offline,
            info: ServerInfo::default(),
        }
    }

    pub fn not_available(timestamp_utc: u64) -> Self {
        Self {
            timestamp_utc: Some(timestamp_utc),
            online_status: OnlineStatus::NotAvailable,
            info: ServerInfo::default(),
        }
    }

    /// Milliseconds since the Unix epoch when the fact was observed
    pub fn timestamp_utc(&self) -> Option<u64> {
        self.timestamp_utc
    }

    pub fn is_valid(&self) -> bool {
        self.timestamp_utc.is_some()
    }

    /// True when this snapshot was observed strictly after `other`
    pub fn is_newer_than(&self, other: &MatchmakingSnapshot) -> bool {
        self.timestamp_utc > other.timestamp_utc
    }

    /// True when this snapshot is valid and strictly newer than `threshold_utc`
    pub fn is_newer_than_time(&self, threshold_utc: u64) -> bool {
        self.timestamp_utc.map_or(false, |ts| ts > threshold_utc)
    }

    pub fn online_status(&self) -> OnlineStatus {
        self.online_status
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    pub fn server_name(&self) -> &str {
        &self.info.server_name
    }

    pub fn player_count(&self) -> u32 {
        self.info.player_count
    }

    pub fn player_limit(&self) -> u32 {
        self.info.player_limit
    }

    pub fn host_user(&self) -> &ServerIdentity {
        &self.info.host_user
    }

    pub fn game_version(&self) -> &str {
        &self.info.game_version
    }

    pub fn network_version(&self) -> u32 {
        self.info.network_version
    }

    pub fn join_code(&self) -> Option<&str> {
        self.info.join_code.as_deref()
    }

    pub fn is_password_protected(&self) -> bool {
        self.info.is_password_protected
    }

    pub fn platform_restriction(&self) -> &str {
        &self.info.platform_restriction
    }

    pub fn modifiers(&self) -> &[String] {
        &self.info.modifiers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str) -> ServerInfo {
        ServerInfo {
            server_name: name.to_string(),
            player_count: 3,
            player_limit: 10,
            ..ServerInfo::default()
        }
    }

    #[test]
    fn test_invalid_snapshot() {
        let snapshot = MatchmakingSnapshot::invalid();
        assert!(!snapshot.is_valid());
        assert_eq!(snapshot.timestamp_utc(), None);
        assert_eq!(snapshot.online_status(), OnlineStatus::NotAvailable);
    }

    #[test]
    fn test_online_snapshot_fields() {
        let snapshot = MatchmakingSnapshot::online(1_000, info("Midgard"));
        assert!(snapshot.is_valid());
        assert_eq!(snapshot.server_name(), "Midgard");
        assert_eq!(snapshot.player_count(), 3);
        assert_eq!(snapshot.player_limit(), 10);
        assert_eq!(snapshot.online_status(), OnlineStatus::Online);
    }

    #[test]
    fn test_newer_comparisons() {
        let old = MatchmakingSnapshot::online(1_000, info("a"));
        let same = MatchmakingSnapshot::offline(1_000);
        let new = MatchmakingSnapshot::not_available(2_000);
        let invalid = MatchmakingSnapshot::invalid();

        assert!(new.is_newer_than(&old));
        assert!(!old.is_newer_than(&new));
        assert!(!same.is_newer_than(&old));
        assert!(old.is_newer_than(&invalid));
        assert!(!invalid.is_newer_than(&old));

        assert!(old.is_newer_than_time(999));
        assert!(!old.is_newer_than_time(1_000));
        assert!(!invalid.is_newer_than_time(0));
    }

    #[test]
    fn test_snapshot_serialization() {
        let snapshot = MatchmakingSnapshot::online(42, info("Asgard"));
        let bytes = bincode::serialize(&snapshot).unwrap();
        let decoded: MatchmakingSnapshot = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, snapshot);
    }
}
