//! Types shared by the server browser and the direct-connect registry
//!
//! - [`identity`]: the cross-backend server identity model
//! - [`snapshot`]: immutable matchmaking facts about one identity
//! - [`protocol`]: the length-prefixed registry wire protocol

pub mod identity;
pub mod protocol;
pub mod snapshot;

pub use identity::{DirectAddress, IdentityKind, ServerIdentity, DEFAULT_PORT};
pub use protocol::{RegistryRequest, RegistryResponse, ServerRecord};
pub use snapshot::{MatchmakingSnapshot, OnlineStatus, ServerInfo};

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

/// Name shown for a server: its advertised name, else its identity
pub fn display_name(identity: &ServerIdentity, server_name: &str) -> String {
    let name = server_name.trim();
    if name.is_empty() {
        identity.to_string()
    } else {
        name.to_string()
    }
}

/// Whether a server is listed under `filter`
///
/// Both the registry and the browser's local filtering go through this, so a
/// re-query never drops a server the local filter kept. `filter` must already
/// be trimmed and lowercased; empty matches everything.
pub fn matches_name_filter(identity: &ServerIdentity, server_name: &str, filter: &str) -> bool {
    filter.is_empty()
        || display_name(identity, server_name)
            .to_lowercase()
            .contains(filter)
}
