//! Rows of the merged server list
//!
//! Entries are rebuilt from `(identity, snapshot, display name)` on every
//! aggregation pass. They hold no state of their own; value equality lets the
//! UI skip redraws when a pass produced the same list again.

use shared::{MatchmakingSnapshot, OnlineStatus, ServerIdentity};

/// What the local player is allowed to join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinContext {
    /// Platform name servers use in their platform restriction
    pub own_platform: String,
    /// Whether the local account may play with other platforms
    pub crossplay_allowed: bool,
}

impl Default for JoinContext {
    fn default() -> Self {
        Self {
            own_platform: String::new(),
            crossplay_allowed: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryFlags {
    pub has_data: bool,
    pub available: bool,
    pub online: bool,
    pub crossplay: bool,
    pub restricted_to_own_platform: bool,
    pub password_protected: bool,
}

impl EntryFlags {
    fn evaluate(snapshot: &MatchmakingSnapshot, context: &JoinContext) -> Self {
        let has_data = snapshot.is_valid();
        let restriction = snapshot.platform_restriction();

        Self {
            has_data,
            available: has_data && snapshot.online_status() != OnlineStatus::NotAvailable,
            online: snapshot.online_status() == OnlineStatus::Online,
            crossplay: has_data && restriction.is_empty(),
            restricted_to_own_platform: !restriction.is_empty()
                && restriction == context.own_platform,
            password_protected: snapshot.is_password_protected(),
        }
    }
}

/// One row of the merged, de-duplicated list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerListEntry {
    identity: ServerIdentity,
    display_name: String,
    flags: EntryFlags,
    crossplay_permitted: bool,
    timestamp_utc: Option<u64>,
    player_count: u32,
    player_limit: u32,
    game_version: String,
    network_version: u32,
    join_code: Option<String>,
    platform_restriction: String,
    modifiers: Vec<String>,
}

impl ServerListEntry {
    pub fn new(
        identity: ServerIdentity,
        snapshot: &MatchmakingSnapshot,
        display_name: String,
        context: &JoinContext,
    ) -> Self {
        Self {
            identity,
            display_name,
            flags: EntryFlags::evaluate(snapshot, context),
            crossplay_permitted: context.crossplay_allowed,
            timestamp_utc: snapshot.timestamp_utc(),
            player_count: snapshot.player_count(),
            player_limit: snapshot.player_limit(),
            game_version: snapshot.game_version().to_string(),
            network_version: snapshot.network_version(),
            join_code: snapshot.join_code().map(str::to_string),
            platform_restriction: snapshot.platform_restriction().to_string(),
            modifiers: snapshot.modifiers().to_vec(),
        }
    }

    /// Builds an entry named after the snapshot, or after the identity when unnamed
    pub fn from_snapshot(
        identity: &ServerIdentity,
        snapshot: &MatchmakingSnapshot,
        context: &JoinContext,
    ) -> Self {
        Self::new(
            identity.clone(),
            snapshot,
            display_name(identity, snapshot),
            context,
        )
    }

    pub fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn flags(&self) -> EntryFlags {
        self.flags
    }

    pub fn has_data(&self) -> bool {
        self.flags.has_data
    }

    pub fn is_available(&self) -> bool {
        self.flags.available
    }

    pub fn is_online(&self) -> bool {
        self.flags.online
    }

    pub fn is_crossplay(&self) -> bool {
        self.flags.crossplay
    }

    pub fn is_restricted_to_own_platform(&self) -> bool {
        self.flags.restricted_to_own_platform
    }

    pub fn is_password_protected(&self) -> bool {
        self.flags.password_protected
    }

    /// Online but locked to another platform, or crossplay the player may not use
    pub fn is_unjoinable(&self) -> bool {
        self.flags.online
            && !self.flags.restricted_to_own_platform
            && (!self.flags.crossplay || !self.crossplay_permitted)
    }

    pub fn timestamp_utc(&self) -> Option<u64> {
        self.timestamp_utc
    }

    pub fn player_count(&self) -> u32 {
        self.player_count
    }

    pub fn player_limit(&self) -> u32 {
        self.player_limit
    }

    /// Fraction of player slots in use, 0.0 when the limit is unknown
    pub fn fill_ratio(&self) -> f32 {
        if self.player_limit == 0 {
            0.0
        } else {
            self.player_count as f32 / self.player_limit as f32
        }
    }

    pub fn game_version(&self) -> &str {
        &self.game_version
    }

    pub fn network_version(&self) -> u32 {
        self.network_version
    }

    pub fn join_code(&self) -> Option<&str> {
        self.join_code.as_deref()
    }

    pub fn platform_restriction(&self) -> &str {
        &self.platform_restriction
    }

    pub fn modifiers(&self) -> &[String] {
        &self.modifiers
    }
}

/// Name shown for a server: its advertised name, else its identity
pub fn display_name(identity: &ServerIdentity, snapshot: &MatchmakingSnapshot) -> String {
    shared::display_name(identity, snapshot.server_name())
}
