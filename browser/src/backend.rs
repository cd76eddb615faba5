//! The capability contract every discovery source implements
//!
//! The aggregator and refresh scheduler only ever talk to backends through
//! [`Backend`]. A backend is an independent state machine: it decides how to
//! reach its source, how to rate-limit itself, and when its list changed. All
//! results must be delivered on the thread that calls [`Backend::tick`];
//! backends doing I/O elsewhere are responsible for marshalling their results
//! back before invoking listeners or callbacks.

use crate::event::SubscriptionId;
use shared::{IdentityKind, MatchmakingSnapshot, ServerIdentity, ServerRecord};

/// Invoked whenever a backend's filtered public list changes
pub type ListUpdatedListener = Box<dyn FnMut()>;

/// Invoked once when a per-server refresh completes
pub type RefreshCallback = Box<dyn FnOnce(&ServerIdentity, &MatchmakingSnapshot)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshKind {
    /// Re-fetch the whole public list
    Full,
    /// The filter text changed; only server-side filtering backends need to re-query
    ServerSideFilter,
}

pub trait Backend {
    /// Short name used in log lines
    fn name(&self) -> &str;

    fn is_available(&self) -> bool;

    /// Size of the backend's unfiltered universe, for display only
    fn public_server_count(&self) -> u32;

    /// Current public list, already filtered by the last applied filter text
    fn filtered_public_server_list(&self) -> &[ServerRecord];

    /// Whether a filter change requires a remote re-query
    fn server_side_filtering(&self) -> bool;

    /// Subscribes to `FilteredPublicServerListUpdated`
    fn subscribe(&mut self, listener: ListUpdatedListener) -> SubscriptionId;

    fn unsubscribe(&mut self, id: SubscriptionId);

    /// Requests a refresh; the result arrives through the list-updated event
    fn refresh_public_server_list(&mut self, kind: RefreshKind);

    /// Applies new filter text locally; must be a no-op when unchanged
    fn set_public_server_list_filter(&mut self, filter: &str);

    /// Whether the backend's own rate limit allows another per-server refresh
    fn can_refresh_server_now(&self) -> bool;

    /// Whether a per-server refresh for this kind of identity is possible right now
    fn can_refresh_server_of_type_now(&self, kind: IdentityKind) -> bool;

    /// Starts refreshing one server
    ///
    /// Returns false without side effects when rate-limited, when the identity
    /// is unsupported, or when a refresh for it is already pending.
    fn refresh_server(&mut self, identity: &ServerIdentity, callback: RefreshCallback) -> bool;

    fn is_pending(&self, identity: &ServerIdentity) -> bool;

    /// Freshest known snapshot strictly newer than `newer_than_utc`, else an invalid one
    fn get_server_matchmaking_data(
        &self,
        identity: &ServerIdentity,
        newer_than_utc: u64,
    ) -> MatchmakingSnapshot;

    /// Advances timers and delivers completed work; called once per aggregation cycle
    fn tick(&mut self);
}
