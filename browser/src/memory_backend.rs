//! In-process backend fed by its host
//!
//! Sources that already live inside the client process (LAN broadcast
//! discovery, manually entered addresses, test harnesses) push their results
//! through a [`MemoryBackendHandle`]. Everything pushed is applied on the
//! backend's next `tick()`, so it reaches the aggregator exactly like results
//! from a networked backend would.

use crate::backend::{Backend, ListUpdatedListener, RefreshCallback, RefreshKind};
use crate::event::{Listeners, SubscriptionId};
use crate::listing::ServerListing;
use log::debug;
use shared::{IdentityKind, MatchmakingSnapshot, ServerIdentity, ServerRecord};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Default number of per-server refreshes allowed in flight
pub const DEFAULT_MAX_PENDING: usize = 8;

#[derive(Default)]
struct Inbox {
    available: bool,
    records: Option<Vec<ServerRecord>>,
    answers: Vec<ServerRecord>,
    requests: Vec<ServerIdentity>,
    refreshes: HashMap<RefreshKind, usize>,
    filter: String,
}

/// Feeds a [`MemoryBackend`] from the host side
#[derive(Clone)]
pub struct MemoryBackendHandle {
    inbox: Rc<RefCell<Inbox>>,
}

impl MemoryBackendHandle {
    /// Replaces the whole public list
    pub fn set_records(&self, records: Vec<ServerRecord>) {
        self.inbox.borrow_mut().records = Some(records);
    }

    pub fn set_available(&self, available: bool) {
        self.inbox.borrow_mut().available = available;
    }

    /// Answers a per-server refresh, or reports fresh data unprompted
    pub fn answer(&self, identity: ServerIdentity, snapshot: MatchmakingSnapshot) {
        self.inbox
            .borrow_mut()
            .answers
            .push(ServerRecord::new(identity, snapshot));
    }

    /// Identities the browser asked to refresh since the last call
    pub fn take_requests(&self) -> Vec<ServerIdentity> {
        std::mem::take(&mut self.inbox.borrow_mut().requests)
    }

    /// How many refreshes of this kind the browser has dispatched
    pub fn refresh_count(&self, kind: RefreshKind) -> usize {
        self.inbox
            .borrow()
            .refreshes
            .get(&kind)
            .copied()
            .unwrap_or(0)
    }

    /// Filter text most recently applied by the browser
    pub fn filter(&self) -> String {
        self.inbox.borrow().filter.clone()
    }
}

pub struct MemoryBackend {
    name: String,
    server_side_filtering: bool,
    max_pending: usize,
    supported_kinds: Vec<IdentityKind>,

    inbox: Rc<RefCell<Inbox>>,
    available: bool,
    listing: ServerListing,
    pending: HashMap<ServerIdentity, RefreshCallback>,
    changed: bool,
    listeners: Listeners<dyn FnMut()>,
}

impl MemoryBackend {
    pub fn new(name: &str) -> Self {
        let inbox = Inbox {
            available: true,
            ..Inbox::default()
        };

        Self {
            name: name.to_string(),
            server_side_filtering: false,
            max_pending: DEFAULT_MAX_PENDING,
            supported_kinds: vec![
                IdentityKind::SteamUser,
                IdentityKind::PlatformUser,
                IdentityKind::Direct,
            ],
            inbox: Rc::new(RefCell::new(inbox)),
            available: true,
            listing: ServerListing::new(),
            pending: HashMap::new(),
            changed: false,
            listeners: Listeners::new(),
        }
    }

    /// Starts with `records` already published
    pub fn with_records(mut self, records: Vec<ServerRecord>) -> Self {
        self.listing.set_records(records);
        self.changed = true;
        self
    }

    /// Reports filter changes as requiring a remote re-query
    pub fn with_server_side_filtering(mut self, enabled: bool) -> Self {
        self.server_side_filtering = enabled;
        self
    }

    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    /// Restricts which identity kinds per-server refreshes accept
    pub fn with_supported_kinds(mut self, kinds: &[IdentityKind]) -> Self {
        self.supported_kinds = kinds.to_vec();
        self
    }

    pub fn handle(&self) -> MemoryBackendHandle {
        MemoryBackendHandle {
            inbox: Rc::clone(&self.inbox),
        }
    }

    fn apply_answer(&mut self, answer: ServerRecord) {
        let ServerRecord { identity, snapshot } = answer;

        if self.listing.record_status(&identity, &snapshot) {
            self.changed = true;
        }
        if let Some(callback) = self.pending.remove(&identity) {
            callback(&identity, &snapshot);
        }
    }

    /// Status answers currently kept for unlisted or listed servers
    pub fn known_len(&self) -> usize {
        self.listing.known_len()
    }
}

impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn public_server_count(&self) -> u32 {
        self.listing.len() as u32
    }

    fn filtered_public_server_list(&self) -> &[ServerRecord] {
        self.listing.filtered()
    }

    fn server_side_filtering(&self) -> bool {
        self.server_side_filtering
    }

    fn subscribe(&mut self, listener: ListUpdatedListener) -> SubscriptionId {
        self.listeners.subscribe(listener)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        self.listeners.unsubscribe(id);
    }

    fn refresh_public_server_list(&mut self, kind: RefreshKind) {
        *self.inbox.borrow_mut().refreshes.entry(kind).or_insert(0) += 1;
        // The host pushes updates on its own; republish what is already here
        self.changed = true;
    }

    fn set_public_server_list_filter(&mut self, filter: &str) {
        if self.listing.set_filter(filter) {
            self.inbox.borrow_mut().filter = filter.to_string();
            self.changed = true;
        }
    }

    fn can_refresh_server_now(&self) -> bool {
        self.pending.len() < self.max_pending
    }

    fn can_refresh_server_of_type_now(&self, kind: IdentityKind) -> bool {
        self.supported_kinds.contains(&kind) && self.can_refresh_server_now()
    }

    fn refresh_server(&mut self, identity: &ServerIdentity, callback: RefreshCallback) -> bool {
        if !identity.is_valid()
            || !self.can_refresh_server_of_type_now(identity.kind())
            || self.pending.contains_key(identity)
        {
            return false;
        }

        debug!("{}: refreshing {}", self.name, identity);
        self.pending.insert(identity.clone(), callback);
        self.inbox.borrow_mut().requests.push(identity.clone());
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
        let (available, records, answers) = {
            let mut inbox = self.inbox.borrow_mut();
            (
                inbox.available,
                inbox.records.take(),
                std::mem::take(&mut inbox.answers),
            )
        };

        if available != self.available {
            self.available = available;
            self.changed = true;
        }
        if let Some(records) = records {
            self.listing.set_records(records);
            self.changed = true;
        }
        for answer in answers {
            self.apply_answer(answer);
        }
        self.listing.prune_known();

        if std::mem::take(&mut self.changed) {
            self.listeners.for_each(|listener| listener());
        }
    }
}
