//! Merging of all backends' public lists into one bounded server list
//!
//! The aggregator owns the client-visible filter text and the refresh cadence.
//! Each tick it forwards pending refreshes to its backends, debounces
//! server-side filter queries while the player is typing, and, when any
//! backend reported a change, rebuilds the merged list:
//!
//! 1. Every available backend contributes its already-filtered list.
//! 2. [`fair_split`] bounds how many candidates each backend may contribute.
//! 3. Candidates are merged round-robin, one per backend per turn.
//! 4. Duplicate identities keep the strictly newer snapshot, in the position
//!    where the identity first appeared.
//! 5. The result is stably sorted by display name.

use crate::backend::{Backend, RefreshKind};
use crate::clock::Clock;
use crate::entry::{display_name, JoinContext, ServerListEntry};
use crate::event::{Listeners, SubscriptionId};
use crate::fair_split::fair_split;
use log::{debug, info};
use shared::{ServerIdentity, ServerRecord};
use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

/// Most entries the merged list will ever hold
pub const MAX_SERVER_LIST_ENTRIES: usize = 200;

/// Quiet period after the last keystroke before server-side backends re-query
pub const FILTER_DEBOUNCE_MS: u64 = 500;

/// Invoked from `tick()` with the new list whenever the merged list changed
pub type ServerListUpdatedListener = Box<dyn FnMut(&[ServerListEntry])>;

pub struct Aggregator {
    backends: Vec<Box<dyn Backend>>,
    subscriptions: Vec<Option<SubscriptionId>>,
    clock: Rc<dyn Clock>,
    join_context: JoinContext,
    cap: usize,

    filter: String,
    last_searched_filter: String,
    /// `None` once the filter is committed, i.e. the debounce has been waived
    filter_changed_at: Option<u64>,

    refresh_pending: bool,
    last_refresh_at: Option<u64>,

    is_open: bool,
    lists_changed: Rc<Cell<bool>>,
    entries: Vec<ServerListEntry>,
    scratch_index: HashMap<ServerIdentity, usize>,
    listeners: Listeners<dyn FnMut(&[ServerListEntry])>,
}

impl Aggregator {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            backends: Vec::new(),
            subscriptions: Vec::new(),
            clock,
            join_context: JoinContext::default(),
            cap: MAX_SERVER_LIST_ENTRIES,
            filter: String::new(),
            last_searched_filter: String::new(),
            filter_changed_at: None,
            refresh_pending: false,
            last_refresh_at: None,
            is_open: false,
            lists_changed: Rc::new(Cell::new(false)),
            entries: Vec::new(),
            scratch_index: HashMap::new(),
            listeners: Listeners::new(),
        }
    }

    pub fn with_join_context(mut self, join_context: JoinContext) -> Self {
        self.join_context = join_context;
        self
    }

    /// Lowers the entry cap, mainly for tests and constrained UIs
    pub fn with_cap(mut self, cap: usize) -> Self {
        self.cap = cap.min(MAX_SERVER_LIST_ENTRIES);
        self
    }

    /// Adds a backend; backends are visited in registration order
    pub fn register_backend(&mut self, mut backend: Box<dyn Backend>) {
        info!("Registered backend {}", backend.name());
        backend.set_public_server_list_filter(&self.filter);

        let subscription = if self.is_open {
            self.lists_changed.set(true);
            Some(Self::subscribe_to(&self.lists_changed, backend.as_mut()))
        } else {
            None
        };

        self.backends.push(backend);
        self.subscriptions.push(subscription);
    }

    pub fn backends(&self) -> &[Box<dyn Backend>] {
        &self.backends
    }

    pub fn backends_mut(&mut self) -> &mut [Box<dyn Backend>] {
        &mut self.backends
    }

    pub fn clock(&self) -> &Rc<dyn Clock> {
        &self.clock
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Filter text most recently sent to server-side filtering backends
    pub fn last_searched_filter(&self) -> &str {
        &self.last_searched_filter
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Updates the filter text
    ///
    /// Local filtering is applied immediately on every backend. Server-side
    /// re-queries wait until the player has stopped typing for
    /// [`FILTER_DEBOUNCE_MS`], or go out on the next tick when `is_typing` is
    /// false.
    pub fn set_filter(&mut self, filter: &str, is_typing: bool) {
        if self.filter == filter {
            return;
        }

        self.filter = filter.to_string();
        self.filter_changed_at = if is_typing {
            Some(self.clock.now_ms())
        } else {
            None
        };

        for backend in &mut self.backends {
            backend.set_public_server_list_filter(filter);
        }
    }

    /// Requests a full refresh of every backend on the next tick
    pub fn refresh(&mut self) {
        self.refresh_pending = true;
    }

    /// "Now" while a refresh is waiting to be dispatched, else when the last one went out
    pub fn last_refresh_time_utc(&self) -> Option<u64> {
        if self.refresh_pending {
            Some(self.clock.now_ms())
        } else {
            self.last_refresh_at
        }
    }

    /// Sum of the available backends' unfiltered list sizes
    pub fn public_server_count(&self) -> u32 {
        self.backends
            .iter()
            .filter(|backend| backend.is_available())
            .map(|backend| backend.public_server_count())
            .sum()
    }

    /// Subscribes to `ServerListUpdated`
    pub fn subscribe(&mut self, listener: ServerListUpdatedListener) -> SubscriptionId {
        self.listeners.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.listeners.unsubscribe(id)
    }

    /// Starts listening to backends; refreshes if nothing was ever fetched
    pub fn on_open(&mut self) {
        if self.is_open {
            return;
        }
        self.is_open = true;

        for i in 0..self.backends.len() {
            if self.subscriptions[i].is_none() {
                let id = Self::subscribe_to(&self.lists_changed, self.backends[i].as_mut());
                self.subscriptions[i] = Some(id);
            }
        }
        self.lists_changed.set(true);

        if self.last_refresh_at.is_none() {
            self.refresh();
        }
    }

    pub fn on_close(&mut self) {
        if !self.is_open {
            return;
        }
        self.is_open = false;

        for (backend, subscription) in self.backends.iter_mut().zip(&mut self.subscriptions) {
            if let Some(id) = subscription.take() {
                backend.unsubscribe(id);
            }
        }
    }

    fn subscribe_to(lists_changed: &Rc<Cell<bool>>, backend: &mut dyn Backend) -> SubscriptionId {
        let lists_changed = Rc::clone(lists_changed);
        backend.subscribe(Box::new(move || lists_changed.set(true)))
    }

    fn filter_debounce_elapsed(&self, now: u64) -> bool {
        match self.filter_changed_at {
            Some(changed_at) => now.saturating_sub(changed_at) >= FILTER_DEBOUNCE_MS,
            None => true,
        }
    }

    /// Advances backends, dispatches due refreshes and republishes the list
    pub fn tick(&mut self) {
        for backend in &mut self.backends {
            backend.tick();
        }

        let now = self.clock.now_ms();

        if self.refresh_pending {
            debug!("Refreshing {} backend(s)", self.backends.len());
            for backend in &mut self.backends {
                backend.refresh_public_server_list(RefreshKind::Full);
            }
            self.refresh_pending = false;
            self.last_refresh_at = Some(now);
        }

        if self.filter != self.last_searched_filter && self.filter_debounce_elapsed(now) {
            debug!("Dispatching server-side filter {:?}", self.filter);
            for backend in &mut self.backends {
                if backend.server_side_filtering() {
                    backend.refresh_public_server_list(RefreshKind::ServerSideFilter);
                }
            }
            self.last_searched_filter = self.filter.clone();
        }

        if self.is_open && self.lists_changed.replace(false) {
            let entries = self.filtered_list();
            if entries != self.entries {
                self.entries = entries;
                let entries = &self.entries;
                self.listeners.for_each(|listener| listener(entries));
            }
        }
    }

    /// The list as last published through `ServerListUpdated`
    pub fn entries(&self) -> &[ServerListEntry] {
        &self.entries
    }

    /// Merges the backends' current lists into a fresh, capped, sorted list
    pub fn filtered_list(&mut self) -> Vec<ServerListEntry> {
        let lists: Vec<&[ServerRecord]> = self
            .backends
            .iter()
            .map(|backend| {
                if backend.is_available() {
                    backend.filtered_public_server_list()
                } else {
                    &[]
                }
            })
            .collect();

        let counts: Vec<usize> = lists.iter().map(|list| list.len()).collect();
        let quotas = fair_split(&counts, self.cap);

        let mut cursors = vec![0usize; lists.len()];
        let mut rotation: Vec<usize> = (0..lists.len()).filter(|&i| quotas[i] > 0).collect();
        let mut merged: Vec<&ServerRecord> = Vec::new();
        let index = &mut self.scratch_index;

        while !rotation.is_empty() && merged.len() < self.cap {
            let mut turn = 0;
            while turn < rotation.len() && merged.len() < self.cap {
                let backend = rotation[turn];
                let candidate = &lists[backend][cursors[backend]];
                cursors[backend] += 1;

                match index.get(&candidate.identity) {
                    None => {
                        index.insert(candidate.identity.clone(), merged.len());
                        merged.push(candidate);
                    }
                    Some(&position) => {
                        if candidate.snapshot.is_newer_than(&merged[position].snapshot) {
                            merged[position] = candidate;
                        }
                    }
                }

                if cursors[backend] >= quotas[backend] {
                    rotation.remove(turn);
                } else {
                    turn += 1;
                }
            }
        }
        index.clear();

        let mut entries: Vec<ServerListEntry> = merged
            .into_iter()
            .map(|record| {
                ServerListEntry::new(
                    record.identity.clone(),
                    &record.snapshot,
                    display_name(&record.identity, &record.snapshot),
                    &self.join_context,
                )
            })
            .collect();
        entries.sort_by_cached_key(|entry| entry.display_name().to_lowercase());
        entries
    }
}
