//! The browser context tying every component together
//!
//! One [`Browser`] is created by the host and ticked from its main loop. It
//! owns the aggregator and its backends, keeps the player's favourite and
//! recent servers' status fresh through the refresh scheduler, and turns
//! identities into socket addresses when the player joins.

use crate::aggregator::Aggregator;
use crate::known::KnownServerList;
use crate::resolver::{DomainResolver, Resolution};
use crate::scheduler::{RefreshPass, RefreshScheduler};
use log::debug;
use shared::{MatchmakingSnapshot, ServerIdentity};
use std::cell::RefCell;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::rc::Rc;

/// Known servers' status is re-queried once it is older than this
pub const STATUS_FRESHNESS_MS: u64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinAddress {
    Ready(SocketAddr),
    /// Host name lookup still running; poll again on a later tick
    Pending,
    Failed,
}

type StatusCache = Rc<RefCell<HashMap<ServerIdentity, MatchmakingSnapshot>>>;

pub struct Browser {
    aggregator: Aggregator,
    scheduler: RefreshScheduler,
    resolver: DomainResolver,
    favorites: KnownServerList,
    recent: KnownServerList,
    known_status: StatusCache,
    last_pass: RefreshPass,
}

impl Browser {
    pub fn new(aggregator: Aggregator, resolver: DomainResolver) -> Self {
        Self {
            aggregator,
            scheduler: RefreshScheduler::new(),
            resolver,
            favorites: KnownServerList::favorites(),
            recent: KnownServerList::recent(),
            known_status: Rc::new(RefCell::new(HashMap::new())),
            last_pass: RefreshPass::default(),
        }
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn aggregator_mut(&mut self) -> &mut Aggregator {
        &mut self.aggregator
    }

    pub fn resolver_mut(&mut self) -> &mut DomainResolver {
        &mut self.resolver
    }

    pub fn favorites(&self) -> &KnownServerList {
        &self.favorites
    }

    pub fn favorites_mut(&mut self) -> &mut KnownServerList {
        &mut self.favorites
    }

    pub fn recent(&self) -> &KnownServerList {
        &self.recent
    }

    /// Remembers a server the player just joined
    pub fn record_joined(&mut self, identity: ServerIdentity) -> bool {
        self.recent.add(identity)
    }

    /// What the last status refresh pass did
    pub fn last_refresh_pass(&self) -> RefreshPass {
        self.last_pass
    }

    /// Latest status known for a favourite or recent server
    ///
    /// Status delivered by a refresh is preferred; otherwise whatever the
    /// backends currently list for it.
    pub fn known_status(&self, identity: &ServerIdentity) -> Option<MatchmakingSnapshot> {
        let cached = self.known_status.borrow().get(identity).cloned();

        let listed = self
            .aggregator
            .backends()
            .iter()
            .filter(|backend| backend.is_available())
            .map(|backend| backend.get_server_matchmaking_data(identity, 0))
            .filter(MatchmakingSnapshot::is_valid)
            .fold(None, |best: Option<MatchmakingSnapshot>, snapshot| match best {
                Some(best) if !snapshot.is_newer_than(&best) => Some(best),
                _ => Some(snapshot),
            });

        match (cached, listed) {
            (Some(cached), Some(listed)) if listed.is_newer_than(&cached) => Some(listed),
            (Some(cached), _) => Some(cached),
            (None, listed) => listed,
        }
    }

    /// One frame of browser work
    pub fn tick(&mut self) {
        self.aggregator.tick();
        self.resolver.poll();
        self.update_known_servers();
    }

    fn update_known_servers(&mut self) {
        if self.favorites.is_empty() && self.recent.is_empty() {
            return;
        }

        let threshold = self
            .aggregator
            .clock()
            .now_ms()
            .saturating_sub(STATUS_FRESHNESS_MS);
        let known_status = &self.known_status;

        self.last_pass = self.scheduler.update_online_status(
            self.aggregator.backends_mut(),
            self.favorites.iter().chain(self.recent.iter()),
            threshold,
            |_| {
                let known_status = Rc::clone(known_status);
                Box::new(move |identity: &ServerIdentity, snapshot: &MatchmakingSnapshot| {
                    let mut known_status = known_status.borrow_mut();
                    let newer = known_status
                        .get(identity)
                        .map_or(true, |known| snapshot.is_newer_than(known));
                    if newer {
                        debug!("{} is {:?}", identity, snapshot.online_status());
                        known_status.insert(identity.clone(), snapshot.clone());
                    }
                })
            },
        );
    }

    /// Socket address to connect to for `identity`
    ///
    /// IP literals are ready at once. Host names go through the resolver and
    /// the result is stored on the identity, so later polls skip the lookup.
    /// Only direct identities have an address.
    pub fn poll_join_address(&mut self, identity: &mut ServerIdentity) -> JoinAddress {
        let Some(direct) = identity.as_direct_mut() else {
            return JoinAddress::Failed;
        };
        if !direct.is_valid() {
            return JoinAddress::Failed;
        }
        if let Some(address) = direct.resolved() {
            return JoinAddress::Ready(address);
        }

        let ip = if direct.is_url() {
            match self.resolver.lookup(direct.host(), None) {
                Resolution::Resolved(ip) => ip,
                Resolution::Pending => return JoinAddress::Pending,
                Resolution::Failed => return JoinAddress::Failed,
            }
        } else {
            match direct.host().parse::<IpAddr>() {
                Ok(ip) => ip,
                Err(_) => return JoinAddress::Failed,
            }
        };

        direct.set_resolved(ip);
        direct.resolved().map_or(JoinAddress::Failed, JoinAddress::Ready)
    }
}
