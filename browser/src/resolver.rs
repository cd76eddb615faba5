//! Hostname resolution for dedicated servers listed by name
//!
//! Lookups run on tokio tasks; their results come back over a channel that
//! [`DomainResolver::poll`] drains on the browser thread. Each domain has at
//! most one lookup in flight, concurrent callers are coalesced onto it, and
//! both successes and failures are cached until explicitly invalidated.
//! Every lookup carries a generation number, so an answer to a lookup that was
//! invalidated while running is discarded even if the domain is being looked
//! up again.

use log::{debug, warn};
use std::collections::HashMap;
use std::net::IpAddr;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Invoked with the domain and its address, or `None` when resolution failed
pub type ResolveCallback = Box<dyn FnOnce(&str, Option<IpAddr>)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Resolved(IpAddr),
    Failed,
    Pending,
}

type Answer = (String, u64, Option<IpAddr>);

/// One-shot channel back to the resolver for a single lookup
pub struct LookupReply {
    domain: String,
    generation: u64,
    sender: UnboundedSender<Answer>,
}

impl LookupReply {
    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn send(self, address: Option<IpAddr>) {
        // The resolver being gone just means nobody is waiting any more
        let _ = self.sender.send((self.domain, self.generation, address));
    }
}

/// Starts a lookup and eventually answers through `reply`
pub trait HostLookup {
    fn start(&self, reply: LookupReply);
}

/// Resolves through the system resolver on a tokio task
///
/// Must be used from within a tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioLookup;

impl HostLookup for TokioLookup {
    fn start(&self, reply: LookupReply) {
        tokio::spawn(async move {
            let address = match tokio::net::lookup_host((reply.domain(), 0)).await {
                Ok(addrs) => {
                    let addrs: Vec<IpAddr> = addrs.map(|addr| addr.ip()).collect();
                    addrs
                        .iter()
                        .copied()
                        .find(IpAddr::is_ipv4)
                        .or_else(|| addrs.first().copied())
                }
                Err(e) => {
                    warn!("Failed to resolve {}: {}", reply.domain(), e);
                    None
                }
            };
            reply.send(address);
        });
    }
}

struct InFlight {
    generation: u64,
    waiting: Vec<ResolveCallback>,
}

pub struct DomainResolver {
    lookup: Box<dyn HostLookup>,
    cache: HashMap<String, Option<IpAddr>>,
    in_flight: HashMap<String, InFlight>,
    next_generation: u64,
    sender: UnboundedSender<Answer>,
    receiver: UnboundedReceiver<Answer>,
}

impl DomainResolver {
    pub fn new(lookup: Box<dyn HostLookup>) -> Self {
        let (sender, receiver) = unbounded_channel();
        Self {
            lookup,
            cache: HashMap::new(),
            in_flight: HashMap::new(),
            next_generation: 0,
            sender,
            receiver,
        }
    }

    /// A resolver backed by [`TokioLookup`]
    pub fn system() -> Self {
        Self::new(Box::new(TokioLookup))
    }

    fn normalize(domain: &str) -> String {
        domain.trim().trim_end_matches('.').to_lowercase()
    }

    fn to_resolution(cached: Option<IpAddr>) -> Resolution {
        match cached {
            Some(address) => Resolution::Resolved(address),
            None => Resolution::Failed,
        }
    }

    /// Cached result for `domain`, or `None` if it was never resolved
    pub fn cached(&self, domain: &str) -> Option<Option<IpAddr>> {
        self.cache.get(&Self::normalize(domain)).copied()
    }

    pub fn is_in_flight(&self, domain: &str) -> bool {
        self.in_flight.contains_key(&Self::normalize(domain))
    }

    /// Looks up `domain`, starting a lookup unless one is cached or running
    ///
    /// A cached result is returned and handed to `callback` right away.
    /// Otherwise `callback` joins the lookup in flight and runs from a later
    /// [`poll`](Self::poll).
    pub fn lookup(&mut self, domain: &str, callback: Option<ResolveCallback>) -> Resolution {
        let domain = Self::normalize(domain);
        if domain.is_empty() {
            if let Some(callback) = callback {
                callback(&domain, None);
            }
            return Resolution::Failed;
        }

        if let Some(&cached) = self.cache.get(&domain) {
            if let Some(callback) = callback {
                callback(&domain, cached);
            }
            return Self::to_resolution(cached);
        }

        match self.in_flight.get_mut(&domain) {
            Some(running) => running.waiting.extend(callback),
            None => {
                let generation = self.next_generation;
                self.next_generation += 1;

                debug!("Resolving {}", domain);
                self.in_flight.insert(
                    domain.clone(),
                    InFlight {
                        generation,
                        waiting: callback.into_iter().collect(),
                    },
                );
                self.lookup.start(LookupReply {
                    domain,
                    generation,
                    sender: self.sender.clone(),
                });
            }
        }
        Resolution::Pending
    }

    /// Delivers finished lookups; returns how many domains completed
    pub fn poll(&mut self) -> usize {
        let mut completed = 0;

        while let Ok((domain, generation, address)) = self.receiver.try_recv() {
            // Invalidated while the lookup was running, possibly restarted since
            let current = self
                .in_flight
                .get(&domain)
                .map_or(false, |running| running.generation == generation);
            if !current {
                debug!("Discarding stale resolution of {}", domain);
                continue;
            }
            let waiting = self
                .in_flight
                .remove(&domain)
                .map(|running| running.waiting)
                .unwrap_or_default();

            match address {
                Some(address) => debug!("Resolved {} to {}", domain, address),
                None => debug!("Caching failed resolution of {}", domain),
            }
            self.cache.insert(domain.clone(), address);
            completed += 1;

            for callback in waiting {
                callback(&domain, address);
            }
        }
        completed
    }

    /// Forgets one domain, cached or in flight; returns whether anything was dropped
    ///
    /// Callbacks waiting on a dropped lookup are never invoked.
    pub fn invalidate(&mut self, domain: &str) -> bool {
        let domain = Self::normalize(domain);
        let cached = self.cache.remove(&domain).is_some();
        let running = self.in_flight.remove(&domain).is_some();
        cached || running
    }

    /// Forgets every cached result; lookups in flight are unaffected
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::net::Ipv4Addr;
    use std::rc::Rc;
    use std::time::Duration;

    /// Holds lookups until the test answers them
    #[derive(Clone, Default)]
    struct ManualLookup {
        started: Rc<RefCell<Vec<LookupReply>>>,
    }

    impl ManualLookup {
        fn answer(&self, domain: &str, address: Option<IpAddr>) {
            let mut started = self.started.borrow_mut();
            let index = started
                .iter()
                .position(|reply| reply.domain() == domain)
                .expect("lookup was not started");
            started.remove(index).send(address);
        }

        fn started(&self) -> usize {
            self.started.borrow().len()
        }
    }

    impl HostLookup for ManualLookup {
        fn start(&self, reply: LookupReply) {
            self.started.borrow_mut().push(reply);
        }
    }

    fn resolver() -> (DomainResolver, ManualLookup) {
        let lookup = ManualLookup::default();
        (DomainResolver::new(Box::new(lookup.clone())), lookup)
    }

    fn recorder(log: &Rc<RefCell<Vec<Option<IpAddr>>>>) -> Option<ResolveCallback> {
        let log = Rc::clone(log);
        Some(Box::new(move |_: &str, address: Option<IpAddr>| {
            log.borrow_mut().push(address)
        }))
    }

    const ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 7));

    #[test]
    fn test_concurrent_lookups_coalesce() {
        let (mut resolver, lookup) = resolver();
        let calls = Rc::new(RefCell::new(Vec::new()));

        assert_eq!(resolver.lookup("play.example.com", recorder(&calls)), Resolution::Pending);
        assert_eq!(resolver.lookup("PLAY.example.com.", recorder(&calls)), Resolution::Pending);
        assert_eq!(lookup.started(), 1);
        assert!(resolver.is_in_flight("play.example.com"));

        lookup.answer("play.example.com", Some(ADDRESS));
        assert_eq!(resolver.poll(), 1);

        assert_eq!(*calls.borrow(), vec![Some(ADDRESS), Some(ADDRESS)]);
        assert!(!resolver.is_in_flight("play.example.com"));
        assert_eq!(resolver.lookup("play.example.com", None), Resolution::Resolved(ADDRESS));
    }

    #[test]
    fn test_cached_result_calls_back_immediately() {
        let (mut resolver, lookup) = resolver();
        resolver.lookup("play.example.com", None);
        lookup.answer("play.example.com", Some(ADDRESS));
        resolver.poll();

        let calls = Rc::new(RefCell::new(Vec::new()));
        resolver.lookup("play.example.com", recorder(&calls));
        assert_eq!(*calls.borrow(), vec![Some(ADDRESS)]);
        assert_eq!(lookup.started(), 0);
    }

    #[test]
    fn test_failure_is_cached_until_cleared() {
        let (mut resolver, lookup) = resolver();
        resolver.lookup("gone.example.com", None);
        lookup.answer("gone.example.com", None);
        resolver.poll();

        assert_eq!(resolver.lookup("gone.example.com", None), Resolution::Failed);
        assert_eq!(resolver.cached("gone.example.com"), Some(None));
        assert_eq!(lookup.started(), 0);

        resolver.clear_cache();
        assert_eq!(resolver.lookup("gone.example.com", None), Resolution::Pending);
        assert_eq!(lookup.started(), 1);
    }

    #[test]
    fn test_invalidate_drops_in_flight_lookup() {
        let (mut resolver, lookup) = resolver();
        let calls = Rc::new(RefCell::new(Vec::new()));
        resolver.lookup("play.example.com", recorder(&calls));

        assert!(resolver.invalidate("play.example.com"));
        lookup.answer("play.example.com", Some(ADDRESS));

        assert_eq!(resolver.poll(), 0);
        assert!(calls.borrow().is_empty());
        assert_eq!(resolver.cached("play.example.com"), None);
        assert!(!resolver.invalidate("play.example.com"));
    }

    #[test]
    fn test_answer_to_invalidated_lookup_is_discarded() {
        let (mut resolver, lookup) = resolver();
        let calls = Rc::new(RefCell::new(Vec::new()));
        let old = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let new = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

        resolver.lookup("a.example", None);
        resolver.invalidate("a.example");
        resolver.lookup("a.example", recorder(&calls));
        assert_eq!(lookup.started(), 2);

        // The first lookup answers after the second one started
        lookup.answer("a.example", Some(old));
        assert_eq!(resolver.poll(), 0);
        assert!(resolver.is_in_flight("a.example"));
        assert_eq!(resolver.cached("a.example"), None);
        assert!(calls.borrow().is_empty());

        lookup.answer("a.example", Some(new));
        assert_eq!(resolver.poll(), 1);
        assert_eq!(resolver.cached("a.example"), Some(Some(new)));
        assert_eq!(*calls.borrow(), vec![Some(new)]);
    }

    #[test]
    fn test_empty_domain_fails() {
        let (mut resolver, lookup) = resolver();
        assert_eq!(resolver.lookup("  ", None), Resolution::Failed);
        assert_eq!(lookup.started(), 0);
    }

    #[tokio::test]
    async fn test_system_lookup_resolves_localhost() {
        let mut resolver = DomainResolver::system();
        assert_eq!(resolver.lookup("localhost", None), Resolution::Pending);

        let mut resolution = Resolution::Pending;
        for _ in 0..100 {
            resolver.poll();
            resolution = resolver.lookup("localhost", None);
            if resolution != Resolution::Pending {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        match resolution {
            Resolution::Resolved(address) => assert!(address.is_loopback()),
            other => panic!("localhost did not resolve: {:?}", other),
        }
    }
}
