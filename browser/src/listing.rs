//! Public list and status bookkeeping shared by the backends
//!
//! A [`ServerListing`] holds what a backend last published, the view of it
//! that passes the current filter, and per-server status answers for servers
//! that may not be listed at all (favourites, recent servers). Status answers
//! older than the freshness window are pruned relative to the newest answer
//! seen, so the map stays bounded by the servers reported recently.

use crate::context::STATUS_FRESHNESS_MS;
use shared::{matches_name_filter, MatchmakingSnapshot, ServerIdentity, ServerRecord};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct ServerListing {
    records: Vec<ServerRecord>,
    filtered: Vec<ServerRecord>,
    filter: String,
    known: HashMap<ServerIdentity, MatchmakingSnapshot>,
    newest_known_utc: u64,
}

impl ServerListing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[ServerRecord] {
        &self.records
    }

    /// Records passing the current filter
    pub fn filtered(&self) -> &[ServerRecord] {
        &self.filtered
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of status answers kept for servers
    pub fn known_len(&self) -> usize {
        self.known.len()
    }

    pub fn set_records(&mut self, records: Vec<ServerRecord>) {
        self.records = records;
        self.apply_filter();
    }

    /// Drops the list; status answers are kept
    pub fn clear(&mut self) {
        self.records.clear();
        self.filtered.clear();
    }

    /// Returns whether the filter text changed
    pub fn set_filter(&mut self, filter: &str) -> bool {
        if self.filter == filter {
            return false;
        }
        self.filter = filter.to_string();
        self.apply_filter();
        true
    }

    fn apply_filter(&mut self) {
        let filter = self.filter.trim().to_lowercase();
        self.filtered = self
            .records
            .iter()
            .filter(|record| {
                matches_name_filter(&record.identity, record.snapshot.server_name(), &filter)
            })
            .cloned()
            .collect();
    }

    /// Stores a status answer and updates the listed record if it is newer
    ///
    /// Returns whether the published list changed.
    pub fn record_status(&mut self, identity: &ServerIdentity, snapshot: &MatchmakingSnapshot) -> bool {
        let mut listed_changed = false;
        if let Some(record) = self
            .records
            .iter_mut()
            .find(|record| &record.identity == identity)
        {
            if snapshot.is_newer_than(&record.snapshot) {
                record.snapshot = snapshot.clone();
                listed_changed = true;
            }
        }
        if listed_changed {
            self.apply_filter();
        }

        let newer = self
            .known
            .get(identity)
            .map_or(true, |known| snapshot.is_newer_than(known));
        if newer && snapshot.is_valid() {
            self.known.insert(identity.clone(), snapshot.clone());
        }
        if let Some(timestamp) = snapshot.timestamp_utc() {
            self.newest_known_utc = self.newest_known_utc.max(timestamp);
        }

        listed_changed
    }

    /// Freshest listed or answered snapshot newer than `newer_than_utc`, else invalid
    pub fn freshest(&self, identity: &ServerIdentity, newer_than_utc: u64) -> MatchmakingSnapshot {
        let listed = self
            .records
            .iter()
            .find(|record| &record.identity == identity)
            .map(|record| &record.snapshot);
        let freshest = match (listed, self.known.get(identity)) {
            (Some(a), Some(b)) => Some(if b.is_newer_than(a) { b } else { a }),
            (a, b) => a.or(b),
        };

        match freshest {
            Some(snapshot) if snapshot.is_newer_than_time(newer_than_utc) => snapshot.clone(),
            _ => MatchmakingSnapshot::invalid(),
        }
    }

    /// Forgets status answers that fell out of the freshness window
    ///
    /// The window ends at the newest answer seen. Returns how many were dropped.
    pub fn prune_known(&mut self) -> usize {
        let horizon = self.newest_known_utc.saturating_sub(STATUS_FRESHNESS_MS);
        let before = self.known.len();
        self.known
            .retain(|_, snapshot| snapshot.timestamp_utc().map_or(false, |ts| ts >= horizon));
        before - self.known.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::ServerInfo;

    fn named(addr: &str, name: &str, timestamp: u64) -> ServerRecord {
        ServerRecord::new(
            ServerIdentity::direct(addr),
            MatchmakingSnapshot::online(
                timestamp,
                ServerInfo {
                    server_name: name.to_string(),
                    ..ServerInfo::default()
                },
            ),
        )
    }

    #[test]
    fn test_filter_matches_name_or_unnamed_address() {
        let mut listing = ServerListing::new();
        listing.set_records(vec![
            named("10.0.0.1", "Viking Hall", 1),
            named("10.0.0.9", "", 1),
        ]);

        assert!(listing.set_filter("10.0.0.9"));
        assert_eq!(listing.filtered().len(), 1);
        assert_eq!(listing.filtered()[0].identity, ServerIdentity::direct("10.0.0.9"));

        assert!(!listing.set_filter("10.0.0.9"));
        assert!(listing.set_filter(" VIKING "));
        assert_eq!(listing.filtered()[0].snapshot.server_name(), "Viking Hall");
    }

    #[test]
    fn test_newer_status_replaces_listed_record() {
        let mut listing = ServerListing::new();
        listing.set_records(vec![named("10.0.0.1", "A", 10)]);
        let identity = ServerIdentity::direct("10.0.0.1");

        assert!(!listing.record_status(&identity, &MatchmakingSnapshot::offline(5)));
        assert_eq!(listing.filtered()[0].snapshot.timestamp_utc(), Some(10));

        assert!(listing.record_status(&identity, &MatchmakingSnapshot::offline(20)));
        assert_eq!(listing.filtered()[0].snapshot.timestamp_utc(), Some(20));
        assert_eq!(listing.freshest(&identity, 0).timestamp_utc(), Some(20));
    }

    #[test]
    fn test_freshest_respects_threshold() {
        let mut listing = ServerListing::new();
        let identity = ServerIdentity::direct("10.0.0.5");
        listing.record_status(&identity, &MatchmakingSnapshot::offline(500));

        assert!(listing.freshest(&identity, 499).is_valid());
        assert!(!listing.freshest(&identity, 500).is_valid());
        assert!(!listing.freshest(&ServerIdentity::direct("10.0.0.6"), 0).is_valid());
    }

    #[test]
    fn test_prune_drops_answers_outside_window() {
        let mut listing = ServerListing::new();
        let old = ServerIdentity::direct("10.0.0.1");
        let recent = ServerIdentity::direct("10.0.0.2");

        listing.record_status(&old, &MatchmakingSnapshot::offline(1_000));
        listing.record_status(&recent, &MatchmakingSnapshot::offline(1_000 + STATUS_FRESHNESS_MS + 1));
        assert_eq!(listing.known_len(), 2);

        assert_eq!(listing.prune_known(), 1);
        assert!(!listing.freshest(&old, 0).is_valid());
        assert!(listing.freshest(&recent, 0).is_valid());
        assert_eq!(listing.prune_known(), 0);
    }

    #[test]
    fn test_clear_keeps_status_answers() {
        let mut listing = ServerListing::new();
        let identity = ServerIdentity::direct("10.0.0.1");
        listing.set_records(vec![named("10.0.0.1", "A", 10)]);
        listing.record_status(&identity, &MatchmakingSnapshot::offline(20));

        listing.clear();
        assert!(listing.is_empty());
        assert!(listing.filtered().is_empty());
        assert!(listing.freshest(&identity, 0).is_valid());
    }
}
