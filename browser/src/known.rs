//! Servers the player has marked or joined before
//!
//! Favourites keep the order they were added in and never drop anything.
//! The recent list is bounded and keeps the most recently joined server first.

use shared::ServerIdentity;

/// How many recently joined servers are remembered
pub const MAX_RECENT_SERVERS: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownServerList {
    identities: Vec<ServerIdentity>,
    capacity: Option<usize>,
}

impl KnownServerList {
    /// Unbounded, in insertion order
    pub fn favorites() -> Self {
        Self {
            identities: Vec::new(),
            capacity: None,
        }
    }

    /// Bounded to [`MAX_RECENT_SERVERS`], most recent first
    pub fn recent() -> Self {
        Self::most_recent_first(MAX_RECENT_SERVERS)
    }

    pub fn most_recent_first(capacity: usize) -> Self {
        Self {
            identities: Vec::new(),
            capacity: Some(capacity),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Adds `identity`; returns false for invalid identities
    ///
    /// On a bounded list an existing identity moves to the front and the
    /// oldest entry falls off once the list is full. On an unbounded list an
    /// existing identity keeps its place.
    pub fn add(&mut self, identity: ServerIdentity) -> bool {
        if !identity.is_valid() {
            return false;
        }

        match self.capacity {
            Some(capacity) => {
                self.identities.retain(|known| known != &identity);
                self.identities.insert(0, identity);
                self.identities.truncate(capacity);
            }
            None => {
                if !self.contains(&identity) {
                    self.identities.push(identity);
                }
            }
        }
        true
    }

    pub fn remove(&mut self, identity: &ServerIdentity) -> bool {
        let before = self.identities.len();
        self.identities.retain(|known| known != identity);
        self.identities.len() != before
    }

    pub fn contains(&self, identity: &ServerIdentity) -> bool {
        self.identities.contains(identity)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ServerIdentity> {
        self.identities.iter()
    }

    pub fn as_slice(&self) -> &[ServerIdentity] {
        &self.identities
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

impl<'a> IntoIterator for &'a KnownServerList {
    type Item = &'a ServerIdentity;
    type IntoIter = std::slice::Iter<'a, ServerIdentity>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
