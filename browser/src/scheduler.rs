//! Per-server online status refreshes spread over every backend
//!
//! The scheduler is handed a list of identities the player cares about
//! (favourites, recently joined servers) and, once per pass, asks at most one
//! backend to refresh each stale one. Identities some backend already knows
//! about, or is already fetching, are left alone so the same server is never
//! queried twice at once.

use crate::backend::{Backend, RefreshCallback};
use log::debug;
use shared::ServerIdentity;

/// What one scheduling pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshPass {
    /// Requests handed to a backend
    pub issued: usize,
    /// A backend already holds data newer than the threshold
    pub skipped_fresh: usize,
    /// A backend is already fetching this identity
    pub skipped_pending: usize,
    /// Stale, but no backend could take the request this pass
    pub deferred: usize,
    pub invalid: usize,
}

#[derive(Debug, Default)]
pub struct RefreshScheduler {
    exhausted: Vec<bool>,
}

impl RefreshScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests fresh status for every identity with no data newer than `newer_than_utc`
    ///
    /// `make_callback` is asked for a completion callback each time a request
    /// is about to be issued. A backend whose rate limit runs out during the
    /// pass is not asked again until the next pass; identities it could not
    /// take are reported as deferred.
    pub fn update_online_status<'a, I, F>(
        &mut self,
        backends: &mut [Box<dyn Backend>],
        identities: I,
        newer_than_utc: u64,
        mut make_callback: F,
    ) -> RefreshPass
    where
        I: IntoIterator<Item = &'a ServerIdentity>,
        F: FnMut(&ServerIdentity) -> RefreshCallback,
    {
        self.exhausted.clear();
        self.exhausted.resize(backends.len(), false);

        let mut pass = RefreshPass::default();

        for identity in identities {
            if !identity.is_valid() {
                pass.invalid += 1;
                continue;
            }

            let fresh = backends.iter().any(|backend| {
                backend.is_available()
                    && backend
                        .get_server_matchmaking_data(identity, newer_than_utc)
                        .is_valid()
            });
            if fresh {
                pass.skipped_fresh += 1;
                continue;
            }

            if backends.iter().any(|backend| backend.is_pending(identity)) {
                pass.skipped_pending += 1;
                continue;
            }

            if self.issue(backends, identity, &mut make_callback) {
                pass.issued += 1;
            } else {
                pass.deferred += 1;
            }
        }

        if pass.issued > 0 || pass.deferred > 0 {
            debug!(
                "Status refresh: {} issued, {} deferred, {} fresh, {} pending",
                pass.issued, pass.deferred, pass.skipped_fresh, pass.skipped_pending
            );
        }
        pass
    }

    fn issue<F>(
        &mut self,
        backends: &mut [Box<dyn Backend>],
        identity: &ServerIdentity,
        make_callback: &mut F,
    ) -> bool
    where
        F: FnMut(&ServerIdentity) -> RefreshCallback,
    {
        let kind = identity.kind();

        for (i, backend) in backends.iter_mut().enumerate() {
            if self.exhausted[i]
                || !backend.is_available()
                || !backend.can_refresh_server_now()
                || !backend.can_refresh_server_of_type_now(kind)
            {
                continue;
            }

            if backend.refresh_server(identity, make_callback(identity)) {
                if !backend.can_refresh_server_now() {
                    self.exhausted[i] = true;
                }
                return true;
            }
        }
        false
    }
}
