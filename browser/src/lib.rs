//! # Server Browser Library
//!
//! This library implements the client side of server discovery: it asks
//! several independent discovery backends for game servers and merges their
//! answers into one de-duplicated, capped and sorted list the UI can show.
//!
//! ## Architecture Overview
//!
//! Everything here is driven by `tick()` on a single thread. Backends that do
//! network I/O run it on tokio tasks and hand results back through channels
//! drained in their own `tick()`, so listeners and callbacks never run
//! concurrently with the rest of the browser.
//!
//! ### Aggregation
//! Each backend keeps its own filtered public list. The aggregator polls those
//! lists, splits the global budget of 200 entries fairly between backends,
//! merges round-robin, keeps the newest snapshot for servers found by more
//! than one backend, and sorts the result by display name.
//!
//! ### Filtering
//! Filter text is applied locally on every keystroke. Backends that filter on
//! the remote side are only re-queried once the player stops typing for half a
//! second, or immediately when the filter is committed.
//!
//! ### Known Servers
//! Favourite and recently joined servers are not necessarily in any public
//! list. The refresh scheduler asks one backend at a time to re-query their
//! status, never twice for the same server while a request is in flight.
//!
//! ## Module Organization
//!
//! ### Backend Modules (`backend`, `listing`, `memory_backend`, `registry_backend`)
//! - The capability trait every discovery source implements
//! - Filtered list and status bookkeeping the backends share
//! - An in-process backend fed by its host (LAN discovery, tests)
//! - A backend for the direct-connect registry over TCP
//!
//! ### Aggregation Modules (`aggregator`, `fair_split`, `entry`)
//! - Debounced filtering and refresh dispatch
//! - Fair allocation of the entry budget
//! - List rows with joinability flags
//!
//! ### Status Modules (`scheduler`, `known`, `resolver`, `context`)
//! - Per-server refresh scheduling with rate limits
//! - Favourite and recent server lists
//! - Cached, coalescing host name resolution
//! - The `Browser` context owning all of the above
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use browser::aggregator::Aggregator;
//! use browser::clock::SystemClock;
//! use browser::context::Browser;
//! use browser::entry::ServerListEntry;
//! use browser::registry_backend::RegistryBackend;
//! use browser::resolver::DomainResolver;
//! use std::rc::Rc;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let mut aggregator = Aggregator::new(Rc::new(SystemClock));
//!     aggregator.register_backend(Box::new(RegistryBackend::new("127.0.0.1:2460")));
//!     aggregator.subscribe(Box::new(|entries: &[ServerListEntry]| {
//!         println!("{} servers", entries.len())
//!     }));
//!     aggregator.on_open();
//!
//!     let mut browser = Browser::new(aggregator, DomainResolver::system());
//!     loop {
//!         browser.tick();
//!         tokio::time::sleep(std::time::Duration::from_millis(50)).await;
//!     }
//! }
//! ```

pub mod aggregator;
pub mod backend;
pub mod clock;
pub mod context;
pub mod entry;
pub mod event;
pub mod fair_split;
pub mod known;
pub mod listing;
pub mod memory_backend;
pub mod registry_backend;
pub mod resolver;
pub mod scheduler;

pub use aggregator::{Aggregator, MAX_SERVER_LIST_ENTRIES};
pub use backend::{Backend, RefreshKind};
pub use context::{Browser, JoinAddress};
pub use entry::{JoinContext, ServerListEntry};
