//! # Direct-Connect Registry Library
//!
//! This library implements the registry that dedicated game servers advertise
//! themselves to and that server browsers query for their public server list.
//!
//! ## Core Responsibilities
//!
//! ### Advertisement Tracking
//! Dedicated servers send periodic `Advertise` heartbeats. The registry keeps
//! one entry per `host:port` identity, hands out a stable join code on first
//! contact, and drops servers whose heartbeats stop arriving.
//!
//! ### Server List Queries
//! Browsers send `List` requests carrying their filter text. Filtering happens
//! here, on the registry side, so a browser only receives matching servers,
//! capped at the protocol's list limit.
//!
//! ### Status Queries
//! `Query` requests report whether a single identity is currently listed.
//! Unknown servers are reported as offline at the time of the query, which
//! gives browsers a definite answer for their favourites.
//!
//! ## Module Organization
//!
//! ### Directory Module (`directory`)
//! The in-memory table of advertised servers:
//! - Capacity enforcement and join code assignment
//! - Heartbeat timeout detection and cleanup
//! - Name filtering and ordering for list responses
//!
//! ### Network Module (`network`)
//! TCP plumbing around the directory:
//! - Accept loop with one task per connection
//! - Length-prefixed request/response framing
//! - Periodic expiry task
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use registry::network::RegistryServer;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     // Servers that miss heartbeats for 30s are dropped; at most 1024 listed
//!     let server = RegistryServer::new("0.0.0.0:2460", Duration::from_secs(30), 1024).await?;
//!     server.run().await
//! }
//! ```

pub mod directory;
pub mod network;
