#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `dgfs_core` is the client side of the dgfs remote file service. It owns
//! the retry-based invocation strategy that makes request/reply exchanges
//! reliable over the lossy transport, the range-addressable freshness cache
//! that answers repeat reads locally, and the session type that ties both to
//! one daemon.
//!
//! # Design
//!
//! - [`ClientConfig`] carries the connection parameters (server endpoint,
//!   receive timeout, retry budget, freshness interval, loss-simulation
//!   probabilities) behind a builder, so call sites only name what they
//!   change.
//! - [`ClientSession::invoke`] encodes a request once and retries the
//!   exchange with the same request identifier until a reply arrives or the
//!   budget is spent, then synthesizes a network-error reply. Identifier
//!   stability across retries is what lets the daemon's duplicate filter
//!   make the write operations safe.
//! - [`ClientCache`] serves reads from a per-path validity window and
//!   reconciles misses three ways against the server's modification time:
//!   first store, revalidate on equal time, replace on change.
//!
//! # Invariants
//!
//! - A cached read never returns bytes outside the entry's covered range,
//!   and never after the freshness window has lapsed without revalidation.
//! - Failed invocations leave the cache untouched.
//! - One logical operation uses exactly one request identifier, however many
//!   datagrams it takes.

mod cache;
mod config;
mod session;

pub use crate::cache::ClientCache;
pub use crate::config::{ClientConfig, ClientConfigBuilder};
pub use crate::session::{ClientError, ClientSession};
