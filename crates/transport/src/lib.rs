#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `dgfs_transport` carries encoded protocol datagrams between the client and
//! the daemon over UDP while simulating an unreliable network. Both
//! directions of each endpoint pass through a [`LossGate`] that drops
//! datagrams with a configured probability, so the reliability machinery in
//! the layers above can be exercised without a lossy network.
//!
//! # Design
//!
//! - [`ClientTransport`] owns one socket for the whole client lifetime: the
//!   request/reply exchange and the monitor callback listener share it, so
//!   the daemon can reach the client at the address it saw the registration
//!   from.
//! - [`ServerTransport`] runs the daemon's blocking receive loop and hands
//!   each surviving datagram to a [`DatagramHandler`]. Server-initiated
//!   monitor callbacks are emitted through the [`CallbackSink`] seam, which
//!   tests replace with an in-memory recorder.
//! - Simulated loss is invisible to the far side: a send-dropped datagram
//!   never touches the socket, and a receive-dropped datagram is read and
//!   discarded.
//!
//! # Invariants
//!
//! - A gate probability of `1.0` never drops and `0.0` always drops, so
//!   tests at the extremes are deterministic.
//! - A timed-out or dropped exchange surfaces as `Ok(None)`, never as an
//!   `Err`; socket failures are real errors.
//! - No datagram larger than [`dgfs_protocol::MAX_DATAGRAM_LEN`] is ever
//!   read or written.

mod client;
mod loss;
mod server;

pub use crate::client::ClientTransport;
pub use crate::loss::LossGate;
pub use crate::server::{CallbackSink, DatagramHandler, HandlerOutcome, ServerTransport};
