#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `dgfs_protocol` defines the request/reply model shared by the dgfs client
//! and daemon together with the datagram codec that carries it. The service
//! runs over an unreliable datagram transport, so every message must fit in a
//! single datagram of at most [`MAX_DATAGRAM_LEN`] bytes and carry enough
//! identity for the far side to pair replies with invocations and to filter
//! duplicates.
//!
//! # Design
//!
//! - [`Request`] and [`Response`] are plain owned structs; the operation and
//!   status enumerations ([`Opcode`], [`Status`]) expose their stable wire
//!   ordinals through `as_u32`/`from_u32` pairs.
//! - The [`wire`] module implements the pure, deterministic codec: fixed-width
//!   big-endian integers with length-prefixed byte fields, no I/O.
//! - [`ident::next_request_id`] derives the per-invocation identifier that the
//!   client reuses across retries and the daemon keys its reply cache on.
//!
//! # Invariants
//!
//! - Encoding then decoding any valid [`Request`] or [`Response`] yields an
//!   equal value.
//! - Decoding fails with a [`wire::WireError`] rather than panicking for every
//!   malformed input: truncated prefixes, overrunning length fields, unknown
//!   ordinals, and non-UTF-8 text.
//! - Request identifiers are never zero.
//!
//! # Examples
//!
//! ```
//! use dgfs_protocol::{ident, wire, Request};
//!
//! let request = Request::read(ident::next_request_id(), "/srv/data.bin", 0, 128);
//! let datagram = wire::encode_request(&request);
//! let decoded = wire::decode_request(&datagram).expect("round trip");
//! assert_eq!(decoded, request);
//! ```

pub mod ident;
mod message;
pub mod wire;

pub use crate::message::{NO_MODIFICATION_TIME, Opcode, Request, Response, Status};
pub use crate::wire::MAX_DATAGRAM_LEN;
