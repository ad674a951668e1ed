#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `dgfs_engine` implements the daemon's file operations: byte-range reads,
//! insert-writes, delete-writes, and attribute queries over a directory tree
//! rooted at a configurable path. The handlers are stateless; the only
//! shared structure is a per-path lock table that serializes mutating
//! operations on the same file within the process.
//!
//! # Design
//!
//! - [`FileStore`] resolves request paths beneath its root and exposes one
//!   method per operation. Every handler reports the file's post-operation
//!   modification time in milliseconds so the protocol layer can attach it
//!   to replies and clients can reconcile their caches against it.
//! - Insert preserves the suffix `[offset, EOF)` in memory, writes the new
//!   bytes, then writes the suffix back. Delete rewrites the suffix
//!   `[offset + length, EOF)` over the removed range and truncates. Neither
//!   stages through a temporary file: a failure mid-write leaves the file
//!   undefined.
//! - [`info::FileInfoRecord`] renders the fixed-shape attribute record
//!   returned for file-info queries.
//!
//! # Errors
//!
//! All handlers return [`FileOpError`], which distinguishes missing files,
//! out-of-range offsets, and underlying I/O failures; the daemon maps these
//! onto per-operation protocol status codes.

pub mod info;
mod store;

pub use crate::store::{FileOpError, FileStore, ReadOutcome};
