//! Byte-range file operations over a rooted directory.

use std::fs::{File, Metadata, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::UNIX_EPOCH;

use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

use crate::info::FileInfoRecord;

/// Failure of one file operation.
#[derive(Debug, Error)]
pub enum FileOpError {
    /// The target file does not exist.
    #[error("file not found: {path}")]
    NotFound {
        /// Request path as supplied by the client.
        path: String,
    },
    /// A read started at or past the end of the file.
    #[error("offset {offset} is at or beyond end of file ({file_len} byte(s))")]
    OffsetBeyondEof {
        /// Requested offset.
        offset: u64,
        /// Current file length.
        file_len: u64,
    },
    /// A delete range extended past the end of the file.
    #[error("range [{offset}, {offset}+{length}) extends beyond end of file ({file_len} byte(s))")]
    RangeBeyondEof {
        /// Requested offset.
        offset: u64,
        /// Requested length.
        length: u64,
        /// Current file length.
        file_len: u64,
    },
    /// The underlying filesystem operation failed.
    #[error("{operation} failed for {path}: {source}")]
    Io {
        /// Request path as supplied by the client.
        path: String,
        /// Filesystem primitive that failed.
        operation: &'static str,
        /// Underlying error.
        source: io::Error,
    },
}

impl FileOpError {
    fn io(path: &str, operation: &'static str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            return Self::NotFound {
                path: path.to_string(),
            };
        }
        Self::Io {
            path: path.to_string(),
            operation,
            source,
        }
    }
}

/// Bytes produced by a range read.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReadOutcome {
    /// Bytes read, possibly fewer than requested.
    pub bytes: Vec<u8>,
    /// Whether the full requested length was available.
    pub complete: bool,
    /// File modification time after the read, in milliseconds.
    pub modified_ms: i64,
}

/// Stateless file operation handlers rooted at a directory.
///
/// Request paths are interpreted beneath the root; a root of `/` reproduces
/// the flat absolute namespace. Mutating operations on the same resolved
/// path are serialized through a per-path lock table.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    write_locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl FileStore {
    /// Creates a store rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_locks: DashMap::new(),
        }
    }

    /// Resolves a request path beneath the store root.
    #[must_use]
    pub fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    /// Reads up to `length` bytes starting at `offset`.
    ///
    /// Reading at or past the end of the file is an error; a range that
    /// starts in bounds but runs past the end yields a short, incomplete
    /// outcome carrying the bytes that were available.
    pub fn read_range(
        &self,
        path: &str,
        offset: u64,
        length: u64,
    ) -> Result<ReadOutcome, FileOpError> {
        let resolved = self.resolve(path);
        let mut file = File::open(&resolved).map_err(|e| FileOpError::io(path, "open", e))?;
        let file_len = file
            .metadata()
            .map_err(|e| FileOpError::io(path, "stat", e))?
            .len();
        if offset >= file_len {
            return Err(FileOpError::OffsetBeyondEof { offset, file_len });
        }
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| FileOpError::io(path, "seek", e))?;
        let mut bytes = Vec::with_capacity(length.min(file_len - offset) as usize);
        file.take(length)
            .read_to_end(&mut bytes)
            .map_err(|e| FileOpError::io(path, "read", e))?;
        let complete = bytes.len() as u64 == length;
        debug!(path, offset, length, read = bytes.len(), complete, "range read");
        Ok(ReadOutcome {
            bytes,
            complete,
            modified_ms: self.modified_ms(path),
        })
    }

    /// Inserts `payload` at `offset`, shifting the existing suffix right.
    ///
    /// An offset past the end of the file extends it; the preserved suffix
    /// is then empty and any gap reads back as zeros. Returns the file's
    /// modification time after the write.
    pub fn insert(&self, path: &str, offset: u64, payload: &[u8]) -> Result<i64, FileOpError> {
        let resolved = self.resolve(path);
        let lock = self.write_lock(&resolved);
        let _guard = lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&resolved)
            .map_err(|e| FileOpError::io(path, "open", e))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| FileOpError::io(path, "seek", e))?;
        let mut suffix = Vec::new();
        file.read_to_end(&mut suffix)
            .map_err(|e| FileOpError::io(path, "read", e))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| FileOpError::io(path, "seek", e))?;
        file.write_all(payload)
            .map_err(|e| FileOpError::io(path, "write", e))?;
        file.write_all(&suffix)
            .map_err(|e| FileOpError::io(path, "write", e))?;
        file.flush().map_err(|e| FileOpError::io(path, "flush", e))?;
        debug!(path, offset, inserted = payload.len(), shifted = suffix.len(), "insert applied");
        Ok(self.modified_ms(path))
    }

    /// Removes `[offset, offset + length)`, shifting the suffix left.
    ///
    /// The whole range must lie within the file. Returns the file's
    /// modification time after the write.
    pub fn delete_range(
        &self,
        path: &str,
        offset: u64,
        length: u64,
    ) -> Result<i64, FileOpError> {
        let resolved = self.resolve(path);
        let lock = self.write_lock(&resolved);
        let _guard = lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&resolved)
            .map_err(|e| FileOpError::io(path, "open", e))?;
        let file_len = file
            .metadata()
            .map_err(|e| FileOpError::io(path, "stat", e))?
            .len();
        let end = offset.saturating_add(length);
        if end > file_len {
            return Err(FileOpError::RangeBeyondEof {
                offset,
                length,
                file_len,
            });
        }
        file.seek(SeekFrom::Start(end))
            .map_err(|e| FileOpError::io(path, "seek", e))?;
        let mut suffix = Vec::new();
        file.read_to_end(&mut suffix)
            .map_err(|e| FileOpError::io(path, "read", e))?;
        file.set_len(offset)
            .map_err(|e| FileOpError::io(path, "truncate", e))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| FileOpError::io(path, "seek", e))?;
        file.write_all(&suffix)
            .map_err(|e| FileOpError::io(path, "write", e))?;
        file.flush().map_err(|e| FileOpError::io(path, "flush", e))?;
        debug!(path, offset, length, shifted = suffix.len(), "range deleted");
        Ok(self.modified_ms(path))
    }

    /// Reads the attribute record for a file.
    pub fn file_info(&self, path: &str) -> Result<FileInfoRecord, FileOpError> {
        let resolved = self.resolve(path);
        let metadata =
            std::fs::metadata(&resolved).map_err(|e| FileOpError::io(path, "stat", e))?;
        Ok(FileInfoRecord::from_metadata(&resolved, &metadata))
    }

    /// Reads the whole file, as delivered in monitor callbacks.
    pub fn read_all(&self, path: &str) -> Result<Vec<u8>, FileOpError> {
        std::fs::read(self.resolve(path)).map_err(|e| FileOpError::io(path, "read", e))
    }

    /// Reports whether the file currently exists.
    #[must_use]
    pub fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }

    /// File modification time in milliseconds since the Unix epoch, or `-1`
    /// when it cannot be read.
    #[must_use]
    pub fn modified_ms(&self, path: &str) -> i64 {
        std::fs::metadata(self.resolve(path))
            .as_ref()
            .map_or(-1, metadata_modified_ms)
    }

    fn write_lock(&self, resolved: &Path) -> Arc<Mutex<()>> {
        self.write_locks
            .entry(resolved.to_path_buf())
            .or_default()
            .clone()
    }
}

/// Modification time of `metadata` in milliseconds, or `-1`.
#[must_use]
pub(crate) fn metadata_modified_ms(metadata: &Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
        .map_or(-1, |elapsed| elapsed.as_millis() as i64)
}
