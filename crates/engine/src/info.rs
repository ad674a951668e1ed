//! Fixed-shape file attribute records.

use std::fs::Metadata;
use std::path::Path;
use std::time::SystemTime;

use time::OffsetDateTime;
use time::macros::format_description;

use crate::store::metadata_modified_ms;

/// Attribute record returned for file-info queries.
///
/// The rendered form is a stable, human-readable block; clients display it
/// verbatim.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileInfoRecord {
    /// File name without its directory.
    pub name: String,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Modification time in milliseconds since the Unix epoch, or `-1`.
    pub modified_ms: i64,
    /// Whether the owning user may read the file.
    pub readable: bool,
    /// Whether the owning user may write the file.
    pub writable: bool,
    /// Whether the owning user may execute the file.
    pub executable: bool,
    /// Whether the name marks the file as hidden.
    pub hidden: bool,
    /// Absolute path on the daemon host.
    pub absolute_path: String,
    /// Parent directory, empty at the filesystem root.
    pub parent: String,
}

impl FileInfoRecord {
    /// Builds a record from resolved path and metadata.
    #[must_use]
    pub fn from_metadata(resolved: &Path, metadata: &Metadata) -> Self {
        let name = resolved
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (readable, writable, executable) = permission_flags(metadata);
        Self {
            hidden: name.starts_with('.'),
            name,
            size_bytes: metadata.len(),
            modified_ms: metadata_modified_ms(metadata),
            readable,
            writable,
            executable,
            absolute_path: resolved.to_string_lossy().into_owned(),
            parent: resolved
                .parent()
                .map(|parent| parent.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }

    /// Renders the record in its fixed shape.
    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "name: {}\nsize: {} byte(s)\nlast-modified: {}\nreadable: {}\nwritable: {}\nexecutable: {}\nhidden: {}\nabsolute-path: {}\nparent: {}\n",
            self.name,
            self.size_bytes,
            format_modified(self.modified_ms),
            self.readable,
            self.writable,
            self.executable,
            self.hidden,
            self.absolute_path,
            self.parent,
        )
    }
}

/// Formats a millisecond timestamp as `YYYY-MM-DD HH:MM:SS UTC`, falling
/// back to the raw value when it is out of range.
fn format_modified(modified_ms: i64) -> String {
    if modified_ms < 0 {
        return "unknown".to_string();
    }
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second] UTC");
    let timestamp = OffsetDateTime::from(
        SystemTime::UNIX_EPOCH + std::time::Duration::from_millis(modified_ms as u64),
    );
    timestamp
        .format(format)
        .unwrap_or_else(|_| format!("{modified_ms} ms"))
}

#[cfg(unix)]
fn permission_flags(metadata: &Metadata) -> (bool, bool, bool) {
    use std::os::unix::fs::PermissionsExt;
    let mode = metadata.permissions().mode();
    (mode & 0o400 != 0, mode & 0o200 != 0, mode & 0o100 != 0)
}

#[cfg(not(unix))]
fn permission_flags(metadata: &Metadata) -> (bool, bool, bool) {
    (true, !metadata.permissions().readonly(), false)
}
