//! Request and response model shared by the client and the daemon.

/// Sentinel recorded in [`Response::server_modified_ms`] when no modification
/// time applies (errors, shutdown acknowledgments, synthesized replies).
pub const NO_MODIFICATION_TIME: i64 = -1;

/// Operations understood by the daemon, with stable wire ordinals.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Opcode {
    /// Terminate the daemon's serve loop.
    Shutdown,
    /// Read a byte range from a file.
    Read,
    /// Insert bytes at an offset, shifting the existing suffix right.
    WriteInsert,
    /// Register the sender for update callbacks on a path.
    Monitor,
    /// Remove a byte range from a file, shifting the suffix left.
    WriteDelete,
    /// Report file attributes.
    FileInfo,
}

impl Opcode {
    /// Returns the stable wire ordinal for this operation.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        match self {
            Opcode::Shutdown => 0,
            Opcode::Read => 1,
            Opcode::WriteInsert => 2,
            Opcode::Monitor => 3,
            Opcode::WriteDelete => 4,
            Opcode::FileInfo => 5,
        }
    }

    /// Maps a wire ordinal back to an operation.
    #[must_use]
    pub const fn from_u32(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Opcode::Shutdown),
            1 => Some(Opcode::Read),
            2 => Some(Opcode::WriteInsert),
            3 => Some(Opcode::Monitor),
            4 => Some(Opcode::WriteDelete),
            5 => Some(Opcode::FileInfo),
            _ => None,
        }
    }

    /// Returns the canonical lower-case name used in diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Opcode::Shutdown => "shutdown",
            Opcode::Read => "read",
            Opcode::WriteInsert => "write-insert",
            Opcode::Monitor => "monitor",
            Opcode::WriteDelete => "write-delete",
            Opcode::FileInfo => "file-info",
        }
    }

    /// Reports whether the operation changes file content. Mutating
    /// operations are non-idempotent and rely on at-most-once dispatch.
    #[must_use]
    pub const fn is_mutating(self) -> bool {
        matches!(self, Opcode::WriteInsert | Opcode::WriteDelete)
    }

    /// Returns every defined operation.
    #[must_use]
    pub const fn all() -> &'static [Opcode] {
        const OPCODES: &[Opcode] = &[
            Opcode::Shutdown,
            Opcode::Read,
            Opcode::WriteInsert,
            Opcode::Monitor,
            Opcode::WriteDelete,
            Opcode::FileInfo,
        ];
        OPCODES
    }
}

/// Reply status codes, with stable wire values.
///
/// The hundreds digit groups codes by operation; `Callback` marks
/// server-initiated monitor datagrams and `NetworkError` is synthesized by
/// the client when every retry round goes unanswered.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Status {
    /// Generic success.
    Success,
    /// Generic failure, including malformed replies observed by the client.
    GeneralError,
    /// The request named an operation the daemon does not recognise.
    InvalidOperation,
    /// Acknowledgment of a shutdown request.
    Shutdown,
    /// Full read of the requested range.
    ReadSuccess,
    /// The read could not be performed (missing file, offset past EOF).
    ReadError,
    /// The file ended before the requested length; payload holds the prefix.
    ReadIncomplete,
    /// Insert applied.
    WriteInsertSuccess,
    /// Insert failed.
    WriteInsertError,
    /// Monitor subscription registered.
    MonitorSuccess,
    /// Monitor registration failed.
    MonitorError,
    /// Range deletion applied.
    WriteDeleteSuccess,
    /// Range deletion failed (missing file, range past EOF).
    WriteDeleteError,
    /// File attributes follow in the payload.
    FileInfoSuccess,
    /// Attributes could not be read.
    FileInfoError,
    /// Server-initiated monitor callback.
    Callback,
    /// Client-synthesized: no reply after every retry round.
    NetworkError,
}

impl Status {
    /// Returns the stable wire value for this status.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        match self {
            Status::Success => 0,
            Status::GeneralError => 1,
            Status::InvalidOperation => 2,
            Status::Shutdown => 3,
            Status::ReadSuccess => 100,
            Status::ReadError => 101,
            Status::ReadIncomplete => 102,
            Status::WriteInsertSuccess => 200,
            Status::WriteInsertError => 201,
            Status::MonitorSuccess => 300,
            Status::MonitorError => 301,
            Status::WriteDeleteSuccess => 400,
            Status::WriteDeleteError => 401,
            Status::FileInfoSuccess => 500,
            Status::FileInfoError => 501,
            Status::Callback => 600,
            Status::NetworkError => 700,
        }
    }

    /// Maps a wire value back to a status.
    #[must_use]
    pub const fn from_u32(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Status::Success),
            1 => Some(Status::GeneralError),
            2 => Some(Status::InvalidOperation),
            3 => Some(Status::Shutdown),
            100 => Some(Status::ReadSuccess),
            101 => Some(Status::ReadError),
            102 => Some(Status::ReadIncomplete),
            200 => Some(Status::WriteInsertSuccess),
            201 => Some(Status::WriteInsertError),
            300 => Some(Status::MonitorSuccess),
            301 => Some(Status::MonitorError),
            400 => Some(Status::WriteDeleteSuccess),
            401 => Some(Status::WriteDeleteError),
            500 => Some(Status::FileInfoSuccess),
            501 => Some(Status::FileInfoError),
            600 => Some(Status::Callback),
            700 => Some(Status::NetworkError),
            _ => None,
        }
    }

    /// Returns the canonical display name used in diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::GeneralError => "general-error",
            Status::InvalidOperation => "invalid-operation",
            Status::Shutdown => "shutdown",
            Status::ReadSuccess => "read-success",
            Status::ReadError => "read-error",
            Status::ReadIncomplete => "read-incomplete",
            Status::WriteInsertSuccess => "write-insert-success",
            Status::WriteInsertError => "write-insert-error",
            Status::MonitorSuccess => "monitor-success",
            Status::MonitorError => "monitor-error",
            Status::WriteDeleteSuccess => "write-delete-success",
            Status::WriteDeleteError => "write-delete-error",
            Status::FileInfoSuccess => "file-info-success",
            Status::FileInfoError => "file-info-error",
            Status::Callback => "callback",
            Status::NetworkError => "network-error",
        }
    }

    /// Reports whether this status describes a failed invocation.
    #[must_use]
    pub const fn is_error(self) -> bool {
        matches!(
            self,
            Status::GeneralError
                | Status::InvalidOperation
                | Status::ReadError
                | Status::WriteInsertError
                | Status::MonitorError
                | Status::WriteDeleteError
                | Status::FileInfoError
                | Status::NetworkError
        )
    }

    /// Returns every defined status.
    #[must_use]
    pub const fn all() -> &'static [Status] {
        const STATUSES: &[Status] = &[
            Status::Success,
            Status::GeneralError,
            Status::InvalidOperation,
            Status::Shutdown,
            Status::ReadSuccess,
            Status::ReadError,
            Status::ReadIncomplete,
            Status::WriteInsertSuccess,
            Status::WriteInsertError,
            Status::MonitorSuccess,
            Status::MonitorError,
            Status::WriteDeleteSuccess,
            Status::WriteDeleteError,
            Status::FileInfoSuccess,
            Status::FileInfoError,
            Status::Callback,
            Status::NetworkError,
        ];
        STATUSES
    }
}

/// One logical client invocation.
///
/// Only the fields required by [`Request::op`] are semantically live; the
/// remaining fields are carried as zero/empty and ignored by the daemon. The
/// identifier stays constant across every retry of the invocation so the
/// daemon's duplicate filter can recognise resent datagrams.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Request {
    /// Nonzero identifier naming this invocation, stable across retries.
    pub request_id: u64,
    /// Requested operation.
    pub op: Opcode,
    /// Target path within the daemon's namespace.
    pub path: String,
    /// Byte count for read and write-delete.
    pub length: u64,
    /// Byte offset for read, write-insert, and write-delete.
    pub offset: u64,
    /// Bytes to insert for write-insert, empty otherwise.
    pub payload: Vec<u8>,
    /// Subscription lifetime for monitor, in milliseconds.
    pub monitor_duration_ms: u64,
}

impl Request {
    /// Builds a read request for `length` bytes starting at `offset`.
    #[must_use]
    pub fn read(request_id: u64, path: impl Into<String>, offset: u64, length: u64) -> Self {
        Self {
            request_id,
            op: Opcode::Read,
            path: path.into(),
            length,
            offset,
            payload: Vec::new(),
            monitor_duration_ms: 0,
        }
    }

    /// Builds an insert request placing `payload` at `offset`.
    #[must_use]
    pub fn write_insert(
        request_id: u64,
        path: impl Into<String>,
        offset: u64,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            request_id,
            op: Opcode::WriteInsert,
            path: path.into(),
            length: 0,
            offset,
            payload,
            monitor_duration_ms: 0,
        }
    }

    /// Builds a request deleting `length` bytes starting at `offset`.
    #[must_use]
    pub fn write_delete(request_id: u64, path: impl Into<String>, offset: u64, length: u64) -> Self {
        Self {
            request_id,
            op: Opcode::WriteDelete,
            path: path.into(),
            length,
            offset,
            payload: Vec::new(),
            monitor_duration_ms: 0,
        }
    }

    /// Builds a monitor registration lasting `duration_ms` milliseconds.
    #[must_use]
    pub fn monitor(request_id: u64, path: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            request_id,
            op: Opcode::Monitor,
            path: path.into(),
            length: 0,
            offset: 0,
            payload: Vec::new(),
            monitor_duration_ms: duration_ms,
        }
    }

    /// Builds a file attribute query.
    #[must_use]
    pub fn file_info(request_id: u64, path: impl Into<String>) -> Self {
        Self {
            request_id,
            op: Opcode::FileInfo,
            path: path.into(),
            length: 0,
            offset: 0,
            payload: Vec::new(),
            monitor_duration_ms: 0,
        }
    }

    /// Builds a daemon shutdown request.
    #[must_use]
    pub fn shutdown(request_id: u64) -> Self {
        Self {
            request_id,
            op: Opcode::Shutdown,
            path: String::new(),
            length: 0,
            offset: 0,
            payload: Vec::new(),
            monitor_duration_ms: 0,
        }
    }
}

/// Reply to one invocation, or a server-initiated callback.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Response {
    /// Outcome of the invocation.
    pub status: Status,
    /// File content, encoded attribute record, or empty.
    pub payload: Vec<u8>,
    /// Human-readable description of the outcome.
    pub message: String,
    /// Server-side modification time after the operation, in milliseconds
    /// since the Unix epoch, or [`NO_MODIFICATION_TIME`].
    pub server_modified_ms: i64,
}

impl Response {
    /// Builds a response from its parts.
    #[must_use]
    pub fn new(
        status: Status,
        payload: Vec<u8>,
        message: impl Into<String>,
        server_modified_ms: i64,
    ) -> Self {
        Self {
            status,
            payload,
            message: message.into(),
            server_modified_ms,
        }
    }

    /// Builds an error response with no payload and no modification time.
    #[must_use]
    pub fn error(status: Status, message: impl Into<String>) -> Self {
        Self::new(status, Vec::new(), message, NO_MODIFICATION_TIME)
    }

    /// Synthesized by the client when every retry round went unanswered.
    #[must_use]
    pub fn network_error(rounds: u32) -> Self {
        Self::error(
            Status::NetworkError,
            format!("no reply from server after {rounds} attempt(s)"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_ordinals_are_stable() {
        assert_eq!(Opcode::Shutdown.as_u32(), 0);
        assert_eq!(Opcode::Read.as_u32(), 1);
        assert_eq!(Opcode::WriteInsert.as_u32(), 2);
        assert_eq!(Opcode::Monitor.as_u32(), 3);
        assert_eq!(Opcode::WriteDelete.as_u32(), 4);
        assert_eq!(Opcode::FileInfo.as_u32(), 5);
    }

    #[test]
    fn opcode_ordinals_round_trip_for_all_operations() {
        for &op in Opcode::all() {
            assert_eq!(Opcode::from_u32(op.as_u32()), Some(op));
        }
    }

    #[test]
    fn opcode_rejects_unknown_ordinals() {
        assert_eq!(Opcode::from_u32(6), None);
        assert_eq!(Opcode::from_u32(u32::MAX), None);
    }

    #[test]
    fn only_writes_are_mutating() {
        let mutating: Vec<Opcode> = Opcode::all()
            .iter()
            .copied()
            .filter(|op| op.is_mutating())
            .collect();
        assert_eq!(mutating, [Opcode::WriteInsert, Opcode::WriteDelete]);
    }

    #[test]
    fn status_values_are_stable() {
        assert_eq!(Status::Success.as_u32(), 0);
        assert_eq!(Status::ReadIncomplete.as_u32(), 102);
        assert_eq!(Status::WriteDeleteSuccess.as_u32(), 400);
        assert_eq!(Status::Callback.as_u32(), 600);
        assert_eq!(Status::NetworkError.as_u32(), 700);
    }

    #[test]
    fn status_values_round_trip_for_all_statuses() {
        for &status in Status::all() {
            assert_eq!(Status::from_u32(status.as_u32()), Some(status));
        }
    }

    #[test]
    fn status_rejects_unknown_values() {
        assert_eq!(Status::from_u32(99), None);
        assert_eq!(Status::from_u32(103), None);
        assert_eq!(Status::from_u32(800), None);
    }

    #[test]
    fn callback_and_shutdown_are_not_errors() {
        assert!(!Status::Callback.is_error());
        assert!(!Status::Shutdown.is_error());
        assert!(!Status::ReadIncomplete.is_error());
        assert!(Status::NetworkError.is_error());
        assert!(Status::ReadError.is_error());
    }

    #[test]
    fn read_constructor_populates_only_live_fields() {
        let request = Request::read(7, "/a", 10, 20);
        assert_eq!(request.op, Opcode::Read);
        assert_eq!(request.offset, 10);
        assert_eq!(request.length, 20);
        assert!(request.payload.is_empty());
        assert_eq!(request.monitor_duration_ms, 0);
    }

    #[test]
    fn monitor_constructor_records_duration() {
        let request = Request::monitor(9, "/watched", 10_000);
        assert_eq!(request.op, Opcode::Monitor);
        assert_eq!(request.monitor_duration_ms, 10_000);
    }

    #[test]
    fn network_error_response_carries_no_modification_time() {
        let response = Response::network_error(3);
        assert_eq!(response.status, Status::NetworkError);
        assert_eq!(response.server_modified_ms, NO_MODIFICATION_TIME);
        assert!(response.message.contains("3 attempt(s)"));
    }
}
