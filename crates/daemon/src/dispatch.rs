//! Request decoding, strategy application, and operation dispatch.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use dgfs_engine::{FileOpError, FileStore};
use dgfs_protocol::{NO_MODIFICATION_TIME, Opcode, Request, Response, Status, wire};
use dgfs_transport::{CallbackSink, DatagramHandler, HandlerOutcome};

use crate::monitor::MonitorRegistry;
use crate::semantics::{InvocationSemantics, ReplyCache};

/// The daemon's per-datagram pipeline: decode, filter duplicates, execute,
/// encode.
pub struct RequestDispatcher {
    semantics: InvocationSemantics,
    replies: ReplyCache,
    store: FileStore,
    monitors: Arc<MonitorRegistry>,
    callbacks: Arc<dyn CallbackSink>,
}

impl RequestDispatcher {
    /// Wires the dispatcher together.
    #[must_use]
    pub fn new(
        semantics: InvocationSemantics,
        store: FileStore,
        monitors: Arc<MonitorRegistry>,
        callbacks: Arc<dyn CallbackSink>,
    ) -> Self {
        Self {
            semantics,
            replies: ReplyCache::new(),
            store,
            monitors,
            callbacks,
        }
    }

    /// The monitor registry this dispatcher notifies.
    #[must_use]
    pub fn monitors(&self) -> &MonitorRegistry {
        &self.monitors
    }

    /// Executes one decoded request against the file engine.
    ///
    /// This is the layer the at-most-once strategy must reach at most once
    /// per request identifier.
    fn execute(&self, request: &Request, peer: SocketAddr) -> Response {
        debug!(
            request_id = request.request_id,
            op = request.op.name(),
            path = %request.path,
            %peer,
            "dispatching request"
        );
        match request.op {
            Opcode::Read => self.execute_read(request),
            Opcode::WriteInsert => self.execute_insert(request),
            Opcode::WriteDelete => self.execute_delete(request),
            Opcode::Monitor => self.execute_monitor(request, peer),
            Opcode::FileInfo => self.execute_file_info(request),
            // The serve loop intercepts shutdown before dispatch.
            Opcode::Shutdown => Response::error(
                Status::InvalidOperation,
                "shutdown is not dispatchable".to_string(),
            ),
        }
    }

    fn execute_read(&self, request: &Request) -> Response {
        match self
            .store
            .read_range(&request.path, request.offset, request.length)
        {
            Ok(outcome) => {
                let status = if outcome.complete {
                    Status::ReadSuccess
                } else {
                    Status::ReadIncomplete
                };
                let message = format!(
                    "read {} of {} byte(s) from {}",
                    outcome.bytes.len(),
                    request.length,
                    request.path
                );
                Response::new(status, outcome.bytes, message, outcome.modified_ms)
            }
            Err(error) => Response::error(Status::ReadError, error.to_string()),
        }
    }

    fn execute_insert(&self, request: &Request) -> Response {
        match self
            .store
            .insert(&request.path, request.offset, &request.payload)
        {
            Ok(modified_ms) => {
                self.notify_monitors(&request.path, modified_ms, Opcode::WriteInsert);
                Response::new(
                    Status::WriteInsertSuccess,
                    Vec::new(),
                    format!(
                        "inserted {} byte(s) at offset {} into {}",
                        request.payload.len(),
                        request.offset,
                        request.path
                    ),
                    modified_ms,
                )
            }
            Err(error) => Response::error(Status::WriteInsertError, error.to_string()),
        }
    }

    fn execute_delete(&self, request: &Request) -> Response {
        match self
            .store
            .delete_range(&request.path, request.offset, request.length)
        {
            Ok(modified_ms) => {
                self.notify_monitors(&request.path, modified_ms, Opcode::WriteDelete);
                Response::new(
                    Status::WriteDeleteSuccess,
                    Vec::new(),
                    format!(
                        "deleted {} byte(s) at offset {} from {}",
                        request.length, request.offset, request.path
                    ),
                    modified_ms,
                )
            }
            Err(error) => Response::error(Status::WriteDeleteError, error.to_string()),
        }
    }

    fn execute_monitor(&self, request: &Request, peer: SocketAddr) -> Response {
        if !self.store.exists(&request.path) {
            return Response::error(
                Status::MonitorError,
                format!("file not found: {}", request.path),
            );
        }
        self.monitors.register(
            &request.path,
            peer,
            Duration::from_millis(request.monitor_duration_ms),
        );
        Response::new(
            Status::MonitorSuccess,
            Vec::new(),
            format!(
                "monitoring {} for {} ms",
                request.path, request.monitor_duration_ms
            ),
            self.store.modified_ms(&request.path),
        )
    }

    fn execute_file_info(&self, request: &Request) -> Response {
        match self.store.file_info(&request.path) {
            Ok(record) => {
                let modified_ms = record.modified_ms;
                Response::new(
                    Status::FileInfoSuccess,
                    record.render().into_bytes(),
                    format!("attributes of {}", request.path),
                    modified_ms,
                )
            }
            Err(error) => Response::error(Status::FileInfoError, error.to_string()),
        }
    }

    /// Reads the post-mutation content and fans it out to subscribers.
    ///
    /// The callback payload is the file's full content after the mutation,
    /// the one shape that fits both inserts and deletes.
    fn notify_monitors(&self, path: &str, modified_ms: i64, op: Opcode) {
        let content = match self.store.read_all(path) {
            Ok(content) => content,
            Err(FileOpError::NotFound { .. }) => Vec::new(),
            Err(error) => {
                debug!(path, %error, "post-mutation content read failed, callback skipped");
                return;
            }
        };
        self.monitors
            .notify(path, &content, modified_ms, op, self.callbacks.as_ref());
    }
}

impl DatagramHandler for RequestDispatcher {
    fn handle(&self, datagram: &[u8], peer: SocketAddr) -> HandlerOutcome {
        let request = match wire::decode_request(datagram) {
            Ok(request) => request,
            Err(error) => {
                debug!(%peer, %error, "malformed datagram dropped");
                return HandlerOutcome::NoReply;
            }
        };

        if request.op == Opcode::Shutdown {
            info!(%peer, request_id = request.request_id, "shutdown requested");
            let acknowledgment = Response::new(
                Status::Shutdown,
                Vec::new(),
                "daemon shutting down",
                NO_MODIFICATION_TIME,
            );
            return HandlerOutcome::Shutdown(wire::encode_response(&acknowledgment));
        }

        let response = match self.semantics {
            InvocationSemantics::AtLeastOnce => self.execute(&request, peer),
            InvocationSemantics::AtMostOnce => {
                if let Some(cached) = self.replies.lookup(request.request_id) {
                    debug!(
                        request_id = request.request_id,
                        "duplicate request answered from reply cache"
                    );
                    cached
                } else {
                    let response = self.execute(&request, peer);
                    self.replies.store(request.request_id, &response);
                    response
                }
            }
        };
        HandlerOutcome::Reply(wire::encode_response(&response))
    }
}
