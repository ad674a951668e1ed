//! Client session: invocation strategy and operation surface.

use std::io;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, trace, warn};

use dgfs_protocol::{Request, Response, Status, ident, wire};
use dgfs_transport::{ClientTransport, LossGate};

use crate::cache::ClientCache;
use crate::config::ClientConfig;

/// Failure to establish the client session.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The local socket could not be prepared.
    #[error("failed to open client socket: {0}")]
    Socket(#[from] io::Error),
}

/// One client's connection to one daemon.
///
/// The session owns the socket, the retry strategy, and the freshness
/// cache. All operations are synchronous; the monitor operation blocks in
/// its listening loop for the subscription duration.
pub struct ClientSession {
    config: ClientConfig,
    transport: ClientTransport,
    cache: ClientCache,
}

impl ClientSession {
    /// Opens a session directed at the configured daemon.
    pub fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        let transport = ClientTransport::connect(
            config.server(),
            config.timeout(),
            LossGate::new(config.send_prob(), config.recv_prob()),
        )?;
        Ok(Self {
            cache: ClientCache::new(config.freshness()),
            config,
            transport,
        })
    }

    /// The session's freshness cache; tests inspect it directly.
    #[must_use]
    pub fn cache(&self) -> &ClientCache {
        &self.cache
    }

    /// Drops any cached range for `path`.
    pub fn invalidate(&mut self, path: &str) {
        self.cache.invalidate(path);
    }

    /// Reads `length` bytes at `offset`, consulting the cache first.
    ///
    /// A covered, fresh range answers locally without touching the network.
    /// Otherwise the read goes to the daemon and the reply is reconciled
    /// into the cache; failed invocations leave the cache untouched.
    pub fn read(&mut self, path: &str, offset: u64, length: u64) -> Response {
        let now = Instant::now();
        if let Some(bytes) = self.cache.lookup(path, offset, length, now) {
            let modified_ms = self.cache.server_modified_ms(path).unwrap_or(-1);
            return Response::new(
                Status::ReadSuccess,
                bytes,
                format!("read {length} byte(s) from {path} (cached)"),
                modified_ms,
            );
        }

        let request = Request::read(ident::next_request_id(), path, offset, length);
        let response = self.invoke(&request);
        if matches!(
            response.status,
            Status::ReadSuccess | Status::ReadIncomplete
        ) {
            self.cache.reconcile(
                path,
                offset,
                &response.payload,
                response.server_modified_ms,
                now,
            );
        }
        response
    }

    /// Inserts `payload` at `offset`, shifting the existing suffix right.
    pub fn write_insert(&mut self, path: &str, offset: u64, payload: Vec<u8>) -> Response {
        let request = Request::write_insert(ident::next_request_id(), path, offset, payload);
        self.invoke(&request)
    }

    /// Deletes `length` bytes at `offset`, shifting the suffix left.
    pub fn write_delete(&mut self, path: &str, offset: u64, length: u64) -> Response {
        let request = Request::write_delete(ident::next_request_id(), path, offset, length);
        self.invoke(&request)
    }

    /// Fetches the attribute record for `path`.
    pub fn file_info(&mut self, path: &str) -> Response {
        let request = Request::file_info(ident::next_request_id(), path);
        self.invoke(&request)
    }

    /// Asks the daemon to terminate its serve loop.
    pub fn shutdown_server(&mut self) -> Response {
        let request = Request::shutdown(ident::next_request_id());
        self.invoke(&request)
    }

    /// Registers for callbacks on `path` and listens for `duration`.
    ///
    /// Each decoded callback is handed to `on_callback`. The loop observes
    /// its own wall-clock budget; the daemon prunes the subscription lazily
    /// on its side. Returns the registration reply; if registration failed
    /// the loop is never entered.
    pub fn monitor<F>(&mut self, path: &str, duration: Duration, mut on_callback: F) -> Response
    where
        F: FnMut(&Response),
    {
        let request = Request::monitor(
            ident::next_request_id(),
            path,
            duration.as_millis() as u64,
        );
        let registration = self.invoke(&request);
        if registration.status != Status::MonitorSuccess {
            return registration;
        }

        let deadline = Instant::now() + duration;
        debug!(path, duration_ms = duration.as_millis() as u64, "listening for callbacks");
        while Instant::now() < deadline {
            match self.transport.recv_callback(deadline) {
                Ok(Some(datagram)) => match wire::decode_response(&datagram) {
                    Ok(callback) if callback.status == Status::Callback => {
                        trace!(path, len = callback.payload.len(), "callback received");
                        on_callback(&callback);
                    }
                    Ok(other) => {
                        trace!(status = other.status.name(), "non-callback datagram ignored");
                    }
                    Err(error) => debug!(%error, "malformed callback ignored"),
                },
                Ok(None) => {}
                Err(error) => {
                    warn!(%error, "callback listener stopped on socket error");
                    break;
                }
            }
        }
        registration
    }

    /// Runs one logical invocation through the retry strategy.
    ///
    /// Every round re-sends the same encoded datagram, so the request
    /// identifier the daemon deduplicates on is identical across rounds. A
    /// reply that cannot be decoded becomes a general-error response; a
    /// spent budget becomes a network-error response.
    pub fn invoke(&self, request: &Request) -> Response {
        let datagram = wire::encode_request(request);
        let rounds = self.config.max_retries();
        for round in 1..=rounds {
            match self.transport.exchange(&datagram) {
                Ok(Some(reply)) if !reply.is_empty() => {
                    return match wire::decode_response(&reply) {
                        Ok(response) => response,
                        Err(error) => {
                            warn!(%error, "malformed reply");
                            Response::error(
                                Status::GeneralError,
                                format!("malformed reply: {error}"),
                            )
                        }
                    };
                }
                Ok(_) => {
                    debug!(
                        request_id = request.request_id,
                        round,
                        rounds,
                        "no reply, retrying"
                    );
                }
                Err(error) => {
                    debug!(
                        request_id = request.request_id,
                        round,
                        rounds,
                        %error,
                        "exchange failed, retrying"
                    );
                }
            }
        }
        warn!(
            request_id = request.request_id,
            op = request.op.name(),
            rounds,
            "retry budget exhausted"
        );
        Response::network_error(rounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

    fn config_for(server: SocketAddr) -> ClientConfig {
        ClientConfig::builder(server)
            .timeout(Duration::from_millis(50))
            .max_retries(3)
            .build()
    }

    /// A bound-but-never-answering endpoint.
    fn dead_server() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind");
        let addr = socket.local_addr().expect("addr");
        (socket, addr)
    }

    #[test]
    fn exhausted_retries_synthesize_a_network_error() {
        let (_server, addr) = dead_server();
        let mut session = ClientSession::connect(config_for(addr)).expect("connect");
        let response = session.read("/f", 0, 10);
        assert_eq!(response.status, Status::NetworkError);
    }

    #[test]
    fn failed_reads_leave_the_cache_untouched() {
        let (_server, addr) = dead_server();
        let mut session = ClientSession::connect(config_for(addr)).expect("connect");
        session.read("/f", 0, 10);
        assert!(session.cache().is_empty());
    }

    #[test]
    fn a_malformed_reply_surfaces_as_a_general_error() {
        let (server, addr) = dead_server();
        let responder = std::thread::spawn(move || {
            let mut buf = [0u8; 1024];
            let (_, peer) = server.recv_from(&mut buf).expect("server recv");
            server.send_to(b"\xFF\xFF\xFF\xFF", peer).expect("server send");
        });

        let session = ClientSession::connect(config_for(addr)).expect("connect");
        let response = session.invoke(&Request::read(3, "/f", 0, 4));
        assert_eq!(response.status, Status::GeneralError);
        assert!(response.message.contains("malformed reply"));
        responder.join().expect("responder");
    }

    #[test]
    fn the_same_identifier_is_sent_on_every_round() {
        let (server, addr) = dead_server();
        server
            .set_read_timeout(Some(Duration::from_millis(500)))
            .expect("server timeout");
        let collector = std::thread::spawn(move || {
            let mut ids = Vec::new();
            let mut buf = [0u8; 1024];
            while let Ok((received, _)) = server.recv_from(&mut buf) {
                let request = wire::decode_request(&buf[..received]).expect("decodable request");
                ids.push(request.request_id);
            }
            ids
        });

        let session = ClientSession::connect(config_for(addr)).expect("connect");
        let request = Request::read(77, "/f", 0, 4);
        let response = session.invoke(&request);
        assert_eq!(response.status, Status::NetworkError);

        let ids = collector.join().expect("collector");
        assert_eq!(ids, [77, 77, 77]);
    }
}
