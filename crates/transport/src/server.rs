//! Server-side datagram transport.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;

use tracing::{debug, trace};

use dgfs_protocol::MAX_DATAGRAM_LEN;

use crate::loss::LossGate;

/// What the daemon wants done with one inbound datagram.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum HandlerOutcome {
    /// Send this reply back to the peer.
    Reply(Vec<u8>),
    /// Say nothing; the peer's retry machinery handles it.
    NoReply,
    /// Send this final reply, then terminate the serve loop.
    Shutdown(Vec<u8>),
}

/// Per-datagram dispatch seam between the transport loop and the daemon.
pub trait DatagramHandler {
    /// Processes one datagram from `peer` and decides the reply.
    fn handle(&self, datagram: &[u8], peer: SocketAddr) -> HandlerOutcome;
}

/// Emission seam for server-initiated datagrams (monitor callbacks).
///
/// The production sink shares the serve socket; tests substitute an
/// in-memory recorder.
pub trait CallbackSink: Send + Sync {
    /// Sends one unsolicited datagram to `peer`, best-effort.
    fn deliver(&self, peer: SocketAddr, datagram: &[u8]) -> io::Result<()>;
}

/// Blocking UDP receive loop for the daemon.
#[derive(Debug)]
pub struct ServerTransport {
    socket: Arc<UdpSocket>,
    gate: LossGate,
}

impl ServerTransport {
    /// Binds the serve socket on `port` (0 picks an ephemeral port).
    pub fn bind(port: u16, gate: LossGate) -> io::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))?;
        Ok(Self {
            socket: Arc::new(socket),
            gate,
        })
    }

    /// Address the daemon is reachable at.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Returns a sink that emits callbacks from the serve socket, subject to
    /// the same send gate as replies.
    #[must_use]
    pub fn callback_sink(&self) -> Arc<dyn CallbackSink> {
        Arc::new(SocketCallbackSink {
            socket: Arc::clone(&self.socket),
            gate: self.gate,
        })
    }

    /// Receives datagrams until the handler requests shutdown.
    ///
    /// Datagrams dropped by the receive gate are read and discarded; the
    /// peer observes only silence. Replies pass the send gate before
    /// touching the socket.
    pub fn serve<H: DatagramHandler>(&self, handler: &H) -> io::Result<()> {
        let mut buf = [0u8; MAX_DATAGRAM_LEN];
        loop {
            let (received, peer) = self.socket.recv_from(&mut buf)?;
            if !self.gate.permit_recv() {
                debug!(%peer, len = received, "simulated receive loss, datagram dropped");
                continue;
            }
            match handler.handle(&buf[..received], peer) {
                HandlerOutcome::NoReply => {}
                HandlerOutcome::Reply(reply) => self.send_reply(peer, &reply),
                HandlerOutcome::Shutdown(reply) => {
                    self.send_reply(peer, &reply);
                    return Ok(());
                }
            }
        }
    }

    fn send_reply(&self, peer: SocketAddr, reply: &[u8]) {
        if !self.gate.permit_send() {
            debug!(%peer, len = reply.len(), "simulated send loss, reply dropped");
            return;
        }
        if let Err(error) = self.socket.send_to(reply, peer) {
            debug!(%peer, %error, "reply send failed");
        } else {
            trace!(%peer, len = reply.len(), "reply sent");
        }
    }
}

struct SocketCallbackSink {
    socket: Arc<UdpSocket>,
    gate: LossGate,
}

impl CallbackSink for SocketCallbackSink {
    fn deliver(&self, peer: SocketAddr, datagram: &[u8]) -> io::Result<()> {
        if !self.gate.permit_send() {
            debug!(%peer, len = datagram.len(), "simulated send loss, callback dropped");
            return Ok(());
        }
        self.socket.send_to(datagram, peer).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Echoes datagrams back, terminating when it sees `b"stop"`.
    struct EchoHandler;

    impl DatagramHandler for EchoHandler {
        fn handle(&self, datagram: &[u8], _peer: SocketAddr) -> HandlerOutcome {
            if datagram == b"stop" {
                HandlerOutcome::Shutdown(b"stopped".to_vec())
            } else if datagram == b"quiet" {
                HandlerOutcome::NoReply
            } else {
                HandlerOutcome::Reply(datagram.to_vec())
            }
        }
    }

    fn probe_socket() -> UdpSocket {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind probe");
        socket
            .set_read_timeout(Some(Duration::from_millis(500)))
            .expect("probe timeout");
        socket
    }

    fn target(transport: &ServerTransport) -> SocketAddr {
        let port = transport.local_addr().expect("server addr").port();
        SocketAddr::from((Ipv4Addr::LOCALHOST, port))
    }

    #[test]
    fn serve_replies_and_terminates_on_shutdown() {
        let transport = ServerTransport::bind(0, LossGate::lossless()).expect("bind server");
        let server = target(&transport);
        let loop_thread = std::thread::spawn(move || transport.serve(&EchoHandler));

        let probe = probe_socket();
        let mut buf = [0u8; 32];

        probe.send_to(b"hello", server).expect("send hello");
        let (received, _) = probe.recv_from(&mut buf).expect("recv echo");
        assert_eq!(&buf[..received], b"hello");

        probe.send_to(b"stop", server).expect("send stop");
        let (received, _) = probe.recv_from(&mut buf).expect("recv stop ack");
        assert_eq!(&buf[..received], b"stopped");

        loop_thread
            .join()
            .expect("serve thread")
            .expect("serve result");
    }

    #[test]
    fn no_reply_outcome_stays_silent() {
        let transport = ServerTransport::bind(0, LossGate::lossless()).expect("bind server");
        let server = target(&transport);
        let loop_thread = std::thread::spawn(move || transport.serve(&EchoHandler));

        let probe = probe_socket();
        let mut buf = [0u8; 32];

        probe.send_to(b"quiet", server).expect("send quiet");
        assert!(probe.recv_from(&mut buf).is_err(), "expected silence");

        probe.send_to(b"stop", server).expect("send stop");
        probe.recv_from(&mut buf).expect("recv stop ack");
        loop_thread
            .join()
            .expect("serve thread")
            .expect("serve result");
    }

    #[test]
    fn receive_gate_drops_inbound_datagrams() {
        let transport = ServerTransport::bind(0, LossGate::new(1.0, 0.0)).expect("bind server");
        let server = target(&transport);
        std::thread::spawn(move || transport.serve(&EchoHandler));

        let probe = probe_socket();
        let mut buf = [0u8; 32];
        probe.send_to(b"hello", server).expect("send hello");
        assert!(probe.recv_from(&mut buf).is_err(), "reply despite recv loss");
    }

    #[test]
    fn callback_sink_reaches_an_arbitrary_endpoint() {
        let transport = ServerTransport::bind(0, LossGate::lossless()).expect("bind server");
        let sink = transport.callback_sink();

        let probe = probe_socket();
        let probe_addr = probe.local_addr().expect("probe addr");
        sink.deliver(probe_addr, b"notify").expect("deliver");

        let mut buf = [0u8; 32];
        let (received, _) = probe.recv_from(&mut buf).expect("recv callback");
        assert_eq!(&buf[..received], b"notify");
    }

    #[test]
    fn gated_callback_sink_drops_without_error() {
        let transport = ServerTransport::bind(0, LossGate::new(0.0, 1.0)).expect("bind server");
        let sink = transport.callback_sink();

        let probe = probe_socket();
        let probe_addr = probe.local_addr().expect("probe addr");
        sink.deliver(probe_addr, b"notify").expect("deliver");

        let mut buf = [0u8; 32];
        assert!(probe.recv_from(&mut buf).is_err(), "callback despite send loss");
    }
}
