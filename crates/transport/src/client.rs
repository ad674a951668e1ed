//! Client-side datagram transport.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use tracing::trace;

use dgfs_protocol::MAX_DATAGRAM_LEN;

use crate::loss::LossGate;

/// Request/reply datagram channel from a client to one daemon.
///
/// One socket serves the whole client lifetime. Replies and monitor
/// callbacks both arrive on it, which is what lets the daemon reach a
/// monitoring client at the endpoint it registered from.
#[derive(Debug)]
pub struct ClientTransport {
    socket: UdpSocket,
    timeout: Duration,
    gate: LossGate,
}

impl ClientTransport {
    /// Binds an ephemeral local socket directed at `server`.
    ///
    /// `timeout` bounds every receive; it must be nonzero.
    pub fn connect(server: SocketAddr, timeout: Duration, gate: LossGate) -> io::Result<Self> {
        if timeout.is_zero() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "receive timeout must be nonzero",
            ));
        }
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect(server)?;
        socket.set_read_timeout(Some(timeout))?;
        Ok(Self {
            socket,
            timeout,
            gate,
        })
    }

    /// Address of the local socket the daemon sees requests from.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Sends one request datagram and waits up to the configured timeout for
    /// a reply.
    ///
    /// Returns `Ok(None)` when the round produced nothing: the send gate
    /// dropped the datagram, the receive gate dropped the reply, or the
    /// timeout elapsed. Callers treat all three identically and retry.
    pub fn exchange(&self, datagram: &[u8]) -> io::Result<Option<Vec<u8>>> {
        if !self.gate.permit_send() {
            trace!(len = datagram.len(), "simulated send loss, datagram dropped");
            return Ok(None);
        }
        self.socket.send(datagram)?;

        let mut buf = [0u8; MAX_DATAGRAM_LEN];
        match self.socket.recv(&mut buf) {
            Ok(received) => {
                if !self.gate.permit_recv() {
                    trace!(len = received, "simulated receive loss, reply discarded");
                    return Ok(None);
                }
                Ok(Some(buf[..received].to_vec()))
            }
            Err(error) if is_timeout(&error) => {
                trace!("receive timed out");
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    /// Waits for one server-initiated callback datagram until `deadline`.
    ///
    /// Returns `Ok(None)` when the deadline passed, the wait timed out, or
    /// the receive gate dropped the datagram; the caller's listening loop
    /// decides whether budget remains.
    pub fn recv_callback(&self, deadline: Instant) -> io::Result<Option<Vec<u8>>> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(None);
        }
        self.socket.set_read_timeout(Some(remaining))?;
        let outcome = self.recv_one();
        // Restore the request/reply timeout for subsequent exchanges.
        self.socket.set_read_timeout(Some(self.timeout))?;
        outcome
    }

    fn recv_one(&self) -> io::Result<Option<Vec<u8>>> {
        let mut buf = [0u8; MAX_DATAGRAM_LEN];
        match self.socket.recv(&mut buf) {
            Ok(received) => {
                if !self.gate.permit_recv() {
                    trace!(len = received, "simulated receive loss, callback discarded");
                    return Ok(None);
                }
                Ok(Some(buf[..received].to_vec()))
            }
            Err(error) if is_timeout(&error) => Ok(None),
            Err(error) => Err(error),
        }
    }
}

fn is_timeout(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silent_peer() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind peer");
        let addr = socket.local_addr().expect("peer addr");
        (socket, addr)
    }

    #[test]
    fn connect_rejects_zero_timeout() {
        let (_peer, addr) = silent_peer();
        let error = ClientTransport::connect(addr, Duration::ZERO, LossGate::lossless())
            .expect_err("zero timeout must be rejected");
        assert_eq!(error.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn exchange_times_out_against_a_silent_peer() {
        let (_peer, addr) = silent_peer();
        let transport =
            ClientTransport::connect(addr, Duration::from_millis(50), LossGate::lossless())
                .expect("connect");
        let outcome = transport.exchange(b"ping").expect("exchange");
        assert_eq!(outcome, None);
    }

    #[test]
    fn send_loss_skips_the_socket_entirely() {
        let (peer, addr) = silent_peer();
        peer.set_read_timeout(Some(Duration::from_millis(50)))
            .expect("peer timeout");
        let transport =
            ClientTransport::connect(addr, Duration::from_millis(10), LossGate::new(0.0, 1.0))
                .expect("connect");
        assert_eq!(transport.exchange(b"ping").expect("exchange"), None);

        let mut buf = [0u8; 16];
        assert!(peer.recv_from(&mut buf).is_err(), "peer saw a datagram");
    }

    #[test]
    fn exchange_returns_the_reply_bytes() {
        let (peer, addr) = silent_peer();
        let transport =
            ClientTransport::connect(addr, Duration::from_millis(500), LossGate::lossless())
                .expect("connect");
        let echo = std::thread::spawn(move || {
            let mut buf = [0u8; 16];
            let (received, from) = peer.recv_from(&mut buf).expect("peer recv");
            peer.send_to(&buf[..received], from).expect("peer send");
        });
        let reply = transport.exchange(b"ping").expect("exchange");
        assert_eq!(reply.as_deref(), Some(&b"ping"[..]));
        echo.join().expect("echo thread");
    }

    #[test]
    fn receive_loss_discards_the_reply() {
        let (peer, addr) = silent_peer();
        let transport =
            ClientTransport::connect(addr, Duration::from_millis(500), LossGate::new(1.0, 0.0))
                .expect("connect");
        let echo = std::thread::spawn(move || {
            let mut buf = [0u8; 16];
            let (received, from) = peer.recv_from(&mut buf).expect("peer recv");
            peer.send_to(&buf[..received], from).expect("peer send");
        });
        assert_eq!(transport.exchange(b"ping").expect("exchange"), None);
        echo.join().expect("echo thread");
    }

    #[test]
    fn callback_wait_honours_an_elapsed_deadline() {
        let (_peer, addr) = silent_peer();
        let transport =
            ClientTransport::connect(addr, Duration::from_millis(50), LossGate::lossless())
                .expect("connect");
        let outcome = transport
            .recv_callback(Instant::now() - Duration::from_millis(1))
            .expect("recv_callback");
        assert_eq!(outcome, None);
    }

    #[test]
    fn callback_wait_receives_an_unsolicited_datagram() {
        let (peer, addr) = silent_peer();
        let transport =
            ClientTransport::connect(addr, Duration::from_millis(500), LossGate::lossless())
                .expect("connect");
        let client_port = transport.local_addr().expect("local addr").port();
        peer.send_to(b"callback", (Ipv4Addr::LOCALHOST, client_port))
            .expect("peer send");
        let outcome = transport
            .recv_callback(Instant::now() + Duration::from_millis(500))
            .expect("recv_callback");
        assert_eq!(outcome.as_deref(), Some(&b"callback"[..]));
    }
}
