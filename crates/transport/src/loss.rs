//! Directional loss simulation.

use rand::Rng;

/// Per-direction delivery probabilities for one endpoint.
///
/// `send_prob` and `recv_prob` are success probabilities: a datagram is
/// carried with that probability and silently dropped otherwise. Values are
/// clamped into `[0, 1]`; the extremes behave deterministically.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LossGate {
    send_prob: f64,
    recv_prob: f64,
}

impl LossGate {
    /// Builds a gate from per-direction success probabilities, clamping each
    /// into `[0, 1]`.
    #[must_use]
    pub fn new(send_prob: f64, recv_prob: f64) -> Self {
        Self {
            send_prob: send_prob.clamp(0.0, 1.0),
            recv_prob: recv_prob.clamp(0.0, 1.0),
        }
    }

    /// Gate that never drops in either direction.
    #[must_use]
    pub const fn lossless() -> Self {
        Self {
            send_prob: 1.0,
            recv_prob: 1.0,
        }
    }

    /// Samples the send direction. `true` means the datagram is carried.
    #[must_use]
    pub fn permit_send(&self) -> bool {
        Self::sample(self.send_prob)
    }

    /// Samples the receive direction. `true` means the datagram is kept.
    #[must_use]
    pub fn permit_recv(&self) -> bool {
        Self::sample(self.recv_prob)
    }

    fn sample(prob: f64) -> bool {
        if prob >= 1.0 {
            true
        } else if prob <= 0.0 {
            false
        } else {
            rand::thread_rng().r#gen::<f64>() < prob
        }
    }
}

impl Default for LossGate {
    fn default() -> Self {
        Self::lossless()
    }
}
