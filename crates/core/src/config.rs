//! Client connection configuration.

use std::net::SocketAddr;
use std::time::Duration;

/// Receive timeout applied when the caller does not set one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Retry budget applied when the caller does not set one.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Freshness interval applied when the caller does not set one.
pub const DEFAULT_FRESHNESS: Duration = Duration::from_millis(5000);

/// Parameters for one client/daemon pairing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClientConfig {
    server: SocketAddr,
    timeout: Duration,
    max_retries: u32,
    freshness: Duration,
    send_prob: f64,
    recv_prob: f64,
}

impl ClientConfig {
    /// Starts a builder for a session against `server`.
    #[must_use]
    pub fn builder(server: SocketAddr) -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self {
                server,
                timeout: DEFAULT_TIMEOUT,
                max_retries: DEFAULT_MAX_RETRIES,
                freshness: DEFAULT_FRESHNESS,
                send_prob: 1.0,
                recv_prob: 1.0,
            },
        }
    }

    /// Daemon endpoint requests are sent to.
    #[must_use]
    pub const fn server(&self) -> SocketAddr {
        self.server
    }

    /// Receive timeout for each exchange round.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Maximum exchange rounds per logical invocation.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// How long a cached range answers reads without server contact.
    #[must_use]
    pub const fn freshness(&self) -> Duration {
        self.freshness
    }

    /// Probability that an outbound datagram is actually sent.
    #[must_use]
    pub const fn send_prob(&self) -> f64 {
        self.send_prob
    }

    /// Probability that an inbound datagram is actually kept.
    #[must_use]
    pub const fn recv_prob(&self) -> f64 {
        self.recv_prob
    }
}

/// Builder for [`ClientConfig`].
#[derive(Clone, Copy, Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Sets the per-round receive timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Sets the retry budget. A budget of zero still sends one round.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    /// Sets the cache freshness interval.
    #[must_use]
    pub const fn freshness(mut self, freshness: Duration) -> Self {
        self.config.freshness = freshness;
        self
    }

    /// Sets the simulated send-success probability.
    #[must_use]
    pub const fn send_prob(mut self, send_prob: f64) -> Self {
        self.config.send_prob = send_prob;
        self
    }

    /// Sets the simulated receive-success probability.
    #[must_use]
    pub const fn recv_prob(mut self, recv_prob: f64) -> Self {
        self.config.recv_prob = recv_prob;
        self
    }

    /// Finalises the configuration.
    #[must_use]
    pub fn build(self) -> ClientConfig {
        ClientConfig {
            max_retries: self.config.max_retries.max(1),
            ..self.config
        }
    }
}
