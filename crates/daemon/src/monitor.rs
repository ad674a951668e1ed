//! Path subscription registry and callback delivery.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, trace};

use dgfs_protocol::{Opcode, Response, Status, wire};
use dgfs_transport::CallbackSink;

/// One client's registered interest in a path.
#[derive(Clone, Debug)]
struct Subscription {
    endpoint: SocketAddr,
    registered_at: Instant,
    duration: Duration,
}

impl Subscription {
    fn expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.registered_at) > self.duration
    }
}

/// Subscriptions keyed by path, scanned and pruned on every mutation.
///
/// Expiry is lazy: an entry outlives its duration until the next delivery
/// scan touches its path. Delivery is best-effort with no acknowledgment;
/// the send happens outside the map guard so a slow socket never blocks
/// concurrent registrations.
#[derive(Debug, Default)]
pub struct MonitorRegistry {
    registrations: DashMap<String, Vec<Subscription>>,
}

impl MonitorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `endpoint` for callbacks on `path` for `duration`.
    pub fn register(&self, path: &str, endpoint: SocketAddr, duration: Duration) {
        self.register_at(path, endpoint, duration, Instant::now());
    }

    /// Registers with an explicit start instant; tests drive expiry with it.
    pub fn register_at(
        &self,
        path: &str,
        endpoint: SocketAddr,
        duration: Duration,
        registered_at: Instant,
    ) {
        debug!(path, %endpoint, duration_ms = duration.as_millis() as u64, "monitor registered");
        self.registrations
            .entry(path.to_string())
            .or_default()
            .push(Subscription {
                endpoint,
                registered_at,
                duration,
            });
    }

    /// Delivers a callback for a mutation of `path` to every live
    /// subscriber, pruning expired entries. Returns the number of endpoints
    /// the callback was handed to the sink for.
    pub fn notify(
        &self,
        path: &str,
        content: &[u8],
        modified_ms: i64,
        op: Opcode,
        sink: &dyn CallbackSink,
    ) -> usize {
        let targets = self.collect_live_targets(path);
        if targets.is_empty() {
            return 0;
        }

        let callback = Response::new(
            Status::Callback,
            content.to_vec(),
            format!("file updated by {}: {path}", op.name()),
            modified_ms,
        );
        let datagram = wire::encode_response(&callback);
        let mut delivered = 0;
        for endpoint in targets {
            match sink.deliver(endpoint, &datagram) {
                Ok(()) => {
                    trace!(path, %endpoint, "callback delivered");
                    delivered += 1;
                }
                Err(error) => debug!(path, %endpoint, %error, "callback delivery failed"),
            }
        }
        delivered
    }

    /// Live subscriber count for `path`, after pruning.
    #[must_use]
    pub fn subscriber_count(&self, path: &str) -> usize {
        self.collect_live_targets(path).len()
    }

    fn collect_live_targets(&self, path: &str) -> Vec<SocketAddr> {
        let now = Instant::now();
        let targets = {
            let Some(mut entry) = self.registrations.get_mut(path) else {
                return Vec::new();
            };
            entry.retain(|subscription| {
                let expired = subscription.expired_at(now);
                if expired {
                    debug!(path, endpoint = %subscription.endpoint, "monitor expired");
                }
                !expired
            });
            entry
                .iter()
                .map(|subscription| subscription.endpoint)
                .collect()
        };
        self.registrations.remove_if(path, |_, list| list.is_empty());
        targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Mutex;

    /// Records delivered datagrams instead of touching a socket.
    #[derive(Default)]
    struct RecordingSink {
        delivered: Mutex<Vec<(SocketAddr, Vec<u8>)>>,
    }

    impl RecordingSink {
        fn deliveries(&self) -> Vec<(SocketAddr, Vec<u8>)> {
            self.delivered
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .clone()
        }
    }

    impl CallbackSink for RecordingSink {
        fn deliver(&self, peer: SocketAddr, datagram: &[u8]) -> io::Result<()> {
            self.delivered
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push((peer, datagram.to_vec()));
            Ok(())
        }
    }

    fn endpoint(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn live_subscribers_receive_an_encoded_callback() {
        let registry = MonitorRegistry::new();
        let sink = RecordingSink::default();
        registry.register("/x", endpoint(4001), Duration::from_secs(10));

        let delivered = registry.notify("/x", b"new content", 1234, Opcode::WriteInsert, &sink);
        assert_eq!(delivered, 1);

        let deliveries = sink.deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].0, endpoint(4001));

        let callback = wire::decode_response(&deliveries[0].1).expect("decodable callback");
        assert_eq!(callback.status, Status::Callback);
        assert_eq!(callback.payload, b"new content");
        assert_eq!(callback.server_modified_ms, 1234);
        assert!(callback.message.contains("/x"));
    }

    #[test]
    fn every_subscriber_of_the_path_is_notified() {
        let registry = MonitorRegistry::new();
        let sink = RecordingSink::default();
        registry.register("/x", endpoint(4001), Duration::from_secs(10));
        registry.register("/x", endpoint(4002), Duration::from_secs(10));
        registry.register("/other", endpoint(4003), Duration::from_secs(10));

        let delivered = registry.notify("/x", b"c", 1, Opcode::WriteDelete, &sink);
        assert_eq!(delivered, 2);
        let peers: Vec<SocketAddr> = sink.deliveries().iter().map(|(peer, _)| *peer).collect();
        assert_eq!(peers, [endpoint(4001), endpoint(4002)]);
    }

    #[test]
    fn expired_subscriptions_never_receive_callbacks() {
        let registry = MonitorRegistry::new();
        let sink = RecordingSink::default();
        let stale_start = Instant::now() - Duration::from_millis(50);
        registry.register_at("/x", endpoint(4001), Duration::from_millis(10), stale_start);

        let delivered = registry.notify("/x", b"c", 1, Opcode::WriteInsert, &sink);
        assert_eq!(delivered, 0);
        assert!(sink.deliveries().is_empty());
    }

    #[test]
    fn expiry_prunes_the_path_entry() {
        let registry = MonitorRegistry::new();
        let stale_start = Instant::now() - Duration::from_secs(60);
        registry.register_at("/x", endpoint(4001), Duration::from_secs(1), stale_start);

        assert_eq!(registry.subscriber_count("/x"), 0);
        assert!(registry.registrations.get("/x").is_none());
    }

    #[test]
    fn a_subscription_within_its_window_survives_pruning() {
        let registry = MonitorRegistry::new();
        registry.register("/x", endpoint(4001), Duration::from_secs(600));
        assert_eq!(registry.subscriber_count("/x"), 1);
        assert_eq!(registry.subscriber_count("/x"), 1);
    }

    #[test]
    fn notify_for_an_unwatched_path_is_a_no_op() {
        let registry = MonitorRegistry::new();
        let sink = RecordingSink::default();
        assert_eq!(registry.notify("/nobody", b"c", 1, Opcode::WriteInsert, &sink), 0);
    }
}
