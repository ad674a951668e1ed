//! Invocation semantics and the duplicate-filtering reply cache.

use std::str::FromStr;

use dashmap::DashMap;

use dgfs_protocol::Response;

/// Dispatch discipline for inbound requests, chosen once at daemon start.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InvocationSemantics {
    /// Every inbound datagram is dispatched; duplicates re-execute.
    ///
    /// Safe only when every operation is idempotent, which the write
    /// operations of this service are not. Offered as a demonstration.
    AtLeastOnce,
    /// Duplicate request identifiers are answered from the reply cache
    /// without re-dispatching.
    AtMostOnce,
}

impl InvocationSemantics {
    /// Canonical name used on the command line and in diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            InvocationSemantics::AtLeastOnce => "at-least-once",
            InvocationSemantics::AtMostOnce => "at-most-once",
        }
    }
}

impl FromStr for InvocationSemantics {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "at-least-once" => Ok(InvocationSemantics::AtLeastOnce),
            "at-most-once" => Ok(InvocationSemantics::AtMostOnce),
            other => Err(format!(
                "unknown invocation semantics `{other}` (expected `at-least-once` or `at-most-once`)"
            )),
        }
    }
}

/// Replies already computed, keyed by request identifier.
///
/// Entries live for the daemon process lifetime. Concurrent inserts for the
/// same identifier resolve last-writer-wins, which is sufficient because
/// both writers computed a reply for the same logical invocation.
#[derive(Debug, Default)]
pub struct ReplyCache {
    entries: DashMap<u64, Response>,
}

impl ReplyCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached reply for `request_id`, if one was stored.
    #[must_use]
    pub fn lookup(&self, request_id: u64) -> Option<Response> {
        self.entries
            .get(&request_id)
            .map(|entry| entry.value().clone())
    }

    /// Stores the reply computed for `request_id`.
    pub fn store(&self, request_id: u64, response: &Response) {
        self.entries.insert(request_id, response.clone());
    }

    /// Number of retained replies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether any reply has been retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dgfs_protocol::Status;

    #[test]
    fn semantics_parse_their_canonical_names() {
        assert_eq!(
            "at-least-once".parse::<InvocationSemantics>(),
            Ok(InvocationSemantics::AtLeastOnce)
        );
        assert_eq!(
            "at-most-once".parse::<InvocationSemantics>(),
            Ok(InvocationSemantics::AtMostOnce)
        );
        assert!("exactly-once".parse::<InvocationSemantics>().is_err());
    }

    #[test]
    fn name_round_trips_through_from_str() {
        for semantics in [
            InvocationSemantics::AtLeastOnce,
            InvocationSemantics::AtMostOnce,
        ] {
            assert_eq!(semantics.name().parse(), Ok(semantics));
        }
    }

    #[test]
    fn lookup_misses_before_store_and_hits_after() {
        let cache = ReplyCache::new();
        assert_eq!(cache.lookup(42), None);

        let response = Response::error(Status::ReadError, "gone");
        cache.store(42, &response);
        assert_eq!(cache.lookup(42), Some(response));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn store_overwrites_an_existing_entry() {
        let cache = ReplyCache::new();
        cache.store(7, &Response::error(Status::GeneralError, "first"));
        cache.store(7, &Response::error(Status::GeneralError, "second"));
        assert_eq!(cache.lookup(7).map(|r| r.message), Some("second".into()));
        assert_eq!(cache.len(), 1);
    }
}
