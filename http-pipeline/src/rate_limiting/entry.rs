use std::time::{Duration, Instant};

use super::{SessionPolicy, SessionTracker};

/// Every session tracker for one client identity.
///
/// Entries are values: each request derives a new entry from the previous
/// one through [`ClientEntry::updated`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientEntry {
    sessions: Vec<SessionTracker>,
    last_updated: Instant,
}

impl ClientEntry {
    /// Entry for a client's first request, one tracker per policy.
    pub fn new(policies: &[SessionPolicy], now: Instant) -> Self {
        Self {
            sessions: policies
                .iter()
                .map(|policy| SessionTracker::new(*policy, now))
                .collect(),
            last_updated: now,
        }
    }

    /// Entry after one more request at `now`.
    #[must_use]
    pub fn updated(&self, now: Instant) -> Self {
        Self {
            sessions: self.sessions.iter().map(|s| s.advance(now)).collect(),
            last_updated: now,
        }
    }

    /// Whether any tracker holds an active ban.
    pub fn is_banned(&self, now: Instant) -> bool {
        self.sessions.iter().any(|s| s.is_banned(now))
    }

    /// Trackers in policy order.
    pub fn sessions(&self) -> &[SessionTracker] {
        &self.sessions
    }

    /// Time of the latest request.
    pub fn last_updated(&self) -> Instant {
        self.last_updated
    }

    /// How long the entry has gone without a request.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_updated)
    }
}
