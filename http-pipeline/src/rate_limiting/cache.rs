use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::{ClientEntry, SessionPolicy};

const DEFAULT_LOG_TARGET: &str = "http_pipeline::rate_limiting";

/// Client identity to [`ClientEntry`] map behind a single lock.
///
/// [`touch`](ClientCache::touch) and [`groom`](ClientCache::groom) hold the
/// lock for their whole run, so request bookkeeping and eviction never
/// interleave.
#[derive(Debug)]
pub struct ClientCache {
    entries: Mutex<HashMap<String, ClientEntry>>,
    policies: Vec<SessionPolicy>,
    idle_threshold: Duration,
    log_target: Cow<'static, str>,
}

impl ClientCache {
    /// Create an empty cache applying `policies` to every client.
    pub fn new(policies: Vec<SessionPolicy>, idle_threshold: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            policies,
            idle_threshold,
            log_target: Cow::Borrowed(DEFAULT_LOG_TARGET),
        }
    }

    /// Log under `target` instead of the default target.
    pub fn with_log_target(mut self, target: impl Into<Cow<'static, str>>) -> Self {
        self.log_target = target.into();
        self
    }

    // A panic elsewhere must not switch rate limiting off for every client.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, ClientEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a request from `identity` at `now`.
    ///
    /// Returns whether the client is banned after this request.
    pub fn touch(&self, identity: &str, now: Instant) -> bool {
        let mut entries = self.lock();
        let banned = match entries.get_mut(identity) {
            Some(slot) => {
                *slot = slot.updated(now);
                slot.is_banned(now)
            }
            None => {
                log::debug!(target: &*self.log_target, "Tracking new client {identity}");
                let entry = ClientEntry::new(&self.policies, now);
                let banned = entry.is_banned(now);
                entries.insert(identity.to_owned(), entry);
                banned
            }
        };
        if banned {
            log::debug!(target: &*self.log_target, "Client {identity} is banned");
        }
        banned
    }

    /// Evict every entry idle for longer than the idle threshold.
    ///
    /// Returns the number of evicted entries.
    pub fn groom(&self, now: Instant) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|identity, entry| {
            let idle = entry.idle_for(now);
            if idle > self.idle_threshold {
                log::debug!(
                    target: &*self.log_target,
                    "Removing client cache entry for {identity}"
                );
                false
            } else {
                log::trace!(
                    target: &*self.log_target,
                    "Client cache entry for {identity} can be removed in {:?}",
                    self.idle_threshold - idle
                );
                true
            }
        });
        let removed = before - entries.len();
        if removed > 0 {
            log::debug!(
                target: &*self.log_target,
                "Removed {removed} entries (current length {})",
                entries.len()
            );
        }
        removed
    }

    /// A copy of the entry for `identity`.
    pub fn entry(&self, identity: &str) -> Option<ClientEntry> {
        self.lock().get(identity).cloned()
    }

    /// Number of tracked clients.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no client is tracked.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Policies applied to new clients.
    pub fn policies(&self) -> &[SessionPolicy] {
        &self.policies
    }

    /// How long an entry may go without a request before eviction.
    pub fn idle_threshold(&self) -> Duration {
        self.idle_threshold
    }
}
