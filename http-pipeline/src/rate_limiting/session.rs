use std::time::Instant;

use super::SessionPolicy;

/// Throttling state of one [`SessionPolicy`] for one client identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTracker {
    policy: SessionPolicy,
    request_count: u64,
    window_start: Instant,
    banned_at: Option<Instant>,
}

impl SessionTracker {
    /// State after a client's first request.
    pub fn new(policy: SessionPolicy, now: Instant) -> Self {
        Self { policy, request_count: 1, window_start: now, banned_at: None }
    }

    /// State after one more request at `now`.
    ///
    /// A request past the limit bans the client until `ban_duration` after
    /// it. When the window expires, an over-limit window extends the ban from
    /// `now`; an in-limit window clears a ban that has already lapsed.
    #[must_use]
    pub fn advance(&self, now: Instant) -> Self {
        let mut next = *self;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed >= self.policy.session_duration() {
            if self.request_count > self.policy.max_requests() {
                next.banned_at = Some(now);
            } else if !self.is_banned(now) {
                next.banned_at = None;
            }
            next.window_start = now;
            next.request_count = 1;
        } else {
            next.request_count = self.request_count.saturating_add(1);
            if next.request_count > self.policy.max_requests() {
                next.banned_at = Some(now);
            }
        }
        next
    }

    /// Whether the ban recorded by this tracker is still in force at `now`.
    pub fn is_banned(&self, now: Instant) -> bool {
        self.banned_at.is_some_and(|at| {
            now.saturating_duration_since(at) < self.policy.ban_duration()
        })
    }

    /// The policy this tracker enforces.
    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    /// Requests seen in the current window, including rejected ones.
    pub fn request_count(&self) -> u64 {
        self.request_count
    }

    /// When the current window opened.
    pub fn window_start(&self) -> Instant {
        self.window_start
    }

    /// When the most recent violation happened, if one is on record.
    pub fn banned_at(&self) -> Option<Instant> {
        self.banned_at
    }
}
