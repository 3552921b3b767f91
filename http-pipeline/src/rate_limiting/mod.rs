//! Fixed-window rate limiting with ban escalation.
//!
//! Each client identity gets one [`SessionTracker`] per configured
//! [`SessionPolicy`], grouped in a [`ClientEntry`]. The [`ClientCache`]
//! replaces a client's entry on every request and evicts entries that sit
//! idle for too long.

mod cache;
mod entry;
mod identity;
mod policy;
mod session;

pub use cache::ClientCache;
pub use entry::ClientEntry;
pub use identity::{
    IdentityConfig, DEFAULT_FORWARDED_FOR_HEADER, DEFAULT_TRUSTED_PROXY_HEADER,
};
pub use policy::SessionPolicy;
pub use session::SessionTracker;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default time an entry may sit without requests before it is evicted.
pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_secs(20 * 60);

/// Default period of the eviction sweep.
pub const DEFAULT_GROOM_INTERVAL: Duration = Duration::from_secs(10);

/// Configuration options for rate limiting.
///
/// ```
/// use http_pipeline::{RateLimitOptions, SessionPolicy};
/// use std::time::Duration;
///
/// let options = RateLimitOptions {
///     idle_threshold: Duration::from_secs(300),
///     ..Default::default()
/// }
/// .with_policy(SessionPolicy::new(60, Duration::from_secs(60), Duration::from_secs(120))?);
/// assert_eq!(options.policies.len(), 1);
/// # Ok::<(), http_pipeline::InvalidPolicyError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitOptions {
    /// Every policy is applied to every client.
    pub policies: Vec<SessionPolicy>,
    /// How long an entry may go without a request before eviction.
    pub idle_threshold: Duration,
    /// How often the eviction sweep runs.
    pub groom_interval: Duration,
    /// Where client identities come from.
    pub identity: IdentityConfig,
}

impl Default for RateLimitOptions {
    fn default() -> Self {
        Self {
            policies: Vec::new(),
            idle_threshold: DEFAULT_IDLE_THRESHOLD,
            groom_interval: DEFAULT_GROOM_INTERVAL,
            identity: IdentityConfig::default(),
        }
    }
}

impl RateLimitOptions {
    /// Add a policy.
    pub fn with_policy(mut self, policy: SessionPolicy) -> Self {
        self.policies.push(policy);
        self
    }

    /// Build the client cache these options describe.
    pub fn build_cache(&self) -> ClientCache {
        ClientCache::new(self.policies.clone(), self.idle_threshold)
    }
}
