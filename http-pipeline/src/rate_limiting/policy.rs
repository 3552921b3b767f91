use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::InvalidPolicyError;

/// One throttling rule: at most `max_requests` per `session_duration`
/// window, with offenders banned for `ban_duration`.
///
/// ```
/// use http_pipeline::SessionPolicy;
/// use std::time::Duration;
///
/// // A burst rule and a sustained-rate rule can govern the same client.
/// let burst = SessionPolicy::new(10, Duration::from_secs(1), Duration::from_secs(30))?;
/// let sustained = SessionPolicy::new(300, Duration::from_secs(60), Duration::from_secs(600))?;
/// assert!(burst.max_requests() < sustained.max_requests());
/// # Ok::<(), http_pipeline::InvalidPolicyError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSessionPolicy")]
pub struct SessionPolicy {
    max_requests: u64,
    session_duration: Duration,
    ban_duration: Duration,
}

impl SessionPolicy {
    /// Create a policy, rejecting zero values.
    pub fn new(
        max_requests: u64,
        session_duration: Duration,
        ban_duration: Duration,
    ) -> Result<Self, InvalidPolicyError> {
        if max_requests == 0 {
            return Err(InvalidPolicyError::ZeroMaxRequests);
        }
        if session_duration.is_zero() {
            return Err(InvalidPolicyError::ZeroSessionDuration);
        }
        if ban_duration.is_zero() {
            return Err(InvalidPolicyError::ZeroBanDuration);
        }
        Ok(Self { max_requests, session_duration, ban_duration })
    }

    /// Requests allowed per window.
    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    /// Length of one counting window.
    pub fn session_duration(&self) -> Duration {
        self.session_duration
    }

    /// How long a ban lasts after the latest violation.
    pub fn ban_duration(&self) -> Duration {
        self.ban_duration
    }
}

#[derive(Deserialize)]
struct RawSessionPolicy {
    max_requests: u64,
    session_duration: Duration,
    ban_duration: Duration,
}

impl TryFrom<RawSessionPolicy> for SessionPolicy {
    type Error = InvalidPolicyError;

    fn try_from(raw: RawSessionPolicy) -> Result<Self, Self::Error> {
        SessionPolicy::new(raw.max_requests, raw.session_duration, raw.ban_duration)
    }
}
