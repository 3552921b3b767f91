#![forbid(unsafe_code, future_incompatible)]
#![deny(
    missing_docs,
    missing_debug_implementations,
    missing_copy_implementations,
    nonstandard_style,
    unused_qualifications,
    unused_import_braces,
    unused_extern_crates,
    trivial_casts,
    trivial_numeric_casts
)]
//! The core of an HTTP request pipeline: a fixed-window rate limiting engine
//! and a URL pattern router.
//!
//! This crate holds the synchronous state machines and data structures. The
//! companion `http-pipeline-tower` crate wraps them in Tower middleware.
//!
//! ## Rate limiting
//!
//! Clients are tracked per identity (usually an IP address). Every
//! [`SessionPolicy`] counts requests in fixed windows; a client that goes
//! over the limit of any policy is banned for that policy's ban duration.
//!
//! ```rust
//! use http_pipeline::{Clock, ManualClock, RateLimitOptions, SessionPolicy};
//! use std::time::Duration;
//!
//! let policy = SessionPolicy::new(2, Duration::from_secs(1), Duration::from_secs(5))?;
//! let cache = RateLimitOptions::default().with_policy(policy).build_cache();
//! let clock = ManualClock::new();
//!
//! assert!(!cache.touch("10.0.0.1", clock.now()));
//! assert!(!cache.touch("10.0.0.1", clock.now()));
//! assert!(cache.touch("10.0.0.1", clock.now()));
//! assert!(!cache.touch("10.0.0.2", clock.now()));
//! # Ok::<(), http_pipeline::InvalidPolicyError>(())
//! ```
//!
//! ## Routing
//!
//! Patterns are `/`-separated templates whose `:name` segments capture the
//! matching path segment. Registering two patterns that only differ in
//! capture names is an error.
//!
//! ```rust
//! use http_pipeline::RouteTable;
//!
//! let mut table = RouteTable::new();
//! table.insert("/users/:id", "user")?;
//! table.insert("/users/:id/orders", "orders")?;
//! assert!(table.insert("/users/:name", "dup").is_err());
//!
//! let found = table.lookup("/users/42/orders").unwrap();
//! assert_eq!(*found.handler, "orders");
//! assert_eq!(found.params.get("id"), Some("42"));
//! # Ok::<(), http_pipeline::AmbiguousPatternError>(())
//! ```

mod clock;
mod error;
pub mod pattern;
pub mod rate_limiting;
mod routes;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{
    AmbiguousPatternError, BoxError, IdentityErrorKind,
    IdentityResolutionError, InvalidPolicyError, Result,
};
pub use pattern::{validate_patterns, PathParams, Pattern, Segment};
pub use rate_limiting::{
    ClientCache, ClientEntry, IdentityConfig, RateLimitOptions, SessionPolicy,
    SessionTracker,
};
pub use routes::{Route, RouteMatch, RouteTable};

#[cfg(test)]
mod test;
