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
//! Tower middleware for an HTTP request pipeline: per-client rate limiting,
//! basic authentication and pattern routing, grouped into sections of an
//! application.
//!
//! The state machines live in [`http_pipeline`]; this crate wires them into
//! [`tower::Layer`]s and [`tower::Service`]s.
//!
//! # Rate limiting
//!
//! ```rust
//! use bytes::Bytes;
//! use http::{Request, Response, StatusCode};
//! use http_body_util::Full;
//! use http_pipeline::{RateLimitOptions, SessionPolicy};
//! use http_pipeline_tower::RateLimitLayer;
//! use std::time::Duration;
//! use tower::{Layer, ServiceExt};
//!
//! # tokio_test::block_on(async {
//! let options = RateLimitOptions::default()
//!     .with_policy(SessionPolicy::new(1, Duration::from_secs(60), Duration::from_secs(60))?);
//! let layer = RateLimitLayer::new(options);
//! let service = layer.layer(tower::service_fn(|_req: Request<Full<Bytes>>| async {
//!     Ok::<_, std::convert::Infallible>(Response::new(Full::new(Bytes::from("hello"))))
//! }));
//!
//! let req = || Request::get("/").header("x-forwarded-for", "10.0.0.1").body(Full::default());
//! assert_eq!(service.clone().oneshot(req()?).await?.status(), StatusCode::OK);
//! assert_eq!(service.oneshot(req()?).await?.status(), StatusCode::TOO_MANY_REQUESTS);
//! # Ok::<(), http_pipeline_tower::BoxError>(())
//! # }).unwrap();
//! ```
//!
//! Clients are identified by proxy headers first, then by a
//! [`SocketAddr`](std::net::SocketAddr) request extension. Servers do not
//! insert that extension themselves; [`RemoteAddrLayer`] does.
//!
//! Evicting idle clients is the job of a [`Maintenance`] task started with
//! [`RateLimitLayer::start_maintenance`] or [`Application::start`].
//!
//! # Routing
//!
//! [`Router`] dispatches on `/`-separated patterns such as `/users/:id`.
//! Captured segments reach the handler as a
//! [`PathParams`](http_pipeline::PathParams) request extension.

mod application;
mod basic_auth;
mod body;
mod error;
mod maintenance;
mod rate_limit;
mod remote_addr;
pub mod responders;
mod router;

use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;

pub use application::{
    Application, ApplicationService, RunningApplication, Section,
    SectionBuilder, SectionService,
};
pub use basic_auth::{BasicAuthLayer, BasicAuthService};
pub use body::ResponseBody;
pub use error::DuplicateSectionError;
pub use http_pipeline::{BoxError, PathParams};
pub use maintenance::Maintenance;
pub use rate_limit::{RateLimitLayer, RateLimitService, RateLimiter, Verdict};
pub use remote_addr::{RemoteAddrLayer, RemoteAddrService};
pub use router::{RouteService, Router, RouterBuilder};

/// Body type of responses leaving a [`Section`] or an [`Application`].
pub type PipelineBody = UnsyncBoxBody<Bytes, BoxError>;
