use bytes::Bytes;
use http::{request, Request, Response};
use http_body::Body as HttpBody;
use http_body_util::Full;
use http_pipeline::{
    ClientCache, Clock, IdentityConfig, IdentityResolutionError,
    RateLimitOptions, SystemClock,
};
use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::{Layer, Service};

use crate::maintenance::Maintenance;
use crate::responders::{
    self, BadRequestResponder, TooManyRequestsResponder,
};
use crate::{BoxError, ResponseBody};

const DEFAULT_LOG_TARGET: &str = "http_pipeline_tower::rate_limit";

/// Outcome of checking one request against the rate limiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The client is within its limits.
    Forward {
        /// Resolved client identity.
        identity: String,
    },
    /// The client is banned.
    Throttle {
        /// Resolved client identity.
        identity: String,
    },
    /// No identity could be determined.
    BadRequest(IdentityResolutionError),
}

/// The rate limiting state shared by every clone of a [`RateLimitService`]
/// and by its [`Maintenance`] task.
#[derive(Debug)]
pub struct RateLimiter {
    cache: ClientCache,
    identity: IdentityConfig,
    groom_interval: Duration,
    clock: Arc<dyn Clock>,
    log_target: Cow<'static, str>,
}

impl RateLimiter {
    /// Create a rate limiter running on the system clock.
    pub fn new(options: RateLimitOptions) -> Self {
        Self {
            cache: options
                .build_cache()
                .with_log_target(Cow::Borrowed(DEFAULT_LOG_TARGET)),
            identity: options.identity,
            groom_interval: options.groom_interval,
            clock: Arc::new(SystemClock),
            log_target: Cow::Borrowed(DEFAULT_LOG_TARGET),
        }
    }

    /// Read the time from `clock` instead of the system clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Log under `target` instead of the default target.
    pub fn with_log_target(
        mut self,
        target: impl Into<Cow<'static, str>>,
    ) -> Self {
        let target = target.into();
        self.cache = self.cache.with_log_target(target.clone());
        self.log_target = target;
        self
    }

    /// Resolve the client identity of a request and record the request.
    pub fn check(&self, parts: &request::Parts) -> Verdict {
        let identity = match self.identity.resolve_parts(parts) {
            Ok(identity) => identity,
            Err(e) => {
                log::debug!(
                    target: &*self.log_target,
                    "Rejecting {} {}: {e}",
                    parts.method,
                    parts.uri.path()
                );
                return Verdict::BadRequest(e);
            }
        };
        if self.cache.touch(&identity, self.clock.now()) {
            log::debug!(
                target: &*self.log_target,
                "Client {identity} is banned, throttling {} {}",
                parts.method,
                parts.uri.path()
            );
            Verdict::Throttle { identity }
        } else {
            Verdict::Forward { identity }
        }
    }

    /// Evict idle clients now. Returns how many were removed.
    pub fn groom(&self) -> usize {
        self.cache.groom(self.clock.now())
    }

    /// The client cache.
    pub fn cache(&self) -> &ClientCache {
        &self.cache
    }

    /// The clock requests are timed with.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// How often [`Maintenance`] grooms the cache.
    pub fn groom_interval(&self) -> Duration {
        self.groom_interval
    }

    pub(crate) fn log_target(&self) -> &str {
        &self.log_target
    }
}

/// A Tower layer that throttles clients exceeding their session policies.
///
/// Clones share one client cache. The cache only shrinks while a
/// [`Maintenance`] task from [`RateLimitLayer::start_maintenance`] is
/// running.
///
/// ```
/// use http_pipeline::{RateLimitOptions, SessionPolicy};
/// use http_pipeline_tower::RateLimitLayer;
/// use std::time::Duration;
///
/// let options = RateLimitOptions::default()
///     .with_policy(SessionPolicy::new(100, Duration::from_secs(60), Duration::from_secs(300))?);
/// let layer = RateLimitLayer::new(options);
/// assert_eq!(layer.limiter().cache().policies().len(), 1);
/// # Ok::<(), http_pipeline::InvalidPolicyError>(())
/// ```
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<RateLimiter>,
    bad_request: BadRequestResponder,
    too_many_requests: TooManyRequestsResponder,
}

impl fmt::Debug for RateLimitLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitLayer")
            .field("limiter", &self.limiter)
            .field("bad_request", &"Fn(&request::Parts, &IdentityResolutionError)")
            .field("too_many_requests", &"Fn(&request::Parts, &str)")
            .finish()
    }
}

impl RateLimitLayer {
    /// Create a layer with the default responders and the system clock.
    pub fn new(options: RateLimitOptions) -> Self {
        Self::from_limiter(RateLimiter::new(options))
    }

    /// Create a layer around a configured [`RateLimiter`].
    pub fn from_limiter(limiter: RateLimiter) -> Self {
        Self {
            limiter: Arc::new(limiter),
            bad_request: responders::bad_request(),
            too_many_requests: responders::too_many_requests(),
        }
    }

    /// Replace the response for requests without a client identity.
    pub fn with_bad_request<F>(mut self, responder: F) -> Self
    where
        F: Fn(&request::Parts, &IdentityResolutionError) -> Response<Full<Bytes>>
            + Send
            + Sync
            + 'static,
    {
        self.bad_request = Arc::new(responder);
        self
    }

    /// Replace the response for banned clients.
    pub fn with_too_many_requests<F>(mut self, responder: F) -> Self
    where
        F: Fn(&request::Parts, &str) -> Response<Full<Bytes>>
            + Send
            + Sync
            + 'static,
    {
        self.too_many_requests = Arc::new(responder);
        self
    }

    /// The shared limiter state.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Spawn the task evicting idle clients. Must be called from within a
    /// tokio runtime.
    pub fn start_maintenance(&self) -> Maintenance {
        Maintenance::start(self.limiter.clone())
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
            bad_request: self.bad_request.clone(),
            too_many_requests: self.too_many_requests.clone(),
        }
    }
}

/// Tower service that throttles clients exceeding their session policies.
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<RateLimiter>,
    bad_request: BadRequestResponder,
    too_many_requests: TooManyRequestsResponder,
}

impl<S: fmt::Debug> fmt::Debug for RateLimitService<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitService")
            .field("inner", &self.inner)
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

impl<S> RateLimitService<S> {
    /// The shared limiter state.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RateLimitService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>
        + Clone
        + Send
        + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: HttpBody<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError>,
{
    type Response = Response<ResponseBody<ResBody>>;
    type Error = BoxError;
    type Future = Pin<
        Box<
            dyn Future<Output = Result<Self::Response, Self::Error>>
                + Send,
        >,
    >;

    fn poll_ready(
        &mut self,
        cx: &mut Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let (parts, body) = req.into_parts();
        let res = match self.limiter.check(&parts) {
            Verdict::Forward { .. } => {
                // The ready service goes into the future, its clone stays.
                let clone = self.inner.clone();
                let mut inner = std::mem::replace(&mut self.inner, clone);
                let req = Request::from_parts(parts, body);
                return Box::pin(async move {
                    let res = inner.call(req).await.map_err(Into::into)?;
                    Ok(res.map(ResponseBody::inner))
                });
            }
            Verdict::Throttle { identity } => {
                (self.too_many_requests)(&parts, &identity)
            }
            Verdict::BadRequest(e) => (self.bad_request)(&parts, &e),
        };
        Box::pin(async move { Ok(res.map(ResponseBody::local)) })
    }
}
