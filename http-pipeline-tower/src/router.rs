use bytes::Bytes;
use http::{request, Request, Response};
use http_body::Body as HttpBody;
use http_body_util::Full;
use http_pipeline::{AmbiguousPatternError, RouteTable};
use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::util::BoxCloneSyncService;
use tower::{Service, ServiceExt};

use crate::responders::{self, NotFoundResponder};
use crate::{BoxError, ResponseBody};

const DEFAULT_LOG_TARGET: &str = "http_pipeline_tower::router";

/// A boxed handler service bound to a route.
pub type RouteService<ReqBody, ResBody> =
    BoxCloneSyncService<Request<ReqBody>, Response<ResBody>, BoxError>;

/// Collects routes before they are frozen into a [`Router`].
///
/// ```
/// use bytes::Bytes;
/// use http::{Request, Response};
/// use http_body_util::Full;
/// use http_pipeline_tower::Router;
///
/// let hello = tower::service_fn(|_req: Request<Full<Bytes>>| async {
///     Ok::<_, std::convert::Infallible>(Response::new(Full::new(Bytes::from("hello"))))
/// });
/// let router = Router::builder()
///     .route("/hello/:name", hello.clone())?
///     .route("/hello", hello)?
///     .build();
/// assert_eq!(router.routes().len(), 2);
/// # Ok::<(), http_pipeline::AmbiguousPatternError>(())
/// ```
pub struct RouterBuilder<ReqBody, ResBody> {
    table: RouteTable<RouteService<ReqBody, ResBody>>,
    not_found: NotFoundResponder,
}

impl<ReqBody, ResBody> fmt::Debug for RouterBuilder<ReqBody, ResBody> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterBuilder")
            .field("routes", &self.table.len())
            .finish_non_exhaustive()
    }
}

impl<ReqBody, ResBody> Default for RouterBuilder<ReqBody, ResBody> {
    fn default() -> Self {
        Self {
            table: RouteTable::new()
                .with_log_target(Cow::Borrowed(DEFAULT_LOG_TARGET)),
            not_found: responders::not_found(),
        }
    }
}

impl<ReqBody, ResBody> RouterBuilder<ReqBody, ResBody>
where
    ReqBody: 'static,
    ResBody: 'static,
{
    /// Bind `service` to `pattern`.
    ///
    /// Fails when `pattern` differs from a registered pattern only in the
    /// names of its captures. The builder is consumed either way.
    pub fn route<S>(
        mut self,
        pattern: &str,
        service: S,
    ) -> Result<Self, AmbiguousPatternError>
    where
        S: Service<Request<ReqBody>, Response = Response<ResBody>>
            + Clone
            + Send
            + Sync
            + 'static,
        S::Error: Into<BoxError>,
        S::Future: Send + 'static,
    {
        let service: RouteService<ReqBody, ResBody> =
            BoxCloneSyncService::new(service.map_err(Into::into));
        self.table.insert(pattern, service)?;
        Ok(self)
    }

    /// Replace the response for unmatched paths.
    pub fn not_found<F>(mut self, responder: F) -> Self
    where
        F: Fn(&request::Parts) -> Response<Full<Bytes>> + Send + Sync + 'static,
    {
        self.not_found = Arc::new(responder);
        self
    }

    /// Log under `target` instead of the default target.
    pub fn with_log_target(
        mut self,
        target: impl Into<Cow<'static, str>>,
    ) -> Self {
        self.table = self.table.with_log_target(target);
        self
    }

    /// Freeze the route table.
    pub fn build(self) -> Router<ReqBody, ResBody> {
        Router { table: Arc::new(self.table), not_found: self.not_found }
    }
}

/// A Tower service dispatching requests to the handler whose pattern matches
/// the request path.
///
/// Captured segments are inserted into the request extensions as
/// [`PathParams`](http_pipeline::PathParams).
pub struct Router<ReqBody, ResBody> {
    table: Arc<RouteTable<RouteService<ReqBody, ResBody>>>,
    not_found: NotFoundResponder,
}

impl<ReqBody, ResBody> Clone for Router<ReqBody, ResBody> {
    fn clone(&self) -> Self {
        Self { table: self.table.clone(), not_found: self.not_found.clone() }
    }
}

impl<ReqBody, ResBody> fmt::Debug for Router<ReqBody, ResBody> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field(
                "routes",
                &self
                    .table
                    .routes()
                    .iter()
                    .map(|route| route.pattern().as_str())
                    .collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl<ReqBody, ResBody> Router<ReqBody, ResBody>
where
    ReqBody: 'static,
    ResBody: 'static,
{
    /// Start collecting routes.
    pub fn builder() -> RouterBuilder<ReqBody, ResBody> {
        RouterBuilder::default()
    }
}

impl<ReqBody, ResBody> Router<ReqBody, ResBody> {
    /// The registered routes in lookup order.
    pub fn routes(&self) -> &[http_pipeline::Route<RouteService<ReqBody, ResBody>>] {
        self.table.routes()
    }
}

impl<ReqBody, ResBody> Service<Request<ReqBody>> for Router<ReqBody, ResBody>
where
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
        _cx: &mut Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let (mut parts, body) = req.into_parts();
        match self.table.lookup(parts.uri.path()) {
            Some(found) => {
                let handler = found.handler.clone();
                parts.extensions.insert(found.params);
                let req = Request::from_parts(parts, body);
                Box::pin(async move {
                    let res = handler.oneshot(req).await?;
                    Ok(res.map(ResponseBody::inner))
                })
            }
            None => {
                let res = (self.not_found)(&parts);
                Box::pin(async move { Ok(res.map(ResponseBody::local)) })
            }
        }
    }
}
