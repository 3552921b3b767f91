use bytes::Bytes;
use http::header::InvalidHeaderValue;
use http::{request, Request, Response};
use http_body::Body as HttpBody;
use http_body_util::{BodyExt, Full};
use http_pipeline::AmbiguousPatternError;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service, ServiceExt};

use crate::error::DuplicateSectionError;
use crate::responders::{self, NotFoundResponder};
use crate::{
    BasicAuthLayer, BoxError, Maintenance, PipelineBody, RateLimitLayer,
    RateLimiter, RouterBuilder,
};

const LOG_TARGET: &str = "http_pipeline_tower::application";

/// The composed middleware stack of one [`Section`].
pub type SectionService<ReqBody> =
    BoxCloneSyncService<Request<ReqBody>, Response<PipelineBody>, BoxError>;

fn boxed<S, ReqBody, B>(service: S) -> SectionService<ReqBody>
where
    S: Service<Request<ReqBody>, Response = Response<B>, Error = BoxError>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
    ReqBody: 'static,
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    BoxCloneSyncService::new(service.map_response(|res: Response<B>| {
        res.map(|body| body.map_err(|e| -> BoxError { e.into() }).boxed_unsync())
    }))
}

fn local_body(body: Full<Bytes>) -> PipelineBody {
    body.map_err(|never| -> BoxError { match never {} }).boxed_unsync()
}

/// Describes a [`Section`]: its root, routes and the middleware in front of
/// them.
///
/// ```
/// use bytes::Bytes;
/// use http::{Request, Response};
/// use http_body_util::Full;
/// use http_pipeline::{RateLimitOptions, SessionPolicy};
/// use http_pipeline_tower::{RateLimitLayer, SectionBuilder};
/// use std::time::Duration;
///
/// let handler = tower::service_fn(|_req: Request<Full<Bytes>>| async {
///     Ok::<_, std::convert::Infallible>(Response::new(Full::new(Bytes::from("ok"))))
/// });
/// let policy = SessionPolicy::new(10, Duration::from_secs(1), Duration::from_secs(30))?;
/// let section = SectionBuilder::new("/api/")
///     .route("/api/items/:id", handler)?
///     .basic_auth("admin", "hunter2", "api")?
///     .rate_limit(RateLimitLayer::new(RateLimitOptions::default().with_policy(policy)))
///     .build();
/// assert_eq!(section.root(), "/api/");
/// # Ok::<(), http_pipeline_tower::BoxError>(())
/// ```
pub struct SectionBuilder<ReqBody, ResBody> {
    root: String,
    router: RouterBuilder<ReqBody, ResBody>,
    basic_auth: Option<BasicAuthLayer>,
    rate_limit: Option<RateLimitLayer>,
}

impl<ReqBody, ResBody> fmt::Debug for SectionBuilder<ReqBody, ResBody> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SectionBuilder")
            .field("root", &self.root)
            .field("router", &self.router)
            .field("basic_auth", &self.basic_auth)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

impl<ReqBody, ResBody> SectionBuilder<ReqBody, ResBody>
where
    ReqBody: Send + 'static,
    ResBody: HttpBody<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError>,
{
    /// Start a section serving `root`.
    ///
    /// A root ending in `/` serves every path below it, any other root only
    /// serves itself.
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            router: RouterBuilder::default(),
            basic_auth: None,
            rate_limit: None,
        }
    }

    /// Bind `service` to `pattern`. Patterns match the full request path.
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
        self.router = self.router.route(pattern, service)?;
        Ok(self)
    }

    /// Replace the response for paths no route of this section matches.
    pub fn not_found<F>(mut self, responder: F) -> Self
    where
        F: Fn(&request::Parts) -> Response<Full<Bytes>> + Send + Sync + 'static,
    {
        self.router = self.router.not_found(responder);
        self
    }

    /// Require basic authentication. Ignored unless all three values are
    /// non-empty.
    pub fn basic_auth(
        mut self,
        username: &str,
        password: &str,
        realm: &str,
    ) -> Result<Self, InvalidHeaderValue> {
        if username.is_empty() || password.is_empty() || realm.is_empty() {
            log::debug!(
                target: LOG_TARGET,
                "Incomplete credentials, {} is served without authentication",
                self.root
            );
            self.basic_auth = None;
        } else {
            self.basic_auth = Some(BasicAuthLayer::new(username, password, realm)?);
        }
        Ok(self)
    }

    /// Throttle clients with `layer`. Ignored when it has no policies.
    pub fn rate_limit(mut self, layer: RateLimitLayer) -> Self {
        self.rate_limit = Some(layer);
        self
    }

    /// Compose the section: rate limiting, then basic auth, then the router.
    pub fn build(self) -> Section<ReqBody> {
        let mut service = boxed(self.router.build());
        if let Some(auth) = self.basic_auth {
            service = boxed(auth.layer(service));
        }
        let mut limiter = None;
        if let Some(layer) =
            self.rate_limit.filter(|l| !l.limiter().cache().policies().is_empty())
        {
            limiter = Some(layer.limiter().clone());
            service = boxed(layer.layer(service));
        }
        log::debug!(
            target: LOG_TARGET,
            "Section {} built, rate limited: {}",
            self.root,
            limiter.is_some()
        );
        Section { root: self.root, service, limiter }
    }
}

/// A root path with its composed middleware stack.
pub struct Section<ReqBody> {
    root: String,
    service: SectionService<ReqBody>,
    limiter: Option<Arc<RateLimiter>>,
}

impl<ReqBody> fmt::Debug for Section<ReqBody> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Section")
            .field("root", &self.root)
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

impl<ReqBody> Section<ReqBody> {
    /// The root this section serves.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// The composed service.
    pub fn service(&self) -> &SectionService<ReqBody> {
        &self.service
    }

    /// The rate limiter, when the section is rate limited.
    pub fn limiter(&self) -> Option<&Arc<RateLimiter>> {
        self.limiter.as_ref()
    }
}

pub(crate) fn root_matches(root: &str, path: &str) -> bool {
    if root.ends_with('/') {
        path.starts_with(root)
    } else {
        path == root
    }
}

/// A set of sections served together.
///
/// ```
/// use bytes::Bytes;
/// use http::{Request, Response};
/// use http_body_util::Full;
/// use http_pipeline_tower::{Application, SectionBuilder};
///
/// let handler = tower::service_fn(|_req: Request<Full<Bytes>>| async {
///     Ok::<_, std::convert::Infallible>(Response::new(Full::new(Bytes::from("ok"))))
/// });
/// let mut app = Application::new();
/// app.add_section(SectionBuilder::new("/").route("/", handler.clone())?.build())?;
/// assert!(app.add_section(SectionBuilder::new("/").route("/", handler)?.build()).is_err());
/// # Ok::<(), http_pipeline_tower::BoxError>(())
/// ```
pub struct Application<ReqBody> {
    sections: Vec<Section<ReqBody>>,
    not_found: NotFoundResponder,
}

impl<ReqBody> fmt::Debug for Application<ReqBody> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("sections", &self.sections)
            .finish_non_exhaustive()
    }
}

impl<ReqBody> Default for Application<ReqBody> {
    fn default() -> Self {
        Self { sections: Vec::new(), not_found: responders::not_found() }
    }
}

impl<ReqBody> Application<ReqBody> {
    /// An application without sections.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a section. Fails when another section has the same root.
    pub fn add_section(
        &mut self,
        section: Section<ReqBody>,
    ) -> Result<(), DuplicateSectionError> {
        if self.sections.iter().any(|s| s.root == section.root) {
            log::warn!(target: LOG_TARGET, "Duplicate section {}", section.root);
            return Err(DuplicateSectionError { root: section.root });
        }
        self.sections.push(section);
        Ok(())
    }

    /// Replace the response for paths outside every section.
    pub fn with_not_found<F>(mut self, responder: F) -> Self
    where
        F: Fn(&request::Parts) -> Response<Full<Bytes>> + Send + Sync + 'static,
    {
        self.not_found = Arc::new(responder);
        self
    }

    /// The registered sections.
    pub fn sections(&self) -> &[Section<ReqBody>] {
        &self.sections
    }

    /// Spawn the maintenance task of every rate limited section. Must be
    /// called from within a tokio runtime.
    pub fn start(&self) -> RunningApplication {
        let tasks = self
            .sections
            .iter()
            .filter_map(Section::limiter)
            .map(|limiter| Maintenance::start(limiter.clone()))
            .collect::<Vec<_>>();
        log::debug!(
            target: LOG_TARGET,
            "Started {} maintenance task(s) for {} section(s)",
            tasks.len(),
            self.sections.len()
        );
        RunningApplication { tasks }
    }

    /// A service dispatching each request to the section with the longest
    /// root serving its path.
    pub fn service(&self) -> ApplicationService<ReqBody> {
        let mut sections = self
            .sections
            .iter()
            .map(|s| (s.root.clone(), s.service.clone()))
            .collect::<Vec<_>>();
        sections.sort_by(|(l, _), (r, _)| r.len().cmp(&l.len()));
        ApplicationService {
            sections: sections.into(),
            not_found: self.not_found.clone(),
        }
    }
}

/// Maintenance tasks of a started [`Application`].
#[derive(Debug)]
pub struct RunningApplication {
    tasks: Vec<Maintenance>,
}

impl RunningApplication {
    /// How many maintenance tasks were started.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no section is rate limited.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Stop every maintenance task and wait for all of them to exit.
    pub async fn shutdown(self) {
        for task in self.tasks.into_iter().rev() {
            task.shutdown().await;
        }
        log::debug!(target: LOG_TARGET, "Application stopped");
    }
}

/// Tower service routing requests to the sections of an [`Application`].
pub struct ApplicationService<ReqBody> {
    sections: Arc<[(String, SectionService<ReqBody>)]>,
    not_found: NotFoundResponder,
}

impl<ReqBody> Clone for ApplicationService<ReqBody> {
    fn clone(&self) -> Self {
        Self {
            sections: self.sections.clone(),
            not_found: self.not_found.clone(),
        }
    }
}

impl<ReqBody> fmt::Debug for ApplicationService<ReqBody> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationService")
            .field(
                "roots",
                &self.sections.iter().map(|(root, _)| root).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl<ReqBody> Service<Request<ReqBody>> for ApplicationService<ReqBody>
where
    ReqBody: Send + 'static,
{
    type Response = Response<PipelineBody>;
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
        let path = req.uri().path();
        let section =
            self.sections.iter().find(|(root, _)| root_matches(root, path));
        if let Some((_, service)) = section {
            return Box::pin(service.clone().oneshot(req));
        }
        let (parts, _) = req.into_parts();
        log::debug!(target: LOG_TARGET, "No section serves {}", parts.uri.path());
        let res = (self.not_found)(&parts).map(local_body);
        Box::pin(async move { Ok(res) })
    }
}
