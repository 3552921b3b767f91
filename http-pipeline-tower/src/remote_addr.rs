use http::{Extensions, Request};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

type AddrSource =
    Arc<dyn Fn(&Extensions) -> Option<SocketAddr> + Send + Sync>;

/// Layer that stores the connection address as a [`SocketAddr`] request
/// extension, the last source consulted when resolving a client identity.
///
/// Servers record the peer address in their own extension types. With a
/// plain hyper accept loop, build the layer per connection from the accepted
/// address:
///
/// ```
/// use http_pipeline_tower::RemoteAddrLayer;
/// use std::net::SocketAddr;
///
/// let peer: SocketAddr = "192.0.2.7:4711".parse()?;
/// let layer = RemoteAddrLayer::new(peer);
/// # drop(layer);
/// # Ok::<(), std::net::AddrParseError>(())
/// ```
///
/// Behind axum's `into_make_service_with_connect_info`, read the address out
/// of `ConnectInfo<SocketAddr>` instead:
///
/// ```ignore
/// RemoteAddrLayer::from_extensions(|ext| {
///     ext.get::<ConnectInfo<SocketAddr>>().map(|info| info.0)
/// })
/// ```
///
/// A [`SocketAddr`] already present on the request is left alone.
#[derive(Clone)]
pub struct RemoteAddrLayer {
    source: AddrSource,
}

impl fmt::Debug for RemoteAddrLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteAddrLayer")
            .field("source", &"Fn(&Extensions) -> Option<SocketAddr>")
            .finish()
    }
}

impl RemoteAddrLayer {
    /// Tag every request with the same connection address.
    pub fn new(addr: SocketAddr) -> Self {
        Self::from_extensions(move |_| Some(addr))
    }

    /// Derive the address from whatever the server put in the extensions.
    pub fn from_extensions<F>(source: F) -> Self
    where
        F: Fn(&Extensions) -> Option<SocketAddr> + Send + Sync + 'static,
    {
        Self { source: Arc::new(source) }
    }
}

impl<S> Layer<S> for RemoteAddrLayer {
    type Service = RemoteAddrService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RemoteAddrService { inner, source: self.source.clone() }
    }
}

/// Tower service inserting the connection address, see [`RemoteAddrLayer`].
#[derive(Clone)]
pub struct RemoteAddrService<S> {
    inner: S,
    source: AddrSource,
}

impl<S: fmt::Debug> fmt::Debug for RemoteAddrService<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteAddrService")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl<S, ReqBody> Service<Request<ReqBody>> for RemoteAddrService<S>
where
    S: Service<Request<ReqBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(
        &mut self,
        cx: &mut Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        if req.extensions().get::<SocketAddr>().is_none() {
            if let Some(addr) = (self.source)(req.extensions()) {
                req.extensions_mut().insert(addr);
            }
        }
        self.inner.call(req)
    }
}
