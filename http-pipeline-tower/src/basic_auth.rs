use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use http::header::{InvalidHeaderValue, AUTHORIZATION, WWW_AUTHENTICATE};
use http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use http_body::Body as HttpBody;
use sha2::{Digest, Sha256};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use subtle::ConstantTimeEq;
use tower::{Layer, Service};

use crate::responders::plain_text;
use crate::{BoxError, ResponseBody};

const LOG_TARGET: &str = "http_pipeline_tower::basic_auth";

struct Credentials {
    username: [u8; 32],
    password: [u8; 32],
    challenge: HeaderValue,
}

impl Credentials {
    fn verify(&self, headers: &HeaderMap) -> bool {
        let Some((username, password)) = presented_credentials(headers) else {
            return false;
        };
        let username = Sha256::digest(username.as_bytes());
        let password = Sha256::digest(password.as_bytes());
        // Both digests are compared before deciding.
        let matched = username.as_slice().ct_eq(&self.username[..])
            & password.as_slice().ct_eq(&self.password[..]);
        matched.into()
    }
}

fn presented_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_owned(), password.to_owned()))
}

/// A Tower layer requiring HTTP basic authentication.
///
/// `OPTIONS` requests pass through so CORS preflights keep working.
///
/// ```
/// use http_pipeline_tower::BasicAuthLayer;
///
/// let layer = BasicAuthLayer::new("admin", "hunter2", "backoffice")?;
/// # drop(layer);
/// # Ok::<(), http::header::InvalidHeaderValue>(())
/// ```
#[derive(Clone)]
pub struct BasicAuthLayer {
    credentials: Arc<Credentials>,
}

impl fmt::Debug for BasicAuthLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuthLayer")
            .field("challenge", &self.credentials.challenge)
            .finish_non_exhaustive()
    }
}

impl BasicAuthLayer {
    /// Accept `username` and `password`, challenging clients for `realm`.
    ///
    /// Fails when `realm` cannot be carried in a header value.
    pub fn new(
        username: &str,
        password: &str,
        realm: &str,
    ) -> Result<Self, InvalidHeaderValue> {
        let challenge = HeaderValue::from_str(&format!(
            "Basic realm=\"{realm}\", charset=\"UTF-8\""
        ))?;
        Ok(Self {
            credentials: Arc::new(Credentials {
                username: Sha256::digest(username.as_bytes()).into(),
                password: Sha256::digest(password.as_bytes()).into(),
                challenge,
            }),
        })
    }
}

impl<S> Layer<S> for BasicAuthLayer {
    type Service = BasicAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BasicAuthService { inner, credentials: self.credentials.clone() }
    }
}

/// Tower service rejecting requests without valid basic credentials.
#[derive(Clone)]
pub struct BasicAuthService<S> {
    inner: S,
    credentials: Arc<Credentials>,
}

impl<S: fmt::Debug> fmt::Debug for BasicAuthService<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuthService")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for BasicAuthService<S>
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
        if *req.method() == Method::OPTIONS
            || self.credentials.verify(req.headers())
        {
            let clone = self.inner.clone();
            let mut inner = std::mem::replace(&mut self.inner, clone);
            return Box::pin(async move {
                let res = inner.call(req).await.map_err(Into::into)?;
                Ok(res.map(ResponseBody::inner))
            });
        }
        log::debug!(
            target: LOG_TARGET,
            "Unauthorized {} {}",
            req.method(),
            req.uri().path()
        );
        let mut res = plain_text(StatusCode::UNAUTHORIZED, "Unauthorized");
        res.headers_mut()
            .insert(WWW_AUTHENTICATE, self.credentials.challenge.clone());
        Box::pin(async move { Ok(res.map(ResponseBody::local)) })
    }
}
