//! Responses generated by the middleware itself.
//!
//! Each responder is a shared closure and can be swapped per layer:
//!
//! ```
//! use bytes::Bytes;
//! use http::{Response, StatusCode};
//! use http_body_util::Full;
//! use http_pipeline_tower::RateLimitLayer;
//!
//! let layer = RateLimitLayer::new(Default::default()).with_too_many_requests(
//!     |_parts: &http::request::Parts, identity: &str| {
//!         let mut res = Response::new(Full::new(Bytes::from(format!("slow down, {identity}"))));
//!         *res.status_mut() = StatusCode::TOO_MANY_REQUESTS;
//!         res
//!     },
//! );
//! # drop(layer);
//! ```

use bytes::Bytes;
use http::{header::CONTENT_TYPE, request, HeaderValue, Response, StatusCode};
use http_body_util::Full;
use http_pipeline::IdentityResolutionError;
use std::sync::Arc;

/// Builds the response for a request without a usable client identity.
pub type BadRequestResponder = Arc<
    dyn Fn(&request::Parts, &IdentityResolutionError) -> Response<Full<Bytes>>
        + Send
        + Sync,
>;

/// Builds the response for a banned client. Receives the client identity.
pub type TooManyRequestsResponder =
    Arc<dyn Fn(&request::Parts, &str) -> Response<Full<Bytes>> + Send + Sync>;

/// Builds the response for a path no route matches.
pub type NotFoundResponder =
    Arc<dyn Fn(&request::Parts) -> Response<Full<Bytes>> + Send + Sync>;

/// A `text/plain` response carrying `text`.
pub fn plain_text(status: StatusCode, text: &'static str) -> Response<Full<Bytes>> {
    let mut res = Response::new(Full::new(Bytes::from_static(text.as_bytes())));
    *res.status_mut() = status;
    res.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    res
}

/// Replies `400 Bad Request`.
pub fn bad_request() -> BadRequestResponder {
    Arc::new(|_, _| plain_text(StatusCode::BAD_REQUEST, "Bad Request"))
}

/// Replies `429 Too Many Requests`.
pub fn too_many_requests() -> TooManyRequestsResponder {
    Arc::new(|_, _| plain_text(StatusCode::TOO_MANY_REQUESTS, "Too Many Requests"))
}

/// Replies `404 Not Found`.
pub fn not_found() -> NotFoundResponder {
    Arc::new(|_| plain_text(StatusCode::NOT_FOUND, "Not Found"))
}
