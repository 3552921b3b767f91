use std::net::SocketAddr;

use http::{request, HeaderMap, HeaderValue, Request};
use serde::{Deserialize, Serialize};

use crate::error::IdentityResolutionError;

/// Header set by a trusted edge proxy to the original client address.
pub const DEFAULT_TRUSTED_PROXY_HEADER: &str = "fastly-client-ip";

/// Standard proxy chain header.
pub const DEFAULT_FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Where a client identity is read from.
///
/// In priority order: the trusted proxy header, the last hop of the
/// forwarded-for header, then the connection address stored as a
/// [`SocketAddr`] request extension. Setting a header name to `None` skips
/// that source.
///
/// hyper and axum keep the peer address in their own extension types
/// (axum's is `ConnectInfo<SocketAddr>`), so the bare [`SocketAddr`] has to
/// be inserted by the caller, for example with `RemoteAddrLayer` from
/// `http-pipeline-tower`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Single-valued header holding the client address.
    pub trusted_proxy_header: Option<String>,
    /// Comma-separated proxy chain header.
    pub forwarded_for_header: Option<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            trusted_proxy_header: Some(DEFAULT_TRUSTED_PROXY_HEADER.to_string()),
            forwarded_for_header: Some(DEFAULT_FORWARDED_FOR_HEADER.to_string()),
        }
    }
}

impl IdentityConfig {
    /// Resolve the identity of a request.
    pub fn resolve<B>(
        &self,
        req: &Request<B>,
    ) -> Result<String, IdentityResolutionError> {
        self.resolve_from(req.headers(), req.extensions().get::<SocketAddr>().copied())
    }

    /// Resolve the identity from request parts.
    pub fn resolve_parts(
        &self,
        parts: &request::Parts,
    ) -> Result<String, IdentityResolutionError> {
        self.resolve_from(&parts.headers, parts.extensions.get::<SocketAddr>().copied())
    }

    /// Resolve the identity from headers and an optional connection address.
    pub fn resolve_from(
        &self,
        headers: &HeaderMap,
        remote_addr: Option<SocketAddr>,
    ) -> Result<String, IdentityResolutionError> {
        if let Some(name) = &self.trusted_proxy_header {
            if let Some(value) = headers.get(name.as_str()) {
                let value = header_str(name, value)?;
                if !value.is_empty() {
                    return Ok(value.to_string());
                }
            }
        }
        if let Some(name) = &self.forwarded_for_header {
            if let Some(value) = headers.get_all(name.as_str()).iter().last() {
                // The last hop was appended by the proxy closest to us.
                let hop = header_str(name, value)?
                    .rsplit(',')
                    .next()
                    .map(str::trim)
                    .unwrap_or_default();
                if hop.is_empty() {
                    return Err(IdentityResolutionError::invalid_header(name.as_str()));
                }
                return Ok(hop.to_string());
            }
        }
        remote_addr
            .map(|addr| addr.ip().to_string())
            .ok_or_else(IdentityResolutionError::missing)
    }
}

fn header_str<'a>(
    name: &str,
    value: &'a HeaderValue,
) -> Result<&'a str, IdentityResolutionError> {
    value
        .to_str()
        .map(str::trim)
        .map_err(|_| IdentityResolutionError::invalid_header(name))
}
