use std::fmt;

/// Generic error type for the pipeline middleware.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A `Result` typedef to use with the [`BoxError`] type
pub type Result<T> = std::result::Result<T, BoxError>;

/// Why a client identity could not be derived from a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityErrorKind {
    /// No identity header and no connection address were available.
    Missing,
    /// The named header was present but its value could not be used.
    InvalidHeader(String),
}

/// Error type for requests that carry no usable client identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityResolutionError {
    kind: IdentityErrorKind,
}

impl IdentityResolutionError {
    /// No header or connection address carried an identity.
    pub fn missing() -> Self {
        Self { kind: IdentityErrorKind::Missing }
    }

    /// The header `name` held an empty or non-visible-ASCII value.
    pub fn invalid_header(name: impl Into<String>) -> Self {
        Self { kind: IdentityErrorKind::InvalidHeader(name.into()) }
    }

    /// Get the error kind
    pub fn kind(&self) -> &IdentityErrorKind {
        &self.kind
    }
}

impl fmt::Display for IdentityResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            IdentityErrorKind::Missing => {
                f.pad("determining client identity: no applicable host")
            }
            IdentityErrorKind::InvalidHeader(name) => write!(
                f,
                "determining client identity: unusable value in header {name}"
            ),
        }
    }
}

impl std::error::Error for IdentityResolutionError {}

/// Error type for a route pattern that cannot be told apart from one that
/// is already registered once capture names are ignored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbiguousPatternError {
    /// The pattern that was being registered.
    pub pattern: String,
    /// The registered pattern it collides with.
    pub conflicts_with: String,
}

impl fmt::Display for AmbiguousPatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ambiguous capture variable names: {} conflicts with {}",
            self.pattern, self.conflicts_with
        )
    }
}

impl std::error::Error for AmbiguousPatternError {}

/// Error type for session policies with zero-valued limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidPolicyError {
    /// `max_requests` was zero.
    ZeroMaxRequests,
    /// The session window was zero.
    ZeroSessionDuration,
    /// The ban duration was zero.
    ZeroBanDuration,
}

impl fmt::Display for InvalidPolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            InvalidPolicyError::ZeroMaxRequests => {
                "session policy must allow at least one request"
            }
            InvalidPolicyError::ZeroSessionDuration => {
                "session policy window must be longer than zero"
            }
            InvalidPolicyError::ZeroBanDuration => {
                "session policy ban must be longer than zero"
            }
        };
        f.pad(msg)
    }
}

impl std::error::Error for InvalidPolicyError {}
