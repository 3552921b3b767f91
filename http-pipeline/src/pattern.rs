//! Path templates with named capture segments.
//!
//! A pattern such as `/users/:id/orders` is split on `/` into segments. A
//! segment starting with [`CAPTURE_MARKER`] binds whatever the request path
//! holds at that position; every other segment must match literally.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use crate::error::AmbiguousPatternError;

/// Marker that starts a capture segment.
pub const CAPTURE_MARKER: char = ':';

/// Split a path or pattern into its segments, dropping one leading `/`.
pub fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.strip_prefix('/').unwrap_or(path).split('/')
}

/// One `/`-separated component of a [`Pattern`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Must equal the path segment at the same position.
    Literal(String),
    /// Binds the path segment at the same position under this name.
    Capture(String),
}

impl Segment {
    fn parse(raw: &str) -> Self {
        match raw.strip_prefix(CAPTURE_MARKER) {
            Some(name) => Segment::Capture(name.to_string()),
            None => Segment::Literal(raw.to_string()),
        }
    }

    /// Whether this segment is a capture.
    pub fn is_capture(&self) -> bool {
        matches!(self, Segment::Capture(_))
    }

    fn erased(&self) -> &str {
        match self {
            Segment::Literal(s) => s,
            Segment::Capture(_) => "",
        }
    }

    fn sort_key(&self) -> SortKey<'_> {
        match self {
            Segment::Literal(s) => SortKey::Literal(s),
            Segment::Capture(_) => SortKey::Capture,
        }
    }
}

// Variant order matters: literals sort before captures.
#[derive(PartialEq, Eq, PartialOrd, Ord)]
enum SortKey<'a> {
    Literal(&'a str),
    Capture,
}

/// A parsed path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
}

impl Pattern {
    /// Parse a template such as `/users/:id`.
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let segments = split_path(&raw).map(Segment::parse).collect();
        Self { raw, segments }
    }

    /// The template as it was registered.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The parsed segments in path order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Names of the capture segments in path order.
    pub fn capture_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Capture(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Order two patterns without regard to capture names.
    ///
    /// Shorter patterns sort first. Patterns of equal length are compared
    /// segment by segment: literals lexicographically, any literal before a
    /// capture, and two captures as equal. `Equal` means the patterns differ
    /// at most in capture names.
    pub fn compare(&self, other: &Pattern) -> Ordering {
        self.segments.len().cmp(&other.segments.len()).then_with(|| {
            self.segments
                .iter()
                .zip(&other.segments)
                .map(|(l, r)| l.sort_key().cmp(&r.sort_key()))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        })
    }

    /// Order this pattern against a concrete request path.
    ///
    /// `Equal` means the pattern matches the path.
    pub fn compare_path(&self, path: &str) -> Ordering {
        let parts: Vec<&str> = split_path(path).collect();
        self.compare_parts(&parts)
    }

    pub(crate) fn compare_parts(&self, parts: &[&str]) -> Ordering {
        self.segments.len().cmp(&parts.len()).then_with(|| {
            self.segments
                .iter()
                .zip(parts)
                .filter_map(|(segment, part)| match segment {
                    Segment::Literal(lit) => Some(lit.as_str().cmp(part)),
                    Segment::Capture(_) => None,
                })
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        })
    }

    /// Whether the two patterns become identical once every capture is
    /// replaced by an empty segment.
    ///
    /// An empty literal therefore collides with a capture: `/a/` and `/a/:x`
    /// both match the path `/a/`.
    pub fn is_ambiguous_with(&self, other: &Pattern) -> bool {
        self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|(l, r)| l.erased() == r.erased())
    }

    /// Extract the captured values if the pattern matches `path`.
    pub fn match_path(&self, path: &str) -> Option<PathParams> {
        let parts: Vec<&str> = split_path(path).collect();
        self.match_parts(&parts)
    }

    pub(crate) fn match_parts(&self, parts: &[&str]) -> Option<PathParams> {
        if self.compare_parts(parts) != Ordering::Equal {
            return None;
        }
        let params = self
            .segments
            .iter()
            .zip(parts)
            .filter_map(|(segment, part)| match segment {
                Segment::Capture(name) => {
                    Some((name.clone(), (*part).to_string()))
                }
                Segment::Literal(_) => None,
            })
            .collect();
        Some(PathParams(params))
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.raw)
    }
}

impl From<&str> for Pattern {
    fn from(raw: &str) -> Self {
        Pattern::parse(raw)
    }
}

/// Check a set of patterns for ambiguity.
///
/// Every pattern is compared with every other one. The error names the later
/// pattern of the first colliding pair as `pattern`.
pub fn validate_patterns<'a, I>(patterns: I) -> Result<(), AmbiguousPatternError>
where
    I: IntoIterator<Item = &'a Pattern>,
{
    let patterns: Vec<&Pattern> = patterns.into_iter().collect();
    for (i, later) in patterns.iter().enumerate() {
        if let Some(earlier) =
            patterns[..i].iter().find(|earlier| earlier.is_ambiguous_with(later))
        {
            return Err(AmbiguousPatternError {
                pattern: later.as_str().to_string(),
                conflicts_with: earlier.as_str().to_string(),
            });
        }
    }
    Ok(())
}

/// Values bound by the capture segments of the matched pattern.
///
/// Keys are capture names without the leading marker. Routers insert this
/// into the request extensions before calling the bound handler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(HashMap<String, String>);

impl PathParams {
    /// Look up a captured value by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Number of captured values.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the pattern had no captures.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Consume into the underlying map.
    pub fn into_inner(self) -> HashMap<String, String> {
        self.0
    }
}
