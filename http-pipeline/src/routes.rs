//! Ordered table of pattern bindings.

use std::borrow::Cow;
use std::fmt;

use crate::error::AmbiguousPatternError;
use crate::pattern::{
    split_path, validate_patterns, PathParams, Pattern, Segment,
};

const DEFAULT_LOG_TARGET: &str = "http_pipeline::routes";

/// A single pattern bound to a handler.
#[derive(Debug, Clone)]
pub struct Route<H> {
    pattern: Pattern,
    handler: H,
}

impl<H> Route<H> {
    /// The pattern this route answers to.
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// The bound handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }
}

/// A successful lookup.
#[derive(Debug)]
pub struct RouteMatch<'a, H> {
    /// The pattern that matched.
    pub pattern: &'a Pattern,
    /// The handler bound to it.
    pub handler: &'a H,
    /// Values bound by the pattern's capture segments.
    pub params: PathParams,
}

// Segment trie over the sorted routes. Literal children are kept sorted by
// segment text and found by binary search.
#[derive(Debug, Clone, Default)]
struct Node {
    literals: Vec<(String, Node)>,
    capture: Option<Box<Node>>,
    route: Option<usize>,
}

impl Node {
    fn build<H>(routes: &[Route<H>]) -> Self {
        let mut root = Node::default();
        for (idx, route) in routes.iter().enumerate() {
            root.insert(route.pattern.segments(), idx);
        }
        root
    }

    fn insert(&mut self, segments: &[Segment], route: usize) {
        let Some((first, rest)) = segments.split_first() else {
            self.route = Some(route);
            return;
        };
        let child = match first {
            Segment::Literal(lit) => {
                let idx = match self
                    .literals
                    .binary_search_by(|(key, _)| key.cmp(lit))
                {
                    Ok(idx) => idx,
                    Err(idx) => {
                        self.literals.insert(idx, (lit.clone(), Node::default()));
                        idx
                    }
                };
                &mut self.literals[idx].1
            }
            Segment::Capture(_) => &mut **self.capture.get_or_insert_with(Box::default),
        };
        child.insert(rest, route);
    }

    // Depth first, literal child before the capture child.
    fn find(&self, parts: &[&str]) -> Option<usize> {
        let Some((first, rest)) = parts.split_first() else {
            return self.route;
        };
        let literal = self
            .literals
            .binary_search_by(|(key, _)| key.as_str().cmp(first))
            .ok()
            .and_then(|idx| self.literals[idx].1.find(rest));
        literal.or_else(|| self.capture.as_ref().and_then(|node| node.find(rest)))
    }
}

/// Pattern bindings kept sorted by [`Pattern::compare`].
///
/// Insertions re-validate the whole table for ambiguity, re-sort it and
/// rebuild the segment index, so they belong in setup code. Lookups only take
/// `&self`; share the table behind an `Arc` once setup is done, or wrap it in
/// a `RwLock` if routes must change while serving.
pub struct RouteTable<H> {
    routes: Vec<Route<H>>,
    index: Node,
    log_target: Cow<'static, str>,
}

impl<H> RouteTable<H> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            index: Node::default(),
            log_target: Cow::Borrowed(DEFAULT_LOG_TARGET),
        }
    }

    /// Log under `target` instead of the default target.
    pub fn with_log_target(mut self, target: impl Into<Cow<'static, str>>) -> Self {
        self.log_target = target.into();
        self
    }

    /// Bind `handler` to `pattern`.
    ///
    /// The table is left unchanged if the pattern is ambiguous with one that
    /// is already registered.
    pub fn insert(
        &mut self,
        pattern: impl Into<Pattern>,
        handler: H,
    ) -> Result<(), AmbiguousPatternError> {
        self.routes.push(Route { pattern: pattern.into(), handler });
        if let Err(e) = validate_patterns(self.routes.iter().map(|r| &r.pattern))
        {
            self.routes.pop();
            log::warn!(target: &*self.log_target, "Rejected route: {e}");
            return Err(e);
        }
        self.routes.sort_by(|l, r| l.pattern.compare(&r.pattern));
        self.index = Node::build(&self.routes);
        Ok(())
    }

    /// Find the route for a request path.
    ///
    /// The path is walked segment by segment through an index of the
    /// registered patterns, binary searching the literal segments at each
    /// level. When several routes match, a literal segment beats a capture
    /// at the first position where they differ, which is also the first
    /// match in table order.
    pub fn lookup(&self, path: &str) -> Option<RouteMatch<'_, H>> {
        let parts: Vec<&str> = split_path(path).collect();
        let Some(route) =
            self.index.find(&parts).and_then(|idx| self.routes.get(idx))
        else {
            log::debug!(target: &*self.log_target, "No route for {path}");
            return None;
        };
        let params = route.pattern.match_parts(&parts)?;
        log::debug!(
            target: &*self.log_target,
            "Matched {path} to {} with {} captures",
            route.pattern,
            params.len()
        );
        Some(RouteMatch { pattern: &route.pattern, handler: &route.handler, params })
    }

    /// Registered routes in lookup order.
    pub fn routes(&self) -> &[Route<H>] {
        &self.routes
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no route is registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl<H> Default for RouteTable<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Clone> Clone for RouteTable<H> {
    fn clone(&self) -> Self {
        Self {
            routes: self.routes.clone(),
            index: self.index.clone(),
            log_target: self.log_target.clone(),
        }
    }
}

impl<H> fmt::Debug for RouteTable<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTable")
            .field(
                "routes",
                &self.routes.iter().map(|r| r.pattern.as_str()).collect::<Vec<_>>(),
            )
            .field("log_target", &self.log_target)
            .finish()
    }
}
