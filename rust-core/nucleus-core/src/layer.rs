//! # Layer
//!
//! One entry of a router stack: a compiled path matcher bound to a handler.
//! Layers are immutable once built; matching returns a fresh
//! [`PathMatch`] instead of storing the result on the layer.

use crate::error::Result;
use crate::handler::{BoxedErrorMiddleware, BoxedMiddleware};
use crate::path::{MatchOptions, PathMatch, PathMatcher};
use crate::route::Route;

/// What a layer runs once its path matches
pub enum LayerKind {
    /// Request middleware, prefix matched
    Middleware(BoxedMiddleware),
    /// Error middleware, prefix matched
    ErrorHandler(BoxedErrorMiddleware),
    /// Method-dispatching route, exact matched
    Route(Route),
}

/// A path matcher bound to a handler
pub struct Layer {
    name: &'static str,
    matcher: PathMatcher,
    kind: LayerKind,
}

impl Layer {
    /// Build a layer, compiling its pattern
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if the pattern does not compile.
    pub fn new(pattern: &str, options: MatchOptions, kind: LayerKind) -> Result<Self> {
        let name = match &kind {
            LayerKind::Middleware(mw) => mw.name(),
            LayerKind::ErrorHandler(mw) => mw.name(),
            LayerKind::Route(_) => "route",
        };
        Ok(Self {
            name,
            matcher: PathMatcher::compile(pattern, options)?,
            kind,
        })
    }

    /// Handler name for logging
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Source pattern
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.matcher.pattern()
    }

    /// What this layer runs
    #[must_use]
    pub const fn kind(&self) -> &LayerKind {
        &self.kind
    }

    /// Route owned by this layer, if it is a route layer
    pub(crate) fn route_mut(&mut self) -> Option<&mut Route> {
        match &mut self.kind {
            LayerKind::Route(route) => Some(route),
            _ => None,
        }
    }

    /// Whether this layer handles errors
    #[must_use]
    pub const fn is_error_handler(&self) -> bool {
        matches!(self.kind, LayerKind::ErrorHandler(_))
    }

    /// Match a request path
    ///
    /// # Errors
    ///
    /// Returns `Error::ParamDecode` if a captured value is malformed.
    pub fn matches(&self, path: &str) -> Result<Option<PathMatch>> {
        self.matcher.matches(path)
    }
}

impl std::fmt::Debug for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layer")
            .field("name", &self.name)
            .field("pattern", &self.matcher.pattern())
            .finish_non_exhaustive()
    }
}
