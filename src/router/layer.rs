use std::fmt;

use http::Method;

use super::matcher::{MatchOptions, PathMatch, PathMatcher};
use super::route::Route;
use crate::dispatcher::Callback;
use crate::error::Error;

/// What a layer runs once it matches.
#[derive(Clone, Debug)]
pub enum Endpoint {
    /// Plain middleware (including a mounted [`Router`](super::Router))
    Middleware(Callback),
    /// A declared route, dispatched by method
    Route(Route),
}

/// One compiled pattern bound to one endpoint.
///
/// Immutable once built. A match produces a fresh [`PathMatch`]; nothing
/// about the last request is ever stored on the layer.
#[derive(Clone)]
pub struct Layer {
    matcher: PathMatcher,
    method: Option<Method>,
    endpoint: Endpoint,
}

impl Layer {
    pub fn new(path: &str, options: MatchOptions, endpoint: Endpoint) -> Result<Self, Error> {
        Ok(Self {
            matcher: PathMatcher::compile(path, options)?,
            method: None,
            endpoint,
        })
    }

    /// Middleware mounted at `/`, which matches every path.
    pub(crate) fn at_root(callback: Callback) -> Self {
        Self {
            matcher: PathMatcher::root(),
            method: None,
            endpoint: Endpoint::Middleware(callback),
        }
    }

    /// Layer inside a Route; matches every path and is filtered by `method`
    /// (`None` runs for every method).
    #[must_use]
    pub fn for_method(method: Option<Method>, callback: Callback) -> Self {
        Self {
            matcher: PathMatcher::root(),
            method,
            endpoint: Endpoint::Middleware(callback),
        }
    }

    /// Registered pattern.
    #[must_use]
    pub fn path(&self) -> &str {
        self.matcher.source()
    }

    #[must_use]
    pub fn matcher(&self) -> &PathMatcher {
        &self.matcher
    }

    #[must_use]
    pub fn method(&self) -> Option<&Method> {
        self.method.as_ref()
    }

    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub(crate) fn endpoint_mut(&mut self) -> &mut Endpoint {
        &mut self.endpoint
    }

    #[must_use]
    pub fn callback(&self) -> Option<&Callback> {
        match &self.endpoint {
            Endpoint::Middleware(callback) => Some(callback),
            Endpoint::Route(_) => None,
        }
    }

    #[must_use]
    pub fn route(&self) -> Option<&Route> {
        match &self.endpoint {
            Endpoint::Route(route) => Some(route),
            Endpoint::Middleware(_) => None,
        }
    }

    /// Test `path` against this layer's pattern.
    #[inline]
    pub fn matches(&self, path: &str) -> Result<Option<PathMatch>, Error> {
        self.matcher.matches(path)
    }

    /// Whether this route-stack layer runs for `method`.
    #[must_use]
    #[inline]
    pub fn accepts_method(&self, method: &Method) -> bool {
        self.method.as_ref().is_none_or(|m| m == method)
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("path", &self.path())
            .field("method", &self.method)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}
