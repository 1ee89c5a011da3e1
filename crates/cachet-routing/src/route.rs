//! Routes and match predicates.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use cachet_types::{FetchEvent, Method, Request, RouteParams, SharedRouteHandler, Url};

use crate::navigation::NavigationMatcher;
use crate::pattern::RegexMatcher;

/// What a match predicate sees.
#[derive(Debug, Clone, Copy)]
pub struct MatchContext<'a> {
    pub url: &'a Url,
    /// Whether `url` has the router's origin.
    pub same_origin: bool,
    pub request: &'a Request,
    pub event: Option<&'a FetchEvent>,
}

/// A successful match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteMatch {
    /// Matched without parameters.
    Matched,
    Captures(Vec<String>),
    Named(BTreeMap<String, String>),
}

impl RouteMatch {
    /// Parameters handed to the handler. Empty captures become `None`.
    pub fn into_params(self) -> Option<RouteParams> {
        match self {
            RouteMatch::Matched => None,
            RouteMatch::Captures(values) => RouteParams::Captures(values).non_empty(),
            RouteMatch::Named(values) => RouteParams::Named(values).non_empty(),
        }
    }
}

/// `None` means the route does not apply.
pub type MatchResult = Option<RouteMatch>;

/// Decides whether a route applies to a request.
pub trait RouteMatcher: Send + Sync {
    fn matches(&self, ctx: &MatchContext<'_>) -> MatchResult;
}

impl<F> RouteMatcher for F
where
    F: Fn(&MatchContext<'_>) -> MatchResult + Send + Sync,
{
    fn matches(&self, ctx: &MatchContext<'_>) -> MatchResult {
        self(ctx)
    }
}

/// Matches a same-origin request whose path equals `path`.
#[derive(Debug, Clone)]
pub struct ExactPathMatcher {
    path: String,
}

impl ExactPathMatcher {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl RouteMatcher for ExactPathMatcher {
    fn matches(&self, ctx: &MatchContext<'_>) -> MatchResult {
        (ctx.same_origin && ctx.url.path() == self.path).then_some(RouteMatch::Matched)
    }
}

/// A match predicate, the handler it dispatches to and the method it
/// applies to.
pub struct Route {
    matcher: Arc<dyn RouteMatcher>,
    handler: SharedRouteHandler,
    method: Method,
    catch_handler: Option<SharedRouteHandler>,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("has_catch_handler", &self.catch_handler.is_some())
            .finish_non_exhaustive()
    }
}

impl Route {
    pub fn new(
        matcher: impl RouteMatcher + 'static,
        handler: SharedRouteHandler,
        method: Method,
    ) -> Self {
        Self {
            matcher: Arc::new(matcher),
            handler,
            method,
            catch_handler: None,
        }
    }

    pub fn get(matcher: impl RouteMatcher + 'static, handler: SharedRouteHandler) -> Self {
        Self::new(matcher, handler, Method::GET)
    }

    /// Route on a regular expression over the full URL.
    pub fn regex(
        pattern: &str,
        handler: SharedRouteHandler,
        method: Method,
    ) -> cachet_types::Result<Self> {
        Ok(Self::new(RegexMatcher::new(pattern)?, handler, method))
    }

    /// Route for every navigation request.
    pub fn navigation(handler: SharedRouteHandler) -> Self {
        Self::get(NavigationMatcher::new(), handler)
    }

    /// Route for one same-origin path.
    pub fn path(path: impl Into<String>, handler: SharedRouteHandler) -> Self {
        Self::get(ExactPathMatcher::new(path), handler)
    }

    /// Handler that gets a chance to answer when this route's handler fails.
    pub fn with_catch_handler(mut self, handler: SharedRouteHandler) -> Self {
        self.catch_handler = Some(handler);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn handler(&self) -> &SharedRouteHandler {
        &self.handler
    }

    pub fn catch_handler(&self) -> Option<&SharedRouteHandler> {
        self.catch_handler.as_ref()
    }

    pub fn matches(&self, ctx: &MatchContext<'_>) -> MatchResult {
        self.matcher.matches(ctx)
    }
}
