//! Request routing for Cachet.
//!
//! A [`Router`] holds [`Route`]s per HTTP method and dispatches each request
//! to the earliest-registered route whose predicate matches. Predicates are
//! anything implementing [`RouteMatcher`]: closures, [`RegexMatcher`],
//! [`NavigationMatcher`] or [`ExactPathMatcher`]. Handlers are
//! [`cachet_types::RouteHandler`]s, which includes every strategy runner.

pub mod navigation;
pub mod pattern;
pub mod route;
pub mod router;

pub use navigation::NavigationMatcher;
pub use pattern::RegexMatcher;
pub use route::{ExactPathMatcher, MatchContext, MatchResult, Route, RouteMatch, RouteMatcher};
pub use router::{RouteFuture, Router, SUPPORTED_METHODS};
