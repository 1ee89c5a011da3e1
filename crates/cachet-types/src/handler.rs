//! Route handler trait.
//!
//! Defined here rather than in `cachet-routing` so strategies can implement
//! it without depending on the router.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::error::{Error, Result};
use crate::event::FetchEvent;
use crate::message::{Request, Response};

/// Parameters captured by a route's match predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteParams {
    /// Positional captures (e.g. regex groups).
    Captures(Vec<String>),
    /// Named captures.
    Named(BTreeMap<String, String>),
}

impl RouteParams {
    /// Normalize empty captures to "no parameters".
    pub fn non_empty(self) -> Option<Self> {
        match &self {
            RouteParams::Captures(values) if values.is_empty() => None,
            RouteParams::Named(values) if values.is_empty() => None,
            _ => Some(self),
        }
    }
}

/// Everything a handler receives for one request.
#[derive(Debug, Clone)]
pub struct RouteHandlerContext {
    pub url: Url,
    pub request: Request,
    pub event: Option<FetchEvent>,
    pub params: Option<RouteParams>,
    /// Set when the context is passed to a catch handler.
    pub error: Option<Error>,
}

impl RouteHandlerContext {
    pub fn new(request: Request) -> Self {
        Self {
            url: request.url().clone(),
            request,
            event: None,
            params: None,
            error: None,
        }
    }

    pub fn with_event(mut self, event: FetchEvent) -> Self {
        self.event = Some(event);
        self
    }

    pub fn with_params(mut self, params: Option<RouteParams>) -> Self {
        self.params = params;
        self
    }

    pub fn with_error(mut self, error: Error) -> Self {
        self.error = Some(error);
        self
    }
}

impl From<Request> for RouteHandlerContext {
    fn from(request: Request) -> Self {
        Self::new(request)
    }
}

/// Produces a response for a routed request.
#[async_trait]
pub trait RouteHandler: Send + Sync {
    async fn handle(&self, ctx: RouteHandlerContext) -> Result<Response>;
}

/// Shared handler reference.
pub type SharedRouteHandler = Arc<dyn RouteHandler>;

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> RouteHandler for FnHandler<F>
where
    F: Fn(RouteHandlerContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response>> + Send,
{
    async fn handle(&self, ctx: RouteHandlerContext) -> Result<Response> {
        (self.0)(ctx).await
    }
}

/// Turn an async closure into a handler object.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn RouteHandler>
where
    F: Fn(RouteHandlerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_params_normalize_to_none() {
        assert_eq!(RouteParams::Captures(vec![]).non_empty(), None);
        assert_eq!(RouteParams::Named(BTreeMap::new()).non_empty(), None);

        let captured = RouteParams::Captures(vec!["42".into()]);
        assert_eq!(captured.clone().non_empty(), Some(captured));
    }

    #[tokio::test]
    async fn test_handler_fn_wraps_closure() {
        let handler = handler_fn(|ctx: RouteHandlerContext| async move {
            Ok(Response::ok(ctx.url.path().to_string()))
        });

        let request = Request::parse(http::Method::GET, "https://a.test/hello").unwrap();
        let response = handler.handle(request.into()).await.unwrap();
        assert_eq!(response.body().as_ref(), b"/hello");
    }
}
