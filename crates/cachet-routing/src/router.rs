//! Request dispatch.
//!
//! The router keeps an ordered list of routes per HTTP method. A request goes
//! to the first route registered for its method whose predicate matches;
//! otherwise to the default handler, if any. Handler failures are offered to
//! the route's catch handler, then to the router's.

use std::collections::HashMap;
use std::sync::Arc;

use cachet_types::{
    Error, FetchEvent, Method, Request, Response, Result, RouteHandlerContext, RouteParams,
    SharedRouteHandler, Url,
};
use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::route::{MatchContext, Route};

/// Methods a route may be registered for.
pub const SUPPORTED_METHODS: &[Method] = &[
    Method::GET,
    Method::HEAD,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::PATCH,
];

/// Pending response for a routed request.
pub type RouteFuture = BoxFuture<'static, Result<Response>>;

/// Maps requests to handlers.
#[derive(Default)]
pub struct Router {
    origin: Option<Url>,
    routes: HashMap<Method, Vec<Arc<Route>>>,
    default_handler: Option<SharedRouteHandler>,
    catch_handler: Option<SharedRouteHandler>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<&str, usize> = self
            .routes
            .iter()
            .map(|(method, routes)| (method.as_str(), routes.len()))
            .collect();
        f.debug_struct("Router")
            .field("origin", &self.origin.as_ref().map(|u| u.origin().ascii_serialization()))
            .field("routes", &counts)
            .field("has_default_handler", &self.default_handler.is_some())
            .field("has_catch_handler", &self.catch_handler.is_some())
            .finish()
    }
}

impl Router {
    /// Router with no origin: every request is treated as cross-origin.
    pub fn new() -> Self {
        Self::default()
    }

    /// Router for the given origin. Requests to it are same-origin.
    pub fn with_origin(origin: Url) -> Self {
        Self {
            origin: Some(origin),
            ..Self::default()
        }
    }

    pub fn origin(&self) -> Option<&Url> {
        self.origin.as_ref()
    }

    /// Append `route` to the routes for its method. Earlier routes keep
    /// precedence.
    pub fn register_route(&mut self, route: impl Into<Arc<Route>>) -> Result<Arc<Route>> {
        let route = route.into();
        let method = route.method().clone();
        if !SUPPORTED_METHODS.contains(&method) {
            return Err(Error::InvalidRoute(format!(
                "unsupported method {method}; expected one of GET, HEAD, POST, PUT, DELETE, PATCH"
            )));
        }

        let routes = self.routes.entry(method.clone()).or_default();
        routes.push(Arc::clone(&route));
        debug!(%method, position = routes.len(), "route registered");
        Ok(route)
    }

    /// Remove exactly this route instance.
    pub fn unregister_route(&mut self, route: &Arc<Route>) -> Result<()> {
        let method = route.method();
        let Some(routes) = self.routes.get_mut(method) else {
            return Err(Error::RouteNotFound {
                method: method.to_string(),
            });
        };

        let Some(position) = routes.iter().position(|r| Arc::ptr_eq(r, route)) else {
            return Err(Error::RouteNotRegistered {
                method: method.to_string(),
            });
        };

        routes.remove(position);
        if routes.is_empty() {
            self.routes.remove(method);
        }
        debug!(%method, "route unregistered");
        Ok(())
    }

    /// Routes registered for `method`, in precedence order.
    pub fn routes(&self, method: &Method) -> &[Arc<Route>] {
        self.routes.get(method).map(Vec::as_slice).unwrap_or_default()
    }

    /// Handler for requests no route matches.
    pub fn set_default_handler(&mut self, handler: SharedRouteHandler) {
        self.default_handler = Some(handler);
    }

    /// Handler for requests whose handler (and route catch handler) failed.
    pub fn set_catch_handler(&mut self, handler: SharedRouteHandler) {
        self.catch_handler = Some(handler);
    }

    fn is_same_origin(&self, url: &Url) -> bool {
        self.origin
            .as_ref()
            .is_some_and(|origin| origin.origin() == url.origin())
    }

    /// First route for the request's method whose predicate matches.
    pub fn find_matching_route(
        &self,
        url: &Url,
        same_origin: bool,
        request: &Request,
        event: Option<&FetchEvent>,
    ) -> Option<(Arc<Route>, Option<RouteParams>)> {
        let ctx = MatchContext {
            url,
            same_origin,
            request,
            event,
        };
        self.routes(request.method())
            .iter()
            .find_map(|route| route.matches(&ctx).map(|m| (Arc::clone(route), m.into_params())))
    }

    /// Route `request` to a handler.
    ///
    /// Returns `None` when nothing handles the request; the caller should then
    /// fall back to its own behaviour (usually the plain network).
    pub fn handle_request(&self, request: Request, event: Option<FetchEvent>) -> Option<RouteFuture> {
        let url = request.url().clone();

        let matched = if matches!(url.scheme(), "http" | "https") {
            let same_origin = self.is_same_origin(&url);
            self.find_matching_route(&url, same_origin, &request, event.as_ref())
        } else {
            debug!(url = %url, "unsupported scheme, skipping routes");
            None
        };

        let (handler, route_catch, params) = match matched {
            Some((route, params)) => {
                debug!(url = %url, method = %request.method(), "found matching route");
                (
                    Arc::clone(route.handler()),
                    route.catch_handler().cloned(),
                    params,
                )
            }
            None => match &self.default_handler {
                Some(handler) => {
                    debug!(url = %url, "no matching route, using default handler");
                    (Arc::clone(handler), None, None)
                }
                None => {
                    debug!(url = %url, method = %request.method(), "no route handles request");
                    return None;
                }
            },
        };

        let mut ctx = RouteHandlerContext::new(request).with_params(params);
        if let Some(event) = event {
            ctx = ctx.with_event(event);
        }
        let router_catch = self.catch_handler.clone();

        Some(
            async move {
                let error = match handler.handle(ctx.clone()).await {
                    Ok(response) => return Ok(response),
                    Err(error) => error,
                };
                warn!(url = %ctx.url, error = %error, "route handler failed");

                let error = match route_catch {
                    Some(catch) => match catch.handle(ctx.clone().with_error(error)).await {
                        Ok(response) => return Ok(response),
                        Err(error) => {
                            warn!(url = %ctx.url, error = %error, "route catch handler failed");
                            error
                        }
                    },
                    None => error,
                };

                match router_catch {
                    Some(catch) => catch.handle(ctx.with_error(error)).await,
                    None => Err(error),
                }
            }
            .boxed(),
        )
    }
}
