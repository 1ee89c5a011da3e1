//! Integration tests for request dispatch.

use std::sync::Arc;

use cachet_routing::{MatchContext, MatchResult, RegexMatcher, Route, RouteMatch, Router};
use cachet_strategy::{CacheOnly, StrategyConfig, StrategyRunner};
use cachet_types::{
    Cache, Error, FetchOptions, Fetcher, MemoryCacheStorage, Method, Request, RequestMode,
    Response, Result, RouteHandlerContext, RouteParams, SharedRouteHandler, Url, handler_fn,
};
use parking_lot::Mutex;

type Calls = Arc<Mutex<Vec<(String, Option<RouteParams>)>>>;

/// Handler that records its name and the params it was given.
fn recording(name: &'static str, calls: &Calls) -> SharedRouteHandler {
    let calls = Arc::clone(calls);
    handler_fn(move |ctx: RouteHandlerContext| {
        let calls = Arc::clone(&calls);
        async move {
            calls.lock().push((name.to_string(), ctx.params.clone()));
            Ok(Response::ok(name))
        }
    })
}

fn failing(message: &'static str) -> SharedRouteHandler {
    handler_fn(move |_ctx: RouteHandlerContext| async move {
        Err(Error::Transport(message.to_string()))
    })
}

fn get(url: &str) -> Request {
    Request::parse(Method::GET, url).unwrap()
}

fn origin() -> Url {
    Url::parse("https://app.test/").unwrap()
}

fn path_is(path: &'static str) -> impl Fn(&MatchContext<'_>) -> MatchResult + Send + Sync {
    move |ctx: &MatchContext<'_>| (ctx.url.path() == path).then(|| RouteMatch::Captures(vec![]))
}

#[tokio::test]
async fn test_matched_with_empty_params_and_unhandled() {
    let calls = Calls::default();
    let mut router = Router::with_origin(origin());
    router
        .register_route(Route::get(path_is("/a"), recording("a", &calls)))
        .unwrap();

    let response = router
        .handle_request(get("https://app.test/a"), None)
        .expect("route should handle /a")
        .await
        .unwrap();
    assert_eq!(response.body().as_ref(), b"a");
    assert_eq!(*calls.lock(), vec![("a".to_string(), None)]);

    assert!(router.handle_request(get("https://app.test/b"), None).is_none());
    assert_eq!(calls.lock().len(), 1);
}

#[tokio::test]
async fn test_earliest_registered_route_wins() {
    let calls = Calls::default();
    let mut router = Router::with_origin(origin());
    router
        .register_route(Route::get(path_is("/x"), recording("first", &calls)))
        .unwrap();
    router
        .register_route(Route::get(path_is("/x"), recording("second", &calls)))
        .unwrap();

    for _ in 0..3 {
        router
            .handle_request(get("https://app.test/x"), None)
            .unwrap()
            .await
            .unwrap();
    }

    let names: Vec<String> = calls.lock().iter().map(|(n, _)| n.clone()).collect();
    assert_eq!(names, vec!["first", "first", "first"]);
}

#[tokio::test]
async fn test_routes_are_per_method() {
    let calls = Calls::default();
    let mut router = Router::with_origin(origin());
    router
        .register_route(Route::new(path_is("/form"), recording("post", &calls), Method::POST))
        .unwrap();

    assert!(router.handle_request(get("https://app.test/form"), None).is_none());

    let post = Request::parse(Method::POST, "https://app.test/form").unwrap();
    assert!(router.handle_request(post, None).is_some());
}

#[tokio::test]
async fn test_regex_route_cross_origin_rule() {
    let calls = Calls::default();
    let mut router = Router::with_origin(origin());
    router
        .register_route(Route::get(
            RegexMatcher::new(r"/static/(\w+)\.css").unwrap(),
            recording("css", &calls),
        ))
        .unwrap();

    router
        .handle_request(get("https://app.test/static/site.css"), None)
        .expect("same-origin match anywhere")
        .await
        .unwrap();
    assert_eq!(
        calls.lock()[0].1,
        Some(RouteParams::Captures(vec!["site".into()]))
    );

    assert!(
        router
            .handle_request(get("https://cdn.test/static/site.css"), None)
            .is_none()
    );
}

#[tokio::test]
async fn test_unregister_route() {
    let calls = Calls::default();
    let mut router = Router::new();
    let route = router
        .register_route(Route::get(path_is("/a"), recording("a", &calls)))
        .unwrap();
    let stranger = Arc::new(Route::get(path_is("/a"), recording("b", &calls)));
    let post = Arc::new(Route::new(path_is("/a"), recording("c", &calls), Method::POST));

    assert_eq!(
        router.unregister_route(&post),
        Err(Error::RouteNotFound {
            method: "POST".into()
        })
    );
    assert_eq!(
        router.unregister_route(&stranger),
        Err(Error::RouteNotRegistered {
            method: "GET".into()
        })
    );

    router.unregister_route(&route).unwrap();
    assert!(router.routes(&Method::GET).is_empty());
    assert!(router.handle_request(get("https://app.test/a"), None).is_none());
}

#[test]
fn test_register_rejects_unsupported_method() {
    let calls = Calls::default();
    let mut router = Router::new();
    let result = router.register_route(Route::new(
        path_is("/a"),
        recording("a", &calls),
        Method::OPTIONS,
    ));
    assert!(matches!(result, Err(Error::InvalidRoute(_))));
}

#[tokio::test]
async fn test_default_handler_and_unsupported_scheme() {
    let calls = Calls::default();
    let mut router = Router::with_origin(origin());
    router
        .register_route(Route::get(|_: &MatchContext<'_>| Some(RouteMatch::Matched), recording("route", &calls)))
        .unwrap();
    router.set_default_handler(recording("default", &calls));

    router
        .handle_request(get("ftp://app.test/file"), None)
        .expect("default handler applies")
        .await
        .unwrap();

    let names: Vec<String> = calls.lock().iter().map(|(n, _)| n.clone()).collect();
    assert_eq!(names, vec!["default"]);
}

#[tokio::test]
async fn test_catch_handlers_in_order() {
    let calls = Calls::default();
    let mut router = Router::with_origin(origin());
    router
        .register_route(
            Route::get(path_is("/route-catch"), failing("down"))
                .with_catch_handler(recording("route-catch", &calls)),
        )
        .unwrap();
    router
        .register_route(
            Route::get(path_is("/both-fail"), failing("down"))
                .with_catch_handler(failing("still down")),
        )
        .unwrap();

    // Without a router catch handler the error reaches the caller.
    let error = router
        .handle_request(get("https://app.test/both-fail"), None)
        .unwrap()
        .await
        .unwrap_err();
    assert_eq!(error, Error::Transport("still down".into()));

    let seen_error = Arc::new(Mutex::new(None));
    let seen = Arc::clone(&seen_error);
    router.set_catch_handler(handler_fn(move |ctx: RouteHandlerContext| {
        let seen = Arc::clone(&seen);
        async move {
            *seen.lock() = ctx.error.clone();
            Ok(Response::new(503, "offline"))
        }
    }));

    let response = router
        .handle_request(get("https://app.test/route-catch"), None)
        .unwrap()
        .await
        .unwrap();
    assert_eq!(response.body().as_ref(), b"route-catch");

    let response = router
        .handle_request(get("https://app.test/both-fail"), None)
        .unwrap()
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
    assert_eq!(
        *seen_error.lock(),
        Some(Error::Transport("still down".into()))
    );
}

#[tokio::test]
async fn test_navigation_route() {
    let calls = Calls::default();
    let mut router = Router::with_origin(origin());
    router
        .register_route(Route::navigation(recording("shell", &calls)))
        .unwrap();

    let page = get("https://app.test/inbox").with_mode(RequestMode::Navigate);
    assert!(router.handle_request(page, None).is_some());
    assert!(router.handle_request(get("https://app.test/api/mail"), None).is_none());
}

struct Unreachable;

#[async_trait::async_trait]
impl Fetcher for Unreachable {
    async fn fetch(&self, _request: &Request, _options: &FetchOptions) -> Result<Response> {
        Err(Error::Transport("offline".into()))
    }
}

#[tokio::test]
async fn test_strategy_as_route_handler() {
    let storage = MemoryCacheStorage::new();
    storage
        .cache("static")
        .put(&get("https://app.test/static/app.js"), Response::ok("js"))
        .await
        .unwrap();

    let runner = StrategyRunner::new(
        CacheOnly,
        StrategyConfig::new("static"),
        Arc::new(storage),
        Arc::new(Unreachable),
    )
    .unwrap();

    let mut router = Router::with_origin(origin());
    router
        .register_route(Route::regex("/static/", Arc::new(runner), Method::GET).unwrap())
        .unwrap();

    let response = router
        .handle_request(get("https://app.test/static/app.js"), None)
        .unwrap()
        .await
        .unwrap();
    assert_eq!(response.body().as_ref(), b"js");

    let error = router
        .handle_request(get("https://app.test/static/missing.js"), None)
        .unwrap()
        .await
        .unwrap_err();
    assert!(matches!(error, Error::NoResponse { .. }));
}
