//! Explicit routing table: maps (method, path pattern) pairs to handlers.
//!
//! Two pattern styles are supported:
//!
//! | Pattern          | Example match       | Captured params   |
//! |------------------|---------------------|-------------------|
//! | `/stats`         | `/stats`            | *(none)*          |
//! | `/caching/:key`  | `/caching/fixture`  | `key → "fixture"` |
//!
//! Trailing slashes are ignored on both sides. Routes are tried in
//! registration order and the first match wins. A path that matches some
//! route under a different method gets `405 Method Not Allowed` with an
//! `Allow` header; anything else gets `404 Not Found`.

use std::pin::Pin;
use std::sync::Arc;

use crate::context::{Context, PathParams};
use crate::{Method, Request, Response, StatusCode};

/// Type-erased async handler stored in the routing table.
pub type Handler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

/// Anything callable as `Fn(Context) -> impl Future<Output = Response>`.
///
/// The blanket impl lets [`Router::get`] and friends accept plain async
/// closures without repeating the two-parameter bound.
pub trait IntoHandler: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin((self)(ctx))
    }
}

/// Erases a concrete handler type into a shareable [`Handler`].
pub fn into_handler(handler: impl IntoHandler) -> Handler {
    Arc::new(move |ctx| handler.call(ctx))
}

#[derive(Debug, Clone)]
enum Segment {
    Static(String),
    Parameter(String),
}

#[derive(Debug, Clone)]
enum Pattern {
    Exact(String),
    Parameterized(Vec<Segment>),
}

fn trim_trailing_slash(path: &str) -> &str {
    if path != "/" {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}

impl Pattern {
    fn parse(pattern: &str) -> Self {
        let pattern = trim_trailing_slash(pattern);
        if !pattern.contains(':') {
            return Pattern::Exact(pattern.to_owned());
        }

        let segments = pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| match s.strip_prefix(':') {
                Some(name) => Segment::Parameter(name.to_owned()),
                None => Segment::Static(s.to_owned()),
            })
            .collect();
        Pattern::Parameterized(segments)
    }

    // Parameter segments must be non-empty, so `/caching/` never yields an empty key.
    fn matches(&self, path: &str) -> Option<PathParams> {
        let path = trim_trailing_slash(path);
        match self {
            Pattern::Exact(p) => (p == path).then(PathParams::new),
            Pattern::Parameterized(segments) => {
                let parts: Vec<&str> = path.split('/').skip(1).collect();
                if parts.len() != segments.len() {
                    return None;
                }

                let mut params = PathParams::new();
                for (seg, part) in segments.iter().zip(parts) {
                    match seg {
                        Segment::Static(s) if s == part => {}
                        Segment::Static(_) => return None,
                        Segment::Parameter(_) if part.is_empty() => return None,
                        Segment::Parameter(name) => params.insert(name.clone(), part.to_owned()),
                    }
                }
                Some(params)
            }
        }
    }
}

struct Route {
    method: Method,
    pattern: Pattern,
    handler: Handler,
}

/// The routing table.
///
/// # Examples
///
/// ```rust,no_run
/// use kvcache::{Router, Response, StatusCode};
/// use kvcache::context::Context;
///
/// let mut router = Router::new();
/// router.get("/caching/:key", |ctx: Context| async move {
///     let key = ctx.path_param("key").unwrap_or_default();
///     Response::text(StatusCode::Ok, key)
/// });
/// ```
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Get, path, handler);
    }

    pub fn post(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Post, path, handler);
    }

    pub fn put(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Put, path, handler);
    }

    pub fn patch(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Patch, path, handler);
    }

    fn add_route(&mut self, method: Method, path: &str, handler: impl IntoHandler) {
        self.routes.push(Route {
            method,
            pattern: Pattern::parse(path),
            handler: into_handler(handler),
        });
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Dispatches `request` to the first route matching both method and path.
    pub async fn route(&self, request: Request) -> Response {
        let mut allowed: Vec<&str> = Vec::new();

        for route in &self.routes {
            let Some(params) = route.pattern.matches(request.path()) else {
                continue;
            };
            if &route.method == request.method() {
                let ctx = Context::with_params(request, params);
                return (route.handler)(ctx).await;
            }
            if !allowed.contains(&route.method.as_str()) {
                allowed.push(route.method.as_str());
            }
        }

        if allowed.is_empty() {
            Response::text(StatusCode::NotFound, "Not Found")
        } else {
            Response::text(StatusCode::MethodNotAllowed, "Method Not Allowed")
                .header("Allow", allowed.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_request(method: &str, path: &str) -> Request {
        let raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        req
    }

    fn ok() -> Response {
        Response::new(StatusCode::Ok)
    }

    #[test]
    fn pattern_without_colon_is_exact() {
        assert!(matches!(Pattern::parse("/stats/"), Pattern::Exact(s) if s == "/stats"));
        assert!(matches!(Pattern::parse("/"), Pattern::Exact(s) if s == "/"));
    }

    #[test]
    fn pattern_parameter_segments() {
        match Pattern::parse("/caching/:key") {
            Pattern::Parameterized(segments) => {
                assert_eq!(segments.len(), 2);
                assert!(matches!(&segments[0], Segment::Static(s) if s == "caching"));
                assert!(matches!(&segments[1], Segment::Parameter(s) if s == "key"));
            }
            other => panic!("expected Parameterized, got {other:?}"),
        }
    }

    #[test]
    fn parameter_match_captures_raw_segment() {
        let pat = Pattern::parse("/caching/:key");
        let params = pat.matches("/caching/a%2Fb").unwrap();
        assert_eq!(params.get("key"), Some("a%2Fb"));
        assert!(pat.matches("/caching/fixture/").is_some());
    }

    #[test]
    fn parameter_match_rejects_wrong_shape() {
        let pat = Pattern::parse("/caching/:key");
        assert!(pat.matches("/caching").is_none());
        assert!(pat.matches("/caching/").is_none());
        assert!(pat.matches("/caching/a/b").is_none());
        assert!(pat.matches("/cache/a").is_none());
        assert!(pat.matches("/caching//").is_none());
    }

    #[test]
    fn router_counts_routes() {
        let mut router = Router::new();
        assert!(router.is_empty());
        router.get("/a", |_ctx| async { ok() });
        router.post("/a", |_ctx| async { ok() });
        assert_eq!(router.len(), 2);
    }

    #[tokio::test]
    async fn unknown_path_is_404() {
        let mut router = Router::new();
        router.get("/caching/:key", |_ctx| async { ok() });
        let res = router.route(make_request("GET", "/elsewhere")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn wrong_method_is_405_with_allow() {
        let mut router = Router::new();
        router.get("/caching/:key", |_ctx| async { ok() });
        router.put("/caching/:key", |_ctx| async { ok() });
        let res = router.route(make_request("DELETE", "/caching/k")).await;
        assert_eq!(res.status(), StatusCode::MethodNotAllowed);
        assert_eq!(res.headers().get("allow"), Some("GET, PUT"));
    }

    #[tokio::test]
    async fn handler_sees_captured_key() {
        let mut router = Router::new();
        router.patch("/caching/:key", |ctx: Context| async move {
            let key = ctx.path_param("key").unwrap();
            Response::text(StatusCode::Ok, key)
        });
        let res = router.route(make_request("PATCH", "/caching/fix%20ture")).await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(res.body_ref(), b"fix ture");
    }

    #[tokio::test]
    async fn first_registered_route_wins() {
        let mut router = Router::new();
        router.get("/stats", |_ctx| async { ok() });
        router.get("/stats", |_ctx| async { Response::new(StatusCode::NoContent) });
        let res = router.route(make_request("GET", "/stats")).await;
        assert_eq!(res.status(), StatusCode::Ok);
    }
}
