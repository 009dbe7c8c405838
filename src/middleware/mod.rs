//! Middleware pipeline: composable before/after logic around the router.
//!
//! - [`Middleware`]: trait implemented by all middleware.
//! - [`Next`]: cursor into the remaining chain; [`Next::run`] advances it.
//! - [`Pipeline`]: an ordered middleware stack terminated by a [`Router`].
//! - [`LoggerMiddleware`]: one structured log line per request.

use std::{future::Future, pin::Pin, sync::Arc};

use tokio::time::Instant;

use crate::router::{Handler, Router, into_handler};
use crate::{Request, Response, context::Context};

/// A type-erased, reference-counted middleware function.
pub type MiddlewareHandler = Arc<
    dyn Fn(Context, Next) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static,
>;

/// Wraps a [`Middleware`] implementation as a [`MiddlewareHandler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

/// The remainder of the chain for one request.
///
/// Consumed by [`run`](Self::run), so a middleware can forward at most once.
/// When every middleware has run, the terminal endpoint (normally the router)
/// produces the response.
pub struct Next {
    middlewares: Arc<[MiddlewareHandler]>,
    endpoint: Handler,
    index: usize,
}

impl Next {
    pub fn new(middlewares: Arc<[MiddlewareHandler]>, endpoint: Handler) -> Self {
        Self {
            middlewares,
            endpoint,
            index: 0,
        }
    }

    /// Invokes the next middleware, or the endpoint once the stack is exhausted.
    pub async fn run(mut self, ctx: Context) -> Response {
        match self.middlewares.get(self.index).cloned() {
            Some(handler) => {
                self.index += 1;
                handler(ctx, self).await
            }
            None => (self.endpoint)(ctx).await,
        }
    }
}

/// Core middleware trait.
///
/// An implementation may pass through (`next.run(ctx).await`), short-circuit
/// by returning its own [`Response`], or decorate the downstream response.
/// It must not hold locks across the `.await` on `next`.
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

/// Logs method, path, status and elapsed time for each request.
///
/// Emits one `tracing::info!` event after the downstream handler completes,
/// with the fields `method`, `path`, `status`, and `elapsed`.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().clone();
            let path = ctx.request().path().to_owned();

            let response = next.run(ctx).await;

            tracing::info!(
                %method,
                path = %path,
                status = response.status().as_u16(),
                elapsed = ?start.elapsed(),
                "request handled"
            );
            response
        })
    }
}

/// An ordered middleware stack in front of a [`Router`].
///
/// Cheap to clone; the server shares one instance across all connections.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use kvcache::Router;
/// use kvcache::middleware::{LoggerMiddleware, Pipeline};
///
/// let pipeline = Pipeline::new(Router::new()).with(Arc::new(LoggerMiddleware));
/// assert_eq!(pipeline.len(), 1);
/// ```
#[derive(Clone)]
pub struct Pipeline {
    middlewares: Arc<[MiddlewareHandler]>,
    endpoint: Handler,
}

impl Pipeline {
    pub fn new(router: Router) -> Self {
        let router = Arc::new(router);
        let endpoint = into_handler(move |ctx: Context| {
            let router = Arc::clone(&router);
            async move { router.route(ctx.into_request()).await }
        });
        Self {
            middlewares: Arc::from(Vec::new()),
            endpoint,
        }
    }

    /// Appends a middleware; earlier ones wrap later ones.
    #[must_use]
    pub fn with<M>(self, middleware: Arc<M>) -> Self
    where
        M: Middleware + 'static,
    {
        let mut stack = self.middlewares.to_vec();
        stack.push(from_middleware(middleware));
        Self {
            middlewares: Arc::from(stack),
            endpoint: self.endpoint,
        }
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Runs `request` through the stack and the router.
    pub async fn handle(&self, request: Request) -> Response {
        let next = Next::new(Arc::clone(&self.middlewares), Arc::clone(&self.endpoint));
        next.run(Context::new(request)).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::StatusCode;

    fn make_request(method: &str, path: &str) -> Request {
        let raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        Request::parse(raw.as_bytes()).unwrap().0
    }

    struct Tag(&'static str);

    impl Middleware for Tag {
        fn handle(
            &self,
            ctx: Context,
            next: Next,
        ) -> Pin<Box<dyn Future<Output = Response> + Send>> {
            let tag = self.0;
            Box::pin(async move {
                let mut resp = next.run(ctx).await;
                resp.add_header("X-Trace", tag);
                resp
            })
        }
    }

    struct Reject(Arc<AtomicUsize>);

    impl Middleware for Reject {
        fn handle(
            &self,
            _ctx: Context,
            _next: Next,
        ) -> Pin<Box<dyn Future<Output = Response> + Send>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Response::new(StatusCode::BadRequest) })
        }
    }

    #[tokio::test]
    async fn empty_pipeline_goes_straight_to_router() {
        let mut router = Router::new();
        router.get("/stats", |_ctx| async { Response::new(StatusCode::Ok) });
        let pipeline = Pipeline::new(router);
        assert!(pipeline.is_empty());
        let res = pipeline.handle(make_request("GET", "/stats")).await;
        assert_eq!(res.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn middleware_wraps_in_registration_order() {
        let mut router = Router::new();
        router.get("/stats", |_ctx| async { Response::new(StatusCode::Ok) });
        let pipeline = Pipeline::new(router)
            .with(Arc::new(Tag("outer")))
            .with(Arc::new(Tag("inner")));
        let res = pipeline.handle(make_request("GET", "/stats")).await;
        let tags: Vec<_> = res.headers().get_all("x-trace").collect();
        assert_eq!(tags, vec!["inner", "outer"]);
    }

    #[tokio::test]
    async fn short_circuit_skips_router() {
        let hits = Arc::new(AtomicUsize::new(0));
        let routed = Arc::new(AtomicUsize::new(0));
        let mut router = Router::new();
        let seen = Arc::clone(&routed);
        router.get("/stats", move |_ctx| {
            seen.fetch_add(1, Ordering::SeqCst);
            async { Response::new(StatusCode::Ok) }
        });
        let pipeline = Pipeline::new(router).with(Arc::new(Reject(Arc::clone(&hits))));
        let res = pipeline.handle(make_request("GET", "/stats")).await;
        assert_eq!(res.status(), StatusCode::BadRequest);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(routed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn logger_passes_response_through() {
        let mut router = Router::new();
        router.get("/stats", |_ctx| async {
            Response::new(StatusCode::NoContent)
        });
        let pipeline = Pipeline::new(router).with(Arc::new(LoggerMiddleware));
        let res = pipeline.handle(make_request("GET", "/stats")).await;
        assert_eq!(res.status(), StatusCode::NoContent);
    }
}
