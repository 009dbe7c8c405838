//! HTTP adapter for the cache.
//!
//! | Method  | Path             | Params                  | Cache operation      |
//! |---------|------------------|-------------------------|----------------------|
//! | `POST`  | `/caching/:key`  | `value`                 | `store`              |
//! | `GET`   | `/caching/:key`  | —                       | `fetch`              |
//! | `PUT`   | `/caching/:key`  | `value`                 | `replace`            |
//! | `PATCH` | `/caching/:key`  | `oldValue`, `newValue`  | `compare_and_swap`   |
//! | `GET`   | `/stats`         | —                       | `stats` (JSON)       |
//!
//! Params come from the query string or a form-encoded body. Cache bodies are
//! `text/plain`: the stored value, or `true`/`false` for a swap.

use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::cache::{CacheError, CacheStore};
use crate::context::{Context, ParamError};
use crate::router::Router;
use crate::{Response, StatusCode};

/// Route pattern for a single cache entry; `:key` captures the key.
pub const CACHING_PATH: &str = "/caching/:key";

/// Path of the JSON statistics endpoint.
pub const STATS_PATH: &str = "/stats";

#[derive(Debug, Deserialize)]
struct ValueParams {
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapParams {
    old_value: String,
    new_value: String,
}

impl From<ParamError> for Response {
    fn from(err: ParamError) -> Self {
        debug!(error = %err, "rejecting request parameters");
        Response::text(StatusCode::BadRequest, err.to_string())
    }
}

impl From<CacheError> for Response {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::NotFound { .. } => Response::text(StatusCode::NotFound, err.to_string()),
        }
    }
}

/// Builds the routing table for `cache`.
///
/// The store is injected rather than global, so each call gets an independent
/// API over whatever store it is handed.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use kvcache::cache::InMemoryCache;
/// use kvcache::caching;
///
/// let router = caching::routes(Arc::new(InMemoryCache::new()));
/// assert_eq!(router.len(), 5);
/// ```
pub fn routes(cache: Arc<dyn CacheStore>) -> Router {
    let mut router = Router::new();

    let store = Arc::clone(&cache);
    router.post(CACHING_PATH, move |ctx: Context| {
        let cache = Arc::clone(&store);
        async move { respond(handle_store(cache.as_ref(), &ctx)) }
    });

    let fetch = Arc::clone(&cache);
    router.get(CACHING_PATH, move |ctx: Context| {
        let cache = Arc::clone(&fetch);
        async move { respond(handle_fetch(cache.as_ref(), &ctx)) }
    });

    let replace = Arc::clone(&cache);
    router.put(CACHING_PATH, move |ctx: Context| {
        let cache = Arc::clone(&replace);
        async move { respond(handle_replace(cache.as_ref(), &ctx)) }
    });

    let swap = Arc::clone(&cache);
    router.patch(CACHING_PATH, move |ctx: Context| {
        let cache = Arc::clone(&swap);
        async move { respond(handle_swap(cache.as_ref(), &ctx)) }
    });

    router.get(STATS_PATH, move |_ctx: Context| {
        let cache = Arc::clone(&cache);
        async move { Response::json(StatusCode::Ok, &cache.stats()) }
    });

    router
}

fn respond(result: Result<Response, Response>) -> Response {
    result.unwrap_or_else(|err| err)
}

fn handle_store(cache: &dyn CacheStore, ctx: &Context) -> Result<Response, Response> {
    let key = ctx.path_param("key")?;
    let ValueParams { value } = ctx.form()?;
    Ok(Response::text(StatusCode::Ok, cache.store(&key, &value)))
}

fn handle_fetch(cache: &dyn CacheStore, ctx: &Context) -> Result<Response, Response> {
    let key = ctx.path_param("key")?;
    match cache.fetch(&key) {
        Ok(value) => Ok(Response::text(StatusCode::Ok, value)),
        Err(err) => {
            debug!(%key, "fetch of unknown key");
            Err(err.into())
        }
    }
}

fn handle_replace(cache: &dyn CacheStore, ctx: &Context) -> Result<Response, Response> {
    let key = ctx.path_param("key")?;
    let ValueParams { value } = ctx.form()?;
    Ok(Response::text(StatusCode::Ok, cache.replace(&key, &value)))
}

fn handle_swap(cache: &dyn CacheStore, ctx: &Context) -> Result<Response, Response> {
    let key = ctx.path_param("key")?;
    let SwapParams {
        old_value,
        new_value,
    } = ctx.form()?;
    let swapped = cache.compare_and_swap(&key, &old_value, &new_value);
    Ok(Response::text(StatusCode::Ok, swapped.to_string()))
}
