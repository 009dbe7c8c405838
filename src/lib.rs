//! # kvcache
//!
//! An in-memory key/value cache served over HTTP/1.1.
//!
//! Entries live under `/caching/{key}`: `POST` stores, `GET` fetches, `PUT`
//! replaces and `PATCH` compare-and-swaps. The store is an ordinary value
//! handed to [`caching::routes`], so tests and embedders can run as many
//! isolated instances as they like.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kvcache::cache::InMemoryCache;
//! use kvcache::caching;
//! use kvcache::middleware::{LoggerMiddleware, Pipeline};
//! use kvcache::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = Pipeline::new(caching::routes(Arc::new(InMemoryCache::new())))
//!         .with(Arc::new(LoggerMiddleware));
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     server
//!         .run(move |req| {
//!             let pipeline = pipeline.clone();
//!             async move { pipeline.handle(req).await }
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```

// ── Core ──────────────────────────────────────────────────────────────────────
pub mod cache;
pub mod caching;

// ── HTTP transport ────────────────────────────────────────────────────────────
pub mod context;
pub mod http;
pub mod middleware;
pub mod router;
pub mod server;

pub mod config;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use cache::{CacheError, CacheStats, CacheStore, InMemoryCache};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::Router;
pub use server::{Server, ServerError};
