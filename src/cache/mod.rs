//! The key/value cache: the authoritative key→value mapping behind the HTTP API.
//!
//! Four operations, each with fixed semantics:
//!
//! | Operation            | Absent key                | Present key                     |
//! |----------------------|---------------------------|---------------------------------|
//! | `store`              | creates                   | overwrites                      |
//! | `fetch`              | [`CacheError::NotFound`]  | returns the value               |
//! | `replace`            | creates                   | overwrites                      |
//! | `compare_and_swap`   | `false`                   | swaps iff value equals expected |
//!
//! No operation ever removes a key.

use serde::Serialize;
use thiserror::Error;

mod memory;

pub use memory::InMemoryCache;

/// Errors returned by cache lookups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("no entry for key `{key}`")]
    NotFound { key: String },
}

/// Point-in-time counters for a cache instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of keys currently held.
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub replaces: u64,
    pub swaps_succeeded: u64,
    /// Includes swaps against keys that do not exist.
    pub swaps_failed: u64,
}

/// A thread-safe key/value store.
///
/// The HTTP adapter holds one behind an `Arc<dyn CacheStore>`, so every
/// implementation must be callable concurrently from many tasks. Mutations of
/// the same key must never interleave, and `compare_and_swap` must be atomic
/// with respect to every other operation on that key.
pub trait CacheStore: Send + Sync + 'static {
    /// Creates or overwrites `key`, returning the stored value.
    fn store(&self, key: &str, value: &str) -> String;

    /// Returns the current value of `key`.
    ///
    /// # Errors
    ///
    /// [`CacheError::NotFound`] if `key` was never stored.
    fn fetch(&self, key: &str) -> Result<String, CacheError>;

    /// Sets `key` to `value` whether or not it exists, returning the new value.
    fn replace(&self, key: &str, value: &str) -> String;

    /// Installs `new` if `key` exists and currently equals `expected`.
    ///
    /// Returns `false`, leaving the entry untouched, on a mismatch or when
    /// `key` is absent.
    fn compare_and_swap(&self, key: &str, expected: &str, new: &str) -> bool;

    fn stats(&self) -> CacheStats;
}
