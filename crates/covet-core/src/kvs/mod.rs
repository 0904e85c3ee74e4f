//! Pluggable key-value storage for Covet state.
//!
//! The [`Kvs`] trait covers exactly the primitives the domain needs from a
//! remote key-value server: strings with TTLs, sorted sets scored by due
//! time, plain sets for tenant scoping, and counters.
//!
//! ## Design Principles
//!
//! - **Thin surface**: one method per server command, no query language
//! - **Testability**: [`MemoryKvs`] for tests, [`RedisKvs`] for production
//! - **Tolerant readers**: multi-key writers may be observed mid-write;
//!   readers are expected to treat dangling index entries as skippable

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub use self::memory::MemoryKvs;
pub use self::redis::RedisKvs;

/// Typed operations over a remote key-value server.
///
/// All methods are `Send + Sync` so a single shared handle can serve the
/// HTTP handlers and both background loops concurrently.
#[async_trait]
pub trait Kvs: Send + Sync + 'static {
    /// Checks connectivity to the backing server.
    async fn ping(&self) -> Result<()>;

    // --- Strings ---

    /// Gets a string value; `None` when the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Sets a string value without expiry.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Sets a string value that expires after `ttl`.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Deletes a key. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Returns true when the key exists.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Returns the remaining time to live, `None` when the key is absent or
    /// has no expiry.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;

    // --- Sorted sets ---

    /// Adds or updates a member with the given score.
    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()>;

    /// Removes a member; removing an absent member is not an error.
    async fn zrem(&self, key: &str, member: &str) -> Result<()>;

    /// Returns the cardinality of the sorted set.
    async fn zcard(&self, key: &str) -> Result<u64>;

    /// Returns members with scores over the index range `[start, stop]`,
    /// ascending by score. Negative indexes count from the end, so
    /// `(0, -1)` returns the whole set.
    async fn zrange_with_scores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>>;

    // --- Sets ---

    /// Adds a member to a set.
    async fn sadd(&self, key: &str, member: &str) -> Result<()>;

    /// Removes a member from a set.
    async fn srem(&self, key: &str, member: &str) -> Result<()>;

    /// Returns all members of a set.
    async fn smembers(&self, key: &str) -> Result<Vec<String>>;

    // --- Counters ---

    /// Atomically increments a counter, creating it at zero first.
    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64>;
}
