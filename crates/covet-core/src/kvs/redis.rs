//! Redis-backed [`Kvs`] implementation.
//!
//! A thin adapter over the `redis` crate's Tokio connection manager: one
//! trait method per server command, with errors mapped into
//! [`Error::Storage`]. Reconnection is handled by the manager itself.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use url::Url;

use crate::error::{Error, Result};

use super::Kvs;

/// A [`Kvs`] backed by a Redis server.
#[derive(Clone)]
pub struct RedisKvs {
    manager: ConnectionManager,
}

impl std::fmt::Debug for RedisKvs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisKvs").finish_non_exhaustive()
    }
}

impl RedisKvs {
    /// Connects to the given server.
    ///
    /// `url` may be a bare `host:port` or a full `redis://` URL; a password
    /// supplied separately overrides one embedded in the URL.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unparseable URL and a storage
    /// error when the initial connection fails.
    pub async fn connect(url: &str, password: Option<&str>) -> Result<Self> {
        let url = Self::normalize_url(url, password)?;
        let client = redis::Client::open(url.as_str())
            .map_err(|e| Error::configuration(format!("invalid redis URL: {e}")))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| Error::storage_with_source("failed to connect to redis", e))?;
        Ok(Self { manager })
    }

    fn normalize_url(url: &str, password: Option<&str>) -> Result<Url> {
        let with_scheme = if url.contains("://") {
            url.to_string()
        } else {
            format!("redis://{url}")
        };
        let mut parsed = Url::parse(&with_scheme)
            .map_err(|e| Error::configuration(format!("invalid redis URL '{url}': {e}")))?;
        if let Some(password) = password {
            if !password.is_empty() {
                parsed
                    .set_password(Some(password))
                    .map_err(|()| Error::configuration("redis URL cannot carry a password"))?;
            }
        }
        Ok(parsed)
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }

    fn command_error(command: &str, error: redis::RedisError) -> Error {
        Error::storage_with_source(format!("redis {command} failed"), error)
    }
}

#[async_trait]
impl Kvs for RedisKvs {
    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn();
        let _pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| Self::command_error("PING", e))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn();
        conn.get(key)
            .await
            .map_err(|e| Self::command_error("GET", e))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn();
        conn.set::<_, _, ()>(key, value)
            .await
            .map_err(|e| Self::command_error("SET", e))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn();
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, seconds)
            .await
            .map_err(|e| Self::command_error("SETEX", e))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn();
        conn.del::<_, i64>(key)
            .await
            .map(|_| ())
            .map_err(|e| Self::command_error("DEL", e))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn();
        conn.exists(key)
            .await
            .map_err(|e| Self::command_error("EXISTS", e))
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut conn = self.conn();
        let seconds: i64 = conn
            .ttl(key)
            .await
            .map_err(|e| Self::command_error("TTL", e))?;
        // -2 means the key is absent, -1 means it carries no expiry.
        if seconds < 0 {
            return Ok(None);
        }
        #[allow(clippy::cast_sign_loss)]
        Ok(Some(Duration::from_secs(seconds as u64)))
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()> {
        let mut conn = self.conn();
        conn.zadd::<_, _, _, i64>(key, member, score)
            .await
            .map(|_| ())
            .map_err(|e| Self::command_error("ZADD", e))
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.conn();
        conn.zrem::<_, _, i64>(key, member)
            .await
            .map(|_| ())
            .map_err(|e| Self::command_error("ZREM", e))
    }

    async fn zcard(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn();
        conn.zcard(key)
            .await
            .map_err(|e| Self::command_error("ZCARD", e))
    }

    async fn zrange_with_scores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>> {
        let mut conn = self.conn();
        conn.zrange_withscores(key, start, stop)
            .await
            .map_err(|e| Self::command_error("ZRANGE", e))
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.conn();
        conn.sadd::<_, _, i64>(key, member)
            .await
            .map(|_| ())
            .map_err(|e| Self::command_error("SADD", e))
    }

    async fn srem(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.conn();
        conn.srem::<_, _, i64>(key, member)
            .await
            .map(|_| ())
            .map_err(|e| Self::command_error("SREM", e))
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn();
        conn.smembers(key)
            .await
            .map_err(|e| Self::command_error("SMEMBERS", e))
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        let mut conn = self.conn();
        conn.incr(key, delta)
            .await
            .map_err(|e| Self::command_error("INCRBY", e))
    }
}
