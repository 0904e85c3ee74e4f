//! In-memory [`Kvs`] implementation for tests and debug deployments.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{Error, Result};

use super::Kvs;

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Zset(BTreeMap<String, f64>),
    Set(HashSet<String>),
}

impl Value {
    const fn kind(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::Zset(_) => "zset",
            Self::Set(_) => "set",
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// An in-memory key-value store with lazy TTL expiry.
///
/// Semantics mirror the Redis backend closely enough that every store-level
/// test runs against this implementation.
#[derive(Debug, Default)]
pub struct MemoryKvs {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryKvs {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn wrong_type(key: &str, found: &'static str, wanted: &'static str) -> Error {
        Error::storage(format!(
            "WRONGTYPE key {key} holds a {found}, operation expects a {wanted}"
        ))
    }

    /// Removes the entry when expired, returning whether it remains live.
    fn purge_expired(entries: &mut HashMap<String, Entry>, key: &str) -> bool {
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                false
            }
            Some(_) => true,
            None => false,
        }
    }
}

#[async_trait]
impl Kvs for MemoryKvs {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.write().await;
        if !Self::purge_expired(&mut entries, key) {
            return Ok(None);
        }
        match &entries[key].value {
            Value::Str(s) => Ok(Some(s.clone())),
            other => Err(Self::wrong_type(key, other.kind(), "string")),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.write().await;
        Ok(Self::purge_expired(&mut entries, key))
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut entries = self.entries.write().await;
        if !Self::purge_expired(&mut entries, key) {
            return Ok(None);
        }
        let now = Instant::now();
        Ok(entries[key]
            .expires_at
            .map(|at| at.saturating_duration_since(now)))
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()> {
        let mut entries = self.entries.write().await;
        Self::purge_expired(&mut entries, key);
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Zset(BTreeMap::new()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::Zset(members) => {
                members.insert(member.to_string(), score);
                Ok(())
            }
            other => Err(Self::wrong_type(key, other.kind(), "zset")),
        }
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        if !Self::purge_expired(&mut entries, key) {
            return Ok(());
        }
        match &mut entries.get_mut(key).expect("entry is live").value {
            Value::Zset(members) => {
                members.remove(member);
                Ok(())
            }
            other => Err(Self::wrong_type(key, other.kind(), "zset")),
        }
    }

    async fn zcard(&self, key: &str) -> Result<u64> {
        let mut entries = self.entries.write().await;
        if !Self::purge_expired(&mut entries, key) {
            return Ok(0);
        }
        match &entries[key].value {
            Value::Zset(members) => Ok(members.len() as u64),
            other => Err(Self::wrong_type(key, other.kind(), "zset")),
        }
    }

    async fn zrange_with_scores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>> {
        let mut entries = self.entries.write().await;
        if !Self::purge_expired(&mut entries, key) {
            return Ok(Vec::new());
        }
        let members = match &entries[key].value {
            Value::Zset(members) => members,
            other => return Err(Self::wrong_type(key, other.kind(), "zset")),
        };

        let mut ordered: Vec<(String, f64)> = members
            .iter()
            .map(|(member, score)| (member.clone(), *score))
            .collect();
        ordered.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        let len = ordered.len() as isize;
        let resolve = |index: isize| -> isize {
            if index < 0 {
                len + index
            } else {
                index
            }
        };
        let start = resolve(start).max(0);
        let stop = resolve(stop).min(len - 1);
        if start > stop || len == 0 {
            return Ok(Vec::new());
        }

        #[allow(clippy::cast_sign_loss)]
        Ok(ordered[start as usize..=stop as usize].to_vec())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        Self::purge_expired(&mut entries, key);
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Set(HashSet::new()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::Set(members) => {
                members.insert(member.to_string());
                Ok(())
            }
            other => Err(Self::wrong_type(key, other.kind(), "set")),
        }
    }

    async fn srem(&self, key: &str, member: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        if !Self::purge_expired(&mut entries, key) {
            return Ok(());
        }
        match &mut entries.get_mut(key).expect("entry is live").value {
            Value::Set(members) => {
                members.remove(member);
                Ok(())
            }
            other => Err(Self::wrong_type(key, other.kind(), "set")),
        }
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let mut entries = self.entries.write().await;
        if !Self::purge_expired(&mut entries, key) {
            return Ok(Vec::new());
        }
        match &entries[key].value {
            Value::Set(members) => Ok(members.iter().cloned().collect()),
            other => Err(Self::wrong_type(key, other.kind(), "set")),
        }
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        let mut entries = self.entries.write().await;
        Self::purge_expired(&mut entries, key);
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Str("0".to_string()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::Str(raw) => {
                let current: i64 = raw.parse().map_err(|_| {
                    Error::storage(format!("key {key} holds a non-integer value"))
                })?;
                let next = current + delta;
                *raw = next.to_string();
                Ok(next)
            }
            other => Err(Self::wrong_type(key, other.kind(), "string")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn string_roundtrip_and_delete() {
        let kvs = MemoryKvs::new();
        kvs.set("k", "v").await.unwrap();
        assert_eq!(kvs.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(kvs.exists("k").await.unwrap());

        kvs.delete("k").await.unwrap();
        assert_eq!(kvs.get("k").await.unwrap(), None);
        assert!(!kvs.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn ttl_expires_values() {
        let kvs = MemoryKvs::new();
        kvs.set_with_ttl("k", "v", Duration::from_millis(10))
            .await
            .unwrap();
        assert!(kvs.ttl("k").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(kvs.get("k").await.unwrap(), None);
        assert_eq!(kvs.ttl("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn persistent_key_has_no_ttl() {
        let kvs = MemoryKvs::new();
        kvs.set("k", "v").await.unwrap();
        assert_eq!(kvs.ttl("k").await.unwrap(), None);
        assert!(kvs.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn zrange_orders_by_score_ascending() {
        let kvs = MemoryKvs::new();
        kvs.zadd("q", "c", 3.0).await.unwrap();
        kvs.zadd("q", "a", 1.0).await.unwrap();
        kvs.zadd("q", "b", 2.0).await.unwrap();

        let all = kvs.zrange_with_scores("q", 0, -1).await.unwrap();
        let members: Vec<&str> = all.iter().map(|(m, _)| m.as_str()).collect();
        assert_eq!(members, vec!["a", "b", "c"]);

        let first = kvs.zrange_with_scores("q", 0, 0).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].0, "a");

        assert_eq!(kvs.zcard("q").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn zadd_updates_existing_member_score() {
        let kvs = MemoryKvs::new();
        kvs.zadd("q", "a", 5.0).await.unwrap();
        kvs.zadd("q", "a", 1.0).await.unwrap();

        assert_eq!(kvs.zcard("q").await.unwrap(), 1);
        let all = kvs.zrange_with_scores("q", 0, -1).await.unwrap();
        assert!((all[0].1 - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn set_membership() {
        let kvs = MemoryKvs::new();
        kvs.sadd("s", "x").await.unwrap();
        kvs.sadd("s", "y").await.unwrap();
        kvs.sadd("s", "x").await.unwrap();

        let mut members = kvs.smembers("s").await.unwrap();
        members.sort();
        assert_eq!(members, vec!["x", "y"]);

        kvs.srem("s", "x").await.unwrap();
        assert_eq!(kvs.smembers("s").await.unwrap(), vec!["y"]);
    }

    #[tokio::test]
    async fn counter_increments_from_zero() {
        let kvs = MemoryKvs::new();
        assert_eq!(kvs.incr_by("c", 1).await.unwrap(), 1);
        assert_eq!(kvs.incr_by("c", 2).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn type_mismatch_is_an_error() {
        let kvs = MemoryKvs::new();
        kvs.set("k", "v").await.unwrap();
        let err = kvs.zadd("k", "m", 1.0).await.unwrap_err();
        assert!(err.to_string().contains("WRONGTYPE"));
    }

    #[tokio::test]
    async fn range_on_missing_key_is_empty() {
        let kvs = MemoryKvs::new();
        assert!(kvs.zrange_with_scores("missing", 0, -1).await.unwrap().is_empty());
        assert_eq!(kvs.zcard("missing").await.unwrap(), 0);
        assert!(kvs.smembers("missing").await.unwrap().is_empty());
    }
}
