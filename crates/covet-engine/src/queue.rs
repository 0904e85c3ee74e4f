//! The durable priority queue of pending booking attempts.
//!
//! Three KVS structures per reservation id:
//!
//! 1. `reservation:{id}`: the serialized record
//! 2. `pending_reservations`: sorted set, score = run-time unix millis
//! 3. `reservations_by_owner:{owner_id}`: id set for tenant scoping
//!
//! Writers put the record before its index entries, so no reader can
//! observe an indexed id without a record. Deletes go the other way and are
//! idempotent. Readers treat a dangling index entry (record expired or a
//! half-finished delete) as skippable, reaping it on sight.

use std::sync::Arc;

use covet_core::kvs::Kvs;
use covet_core::{Error, ReservationId, Result};

use crate::reservation::ScheduledReservation;

/// Key prefix for serialized records.
pub const RESERVATION_KEY_PREFIX: &str = "reservation:";
/// The sorted set of pending ids, scored by run time.
pub const PENDING_SET_KEY: &str = "pending_reservations";
/// Key prefix for per-owner id sets.
pub const OWNER_SET_KEY_PREFIX: &str = "reservations_by_owner:";

/// The durable reservation queue.
#[derive(Clone)]
pub struct ReservationQueue {
    kvs: Arc<dyn Kvs>,
}

impl ReservationQueue {
    /// Creates a queue over the given store.
    #[must_use]
    pub fn new(kvs: Arc<dyn Kvs>) -> Self {
        Self { kvs }
    }

    fn record_key(id: &ReservationId) -> String {
        format!("{RESERVATION_KEY_PREFIX}{id}")
    }

    fn owner_key(owner_id: &str) -> String {
        format!("{OWNER_SET_KEY_PREFIX}{owner_id}")
    }

    #[allow(clippy::cast_precision_loss)]
    fn run_time_score(record: &ScheduledReservation) -> f64 {
        record.run_time.timestamp_millis() as f64
    }

    /// Enqueues a record. Re-enqueueing the same id overwrites it.
    ///
    /// # Errors
    ///
    /// Returns a serialization error for an unencodable record and storage
    /// errors from the underlying store.
    pub async fn enqueue(&self, record: &ScheduledReservation) -> Result<()> {
        let payload = serde_json::to_string(record)
            .map_err(|e| Error::serialization(format!("failed to encode reservation: {e}")))?;

        // Record first: the sorted set must never point at nothing.
        self.kvs.set(&Self::record_key(&record.id), &payload).await?;
        self.kvs
            .zadd(
                PENDING_SET_KEY,
                &record.id.to_string(),
                Self::run_time_score(record),
            )
            .await?;
        if record.is_owner_linked() {
            self.kvs
                .sadd(&Self::owner_key(&record.owner_id), &record.id.to_string())
                .await?;
        }
        Ok(())
    }

    /// Fetches a record by id.
    ///
    /// # Errors
    ///
    /// Returns storage errors and a serialization error for an undecodable
    /// record.
    pub async fn get(&self, id: &ReservationId) -> Result<Option<ScheduledReservation>> {
        let Some(payload) = self.kvs.get(&Self::record_key(id)).await? else {
            return Ok(None);
        };
        let record = serde_json::from_str(&payload)
            .map_err(|e| Error::serialization(format!("failed to decode reservation {id}: {e}")))?;
        Ok(Some(record))
    }

    /// Deletes a record and its index entries. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns storage errors from the underlying store.
    pub async fn delete(&self, id: &ReservationId) -> Result<()> {
        // Read the record first so the owner index can be cleaned; a missing
        // record still gets its index entries reaped.
        let record = self.get(id).await.unwrap_or(None);

        self.kvs.zrem(PENDING_SET_KEY, &id.to_string()).await?;
        if let Some(record) = record {
            if record.is_owner_linked() {
                self.kvs
                    .srem(&Self::owner_key(&record.owner_id), &id.to_string())
                    .await?;
            }
        }
        self.kvs.delete(&Self::record_key(id)).await?;
        Ok(())
    }

    /// Returns the pending entry with the smallest run time, or `None`.
    ///
    /// Dangling index entries are logged, reaped, and skipped.
    ///
    /// # Errors
    ///
    /// Returns storage errors from the underlying store.
    pub async fn peek_next(&self) -> Result<Option<ScheduledReservation>> {
        loop {
            let head = self.kvs.zrange_with_scores(PENDING_SET_KEY, 0, 0).await?;
            let Some((member, _)) = head.into_iter().next() else {
                return Ok(None);
            };

            let Ok(id) = member.parse::<ReservationId>() else {
                tracing::warn!(member = %member, "unparseable id in pending set; reaping");
                self.kvs.zrem(PENDING_SET_KEY, &member).await?;
                continue;
            };
            match self.get(&id).await {
                Ok(Some(record)) => return Ok(Some(record)),
                Ok(None) => {
                    tracing::warn!(reservation_id = %id, "pending id has no record; reaping");
                    self.kvs.zrem(PENDING_SET_KEY, &member).await?;
                }
                Err(e) => {
                    tracing::warn!(reservation_id = %id, "undecodable pending record; reaping: {e}");
                    self.kvs.zrem(PENDING_SET_KEY, &member).await?;
                    self.kvs.delete(&Self::record_key(&id)).await?;
                }
            }
        }
    }

    /// Lists every pending record, run time ascending.
    ///
    /// # Errors
    ///
    /// Returns storage errors from the underlying store.
    pub async fn list_all(&self) -> Result<Vec<ScheduledReservation>> {
        let members = self.kvs.zrange_with_scores(PENDING_SET_KEY, 0, -1).await?;
        let mut records = Vec::with_capacity(members.len());
        for (member, _) in members {
            let Ok(id) = member.parse::<ReservationId>() else {
                continue;
            };
            match self.get(&id).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => tracing::warn!(reservation_id = %id, "pending id has no record; skipping"),
                Err(e) => tracing::warn!(reservation_id = %id, "skipping undecodable record: {e}"),
            }
        }
        Ok(records)
    }

    /// Lists an owner's pending records, run time ascending.
    ///
    /// # Errors
    ///
    /// Returns storage errors from the underlying store.
    pub async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<ScheduledReservation>> {
        let members = self.kvs.smembers(&Self::owner_key(owner_id)).await?;
        let mut records = Vec::with_capacity(members.len());
        for member in members {
            let Ok(id) = member.parse::<ReservationId>() else {
                continue;
            };
            match self.get(&id).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {
                    // Executed or cancelled out from under the owner index.
                    self.kvs.srem(&Self::owner_key(owner_id), &member).await?;
                }
                Err(e) => tracing::warn!(reservation_id = %id, "skipping undecodable record: {e}"),
            }
        }
        records.sort_by_key(|record| record.run_time);
        Ok(records)
    }

    /// Returns the number of pending entries.
    ///
    /// # Errors
    ///
    /// Returns storage errors from the underlying store.
    pub async fn count_pending(&self) -> Result<u64> {
        self.kvs.zcard(PENDING_SET_KEY).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use covet_core::kvs::MemoryKvs;

    use crate::reservation::UsageType;

    fn record(run_offset_hours: i64, owner_id: &str) -> ScheduledReservation {
        let now = Utc::now();
        ScheduledReservation {
            id: ReservationId::generate(),
            venue_id: 89607,
            reservation_time: now + Duration::hours(48),
            party_size: 2,
            table_preferences: vec!["dining_room".to_string()],
            auth_token: "tok".to_string(),
            payment_method_id: 5,
            owner_id: owner_id.to_string(),
            usage_type: UsageType::Immediate,
            run_time: now + Duration::hours(run_offset_hours),
            created_at: now,
        }
    }

    fn queue() -> ReservationQueue {
        ReservationQueue::new(Arc::new(MemoryKvs::new()))
    }

    #[tokio::test]
    async fn enqueue_then_get_roundtrips() {
        let queue = queue();
        let record = record(1, "user-1");

        queue.enqueue(&record).await.unwrap();
        let fetched = queue.get(&record.id).await.unwrap().expect("present");
        assert_eq!(fetched, record);
    }

    #[tokio::test]
    async fn peek_returns_the_earliest_run_time() {
        let queue = queue();
        let now = Utc::now();

        let mut r1 = record(0, "");
        r1.run_time = now + Duration::hours(13);
        let mut r2 = record(0, "");
        r2.run_time = now + Duration::hours(12);

        queue.enqueue(&r1).await.unwrap();
        queue.enqueue(&r2).await.unwrap();

        let next = queue.peek_next().await.unwrap().expect("non-empty");
        assert_eq!(next.id, r2.id);
    }

    #[tokio::test]
    async fn peek_on_empty_queue_is_none() {
        assert!(queue().peek_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_removes_all_three_structures() {
        let queue = queue();
        let record = record(1, "user-1");

        queue.enqueue(&record).await.unwrap();
        queue.delete(&record.id).await.unwrap();

        assert!(queue.get(&record.id).await.unwrap().is_none());
        assert_eq!(queue.count_pending().await.unwrap(), 0);
        assert!(queue.list_by_owner("user-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_of_unknown_id_is_a_no_op() {
        let queue = queue();
        queue.delete(&ReservationId::generate()).await.unwrap();
        assert_eq!(queue.count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn duplicate_enqueue_overwrites() {
        let queue = queue();
        let mut record = record(1, "user-1");

        queue.enqueue(&record).await.unwrap();
        record.party_size = 6;
        queue.enqueue(&record).await.unwrap();

        assert_eq!(queue.count_pending().await.unwrap(), 1);
        let fetched = queue.get(&record.id).await.unwrap().expect("present");
        assert_eq!(fetched.party_size, 6);
    }

    #[tokio::test]
    async fn list_by_owner_is_scoped_and_sorted() {
        let queue = queue();
        let a2 = record(2, "alice");
        let a1 = record(1, "alice");
        let b1 = record(1, "bob");

        queue.enqueue(&a2).await.unwrap();
        queue.enqueue(&a1).await.unwrap();
        queue.enqueue(&b1).await.unwrap();

        let listed = queue.list_by_owner("alice").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, a1.id);
        assert_eq!(listed[1].id, a2.id);
    }

    #[tokio::test]
    async fn owner_listing_contains_each_id_exactly_once() {
        let queue = queue();
        let record = record(1, "alice");

        queue.enqueue(&record).await.unwrap();
        queue.enqueue(&record).await.unwrap();

        let listed = queue.list_by_owner("alice").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, record.id);
    }

    #[tokio::test]
    async fn dangling_index_entries_are_reaped_on_peek() {
        let kvs = Arc::new(MemoryKvs::new());
        let queue = ReservationQueue::new(Arc::clone(&kvs) as Arc<dyn Kvs>);

        let ghost = record(0, "");
        let live = record(1, "");
        queue.enqueue(&live).await.unwrap();

        // Simulate a record that expired out from under its index entry.
        kvs.zadd(PENDING_SET_KEY, &ghost.id.to_string(), 0.0)
            .await
            .unwrap();

        let next = queue.peek_next().await.unwrap().expect("live record");
        assert_eq!(next.id, live.id);
        assert_eq!(queue.count_pending().await.unwrap(), 1, "ghost was reaped");
    }

    #[tokio::test]
    async fn execution_order_matches_ascending_run_time() {
        let queue = queue();
        let now = Utc::now();

        let offsets = [5_i64, 1, 3, 2, 4];
        for offset in offsets {
            let mut r = record(0, "");
            r.run_time = now + Duration::hours(offset);
            queue.enqueue(&r).await.unwrap();
        }

        let mut seen = Vec::new();
        while let Some(next) = queue.peek_next().await.unwrap() {
            seen.push(next.run_time);
            queue.delete(&next.id).await.unwrap();
        }
        assert_eq!(seen.len(), 5);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert!(queue.peek_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn count_tracks_enqueues() {
        let queue = queue();
        assert_eq!(queue.count_pending().await.unwrap(), 0);
        for i in 0..3 {
            queue.enqueue(&record(i, "")).await.unwrap();
        }
        assert_eq!(queue.count_pending().await.unwrap(), 3);
    }
}
