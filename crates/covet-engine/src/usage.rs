//! Usage accounting for fired reservations.
//!
//! Two sinks, both best-effort: a per-owner monthly counter in the KVS and
//! an HTTP callback to the accounting collaborator. Neither may fail a
//! booking that already succeeded.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use covet_core::kvs::Kvs;

use crate::reservation::ScheduledReservation;

/// Key prefix for per-owner monthly usage counters.
pub const USAGE_KEY_PREFIX: &str = "usage:";

const CALLBACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Reports successful executions to the accounting collaborator.
#[derive(Clone)]
pub struct UsageReporter {
    kvs: Arc<dyn Kvs>,
    callback_url: Option<String>,
    internal_token: Option<String>,
    http: reqwest::Client,
}

impl UsageReporter {
    /// Creates a reporter. Without a callback URL only the local counter
    /// is maintained.
    #[must_use]
    pub fn new(
        kvs: Arc<dyn Kvs>,
        callback_url: Option<String>,
        internal_token: Option<String>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(CALLBACK_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            kvs,
            callback_url: callback_url.map(|url| url.trim_end_matches('/').to_string()),
            internal_token,
            http,
        }
    }

    /// Returns the counter key for an owner in the current month.
    #[must_use]
    pub fn monthly_key(owner_id: &str) -> String {
        format!("{USAGE_KEY_PREFIX}{owner_id}:{}", Utc::now().format("%Y-%m"))
    }

    /// Records a successful execution. Best-effort: every failure is
    /// logged and swallowed.
    pub async fn record_success(&self, reservation: &ScheduledReservation) {
        if !reservation.is_owner_linked() {
            return;
        }

        if let Err(e) = self
            .kvs
            .incr_by(&Self::monthly_key(&reservation.owner_id), 1)
            .await
        {
            tracing::warn!(owner_id = %reservation.owner_id, "failed to bump usage counter: {e}");
        }

        let Some(base) = self.callback_url.as_deref() else {
            tracing::debug!("usage callback skipped: no accounting URL configured");
            return;
        };
        let Some(token) = self.internal_token.as_deref() else {
            tracing::warn!("usage callback skipped: internal token not configured");
            return;
        };

        let payload = serde_json::json!({
            "ownerId": reservation.owner_id,
            "type": reservation.usage_type.as_str(),
        });
        let result = self
            .http
            .post(format!("{base}/api/internal/usage"))
            .header("X-Internal-Token", token)
            .json(&payload)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => tracing::warn!(
                status = response.status().as_u16(),
                "usage callback rejected"
            ),
            Err(e) => tracing::warn!("usage callback failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use covet_core::kvs::MemoryKvs;
    use covet_core::ReservationId;

    use crate::reservation::UsageType;

    fn reservation(owner_id: &str) -> ScheduledReservation {
        let now = Utc::now();
        ScheduledReservation {
            id: ReservationId::generate(),
            venue_id: 89607,
            reservation_time: now + ChronoDuration::hours(24),
            party_size: 2,
            table_preferences: Vec::new(),
            auth_token: String::new(),
            payment_method_id: 0,
            owner_id: owner_id.to_string(),
            usage_type: UsageType::Concierge,
            run_time: now,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn counter_is_bumped_for_owner_linked_rows() {
        let kvs = Arc::new(MemoryKvs::new());
        let reporter = UsageReporter::new(Arc::clone(&kvs) as Arc<dyn Kvs>, None, None);

        reporter.record_success(&reservation("alice")).await;
        reporter.record_success(&reservation("alice")).await;

        let count = kvs
            .get(&UsageReporter::monthly_key("alice"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(count, "2");
    }

    #[tokio::test]
    async fn legacy_rows_are_not_counted() {
        let kvs = Arc::new(MemoryKvs::new());
        let reporter = UsageReporter::new(Arc::clone(&kvs) as Arc<dyn Kvs>, None, None);

        reporter.record_success(&reservation("")).await;
        assert!(kvs
            .get(&UsageReporter::monthly_key(""))
            .await
            .unwrap()
            .is_none());
    }
}
