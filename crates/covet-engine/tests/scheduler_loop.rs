//! Scheduler loop behavior against a fake upstream and the in-memory KVS.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use covet_core::kvs::{Kvs, MemoryKvs};
use covet_core::ReservationId;
use covet_engine::{
    CredentialVault, ReservationQueue, ScheduledReservation, Scheduler, UsageReporter, UsageType,
    UserCredentials, WafSessionStore,
};
use covet_resy::ResyClient;

const VAULT_KEY: [u8; 32] = [5u8; 32];

struct Upstream {
    find_calls: Arc<AtomicUsize>,
    book_calls: Arc<AtomicUsize>,
}

async fn spawn_upstream(offer_slots: bool) -> (String, Upstream, oneshot::Sender<()>) {
    let find_calls = Arc::new(AtomicUsize::new(0));
    let book_calls = Arc::new(AtomicUsize::new(0));

    let find_state = Arc::clone(&find_calls);
    let book_state = Arc::clone(&book_calls);

    let app = Router::new()
        .route(
            "/4/find",
            post(move || {
                let find_state = Arc::clone(&find_state);
                async move {
                    find_state.fetch_add(1, Ordering::SeqCst);
                    let venues = if offer_slots {
                        serde_json::json!([{
                            "venue": {"id": {"resy": 89607}},
                            "slots": [{
                                "date": {"start": "2025-06-01 19:00:00"},
                                "config": {"type": "Dining Room", "token": "cfg-19"}
                            }]
                        }])
                    } else {
                        serde_json::json!([])
                    };
                    Json(serde_json::json!({"results": {"venues": venues}}))
                }
            }),
        )
        .route(
            "/3/details",
            post(|| async { Json(serde_json::json!({"book_token": {"value": "tok-X"}})) }),
        )
        .route(
            "/3/book",
            post(move || {
                let book_state = Arc::clone(&book_state);
                async move {
                    book_state.fetch_add(1, Ordering::SeqCst);
                    Json(serde_json::json!({"reservation_id": "RID-7"}))
                }
            }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .expect("serve");
    });

    (
        format!("http://{addr}"),
        Upstream {
            find_calls,
            book_calls,
        },
        shutdown_tx,
    )
}

struct Harness {
    kvs: Arc<MemoryKvs>,
    queue: ReservationQueue,
    cancel: CancellationToken,
    scheduler: Option<Scheduler>,
}

impl Harness {
    /// Builds the engine around a fresh in-memory KVS with "alice" linked.
    /// The scheduler is started separately so tests can enqueue before the
    /// loop first peeks.
    async fn new(base_url: &str) -> Self {
        let kvs = Arc::new(MemoryKvs::new());
        let shared: Arc<dyn Kvs> = Arc::clone(&kvs) as Arc<dyn Kvs>;

        let queue = ReservationQueue::new(Arc::clone(&shared));
        let vault = CredentialVault::new(Arc::clone(&shared), Some(VAULT_KEY));
        vault
            .link(&UserCredentials {
                owner_id: "alice".to_string(),
                auth_token: "tok-alice".to_string(),
                payment_method_id: 42,
            })
            .await
            .expect("link credentials");

        let cancel = CancellationToken::new();
        let scheduler = Scheduler::new(
            queue.clone(),
            vault,
            WafSessionStore::new(Arc::clone(&shared)),
            Arc::new(ResyClient::with_base_url(base_url, "test-key")),
            UsageReporter::new(Arc::clone(&shared), None, None),
            "America/New_York".parse().expect("valid zone"),
            cancel.clone(),
        );

        Self {
            kvs,
            queue,
            cancel,
            scheduler: Some(scheduler),
        }
    }

    fn start(&mut self) -> tokio::task::JoinHandle<()> {
        let scheduler = self.scheduler.take().expect("scheduler not started yet");
        tokio::spawn(scheduler.run())
    }
}

fn reservation(run_time: DateTime<Utc>) -> ScheduledReservation {
    ScheduledReservation {
        id: ReservationId::generate(),
        venue_id: 89607,
        reservation_time: "2025-06-01T23:00:00Z".parse().expect("valid instant"),
        party_size: 2,
        table_preferences: Vec::new(),
        auth_token: String::new(),
        payment_method_id: 0,
        owner_id: "alice".to_string(),
        usage_type: UsageType::Concierge,
        run_time,
        created_at: Utc::now(),
    }
}

async fn wait_until_empty(queue: &ReservationQueue) {
    for _ in 0..200 {
        if queue.count_pending().await.expect("count") == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("queue did not drain in time");
}

#[tokio::test]
async fn due_reservation_is_executed_once_and_deleted() {
    let (base_url, upstream, shutdown) = spawn_upstream(true).await;
    let mut harness = Harness::new(&base_url).await;

    let record = reservation(Utc::now() - ChronoDuration::seconds(1));
    harness.queue.enqueue(&record).await.expect("enqueue");
    let scheduler_handle = harness.start();

    wait_until_empty(&harness.queue).await;
    assert_eq!(upstream.find_calls.load(Ordering::SeqCst), 1);
    assert_eq!(upstream.book_calls.load(Ordering::SeqCst), 1);

    // Success bumped the owner's monthly counter.
    let counter = harness
        .kvs
        .get(&UsageReporter::monthly_key("alice"))
        .await
        .expect("get counter");
    assert_eq!(counter.as_deref(), Some("1"));

    harness.cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), scheduler_handle)
        .await
        .expect("scheduler stops within the grace window")
        .expect("scheduler task completes");
    let _ = shutdown.send(());
}

#[tokio::test]
async fn failed_attempt_still_deletes_the_entry() {
    let (base_url, upstream, shutdown) = spawn_upstream(false).await;
    let mut harness = Harness::new(&base_url).await;

    let record = reservation(Utc::now() - ChronoDuration::seconds(1));
    harness.queue.enqueue(&record).await.expect("enqueue");
    let scheduler_handle = harness.start();

    wait_until_empty(&harness.queue).await;
    assert_eq!(upstream.find_calls.load(Ordering::SeqCst), 1);
    assert_eq!(upstream.book_calls.load(Ordering::SeqCst), 0);

    // One shot only: no retry, no counter bump.
    let counter = harness
        .kvs
        .get(&UsageReporter::monthly_key("alice"))
        .await
        .expect("get counter");
    assert_eq!(counter, None);

    harness.cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), scheduler_handle)
        .await
        .expect("scheduler stops")
        .expect("scheduler task completes");
    let _ = shutdown.send(());
}

#[tokio::test]
async fn cancel_before_due_time_wins_the_race() {
    let (base_url, upstream, shutdown) = spawn_upstream(true).await;
    let mut harness = Harness::new(&base_url).await;

    // Due well in the future; the scheduler parks in a bounded sleep.
    let record = reservation(Utc::now() + ChronoDuration::seconds(45));
    harness.queue.enqueue(&record).await.expect("enqueue");
    let scheduler_handle = harness.start();

    // Give the scheduler a moment to observe the pending entry.
    tokio::time::sleep(Duration::from_millis(200)).await;

    harness.queue.delete(&record.id).await.expect("cancel");
    assert_eq!(harness.queue.count_pending().await.expect("count"), 0);

    harness.cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), scheduler_handle)
        .await
        .expect("scheduler stops")
        .expect("scheduler task completes");

    assert_eq!(
        upstream.find_calls.load(Ordering::SeqCst),
        0,
        "a cancelled reservation is never executed"
    );
    let _ = shutdown.send(());
}
