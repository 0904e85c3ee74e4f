//! The single-leader scheduler loop.
//!
//! One cooperative task per deployment: peek the earliest pending
//! reservation, sleep until it is due (capped so shutdown stays
//! responsive), execute the booking attempt, and destroy the entry whatever
//! the outcome. The loop never retries a reservation; each row gets exactly
//! one shot.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use chrono_tz::Tz;
use covet_resy::types::ReserveParams;
use covet_resy::{ResyClient, WafJar};
use tokio_util::sync::CancellationToken;

use crate::cookies::WafSessionStore;
use crate::queue::ReservationQueue;
use crate::reservation::ScheduledReservation;
use crate::usage::UsageReporter;
use crate::vault::CredentialVault;

/// Upper bound on any single sleep, so a shutdown signal is observed
/// within this window.
pub const MAX_SLEEP: Duration = Duration::from_secs(30);

/// The scheduler task.
pub struct Scheduler {
    queue: ReservationQueue,
    vault: CredentialVault,
    sessions: WafSessionStore,
    client: Arc<ResyClient>,
    usage: UsageReporter,
    timezone: Tz,
    cancel: CancellationToken,
}

impl Scheduler {
    /// Creates a scheduler.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: ReservationQueue,
        vault: CredentialVault,
        sessions: WafSessionStore,
        client: Arc<ResyClient>,
        usage: UsageReporter,
        timezone: Tz,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            queue,
            vault,
            sessions,
            client,
            usage,
            timezone,
            cancel,
        }
    }

    /// Runs until the cancellation token fires.
    ///
    /// Errors inside an iteration are logged and the loop continues; the
    /// scheduler never crashes the process.
    pub async fn run(self) {
        tracing::info!("scheduler started");
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let next = match self.queue.peek_next().await {
                Ok(next) => next,
                Err(e) => {
                    tracing::error!("failed to peek pending reservations: {e}");
                    if self.sleep_or_cancelled(MAX_SLEEP).await {
                        break;
                    }
                    continue;
                }
            };

            let Some(reservation) = next else {
                if self.sleep_or_cancelled(MAX_SLEEP).await {
                    break;
                }
                continue;
            };

            let now = Utc::now();
            if reservation.run_time > now {
                let until_due = (reservation.run_time - now)
                    .to_std()
                    .unwrap_or(MAX_SLEEP)
                    .min(MAX_SLEEP);
                if self.sleep_or_cancelled(until_due).await {
                    break;
                }
                continue;
            }

            self.execute(reservation).await;
        }
        tracing::info!("scheduler stopped");
    }

    /// Sleeps for `duration` unless cancelled first; returns true on
    /// cancellation.
    async fn sleep_or_cancelled(&self, duration: Duration) -> bool {
        tokio::select! {
            () = self.cancel.cancelled() => true,
            () = tokio::time::sleep(duration) => false,
        }
    }

    /// Executes one due reservation and deletes it regardless of outcome.
    async fn execute(&self, reservation: ScheduledReservation) {
        tracing::info!(
            reservation_id = %reservation.id,
            venue_id = reservation.venue_id,
            "attempting scheduled reservation"
        );

        let credentials = if reservation.is_owner_linked() {
            match self.vault.get(&reservation.owner_id).await {
                Ok(credentials) => (credentials.auth_token, credentials.payment_method_id),
                Err(e) => {
                    tracing::warn!(
                        reservation_id = %reservation.id,
                        owner_id = %reservation.owner_id,
                        "cannot resolve credentials, dropping reservation: {e}"
                    );
                    self.remove(&reservation).await;
                    return;
                }
            }
        } else {
            (
                reservation.auth_token.clone(),
                reservation.payment_method_id,
            )
        };

        let mut jar = match self.sessions.load(reservation.venue_id).await {
            Ok(Some(session)) => WafJar::from_session(session.cookies, session.user_agent),
            Ok(None) => {
                tracing::debug!(
                    venue_id = reservation.venue_id,
                    "no WAF session on file; proceeding without cookies"
                );
                WafJar::new()
            }
            Err(e) => {
                tracing::warn!(
                    venue_id = reservation.venue_id,
                    "failed to load WAF session; proceeding without cookies: {e}"
                );
                WafJar::new()
            }
        };

        let params = ReserveParams {
            venue_id: reservation.venue_id,
            reservation_time: reservation.reservation_time,
            party_size: reservation.party_size,
            table_preferences: reservation.table_preferences.clone(),
            auth_token: credentials.0,
            payment_method_id: credentials.1,
            timezone: self.timezone,
        };

        match self.client.reserve(&mut jar, &params).await {
            Ok(outcome) => {
                tracing::info!(
                    reservation_id = %reservation.id,
                    booked_for = %outcome.reservation_time,
                    "scheduled reservation booked"
                );
                self.usage.record_success(&reservation).await;
            }
            Err(e) => {
                tracing::warn!(
                    reservation_id = %reservation.id,
                    "scheduled reservation failed: {e}"
                );
            }
        }

        self.remove(&reservation).await;
    }

    async fn remove(&self, reservation: &ScheduledReservation) {
        if let Err(e) = self.queue.delete(&reservation.id).await {
            tracing::error!(
                reservation_id = %reservation.id,
                "failed to delete executed reservation: {e}"
            );
        }
    }
}
