//! # covet-engine
//!
//! Domain engine for the Covet reservation sniper.
//!
//! This crate owns the time-sensitive execution path:
//!
//! - **Reservation queue**: a durable priority queue of pending booking
//!   attempts keyed by run time
//! - **Credential vault**: sealed per-user upstream credentials with
//!   transparent legacy migration
//! - **WAF session store**: per-venue cookie artifacts with TTLs
//! - **Booking-window resolver**: cached inference of when a venue releases
//!   its target date, and the run-time arithmetic built on it
//! - **Scheduler**: the single-leader loop that fires due attempts
//! - **Cookie refresher**: the background loop that keeps WAF sessions warm
//!
//! Every store runs over the [`covet_core::kvs::Kvs`] abstraction, so the
//! whole engine is exercised in tests against the in-memory backend.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod cookies;
pub mod queue;
pub mod refresher;
pub mod reservation;
pub mod scheduler;
pub mod scrape;
pub mod usage;
pub mod vault;
pub mod venues;
pub mod window;

pub use cookies::{WafSession, WafSessionStore};
pub use queue::ReservationQueue;
pub use refresher::CookieRefresher;
pub use reservation::{ScheduledReservation, UsageType};
pub use scheduler::Scheduler;
pub use scrape::{CookieHarvest, PageSnapshot, RemoteVenueScraper, VenueScraper};
pub use usage::UsageReporter;
pub use vault::{CredentialVault, UserCredentials};
pub use venues::{Venue, VenueDirectory};
pub use window::{BookingWindow, WindowResolver};
