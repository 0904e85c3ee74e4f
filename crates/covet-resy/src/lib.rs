//! # covet-resy
//!
//! Upstream protocol client for the Resy booking platform.
//!
//! A booking attempt is a three-call handshake executed behind Imperva's
//! bot-mitigation WAF: FIND locates the day's slots, DETAIL exchanges a
//! slot's config token for a book token, and BOOK commits it. Every call is
//! wrapped in challenge detection: a challenged response has its cookies
//! absorbed into the attempt's jar and is replayed within a small budget.
//!
//! The client is deliberately stateless across attempts: each attempt owns
//! its own [`session::WafJar`], loaded from whatever session artifacts the
//! caller has persisted.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod client;
pub mod error;
pub mod session;
pub mod types;

pub use client::ResyClient;
pub use error::{Result, Step, UpstreamError};
pub use session::{WafCookie, WafJar};
