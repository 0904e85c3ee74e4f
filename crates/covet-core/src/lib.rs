//! # covet-core
//!
//! Shared foundation for the Covet reservation sniper.
//!
//! This crate provides the pieces every other Covet crate builds on:
//!
//! - **Errors**: the shared [`Error`] enum and [`Result`] alias
//! - **Identifiers**: strongly-typed, ULID-backed [`ReservationId`]
//! - **Key-value storage**: the [`kvs::Kvs`] trait with an in-memory backend
//!   for tests and a Redis backend for production
//! - **Sealing**: versioned AEAD encryption for credentials at rest
//! - **Observability**: tracing initialization and the bounded in-memory
//!   log ring served by the control surface

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod crypto;
pub mod error;
pub mod id;
pub mod kvs;
pub mod observability;

pub use error::{Error, Result};
pub use id::ReservationId;
