//! # covet-api
//!
//! HTTP control surface for the Covet reservation sniper.
//!
//! Thin by design: handlers validate input, call into `covet-engine` and
//! `covet-resy`, and map errors onto stable machine-readable codes. All the
//! time-sensitive behavior lives in the engine crates.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod routes;
pub mod server;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use server::AppState;
