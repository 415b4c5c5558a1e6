//! Maven Proxy - Backend Library
//!
//! Managed Maven repositories backed by ordered remote connectors, with
//! download policies, atomic commits into local storage and snapshot
//! retention purging.

#[macro_use]
mod macros;

pub mod cli;
pub mod config;
pub mod error;
pub mod formats;
pub mod models;
pub mod services;
pub mod storage;
pub mod telemetry;

pub use config::Config;
pub use error::{AppError, Result};
