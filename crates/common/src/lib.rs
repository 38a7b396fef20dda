//! Frameport Common Utilities
//!
//! Shared infrastructure for all Frameport crates:
//! - Error types and result aliases
//! - Clock and duration utilities for export jobs
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
