//! Frameport Render Model
//!
//! Defines the data contracts for export jobs:
//! - **Settings:** Render mode, codec, frame rate, time range, audio, output
//! - **Time:** Reference units (bars, seconds, frames) and range modes
//! - **Quality:** Bits-per-pixel quality levels and output size estimates
//!
//! Everything here is plain data with serde support, so settings can be
//! persisted alongside the application configuration.

pub mod quality;
pub mod settings;
pub mod time;

pub use quality::*;
pub use settings::*;
pub use time::*;
