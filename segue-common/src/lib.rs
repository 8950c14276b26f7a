//! # Segue Common Library
//!
//! Shared code for the Segue playback crates including:
//! - Error types
//! - Outbound playback event types (PlaybackEvent enum)
//! - Configuration file resolution
//! - Fade curve definitions and calculations
//! - Timestamp and human-readable time helpers

pub mod config;
pub mod error;
pub mod events;
pub mod fade_curves;
pub mod human_time;
pub mod time;

pub use error::{Error, Result};
pub use fade_curves::FadeCurve;
