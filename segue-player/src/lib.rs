//! # Segue Player Library (segue-player)
//!
//! Track-to-track playback engine with gapless handoff and timed crossfades.
//!
//! **Purpose:** Drive an opaque media engine through per-track sessions,
//! ramp volumes, cooperate with audio focus, announce effect sessions and
//! react to output route changes.
//!
//! **Architecture:** One tokio task owns all engine state; commands and
//! platform notifications are messages on a single queue.

pub mod config;
pub mod error;
pub mod playback;

pub use config::PlayerConfig;
pub use error::{Error, Result};
pub use playback::PlaybackEngine;
