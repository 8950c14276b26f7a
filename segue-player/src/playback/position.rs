//! Playback position of a single session

use serde::{Deserialize, Serialize};

/// Played and total time of a session, in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackPosition {
    pub played_ms: u64,
    pub total_ms: u64,
}

impl PlaybackPosition {
    pub const ZERO: PlaybackPosition = PlaybackPosition { played_ms: 0, total_ms: 0 };

    pub fn new(played_ms: u64, total_ms: u64) -> Self {
        Self { played_ms, total_ms }
    }

    /// Fraction played; 0 when the total is unknown
    pub fn ratio(&self) -> f32 {
        let ratio = self.played_ms as f32 / self.total_ms as f32;
        if ratio.is_finite() {
            ratio
        } else {
            0.0
        }
    }

    /// Time left until the end of the media
    pub fn remaining_ms(&self) -> u64 {
        self.total_ms.saturating_sub(self.played_ms)
    }
}
