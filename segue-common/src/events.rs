//! Outbound playback events
//!
//! Every notification the playback engine hands back to its host is one of
//! these variants. They are plain data so hosts can log them, forward them
//! or serialize them for another process.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Result;

/// Coarse playback state as seen by the host
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// No session is producing output
    Idle,
    Playing,
    Paused,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
        }
    }
}

/// Playback event types
///
/// Events are delivered in the order the engine processed their causes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlaybackEvent {
    /// A session finished preparing and can be started
    Prepared {
        session_id: Uuid,
        uri: String,
        duration_ms: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Playback state changed (Idle / Playing / Paused)
    PlaybackStateChanged {
        old_state: PlaybackState,
        new_state: PlaybackState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Periodic position tick of the active session
    PositionChanged {
        session_id: Uuid,
        position_ms: u64,
        duration_ms: u64,
        ratio: f32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A track stopped producing output for good (natural end or failure)
    TrackEnded {
        session_id: Uuid,
        uri: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Playback moved on to the recorded next track
    TrackWentToNext {
        session_id: Uuid,
        uri: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A session failed to prepare or play
    TrackFailed {
        session_id: Uuid,
        uri: String,
        what: i32,
        extra: i32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Two sessions started overlapping with inverse volume ramps
    CrossfadeStarted {
        outgoing_session_id: Uuid,
        incoming_session_id: Uuid,
        duration_ms: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The outgoing session of a crossfade was released
    CrossfadeCompleted {
        session_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Engine switched between plain handoff and crossfade
    ModeChanged {
        crossfade_ms: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Engine released every resource it owned
    Released {
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl PlaybackEvent {
    /// Event type name as it appears in the serialized `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            PlaybackEvent::Prepared { .. } => "Prepared",
            PlaybackEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
            PlaybackEvent::PositionChanged { .. } => "PositionChanged",
            PlaybackEvent::TrackEnded { .. } => "TrackEnded",
            PlaybackEvent::TrackWentToNext { .. } => "TrackWentToNext",
            PlaybackEvent::TrackFailed { .. } => "TrackFailed",
            PlaybackEvent::CrossfadeStarted { .. } => "CrossfadeStarted",
            PlaybackEvent::CrossfadeCompleted { .. } => "CrossfadeCompleted",
            PlaybackEvent::ModeChanged { .. } => "ModeChanged",
            PlaybackEvent::Released { .. } => "Released",
        }
    }

    /// Serialize as a single JSON line
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(PlaybackState::Idle.to_string(), "idle");
        assert_eq!(PlaybackState::Playing.to_string(), "playing");
        assert_eq!(PlaybackState::Paused.to_string(), "paused");
    }

    #[test]
    fn test_json_is_tagged_by_type() {
        let event = PlaybackEvent::TrackWentToNext {
            session_id: Uuid::new_v4(),
            uri: "sim://b".to_string(),
            timestamp: crate::time::now(),
        };

        let json = event.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], event.event_type());
        assert_eq!(value["uri"], "sim://b");
    }

    #[test]
    fn test_state_change_serializes_lowercase() {
        let event = PlaybackEvent::PlaybackStateChanged {
            old_state: PlaybackState::Paused,
            new_state: PlaybackState::Playing,
            timestamp: crate::time::now(),
        };

        let value: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["old_state"], "paused");
        assert_eq!(value["new_state"], "playing");
    }
}
