//! Status snapshot for diagnostics

use super::core::{Departure, EngineCore};
use super::EngineMode;
use crate::error::{Error, Result};
use crate::playback::focus::FocusState;
use crate::playback::position::PlaybackPosition;
use crate::playback::session::SessionState;
use segue_common::events::PlaybackState;
use serde::Serialize;
use uuid::Uuid;

/// Point-in-time view of the engine
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub mode: EngineMode,
    pub state: PlaybackState,
    pub current_session: Option<Uuid>,
    pub current_uri: Option<String>,
    pub session_state: Option<SessionState>,
    pub position: PlaybackPosition,
    pub volume: f32,
    pub speed: f32,
    pub pitch: f32,
    /// Output session announced to effect processors
    pub audio_session_id: Option<i32>,
    pub focus: FocusState,
    pub next_uri: Option<String>,
    /// Next track already prepared for a crossfade
    pub preloaded: bool,
    /// Crossfade halves still ramping down
    pub fading_out: usize,
    /// Sessions holding a media player
    pub live_sessions: usize,
}

impl EngineStatus {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Common(e.into()))
    }
}

impl EngineCore {
    pub(super) fn status(&self) -> EngineStatus {
        let current = self.current.as_ref();

        EngineStatus {
            mode: self.mode,
            state: self.playback_state(),
            current_session: current.map(|s| s.id()),
            current_uri: current.map(|s| s.uri().to_string()),
            session_state: current.map(|s| s.state()),
            position: current.map_or(PlaybackPosition::ZERO, |s| s.position()),
            volume: current.map_or(0.0, |s| s.volume()),
            speed: current.map_or(self.speed, |s| s.speed()),
            pitch: current.map_or(self.pitch, |s| s.pitch()),
            audio_session_id: self.effects.open_id(),
            focus: self.focus.state(),
            next_uri: self.next_source.as_ref().map(|t| t.uri.clone()),
            preloaded: self.preload.is_some(),
            fading_out: self
                .outgoing
                .iter()
                .filter(|o| o.departure == Departure::Crossfade)
                .count(),
            live_sessions: usize::from(self.current.is_some())
                + usize::from(self.preload.is_some())
                + self.outgoing.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_json_shape() {
        let status = EngineStatus {
            mode: EngineMode::Crossfade { duration_ms: 2000 },
            state: PlaybackState::Playing,
            current_session: Some(Uuid::new_v4()),
            current_uri: Some("sim://a".to_string()),
            session_state: Some(SessionState::Playing),
            position: PlaybackPosition::new(1500, 3000),
            volume: 1.0,
            speed: 1.0,
            pitch: 1.0,
            audio_session_id: Some(1000),
            focus: FocusState::default(),
            next_uri: None,
            preloaded: false,
            fading_out: 0,
            live_sessions: 1,
        };

        let value: serde_json::Value = serde_json::from_str(&status.to_json().unwrap()).unwrap();
        assert_eq!(value["mode"]["mode"], "crossfade");
        assert_eq!(value["mode"]["duration_ms"], 2000);
        assert_eq!(value["state"], "playing");
        assert_eq!(value["session_state"], "playing");
        assert_eq!(value["position"]["played_ms"], 1500);
        assert_eq!(value["audio_session_id"], 1000);
    }
}
