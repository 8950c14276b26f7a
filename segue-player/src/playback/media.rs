//! Contract with the opaque media engine
//!
//! The player never decodes audio itself. Each track session drives one
//! [`MediaPlayer`] created by a [`MediaBackend`]; readiness, completion and
//! failures come back asynchronously through a [`MediaEventSink`], which tags
//! them with the owning session and posts them onto the engine queue.

use crate::error::Result;
use crate::playback::engine::EngineMessage;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Unspecified player failure (`what`)
pub const MEDIA_ERROR_UNKNOWN: i32 = 1;
/// File or network read failure (`extra`)
pub const MEDIA_ERROR_IO: i32 = -1004;

/// Asynchronous notifications from a media player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaEvent {
    /// Preparation succeeded; the player accepts transport commands
    Prepared,
    /// Natural end of media
    Completed,
    /// Fatal decode or output failure
    Error { what: i32, extra: i32 },
}

/// Delivery channel for one player's events
#[derive(Debug, Clone)]
pub struct MediaEventSink {
    session: Uuid,
    tx: mpsc::UnboundedSender<EngineMessage>,
}

impl MediaEventSink {
    pub(crate) fn new(session: Uuid, tx: mpsc::UnboundedSender<EngineMessage>) -> Self {
        Self { session, tx }
    }

    pub fn session_id(&self) -> Uuid {
        self.session
    }

    /// Post an event; returns false once the engine has stopped
    pub fn emit(&self, event: MediaEvent) -> bool {
        self.tx
            .send(EngineMessage::Media {
                session: self.session,
                event,
            })
            .is_ok()
    }
}

/// One decode/output instance for a single source
///
/// Methods are only called from the engine task. Transport calls made
/// before `Prepared` has been emitted may be ignored by implementations.
pub trait MediaPlayer: Send {
    /// Start asynchronous preparation; emits `Prepared` or `Error`
    fn prepare(&mut self);

    fn play(&mut self);

    fn pause(&mut self);

    fn seek(&mut self, position_ms: u64);

    /// Output level in `[0.0, 1.0]`
    fn set_volume(&mut self, volume: f32);

    /// May be rejected for unsupported parameter combinations
    fn set_speed(&mut self, speed: f32) -> Result<()>;

    fn set_pitch(&mut self, pitch: f32) -> Result<()>;

    fn position_ms(&self) -> u64;

    fn duration_ms(&self) -> u64;

    /// Identifier of the output session, used to attach audio effects
    fn output_session_id(&self) -> Option<i32>;

    /// Stop output and free the instance; no events are emitted afterwards
    fn release(&mut self);
}

/// Factory for media players
pub trait MediaBackend: Send {
    /// Create an unprepared player for `uri`
    fn create(&mut self, uri: &str, events: MediaEventSink) -> Box<dyn MediaPlayer>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_tags_events_with_session() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        let sink = MediaEventSink::new(id, tx);

        assert!(sink.emit(MediaEvent::Error { what: 1, extra: -22 }));
        match rx.try_recv().unwrap() {
            EngineMessage::Media { session, event } => {
                assert_eq!(session, id);
                assert_eq!(event, MediaEvent::Error { what: 1, extra: -22 });
            }
            _ => panic!("expected a media message"),
        }
    }

    #[test]
    fn test_sink_reports_stopped_engine() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = MediaEventSink::new(Uuid::new_v4(), tx);
        drop(rx);
        assert!(!sink.emit(MediaEvent::Completed));
    }
}
