//! Caller commands
//!
//! **Responsibilities:**
//! - Data sources (current and next)
//! - Play, pause, seek, speed and pitch
//! - Transition mode changes and the session rebuild they require
//! - Engine release

use super::core::{Departure, EngineCore, Outgoing};
use super::{EngineMode, PauseOutcome, PlayOutcome, Track};
use crate::config::MIN_VOLUME;
use crate::playback::session::{FadePurpose, TrackSession};
use segue_common::events::PlaybackEvent;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info};

impl EngineCore {
    pub(super) fn set_data_source(&mut self, track: Track, force: bool, reply: oneshot::Sender<bool>) {
        info!("Setting data source {} (force={})", track.uri, force);

        if let Some((_, previous)) = self.source_waiter.take() {
            let _ = previous.send(false);
        }
        self.autoplay = None;
        self.effects.close();

        if let Some(old) = self.current.take() {
            self.resolve_pause_waiters(PauseOutcome::Superseded);
            self.retire(old, force);
        }

        let session = self.new_session(&track);
        self.source_waiter = Some((session.id(), reply));
        self.current = Some(session);
    }

    /// Let a replaced session fade out, or release it at once
    fn retire(&mut self, mut session: TrackSession, immediate: bool) {
        if immediate || !session.is_playing() {
            session.release();
            return;
        }

        let duration = self.mode.fade_duration();
        match session.fade_volume(MIN_VOLUME, duration, FadePurpose::ReleaseWhenSilent) {
            Some(_) => {
                session.release();
            }
            None => {
                debug!("Session {} fading out before release", session.id());
                self.outgoing.push(Outgoing {
                    session,
                    departure: Departure::Replaced,
                });
            }
        }
    }

    pub(super) fn set_next_data_source(&mut self, track: Option<Track>) {
        match &track {
            Some(next) => info!("Next data source: {}", next.uri),
            None => info!("Next data source cleared"),
        }

        let stale_preload = match (&self.preload, &track) {
            (Some(preload), Some(next)) => preload.uri() != next.uri,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if stale_preload {
            if let Some(mut preload) = self.preload.take() {
                debug!("Cancelling preload of {}", preload.uri());
                preload.release();
            }
        }

        self.next_source = track;
        self.maybe_prepare_crossfade();
    }

    pub(super) fn play(&mut self) -> PlayOutcome {
        let (usable, playing) = match &self.current {
            None => return PlayOutcome::NotInitialized,
            Some(session) => (session.is_usable(), session.is_playing()),
        };

        if !usable {
            debug!("Play requested before the session is ready");
            return PlayOutcome::NotInitialized;
        }
        if playing && !self.is_pausing() {
            return PlayOutcome::AlreadyPlaying;
        }

        self.focus.take_restore_on_gain();
        if !self.focus.request() {
            info!("Audio focus denied, playback not started");
            return PlayOutcome::FocusDenied;
        }

        self.start_current();
        info!("Playback started");
        PlayOutcome::Started
    }

    /// Open effects, start the current session and bring it up to its level
    pub(super) fn start_current(&mut self) {
        let fading = self.mode.is_crossfade();
        let duration = self.mode.fade_duration();
        let level = self.target_volume();
        let Some(session) = self.current.as_mut() else {
            return;
        };

        if let Some(id) = session.output_session_id() {
            self.effects.open(id);
        }
        if fading && !session.is_playing() {
            session.set_volume(MIN_VOLUME);
        }
        session.start();
        self.fade_current(level, duration, FadePurpose::Adjust);
    }

    pub(super) fn pause(&mut self, force: bool, reply: Option<oneshot::Sender<PauseOutcome>>) {
        self.focus.take_restore_on_gain();
        self.begin_pause(force, reply);
    }

    /// Fade out (unless forced) and pause once silent
    ///
    /// A crossfade tail keeps its own ramp unless the pause is forced.
    pub(super) fn begin_pause(&mut self, force: bool, reply: Option<oneshot::Sender<PauseOutcome>>) {
        if force {
            self.release_outgoing();
        }

        if !self.is_playing() {
            let outcome = match self.autoplay.take() {
                Some(id) => {
                    debug!("Cancelled autoplay of session {}", id);
                    self.effects.close();
                    self.focus.abandon();
                    PauseOutcome::Paused
                }
                None => PauseOutcome::NotPlaying,
            };
            if let Some(reply) = reply {
                let _ = reply.send(outcome);
            }
            return;
        }

        if let Some(reply) = reply {
            self.pause_waiters.push(reply);
        }
        let duration = if force { Duration::ZERO } else { self.mode.fade_duration() };
        info!("Pausing ({})", if force { "immediately" } else { "after fade out" });
        self.fade_current(MIN_VOLUME, duration, FadePurpose::PauseWhenSilent);
    }

    pub(super) fn seek(&mut self, position_ms: u64, force: bool) -> u64 {
        let Some(session) = self.current.as_mut() else {
            debug!("Seek ignored, no session");
            return 0;
        };
        let position = session.seek(position_ms);
        debug!("Seek to {} ms -> {} ms (force={})", position_ms, position, force);
        position
    }

    pub(super) fn set_speed_pitch(&mut self, speed: f32, pitch: f32) {
        info!("Playback speed {} pitch {}", speed, pitch);
        self.speed = speed;
        self.pitch = pitch;
        for session in self.current.iter_mut().chain(self.preload.iter_mut()) {
            session.set_speed(speed);
            session.set_pitch(pitch);
        }
    }

    /// Apply a crossfade duration; returns true when the strategy changed
    pub(super) fn switch_mode(&mut self, duration_ms: u64) -> bool {
        let requested = EngineMode::from_duration(duration_ms);
        let switched = requested.is_crossfade() != self.mode.is_crossfade();
        self.mode = requested;
        self.config.playback.crossfade_ms = duration_ms;

        if !switched {
            debug!("Crossfade duration {} ms ({})", duration_ms, self.mode);
            return false;
        }

        info!("Switching transition mode to {}", self.mode);
        self.emit(PlaybackEvent::ModeChanged {
            crossfade_ms: duration_ms,
            timestamp: segue_common::time::now(),
        });
        self.rebuild_sessions();
        true
    }

    /// Recreate the current session in place for the new mode
    fn rebuild_sessions(&mut self) {
        self.release_outgoing();
        if let Some(mut preload) = self.preload.take() {
            preload.release();
        }
        let Some(mut old) = self.current.take() else {
            return;
        };

        let pausing = old.fade_purpose() == Some(FadePurpose::PauseWhenSilent);
        let resume = (old.is_playing() && !pausing) || self.autoplay == Some(old.id());
        let position_ms = if old.is_usable() {
            old.position().played_ms
        } else {
            old.pending_seek().unwrap_or(0)
        };
        let track = Track::new(old.uri()).starting_at(position_ms);

        old.release();
        self.effects.close();
        if pausing {
            self.focus.abandon();
        }
        self.resolve_pause_waiters(PauseOutcome::Paused);

        let session = self.new_session(&track);
        let id = session.id();
        if let Some((waiting_for, _)) = self.source_waiter.as_mut() {
            if *waiting_for == old.id() {
                *waiting_for = id;
            }
        }
        self.autoplay = if resume { Some(id) } else { None };

        debug!(
            "Rebuilt session {} as {} at {} ms (resume={})",
            old.id(),
            id,
            position_ms,
            resume
        );
        self.current = Some(session);
    }

    pub(super) fn release(&mut self) {
        info!("Releasing playback engine");

        self.effects.close();
        self.focus.abandon();
        if let Some((_, waiter)) = self.source_waiter.take() {
            let _ = waiter.send(false);
        }
        self.resolve_pause_waiters(PauseOutcome::Superseded);
        self.autoplay = None;

        self.release_outgoing();
        if let Some(mut preload) = self.preload.take() {
            preload.release();
        }
        if let Some(mut current) = self.current.take() {
            current.release();
        }
        self.next_source = None;
        self.device_watcher.unregister();

        self.sync_state();
        self.emit(PlaybackEvent::Released {
            timestamp: segue_common::time::now(),
        });
    }
}
