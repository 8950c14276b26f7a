//! Session events, track boundaries and crossfades
//!
//! **Responsibilities:**
//! - Routing media events and ticks to the session they belong to
//! - Track-boundary handoff to the recorded next source
//! - Crossfade preparation, start and completion
//! - Follow-up work once a fade completes

use super::core::{Departure, EngineCore, Outgoing};
use super::{EngineMode, PauseOutcome};
use crate::config::MIN_VOLUME;
use crate::playback::media::MediaEvent;
use crate::playback::session::{FadePurpose, TrackSession};
use segue_common::events::PlaybackEvent;
use segue_common::time::{duration_to_millis, now};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

impl EngineCore {
    pub(super) fn on_media_event(&mut self, session: Uuid, event: MediaEvent) {
        if self.current.as_ref().map_or(false, |s| s.id() == session) {
            self.on_current_event(event);
        } else if self.preload.as_ref().map_or(false, |s| s.id() == session) {
            self.on_preload_event(event);
        } else if let Some(index) = self.outgoing.iter().position(|o| o.session.id() == session) {
            self.on_outgoing_event(index, event);
        } else {
            debug!("Dropping {:?} for released session {}", event, session);
        }
    }

    fn on_current_event(&mut self, event: MediaEvent) {
        let Some(current) = self.current.as_mut() else {
            return;
        };
        let id = current.id();

        match event {
            MediaEvent::Prepared => {
                if !current.on_prepared() {
                    return;
                }
                let duration_ms = current.position().total_ms;
                info!("Session {} ready: {} ({} ms)", id, current.uri(), duration_ms);
                let prepared = PlaybackEvent::Prepared {
                    session_id: id,
                    uri: current.uri().to_string(),
                    duration_ms,
                    timestamp: now(),
                };
                self.emit(prepared);
                self.resolve_source_waiter(id, true);

                if self.autoplay == Some(id) {
                    self.autoplay = None;
                    self.start_current();
                }
            }
            MediaEvent::Completed => {
                if current.on_completed() {
                    info!("Track finished: {}", current.uri());
                    self.finish_current();
                }
            }
            MediaEvent::Error { what, extra } => {
                if current.on_error(what, extra) {
                    let failed = PlaybackEvent::TrackFailed {
                        session_id: id,
                        uri: current.uri().to_string(),
                        what,
                        extra,
                        timestamp: now(),
                    };
                    self.emit(failed);
                    self.resolve_source_waiter(id, false);
                    self.finish_current();
                }
            }
        }
    }

    fn on_preload_event(&mut self, event: MediaEvent) {
        let Some(preload) = self.preload.as_mut() else {
            return;
        };

        match event {
            MediaEvent::Prepared => {
                if preload.on_prepared() {
                    let prepared = PlaybackEvent::Prepared {
                        session_id: preload.id(),
                        uri: preload.uri().to_string(),
                        duration_ms: preload.position().total_ms,
                        timestamp: now(),
                    };
                    self.emit(prepared);
                    self.maybe_start_crossfade();
                }
            }
            MediaEvent::Completed => {
                debug!("Ignoring completion of unstarted session {}", preload.id());
            }
            MediaEvent::Error { what, extra } => {
                preload.on_error(what, extra);
                let failed = PlaybackEvent::TrackFailed {
                    session_id: preload.id(),
                    uri: preload.uri().to_string(),
                    what,
                    extra,
                    timestamp: now(),
                };
                warn!("Next track {} failed to prepare", preload.uri());
                if let Some(mut preload) = self.preload.take() {
                    preload.release();
                }
                self.next_source = None;
                self.emit(failed);
            }
        }
    }

    fn on_outgoing_event(&mut self, index: usize, event: MediaEvent) {
        match event {
            MediaEvent::Prepared => {}
            MediaEvent::Completed | MediaEvent::Error { .. } => {
                let outgoing = self.outgoing.remove(index);
                debug!("Outgoing session {} ended during fade", outgoing.session.id());
                self.finish_outgoing(outgoing);
            }
        }
    }

    /// The current session ended or failed: report it and move on
    pub(super) fn finish_current(&mut self) {
        let Some(mut finished) = self.current.take() else {
            return;
        };
        let finished_id = finished.id();
        if self.autoplay == Some(finished_id) {
            self.autoplay = None;
        }

        self.emit(PlaybackEvent::TrackEnded {
            session_id: finished_id,
            uri: finished.uri().to_string(),
            timestamp: now(),
        });
        finished.release();
        self.effects.close();
        self.resolve_pause_waiters(PauseOutcome::Paused);

        if let Some(preload) = self.preload.take() {
            self.next_source = None;
            self.promote(preload);
        } else if let Some(next) = self.next_source.take() {
            let session = self.new_session(&next);
            self.promote(session);
        } else {
            info!("Nothing left to play");
            self.focus.abandon();
        }
    }

    /// Make `session` current and start it as soon as it is ready
    fn promote(&mut self, session: TrackSession) {
        let id = session.id();
        info!("Going to next track: {}", session.uri());
        self.emit(PlaybackEvent::TrackWentToNext {
            session_id: id,
            uri: session.uri().to_string(),
            timestamp: now(),
        });

        let ready = session.is_usable();
        self.current = Some(session);
        if ready {
            self.start_current();
        } else {
            self.autoplay = Some(id);
        }
    }

    pub(super) fn on_position_tick(&mut self, session: Uuid) {
        let Some(current) = self.current.as_ref().filter(|s| s.id() == session) else {
            return;
        };

        if current.is_playing() {
            let position = current.position();
            self.emit(PlaybackEvent::PositionChanged {
                session_id: session,
                position_ms: position.played_ms,
                duration_ms: position.total_ms,
                ratio: position.ratio(),
                timestamp: now(),
            });
        }

        self.maybe_prepare_crossfade();
        self.maybe_start_crossfade();
    }

    /// Real time left before the current session ends, when within the crossfade window
    fn crossfade_window(&self) -> Option<Duration> {
        let window_ms = match self.mode {
            EngineMode::Crossfade { duration_ms } => duration_ms,
            EngineMode::PlainHandoff => return None,
        };
        let current = self.current.as_ref()?;
        if !current.is_playing() || self.is_pausing() {
            return None;
        }

        let position = current.position();
        if position.total_ms == 0 || position.remaining_ms() > window_ms {
            return None;
        }
        let real_ms = position.remaining_ms() as f64 / f64::from(current.speed());
        Some(Duration::from_millis(real_ms as u64))
    }

    /// Start preparing the next source once the window opens
    pub(super) fn maybe_prepare_crossfade(&mut self) {
        if self.preload.is_some() || self.crossfade_window().is_none() {
            return;
        }
        let Some(next) = self.next_source.clone() else {
            return;
        };

        info!("Preparing {} for crossfade", next.uri);
        let mut session = self.new_session(&next);
        session.set_volume(MIN_VOLUME);
        self.preload = Some(session);
    }

    /// Overlap the prepared next session with the current one
    pub(super) fn maybe_start_crossfade(&mut self) {
        if !self.preload.as_ref().map_or(false, |p| p.is_usable()) {
            return;
        }
        let Some(remaining) = self.crossfade_window() else {
            return;
        };
        let Some(mut incoming) = self.preload.take() else {
            return;
        };
        let Some(mut outgoing) = self.current.take() else {
            self.preload = Some(incoming);
            return;
        };

        let overlap = remaining.min(self.mode.fade_duration());
        let incoming_id = incoming.id();
        let outgoing_id = outgoing.id();
        info!(
            "Crossfading {} -> {} over {} ms",
            outgoing.uri(),
            incoming.uri(),
            overlap.as_millis()
        );

        self.next_source = None;
        self.emit(PlaybackEvent::CrossfadeStarted {
            outgoing_session_id: outgoing_id,
            incoming_session_id: incoming_id,
            duration_ms: duration_to_millis(overlap),
            timestamp: now(),
        });
        self.emit(PlaybackEvent::TrackWentToNext {
            session_id: incoming_id,
            uri: incoming.uri().to_string(),
            timestamp: now(),
        });

        incoming.set_volume(MIN_VOLUME);
        incoming.start();
        if let Some(id) = incoming.output_session_id() {
            self.effects.open(id);
        }
        self.current = Some(incoming);
        let level = self.target_volume();
        self.fade_current(level, overlap, FadePurpose::Adjust);

        match outgoing.fade_volume(MIN_VOLUME, overlap, FadePurpose::ReleaseWhenSilent) {
            Some(_) => self.finish_outgoing(Outgoing {
                session: outgoing,
                departure: Departure::Crossfade,
            }),
            None => self.outgoing.push(Outgoing {
                session: outgoing,
                departure: Departure::Crossfade,
            }),
        }
    }

    pub(super) fn on_fade_tick(&mut self, session: Uuid) {
        let now = Instant::now();

        let completed = if let Some(current) = self.current.as_mut().filter(|s| s.id() == session) {
            current.on_fade_tick(now)
        } else if let Some(preload) = self.preload.as_mut().filter(|s| s.id() == session) {
            preload.on_fade_tick(now)
        } else if let Some(outgoing) = self.outgoing.iter_mut().find(|o| o.session.id() == session) {
            outgoing.session.on_fade_tick(now)
        } else {
            None
        };

        if let Some(purpose) = completed {
            self.after_fade(session, purpose);
        }
    }

    /// Ramp the current session, resolving an interrupted pause
    pub(super) fn fade_current(&mut self, to: f32, duration: Duration, purpose: FadePurpose) {
        let Some(session) = self.current.as_mut() else {
            return;
        };
        let id = session.id();
        let interrupted_pause =
            session.fade_purpose() == Some(FadePurpose::PauseWhenSilent) && purpose != FadePurpose::PauseWhenSilent;

        let completed = session.fade_volume(to, duration, purpose);
        if interrupted_pause {
            debug!("Pause of session {} interrupted", id);
            self.resolve_pause_waiters(PauseOutcome::Superseded);
        }
        if let Some(purpose) = completed {
            self.after_fade(id, purpose);
        }
    }

    fn after_fade(&mut self, session: Uuid, purpose: FadePurpose) {
        match purpose {
            FadePurpose::Adjust => {}
            FadePurpose::PauseWhenSilent => self.complete_pause(session),
            FadePurpose::ReleaseWhenSilent => {
                if let Some(index) = self.outgoing.iter().position(|o| o.session.id() == session) {
                    let outgoing = self.outgoing.remove(index);
                    self.finish_outgoing(outgoing);
                }
            }
        }
    }

    fn complete_pause(&mut self, session: Uuid) {
        let Some(current) = self.current.as_mut().filter(|s| s.id() == session) else {
            return;
        };
        current.pause();
        self.effects.close();
        // Focus lost to another application stays requested so its return can resume us
        if !self.focus.state().restore_on_gain {
            self.focus.abandon();
        }
        self.resolve_pause_waiters(PauseOutcome::Paused);
        info!("Playback paused");
    }

    /// Silence and release a departing session
    fn finish_outgoing(&mut self, mut outgoing: Outgoing) {
        let id = outgoing.session.id();
        let uri = outgoing.session.uri().to_string();
        // Media may end before the last fade tick lands
        if outgoing.session.volume() > MIN_VOLUME {
            outgoing.session.set_volume(MIN_VOLUME);
        }
        outgoing.session.release();

        if outgoing.departure == Departure::Crossfade {
            info!("Crossfade complete, released {}", uri);
            self.emit(PlaybackEvent::TrackEnded {
                session_id: id,
                uri,
                timestamp: now(),
            });
            self.emit(PlaybackEvent::CrossfadeCompleted {
                session_id: id,
                timestamp: now(),
            });
        }
    }

    /// Release every fading-out session
    pub(super) fn release_outgoing(&mut self) {
        for outgoing in std::mem::take(&mut self.outgoing) {
            self.finish_outgoing(outgoing);
        }
    }
}
