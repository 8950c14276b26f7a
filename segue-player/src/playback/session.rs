//! Track session: one media player for one source
//!
//! A session owns a single [`MediaPlayer`] and tracks its lifecycle:
//!
//! ```text
//! Created -> Preparing -> Ready -> Playing <-> Paused -> Ended
//!                     \-> Error
//! (any) -> Released
//! ```
//!
//! Volume, speed, pitch and seek requests made before the player is ready are
//! buffered. Volume and seek apply on readiness; speed and pitch apply on the
//! first successful start because players may reject parameter changes
//! before that. Natural completion and fatal errors are each reported at most
//! once, and never after release.

use crate::config::{MAX_VOLUME, MIN_VOLUME};
use crate::playback::engine::EngineMessage;
use crate::playback::fader::{FadeListener, FadeSpec, Fader};
use crate::playback::media::{MediaBackend, MediaEventSink, MediaPlayer};
use crate::playback::position::PlaybackPosition;
use segue_common::FadeCurve;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Speed and pitch of a player that was never told otherwise
pub const NATIVE_RATE: f32 = 1.0;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Created,
    Preparing,
    Ready,
    Playing,
    Paused,
    Ended,
    Error,
    Released,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Created => "created",
            SessionState::Preparing => "preparing",
            SessionState::Ready => "ready",
            SessionState::Playing => "playing",
            SessionState::Paused => "paused",
            SessionState::Ended => "ended",
            SessionState::Error => "error",
            SessionState::Released => "released",
        };
        f.write_str(name)
    }
}

/// What the engine does once a session's fade completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadePurpose {
    /// Plain level change
    Adjust,
    /// Pause the session once silent
    PauseWhenSilent,
    /// Release the session once silent
    ReleaseWhenSilent,
}

/// Timer periods and ramp shape shared by all sessions of an engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionTimers {
    pub position_interval: Duration,
    pub fade_tick: Duration,
    pub curve: FadeCurve,
}

impl Default for SessionTimers {
    fn default() -> Self {
        Self {
            position_interval: Duration::from_millis(100),
            fade_tick: Duration::from_millis(20),
            curve: FadeCurve::Linear,
        }
    }
}

/// Applies ramp values to the session's volume and, once ready, its player
struct VolumeTarget<'a> {
    session: Uuid,
    player: &'a mut dyn MediaPlayer,
    volume: &'a mut f32,
    live: bool,
}

impl FadeListener for VolumeTarget<'_> {
    fn on_update(&mut self, value: f32) {
        *self.volume = value;
        if self.live {
            self.player.set_volume(value);
        }
    }

    fn on_finish(&mut self, completed: bool) {
        trace!("Session {} fade finished (completed={})", self.session, completed);
    }
}

/// One playable source and its media player
pub struct TrackSession {
    id: Uuid,
    uri: String,
    state: SessionState,
    player: Box<dyn MediaPlayer>,
    volume: f32,
    speed: f32,
    pitch: f32,
    has_started_once: bool,
    pending_seek: Option<u64>,
    poller: Option<JoinHandle<()>>,
    fade: Option<(Fader, FadePurpose)>,
    timers: SessionTimers,
    queue: mpsc::UnboundedSender<EngineMessage>,
}

impl TrackSession {
    /// Create a player for `uri` and begin asynchronous preparation
    pub(crate) fn create(
        uri: &str,
        backend: &mut dyn MediaBackend,
        queue: mpsc::UnboundedSender<EngineMessage>,
        timers: SessionTimers,
    ) -> Self {
        let id = Uuid::new_v4();
        let player = backend.create(uri, MediaEventSink::new(id, queue.clone()));

        let mut session = Self {
            id,
            uri: uri.to_string(),
            state: SessionState::Created,
            player,
            volume: MAX_VOLUME,
            speed: NATIVE_RATE,
            pitch: NATIVE_RATE,
            has_started_once: false,
            pending_seek: None,
            poller: None,
            fade: None,
            timers,
            queue,
        };

        debug!("Session {} created for {}", id, uri);
        session.player.prepare();
        session.state = SessionState::Preparing;
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Ready for transport commands
    pub fn is_usable(&self) -> bool {
        matches!(
            self.state,
            SessionState::Ready | SessionState::Playing | SessionState::Paused
        )
    }

    pub fn is_playing(&self) -> bool {
        self.state == SessionState::Playing
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    /// Seek waiting for readiness
    pub fn pending_seek(&self) -> Option<u64> {
        self.pending_seek
    }

    pub fn fade_purpose(&self) -> Option<FadePurpose> {
        self.fade.as_ref().map(|(_, purpose)| *purpose)
    }

    pub fn output_session_id(&self) -> Option<i32> {
        if self.is_usable() {
            self.player.output_session_id()
        } else {
            None
        }
    }

    pub fn position(&self) -> PlaybackPosition {
        if !self.is_usable() {
            return PlaybackPosition::ZERO;
        }
        let total = self.player.duration_ms();
        let played = self.player.position_ms();
        PlaybackPosition::new(if total > 0 { played.min(total) } else { played }, total)
    }

    /// Preparation finished; returns false if the event is stale
    pub fn on_prepared(&mut self) -> bool {
        if self.state != SessionState::Preparing {
            return false;
        }

        self.state = SessionState::Ready;
        self.player.set_volume(self.volume);
        if let Some(position_ms) = self.pending_seek.take() {
            self.seek(position_ms);
        }
        self.start_position_poller();

        debug!("Session {} ready ({} ms)", self.id, self.player.duration_ms());
        true
    }

    /// Natural end of media; true only for the first terminal report
    pub fn on_completed(&mut self) -> bool {
        self.finish(SessionState::Ended)
    }

    /// Fatal player failure; true only for the first terminal report
    pub fn on_error(&mut self, what: i32, extra: i32) -> bool {
        let first = self.finish(SessionState::Error);
        if first {
            warn!("Session {} failed: what={} extra={}", self.id, what, extra);
        }
        first
    }

    fn finish(&mut self, terminal: SessionState) -> bool {
        if !matches!(
            self.state,
            SessionState::Preparing | SessionState::Ready | SessionState::Playing | SessionState::Paused
        ) {
            return false;
        }
        self.state = terminal;
        self.stop_position_poller();
        self.cancel_fade();
        true
    }

    /// Start or resume output; no-op unless usable
    pub fn start(&mut self) -> bool {
        if !matches!(self.state, SessionState::Ready | SessionState::Paused) {
            return false;
        }

        self.player.play();
        self.state = SessionState::Playing;

        if !self.has_started_once {
            self.has_started_once = true;
            let (speed, pitch) = (self.speed, self.pitch);
            self.speed = NATIVE_RATE;
            self.pitch = NATIVE_RATE;
            self.apply_speed(speed);
            self.apply_pitch(pitch);
        }
        true
    }

    /// Pause output; no-op unless playing
    pub fn pause(&mut self) -> bool {
        if self.state != SessionState::Playing {
            return false;
        }
        self.player.pause();
        self.state = SessionState::Paused;
        true
    }

    /// Seek, clamped to the known duration; buffered until ready
    pub fn seek(&mut self, position_ms: u64) -> u64 {
        match self.state {
            SessionState::Created | SessionState::Preparing => {
                self.pending_seek = Some(position_ms);
                position_ms
            }
            SessionState::Ready | SessionState::Playing | SessionState::Paused => {
                let total = self.player.duration_ms();
                let clamped = if total > 0 { position_ms.min(total) } else { position_ms };
                self.player.seek(clamped);
                clamped
            }
            SessionState::Ended | SessionState::Error | SessionState::Released => {
                self.position().played_ms
            }
        }
    }

    pub fn set_speed(&mut self, speed: f32) {
        if self.has_started_once && self.is_usable() {
            self.apply_speed(speed);
        } else {
            self.speed = speed;
        }
    }

    pub fn set_pitch(&mut self, pitch: f32) {
        if self.has_started_once && self.is_usable() {
            self.apply_pitch(pitch);
        } else {
            self.pitch = pitch;
        }
    }

    fn apply_speed(&mut self, speed: f32) {
        match self.player.set_speed(speed) {
            Ok(()) => self.speed = speed,
            Err(e) => warn!("Session {} kept speed {} ({})", self.id, self.speed, e),
        }
    }

    fn apply_pitch(&mut self, pitch: f32) {
        match self.player.set_pitch(pitch) {
            Ok(()) => self.pitch = pitch,
            Err(e) => warn!("Session {} kept pitch {} ({})", self.id, self.pitch, e),
        }
    }

    /// Set the level immediately, cancelling any ramp
    pub fn set_volume(&mut self, volume: f32) {
        self.cancel_fade();
        self.volume = volume.clamp(MIN_VOLUME, MAX_VOLUME);
        if self.is_usable() {
            self.player.set_volume(self.volume);
        }
    }

    /// Ramp to `to`, replacing any ramp in flight
    ///
    /// Returns the purpose when the ramp completed synchronously: the level
    /// already matched, the duration was zero, or the session is not
    /// producing output.
    pub fn fade_volume(&mut self, to: f32, duration: Duration, purpose: FadePurpose) -> Option<FadePurpose> {
        self.cancel_fade();

        let to = to.clamp(MIN_VOLUME, MAX_VOLUME);
        let live = self.is_usable();
        let duration = if self.is_playing() { duration } else { Duration::ZERO };
        let spec = FadeSpec {
            from: self.volume,
            to,
            duration: if self.volume == to { Duration::ZERO } else { duration },
            curve: self.timers.curve,
        };

        let session = self.id;
        let queue = self.queue.clone();
        let on_tick = move || queue.send(EngineMessage::FadeTick { session }).is_ok();

        let mut target = VolumeTarget {
            session,
            player: &mut *self.player,
            volume: &mut self.volume,
            live,
        };
        match Fader::start(spec, Instant::now(), self.timers.fade_tick, on_tick, &mut target) {
            Some(fader) => {
                trace!("Session {} fading {} -> {} over {:?}", session, spec.from, spec.to, spec.duration);
                self.fade = Some((fader, purpose));
                None
            }
            None => Some(purpose),
        }
    }

    /// Advance the ramp; returns its purpose when it just completed
    pub fn on_fade_tick(&mut self, now: Instant) -> Option<FadePurpose> {
        let (mut fader, purpose) = self.fade.take()?;
        let live = self.is_usable();
        let mut target = VolumeTarget {
            session: self.id,
            player: &mut *self.player,
            volume: &mut self.volume,
            live,
        };
        if fader.tick(now, &mut target) {
            Some(purpose)
        } else {
            self.fade = Some((fader, purpose));
            None
        }
    }

    /// Stop the ramp in flight, if any, returning its purpose
    pub fn cancel_fade(&mut self) -> Option<FadePurpose> {
        let (fader, purpose) = self.fade.take()?;
        let live = self.is_usable();
        let mut target = VolumeTarget {
            session: self.id,
            player: &mut *self.player,
            volume: &mut self.volume,
            live,
        };
        fader.stop(&mut target);
        Some(purpose)
    }

    /// Tear down timers and the player; true only on the first call
    pub fn release(&mut self) -> bool {
        if self.state == SessionState::Released {
            return false;
        }
        self.stop_position_poller();
        self.cancel_fade();
        self.player.release();
        debug!("Session {} released (was {})", self.id, self.state);
        self.state = SessionState::Released;
        true
    }

    fn start_position_poller(&mut self) {
        self.stop_position_poller();

        let session = self.id;
        let queue = self.queue.clone();
        let period = self.timers.position_interval;
        self.poller = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                interval.tick().await;
                if queue.send(EngineMessage::PositionTick { session }).is_err() {
                    break;
                }
            }
        }));
    }

    fn stop_position_poller(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
    }
}

impl Drop for TrackSession {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for TrackSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackSession")
            .field("id", &self.id)
            .field("uri", &self.uri)
            .field("state", &self.state)
            .field("volume", &self.volume)
            .field("speed", &self.speed)
            .field("pitch", &self.pitch)
            .finish()
    }
}
