//! Core playback engine - handle, task and dispatch
//!
//! **Responsibilities:**
//! - `PlaybackEngine` handle and engine task startup
//! - Message loop and dispatch onto the transport, transition and interrupt handlers
//! - Reporting coarse playback state changes
//! - Shared helpers (session creation, pause waiters, event emission)

use super::{Collaborators, Command, EngineMessage, EngineMode, EngineStatus, PauseOutcome, PlayOutcome, Track};
use crate::config::{PlayerConfig, MAX_VOLUME};
use crate::error::{Error, Result};
use crate::playback::effects::EffectSession;
use crate::playback::focus::{FocusArbiter, FocusSink};
use crate::playback::media::MediaBackend;
use crate::playback::routes::{RouteSink, RouteWatcher};
use crate::playback::session::{FadePurpose, SessionTimers, TrackSession};
use segue_common::events::{PlaybackEvent, PlaybackState};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};
use uuid::Uuid;

/// Why a session is fading out after losing the current role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Departure {
    /// Outgoing half of a crossfade; its end is reported to the caller
    Crossfade,
    /// Replaced by a new data source; released silently
    Replaced,
}

/// A session ramping down before release
pub(super) struct Outgoing {
    pub(super) session: TrackSession,
    pub(super) departure: Departure,
}

/// Engine state, owned by the engine task
pub(super) struct EngineCore {
    pub(super) config: PlayerConfig,
    pub(super) mode: EngineMode,
    pub(super) timers: SessionTimers,
    pub(super) backend: Box<dyn MediaBackend>,
    pub(super) focus: FocusArbiter,
    pub(super) effects: EffectSession,
    pub(super) noisy_watcher: RouteWatcher,
    pub(super) device_watcher: RouteWatcher,

    /// Session whose position and controls the caller sees
    pub(super) current: Option<TrackSession>,
    /// Next track prepared ahead of a crossfade
    pub(super) preload: Option<TrackSession>,
    /// Sessions fading out
    pub(super) outgoing: Vec<Outgoing>,
    /// Track to continue with at the boundary
    pub(super) next_source: Option<Track>,

    /// Completion of the last `set_data_source`, keyed by session
    pub(super) source_waiter: Option<(Uuid, oneshot::Sender<bool>)>,
    pub(super) pause_waiters: Vec<oneshot::Sender<PauseOutcome>>,
    /// Session to start as soon as it is ready
    pub(super) autoplay: Option<Uuid>,

    pub(super) speed: f32,
    pub(super) pitch: f32,
    pub(super) reported_state: PlaybackState,

    pub(super) queue: mpsc::UnboundedSender<EngineMessage>,
    pub(super) events: mpsc::UnboundedSender<PlaybackEvent>,
}

/// Sender side shared by all clones of the handle
struct HandleInner {
    tx: mpsc::UnboundedSender<EngineMessage>,
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        // Engine may already be gone after release()
        let _ = self.tx.send(EngineMessage::Command(Command::Shutdown));
    }
}

/// Handle to a running playback engine
///
/// Cheap to clone. Dropping the last clone releases the engine.
#[derive(Clone)]
pub struct PlaybackEngine {
    inner: Arc<HandleInner>,
}

impl PlaybackEngine {
    /// Start the engine task
    ///
    /// Must be called from within a tokio runtime. Returns the handle and the
    /// stream of outbound events.
    pub fn spawn(
        config: PlayerConfig,
        collaborators: Collaborators,
    ) -> (Self, mpsc::UnboundedReceiver<PlaybackEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let mode = EngineMode::from_duration(config.playback.crossfade_ms);
        let timers = SessionTimers {
            position_interval: config.playback.position_interval(),
            fade_tick: config.playback.fade_tick(),
            curve: config.playback.fade_curve,
        };

        let mut core = EngineCore {
            mode,
            timers,
            backend: collaborators.backend,
            focus: FocusArbiter::new(collaborators.focus, FocusSink::new(tx.clone()), config.focus.enabled),
            effects: EffectSession::new(collaborators.effects),
            noisy_watcher: RouteWatcher::new("Noisy route", collaborators.noisy_route, RouteSink::new(tx.clone())),
            device_watcher: RouteWatcher::new("Output device", collaborators.device_route, RouteSink::new(tx.clone())),
            current: None,
            preload: None,
            outgoing: Vec::new(),
            next_source: None,
            source_waiter: None,
            pause_waiters: Vec::new(),
            autoplay: None,
            speed: config.playback.default_speed,
            pitch: config.playback.default_pitch,
            reported_state: PlaybackState::Idle,
            queue: tx.clone(),
            events: events_tx,
            config,
        };

        if core.config.routes.resume_on_device_connect {
            core.device_watcher.register();
        }

        tokio::spawn(core.run(rx));

        let engine = Self {
            inner: Arc::new(HandleInner { tx }),
        };
        (engine, events_rx)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.inner
            .tx
            .send(EngineMessage::Command(command))
            .map_err(|_| Error::EngineStopped)
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.send(command(reply))?;
        response.await.map_err(|_| Error::EngineStopped)
    }

    /// Replace the current session with one for `track`
    ///
    /// Resolves once the new session is ready (`true`) or failed or was
    /// replaced before becoming ready (`false`). Does not start playback.
    /// With `force`, the previous session is released at once instead of
    /// fading out.
    pub async fn set_data_source(&self, track: Track, force: bool) -> Result<bool> {
        self.request(|reply| Command::SetDataSource { track, force, reply }).await
    }

    /// Record the track to continue with at the boundary; `None` cancels
    pub fn set_next_data_source(&self, track: Option<Track>) -> Result<()> {
        self.send(Command::SetNextDataSource { track })
    }

    pub async fn play(&self) -> Result<PlayOutcome> {
        self.request(|reply| Command::Play { reply }).await
    }

    /// Pause; resolves after the underlying player has paused
    ///
    /// Without `force` the volume fades out first when fading is enabled.
    pub async fn pause(&self, force: bool) -> Result<PauseOutcome> {
        self.request(|reply| Command::Pause { force, reply }).await
    }

    /// Seek the current session; returns the clamped position
    pub async fn seek(&self, position_ms: u64, force: bool) -> Result<u64> {
        self.request(|reply| Command::Seek {
            position_ms,
            force,
            reply,
        })
        .await
    }

    pub fn set_playback_speed_pitch(&self, speed: f32, pitch: f32) -> Result<()> {
        for (name, value) in [("speed", speed), ("pitch", pitch)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::InvalidParameter(format!(
                    "{} must be a positive number, got {}",
                    name, value
                )));
            }
        }
        self.send(Command::SetSpeedPitch { speed, pitch })
    }

    pub fn set_crossfade_duration(&self, duration_ms: u64) -> Result<()> {
        self.send(Command::SetCrossfadeDuration { duration_ms })
    }

    /// Apply a crossfade duration; true when the transition strategy changed
    pub async fn maybe_switch_to_crossfade(&self, duration_ms: u64) -> Result<bool> {
        self.request(|reply| Command::MaybeSwitchToCrossfade { duration_ms, reply })
            .await
    }

    pub async fn status(&self) -> Result<EngineStatus> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// Release every resource and stop the engine task
    pub async fn release(&self) -> Result<()> {
        self.request(|reply| Command::Release { reply }).await
    }
}

impl EngineCore {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<EngineMessage>) {
        info!("Playback engine started ({})", self.mode);

        while let Some(message) = rx.recv().await {
            let stop = self.handle(message);
            self.sync_state();
            if stop {
                break;
            }
        }

        info!("Playback engine stopped");
    }

    /// Dispatch one message; returns true when the engine must stop
    fn handle(&mut self, message: EngineMessage) -> bool {
        match message {
            EngineMessage::Command(command) => return self.handle_command(command),
            EngineMessage::Media { session, event } => self.on_media_event(session, event),
            EngineMessage::PositionTick { session } => self.on_position_tick(session),
            EngineMessage::FadeTick { session } => self.on_fade_tick(session),
            EngineMessage::Focus(change) => self.on_focus_change(change),
            EngineMessage::Route(change) => self.on_route_change(change),
        }
        false
    }

    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::SetDataSource { track, force, reply } => self.set_data_source(track, force, reply),
            Command::SetNextDataSource { track } => self.set_next_data_source(track),
            Command::Play { reply } => {
                let outcome = self.play();
                let _ = reply.send(outcome);
            }
            Command::Pause { force, reply } => self.pause(force, Some(reply)),
            Command::Seek { position_ms, force, reply } => {
                let _ = reply.send(self.seek(position_ms, force));
            }
            Command::SetSpeedPitch { speed, pitch } => self.set_speed_pitch(speed, pitch),
            Command::SetCrossfadeDuration { duration_ms } => {
                self.switch_mode(duration_ms);
            }
            Command::MaybeSwitchToCrossfade { duration_ms, reply } => {
                let _ = reply.send(self.switch_mode(duration_ms));
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
            Command::Release { reply } => {
                self.release();
                let _ = reply.send(());
                return true;
            }
            Command::Shutdown => {
                debug!("All engine handles dropped");
                self.release();
                return true;
            }
        }
        false
    }

    pub(super) fn emit(&self, event: PlaybackEvent) {
        debug!("Event: {}", event.event_type());
        // Host may have stopped listening
        let _ = self.events.send(event);
    }

    pub(super) fn is_playing(&self) -> bool {
        self.current.as_ref().map_or(false, |s| s.is_playing())
    }

    /// Current session is fading out towards a pause
    pub(super) fn is_pausing(&self) -> bool {
        self.current
            .as_ref()
            .map_or(false, |s| s.fade_purpose() == Some(FadePurpose::PauseWhenSilent))
    }

    /// Level a playing session should settle at: the duck level while another
    /// application holds transient focus
    pub(super) fn target_volume(&self) -> f32 {
        if self.focus.state().duck_requested {
            self.config.playback.duck_volume
        } else {
            MAX_VOLUME
        }
    }

    /// Coarse state: a session about to autoplay already counts as playing
    pub(super) fn playback_state(&self) -> PlaybackState {
        match &self.current {
            None => PlaybackState::Idle,
            Some(session) if session.is_playing() || self.autoplay == Some(session.id()) => {
                PlaybackState::Playing
            }
            Some(_) => PlaybackState::Paused,
        }
    }

    /// Report state changes and keep the noisy-route watcher in step
    pub(super) fn sync_state(&mut self) {
        let state = self.playback_state();

        if state == PlaybackState::Playing && self.config.routes.pause_on_noisy {
            self.noisy_watcher.register();
        } else {
            self.noisy_watcher.unregister();
        }

        if state != self.reported_state {
            info!("Playback state: {} -> {}", self.reported_state, state);
            self.emit(PlaybackEvent::PlaybackStateChanged {
                old_state: self.reported_state,
                new_state: state,
                timestamp: segue_common::time::now(),
            });
            self.reported_state = state;
        }
    }

    /// Create a session with the engine's speed and pitch buffered
    pub(super) fn new_session(&mut self, track: &Track) -> TrackSession {
        let mut session = TrackSession::create(&track.uri, self.backend.as_mut(), self.queue.clone(), self.timers);
        session.set_speed(self.speed);
        session.set_pitch(self.pitch);
        if track.start_position_ms > 0 {
            session.seek(track.start_position_ms);
        }
        session
    }

    pub(super) fn resolve_pause_waiters(&mut self, outcome: PauseOutcome) {
        for waiter in self.pause_waiters.drain(..) {
            let _ = waiter.send(outcome);
        }
    }

    pub(super) fn resolve_source_waiter(&mut self, session: Uuid, success: bool) {
        if self.source_waiter.as_ref().map_or(false, |(id, _)| *id == session) {
            if let Some((_, waiter)) = self.source_waiter.take() {
                let _ = waiter.send(success);
            }
        }
    }
}
