//! Simulated platform services
//!
//! Clock-driven stand-ins for the media engine, audio focus, effect
//! announcements and route notifications. They back the command-line player
//! and the integration tests. Every player created by [`SimulatedBackend`]
//! leaves a [`PlayerRecord`] in a shared [`SimLedger`] so callers can inspect
//! what the engine did to it.
//!
//! Sources are addressed as `sim://<name>?duration_ms=<n>&prepare_ms=<n>&fail=<mode>`
//! where `fail` is one of `prepare`, `speed` or `playback`.

use crate::error::{Error, Result};
use crate::playback::effects::EffectAnnouncer;
use crate::playback::engine::Collaborators;
use crate::playback::focus::{FocusChange, FocusPolicy, FocusSink};
use crate::playback::media::{
    MediaBackend, MediaEvent, MediaEventSink, MediaPlayer, MEDIA_ERROR_IO, MEDIA_ERROR_UNKNOWN,
};
use crate::playback::routes::{RouteChange, RouteSink, RouteSource};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// URI scheme understood by the simulated backend
pub const SIM_SCHEME: &str = "sim://";

const DEFAULT_DURATION_MS: u64 = 3_000;
const FIRST_AUDIO_SESSION_ID: i32 = 1000;

/// Lock shared bookkeeping, recovering from a poisoned mutex
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Injected failure of a simulated source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimFailure {
    /// Preparation reports an error
    Prepare,
    /// Speed and pitch changes are rejected
    Speed,
    /// Playback errors half way through
    Playback,
}

/// Parameters of a simulated source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimSource {
    pub name: String,
    pub duration_ms: u64,
    /// Preparation delay; 0 reports readiness immediately
    pub prepare_ms: u64,
    pub fail: Option<SimFailure>,
}

impl SimSource {
    /// Parse a source URI; unknown parameters are ignored
    pub fn parse(uri: &str) -> Self {
        let rest = uri.strip_prefix(SIM_SCHEME).unwrap_or(uri);
        let (name, query) = rest.split_once('?').unwrap_or((rest, ""));

        let mut source = SimSource {
            name: name.to_string(),
            duration_ms: DEFAULT_DURATION_MS,
            prepare_ms: 0,
            fail: None,
        };

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            match key {
                "duration_ms" => match value.parse() {
                    Ok(ms) => source.duration_ms = ms,
                    Err(_) => warn!("Bad duration_ms {:?} in {}", value, uri),
                },
                "prepare_ms" => match value.parse() {
                    Ok(ms) => source.prepare_ms = ms,
                    Err(_) => warn!("Bad prepare_ms {:?} in {}", value, uri),
                },
                "fail" => {
                    source.fail = match value {
                        "prepare" => Some(SimFailure::Prepare),
                        "speed" => Some(SimFailure::Speed),
                        "playback" => Some(SimFailure::Playback),
                        other => {
                            warn!("Unknown failure mode {:?} in {}", other, uri);
                            None
                        }
                    }
                }
                other => debug!("Ignoring parameter {:?} in {}", other, uri),
            }
        }
        source
    }
}

/// What the engine did to one simulated player
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRecord {
    pub session: Uuid,
    pub uri: String,
    pub audio_session_id: i32,
    /// Every volume applied, in order
    pub volumes: Vec<f32>,
    pub playing: bool,
    pub play_calls: u32,
    pub pause_calls: u32,
    pub releases: u32,
    pub speed: f32,
    pub pitch: f32,
    pub seeks: Vec<u64>,
}

/// Shared log of all simulated players
#[derive(Debug, Clone, Default)]
pub struct SimLedger {
    records: Arc<Mutex<Vec<PlayerRecord>>>,
}

impl SimLedger {
    /// Snapshot of all players, in creation order
    pub fn records(&self) -> Vec<PlayerRecord> {
        lock(&self.records).clone()
    }

    /// Most recent player created for `uri`
    pub fn latest(&self, uri: &str) -> Option<PlayerRecord> {
        lock(&self.records).iter().rev().find(|r| r.uri == uri).cloned()
    }

    /// Players producing output right now
    pub fn playing(&self) -> Vec<PlayerRecord> {
        lock(&self.records).iter().filter(|r| r.playing).cloned().collect()
    }

    fn push(&self, record: PlayerRecord) -> usize {
        let mut records = lock(&self.records);
        records.push(record);
        records.len() - 1
    }

    fn update(&self, index: usize, change: impl FnOnce(&mut PlayerRecord)) {
        if let Some(record) = lock(&self.records).get_mut(index) {
            change(record);
        }
    }
}

/// Media backend whose players follow the tokio clock
#[derive(Debug, Clone)]
pub struct SimulatedBackend {
    ledger: SimLedger,
    next_audio_session: i32,
}

impl SimulatedBackend {
    pub fn new(ledger: SimLedger) -> Self {
        Self {
            ledger,
            next_audio_session: FIRST_AUDIO_SESSION_ID,
        }
    }
}

impl MediaBackend for SimulatedBackend {
    fn create(&mut self, uri: &str, events: MediaEventSink) -> Box<dyn MediaPlayer> {
        let audio_session_id = self.next_audio_session;
        self.next_audio_session += 1;

        let index = self.ledger.push(PlayerRecord {
            session: events.session_id(),
            uri: uri.to_string(),
            audio_session_id,
            volumes: Vec::new(),
            playing: false,
            play_calls: 0,
            pause_calls: 0,
            releases: 0,
            speed: 1.0,
            pitch: 1.0,
            seeks: Vec::new(),
        });

        Box::new(SimPlayer {
            source: SimSource::parse(uri),
            events,
            ledger: self.ledger.clone(),
            index,
            audio_session_id,
            prepared: false,
            released: false,
            base_ms: 0,
            anchor: None,
            speed: 1.0,
            timer: None,
        })
    }
}

struct SimPlayer {
    source: SimSource,
    events: MediaEventSink,
    ledger: SimLedger,
    index: usize,
    audio_session_id: i32,
    prepared: bool,
    released: bool,
    /// Position when the clock was last anchored
    base_ms: u64,
    /// Set while playing
    anchor: Option<Instant>,
    speed: f32,
    /// Pending preparation, completion or failure
    timer: Option<JoinHandle<()>>,
}

impl SimPlayer {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    /// Fold elapsed play time into `base_ms`
    fn rebase(&mut self, now: Instant) {
        if let Some(anchor) = self.anchor {
            let elapsed = now.duration_since(anchor).as_millis() as f64 * f64::from(self.speed);
            self.base_ms = (self.base_ms + elapsed as u64).min(self.source.duration_ms);
            self.anchor = Some(now);
        }
    }

    /// Schedule the next end-of-media or failure event from the current position
    fn schedule_end(&mut self) {
        self.cancel_timer();
        if self.anchor.is_none() {
            return;
        }

        let (target_ms, event) = match self.source.fail {
            Some(SimFailure::Playback) if self.base_ms < self.source.duration_ms / 2 => (
                self.source.duration_ms / 2,
                MediaEvent::Error {
                    what: MEDIA_ERROR_UNKNOWN,
                    extra: MEDIA_ERROR_IO,
                },
            ),
            _ => (self.source.duration_ms, MediaEvent::Completed),
        };
        let wall_ms = target_ms.saturating_sub(self.base_ms) as f64 / f64::from(self.speed);
        let delay = Duration::from_millis(wall_ms.ceil() as u64);

        let events = self.events.clone();
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            events.emit(event);
        }));
    }
}

impl MediaPlayer for SimPlayer {
    fn prepare(&mut self) {
        let event = if self.source.fail == Some(SimFailure::Prepare) {
            MediaEvent::Error {
                what: MEDIA_ERROR_UNKNOWN,
                extra: MEDIA_ERROR_IO,
            }
        } else {
            MediaEvent::Prepared
        };
        self.prepared = event == MediaEvent::Prepared;

        if self.source.prepare_ms == 0 {
            self.events.emit(event);
            return;
        }
        let delay = Duration::from_millis(self.source.prepare_ms);
        let events = self.events.clone();
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            events.emit(event);
        }));
    }

    fn play(&mut self) {
        if !self.prepared || self.released || self.anchor.is_some() {
            return;
        }
        self.anchor = Some(Instant::now());
        self.schedule_end();
        self.ledger.update(self.index, |r| {
            r.playing = true;
            r.play_calls += 1;
        });
    }

    fn pause(&mut self) {
        if self.anchor.is_none() {
            return;
        }
        self.rebase(Instant::now());
        self.anchor = None;
        self.cancel_timer();
        self.ledger.update(self.index, |r| {
            r.playing = false;
            r.pause_calls += 1;
        });
    }

    fn seek(&mut self, position_ms: u64) {
        let now = Instant::now();
        self.base_ms = position_ms.min(self.source.duration_ms);
        if self.anchor.is_some() {
            self.anchor = Some(now);
            self.schedule_end();
        }
        self.ledger.update(self.index, |r| r.seeks.push(position_ms));
    }

    fn set_volume(&mut self, volume: f32) {
        self.ledger.update(self.index, |r| r.volumes.push(volume));
    }

    fn set_speed(&mut self, speed: f32) -> Result<()> {
        if self.source.fail == Some(SimFailure::Speed) {
            return Err(Error::Media(format!("{} rejects speed {}", self.source.name, speed)));
        }
        self.rebase(Instant::now());
        self.speed = speed;
        self.schedule_end();
        self.ledger.update(self.index, |r| r.speed = speed);
        Ok(())
    }

    fn set_pitch(&mut self, pitch: f32) -> Result<()> {
        if self.source.fail == Some(SimFailure::Speed) {
            return Err(Error::Media(format!("{} rejects pitch {}", self.source.name, pitch)));
        }
        self.ledger.update(self.index, |r| r.pitch = pitch);
        Ok(())
    }

    fn position_ms(&self) -> u64 {
        let elapsed = self.anchor.map_or(0.0, |anchor| {
            Instant::now().duration_since(anchor).as_millis() as f64 * f64::from(self.speed)
        });
        (self.base_ms + elapsed as u64).min(self.source.duration_ms)
    }

    fn duration_ms(&self) -> u64 {
        if self.prepared {
            self.source.duration_ms
        } else {
            0
        }
    }

    fn output_session_id(&self) -> Option<i32> {
        Some(self.audio_session_id)
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.anchor = None;
        self.cancel_timer();
        self.ledger.update(self.index, |r| {
            r.playing = false;
            r.releases += 1;
        });
    }
}

impl Drop for SimPlayer {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}

#[derive(Debug, Default)]
struct FocusInner {
    deny: bool,
    sink: Option<FocusSink>,
    requests: u32,
    abandons: u32,
}

/// Focus policy that grants unless told to deny
///
/// Clones share state; keep one to deliver platform changes.
#[derive(Debug, Clone, Default)]
pub struct SimulatedFocus {
    inner: Arc<Mutex<FocusInner>>,
}

impl SimulatedFocus {
    pub fn set_deny(&self, deny: bool) {
        lock(&self.inner).deny = deny;
    }

    pub fn requests(&self) -> u32 {
        lock(&self.inner).requests
    }

    pub fn abandons(&self) -> u32 {
        lock(&self.inner).abandons
    }

    /// Deliver a change as the platform would; false before any request
    pub fn deliver(&self, change: FocusChange) -> bool {
        let sink = lock(&self.inner).sink.clone();
        sink.map_or(false, |sink| sink.deliver(change))
    }
}

impl FocusPolicy for SimulatedFocus {
    fn request(&mut self, changes: FocusSink) -> bool {
        let mut inner = lock(&self.inner);
        inner.requests += 1;
        inner.sink = Some(changes);
        !inner.deny
    }

    fn abandon(&mut self) -> bool {
        lock(&self.inner).abandons += 1;
        true
    }
}

/// Effect session broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Announcement {
    Open(i32),
    Close(i32),
}

/// Effect announcer that records every broadcast
#[derive(Debug, Clone, Default)]
pub struct RecordingAnnouncer {
    log: Arc<Mutex<Vec<Announcement>>>,
}

impl RecordingAnnouncer {
    pub fn announcements(&self) -> Vec<Announcement> {
        lock(&self.log).clone()
    }
}

impl EffectAnnouncer for RecordingAnnouncer {
    fn announce_open(&mut self, output_session_id: i32) {
        lock(&self.log).push(Announcement::Open(output_session_id));
    }

    fn announce_close(&mut self, output_session_id: i32) {
        lock(&self.log).push(Announcement::Close(output_session_id));
    }
}

#[derive(Debug, Default)]
struct RoutesInner {
    sink: Option<RouteSink>,
    registrations: u32,
}

/// Route source driven by hand
#[derive(Debug, Clone, Default)]
pub struct ManualRoutes {
    inner: Arc<Mutex<RoutesInner>>,
}

impl ManualRoutes {
    pub fn is_registered(&self) -> bool {
        lock(&self.inner).sink.is_some()
    }

    pub fn registrations(&self) -> u32 {
        lock(&self.inner).registrations
    }

    /// Report a change; false while nobody is listening
    pub fn emit(&self, change: RouteChange) -> bool {
        let sink = lock(&self.inner).sink.clone();
        sink.map_or(false, |sink| sink.deliver(change))
    }
}

impl RouteSource for ManualRoutes {
    fn register(&mut self, sink: RouteSink) -> Result<()> {
        let mut inner = lock(&self.inner);
        inner.sink = Some(sink);
        inner.registrations += 1;
        Ok(())
    }

    fn unregister(&mut self) {
        lock(&self.inner).sink = None;
    }
}

/// Handles onto the simulated services of one engine
#[derive(Debug, Clone, Default)]
pub struct SimHandles {
    pub ledger: SimLedger,
    pub focus: SimulatedFocus,
    pub effects: RecordingAnnouncer,
    pub noisy: ManualRoutes,
    pub devices: ManualRoutes,
}

/// Build a full set of simulated collaborators
pub fn simulated() -> (Collaborators, SimHandles) {
    let handles = SimHandles::default();
    let collaborators = Collaborators {
        backend: Box::new(SimulatedBackend::new(handles.ledger.clone())),
        focus: Box::new(handles.focus.clone()),
        effects: Box::new(handles.effects.clone()),
        noisy_route: Box::new(handles.noisy.clone()),
        device_route: Box::new(handles.devices.clone()),
    };
    (collaborators, handles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::engine::EngineMessage;
    use tokio::sync::mpsc;

    fn sink() -> (MediaEventSink, mpsc::UnboundedReceiver<EngineMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (MediaEventSink::new(Uuid::new_v4(), tx), rx)
    }

    fn next_event(rx: &mut mpsc::UnboundedReceiver<EngineMessage>) -> Option<MediaEvent> {
        match rx.try_recv() {
            Ok(EngineMessage::Media { event, .. }) => Some(event),
            _ => None,
        }
    }

    #[test]
    fn test_parse_source() {
        let source = SimSource::parse("sim://intro?duration_ms=1500&prepare_ms=20&fail=speed");
        assert_eq!(source.name, "intro");
        assert_eq!(source.duration_ms, 1500);
        assert_eq!(source.prepare_ms, 20);
        assert_eq!(source.fail, Some(SimFailure::Speed));

        let plain = SimSource::parse("sim://outro");
        assert_eq!(plain.duration_ms, DEFAULT_DURATION_MS);
        assert_eq!(plain.fail, None);
    }

    #[test]
    fn test_parse_ignores_bad_values() {
        let source = SimSource::parse("sim://x?duration_ms=soon&fail=never&color=red");
        assert_eq!(source.duration_ms, DEFAULT_DURATION_MS);
        assert_eq!(source.fail, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_player_completes_at_duration() {
        let ledger = SimLedger::default();
        let mut backend = SimulatedBackend::new(ledger.clone());
        let (events, mut rx) = sink();

        let mut player = backend.create("sim://a?duration_ms=1000", events);
        player.prepare();
        assert_eq!(next_event(&mut rx), Some(MediaEvent::Prepared));

        player.play();
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(player.position_ms(), 400);
        assert!(next_event(&mut rx).is_none());

        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(next_event(&mut rx), Some(MediaEvent::Completed));
        assert_eq!(player.position_ms(), 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_freezes_position() {
        let mut backend = SimulatedBackend::new(SimLedger::default());
        let (events, mut rx) = sink();
        let mut player = backend.create("sim://a?duration_ms=1000", events);
        player.prepare();
        next_event(&mut rx);

        player.play();
        tokio::time::sleep(Duration::from_millis(300)).await;
        player.pause();
        tokio::time::sleep(Duration::from_millis(2000)).await;

        assert_eq!(player.position_ms(), 300);
        assert!(next_event(&mut rx).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_prepare_failure_and_delay() {
        let mut backend = SimulatedBackend::new(SimLedger::default());

        let (events, mut rx) = sink();
        let mut broken = backend.create("sim://b?fail=prepare", events);
        broken.prepare();
        assert_eq!(
            next_event(&mut rx),
            Some(MediaEvent::Error {
                what: MEDIA_ERROR_UNKNOWN,
                extra: MEDIA_ERROR_IO
            })
        );

        let (events, mut rx) = sink();
        let mut slow = backend.create("sim://c?prepare_ms=50", events);
        slow.prepare();
        assert!(next_event(&mut rx).is_none());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(next_event(&mut rx), Some(MediaEvent::Prepared));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ledger_records_controls() {
        let ledger = SimLedger::default();
        let mut backend = SimulatedBackend::new(ledger.clone());
        let (events, _rx) = sink();
        let mut player = backend.create("sim://d?fail=speed", events);
        player.prepare();

        player.set_volume(0.5);
        assert!(player.set_speed(2.0).is_err());
        player.play();
        player.release();
        player.release();

        let record = ledger.latest("sim://d?fail=speed").unwrap();
        assert_eq!(record.volumes, vec![0.5]);
        assert_eq!(record.speed, 1.0);
        assert_eq!(record.play_calls, 1);
        assert_eq!(record.releases, 1);
        assert_eq!(record.audio_session_id, FIRST_AUDIO_SESSION_ID);
        assert!(!record.playing);
    }
}
