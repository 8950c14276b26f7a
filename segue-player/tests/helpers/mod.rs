//! Test harness for playback engine integration tests
//!
//! Runs a real engine against the simulated services. Tests use a paused
//! tokio clock so every ramp and track boundary is deterministic.

#![allow(dead_code)]

use segue_common::events::{PlaybackEvent, PlaybackState};
use segue_player::config::PlayerConfig;
use segue_player::playback::sim::{simulated, SimHandles};
use segue_player::playback::{EngineStatus, PlaybackEngine, Track};
use std::time::Duration;
use tokio::sync::mpsc;

pub struct Harness {
    pub engine: PlaybackEngine,
    pub services: SimHandles,
    events: mpsc::UnboundedReceiver<PlaybackEvent>,
    seen: Vec<PlaybackEvent>,
}

pub fn config(crossfade_ms: u64) -> PlayerConfig {
    let mut config = PlayerConfig::default();
    config.playback.crossfade_ms = crossfade_ms;
    config
}

/// Source URI for the simulated backend
pub fn track(name: &str, duration_ms: u64) -> String {
    format!("sim://{}?duration_ms={}", name, duration_ms)
}

impl Harness {
    pub fn start(crossfade_ms: u64) -> Self {
        Self::with_config(config(crossfade_ms))
    }

    pub fn with_config(config: PlayerConfig) -> Self {
        let (collaborators, services) = simulated();
        let (engine, events) = PlaybackEngine::spawn(config, collaborators);
        Self {
            engine,
            services,
            events,
            seen: Vec::new(),
        }
    }

    /// Load `uri` as the current source and wait until it is ready
    pub async fn load(&mut self, uri: &str) -> bool {
        self.engine.set_data_source(Track::new(uri), false).await.unwrap()
    }

    pub fn set_next(&self, uri: &str) {
        self.engine.set_next_data_source(Some(Track::new(uri))).unwrap();
    }

    /// Let virtual time pass, then flush everything the engine queued
    pub async fn advance(&mut self, ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        self.status().await;
    }

    pub async fn status(&mut self) -> EngineStatus {
        let status = self.engine.status().await.unwrap();
        self.drain();
        status
    }

    /// Collect events delivered so far
    pub fn drain(&mut self) -> &[PlaybackEvent] {
        while let Ok(event) = self.events.try_recv() {
            self.seen.push(event);
        }
        &self.seen
    }

    pub fn event_types(&mut self) -> Vec<&'static str> {
        self.drain().iter().map(|e| e.event_type()).collect()
    }

    pub fn count(&mut self, event_type: &str) -> usize {
        self.drain().iter().filter(|e| e.event_type() == event_type).count()
    }

    /// Every state the engine reported, in order
    pub fn states(&mut self) -> Vec<PlaybackState> {
        self.drain()
            .iter()
            .filter_map(|e| match e {
                PlaybackEvent::PlaybackStateChanged { new_state, .. } => Some(*new_state),
                _ => None,
            })
            .collect()
    }

    /// Position of `event_type` in the event log
    pub fn index_of(&mut self, event_type: &str) -> Option<usize> {
        self.drain().iter().position(|e| e.event_type() == event_type)
    }
}

pub fn is_non_decreasing(values: &[f32]) -> bool {
    values.windows(2).all(|w| w[0] <= w[1])
}

pub fn is_non_increasing(values: &[f32]) -> bool {
    values.windows(2).all(|w| w[0] >= w[1])
}
