//! Playback engine module
//!
//! **Module Structure:**
//! - `core.rs`: Public handle, engine task, message dispatch, state reporting
//! - `transport.rs`: Caller commands (sources, play, pause, seek, mode, release)
//! - `transitions.rs`: Session events, track boundaries and crossfades
//! - `interrupts.rs`: Audio focus and output route reactions
//! - `diagnostics.rs`: Status snapshot
//!
//! All engine state lives in one tokio task. Caller commands, media player
//! events, position and fade ticks, focus changes and route changes are
//! messages on a single queue and are handled strictly one at a time.

mod core;
mod diagnostics;
mod interrupts;
mod transitions;
mod transport;

pub use self::core::PlaybackEngine;
pub use diagnostics::EngineStatus;

use crate::playback::effects::EffectAnnouncer;
use crate::playback::focus::{FocusChange, FocusPolicy};
use crate::playback::media::{MediaBackend, MediaEvent};
use crate::playback::routes::{RouteChange, RouteSource};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::oneshot;
use uuid::Uuid;

/// A playable source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub uri: String,

    /// Applied once the session is ready; 0 starts from the beginning
    #[serde(default)]
    pub start_position_ms: u64,
}

impl Track {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            start_position_ms: 0,
        }
    }

    pub fn starting_at(mut self, position_ms: u64) -> Self {
        self.start_position_ms = position_ms;
        self
    }
}

/// Result of `play()`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlayOutcome {
    Started,
    AlreadyPlaying,
    /// No session is ready yet
    NotInitialized,
    /// The focus policy refused; nothing was started
    FocusDenied,
}

/// Result of `pause()`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PauseOutcome {
    /// The player has paused
    Paused,
    NotPlaying,
    /// Playback resumed or the session went away before the pause took effect
    Superseded,
}

/// Transition strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum EngineMode {
    /// Sequential handoff at the track boundary, no volume ramps
    PlainHandoff,
    /// Overlapping sessions with inverse ramps over `duration_ms`
    Crossfade { duration_ms: u64 },
}

impl EngineMode {
    pub fn from_duration(duration_ms: u64) -> Self {
        if duration_ms == 0 {
            EngineMode::PlainHandoff
        } else {
            EngineMode::Crossfade { duration_ms }
        }
    }

    pub fn is_crossfade(&self) -> bool {
        matches!(self, EngineMode::Crossfade { .. })
    }

    /// Ramp length for fades; zero means levels change instantly
    pub fn fade_duration(&self) -> Duration {
        match self {
            EngineMode::PlainHandoff => Duration::ZERO,
            EngineMode::Crossfade { duration_ms } => Duration::from_millis(*duration_ms),
        }
    }

    pub fn duration_ms(&self) -> u64 {
        match self {
            EngineMode::PlainHandoff => 0,
            EngineMode::Crossfade { duration_ms } => *duration_ms,
        }
    }
}

impl std::fmt::Display for EngineMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineMode::PlainHandoff => write!(f, "plain handoff"),
            EngineMode::Crossfade { duration_ms } => write!(f, "crossfade {}ms", duration_ms),
        }
    }
}

/// External services the engine drives
pub struct Collaborators {
    pub backend: Box<dyn MediaBackend>,
    pub focus: Box<dyn FocusPolicy>,
    pub effects: Box<dyn EffectAnnouncer>,
    /// Reports the output route becoming noisy
    pub noisy_route: Box<dyn RouteSource>,
    /// Reports newly connected output devices
    pub device_route: Box<dyn RouteSource>,
}

/// Caller commands
pub(crate) enum Command {
    SetDataSource {
        track: Track,
        force: bool,
        reply: oneshot::Sender<bool>,
    },
    SetNextDataSource {
        track: Option<Track>,
    },
    Play {
        reply: oneshot::Sender<PlayOutcome>,
    },
    Pause {
        force: bool,
        reply: oneshot::Sender<PauseOutcome>,
    },
    Seek {
        position_ms: u64,
        force: bool,
        reply: oneshot::Sender<u64>,
    },
    SetSpeedPitch {
        speed: f32,
        pitch: f32,
    },
    SetCrossfadeDuration {
        duration_ms: u64,
    },
    MaybeSwitchToCrossfade {
        duration_ms: u64,
        reply: oneshot::Sender<bool>,
    },
    Status {
        reply: oneshot::Sender<EngineStatus>,
    },
    Release {
        reply: oneshot::Sender<()>,
    },
    /// Last handle dropped
    Shutdown,
}

/// Everything the engine task reacts to
pub(crate) enum EngineMessage {
    Command(Command),
    Media { session: Uuid, event: MediaEvent },
    PositionTick { session: Uuid },
    FadeTick { session: Uuid },
    Focus(FocusChange),
    Route(RouteChange),
}
