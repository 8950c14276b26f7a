//! Playback: track sessions, fades, focus, routes and the engine driving them

pub mod effects;
pub mod engine;
pub mod fader;
pub mod focus;
pub mod media;
pub mod position;
pub mod routes;
pub mod session;
pub mod sim;

pub use engine::{
    Collaborators, EngineMode, EngineStatus, PauseOutcome, PlayOutcome, PlaybackEngine, Track,
};
pub use focus::FocusChange;
pub use media::{MediaBackend, MediaEvent, MediaEventSink, MediaPlayer};
pub use position::PlaybackPosition;
pub use routes::{DeviceKind, OutputDevice, RouteChange};
pub use session::{SessionState, TrackSession};
