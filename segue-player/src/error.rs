//! Error types for segue-player
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for segue-player
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors raised by the underlying media engine
    #[error("Media engine error: {0}")]
    Media(String),

    /// Output route watcher errors
    #[error("Route watcher error: {0}")]
    Route(String),

    /// The engine task has exited; no further commands are accepted
    #[error("Playback engine is not running")]
    EngineStopped,

    /// Parameter outside its accepted range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Errors from the shared library
    #[error(transparent)]
    Common(#[from] segue_common::Error),
}

/// Convenience Result type using segue-player Error
pub type Result<T> = std::result::Result<T, Error>;
