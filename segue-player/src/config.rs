//! Configuration management for segue-player
//!
//! A single TOML file with four optional tables:
//!
//! ```toml
//! [playback]
//! crossfade_ms = 4000        # 0 selects plain handoff
//! default_speed = 1.0
//! default_pitch = 1.0
//! fade_curve = "linear"
//! position_interval_ms = 100
//! fade_tick_ms = 20
//! duck_volume = 0.2
//!
//! [focus]
//! enabled = true
//! pause_on_focus_loss = true
//!
//! [routes]
//! pause_on_noisy = true
//! resume_on_device_connect = false
//!
//! [logging]
//! level = "info"
//! ```
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (--crossfade-ms, --speed, --pitch)
//! 2. TOML configuration file (located by `segue_common::config`)
//! 3. Built-in defaults (code constants)

use crate::error::{Error, Result};
use segue_common::config::{load_toml, ConfigSource};
use segue_common::FadeCurve;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "SEGUE_CONFIG";

/// Application directory name under the platform config dir
pub const APP_NAME: &str = "segue";

/// Lowest output level
pub const MIN_VOLUME: f32 = 0.0;

/// Full output level
pub const MAX_VOLUME: f32 = 1.0;

/// Complete player configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PlayerConfig {
    #[serde(default)]
    pub playback: PlaybackConfig,

    #[serde(default)]
    pub focus: FocusConfig,

    #[serde(default)]
    pub routes: RoutesConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Transition, ramp and timer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Crossfade window in milliseconds; 0 selects plain handoff
    #[serde(default)]
    pub crossfade_ms: u64,

    #[serde(default = "default_rate")]
    pub default_speed: f32,

    #[serde(default = "default_rate")]
    pub default_pitch: f32,

    /// Shape of every volume ramp
    #[serde(default)]
    pub fade_curve: FadeCurve,

    /// Period of position ticks for the active session
    #[serde(default = "default_position_interval_ms")]
    pub position_interval_ms: u64,

    /// Period of fade ticks while a ramp is running
    #[serde(default = "default_fade_tick_ms")]
    pub fade_tick_ms: u64,

    /// Output level while another application holds transient focus
    #[serde(default = "default_duck_volume")]
    pub duck_volume: f32,
}

/// Audio focus handling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusConfig {
    /// When disabled, playback starts without asking the focus policy
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Pause when focus is lost (permanently or for a long transient)
    #[serde(default = "default_true")]
    pub pause_on_focus_loss: bool,
}

/// Output route reactions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutesConfig {
    /// Pause immediately when the output route becomes noisy (headphones unplugged)
    #[serde(default = "default_true")]
    pub pause_on_noisy: bool,

    /// Resume a paused session when a wired or bluetooth device connects
    #[serde(default)]
    pub resume_on_device_connect: bool,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_rate() -> f32 {
    1.0
}

fn default_position_interval_ms() -> u64 {
    100
}

fn default_fade_tick_ms() -> u64 {
    20
}

fn default_duck_volume() -> f32 {
    0.2
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            crossfade_ms: 0,
            default_speed: default_rate(),
            default_pitch: default_rate(),
            fade_curve: FadeCurve::default(),
            position_interval_ms: default_position_interval_ms(),
            fade_tick_ms: default_fade_tick_ms(),
            duck_volume: default_duck_volume(),
        }
    }
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pause_on_focus_loss: true,
        }
    }
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            pause_on_noisy: true,
            resume_on_device_connect: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl PlaybackConfig {
    pub fn position_interval(&self) -> Duration {
        Duration::from_millis(self.position_interval_ms)
    }

    pub fn fade_tick(&self) -> Duration {
        Duration::from_millis(self.fade_tick_ms)
    }
}

/// Command-line overrides applied on top of the file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub crossfade_ms: Option<u64>,
    pub speed: Option<f32>,
    pub pitch: Option<f32>,
    pub log_level: Option<String>,
}

impl PlayerConfig {
    /// Load from a resolved source, apply overrides and validate
    pub fn load(source: &ConfigSource, overrides: ConfigOverrides) -> Result<Self> {
        let mut config: PlayerConfig = load_toml(source)?;
        config.apply_overrides(overrides);
        config.validate()?;

        info!(
            "Configuration: crossfade={}ms curve={} speed={} pitch={} focus={}",
            config.playback.crossfade_ms,
            config.playback.fade_curve,
            config.playback.default_speed,
            config.playback.default_pitch,
            config.focus.enabled
        );
        Ok(config)
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(ms) = overrides.crossfade_ms {
            self.playback.crossfade_ms = ms;
        }
        if let Some(speed) = overrides.speed {
            self.playback.default_speed = speed;
        }
        if let Some(pitch) = overrides.pitch {
            self.playback.default_pitch = pitch;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }

    /// Reject values the engine cannot honor
    pub fn validate(&self) -> Result<()> {
        let p = &self.playback;
        validate_rate("default_speed", p.default_speed)?;
        validate_rate("default_pitch", p.default_pitch)?;

        if !(MIN_VOLUME..=MAX_VOLUME).contains(&p.duck_volume) {
            return Err(Error::Config(format!(
                "duck_volume must be within [{}, {}], got {}",
                MIN_VOLUME, MAX_VOLUME, p.duck_volume
            )));
        }
        if p.position_interval_ms == 0 {
            return Err(Error::Config("position_interval_ms must be positive".to_string()));
        }
        if p.fade_tick_ms == 0 {
            return Err(Error::Config("fade_tick_ms must be positive".to_string()));
        }
        Ok(())
    }
}

/// Speed and pitch multipliers must be finite and positive
pub fn validate_rate(name: &str, value: f32) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::Config(format!("{} must be a positive number, got {}", name, value)))
    }
}
