//! Audio focus and output route reactions

use super::core::EngineCore;
use crate::config::MAX_VOLUME;
use crate::playback::focus::{FocusChange, FocusIntent};
use crate::playback::routes::RouteChange;
use crate::playback::session::FadePurpose;
use segue_common::events::PlaybackState;
use tracing::{debug, info};

impl EngineCore {
    pub(super) fn on_focus_change(&mut self, change: FocusChange) {
        if !self.focus.is_enabled() {
            debug!("Ignoring focus change {:?}, focus handling disabled", change);
            return;
        }

        let playing = self.is_playing() && !self.is_pausing();
        let fade = self.mode.fade_duration();

        match self.focus.interpret(change, playing) {
            FocusIntent::Gain => {
                if playing {
                    self.fade_current(MAX_VOLUME, fade, FadePurpose::Adjust);
                } else if self.focus.take_restore_on_gain() {
                    info!("Audio focus regained, resuming");
                    self.resume_after_interruption();
                }
            }
            FocusIntent::Loss => {
                if playing && self.config.focus.pause_on_focus_loss {
                    info!("Audio focus lost, pausing");
                    self.begin_pause(false, None);
                }
            }
            FocusIntent::Duck => {
                if playing {
                    let duck = self.config.playback.duck_volume;
                    debug!("Ducking to {}", duck);
                    self.fade_current(duck, fade, FadePurpose::Adjust);
                }
            }
        }
    }

    pub(super) fn on_route_change(&mut self, change: RouteChange) {
        match change {
            RouteChange::BecomingNoisy => {
                // Covers a next track waiting to autoplay
                if self.playback_state() == PlaybackState::Playing {
                    info!("Output becoming noisy, pausing");
                    self.focus.take_restore_on_gain();
                    self.begin_pause(true, None);
                }
            }
            RouteChange::DeviceConnected(device) => {
                if !device.is_audio_output() {
                    debug!("Ignoring connected device {:?}", device);
                    return;
                }
                if self.config.routes.resume_on_device_connect && !self.is_playing() {
                    info!("Output device {} connected, resuming", device.name);
                    self.resume_after_interruption();
                }
            }
        }
    }

    /// Start the current session again without a caller waiting on it
    fn resume_after_interruption(&mut self) {
        if !self.current.as_ref().map_or(false, |s| s.is_usable()) {
            debug!("Nothing to resume");
            return;
        }
        if self.focus.request() {
            self.start_current();
        } else {
            info!("Audio focus denied, staying paused");
        }
    }
}
