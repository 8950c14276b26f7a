//! Audio focus arbitration
//!
//! The platform decides which application may produce audible output. The
//! engine asks for focus when playback starts and gives it up on pause and
//! release. Platform focus changes arrive later through a [`FocusSink`] and
//! are reduced to three intents:
//!
//! | Platform change          | Intent  |
//! |--------------------------|---------|
//! | `Gain`                   | `Gain`  |
//! | `Loss`, `LossTransient`  | `Loss`  |
//! | `LossTransientCanDuck`   | `Duck`  |

use crate::playback::engine::EngineMessage;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

/// Focus change as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusChange {
    Gain,
    Loss,
    LossTransient,
    LossTransientCanDuck,
}

/// What the engine should do about a focus change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusIntent {
    /// Resume, or restore full volume if still playing
    Gain,
    /// Potential pause
    Loss,
    /// Keep playing at reduced volume
    Duck,
}

impl From<FocusChange> for FocusIntent {
    fn from(change: FocusChange) -> Self {
        match change {
            FocusChange::Gain => FocusIntent::Gain,
            FocusChange::Loss | FocusChange::LossTransient => FocusIntent::Loss,
            FocusChange::LossTransientCanDuck => FocusIntent::Duck,
        }
    }
}

/// Delivery channel for platform focus changes
#[derive(Debug, Clone)]
pub struct FocusSink {
    tx: mpsc::UnboundedSender<EngineMessage>,
}

impl FocusSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<EngineMessage>) -> Self {
        Self { tx }
    }

    /// Post a change; returns false once the engine has stopped
    pub fn deliver(&self, change: FocusChange) -> bool {
        self.tx.send(EngineMessage::Focus(change)).is_ok()
    }
}

/// Platform focus provider
pub trait FocusPolicy: Send {
    /// Ask for focus; later changes are delivered to `changes`
    fn request(&mut self, changes: FocusSink) -> bool;

    fn abandon(&mut self) -> bool;
}

/// Focus bookkeeping of one engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FocusState {
    pub granted: bool,
    pub duck_requested: bool,
    pub restore_on_gain: bool,
}

/// Owns the focus policy and the engine's focus state
pub struct FocusArbiter {
    policy: Box<dyn FocusPolicy>,
    sink: FocusSink,
    enabled: bool,
    state: FocusState,
}

impl FocusArbiter {
    pub(crate) fn new(policy: Box<dyn FocusPolicy>, sink: FocusSink, enabled: bool) -> Self {
        Self {
            policy,
            sink,
            enabled,
            state: FocusState::default(),
        }
    }

    pub fn state(&self) -> FocusState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Request focus; always true when focus handling is disabled
    pub fn request(&mut self) -> bool {
        if !self.enabled {
            return true;
        }
        let granted = self.policy.request(self.sink.clone());
        self.state.granted = granted;
        debug!("Audio focus requested: granted={}", granted);
        granted
    }

    pub fn abandon(&mut self) -> bool {
        if !self.enabled {
            return true;
        }
        self.state.granted = false;
        self.state.duck_requested = false;
        let abandoned = self.policy.abandon();
        debug!("Audio focus abandoned: {}", abandoned);
        abandoned
    }

    /// Translate a platform change and update bookkeeping
    pub fn interpret(&mut self, change: FocusChange, is_playing: bool) -> FocusIntent {
        let intent = FocusIntent::from(change);
        match intent {
            FocusIntent::Gain => {
                self.state.granted = true;
                self.state.duck_requested = false;
            }
            FocusIntent::Loss => {
                self.state.granted = false;
                self.state.restore_on_gain = is_playing;
            }
            FocusIntent::Duck => {
                self.state.duck_requested = true;
            }
        }
        debug!("Focus change {:?} -> {:?} ({:?})", change, intent, self.state);
        intent
    }

    /// Consume the "resume on gain" flag
    pub fn take_restore_on_gain(&mut self) -> bool {
        std::mem::take(&mut self.state.restore_on_gain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedPolicy {
        grant: bool,
        requests: u32,
        abandons: u32,
    }

    impl FocusPolicy for FixedPolicy {
        fn request(&mut self, _changes: FocusSink) -> bool {
            self.requests += 1;
            self.grant
        }

        fn abandon(&mut self) -> bool {
            self.abandons += 1;
            true
        }
    }

    fn arbiter(grant: bool, enabled: bool) -> FocusArbiter {
        let (tx, _rx) = mpsc::unbounded_channel();
        let policy = FixedPolicy { grant, requests: 0, abandons: 0 };
        FocusArbiter::new(Box::new(policy), FocusSink::new(tx), enabled)
    }

    #[test]
    fn test_change_mapping() {
        assert_eq!(FocusIntent::from(FocusChange::Gain), FocusIntent::Gain);
        assert_eq!(FocusIntent::from(FocusChange::Loss), FocusIntent::Loss);
        assert_eq!(FocusIntent::from(FocusChange::LossTransient), FocusIntent::Loss);
        assert_eq!(FocusIntent::from(FocusChange::LossTransientCanDuck), FocusIntent::Duck);
    }

    #[test]
    fn test_request_records_grant() {
        let mut granted = arbiter(true, true);
        assert!(granted.request());
        assert!(granted.state().granted);

        let mut denied = arbiter(false, true);
        assert!(!denied.request());
        assert!(!denied.state().granted);
    }

    #[test]
    fn test_disabled_focus_always_grants() {
        let mut arbiter = arbiter(false, false);
        assert!(arbiter.request());
        assert!(arbiter.abandon());
    }

    #[test]
    fn test_loss_records_restore_flag() {
        let mut arbiter = arbiter(true, true);
        arbiter.request();

        assert_eq!(arbiter.interpret(FocusChange::LossTransient, true), FocusIntent::Loss);
        assert!(arbiter.state().restore_on_gain);
        assert!(!arbiter.state().granted);

        assert_eq!(arbiter.interpret(FocusChange::Gain, false), FocusIntent::Gain);
        assert!(arbiter.take_restore_on_gain());
        assert!(!arbiter.take_restore_on_gain());
    }

    #[test]
    fn test_duck_then_gain_clears_duck() {
        let mut arbiter = arbiter(true, true);
        arbiter.interpret(FocusChange::LossTransientCanDuck, true);
        assert!(arbiter.state().duck_requested);

        arbiter.interpret(FocusChange::Gain, true);
        assert!(!arbiter.state().duck_requested);
    }

    #[test]
    fn test_loss_while_paused_does_not_restore() {
        let mut arbiter = arbiter(true, true);
        arbiter.interpret(FocusChange::Loss, false);
        assert!(!arbiter.take_restore_on_gain());
    }
}
