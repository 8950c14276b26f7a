//! Output route watchers
//!
//! Two platform notifications matter to playback: the current route becoming
//! "noisy" (headphones pulled, so audio would suddenly come out of the
//! speaker) and a new wired or bluetooth output device connecting. A
//! [`RouteWatcher`] wraps one platform [`RouteSource`] and keeps its
//! registration idempotent.

use crate::error::Result;
use crate::playback::engine::EngineMessage;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Wired,
    Bluetooth,
    Other,
}

/// A newly attached output device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputDevice {
    pub kind: DeviceKind,
    pub name: String,
}

impl OutputDevice {
    pub fn new(kind: DeviceKind, name: impl Into<String>) -> Self {
        Self { kind, name: name.into() }
    }

    /// Headphones and speakers a listener would expect playback to move to
    pub fn is_audio_output(&self) -> bool {
        matches!(self.kind, DeviceKind::Wired | DeviceKind::Bluetooth)
    }
}

/// Route change notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteChange {
    BecomingNoisy,
    DeviceConnected(OutputDevice),
}

/// Delivery channel for route changes
#[derive(Debug, Clone)]
pub struct RouteSink {
    tx: mpsc::UnboundedSender<EngineMessage>,
}

impl RouteSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<EngineMessage>) -> Self {
        Self { tx }
    }

    /// Post a change; returns false once the engine has stopped
    pub fn deliver(&self, change: RouteChange) -> bool {
        self.tx.send(EngineMessage::Route(change)).is_ok()
    }
}

/// Platform source of route notifications
pub trait RouteSource: Send {
    fn register(&mut self, sink: RouteSink) -> Result<()>;

    fn unregister(&mut self);
}

/// Idempotent registration around a route source
pub struct RouteWatcher {
    name: &'static str,
    source: Box<dyn RouteSource>,
    sink: RouteSink,
    registered: bool,
}

impl RouteWatcher {
    pub(crate) fn new(name: &'static str, source: Box<dyn RouteSource>, sink: RouteSink) -> Self {
        Self {
            name,
            source,
            sink,
            registered: false,
        }
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Start listening; failures are logged and leave the watcher unregistered
    pub fn register(&mut self) {
        if self.registered {
            return;
        }
        match self.source.register(self.sink.clone()) {
            Ok(()) => {
                self.registered = true;
                debug!("{} watcher registered", self.name);
            }
            Err(e) => warn!("{} watcher registration failed: {}", self.name, e),
        }
    }

    pub fn unregister(&mut self) {
        if self.registered {
            self.source.unregister();
            self.registered = false;
            debug!("{} watcher unregistered", self.name);
        }
    }
}

impl Drop for RouteWatcher {
    fn drop(&mut self) {
        self.unregister();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Counts {
        registrations: u32,
        unregistrations: u32,
    }

    #[derive(Clone, Default)]
    struct CountingSource {
        fail: bool,
        counts: Arc<Mutex<Counts>>,
    }

    impl RouteSource for CountingSource {
        fn register(&mut self, _sink: RouteSink) -> Result<()> {
            if self.fail {
                return Err(Error::Route("receiver unavailable".into()));
            }
            self.counts.lock().unwrap().registrations += 1;
            Ok(())
        }

        fn unregister(&mut self) {
            self.counts.lock().unwrap().unregistrations += 1;
        }
    }

    fn watcher(source: &CountingSource) -> RouteWatcher {
        let (tx, _rx) = mpsc::unbounded_channel();
        RouteWatcher::new("test", Box::new(source.clone()), RouteSink::new(tx))
    }

    #[test]
    fn test_register_is_idempotent() {
        let source = CountingSource::default();
        let mut watcher = watcher(&source);
        watcher.register();
        watcher.register();
        assert!(watcher.is_registered());
        watcher.unregister();
        watcher.unregister();
        assert!(!watcher.is_registered());

        let counts = source.counts.lock().unwrap();
        assert_eq!((counts.registrations, counts.unregistrations), (1, 1));
    }

    #[test]
    fn test_failed_registration_stays_unregistered() {
        let source = CountingSource {
            fail: true,
            ..Default::default()
        };
        let mut watcher = watcher(&source);
        watcher.register();
        assert!(!watcher.is_registered());
        drop(watcher);
        assert_eq!(source.counts.lock().unwrap().unregistrations, 0);
    }

    #[test]
    fn test_drop_unregisters() {
        let source = CountingSource::default();
        let mut watcher = watcher(&source);
        watcher.register();
        drop(watcher);
        assert_eq!(source.counts.lock().unwrap().unregistrations, 1);
    }

    #[test]
    fn test_audio_output_kinds() {
        assert!(OutputDevice::new(DeviceKind::Wired, "jack").is_audio_output());
        assert!(OutputDevice::new(DeviceKind::Bluetooth, "buds").is_audio_output());
        assert!(!OutputDevice::new(DeviceKind::Other, "hdmi").is_audio_output());
    }
}
