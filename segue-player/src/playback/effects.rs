//! Audio effect session announcements
//!
//! Equalizers and similar processors attach to an output session once it is
//! announced as open. [`EffectSession`] guarantees one close per open, even
//! when the engine closes on paths where nothing was opened.

use tracing::debug;

/// Broadcast channel for effect session announcements
pub trait EffectAnnouncer: Send {
    fn announce_open(&mut self, output_session_id: i32);

    fn announce_close(&mut self, output_session_id: i32);
}

/// Tracks the announced output session
pub struct EffectSession {
    announcer: Box<dyn EffectAnnouncer>,
    open: Option<i32>,
}

impl EffectSession {
    pub fn new(announcer: Box<dyn EffectAnnouncer>) -> Self {
        Self { announcer, open: None }
    }

    pub fn open_id(&self) -> Option<i32> {
        self.open
    }

    /// Announce `id`; a different session still open is closed first
    pub fn open(&mut self, id: i32) {
        match self.open {
            Some(current) if current == id => return,
            Some(_) => self.close(),
            None => {}
        }
        self.announcer.announce_open(id);
        self.open = Some(id);
        debug!("Effect session {} opened", id);
    }

    /// Withdraw the open session; harmless when nothing is open
    pub fn close(&mut self) {
        if let Some(id) = self.open.take() {
            self.announcer.announce_close(id);
            debug!("Effect session {} closed", id);
        }
    }
}
