//! Time-bounded volume ramps
//!
//! A [`Fader`] moves a level from one value to another over a fixed duration.
//! It does not know which session it belongs to: values are pushed into a
//! [`FadeListener`] passed on each call, and a background ticker only signals
//! "time to sample again" through the callback given at start. The owner feeds
//! those signals back into [`Fader::tick`] from its own execution context.
//!
//! # Lifecycle
//!
//! - `start` with a zero duration applies the target immediately and reports
//!   completion before returning (no `Fader` is created).
//! - `tick` applies the interpolated value; once the duration has elapsed it
//!   applies the exact target, reports completion and stops the ticker.
//! - `stop` cancels the ticker and reports an incomplete finish. Nothing is
//!   applied after `stop` returns.
//!
//! Dropping a `Fader` stops its ticker without notifying the listener.

use segue_common::FadeCurve;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Receiver of ramp values
pub trait FadeListener {
    /// A new level to apply
    fn on_update(&mut self, value: f32);

    /// The ramp ended; `completed` is false when it was cancelled
    fn on_finish(&mut self, completed: bool);
}

/// Shape and extent of one ramp
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeSpec {
    pub from: f32,
    pub to: f32,
    pub duration: Duration,
    pub curve: FadeCurve,
}

/// A running volume ramp
pub struct Fader {
    spec: FadeSpec,
    started_at: Instant,
    ticker: Option<JoinHandle<()>>,
}

impl Fader {
    /// Begin a ramp
    ///
    /// `on_tick` runs on the ticker task every `tick_every`; returning `false`
    /// ends the ticker (the owner went away). Returns `None` when the ramp
    /// completed synchronously.
    pub fn start<L, F>(
        spec: FadeSpec,
        now: Instant,
        tick_every: Duration,
        on_tick: F,
        listener: &mut L,
    ) -> Option<Fader>
    where
        L: FadeListener + ?Sized,
        F: Fn() -> bool + Send + 'static,
    {
        if spec.duration.is_zero() {
            listener.on_update(spec.to);
            listener.on_finish(true);
            return None;
        }

        listener.on_update(spec.from);
        Some(Fader {
            spec,
            started_at: now,
            ticker: Some(spawn_ticker(tick_every, on_tick)),
        })
    }

    /// Normalized progress in `[0.0, 1.0]`
    pub fn progress(&self, now: Instant) -> f32 {
        let elapsed = now.saturating_duration_since(self.started_at);
        (elapsed.as_secs_f32() / self.spec.duration.as_secs_f32()).min(1.0)
    }

    pub fn is_complete(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started_at) >= self.spec.duration
    }

    /// Level of the ramp at `now`
    pub fn value_at(&self, now: Instant) -> f32 {
        if self.is_complete(now) {
            return self.spec.to;
        }
        self.spec
            .curve
            .interpolate(self.spec.from, self.spec.to, self.progress(now))
    }

    /// Apply the current level; returns true when the ramp just completed
    pub fn tick<L>(&mut self, now: Instant, listener: &mut L) -> bool
    where
        L: FadeListener + ?Sized,
    {
        if self.is_complete(now) {
            self.halt_ticker();
            listener.on_update(self.spec.to);
            listener.on_finish(true);
            true
        } else {
            listener.on_update(self.value_at(now));
            false
        }
    }

    /// Cancel the ramp, leaving the last applied level in place
    pub fn stop<L>(mut self, listener: &mut L)
    where
        L: FadeListener + ?Sized,
    {
        self.halt_ticker();
        listener.on_finish(false);
    }

    fn halt_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

impl Drop for Fader {
    fn drop(&mut self) {
        self.halt_ticker();
    }
}

impl std::fmt::Debug for Fader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fader")
            .field("spec", &self.spec)
            .field("started_at", &self.started_at)
            .field("ticking", &self.ticker.is_some())
            .finish()
    }
}

fn spawn_ticker<F>(period: Duration, on_tick: F) -> JoinHandle<()>
where
    F: Fn() -> bool + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            if !on_tick() {
                break;
            }
        }
    })
}
