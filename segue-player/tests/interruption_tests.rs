//! Integration tests - audio focus, output routes and effect sessions

mod helpers;

use helpers::{config, track, Harness};
use segue_common::events::PlaybackState;
use segue_player::playback::sim::Announcement;
use segue_player::playback::{DeviceKind, FocusChange, OutputDevice, PauseOutcome, PlayOutcome, RouteChange};

async fn playing(crossfade_ms: u64) -> Harness {
    let mut h = Harness::start(crossfade_ms);
    h.load(&track("a", 60_000)).await;
    assert_eq!(h.engine.play().await.unwrap(), PlayOutcome::Started);
    h.advance(500).await;
    h
}

#[tokio::test(start_paused = true)]
async fn test_focus_loss_pauses_and_gain_resumes() {
    let mut h = playing(0).await;
    let a = track("a", 60_000);

    assert!(h.services.focus.deliver(FocusChange::Loss));
    h.advance(50).await;
    assert_eq!(h.status().await.state, PlaybackState::Paused);
    assert!(!h.services.ledger.latest(&a).unwrap().playing);
    // Focus is kept so the platform can hand it back
    assert_eq!(h.services.focus.abandons(), 0);
    assert!(h.status().await.focus.restore_on_gain);

    assert!(h.services.focus.deliver(FocusChange::Gain));
    h.advance(50).await;
    let status = h.status().await;
    assert_eq!(status.state, PlaybackState::Playing);
    assert!(!status.focus.restore_on_gain);

    let record = h.services.ledger.latest(&a).unwrap();
    assert!(record.playing);
    assert_eq!(record.play_calls, 2);
}

#[tokio::test(start_paused = true)]
async fn test_user_pause_cancels_resume_on_gain() {
    let mut h = playing(0).await;

    h.services.focus.deliver(FocusChange::LossTransient);
    h.advance(50).await;
    assert_eq!(h.engine.pause(false).await.unwrap(), PauseOutcome::NotPlaying);

    h.services.focus.deliver(FocusChange::Gain);
    h.advance(50).await;
    assert_eq!(h.status().await.state, PlaybackState::Paused);
}

#[tokio::test(start_paused = true)]
async fn test_duck_lowers_volume_until_gain() {
    let mut h = playing(0).await;

    h.services.focus.deliver(FocusChange::LossTransientCanDuck);
    h.advance(50).await;
    let status = h.status().await;
    assert_eq!(status.state, PlaybackState::Playing);
    assert!((status.volume - 0.2).abs() < 1e-6);
    assert!(status.focus.duck_requested);

    h.services.focus.deliver(FocusChange::Gain);
    h.advance(50).await;
    assert_eq!(h.status().await.volume, 1.0);
}

#[tokio::test(start_paused = true)]
async fn test_focus_loss_ignored_when_pausing_disabled() {
    let mut cfg = config(0);
    cfg.focus.pause_on_focus_loss = false;
    let mut h = Harness::with_config(cfg);
    h.load(&track("a", 60_000)).await;
    h.engine.play().await.unwrap();

    h.services.focus.deliver(FocusChange::Loss);
    h.advance(50).await;
    assert_eq!(h.status().await.state, PlaybackState::Playing);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_focus_never_asks_policy() {
    let mut cfg = config(0);
    cfg.focus.enabled = false;
    let mut h = Harness::with_config(cfg);
    h.services.focus.set_deny(true);

    h.load(&track("a", 60_000)).await;
    assert_eq!(h.engine.play().await.unwrap(), PlayOutcome::Started);
    assert_eq!(h.services.focus.requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_noisy_watcher_follows_playing_state() {
    let mut h = Harness::start(1000);
    h.load(&track("a", 60_000)).await;
    assert!(!h.services.noisy.is_registered());

    h.engine.play().await.unwrap();
    h.status().await;
    assert!(h.services.noisy.is_registered());

    h.engine.pause(true).await.unwrap();
    h.status().await;
    assert!(!h.services.noisy.is_registered());

    h.engine.play().await.unwrap();
    h.status().await;
    assert!(h.services.noisy.is_registered());
    assert_eq!(h.services.noisy.registrations(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_becoming_noisy_pauses_without_fade() {
    let mut h = playing(1000).await;
    h.advance(1000).await;
    let a = track("a", 60_000);

    assert!(h.services.noisy.emit(RouteChange::BecomingNoisy));
    h.advance(1).await;

    let status = h.status().await;
    assert_eq!(status.state, PlaybackState::Paused);
    let record = h.services.ledger.latest(&a).unwrap();
    assert_eq!(record.pause_calls, 1);
    assert_eq!(record.volumes.last(), Some(&0.0));
    assert!(!h.services.noisy.is_registered());
    assert_eq!(h.services.focus.abandons(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_becoming_noisy_cancels_pending_autoplay() {
    let mut h = Harness::start(0);
    let slow = "sim://b?duration_ms=3000&prepare_ms=500";

    h.load(&track("a", 1000)).await;
    h.set_next(slow);
    h.engine.play().await.unwrap();
    h.advance(1100).await;

    // a ended; b is still preparing and will start when ready
    let status = h.status().await;
    assert_eq!(status.current_uri.as_deref(), Some(slow));
    assert_eq!(status.state, PlaybackState::Playing);
    assert!(h.services.noisy.is_registered());

    assert!(h.services.noisy.emit(RouteChange::BecomingNoisy));
    h.advance(1000).await;

    assert_eq!(h.status().await.state, PlaybackState::Paused);
    let record = h.services.ledger.latest(slow).unwrap();
    assert_eq!(record.play_calls, 0);
    assert!(!record.playing);
    assert!(!h.services.noisy.is_registered());
}

#[tokio::test(start_paused = true)]
async fn test_duck_survives_track_change() {
    let mut h = Harness::start(0);
    let b = track("b", 3000);

    h.load(&track("a", 1000)).await;
    h.set_next(&b);
    h.engine.play().await.unwrap();
    h.advance(300).await;

    h.services.focus.deliver(FocusChange::LossTransientCanDuck);
    h.advance(1000).await;

    let status = h.status().await;
    assert_eq!(status.current_uri.as_deref(), Some(b.as_str()));
    assert_eq!(status.state, PlaybackState::Playing);
    assert!((status.volume - 0.2).abs() < 1e-6, "volume {}", status.volume);
    let record = h.services.ledger.latest(&b).unwrap();
    assert!((record.volumes.last().unwrap() - 0.2).abs() < 1e-6);
    // The handoff keeps the focus granted at play
    assert_eq!(h.services.focus.requests(), 1);

    h.services.focus.deliver(FocusChange::Gain);
    h.advance(50).await;
    assert_eq!(h.status().await.volume, 1.0);
}

#[tokio::test(start_paused = true)]
async fn test_device_connect_resumes_when_enabled() {
    let mut cfg = config(0);
    cfg.routes.resume_on_device_connect = true;
    let mut h = Harness::with_config(cfg);
    assert!(h.services.devices.is_registered());

    h.load(&track("a", 60_000)).await;
    h.engine.play().await.unwrap();
    h.engine.pause(true).await.unwrap();

    h.services
        .devices
        .emit(RouteChange::DeviceConnected(OutputDevice::new(DeviceKind::Other, "HDMI")));
    h.advance(10).await;
    assert_eq!(h.status().await.state, PlaybackState::Paused);

    h.services
        .devices
        .emit(RouteChange::DeviceConnected(OutputDevice::new(DeviceKind::Bluetooth, "Earbuds")));
    h.advance(10).await;
    assert_eq!(h.status().await.state, PlaybackState::Playing);

    h.engine.release().await.unwrap();
    assert!(!h.services.devices.is_registered());
}

#[tokio::test(start_paused = true)]
async fn test_device_watcher_off_by_default() {
    let h = Harness::start(0);
    assert!(!h.services.devices.is_registered());
}

#[tokio::test(start_paused = true)]
async fn test_effect_sessions_balance_across_tracks() {
    let mut h = Harness::start(0);
    h.load(&track("a", 500)).await;
    h.set_next(&track("b", 500));
    h.engine.play().await.unwrap();
    h.advance(700).await;

    let status = h.status().await;
    assert_eq!(status.audio_session_id, Some(1001));

    h.engine.pause(false).await.unwrap();
    h.engine.play().await.unwrap();
    h.engine.release().await.unwrap();

    assert_eq!(
        h.services.effects.announcements(),
        vec![
            Announcement::Open(1000),
            Announcement::Close(1000),
            Announcement::Open(1001),
            Announcement::Close(1001),
            Announcement::Open(1001),
            Announcement::Close(1001),
        ]
    );
}
