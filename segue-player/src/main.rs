//! Segue Player - Main entry point
//!
//! Plays a list of tracks through the playback engine backed by simulated
//! platform services, printing every engine event as it happens.
//!
//! ```text
//! segue-player --crossfade-ms 2000 "sim://one?duration_ms=8000" "sim://two?duration_ms=6000"
//! ```

use std::collections::VecDeque;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use segue_common::config::resolve_config_path;
use segue_common::events::{PlaybackEvent, PlaybackState};
use segue_common::human_time::{format_millis, format_progress};
use segue_player::config::{ConfigOverrides, PlayerConfig, APP_NAME, CONFIG_ENV_VAR};
use segue_player::playback::sim::simulated;
use segue_player::playback::{PlayOutcome, PlaybackEngine, Track};
use tokio::signal;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for segue-player
#[derive(Parser, Debug)]
#[command(name = "segue-player")]
#[command(about = "Track-to-track playback with gapless handoff and crossfades")]
#[command(version)]
struct Args {
    /// Track URIs to play in order
    #[arg(required = true)]
    tracks: Vec<String>,

    /// Configuration file
    #[arg(short, long, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// Crossfade window in milliseconds; 0 selects plain handoff
    #[arg(long)]
    crossfade_ms: Option<u64>,

    /// Playback speed multiplier
    #[arg(long)]
    speed: Option<f32>,

    /// Pitch multiplier
    #[arg(long)]
    pitch: Option<f32>,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let source = resolve_config_path(args.config.as_deref(), CONFIG_ENV_VAR, APP_NAME);
    let overrides = ConfigOverrides {
        crossfade_ms: args.crossfade_ms,
        speed: args.speed,
        pitch: args.pitch,
        log_level: args.log_level.clone(),
    };
    let config = PlayerConfig::load(&source, overrides).context("Failed to load configuration")?;

    // RUST_LOG wins over the configured level
    let level = config.logging.level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("segue_player={level},segue_common={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Segue Player ({} tracks)", args.tracks.len());
    match source.path() {
        Some(path) => info!("Configuration file: {}", path.display()),
        None => info!("Configuration: built-in defaults"),
    }

    let (collaborators, _services) = simulated();
    let (engine, mut events) = PlaybackEngine::spawn(config, collaborators);
    let mut pending: VecDeque<Track> = args.tracks.iter().map(Track::new).collect();

    if !start_first_playable(&engine, &mut pending).await? {
        engine.release().await.context("Failed to release engine")?;
        bail!("None of the tracks could be prepared");
    }

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut started = false;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    debug!("Event stream closed");
                    break;
                };
                print_event(&event, args.json)?;

                match &event {
                    PlaybackEvent::PlaybackStateChanged { new_state, .. } => {
                        if *new_state == PlaybackState::Playing {
                            started = true;
                        } else if *new_state == PlaybackState::Idle && started {
                            info!("Playlist finished");
                            break;
                        }
                    }
                    PlaybackEvent::TrackWentToNext { .. } => {
                        pending.pop_front();
                        engine.set_next_data_source(pending.front().cloned())?;
                    }
                    PlaybackEvent::TrackFailed { uri, .. } => {
                        // A failed next track is skipped in favor of the one after it
                        if pending.front().map_or(false, |t| t.uri == *uri) {
                            warn!("Skipping {}", uri);
                            pending.pop_front();
                            engine.set_next_data_source(pending.front().cloned())?;
                        }
                    }
                    _ => {}
                }
            }
            _ = &mut shutdown => break,
        }
    }

    match engine.status().await {
        Ok(status) if args.json => println!("{}", status.to_json()?),
        Ok(status) => info!(
            "Final state {} at {}",
            status.state,
            format_progress(status.position.played_ms, status.position.total_ms)
        ),
        Err(e) => debug!("No final status: {}", e),
    }

    if let Err(e) = engine.release().await {
        debug!("Engine already stopped: {}", e);
    }
    info!("Segue Player stopped");
    Ok(())
}

/// Load tracks from the front of `pending` until one prepares, then play it
async fn start_first_playable(engine: &PlaybackEngine, pending: &mut VecDeque<Track>) -> Result<bool> {
    while let Some(track) = pending.pop_front() {
        if !engine.set_data_source(track.clone(), false).await? {
            warn!("Could not prepare {}", track.uri);
            continue;
        }

        engine.set_next_data_source(pending.front().cloned())?;
        match engine.play().await? {
            PlayOutcome::Started | PlayOutcome::AlreadyPlaying => return Ok(true),
            outcome => {
                error!("Playback did not start: {:?}", outcome);
                return Ok(false);
            }
        }
    }
    Ok(false)
}

fn print_event(event: &PlaybackEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", event.to_json()?);
        return Ok(());
    }

    match event {
        PlaybackEvent::Prepared { uri, duration_ms, .. } => {
            println!("prepared   {} ({})", uri, format_millis(*duration_ms))
        }
        PlaybackEvent::PlaybackStateChanged { old_state, new_state, .. } => {
            println!("state      {} -> {}", old_state, new_state)
        }
        PlaybackEvent::PositionChanged {
            position_ms,
            duration_ms,
            ..
        } => println!("position   {}", format_progress(*position_ms, *duration_ms)),
        PlaybackEvent::TrackEnded { uri, .. } => println!("ended      {}", uri),
        PlaybackEvent::TrackWentToNext { uri, .. } => println!("next       {}", uri),
        PlaybackEvent::TrackFailed { uri, what, extra, .. } => {
            println!("failed     {} (what={} extra={})", uri, what, extra)
        }
        PlaybackEvent::CrossfadeStarted { duration_ms, .. } => {
            println!("crossfade  over {}", format_millis(*duration_ms))
        }
        PlaybackEvent::CrossfadeCompleted { .. } => println!("crossfade  complete"),
        PlaybackEvent::ModeChanged { crossfade_ms, .. } => {
            println!("mode       crossfade {}", format_millis(*crossfade_ms))
        }
        PlaybackEvent::Released { .. } => println!("released"),
    }
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
