//! Cadenza CLI — plays a local file or an HTTP(S) URL through the default
//! (or a substring-matched) output device, logging playback events as they
//! arrive.

mod cli;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use cadenza_player::{
    AudioSource, CpalEngine, PlaybackState, Player, PlayerConfig, PlayerEvent, SymphoniaDecoder,
    device,
};
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,cadenza=info")),
        )
        .init();

    if args.list_devices {
        let host = cpal::default_host();
        device::print_devices(&host)?;
        return Ok(());
    }

    let source = parse_source(
        args.source
            .as_deref()
            .ok_or_else(|| anyhow!("no source given; see --help"))?,
    );

    let config = PlayerConfig {
        engine_buffer_seconds: args.buffer_seconds,
        ..PlayerConfig::default()
    };
    let buffer_seconds = f64::from(config.engine_buffer_seconds);
    let player = Arc::new(Player::with_config(
        config,
        SymphoniaDecoder::factory(),
        CpalEngine::factory(args.device.clone(), buffer_seconds),
    ));
    player.set_volume(args.volume);

    let interrupt_player = player.clone();
    ctrlc::set_handler(move || {
        tracing::info!("interrupt received, stopping");
        interrupt_player.stop();
    })
    .context("install interrupt handler")?;

    player
        .load(source)
        .with_context(|| "load audio source")?;
    if let Some(info) = player.stream_info() {
        tracing::info!(
            channels = info.channels,
            rate_hz = info.sample_rate,
            duration_ms = info.duration.map(|d| d.as_millis() as u64),
            "source"
        );
    }

    let events = player.subscribe();
    if let Some(ms) = args.seek_ms {
        player.seek(Duration::from_millis(ms));
    }
    player.play()?;

    for event in events.iter() {
        match event {
            PlayerEvent::StateChanged(state) => {
                tracing::info!(?state, "state");
                if state == PlaybackState::Stopped {
                    break;
                }
            }
            PlayerEvent::PositionChanged(position) => {
                tracing::debug!(position_ms = position.as_millis() as u64, "position");
            }
            PlayerEvent::PlaybackCompleted => {
                tracing::info!("playback completed");
                break;
            }
            PlayerEvent::Log(log) => tracing::debug!("{log}"),
            _ => {}
        }
    }

    Ok(())
}

fn parse_source(raw: &str) -> AudioSource {
    if raw.starts_with("http://") || raw.starts_with("https://") {
        AudioSource::Url(raw.to_string())
    } else {
        AudioSource::File(PathBuf::from(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_become_url_sources() {
        assert!(matches!(
            parse_source("https://example.com/a.flac"),
            AudioSource::Url(_)
        ));
        assert!(matches!(
            parse_source("http://example.com/a.mp3"),
            AudioSource::Url(_)
        ));
    }

    #[test]
    fn everything_else_is_a_file_path() {
        assert!(matches!(parse_source("music/a.flac"), AudioSource::File(_)));
        assert!(matches!(parse_source("/abs/a.wav"), AudioSource::File(_)));
    }
}
