//! Cadenza — a streaming audio playback engine.
//!
//! Given a file path, HTTP(S) URL, or in-memory byte buffer, the player
//! decodes compressed audio incrementally and renders it to a live output
//! device while exposing transport controls (play/pause/stop/seek/volume)
//! and a pluggable sample-processing chain.
//!
//! ## Pipeline
//! 1. **Decode**: a background thread pulls [`AudioFrame`]s from an
//!    [`AudioDecoder`] (Symphonia by default), runs the custom processor
//!    chain, and enqueues them.
//! 2. **Queue**: a bounded [`FrameQueue`] with low/high watermarks decouples
//!    bursty decode from the fixed-cadence output.
//! 3. **Render**: a second thread dequeues frames, applies the volume
//!    processor, and writes samples to an [`AudioEngine`] (CPAL by default),
//!    whose blocking write provides the real-time pacing.
//!
//! Transport state and playback progress are published as [`PlayerEvent`]s
//! through channels returned by [`Player::subscribe`].

pub mod config;
pub mod decode;
pub mod device;
pub mod engine;
pub mod error;
pub mod events;
pub mod frame;
pub mod player;
pub mod processor;
pub mod queue;
pub mod source;

pub use cadenza_types::{LogLevel, PlaybackState, PlayerLog, PlayerStatus};
pub use config::PlayerConfig;
pub use decode::{AudioDecoder, DecoderFactory, SymphoniaDecoder};
pub use engine::{AudioEngine, CpalEngine, EngineFactory};
pub use error::{DecodeError, EngineError, PlayerError};
pub use events::PlayerEvent;
pub use frame::{AudioFrame, DecodeResult, StreamInfo};
pub use player::Player;
pub use processor::{EchoProcessor, SampleProcessor, VolumeProcessor};
pub use queue::FrameQueue;
pub use source::{AudioSource, CancelToken};
