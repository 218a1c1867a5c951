//! Playback orchestrator.
//!
//! The [`Player`] owns the state machine and the two worker threads of a
//! play session:
//!
//! - the decode thread pulls frames from the [`AudioDecoder`], runs the
//!   custom processor chain, and pushes them into the [`FrameQueue`];
//! - the render thread pops frames, applies the volume processor, and
//!   writes samples to the [`AudioEngine`], whose blocking `send` is the
//!   real-time pacing primitive.
//!
//! Coordination happens through the shared state cell, the seeking flag,
//! and the queue. Failures on either worker thread never cross the thread
//! boundary as errors; they surface as log events and state transitions.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cadenza_types::{PlaybackState, PlayerStatus};

use crate::config::PlayerConfig;
use crate::decode::{AudioDecoder, DecoderFactory};
use crate::engine::{AudioEngine, EngineFactory};
use crate::error::{DecodeError, EngineError, PlayerError};
use crate::events::{EventBus, PlayerEvent};
use crate::frame::{DecodeResult, StreamInfo};
use crate::processor::{SampleProcessor, VolumeProcessor};
use crate::queue::FrameQueue;
use crate::source::{AudioSource, CancelToken};

/// Playback state in an atomic cell.
///
/// `swap` returns the previous value so callers can publish a state-changed
/// notification exactly once per actual transition.
struct StateCell(AtomicU8);

impl StateCell {
    fn new(state: PlaybackState) -> Self {
        Self(AtomicU8::new(state_to_u8(state)))
    }

    fn get(&self) -> PlaybackState {
        u8_to_state(self.0.load(Ordering::Relaxed))
    }

    fn swap(&self, state: PlaybackState) -> PlaybackState {
        u8_to_state(self.0.swap(state_to_u8(state), Ordering::Relaxed))
    }

    fn compare_swap(&self, from: PlaybackState, to: PlaybackState) -> bool {
        self.0
            .compare_exchange(
                state_to_u8(from),
                state_to_u8(to),
                Ordering::Relaxed,
                Ordering::Relaxed,
            )
            .is_ok()
    }
}

fn state_to_u8(state: PlaybackState) -> u8 {
    match state {
        PlaybackState::Idle => 0,
        PlaybackState::Playing => 1,
        PlaybackState::Buffering => 2,
        PlaybackState::Paused => 3,
        PlaybackState::Stopped => 4,
    }
}

fn u8_to_state(raw: u8) -> PlaybackState {
    match raw {
        1 => PlaybackState::Playing,
        2 => PlaybackState::Buffering,
        3 => PlaybackState::Paused,
        4 => PlaybackState::Stopped,
        _ => PlaybackState::Idle,
    }
}

/// State shared between the controlling thread and the two workers.
struct PlayerShared {
    config: PlayerConfig,
    state: StateCell,
    queue: FrameQueue,
    events: EventBus,
    volume: VolumeProcessor,
    seeking: AtomicBool,
    eof: AtomicBool,
    loaded: AtomicBool,
    cancel: CancelToken,
    position_ms: AtomicU64,
    stream_info: Mutex<Option<StreamInfo>>,
    decoder: Mutex<Option<Box<dyn AudioDecoder>>>,
    source: Mutex<Option<AudioSource>>,
    processors: Mutex<Vec<Box<dyn SampleProcessor>>>,
}

impl PlayerShared {
    /// Publish a state transition at most once per actual change.
    fn set_state(&self, state: PlaybackState) {
        let previous = self.state.swap(state);
        if previous != state {
            self.events.emit(PlayerEvent::StateChanged(state));
        }
    }

    /// Transition taken only from an expected prior state. Worker threads
    /// use this so they cannot overwrite a `Stopped` issued by the
    /// controlling thread between their state check and the store.
    fn transition(&self, from: PlaybackState, to: PlaybackState) -> bool {
        let changed = self.state.compare_swap(from, to);
        if changed {
            self.events.emit(PlayerEvent::StateChanged(to));
        }
        changed
    }

    fn set_position(&self, millis: u64, publish: bool) {
        self.position_ms.store(millis, Ordering::Relaxed);
        if publish {
            self.events
                .emit(PlayerEvent::PositionChanged(Duration::from_millis(millis)));
        }
    }

    fn position(&self) -> Duration {
        Duration::from_millis(self.position_ms.load(Ordering::Relaxed))
    }
}

/// The playback engine.
///
/// Decoder and output-engine construction are injected as factories so
/// callers (and tests) can substitute either collaborator. The engine
/// factory runs on the render thread, the only thread that ever touches the
/// engine.
pub struct Player {
    shared: Arc<PlayerShared>,
    decoder_factory: DecoderFactory,
    engine_factory: EngineFactory,
    // Serializes load/play/pause/stop so two controlling threads cannot
    // both spawn worker pairs or interleave a stop with a spawn.
    transport: Mutex<()>,
    decode_handle: Mutex<Option<JoinHandle<()>>>,
    render_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Player {
    pub fn new<D, E>(decoder_factory: D, engine_factory: E) -> Self
    where
        D: Fn(&AudioSource, &CancelToken) -> Result<Box<dyn AudioDecoder>, DecodeError>
            + Send
            + Sync
            + 'static,
        E: Fn(&StreamInfo) -> Result<Box<dyn AudioEngine>, EngineError> + Send + Sync + 'static,
    {
        Self::with_config(PlayerConfig::default(), decoder_factory, engine_factory)
    }

    pub fn with_config<D, E>(config: PlayerConfig, decoder_factory: D, engine_factory: E) -> Self
    where
        D: Fn(&AudioSource, &CancelToken) -> Result<Box<dyn AudioDecoder>, DecodeError>
            + Send
            + Sync
            + 'static,
        E: Fn(&StreamInfo) -> Result<Box<dyn AudioEngine>, EngineError> + Send + Sync + 'static,
    {
        let queue = FrameQueue::new(config.min_queue_frames, config.max_queue_frames);
        Self {
            shared: Arc::new(PlayerShared {
                config,
                state: StateCell::new(PlaybackState::Idle),
                queue,
                events: EventBus::new(),
                volume: VolumeProcessor::new(1.0),
                seeking: AtomicBool::new(false),
                eof: AtomicBool::new(false),
                loaded: AtomicBool::new(false),
                cancel: CancelToken::new(),
                position_ms: AtomicU64::new(0),
                stream_info: Mutex::new(None),
                decoder: Mutex::new(None),
                source: Mutex::new(None),
                processors: Mutex::new(Vec::new()),
            }),
            decoder_factory: Arc::new(decoder_factory),
            engine_factory: Arc::new(engine_factory),
            transport: Mutex::new(()),
            decode_handle: Mutex::new(None),
            render_handle: Mutex::new(None),
        }
    }

    /// Register a new event subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> crossbeam_channel::Receiver<PlayerEvent> {
        self.shared.events.subscribe()
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.state.get()
    }

    pub fn is_loaded(&self) -> bool {
        self.shared.loaded.load(Ordering::Relaxed)
    }

    pub fn position(&self) -> Duration {
        self.shared.position()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.shared
            .stream_info
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|info| info.duration)
    }

    pub fn stream_info(&self) -> Option<StreamInfo> {
        self.shared.stream_info.lock().unwrap().clone()
    }

    pub fn volume(&self) -> f32 {
        self.shared.volume.volume()
    }

    /// Set the output volume, clamped to `[0.0, 1.0]`.
    pub fn set_volume(&self, volume: f32) {
        self.shared.volume.set_volume(volume);
    }

    /// Append a processor to the custom chain. Processors run on the decode
    /// thread, in registration order, before a frame is queued.
    pub fn add_processor(&self, processor: Box<dyn SampleProcessor>) {
        self.shared.processors.lock().unwrap().push(processor);
    }

    /// Snapshot of the current player state.
    pub fn status(&self) -> PlayerStatus {
        let info = self.shared.stream_info.lock().unwrap().clone();
        PlayerStatus {
            state: self.shared.state.get(),
            loaded: self.is_loaded(),
            position_ms: self.shared.position_ms.load(Ordering::Relaxed),
            duration_ms: info
                .as_ref()
                .and_then(|i| i.duration)
                .map(|d| d.as_millis() as u64),
            volume: self.volume(),
            sample_rate: info.as_ref().map(|i| i.sample_rate),
            channels: info.as_ref().map(|i| i.channels),
        }
    }

    /// Load a new source, stopping any active playback first.
    ///
    /// On failure the player is left unloaded (and in `Idle` if nothing was
    /// ever loaded) but remains usable for a subsequent load.
    pub fn load(&self, source: AudioSource) -> Result<(), PlayerError> {
        source.validate().map_err(PlayerError::InvalidSource)?;
        let _transport = self.transport.lock().unwrap();
        self.stop_workers();
        self.shared.eof.store(false, Ordering::Relaxed);

        match (self.decoder_factory)(&source, &self.shared.cancel) {
            Ok(decoder) => {
                let info = decoder.stream_info();
                *self.shared.stream_info.lock().unwrap() = Some(info);
                *self.shared.decoder.lock().unwrap() = Some(decoder);
                *self.shared.source.lock().unwrap() = Some(source.clone());
                self.shared.set_position(0, false);
                self.shared.loaded.store(true, Ordering::Relaxed);
                self.shared.set_state(PlaybackState::Stopped);
                self.shared
                    .events
                    .log_info(format!("loaded {}", source.describe()));
                self.shared.events.emit(PlayerEvent::AudioLoaded);
                Ok(())
            }
            Err(e) => {
                self.shared.loaded.store(false, Ordering::Relaxed);
                *self.shared.decoder.lock().unwrap() = None;
                self.shared
                    .events
                    .log_error(format!("failed to load {}: {e}", source.describe()));
                Err(e.into())
            }
        }
    }

    /// Start or resume playback.
    ///
    /// Spawns the decode and render threads when starting from
    /// `Idle`/`Stopped`; resuming from `Paused` only flips the state.
    pub fn play(&self) -> Result<(), PlayerError> {
        let _transport = self.transport.lock().unwrap();
        if !self.is_loaded() {
            self.shared
                .events
                .log_warning("play requested with no audio loaded");
            return Err(PlayerError::NotLoaded);
        }

        match self.shared.state.get() {
            PlaybackState::Playing | PlaybackState::Buffering => Ok(()),
            PlaybackState::Paused => {
                self.shared.set_state(PlaybackState::Playing);
                Ok(())
            }
            PlaybackState::Idle | PlaybackState::Stopped => {
                // Reap worker handles left over from a finished session.
                self.join_workers();
                self.shared.eof.store(false, Ordering::Relaxed);
                self.shared.queue.clear();
                self.shared.set_state(PlaybackState::Playing);

                let decode_shared = self.shared.clone();
                let decoder_factory = self.decoder_factory.clone();
                *self.decode_handle.lock().unwrap() = Some(thread::spawn(move || {
                    decode_loop(decode_shared, decoder_factory);
                }));

                let render_shared = self.shared.clone();
                let engine_factory = self.engine_factory.clone();
                *self.render_handle.lock().unwrap() = Some(thread::spawn(move || {
                    render_loop(render_shared, engine_factory);
                }));

                Ok(())
            }
        }
    }

    /// Suspend playback. The decode thread keeps producing until the queue
    /// saturates. No-op unless currently playing or buffering.
    pub fn pause(&self) {
        let _transport = self.transport.lock().unwrap();
        match self.shared.state.get() {
            PlaybackState::Playing | PlaybackState::Buffering => {
                self.shared.set_state(PlaybackState::Paused);
            }
            _ => {}
        }
    }

    /// Stop playback: joins both worker threads, clears the queue, and
    /// resets the position to zero. Never raises playback-completed.
    ///
    /// The cancel token aborts any in-flight source fetch, so the join waits
    /// for at most one outstanding request rather than a full read timeout.
    pub fn stop(&self) {
        let _transport = self.transport.lock().unwrap();
        let previous = self.shared.state.get();
        if previous != PlaybackState::Idle {
            self.shared.set_state(PlaybackState::Stopped);
        }
        self.shared.cancel.cancel();
        self.join_workers();
        self.shared.cancel.reset();
        self.shared.queue.clear();
        self.shared.seeking.store(false, Ordering::Relaxed);
        self.shared.set_position(0, previous != PlaybackState::Idle);
    }

    /// Reposition playback.
    ///
    /// No-op when nothing is loaded or another seek is in progress. A failed
    /// decoder seek is logged and leaves the position unchanged.
    pub fn seek(&self, position: Duration) {
        seek_internal(&self.shared, position);
    }

    /// Quiet variant of [`Player::stop`] used while swapping sources.
    /// Caller holds the transport lock.
    fn stop_workers(&self) {
        if self.shared.state.get() != PlaybackState::Idle {
            self.shared.set_state(PlaybackState::Stopped);
        }
        self.shared.cancel.cancel();
        self.join_workers();
        self.shared.cancel.reset();
        self.shared.queue.clear();
        self.shared.seeking.store(false, Ordering::Relaxed);
        self.shared.set_position(0, false);
    }

    fn join_workers(&self) {
        if let Some(handle) = self.decode_handle.lock().unwrap().take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.render_handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Reposition the stream through the decoder.
///
/// Serialized by the seeking flag: while one seek is in flight, later seeks
/// are silently ignored. On success the queue is cleared and the position is
/// set directly without publishing; the render thread re-derives position
/// from the next decoded frame.
fn seek_internal(shared: &PlayerShared, position: Duration) {
    if !shared.loaded.load(Ordering::Relaxed) {
        return;
    }
    if shared
        .seeking
        .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
        .is_err()
    {
        return;
    }

    let result = {
        let mut guard = shared.decoder.lock().unwrap();
        guard.as_mut().map(|decoder| decoder.try_seek(position))
    };

    match result {
        Some(Ok(())) => {
            shared.queue.clear();
            shared.set_position(position.as_millis() as u64, false);
        }
        Some(Err(e)) => {
            shared.events.log_warning(format!("seek failed: {e}"));
        }
        None => {}
    }

    shared.seeking.store(false, Ordering::Relaxed);
}

/// Decode thread body: decoder -> processors -> queue.
fn decode_loop(shared: Arc<PlayerShared>, factory: DecoderFactory) {
    loop {
        if shared.state.get() == PlaybackState::Stopped {
            break;
        }
        if shared.seeking.load(Ordering::Relaxed) || shared.queue.is_saturated() {
            thread::sleep(shared.config.decode_poll);
            continue;
        }

        let result = {
            let mut guard = shared.decoder.lock().unwrap();
            match guard.as_mut() {
                Some(decoder) => decoder.decode_next_frame(),
                None => {
                    drop(guard);
                    thread::sleep(shared.config.decode_poll);
                    continue;
                }
            }
        };

        match result {
            DecodeResult::Frame(mut frame) => {
                let mut processors = shared.processors.lock().unwrap();
                for processor in processors.iter_mut() {
                    if !processor.is_enabled() {
                        continue;
                    }
                    for sample in frame.samples.iter_mut() {
                        *sample = processor.process(*sample);
                    }
                }
                drop(processors);

                shared
                    .events
                    .emit(PlayerEvent::FrameDecoded { pts_ms: frame.pts_ms });
                shared.queue.push(frame);
            }
            DecodeResult::EndOfStream => {
                shared.eof.store(true, Ordering::Relaxed);
                break;
            }
            DecodeResult::Failure(message) => {
                shared
                    .events
                    .log_warning(format!("decode failed: {message}"));
                if !recover_decoder(&shared, &factory) {
                    break;
                }
            }
        }
    }
}

/// Decode-failure recovery: dispose the broken decoder and retry the factory
/// until it succeeds or the player is stopped, then re-seek to the position
/// held before the failure.
fn recover_decoder(shared: &Arc<PlayerShared>, factory: &DecoderFactory) -> bool {
    let held_position = shared.position();
    shared.queue.clear();
    shared.loaded.store(false, Ordering::Relaxed);
    *shared.decoder.lock().unwrap() = None;

    let source = match shared.source.lock().unwrap().clone() {
        Some(source) => source,
        None => return false,
    };

    loop {
        if shared.state.get() == PlaybackState::Stopped {
            return false;
        }
        match factory(&source, &shared.cancel) {
            Ok(decoder) => {
                *shared.decoder.lock().unwrap() = Some(decoder);
                shared.loaded.store(true, Ordering::Relaxed);
                shared.events.log_info(format!(
                    "decoder recovered, resuming at {} ms",
                    held_position.as_millis()
                ));
                seek_internal(shared, held_position);
                return true;
            }
            Err(e) => {
                shared
                    .events
                    .log_warning(format!("decoder recreation failed: {e}"));
                thread::sleep(shared.config.retry_delay);
            }
        }
    }
}

/// Render thread body: queue -> volume -> engine.
///
/// The engine is constructed here because it must only ever be touched by
/// this thread.
fn render_loop(shared: Arc<PlayerShared>, factory: EngineFactory) {
    let info = match shared.stream_info.lock().unwrap().clone() {
        Some(info) => info,
        None => {
            shared.set_state(PlaybackState::Stopped);
            return;
        }
    };

    let mut engine = match factory(&info) {
        Ok(engine) => engine,
        Err(e) => {
            shared
                .events
                .log_error(format!("failed to open output engine: {e}"));
            shared.set_state(PlaybackState::Stopped);
            return;
        }
    };

    let mut completed = false;
    loop {
        let state = shared.state.get();
        if state == PlaybackState::Stopped {
            break;
        }
        if state == PlaybackState::Paused || shared.seeking.load(Ordering::Relaxed) {
            thread::sleep(shared.config.pause_poll);
            continue;
        }

        let eof = shared.eof.load(Ordering::Relaxed);
        if shared.queue.is_starved() {
            if !eof {
                shared.transition(PlaybackState::Playing, PlaybackState::Buffering);
                thread::sleep(shared.config.buffering_poll);
                continue;
            }
            // Stream exhausted: drain whatever is left, then exit.
            if shared.queue.is_empty() {
                completed = true;
                break;
            }
        }

        let Some(mut frame) = shared.queue.pop() else {
            continue;
        };

        shared.transition(PlaybackState::Buffering, PlaybackState::Playing);
        for sample in frame.samples.iter_mut() {
            *sample = shared.volume.apply(*sample);
        }
        engine.send(&frame.samples);
        shared
            .events
            .emit(PlayerEvent::FramePresented { pts_ms: frame.pts_ms });
        shared.set_position(frame.pts_ms.max(0.0) as u64, true);
    }

    if completed {
        // Natural end of stream: rewind so a later play starts from the
        // top, publish the single authoritative position reset, and report
        // completion before the final state transition.
        seek_internal(&shared, Duration::ZERO);
        shared.set_position(0, true);
        shared.events.emit(PlayerEvent::PlaybackCompleted);
    }
    shared.set_state(PlaybackState::Stopped);
}
