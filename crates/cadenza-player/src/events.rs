//! Player event stream.
//!
//! Observers subscribe to a clone-per-subscriber channel rather than
//! registering callbacks; the player never runs observer code on its worker
//! threads, so a slow consumer cannot stall decode or render.

use std::sync::Mutex;
use std::time::Duration;

use cadenza_types::{PlaybackState, PlayerLog};
use crossbeam_channel::{Receiver, Sender, unbounded};

/// Notifications published by the player.
#[derive(Clone, Debug, PartialEq)]
pub enum PlayerEvent {
    /// A source finished loading and the player is ready to play.
    AudioLoaded,
    /// The playback state changed. Emitted exactly once per transition.
    StateChanged(PlaybackState),
    /// The playback position moved (one event per presented frame, plus
    /// resets on stop and completion).
    PositionChanged(Duration),
    /// The stream played through to its natural end.
    PlaybackCompleted,
    /// A frame left the decode stage.
    FrameDecoded { pts_ms: f64 },
    /// A frame was written to the output engine.
    FramePresented { pts_ms: f64 },
    /// A log record, mirrored to `tracing`.
    Log(PlayerLog),
}

/// Fan-out of [`PlayerEvent`]s to any number of subscribers.
///
/// Senders whose receiver has been dropped are pruned on the next emit.
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<PlayerEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Register a new subscriber. Events emitted before subscription are not
    /// replayed.
    pub fn subscribe(&self) -> Receiver<PlayerEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber.
    pub fn emit(&self, event: PlayerEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn log_info(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{message}");
        self.emit(PlayerEvent::Log(PlayerLog::info(message)));
    }

    pub fn log_warning(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{message}");
        self.emit(PlayerEvent::Log(PlayerLog::warning(message)));
    }

    pub fn log_error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{message}");
        self.emit(PlayerEvent::Log(PlayerLog::error(message)));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadenza_types::LogLevel;

    #[test]
    fn subscribers_receive_emitted_events() {
        let bus = EventBus::new();
        let first = bus.subscribe();
        let second = bus.subscribe();

        bus.emit(PlayerEvent::StateChanged(PlaybackState::Playing));

        assert_eq!(
            first.try_recv().unwrap(),
            PlayerEvent::StateChanged(PlaybackState::Playing)
        );
        assert_eq!(
            second.try_recv().unwrap(),
            PlayerEvent::StateChanged(PlaybackState::Playing)
        );
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let keep = bus.subscribe();
        drop(bus.subscribe());

        bus.emit(PlayerEvent::PlaybackCompleted);
        bus.emit(PlayerEvent::PlaybackCompleted);

        assert_eq!(keep.try_recv().unwrap(), PlayerEvent::PlaybackCompleted);
        assert_eq!(bus.subscribers.lock().unwrap().len(), 1);
    }

    #[test]
    fn events_do_not_replay_for_late_subscribers() {
        let bus = EventBus::new();
        bus.emit(PlayerEvent::AudioLoaded);

        let late = bus.subscribe();
        assert!(late.try_recv().is_err());
    }

    #[test]
    fn log_helpers_emit_log_events() {
        let bus = EventBus::new();
        let rx = bus.subscribe();

        bus.log_warning("decoder failed: bad packet");

        match rx.try_recv().unwrap() {
            PlayerEvent::Log(log) => {
                assert_eq!(log.level, LogLevel::Warning);
                assert_eq!(log.message, "decoder failed: bad packet");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
