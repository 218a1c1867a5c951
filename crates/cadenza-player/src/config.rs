use std::time::Duration;

/// Tuning parameters shared by the decode and render stages.
#[derive(Clone, Debug)]
pub struct PlayerConfig {
    /// Low watermark: below this many queued frames the render stage
    /// transitions to `Buffering` (unless the stream has already ended).
    pub min_queue_frames: usize,
    /// High watermark: at or above this many queued frames the decode stage
    /// stalls until the render stage catches up.
    pub max_queue_frames: usize,
    /// Poll interval for the decode stage while seeking or throttled.
    pub decode_poll: Duration,
    /// Poll interval for the render stage while paused.
    pub pause_poll: Duration,
    /// Poll interval for the render stage while buffering.
    pub buffering_poll: Duration,
    /// Delay between decoder re-creation attempts during failure recovery.
    pub retry_delay: Duration,
    /// Target output ring duration used to size the default CPAL engine.
    pub engine_buffer_seconds: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            min_queue_frames: 3,
            max_queue_frames: 10,
            decode_poll: Duration::from_millis(10),
            pause_poll: Duration::from_millis(10),
            buffering_poll: Duration::from_millis(100),
            retry_delay: Duration::from_millis(10),
            engine_buffer_seconds: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_watermarks() {
        let config = PlayerConfig::default();
        assert_eq!(config.min_queue_frames, 3);
        assert_eq!(config.max_queue_frames, 10);
        assert!(config.min_queue_frames < config.max_queue_frames);
    }

    #[test]
    fn default_poll_intervals() {
        let config = PlayerConfig::default();
        assert_eq!(config.decode_poll, Duration::from_millis(10));
        assert_eq!(config.buffering_poll, Duration::from_millis(100));
    }
}
