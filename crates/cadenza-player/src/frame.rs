use std::time::Duration;

/// One decoded chunk of interleaved `f32` PCM plus its presentation
/// timestamp.
///
/// Ownership moves from the decode stage into the [`FrameQueue`], then into
/// the render stage, which consumes the frame after writing it to the output
/// engine. The processing chain and the volume processor rewrite samples in
/// place along the way.
///
/// [`FrameQueue`]: crate::queue::FrameQueue
#[derive(Clone, Debug, PartialEq)]
pub struct AudioFrame {
    /// Presentation timestamp in milliseconds from the start of the stream.
    pub pts_ms: f64,
    /// Interleaved `f32` PCM samples.
    pub samples: Vec<f32>,
}

impl AudioFrame {
    pub fn new(pts_ms: f64, samples: Vec<f32>) -> Self {
        Self { pts_ms, samples }
    }

    /// Presentation timestamp as a `Duration` (negative timestamps clamp to
    /// zero).
    pub fn presentation_time(&self) -> Duration {
        Duration::from_millis(self.pts_ms.max(0.0) as u64)
    }
}

/// Stream metadata captured once per successful decoder construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamInfo {
    pub channels: u32,
    pub sample_rate: u32,
    /// Total duration, when the container reports one.
    pub duration: Option<Duration>,
}

/// Outcome of a single decode call.
///
/// Success data never mixes with end-of-stream or failure.
#[derive(Clone, Debug, PartialEq)]
pub enum DecodeResult {
    Frame(AudioFrame),
    EndOfStream,
    Failure(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presentation_time_converts_millis() {
        let frame = AudioFrame::new(1500.0, vec![0.0; 4]);
        assert_eq!(frame.presentation_time(), Duration::from_millis(1500));
    }

    #[test]
    fn presentation_time_clamps_negative() {
        let frame = AudioFrame::new(-20.0, vec![]);
        assert_eq!(frame.presentation_time(), Duration::ZERO);
    }
}
