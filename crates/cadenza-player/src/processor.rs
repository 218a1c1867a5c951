//! Per-sample processing applied between decode and output.
//!
//! Custom processors run on the decode thread, in registration order, before
//! a frame is queued. The volume processor is mandatory and runs on the
//! render thread just before samples reach the output engine.

use std::sync::atomic::{AtomicU32, Ordering};

/// A unit transformation applied to every sample of a frame.
pub trait SampleProcessor: Send {
    /// Whether the processor currently participates in the chain. Checked
    /// once per frame per processor.
    fn is_enabled(&self) -> bool {
        true
    }

    fn process(&mut self, sample: f32) -> f32;
}

/// Clamp a requested volume into `[0.0, 1.0]`.
///
/// Non-finite input falls back to silence rather than an arbitrary gain.
pub fn clamp_volume(volume: f32) -> f32 {
    if !volume.is_finite() {
        return 0.0;
    }
    volume.clamp(0.0, 1.0)
}

/// Mandatory gain stage applied at output time.
///
/// The volume is stored as raw `f32` bits in an atomic so the controlling
/// thread can retune it while the render thread is mid-frame.
pub struct VolumeProcessor {
    bits: AtomicU32,
}

impl VolumeProcessor {
    pub fn new(volume: f32) -> Self {
        Self {
            bits: AtomicU32::new(clamp_volume(volume).to_bits()),
        }
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    /// Set the volume, clamped to `[0.0, 1.0]`.
    pub fn set_volume(&self, volume: f32) {
        self.bits
            .store(clamp_volume(volume).to_bits(), Ordering::Relaxed);
    }

    /// Scale one sample by the current volume.
    pub fn apply(&self, sample: f32) -> f32 {
        sample * self.volume()
    }
}

impl SampleProcessor for VolumeProcessor {
    fn process(&mut self, sample: f32) -> f32 {
        self.apply(sample)
    }
}

/// Feedback delay-line echo.
pub struct EchoProcessor {
    enabled: bool,
    decay: f32,
    buffer: Vec<f32>,
    index: usize,
}

impl EchoProcessor {
    /// `delay_samples` is the echo delay in samples (for example
    /// `sample_rate / 5` for 200 ms at mono), `decay` the feedback gain.
    pub fn new(delay_samples: usize, decay: f32) -> Self {
        Self {
            enabled: true,
            decay,
            buffer: vec![0.0; delay_samples.max(1)],
            index: 0,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

impl SampleProcessor for EchoProcessor {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn process(&mut self, sample: f32) -> f32 {
        let delayed = self.buffer[self.index];
        let out = sample + self.decay * delayed;
        self.buffer[self.index] = out;
        self.index = (self.index + 1) % self.buffer.len();
        out
    }
}
