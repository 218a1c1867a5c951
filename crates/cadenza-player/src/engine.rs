//! Output engines.
//!
//! An [`AudioEngine`] accepts interleaved `f32` samples via a blocking
//! `send`; the pace at which it accepts them is what clocks the render
//! stage. The default [`CpalEngine`] bridges `send` to a CPAL output
//! callback through a bounded sample ring.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

use anyhow::{Result, anyhow};
use cpal::traits::{DeviceTrait, StreamTrait};

use crate::device::{choose_buffer_size, choose_stream_config, find_output_device};
use crate::error::EngineError;
use crate::frame::StreamInfo;

/// Sink for rendered samples.
///
/// The engine is constructed on the render thread and never leaves it, so
/// implementations do not need to be `Send`. `send` blocks until the engine
/// has accepted the whole frame; that backpressure is the playback clock.
pub trait AudioEngine {
    fn send(&mut self, samples: &[f32]);
}

/// Factory invoked on the render thread once stream metadata is known.
pub type EngineFactory =
    Arc<dyn Fn(&StreamInfo) -> Result<Box<dyn AudioEngine>, EngineError> + Send + Sync>;

struct RingInner {
    buf: VecDeque<f32>,
    closed: bool,
}

/// Bounded ring of interleaved samples between the render thread and the
/// real-time output callback.
///
/// The producer blocks while the ring is full; the callback never blocks and
/// substitutes silence on underrun.
pub struct SampleRing {
    inner: Mutex<RingInner>,
    space: Condvar,
    capacity: usize,
}

impl SampleRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(RingInner {
                buf: VecDeque::new(),
                closed: false,
            }),
            space: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append samples, waiting for space as the callback drains. Returns
    /// early if the ring is closed.
    pub fn push_blocking(&self, samples: &[f32]) {
        let mut inner = self.inner.lock().unwrap();
        for &sample in samples {
            while inner.buf.len() >= self.capacity && !inner.closed {
                inner = self.space.wait(inner).unwrap();
            }
            if inner.closed {
                return;
            }
            inner.buf.push_back(sample);
        }
    }

    /// Move up to `out.len()` samples into `out` without blocking. Returns
    /// the number of samples written.
    pub fn pop_chunk(&self, out: &mut [f32]) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let n = out.len().min(inner.buf.len());
        for slot in out[..n].iter_mut() {
            *slot = inner.buf.pop_front().unwrap();
        }
        if n > 0 {
            self.space.notify_one();
        }
        n
    }

    /// Mark the ring closed and release any blocked producer.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.closed = true;
        self.space.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Remap interleaved samples from `src` channels to `dst` channels.
///
/// Mapping rules:
/// - mono -> stereo: duplicate channel 0
/// - stereo -> mono: average L/R
/// - matching layouts: pass-through
/// - other layouts: clamp to the available source channels
pub fn map_channels(samples: &[f32], src: usize, dst: usize) -> Vec<f32> {
    if src == dst || src == 0 || dst == 0 {
        return samples.to_vec();
    }
    let frames = samples.len() / src;
    let mut out = Vec::with_capacity(frames * dst);
    for frame in 0..frames {
        let base = frame * src;
        match (src, dst) {
            (2, 1) => out.push(0.5 * (samples[base] + samples[base + 1])),
            (1, 2) => {
                let s = samples[base];
                out.push(s);
                out.push(s);
            }
            _ => {
                for ch in 0..dst {
                    out.push(samples[base + ch.min(src - 1)]);
                }
            }
        }
    }
    out
}

/// Ring capacity for roughly `buffer_seconds` of audio at the output layout.
fn ring_capacity(sample_rate: u32, channels: usize, buffer_seconds: f64) -> usize {
    let seconds = if buffer_seconds.is_finite() && buffer_seconds > 0.0 {
        buffer_seconds
    } else {
        0.5
    };
    ((sample_rate as f64 * seconds) as usize).max(1) * channels.max(1)
}

/// CPAL-backed output engine.
pub struct CpalEngine {
    ring: Arc<SampleRing>,
    src_channels: usize,
    dst_channels: usize,
    _stream: cpal::Stream,
}

impl CpalEngine {
    /// Open an output stream matching `info` as closely as the device
    /// allows.
    pub fn open(
        info: &StreamInfo,
        device_needle: Option<&str>,
        buffer_seconds: f64,
    ) -> Result<Self, EngineError> {
        let host = cpal::default_host();
        let device = find_output_device(&host, device_needle)
            .map_err(|e| EngineError::Device(e.to_string()))?;
        let supported = choose_stream_config(&device, Some(info.sample_rate))
            .map_err(|e| EngineError::Device(e.to_string()))?;

        let sample_format = supported.sample_format();
        let mut config: cpal::StreamConfig = supported.config();
        if let Some(buffer_size) = choose_buffer_size(&supported) {
            config.buffer_size = buffer_size;
        }

        let dst_channels = config.channels as usize;
        let ring = Arc::new(SampleRing::new(ring_capacity(
            config.sample_rate,
            dst_channels,
            buffer_seconds,
        )));

        let stream = build_output_stream(&device, &config, sample_format, &ring)
            .map_err(|e| EngineError::Stream(e.to_string()))?;
        stream
            .play()
            .map_err(|e| EngineError::Stream(e.to_string()))?;

        Ok(Self {
            ring,
            src_channels: info.channels as usize,
            dst_channels,
            _stream: stream,
        })
    }

    /// Factory suitable for [`Player`](crate::player::Player) construction.
    pub fn factory(
        device_needle: Option<String>,
        buffer_seconds: f64,
    ) -> impl Fn(&StreamInfo) -> Result<Box<dyn AudioEngine>, EngineError> + Send + Sync {
        move |info| {
            Ok(Box::new(CpalEngine::open(
                info,
                device_needle.as_deref(),
                buffer_seconds,
            )?) as Box<dyn AudioEngine>)
        }
    }
}

impl AudioEngine for CpalEngine {
    fn send(&mut self, samples: &[f32]) {
        let mapped = map_channels(samples, self.src_channels, self.dst_channels);
        self.ring.push_blocking(&mapped);
    }
}

impl Drop for CpalEngine {
    fn drop(&mut self) {
        self.ring.close();
    }
}

fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    ring: &Arc<SampleRing>,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, ring),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, ring),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, ring),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, ring),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

/// Type-specialized stream builder for CPAL sample formats.
///
/// The callback drains the ring without blocking and fills any shortfall
/// with silence.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    ring: &Arc<SampleRing>,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let ring_cb = ring.clone();
    let err_fn = |err| tracing::warn!("stream error: {err}");
    let mut scratch: Vec<f32> = Vec::new();

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            scratch.resize(data.len(), 0.0);
            let filled = ring_cb.pop_chunk(&mut scratch);
            for (i, slot) in data.iter_mut().enumerate() {
                let sample = if i < filled { scratch[i] } else { 0.0 };
                *slot = <T as cpal::Sample>::from_sample::<f32>(sample);
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn ring_preserves_order_and_reports_underrun() {
        let ring = SampleRing::new(8);
        ring.push_blocking(&[1.0, 2.0, 3.0]);

        let mut out = [0.0f32; 5];
        let n = ring.pop_chunk(&mut out);
        assert_eq!(n, 3);
        assert_eq!(&out[..3], &[1.0, 2.0, 3.0]);
        assert!(ring.is_empty());
    }

    #[test]
    fn ring_blocks_producer_until_drained() {
        let ring = Arc::new(SampleRing::new(4));
        let producer_ring = ring.clone();

        let producer = thread::spawn(move || {
            producer_ring.push_blocking(&[0.0; 16]);
        });

        let mut drained = 0;
        let mut out = [0.0f32; 4];
        while drained < 16 {
            let n = ring.pop_chunk(&mut out);
            if n == 0 {
                thread::sleep(Duration::from_millis(1));
            }
            drained += n;
        }

        producer.join().unwrap();
        assert!(ring.is_empty());
    }

    #[test]
    fn ring_close_releases_blocked_producer() {
        let ring = Arc::new(SampleRing::new(2));
        ring.push_blocking(&[1.0, 2.0]);

        let producer_ring = ring.clone();
        let producer = thread::spawn(move || {
            producer_ring.push_blocking(&[3.0; 64]);
        });

        thread::sleep(Duration::from_millis(10));
        ring.close();
        producer.join().unwrap();
    }

    #[test]
    fn map_channels_passthrough_when_layouts_match() {
        let samples = [0.1f32, 0.2, 0.3, 0.4];
        assert_eq!(map_channels(&samples, 2, 2), samples.to_vec());
    }

    #[test]
    fn map_channels_mono_to_stereo_duplicates() {
        assert_eq!(map_channels(&[0.5, -0.5], 1, 2), vec![0.5, 0.5, -0.5, -0.5]);
    }

    #[test]
    fn map_channels_stereo_to_mono_averages() {
        assert_eq!(map_channels(&[1.0, 0.0, 0.5, 0.5], 2, 1), vec![0.5, 0.5]);
    }

    #[test]
    fn map_channels_clamps_unusual_layouts() {
        // 3 source channels down to 2: channels 0 and 1 survive.
        assert_eq!(
            map_channels(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6], 3, 2),
            vec![0.1, 0.2, 0.4, 0.5]
        );
    }

    #[test]
    fn ring_capacity_scales_and_falls_back() {
        assert_eq!(ring_capacity(48_000, 2, 0.5), 48_000);
        assert_eq!(ring_capacity(48_000, 2, f64::NAN), 48_000);
        assert_eq!(ring_capacity(48_000, 2, -1.0), 48_000);
    }
}
