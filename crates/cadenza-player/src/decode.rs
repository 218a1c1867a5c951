//! Decoder contract and the default Symphonia-backed implementation.
//!
//! The player never decodes audio itself; it pulls timestamped PCM frames
//! from an [`AudioDecoder`] and treats end-of-stream and per-call failures
//! as distinct outcomes (see [`DecodeResult`]).

use std::sync::Arc;
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::units::{Time, TimeBase};

use crate::error::DecodeError;
use crate::frame::{AudioFrame, DecodeResult, StreamInfo};
use crate::source::{AudioSource, CancelToken};

/// Produces timestamped PCM frames from a compressed source.
///
/// The active decoder is exclusively owned by the player: the decode thread
/// calls [`decode_next_frame`](AudioDecoder::decode_next_frame), the
/// controlling thread calls [`try_seek`](AudioDecoder::try_seek), and the
/// two are mutually excluded by the player's seeking flag. Disposal is
/// `Drop`.
pub trait AudioDecoder: Send {
    /// Decode the next frame, reporting end-of-stream and failures as data.
    fn decode_next_frame(&mut self) -> DecodeResult;

    /// Reposition the stream. The decoder does not guarantee instantaneous
    /// repositioning; the player re-derives position from the next decoded
    /// frame's timestamp.
    fn try_seek(&mut self, position: Duration) -> Result<(), DecodeError>;

    /// Metadata captured when the decoder was constructed.
    fn stream_info(&self) -> StreamInfo;
}

/// Factory invoked on initial load and on every failure-recovery attempt.
///
/// The cancel token is owned by the player; decoders hand it to their source
/// readers so a stop can abort a blocked network read.
pub type DecoderFactory = Arc<
    dyn Fn(&AudioSource, &CancelToken) -> Result<Box<dyn AudioDecoder>, DecodeError> + Send + Sync,
>;

/// Default decoder: Symphonia probe + packet decode into interleaved `f32`.
pub struct SymphoniaDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    time_base: Option<TimeBase>,
    info: StreamInfo,
}

impl SymphoniaDecoder {
    /// Probe `source` and prepare a decoder for its default audio track.
    pub fn open(source: &AudioSource, cancel: &CancelToken) -> Result<Self, DecodeError> {
        let (media, hint) = source.open(cancel)?;
        let mss = MediaSourceStream::new(media, Default::default());

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| DecodeError::Open(e.to_string()))?;

        let format = probed.format;
        let track = format
            .default_track()
            .ok_or_else(|| DecodeError::Open("no default audio track".to_string()))?;

        let track_id = track.id;
        let codec_params: CodecParameters = track.codec_params.clone();

        let channels = codec_params
            .channels
            .ok_or_else(|| DecodeError::Open("unknown channel layout".to_string()))?
            .count() as u32;
        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| DecodeError::Open("unknown sample rate".to_string()))?;

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| DecodeError::Open(e.to_string()))?;

        Ok(Self {
            format,
            decoder,
            track_id,
            time_base: codec_params.time_base,
            info: StreamInfo {
                channels,
                sample_rate,
                duration: duration_from_codec_params(&codec_params),
            },
        })
    }

    /// Factory suitable for [`Player`](crate::player::Player) construction.
    pub fn factory()
    -> impl Fn(&AudioSource, &CancelToken) -> Result<Box<dyn AudioDecoder>, DecodeError> + Send + Sync
    {
        |source, cancel| {
            Ok(Box::new(SymphoniaDecoder::open(source, cancel)?) as Box<dyn AudioDecoder>)
        }
    }
}

impl AudioDecoder for SymphoniaDecoder {
    fn decode_next_frame(&mut self) -> DecodeResult {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return DecodeResult::EndOfStream;
                }
                Err(e) => return DecodeResult::Failure(e.to_string()),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(e) => return DecodeResult::Failure(e.to_string()),
            };

            let pts_ms = packet_pts_ms(self.time_base, packet.ts());
            let mut sample_buf = SampleBuffer::<f32>::new(decoded.frames() as u64, *decoded.spec());
            sample_buf.copy_interleaved_ref(decoded);

            return DecodeResult::Frame(AudioFrame::new(pts_ms, sample_buf.samples().to_vec()));
        }
    }

    fn try_seek(&mut self, position: Duration) -> Result<(), DecodeError> {
        let time = Time::new(position.as_secs(), f64::from(position.subsec_millis()) / 1000.0);
        self.format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time,
                    track_id: None,
                },
            )
            .map_err(|e| DecodeError::Seek(e.to_string()))?;
        self.decoder.reset();
        Ok(())
    }

    fn stream_info(&self) -> StreamInfo {
        self.info.clone()
    }
}

/// Best-effort duration from codec metadata.
///
/// Returns `None` if the container does not provide total frames or sample
/// rate.
fn duration_from_codec_params(params: &CodecParameters) -> Option<Duration> {
    let frames = params.n_frames?;
    let rate = params.sample_rate? as u64;
    if rate == 0 {
        return None;
    }
    Some(Duration::from_millis(frames.saturating_mul(1000) / rate))
}

/// Convert a packet timestamp to milliseconds using the track time base.
fn packet_pts_ms(time_base: Option<TimeBase>, ts: u64) -> f64 {
    match time_base {
        Some(tb) => {
            let time = tb.calc_time(ts);
            time.seconds as f64 * 1000.0 + time.frac * 1000.0
        }
        None => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_handles_zero_rate() {
        let mut params = CodecParameters::new();
        params.sample_rate = Some(0);
        params.n_frames = Some(100);
        assert!(duration_from_codec_params(&params).is_none());
    }

    #[test]
    fn duration_computes_from_frames_and_rate() {
        let mut params = CodecParameters::new();
        params.sample_rate = Some(48_000);
        params.n_frames = Some(96_000);
        assert_eq!(
            duration_from_codec_params(&params),
            Some(Duration::from_millis(2000))
        );
    }

    #[test]
    fn duration_requires_frame_count() {
        let mut params = CodecParameters::new();
        params.sample_rate = Some(48_000);
        assert!(duration_from_codec_params(&params).is_none());
    }

    #[test]
    fn packet_pts_converts_with_time_base() {
        let tb = TimeBase::new(1, 44_100);
        let pts = packet_pts_ms(Some(tb), 44_100);
        assert!((pts - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn packet_pts_defaults_to_zero_without_time_base() {
        assert_eq!(packet_pts_ms(None, 12345), 0.0);
    }
}
