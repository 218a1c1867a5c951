//! Output device selection.
//!
//! Finds an output device (the default, or the first whose description
//! contains a case-insensitive needle) and a supported stream config near
//! the decoded sample rate. Rates at or below the target win over rates
//! above it, so the device never has to invent samples it was not given;
//! float output formats win ties.

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// Largest fixed buffer requested from a device, in frames per channel.
const FRAME_CAP: u32 = 16_384;

/// Resolve the output device for an optional substring needle.
pub fn find_output_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    let Some(needle) = needle else {
        return host
            .default_output_device()
            .ok_or_else(|| anyhow!("no default output device"));
    };

    host.output_devices()
        .context("enumerating output devices")?
        .find(|device| {
            device
                .description()
                .ok()
                .is_some_and(|desc| name_matches(&desc.name(), needle))
        })
        .ok_or_else(|| anyhow!("no output device matches '{needle}'"))
}

/// Pick the supported config closest to `target_rate` (device maximum when
/// no target is given).
pub fn choose_stream_config(
    device: &cpal::Device,
    target_rate: Option<u32>,
) -> Result<cpal::SupportedStreamConfig> {
    let mut chosen: Option<(Candidate, cpal::SupportedStreamConfig)> = None;

    for range in device.supported_output_configs()? {
        let rate = clamp_rate(range.min_sample_rate(), range.max_sample_rate(), target_rate);
        let candidate = Candidate {
            at_or_below_target: target_rate.is_none_or(|t| rate <= t),
            rate,
            format_pref: format_preference(range.sample_format()),
        };
        if chosen.as_ref().is_none_or(|(best, _)| candidate.beats(best)) {
            chosen = Some((candidate, range.with_sample_rate(rate)));
        }
    }

    chosen
        .map(|(_, config)| config)
        .ok_or_else(|| anyhow!("device reports no output configs"))
}

/// Ask for a fixed buffer size when the device advertises a range;
/// `None` leaves the device default in place.
pub fn choose_buffer_size(config: &cpal::SupportedStreamConfig) -> Option<cpal::BufferSize> {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            let frames = (*max).min(FRAME_CAP).max(*min);
            Some(cpal::BufferSize::Fixed(frames))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

/// Print the host's output devices, one per line.
pub fn print_devices(host: &cpal::Host) -> Result<()> {
    let devices = host
        .output_devices()
        .context("enumerating output devices")?;
    for (index, device) in devices.enumerate() {
        println!("#{index}: {}", device.description()?);
    }
    Ok(())
}

struct Candidate {
    at_or_below_target: bool,
    rate: u32,
    format_pref: u8,
}

impl Candidate {
    fn beats(&self, other: &Candidate) -> bool {
        if self.at_or_below_target != other.at_or_below_target {
            return self.at_or_below_target;
        }
        if self.rate != other.rate {
            return self.rate > other.rate;
        }
        self.format_pref < other.format_pref
    }
}

fn clamp_rate(min: u32, max: u32, target: Option<u32>) -> u32 {
    match target {
        Some(rate) => rate.clamp(min, max),
        None => max,
    }
}

fn format_preference(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => u8::MAX,
    }
}

fn name_matches(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    !needle.is_empty() && name.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_match_ignores_case_and_padding() {
        assert!(name_matches("MacBook Pro Speakers", "speakers"));
        assert!(name_matches("Scarlett 2i2 USB", "  scarlett "));
        assert!(!name_matches("Scarlett 2i2 USB", "dac"));
    }

    #[test]
    fn blank_needle_matches_nothing() {
        assert!(!name_matches("Scarlett 2i2 USB", ""));
        assert!(!name_matches("Scarlett 2i2 USB", "   "));
    }

    #[test]
    fn clamp_rate_stays_inside_the_supported_range() {
        assert_eq!(clamp_rate(8_000, 192_000, Some(44_100)), 44_100);
        assert_eq!(clamp_rate(48_000, 192_000, Some(44_100)), 48_000);
        assert_eq!(clamp_rate(8_000, 48_000, Some(96_000)), 48_000);
    }

    #[test]
    fn clamp_rate_takes_the_maximum_without_a_target() {
        assert_eq!(clamp_rate(8_000, 96_000, None), 96_000);
    }

    #[test]
    fn candidates_at_or_below_the_target_win() {
        let below = Candidate {
            at_or_below_target: true,
            rate: 44_100,
            format_pref: 3,
        };
        let above = Candidate {
            at_or_below_target: false,
            rate: 96_000,
            format_pref: 0,
        };
        assert!(below.beats(&above));
        assert!(!above.beats(&below));
    }

    #[test]
    fn higher_rate_wins_within_a_group() {
        let faster = Candidate {
            at_or_below_target: true,
            rate: 96_000,
            format_pref: 2,
        };
        let slower = Candidate {
            at_or_below_target: true,
            rate: 48_000,
            format_pref: 0,
        };
        assert!(faster.beats(&slower));
    }

    #[test]
    fn float_output_wins_at_equal_rates() {
        let float = Candidate {
            at_or_below_target: true,
            rate: 48_000,
            format_pref: format_preference(cpal::SampleFormat::F32),
        };
        let int = Candidate {
            at_or_below_target: true,
            rate: 48_000,
            format_pref: format_preference(cpal::SampleFormat::I16),
        };
        assert!(float.beats(&int));
        assert!(!int.beats(&float));
    }

    #[test]
    fn format_preference_orders_float_first() {
        assert!(
            format_preference(cpal::SampleFormat::F32)
                < format_preference(cpal::SampleFormat::I32)
        );
        assert!(
            format_preference(cpal::SampleFormat::I16)
                < format_preference(cpal::SampleFormat::U16)
        );
    }
}
